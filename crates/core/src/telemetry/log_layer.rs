//! 스팬 인식 로그 레이어
//!
//! `tracing` 이벤트를 현재 활성 스팬의 `"log"` 이벤트로 옮겨,
//! 자유 형식 로그와 컨텍스트/스팬 트리를 인과적으로 연결합니다.
//! 로깅 호출부는 텔레메트리 API를 알 필요가 없습니다.
//!
//! # 속성
//! - `log.severity`: 레벨 (`INFO`, `WARN`, ...)
//! - `log.message`: 메시지
//! - `log.logger`: 이벤트 target
//! - 이름이 [`CUSTOM_ATTRIBUTE_PREFIX`]로 시작하는 필드는 그대로 전달
//!
//! ```ignore
//! tracing::info!(test.scenario = "ramp", "warming up");
//! ```

use std::fmt;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::Context;

use super::{Attributes, current_span};

/// 스팬 이벤트로 전달되는 사용자 정의 필드의 접두어
pub const CUSTOM_ATTRIBUTE_PREFIX: &str = "test.";

/// 스팬 이벤트 이름
pub const LOG_EVENT_NAME: &str = "log";

/// 로그 레코드를 활성 스팬 이벤트로 기록하는 레이어
///
/// 활성 스팬이 없거나 기록 중이 아니면 아무것도 하지 않습니다.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpanEventLayer;

impl<S: Subscriber> Layer<S> for SpanEventLayer {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let Some(span) = current_span() else {
            return;
        };
        if !span.is_recording() {
            return;
        }

        let metadata = event.metadata();
        let mut collector = FieldCollector::default();
        event.record(&mut collector);

        let mut attributes = collector.attributes;
        attributes.insert(
            "log.severity".to_owned(),
            serde_json::Value::String(metadata.level().to_string()),
        );
        attributes.insert(
            "log.message".to_owned(),
            serde_json::Value::String(collector.message.unwrap_or_default()),
        );
        attributes.insert(
            "log.logger".to_owned(),
            serde_json::Value::String(metadata.target().to_owned()),
        );

        span.add_event(LOG_EVENT_NAME, attributes);
    }
}

#[derive(Default)]
struct FieldCollector {
    message: Option<String>,
    attributes: Attributes,
}

impl FieldCollector {
    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        if field.name().starts_with(CUSTOM_ATTRIBUTE_PREFIX) {
            self.attributes.insert(field.name().to_owned(), value);
        }
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{value:?}"));
        } else {
            self.insert(field, serde_json::Value::String(format!("{value:?}")));
        }
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_owned());
        } else {
            self.insert(field, serde_json::Value::String(value.to_owned()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.into());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.into());
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, value.into());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, value.into());
    }
}
