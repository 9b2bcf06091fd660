//! 텔레메트리 런타임: 트레이서/미터 제공자와 텔레메트리 클라이언트의 단일 보관소
//!
//! [`TelemetryRuntime`]은 프로세스당 한 번 생성되어 `Arc`로 명시적으로 전달됩니다.
//! 전역 조회는 없습니다. 엔진과 플러그인은 트레이서와 미터를 반드시 이 런타임을
//! 통해 얻으며, 제공자를 직접 생성하지 않습니다.
//!
//! 하위 SDK는 불투명한 trait 경계 뒤에 있습니다:
//! - [`TracerProvider`] → [`Tracer`] → [`Span`]
//! - [`MeterProvider`] → [`Meter`]
//! - [`TelemetryClient`] (종료된 스팬 내보내기)
//!
//! # 활성 스팬
//! 실행기는 컨텍스트의 작업이 도는 동안 [`ActiveSpanGuard`]로 해당 스팬을
//! 스레드 로컬 스택에 올립니다. [`current_span`]은 [`log_layer`]가 로그 레코드를
//! 스팬 이벤트로 옮길 때 사용합니다.

pub mod client;
pub mod log_layer;
pub mod meter;
pub mod recording;

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::TelemetryError;

pub use client::{JsonLinesClient, NoopClient, TelemetryClient};
pub use log_layer::SpanEventLayer;
pub use meter::{MetricsMeterProvider, NoopMeterProvider};
pub use recording::{RecordingTracerProvider, SpanData, SpanEvent};

/// 스팬/이벤트 속성 맵
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// 공유 스팬 핸들
pub type SpanRef = Arc<dyn Span>;

/// 스팬 상태
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum SpanStatus {
    /// 상태 미설정
    #[default]
    Unset,
    /// 정상 완료
    Ok,
    /// 오류
    Error { description: String },
}

impl SpanStatus {
    /// 오류 상태인지 확인합니다.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }
}

/// 단일 작업 구간을 나타내는 스팬
pub trait Span: Send + Sync + fmt::Debug {
    /// 스팬 식별자
    fn span_id(&self) -> &str;

    /// 스팬 이름
    fn name(&self) -> &str;

    /// 아직 기록 중인지 (종료 전인지) 확인합니다.
    fn is_recording(&self) -> bool;

    /// 속성을 설정합니다.
    fn set_attribute(&self, key: &str, value: serde_json::Value);

    /// 이벤트를 추가합니다.
    fn add_event(&self, name: &str, attributes: Attributes);

    /// 상태를 설정합니다.
    fn set_status(&self, status: SpanStatus);

    /// 스팬을 종료합니다. 두 번째 호출부터는 무시됩니다.
    fn end(&self);
}

/// 스팬 생성기
pub trait Tracer: Send + Sync {
    /// 새 스팬을 시작합니다.
    fn start_span(&self, name: &str, parent: Option<&SpanRef>, attributes: Attributes) -> SpanRef;
}

/// 트레이서 제공자
pub trait TracerProvider: Send + Sync {
    /// 이름(instrumentation scope)에 해당하는 트레이서를 반환합니다.
    fn tracer(&self, name: &str) -> Arc<dyn Tracer>;

    /// 종료된 스팬을 꺼내 갑니다. 내보내기 대상이 없는 제공자는 빈 목록을 반환합니다.
    fn drain_finished(&self) -> Vec<SpanData> {
        Vec::new()
    }
}

/// 메트릭 기록기
pub trait Meter: Send + Sync {
    /// 카운터를 증가시킵니다.
    fn add_counter(&self, name: &'static str, value: u64, labels: &[(&'static str, String)]);

    /// 히스토그램에 값을 기록합니다.
    fn record_histogram(&self, name: &'static str, value: f64, labels: &[(&'static str, String)]);
}

/// 미터 제공자
pub trait MeterProvider: Send + Sync {
    /// 이름(instrumentation scope)에 해당하는 미터를 반환합니다.
    fn meter(&self, name: &str) -> Arc<dyn Meter>;
}

// ─── TelemetryRuntime ────────────────────────────────────────────────

/// 프로세스 단위 텔레메트리 보관소
///
/// `tracer()`/`meter()`는 제공자에 그대로 위임하며 별도 캐시를 두지 않습니다.
pub struct TelemetryRuntime {
    tracer_provider: Arc<dyn TracerProvider>,
    meter_provider: Arc<dyn MeterProvider>,
    client: Arc<dyn TelemetryClient>,
    enabled: bool,
}

impl TelemetryRuntime {
    /// 제공자와 클라이언트로 런타임을 구성합니다.
    pub fn new(
        tracer_provider: Arc<dyn TracerProvider>,
        meter_provider: Arc<dyn MeterProvider>,
        client: Arc<dyn TelemetryClient>,
    ) -> Self {
        Self {
            tracer_provider,
            meter_provider,
            client,
            enabled: true,
        }
    }

    /// 아무것도 기록하지 않는 런타임을 만듭니다.
    pub fn disabled() -> Self {
        Self {
            tracer_provider: Arc::new(NoopTracerProvider),
            meter_provider: Arc::new(NoopMeterProvider),
            client: Arc::new(NoopClient),
            enabled: false,
        }
    }

    /// 텔레메트리 활성화 여부
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// 트레이서를 반환합니다.
    pub fn tracer(&self, name: &str) -> Arc<dyn Tracer> {
        self.tracer_provider.tracer(name)
    }

    /// 미터를 반환합니다.
    pub fn meter(&self, name: &str) -> Arc<dyn Meter> {
        self.meter_provider.meter(name)
    }

    /// 텔레메트리 클라이언트를 반환합니다.
    pub fn client(&self) -> &Arc<dyn TelemetryClient> {
        &self.client
    }

    /// 종료된 스팬을 클라이언트로 내보냅니다.
    ///
    /// 내보낸 스팬 수를 반환합니다.
    pub fn flush(&self) -> Result<usize, TelemetryError> {
        let spans = self.tracer_provider.drain_finished();
        if spans.is_empty() {
            return Ok(0);
        }
        self.client.export(&spans)?;
        tracing::debug!(spans = spans.len(), "finished spans exported");
        Ok(spans.len())
    }
}

impl Default for TelemetryRuntime {
    fn default() -> Self {
        Self::disabled()
    }
}

impl fmt::Debug for TelemetryRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryRuntime")
            .field("enabled", &self.enabled)
            .finish_non_exhaustive()
    }
}

// ─── Active span ─────────────────────────────────────────────────────

thread_local! {
    static ACTIVE_SPANS: RefCell<Vec<SpanRef>> = const { RefCell::new(Vec::new()) };
}

/// 현재 스레드에서 활성화된 스팬을 반환합니다.
pub fn current_span() -> Option<SpanRef> {
    ACTIVE_SPANS.with(|stack| stack.borrow().last().cloned())
}

/// 스팬을 현재 스레드의 활성 스팬으로 만드는 가드
///
/// 가드가 drop되면 이전 활성 스팬이 복원됩니다.
/// 스레드 로컬 스택을 다루므로 `Send`가 아닙니다.
pub struct ActiveSpanGuard {
    _not_send: PhantomData<*const ()>,
}

impl ActiveSpanGuard {
    /// 스팬을 활성화합니다.
    pub fn enter(span: SpanRef) -> Self {
        ACTIVE_SPANS.with(|stack| stack.borrow_mut().push(span));
        Self {
            _not_send: PhantomData,
        }
    }
}

impl Drop for ActiveSpanGuard {
    fn drop(&mut self) {
        ACTIVE_SPANS.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

// ─── Noop tracer ─────────────────────────────────────────────────────

/// 기록하지 않는 트레이서 제공자
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracerProvider;

impl TracerProvider for NoopTracerProvider {
    fn tracer(&self, _name: &str) -> Arc<dyn Tracer> {
        Arc::new(NoopTracer)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct NoopTracer;

impl Tracer for NoopTracer {
    fn start_span(&self, name: &str, _parent: Option<&SpanRef>, _attributes: Attributes) -> SpanRef {
        Arc::new(NoopSpan {
            name: name.to_owned(),
        })
    }
}

/// 기록하지 않는 스팬: `is_recording()`은 항상 `false`
#[derive(Debug)]
pub struct NoopSpan {
    name: String,
}

impl Span for NoopSpan {
    fn span_id(&self) -> &str {
        ""
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_recording(&self) -> bool {
        false
    }

    fn set_attribute(&self, _key: &str, _value: serde_json::Value) {}

    fn add_event(&self, _name: &str, _attributes: Attributes) {}

    fn set_status(&self, _status: SpanStatus) {}

    fn end(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_runtime_produces_non_recording_spans() {
        let telemetry = TelemetryRuntime::disabled();
        assert!(!telemetry.is_enabled());

        let span = telemetry
            .tracer("test")
            .start_span("noop", None, Attributes::new());
        assert!(!span.is_recording());
        assert_eq!(telemetry.flush().unwrap(), 0);
    }

    #[test]
    fn active_span_guard_restores_previous_span() {
        let provider = RecordingTracerProvider::new();
        let tracer = provider.tracer("test");
        let outer = tracer.start_span("outer", None, Attributes::new());
        let inner = tracer.start_span("inner", Some(&outer), Attributes::new());

        assert!(current_span().is_none());
        {
            let _outer_guard = ActiveSpanGuard::enter(Arc::clone(&outer));
            assert_eq!(current_span().unwrap().name(), "outer");
            {
                let _inner_guard = ActiveSpanGuard::enter(Arc::clone(&inner));
                assert_eq!(current_span().unwrap().name(), "inner");
            }
            assert_eq!(current_span().unwrap().name(), "outer");
        }
        assert!(current_span().is_none());
    }

    #[test]
    fn flush_exports_finished_spans_through_client() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spans.jsonl");
        let provider = Arc::new(RecordingTracerProvider::new());
        let telemetry = TelemetryRuntime::new(
            provider.clone(),
            Arc::new(NoopMeterProvider),
            Arc::new(JsonLinesClient::new(&path)),
        );

        let span = telemetry
            .tracer("test")
            .start_span("exported", None, Attributes::new());
        span.end();

        assert_eq!(telemetry.flush().unwrap(), 1);
        assert!(provider.finished_spans().is_empty());

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 1);
        assert!(content.contains("\"exported\""));
    }

    #[test]
    fn span_status_serializes_with_code_tag() {
        let status = SpanStatus::Error {
            description: "boom".to_owned(),
        };
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("\"code\":\"error\""));
        assert!(status.is_error());
        assert!(!SpanStatus::Ok.is_error());
    }
}
