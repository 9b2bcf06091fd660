//! 메모리 기록 트레이서
//!
//! 종료된 스팬을 [`SpanData`]로 모아 두었다가 [`TelemetryRuntime::flush`]
//! 시점에 클라이언트로 넘깁니다.
//!
//! [`TelemetryRuntime::flush`]: super::TelemetryRuntime::flush

use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Attributes, Span, SpanRef, SpanStatus, Tracer, TracerProvider};

/// 스팬 이벤트
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanEvent {
    /// 이벤트 이름
    pub name: String,
    /// 발생 시각
    pub timestamp: DateTime<Utc>,
    /// 이벤트 속성
    pub attributes: Attributes,
}

/// 종료된 스팬의 스냅샷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpanData {
    /// 스팬 ID
    pub span_id: String,
    /// 부모 스팬 ID
    pub parent_span_id: Option<String>,
    /// 스팬 이름
    pub name: String,
    /// 트레이서 이름 (instrumentation scope)
    pub scope: String,
    /// 시작 시각
    pub start_time: DateTime<Utc>,
    /// 종료 시각
    pub end_time: DateTime<Utc>,
    /// 속성
    pub attributes: Attributes,
    /// 이벤트 목록
    pub events: Vec<SpanEvent>,
    /// 최종 상태
    pub status: SpanStatus,
}

type FinishedSpans = Arc<Mutex<Vec<SpanData>>>;

/// 종료된 스팬을 메모리에 보관하는 트레이서 제공자
#[derive(Debug, Default)]
pub struct RecordingTracerProvider {
    finished: FinishedSpans,
}

impl RecordingTracerProvider {
    /// 빈 제공자를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 아직 내보내지 않은 종료 스팬의 사본을 반환합니다.
    pub fn finished_spans(&self) -> Vec<SpanData> {
        self.finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TracerProvider for RecordingTracerProvider {
    fn tracer(&self, name: &str) -> Arc<dyn Tracer> {
        Arc::new(RecordingTracer {
            scope: name.to_owned(),
            finished: Arc::clone(&self.finished),
        })
    }

    fn drain_finished(&self) -> Vec<SpanData> {
        std::mem::take(&mut *self.finished.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

struct RecordingTracer {
    scope: String,
    finished: FinishedSpans,
}

impl Tracer for RecordingTracer {
    fn start_span(&self, name: &str, parent: Option<&SpanRef>, attributes: Attributes) -> SpanRef {
        let parent_span_id = parent
            .map(|p| p.span_id().to_owned())
            .filter(|id| !id.is_empty());
        Arc::new(RecordedSpan {
            span_id: Uuid::new_v4().simple().to_string(),
            parent_span_id,
            name: name.to_owned(),
            scope: self.scope.clone(),
            start_time: Utc::now(),
            state: Mutex::new(SpanState {
                attributes,
                events: Vec::new(),
                status: SpanStatus::Unset,
                ended: false,
            }),
            finished: Arc::clone(&self.finished),
        })
    }
}

#[derive(Debug)]
struct SpanState {
    attributes: Attributes,
    events: Vec<SpanEvent>,
    status: SpanStatus,
    ended: bool,
}

/// 기록 중인 스팬
#[derive(Debug)]
struct RecordedSpan {
    span_id: String,
    parent_span_id: Option<String>,
    name: String,
    scope: String,
    start_time: DateTime<Utc>,
    state: Mutex<SpanState>,
    finished: FinishedSpans,
}

impl RecordedSpan {
    fn with_state<R>(&self, f: impl FnOnce(&mut SpanState) -> R) -> R {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }
}

impl Span for RecordedSpan {
    fn span_id(&self) -> &str {
        &self.span_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_recording(&self) -> bool {
        self.with_state(|s| !s.ended)
    }

    fn set_attribute(&self, key: &str, value: serde_json::Value) {
        self.with_state(|s| {
            if !s.ended {
                s.attributes.insert(key.to_owned(), value);
            }
        });
    }

    fn add_event(&self, name: &str, attributes: Attributes) {
        self.with_state(|s| {
            if !s.ended {
                s.events.push(SpanEvent {
                    name: name.to_owned(),
                    timestamp: Utc::now(),
                    attributes,
                });
            }
        });
    }

    fn set_status(&self, status: SpanStatus) {
        self.with_state(|s| {
            if !s.ended {
                s.status = status;
            }
        });
    }

    fn end(&self) {
        let data = self.with_state(|s| {
            if s.ended {
                return None;
            }
            s.ended = true;
            Some(SpanData {
                span_id: self.span_id.clone(),
                parent_span_id: self.parent_span_id.clone(),
                name: self.name.clone(),
                scope: self.scope.clone(),
                start_time: self.start_time,
                end_time: Utc::now(),
                attributes: s.attributes.clone(),
                events: s.events.clone(),
                status: s.status.clone(),
            })
        });
        if let Some(data) = data {
            self.finished
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(data);
        }
    }
}
