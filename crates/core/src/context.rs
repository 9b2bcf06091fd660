//! 실행 컨텍스트 트리: 모든 단계의 상태/에러/메타데이터/스팬 기록
//!
//! Suite → Scenario → Step/Hook/Component-phase 로 이어지는 계층 구조입니다.
//! 소유권은 루트에서 잎으로만 흐릅니다. 부모는 자식을 `Arc`로 소유하고,
//! 자식은 부모를 `Weak`으로만 참조합니다 (메타데이터 조회와
//! [`ExecutionContext::get_framework_element`] 용도).
//!
//! # 생명주기
//! ```text
//! create → start() → Running → mark_success() / mark_error() → end()
//! ```
//! - 생성 시 부모 메타데이터를 병합하고 자신의 항목으로 덮어씁니다 (자식 우선).
//! - `start()`에서 스팬을 열고, `end()`에서 닫습니다.
//! - `child_contexts`는 추가만 가능하며 순서는 호출 순서입니다.
//! - `status == Error` ⇔ `error.is_some()`

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::component::ComponentPhase;
use crate::error::CapturedError;
use crate::hook::HookPhase;
use crate::metrics as m;
use crate::telemetry::{ActiveSpanGuard, Attributes, SpanRef, SpanStatus, TelemetryRuntime};

/// 컨텍스트 메타데이터
pub type Metadata = BTreeMap<String, serde_json::Value>;

/// 훅 컨텍스트에 기록되는 페이즈 메타데이터 키
pub const PHASE_METADATA_KEY: &str = "test.ctx.phase";

/// 엔진 트레이서 이름
pub const TRACER_NAME: &str = "pipebench.engine";

// ─── ExecutionStatus ─────────────────────────────────────────────────

/// 실행 상태
///
/// 초기 상태는 `Pending`, 종료 상태는 `Success` 또는 `Error`입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// 시작 전
    Pending,
    /// 실행 중
    Running,
    /// 성공
    Success,
    /// 실패
    Error,
}

impl ExecutionStatus {
    /// 종료 상태인지 확인합니다.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Error)
    }

    /// 문자열 값
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Event types / kinds ─────────────────────────────────────────────

/// 컨텍스트 시작/종료 시 스팬에 기록되는 이벤트 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextEventType {
    SuiteStart,
    SuiteEnd,
    ScenarioStart,
    ScenarioEnd,
    StepStart,
    StepEnd,
    PhaseStart,
    PhaseEnd,
    HookStart,
    HookEnd,
}

impl ContextEventType {
    /// 이벤트 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SuiteStart => "test.suite.start",
            Self::SuiteEnd => "test.suite.end",
            Self::ScenarioStart => "test.scenario.start",
            Self::ScenarioEnd => "test.scenario.end",
            Self::StepStart => "test.step.start",
            Self::StepEnd => "test.step.end",
            Self::PhaseStart => "test.component.phase.start",
            Self::PhaseEnd => "test.component.phase.end",
            Self::HookStart => "test.hook.start",
            Self::HookEnd => "test.hook.end",
        }
    }
}

impl fmt::Display for ContextEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 프레임워크 요소 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementKind {
    Suite,
    Scenario,
    Step,
}

impl ElementKind {
    /// 문자열 값
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Suite => "suite",
            Self::Scenario => "scenario",
            Self::Step => "step",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 컨텍스트가 속한 프레임워크 요소 (Suite / Scenario / Step)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkElement {
    /// 요소 종류
    pub kind: ElementKind,
    /// 요소 이름
    pub name: String,
}

/// 컨텍스트가 표현하는 작업 종류
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextKind {
    /// Suite / Scenario / Step
    Element(ElementKind),
    /// 컴포넌트 페이즈 실행
    ComponentPhase {
        component: String,
        phase: ComponentPhase,
    },
    /// 훅 실행 (FrameworkElementHookContext)
    Hook { phase: HookPhase },
}

impl ContextKind {
    /// 문자열 레이블 (메트릭/스냅샷용)
    pub fn label(&self) -> &'static str {
        match self {
            Self::Element(kind) => kind.as_str(),
            Self::ComponentPhase { .. } => "component_phase",
            Self::Hook { .. } => "hook",
        }
    }

    fn event_types(&self) -> (ContextEventType, ContextEventType) {
        match self {
            Self::Element(ElementKind::Suite) => {
                (ContextEventType::SuiteStart, ContextEventType::SuiteEnd)
            }
            Self::Element(ElementKind::Scenario) => {
                (ContextEventType::ScenarioStart, ContextEventType::ScenarioEnd)
            }
            Self::Element(ElementKind::Step) => {
                (ContextEventType::StepStart, ContextEventType::StepEnd)
            }
            Self::ComponentPhase { .. } => (ContextEventType::PhaseStart, ContextEventType::PhaseEnd),
            Self::Hook { .. } => (ContextEventType::HookStart, ContextEventType::HookEnd),
        }
    }

    fn span_name(&self, name: &str) -> String {
        match self {
            Self::Element(ElementKind::Suite) => format!("Run Suite {name}"),
            Self::Element(ElementKind::Scenario) => format!("Run Scenario {name}"),
            Self::Element(ElementKind::Step) => format!("Run Step {name}"),
            Self::ComponentPhase { component, phase } => {
                format!("Run Component Phase {component} {phase}")
            }
            Self::Hook { phase } => format!("Run Framework Hook {name} {phase}"),
        }
    }
}

// ─── ExecutionContext ────────────────────────────────────────────────

#[derive(Debug)]
struct ContextState {
    status: ExecutionStatus,
    error: Option<CapturedError>,
    metadata: Metadata,
    span: Option<SpanRef>,
    ended: bool,
    children: Vec<Arc<ExecutionContext>>,
}

/// 실행 트리의 노드
///
/// 하나의 작업(스위트, 시나리오, 스텝, 컴포넌트 페이즈, 훅 실행)에 대응하며
/// 작업 사이에 재사용되지 않습니다.
pub struct ExecutionContext {
    id: Uuid,
    name: String,
    kind: ContextKind,
    span_name: String,
    start_event_type: ContextEventType,
    end_event_type: ContextEventType,
    parent: Option<Weak<ExecutionContext>>,
    telemetry: Arc<TelemetryRuntime>,
    state: Mutex<ContextState>,
}

impl ExecutionContext {
    /// 트리 루트가 되는 스위트 컨텍스트를 만듭니다.
    pub fn suite(name: &str, metadata: Metadata, telemetry: Arc<TelemetryRuntime>) -> Arc<Self> {
        Self::create(
            None,
            ContextKind::Element(ElementKind::Suite),
            name,
            metadata,
            telemetry,
        )
    }

    /// 부모 없이 임의 종류의 컨텍스트를 만듭니다.
    ///
    /// 주로 테스트나 단독 훅 실행에 사용합니다.
    pub fn detached(
        kind: ContextKind,
        name: &str,
        metadata: Metadata,
        telemetry: Arc<TelemetryRuntime>,
    ) -> Arc<Self> {
        Self::create(None, kind, name, metadata, telemetry)
    }

    /// 자식 컨텍스트를 만들어 `child_contexts`에 추가합니다.
    pub fn child(self: &Arc<Self>, kind: ContextKind, name: &str, metadata: Metadata) -> Arc<Self> {
        Self::create(
            Some(self),
            kind,
            name,
            metadata,
            Arc::clone(&self.telemetry),
        )
    }

    /// 시나리오 자식 컨텍스트
    pub fn scenario(self: &Arc<Self>, name: &str, metadata: Metadata) -> Arc<Self> {
        self.child(ContextKind::Element(ElementKind::Scenario), name, metadata)
    }

    /// 스텝 자식 컨텍스트
    pub fn step(self: &Arc<Self>, name: &str, metadata: Metadata) -> Arc<Self> {
        self.child(ContextKind::Element(ElementKind::Step), name, metadata)
    }

    /// 컴포넌트 페이즈 자식 컨텍스트
    pub fn component_phase(self: &Arc<Self>, component: &str, phase: ComponentPhase) -> Arc<Self> {
        self.child(
            ContextKind::ComponentPhase {
                component: component.to_owned(),
                phase,
            },
            component,
            Metadata::new(),
        )
    }

    /// 훅 실행 자식 컨텍스트 (FrameworkElementHookContext)
    pub fn hook(self: &Arc<Self>, name: &str, phase: HookPhase) -> Arc<Self> {
        self.child(ContextKind::Hook { phase }, name, Metadata::new())
    }

    fn create(
        parent: Option<&Arc<Self>>,
        kind: ContextKind,
        name: &str,
        own: Metadata,
        telemetry: Arc<TelemetryRuntime>,
    ) -> Arc<Self> {
        let mut metadata = parent.map(|p| p.metadata()).unwrap_or_default();
        match &kind {
            ContextKind::Element(element) => {
                metadata.insert(
                    format!("test.{}.name", element.as_str()),
                    serde_json::Value::String(name.to_owned()),
                );
            }
            ContextKind::ComponentPhase { component, .. } => {
                metadata.insert(
                    "test.component.name".to_owned(),
                    serde_json::Value::String(component.clone()),
                );
            }
            ContextKind::Hook { .. } => {}
        }
        metadata.extend(own);
        if let ContextKind::Hook { phase } = &kind {
            metadata.insert(
                PHASE_METADATA_KEY.to_owned(),
                serde_json::Value::String(phase.value().to_owned()),
            );
        }
        if let ContextKind::ComponentPhase { phase, .. } = &kind {
            metadata.insert(
                PHASE_METADATA_KEY.to_owned(),
                serde_json::Value::String(phase.value().to_owned()),
            );
        }

        let (start_event_type, end_event_type) = kind.event_types();
        let ctx = Arc::new(Self {
            id: Uuid::new_v4(),
            name: name.to_owned(),
            span_name: kind.span_name(name),
            kind,
            start_event_type,
            end_event_type,
            parent: parent.map(Arc::downgrade),
            telemetry,
            state: Mutex::new(ContextState {
                status: ExecutionStatus::Pending,
                error: None,
                metadata,
                span: None,
                ended: false,
                children: Vec::new(),
            }),
        });

        if let Some(parent) = parent {
            parent.lock().children.push(Arc::clone(&ctx));
        }
        ctx
    }

    fn lock(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── accessors ──

    /// 컨텍스트 ID
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 종류
    pub fn kind(&self) -> &ContextKind {
        &self.kind
    }

    /// 스팬 이름
    pub fn span_name(&self) -> &str {
        &self.span_name
    }

    /// 시작 이벤트 종류
    pub fn start_event_type(&self) -> ContextEventType {
        self.start_event_type
    }

    /// 종료 이벤트 종류
    pub fn end_event_type(&self) -> ContextEventType {
        self.end_event_type
    }

    /// 텔레메트리 런타임
    pub fn telemetry(&self) -> &Arc<TelemetryRuntime> {
        &self.telemetry
    }

    /// 현재 상태
    pub fn status(&self) -> ExecutionStatus {
        self.lock().status
    }

    /// 기록된 실패
    pub fn error(&self) -> Option<CapturedError> {
        self.lock().error.clone()
    }

    /// 메타데이터 사본
    pub fn metadata(&self) -> Metadata {
        self.lock().metadata.clone()
    }

    /// 메타데이터 값 하나를 조회합니다.
    pub fn metadata_value(&self, key: &str) -> Option<serde_json::Value> {
        self.lock().metadata.get(key).cloned()
    }

    /// 메타데이터 항목을 추가합니다. 이후 생성되는 자식에만 전파됩니다.
    pub fn insert_metadata(&self, key: impl Into<String>, value: serde_json::Value) {
        let key = key.into();
        let mut state = self.lock();
        if let Some(span) = &state.span {
            span.set_attribute(&key, value.clone());
        }
        state.metadata.insert(key, value);
    }

    /// 연결된 스팬
    pub fn span(&self) -> Option<SpanRef> {
        self.lock().span.clone()
    }

    /// 자식 컨텍스트 목록 (호출 순서)
    pub fn child_contexts(&self) -> Vec<Arc<ExecutionContext>> {
        self.lock().children.clone()
    }

    /// 부모 컨텍스트
    pub fn parent(&self) -> Option<Arc<ExecutionContext>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// 이 컨텍스트가 속한 프레임워크 요소를 찾습니다.
    ///
    /// Suite/Scenario/Step 컨텍스트는 자기 자신을, 그 외에는 부모에게 위임합니다.
    /// 부모가 없으면 `None`입니다.
    pub fn get_framework_element(&self) -> Option<FrameworkElement> {
        match &self.kind {
            ContextKind::Element(kind) => Some(FrameworkElement {
                kind: *kind,
                name: self.name.clone(),
            }),
            _ => self.parent().and_then(|p| p.get_framework_element()),
        }
    }

    /// 가장 가까운 특정 종류의 조상 요소를 찾습니다 (자기 자신 포함).
    pub fn find_element(&self, kind: ElementKind) -> Option<FrameworkElement> {
        if self.kind == ContextKind::Element(kind) {
            return Some(FrameworkElement {
                kind,
                name: self.name.clone(),
            });
        }
        self.parent().and_then(|p| p.find_element(kind))
    }

    // ── lifecycle ──

    /// 작업 시작: `Pending → Running`, 스팬을 열고 시작 이벤트를 기록합니다.
    pub fn start(&self) {
        let parent_span = self.parent().and_then(|p| p.span());
        let mut state = self.lock();
        if state.status != ExecutionStatus::Pending {
            tracing::warn!(
                context = %self.name,
                status = %state.status,
                "context already started, ignoring start"
            );
            return;
        }
        state.status = ExecutionStatus::Running;

        let mut attributes: Attributes = state.metadata.clone();
        attributes.insert(
            "test.ctx.kind".to_owned(),
            serde_json::Value::String(self.kind.label().to_owned()),
        );
        attributes.insert(
            "test.ctx.id".to_owned(),
            serde_json::Value::String(self.id.to_string()),
        );
        let span = self.telemetry.tracer(TRACER_NAME).start_span(
            &self.span_name,
            parent_span.as_ref(),
            attributes,
        );
        span.add_event(self.start_event_type.as_str(), Attributes::new());
        state.span = Some(span);
    }

    /// 성공으로 표시합니다. 이전 시도가 남긴 `Error`도 지웁니다.
    pub fn mark_success(&self) {
        let mut state = self.lock();
        state.status = ExecutionStatus::Success;
        state.error = None;
        if let Some(span) = &state.span {
            span.set_status(SpanStatus::Ok);
        }
    }

    /// 실패로 표시합니다.
    pub fn mark_error(&self, error: CapturedError) {
        let mut state = self.lock();
        state.status = ExecutionStatus::Error;
        if let Some(span) = &state.span {
            span.set_status(SpanStatus::Error {
                description: error.to_string(),
            });
        }
        state.error = Some(error);
    }

    /// 이전 시도가 남긴 결과를 지우고 `status`로 되돌립니다.
    pub(crate) fn reset_attempt(&self, status: ExecutionStatus) {
        let mut state = self.lock();
        if state.status == status && state.error.is_none() {
            return;
        }
        state.status = status;
        state.error = None;
        if let Some(span) = &state.span {
            span.set_status(SpanStatus::Unset);
        }
    }

    /// 작업 종료: 종료 이벤트를 기록하고 스팬을 닫습니다. 두 번째 호출은 무시됩니다.
    pub fn end(&self) {
        let (span, status) = {
            let mut state = self.lock();
            if state.ended {
                return;
            }
            state.ended = true;
            (state.span.clone(), state.status)
        };

        if let Some(span) = span {
            let mut attributes = Attributes::new();
            attributes.insert(
                "test.ctx.status".to_owned(),
                serde_json::Value::String(status.to_string()),
            );
            span.add_event(self.end_event_type.as_str(), attributes);
            span.end();
        }

        self.telemetry.meter(TRACER_NAME).add_counter(
            m::CONTEXTS_TOTAL,
            1,
            &[
                (m::LABEL_KIND, self.kind.label().to_owned()),
                (m::LABEL_STATUS, status.to_string()),
            ],
        );
    }

    /// 이 컨텍스트의 스팬을 현재 스레드의 활성 스팬으로 만듭니다.
    pub fn activate(&self) -> Option<ActiveSpanGuard> {
        self.span().map(ActiveSpanGuard::enter)
    }

    /// 직렬화 가능한 트리 스냅샷을 만듭니다.
    pub fn snapshot(&self) -> ContextSnapshot {
        let (status, error, metadata, children) = {
            let state = self.lock();
            (
                state.status,
                state.error.clone(),
                state.metadata.clone(),
                state.children.clone(),
            )
        };
        ContextSnapshot {
            id: self.id.to_string(),
            name: self.name.clone(),
            kind: self.kind.label().to_owned(),
            status,
            error,
            metadata,
            children: children.iter().map(|c| c.snapshot()).collect(),
        }
    }
}

impl fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("ExecutionContext")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("status", &state.status)
            .field("children", &state.children.len())
            .finish()
    }
}

/// 컨텍스트 트리 스냅샷 (보고서 출력용)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextSnapshot {
    pub id: String,
    pub name: String,
    pub kind: String,
    pub status: ExecutionStatus,
    pub error: Option<CapturedError>,
    pub metadata: Metadata,
    pub children: Vec<ContextSnapshot>,
}

impl ContextSnapshot {
    /// 트리 전체에서 `Error` 상태인 노드 수를 셉니다.
    pub fn error_count(&self) -> usize {
        let own = usize::from(self.status == ExecutionStatus::Error);
        own + self.children.iter().map(Self::error_count).sum::<usize>()
    }
}
