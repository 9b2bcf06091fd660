//! 스위트 드라이버: Suite → Scenario → Step 순회와 컴포넌트 기동/정리
//!
//! # 실행 순서
//! ```text
//! before_suite 훅
//!   → 컴포넌트 기동 (configure, deploy, start, start_monitoring; 페이즈별로 선언 순서)
//!   → 시나리오 (before_scenario → 스텝들 → after_scenario)
//!   → after_suite 훅
//! 컴포넌트 정리 (항상 시도, 역순, best-effort)
//! ```
//!
//! 스텝은 before_step 훅 → 액션(스텝 정책) → after_step 훅 순으로 실행됩니다.
//! 치명적 실패는 그 지점에서 실행을 중단하고 상위 컨텍스트로 전파되며,
//! 허용된 실패는 해당 컨텍스트에만 기록됩니다.
//!
//! [`Suite::cancel_token`]으로 취소하면 진행 중인 스텝이 끝난 뒤 남은 작업을
//! 건너뛰고 [`ExecutionError::Interrupted`]로 정리 단계에 들어갑니다.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;

use crate::action::{StepAction, StepEnv};
use crate::component::{ComponentHandle, ComponentPhase};
use crate::context::{ContextSnapshot, ExecutionContext, Metadata, TRACER_NAME};
use crate::error::{CapturedError, ExecutionError, PipebenchError};
use crate::hook::{FrameworkPhase, Hook, HookMap, OnErrorConfig};
use crate::metrics as m;
use crate::policy::{handle_with_policy, run_hooks};
use crate::runtime::Runtime;
use crate::telemetry::TelemetryRuntime;

/// 스텝 결과가 기록되는 메타데이터 키
pub const STEP_RESULT_METADATA_KEY: &str = "test.step.result";

/// 기동 페이즈 (정상 순서)
const BRING_UP: [ComponentPhase; 4] = [
    ComponentPhase::Configure,
    ComponentPhase::Deploy,
    ComponentPhase::Start,
    ComponentPhase::StartMonitoring,
];

/// 정리 페이즈 (정상 순서)
const TEAR_DOWN: [ComponentPhase; 4] = [
    ComponentPhase::StopMonitoring,
    ComponentPhase::CollectMonitoringData,
    ComponentPhase::Stop,
    ComponentPhase::Destroy,
];

fn hooks_for(hooks: &HookMap<FrameworkPhase>, phase: FrameworkPhase) -> &[Hook] {
    hooks.get(&phase).map(Vec::as_slice).unwrap_or_default()
}

fn record_failure(ctx: &ExecutionContext, err: &PipebenchError) {
    // 이미 하위 단계의 실패가 기록되어 있으면 유지
    if ctx.error().is_none() {
        ctx.mark_error(CapturedError::from_error(err));
    }
}

/// 취소 요청이 있으면 `next`를 건너뛰는 에러를 반환합니다.
fn ensure_not_cancelled(
    cancel: &CancellationToken,
    suite: &str,
    next: impl FnOnce() -> String,
) -> Result<(), PipebenchError> {
    if !cancel.is_cancelled() {
        return Ok(());
    }
    let next = next();
    tracing::warn!(suite, next = %next, "cancellation requested, skipping remaining work");
    Err(ExecutionError::Interrupted {
        suite: suite.to_owned(),
        next,
    }
    .into())
}

// ─── Step ────────────────────────────────────────────────────────────

/// 시나리오의 단일 액션 호출
pub struct Step {
    name: String,
    action: Arc<dyn StepAction>,
    on_error: OnErrorConfig,
    metadata: Metadata,
    hooks: HookMap<FrameworkPhase>,
}

impl Step {
    /// 스텝을 생성합니다. 정책 기본값은 fail-fast입니다.
    pub fn new(name: impl Into<String>, action: Arc<dyn StepAction>) -> Self {
        Self {
            name: name.into(),
            action,
            on_error: OnErrorConfig::default(),
            metadata: Metadata::new(),
            hooks: HookMap::new(),
        }
    }

    /// 에러 정책을 지정합니다.
    pub fn with_on_error(mut self, on_error: OnErrorConfig) -> Self {
        self.on_error = on_error;
        self
    }

    /// 메타데이터를 지정합니다.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// `before_step`/`after_step` 훅을 추가합니다.
    pub fn add_hook(&mut self, phase: FrameworkPhase, hook: Hook) {
        self.hooks.entry(phase).or_default().push(hook);
    }

    /// 스텝 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 에러 정책
    pub fn on_error(&self) -> &OnErrorConfig {
        &self.on_error
    }

    fn run(
        &self,
        parent: &Arc<ExecutionContext>,
        process: &Arc<Runtime>,
        components: &[ComponentHandle],
    ) -> Result<(), PipebenchError> {
        let ctx = parent.step(&self.name, self.metadata.clone());
        ctx.start();
        let started = Instant::now();

        let result = self.run_inner(&ctx, process, components);
        if let Err(e) = &result {
            record_failure(&ctx, e);
        }
        ctx.end();

        let outcome = if ctx.error().is_none() { "success" } else { "failure" };
        ctx.telemetry().meter(TRACER_NAME).record_histogram(
            m::STEP_DURATION_SECONDS,
            started.elapsed().as_secs_f64(),
            &[(m::LABEL_RESULT, outcome.to_owned())],
        );
        result
    }

    fn run_inner(
        &self,
        ctx: &Arc<ExecutionContext>,
        process: &Arc<Runtime>,
        components: &[ComponentHandle],
    ) -> Result<(), PipebenchError> {
        run_hooks(
            hooks_for(&self.hooks, FrameworkPhase::BeforeStep),
            FrameworkPhase::BeforeStep.into(),
            ctx,
        )?;

        let env = StepEnv::new(ctx, process, components);
        let value = handle_with_policy(ctx, &self.name, || self.action.run(&env), &self.on_error)?;
        if let Some(value) = value.filter(|v| !v.is_null()) {
            ctx.insert_metadata(STEP_RESULT_METADATA_KEY, value);
        }

        run_hooks(
            hooks_for(&self.hooks, FrameworkPhase::AfterStep),
            FrameworkPhase::AfterStep.into(),
            ctx,
        )
    }
}

// ─── Scenario ────────────────────────────────────────────────────────

/// 순서가 있는 스텝 묶음
pub struct Scenario {
    name: String,
    metadata: Metadata,
    steps: Vec<Step>,
    hooks: HookMap<FrameworkPhase>,
}

impl Scenario {
    /// 빈 시나리오를 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: Metadata::new(),
            steps: Vec::new(),
            hooks: HookMap::new(),
        }
    }

    /// 메타데이터를 지정합니다.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// 스텝을 추가합니다.
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// `before_scenario`/`after_scenario` 훅을 추가합니다.
    pub fn add_hook(&mut self, phase: FrameworkPhase, hook: Hook) {
        self.hooks.entry(phase).or_default().push(hook);
    }

    /// 시나리오 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 스텝 목록
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    fn run(
        &self,
        parent: &Arc<ExecutionContext>,
        process: &Arc<Runtime>,
        components: &[ComponentHandle],
        cancel: &CancellationToken,
    ) -> Result<(), PipebenchError> {
        let ctx = parent.scenario(&self.name, self.metadata.clone());
        ctx.start();

        let result = {
            let _active = ctx.activate();
            tracing::info!(scenario = %self.name, steps = self.steps.len(), "scenario started");
            self.run_inner(&ctx, process, components, cancel)
        };
        match &result {
            Ok(()) => ctx.mark_success(),
            Err(e) => record_failure(&ctx, e),
        }
        ctx.end();
        tracing::info!(scenario = %self.name, status = %ctx.status(), "scenario finished");
        result
    }

    fn run_inner(
        &self,
        ctx: &Arc<ExecutionContext>,
        process: &Arc<Runtime>,
        components: &[ComponentHandle],
        cancel: &CancellationToken,
    ) -> Result<(), PipebenchError> {
        let suite = ctx.parent().map(|p| p.name().to_owned()).unwrap_or_default();
        run_hooks(
            hooks_for(&self.hooks, FrameworkPhase::BeforeScenario),
            FrameworkPhase::BeforeScenario.into(),
            ctx,
        )?;
        for step in &self.steps {
            ensure_not_cancelled(cancel, &suite, || format!("step '{}'", step.name))?;
            step.run(ctx, process, components)?;
        }
        run_hooks(
            hooks_for(&self.hooks, FrameworkPhase::AfterScenario),
            FrameworkPhase::AfterScenario.into(),
            ctx,
        )
    }
}

// ─── Suite ───────────────────────────────────────────────────────────

/// 스위트 실행 결과
#[derive(Debug)]
pub struct SuiteReport {
    /// 루트 컨텍스트
    pub context: Arc<ExecutionContext>,
    /// 실행을 중단시킨 치명적 실패
    pub error: Option<PipebenchError>,
    /// 정리 중 발생한 실패 (`"{component}: {error}"`)
    pub teardown_errors: Vec<String>,
}

impl SuiteReport {
    /// 치명적 실패와 정리 실패가 모두 없는지 확인합니다.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.teardown_errors.is_empty()
    }

    /// 컨텍스트 트리 스냅샷
    pub fn snapshot(&self) -> ContextSnapshot {
        self.context.snapshot()
    }
}

/// 시나리오와 컴포넌트의 최상위 묶음
pub struct Suite {
    name: String,
    metadata: Metadata,
    components: Vec<ComponentHandle>,
    scenarios: Vec<Scenario>,
    hooks: HookMap<FrameworkPhase>,
    process: Arc<Runtime>,
    cancel: CancellationToken,
}

impl fmt::Debug for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Suite")
            .field("name", &self.name)
            .field("components", &self.components)
            .field("scenarios", &self.scenarios.len())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Suite {
    /// 빈 스위트를 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            metadata: Metadata::new(),
            components: Vec::new(),
            scenarios: Vec::new(),
            hooks: HookMap::new(),
            process: Arc::new(Runtime::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// 메타데이터를 지정합니다.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// 컴포넌트를 추가합니다. 기동은 추가 순서, 정리는 역순입니다.
    pub fn with_component(mut self, component: ComponentHandle) -> Self {
        self.components.push(component);
        self
    }

    /// 시나리오를 추가합니다.
    pub fn with_scenario(mut self, scenario: Scenario) -> Self {
        self.scenarios.push(scenario);
        self
    }

    /// 프로세스 런타임 저장소를 공유합니다.
    pub fn with_process_runtime(mut self, process: Arc<Runtime>) -> Self {
        self.process = process;
        self
    }

    /// `before_suite`/`after_suite` 훅을 추가합니다.
    pub fn add_hook(&mut self, phase: FrameworkPhase, hook: Hook) {
        self.hooks.entry(phase).or_default().push(hook);
    }

    /// 스위트 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 컴포넌트 목록
    pub fn components(&self) -> &[ComponentHandle] {
        &self.components
    }

    /// 시나리오 목록
    pub fn scenarios(&self) -> &[Scenario] {
        &self.scenarios
    }

    /// 실행을 취소하는 토큰
    ///
    /// 다른 스레드에서 `cancel()`을 호출하면 진행 중인 스텝이 끝난 뒤
    /// 남은 작업을 건너뛰고 정리 단계를 실행합니다.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 프로세스 런타임 저장소
    pub fn process_runtime(&self) -> &Arc<Runtime> {
        &self.process
    }

    /// 스위트를 실행합니다.
    ///
    /// 치명적 실패가 있어도 이미 기동된 컴포넌트의 정리는 시도합니다.
    pub fn run(&mut self, telemetry: Arc<TelemetryRuntime>) -> SuiteReport {
        let ctx = ExecutionContext::suite(&self.name, self.metadata.clone(), telemetry);
        ctx.start();

        let (error, teardown_errors) = {
            let _active = ctx.activate();
            tracing::info!(
                suite = %self.name,
                components = self.components.len(),
                scenarios = self.scenarios.len(),
                "suite started"
            );
            let error = self.run_main(&ctx).err();
            (error, self.tear_down(&ctx))
        };

        match (&error, teardown_errors.is_empty()) {
            (Some(e), _) => record_failure(&ctx, e),
            (None, true) => ctx.mark_success(),
            (None, false) => ctx.mark_error(CapturedError::new(
                "PhaseFailure",
                format!("teardown failed: {}", teardown_errors.join("; ")),
            )),
        }
        ctx.end();

        tracing::info!(suite = %self.name, status = %ctx.status(), "suite finished");
        SuiteReport {
            context: ctx,
            error,
            teardown_errors,
        }
    }

    fn run_main(&mut self, ctx: &Arc<ExecutionContext>) -> Result<(), PipebenchError> {
        run_hooks(
            hooks_for(&self.hooks, FrameworkPhase::BeforeSuite),
            FrameworkPhase::BeforeSuite.into(),
            ctx,
        )?;

        for phase in BRING_UP {
            for component in &mut self.components {
                ensure_not_cancelled(&self.cancel, &self.name, || {
                    format!("{phase} of component '{}'", component.name())
                })?;
                component.run_phase(phase, ctx)?;
            }
        }

        for scenario in &self.scenarios {
            ensure_not_cancelled(&self.cancel, &self.name, || format!("scenario '{}'", scenario.name))?;
            scenario.run(ctx, &self.process, &self.components, &self.cancel)?;
        }

        ensure_not_cancelled(&self.cancel, &self.name, || "after_suite hooks".to_owned())?;
        run_hooks(
            hooks_for(&self.hooks, FrameworkPhase::AfterSuite),
            FrameworkPhase::AfterSuite.into(),
            ctx,
        )
    }

    /// 역순으로 정리 페이즈를 실행합니다. 실패는 수집하고 계속 진행합니다.
    fn tear_down(&mut self, ctx: &Arc<ExecutionContext>) -> Vec<String> {
        let mut errors = Vec::new();
        for phase in TEAR_DOWN {
            for component in self.components.iter_mut().rev() {
                let applicable = match phase {
                    ComponentPhase::Destroy => {
                        component.was_attempted(ComponentPhase::Deploy)
                            && component.last_phase() != Some(ComponentPhase::Destroy)
                    }
                    _ => component.check_transition(phase).is_ok(),
                };
                if !applicable {
                    tracing::debug!(component = %component.name(), phase = %phase, "skipping teardown phase");
                    continue;
                }
                if let Err(e) = component.run_phase(phase, ctx) {
                    tracing::warn!(component = %component.name(), phase = %phase, error = %e, "teardown phase failed");
                    errors.push(format!("{}: {}", component.name(), e));
                }
            }
        }
        errors
    }
}
