//! 컴포넌트 생명주기 상태 머신
//!
//! 테스트 대상 프로세스(수집기, 부하 생성기, 백엔드)는 [`Component`]로 표현됩니다.
//! 엔진은 [`ComponentHandle`]로 컴포넌트를 감싸 페이즈별 훅, 런타임 저장소,
//! 페이즈 정책을 붙이고 전환 순서를 검증합니다.
//!
//! # 페이즈 순서
//! ```text
//! configure → deploy → start → start_monitoring → stop_monitoring
//!           → collect_monitoring_data → stop → destroy
//! ```
//! - `stop`은 `start` 이후 언제든 허용 (모니터링 생략 가능)
//! - `destroy`는 언제든 허용 (부분 배포 정리)
//! - `destroy` 이후에는 `configure`부터 다시 시작할 수 있음

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::context::{ExecutionContext, TRACER_NAME};
use crate::error::{CapturedError, ConfigError, ContractError, PipebenchError};
use crate::hook::{Hook, HookMap, OnErrorConfig};
use crate::metrics as m;
use crate::policy;
use crate::runtime::Runtime;

// ─── ComponentPhase ──────────────────────────────────────────────────

/// 컴포넌트 생명주기 페이즈 (선언 순서 = 정상 실행 순서)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentPhase {
    Configure,
    Deploy,
    Start,
    StartMonitoring,
    StopMonitoring,
    CollectMonitoringData,
    Stop,
    Destroy,
}

impl ComponentPhase {
    /// 정상 실행 순서의 모든 페이즈
    pub const ALL: [ComponentPhase; 8] = [
        Self::Configure,
        Self::Deploy,
        Self::Start,
        Self::StartMonitoring,
        Self::StopMonitoring,
        Self::CollectMonitoringData,
        Self::Stop,
        Self::Destroy,
    ];

    /// 문자열 값
    pub fn value(self) -> &'static str {
        match self {
            Self::Configure => "configure",
            Self::Deploy => "deploy",
            Self::Start => "start",
            Self::StartMonitoring => "start_monitoring",
            Self::StopMonitoring => "stop_monitoring",
            Self::CollectMonitoringData => "collect_monitoring_data",
            Self::Stop => "stop",
            Self::Destroy => "destroy",
        }
    }

    /// 정상 순서에서 다음 페이즈
    pub fn next(self) -> Option<Self> {
        let idx = Self::ALL.iter().position(|p| *p == self)?;
        Self::ALL.get(idx + 1).copied()
    }
}

impl fmt::Display for ComponentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

impl FromStr for ComponentPhase {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.value() == s)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "phase".to_owned(),
                reason: format!("unknown component phase '{s}'"),
            })
    }
}

// ─── Component trait ─────────────────────────────────────────────────

/// 페이즈 연산에 전달되는 환경
pub struct PhaseEnv<'a> {
    /// 이 페이즈 실행의 컨텍스트
    pub ctx: &'a ExecutionContext,
    /// 컴포넌트 런타임 저장소
    pub runtime: &'a Arc<Runtime>,
}

/// 테스트 컴포넌트
///
/// 여덟 개 페이즈 연산은 모두 필수이며 기본 구현이 없습니다.
/// 동적으로 조립되는 컴포넌트는 [`ComponentBuilder`]를 사용합니다.
pub trait Component: Send + Sync {
    /// 컴포넌트 이름
    fn name(&self) -> &str;

    fn configure(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError>;

    fn deploy(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError>;

    fn start(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError>;

    fn start_monitoring(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError>;

    fn stop_monitoring(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError>;

    fn collect_monitoring_data(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError>;

    fn stop(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError>;

    fn destroy(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError>;
}

fn dispatch(
    component: &mut dyn Component,
    phase: ComponentPhase,
    env: &PhaseEnv<'_>,
) -> Result<(), PipebenchError> {
    match phase {
        ComponentPhase::Configure => component.configure(env),
        ComponentPhase::Deploy => component.deploy(env),
        ComponentPhase::Start => component.start(env),
        ComponentPhase::StartMonitoring => component.start_monitoring(env),
        ComponentPhase::StopMonitoring => component.stop_monitoring(env),
        ComponentPhase::CollectMonitoringData => component.collect_monitoring_data(env),
        ComponentPhase::Stop => component.stop(env),
        ComponentPhase::Destroy => component.destroy(env),
    }
}

/// 제공된 페이즈 집합이 완전한지 검사합니다.
///
/// 누락된 페이즈를 모두 나열한 `ContractError::Violation`을 반환합니다.
pub fn require_all_phases(
    component: &str,
    provided: &BTreeSet<ComponentPhase>,
) -> Result<(), ContractError> {
    let missing: Vec<String> = ComponentPhase::ALL
        .into_iter()
        .filter(|p| !provided.contains(p))
        .map(|p| p.value().to_owned())
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ContractError::Violation {
            component: component.to_owned(),
            missing,
        })
    }
}

// ─── ComponentBuilder ────────────────────────────────────────────────

type PhaseFn = Box<dyn FnMut(&PhaseEnv<'_>) -> Result<(), PipebenchError> + Send + Sync>;

/// 페이즈마다 클로저를 붙여 컴포넌트를 조립하는 빌더
///
/// `build()`는 여덟 페이즈가 모두 채워졌을 때만 성공합니다.
pub struct ComponentBuilder {
    name: String,
    ops: BTreeMap<ComponentPhase, PhaseFn>,
}

impl ComponentBuilder {
    /// 빈 빌더를 생성합니다.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ops: BTreeMap::new(),
        }
    }

    /// 페이즈 연산을 지정합니다. 같은 페이즈를 다시 지정하면 교체됩니다.
    pub fn on<F>(mut self, phase: ComponentPhase, op: F) -> Self
    where
        F: FnMut(&PhaseEnv<'_>) -> Result<(), PipebenchError> + Send + Sync + 'static,
    {
        self.ops.insert(phase, Box::new(op));
        self
    }

    /// 컴포넌트를 생성합니다.
    pub fn build(self) -> Result<FnComponent, ContractError> {
        let provided: BTreeSet<ComponentPhase> = self.ops.keys().copied().collect();
        require_all_phases(&self.name, &provided)?;
        Ok(FnComponent {
            name: self.name,
            ops: self.ops,
        })
    }
}

/// [`ComponentBuilder`]가 만든 컴포넌트
pub struct FnComponent {
    name: String,
    ops: BTreeMap<ComponentPhase, PhaseFn>,
}

impl FnComponent {
    fn call(&mut self, phase: ComponentPhase, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        match self.ops.get_mut(&phase) {
            Some(op) => op(env),
            None => Err(ContractError::Violation {
                component: self.name.clone(),
                missing: vec![phase.value().to_owned()],
            }
            .into()),
        }
    }
}

impl Component for FnComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn configure(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        self.call(ComponentPhase::Configure, env)
    }

    fn deploy(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        self.call(ComponentPhase::Deploy, env)
    }

    fn start(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        self.call(ComponentPhase::Start, env)
    }

    fn start_monitoring(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        self.call(ComponentPhase::StartMonitoring, env)
    }

    fn stop_monitoring(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        self.call(ComponentPhase::StopMonitoring, env)
    }

    fn collect_monitoring_data(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        self.call(ComponentPhase::CollectMonitoringData, env)
    }

    fn stop(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        self.call(ComponentPhase::Stop, env)
    }

    fn destroy(&mut self, env: &PhaseEnv<'_>) -> Result<(), PipebenchError> {
        self.call(ComponentPhase::Destroy, env)
    }
}

// ─── ComponentHandle ─────────────────────────────────────────────────

/// 엔진이 관리하는 컴포넌트 래퍼
///
/// 페이즈별 훅, 컴포넌트 런타임 저장소, 페이즈 정책, 전환 이력을 보관합니다.
pub struct ComponentHandle {
    component: Box<dyn Component>,
    hooks: HookMap<ComponentPhase>,
    runtime: Arc<Runtime>,
    phase_policy: OnErrorConfig,
    last_phase: Option<ComponentPhase>,
    attempted: BTreeSet<ComponentPhase>,
}

impl ComponentHandle {
    /// 컴포넌트를 감쌉니다. 페이즈 정책 기본값은 fail-fast입니다.
    pub fn new(component: Box<dyn Component>) -> Self {
        Self {
            component,
            hooks: BTreeMap::new(),
            runtime: Arc::new(Runtime::new()),
            phase_policy: OnErrorConfig::default(),
            last_phase: None,
            attempted: BTreeSet::new(),
        }
    }

    /// 페이즈 연산에 적용할 정책을 지정합니다.
    pub fn with_phase_policy(mut self, policy: OnErrorConfig) -> Self {
        self.phase_policy = policy;
        self
    }

    /// 컴포넌트 이름
    pub fn name(&self) -> &str {
        self.component.name()
    }

    /// 컴포넌트 런타임 저장소
    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// 마지막으로 성공한 페이즈
    pub fn last_phase(&self) -> Option<ComponentPhase> {
        self.last_phase
    }

    /// 페이즈가 한 번이라도 시도되었는지 확인합니다 (실패 포함).
    pub fn was_attempted(&self, phase: ComponentPhase) -> bool {
        self.attempted.contains(&phase)
    }

    /// 페이즈에 훅을 추가합니다. 같은 페이즈의 훅은 등록 순서대로 실행됩니다.
    pub fn add_hook(&mut self, phase: ComponentPhase, hook: Hook) {
        self.hooks.entry(phase).or_default().push(hook);
    }

    /// 페이즈에 등록된 훅 목록
    pub fn hooks(&self, phase: ComponentPhase) -> &[Hook] {
        self.hooks.get(&phase).map(Vec::as_slice).unwrap_or_default()
    }

    /// 페이즈 전환이 허용되는지 검사합니다.
    pub fn check_transition(&self, phase: ComponentPhase) -> Result<(), ContractError> {
        let allowed = match phase {
            ComponentPhase::Destroy => true,
            ComponentPhase::Stop => self
                .last_phase
                .is_some_and(|p| p >= ComponentPhase::Start && p < ComponentPhase::Stop),
            _ => {
                let expected = match self.last_phase {
                    None | Some(ComponentPhase::Destroy) => Some(ComponentPhase::Configure),
                    Some(last) => last.next(),
                };
                expected == Some(phase)
            }
        };

        if allowed {
            Ok(())
        } else {
            Err(ContractError::InvalidTransition {
                component: self.name().to_owned(),
                from: self
                    .last_phase
                    .map_or_else(|| "initial".to_owned(), |p| p.value().to_owned()),
                to: phase.value().to_owned(),
            })
        }
    }

    /// 페이즈의 훅을 `parent` 아래에서 실행합니다.
    pub fn run_hooks(
        &self,
        phase: ComponentPhase,
        parent: &Arc<ExecutionContext>,
    ) -> Result<(), PipebenchError> {
        policy::run_hooks(self.hooks(phase), phase.into(), parent)
    }

    /// 페이즈를 실행합니다.
    ///
    /// `parent` 아래에 페이즈 컨텍스트를 만들고, 훅을 모두 실행한 뒤
    /// 페이즈 정책으로 컴포넌트 연산을 실행합니다. 실패는 롤백 없이 전파됩니다.
    pub fn run_phase(
        &mut self,
        phase: ComponentPhase,
        parent: &Arc<ExecutionContext>,
    ) -> Result<(), PipebenchError> {
        self.check_transition(phase)?;

        let ctx = parent.component_phase(self.name(), phase);
        ctx.start();
        self.attempted.insert(phase);
        let started = Instant::now();
        tracing::info!(component = %self.name(), phase = %phase, "running component phase");

        let result = self.run_phase_inner(phase, &ctx);

        if let Err(e) = &result {
            // 훅 실패는 훅 컨텍스트에만 기록되어 있으므로 페이즈에도 기록
            if ctx.error().is_none() {
                ctx.mark_error(CapturedError::from_error(e));
            }
        }
        ctx.end();

        let outcome = if result.is_ok() { "success" } else { "failure" };
        ctx.telemetry().meter(TRACER_NAME).record_histogram(
            m::PHASE_DURATION_SECONDS,
            started.elapsed().as_secs_f64(),
            &[
                (m::LABEL_PHASE, phase.value().to_owned()),
                (m::LABEL_RESULT, outcome.to_owned()),
            ],
        );

        if result.is_ok() {
            self.last_phase = Some(phase);
        }
        result
    }

    fn run_phase_inner(
        &mut self,
        phase: ComponentPhase,
        ctx: &Arc<ExecutionContext>,
    ) -> Result<(), PipebenchError> {
        self.run_hooks(phase, ctx)?;

        let operation = format!("{}.{}", self.component.name(), phase);
        let env = PhaseEnv {
            ctx,
            runtime: &self.runtime,
        };
        let component = self.component.as_mut();
        policy::handle_with_policy(
            ctx,
            &operation,
            || dispatch(&mut *component, phase, &env),
            &self.phase_policy,
        )?;
        Ok(())
    }
}

impl fmt::Debug for ComponentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentHandle")
            .field("name", &self.name())
            .field("last_phase", &self.last_phase)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;
    use crate::context::{ContextKind, ExecutionStatus, Metadata, PHASE_METADATA_KEY};
    use crate::error::ExecutionError;
    use crate::hook::HookStrategyConfig;
    use crate::telemetry::TelemetryRuntime;

    fn suite() -> Arc<ExecutionContext> {
        ExecutionContext::suite("s", Metadata::new(), Arc::new(TelemetryRuntime::disabled()))
    }

    fn recording_component(name: &str, log: Arc<Mutex<Vec<String>>>) -> FnComponent {
        let mut builder = ComponentBuilder::new(name);
        for phase in ComponentPhase::ALL {
            let log = Arc::clone(&log);
            builder = builder.on(phase, move |_env| {
                log.lock().unwrap().push(phase.value().to_owned());
                Ok(())
            });
        }
        builder.build().unwrap()
    }

    #[test]
    fn phase_values_and_order() {
        assert_eq!(ComponentPhase::ALL.len(), 8);
        assert_eq!(ComponentPhase::Configure.next(), Some(ComponentPhase::Deploy));
        assert_eq!(ComponentPhase::Destroy.next(), None);
        assert_eq!(
            "collect_monitoring_data".parse::<ComponentPhase>().unwrap(),
            ComponentPhase::CollectMonitoringData
        );
        assert!("teardown".parse::<ComponentPhase>().is_err());
    }

    #[test]
    fn builder_missing_phases_is_contract_violation() {
        let err = ComponentBuilder::new("collector")
            .on(ComponentPhase::Configure, |_| Ok(()))
            .on(ComponentPhase::Start, |_| Ok(()))
            .build()
            .err()
            .unwrap();

        match err {
            ContractError::Violation { component, missing } => {
                assert_eq!(component, "collector");
                assert_eq!(missing.len(), 6);
                assert!(missing.contains(&"deploy".to_owned()));
                assert!(missing.contains(&"destroy".to_owned()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn complete_builder_succeeds() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let component = recording_component("backend", log);
        assert_eq!(component.name(), "backend");
    }

    #[test]
    fn full_lifecycle_runs_in_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut handle = ComponentHandle::new(Box::new(recording_component("c", log.clone())));
        let parent = suite();

        for phase in ComponentPhase::ALL {
            handle.run_phase(phase, &parent).unwrap();
        }

        let expected: Vec<String> = ComponentPhase::ALL
            .iter()
            .map(|p| p.value().to_owned())
            .collect();
        assert_eq!(*log.lock().unwrap(), expected);
        assert_eq!(parent.child_contexts().len(), 8);
        assert!(parent
            .child_contexts()
            .iter()
            .all(|c| c.status() == ExecutionStatus::Success));
        assert_eq!(handle.last_phase(), Some(ComponentPhase::Destroy));
    }

    #[test]
    fn out_of_order_phase_is_rejected() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut handle = ComponentHandle::new(Box::new(recording_component("c", log.clone())));
        let parent = suite();

        let err = handle.run_phase(ComponentPhase::Start, &parent).unwrap_err();
        assert_eq!(err.kind(), "ContractViolation");
        assert!(err.to_string().contains("initial"));
        assert!(log.lock().unwrap().is_empty());
        assert!(parent.child_contexts().is_empty());
    }

    #[test]
    fn stop_allowed_after_start_and_destroy_any_time() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut handle = ComponentHandle::new(Box::new(recording_component("c", log.clone())));
        let parent = suite();

        assert!(handle.check_transition(ComponentPhase::Stop).is_err());
        assert!(handle.check_transition(ComponentPhase::Destroy).is_ok());

        for phase in [
            ComponentPhase::Configure,
            ComponentPhase::Deploy,
            ComponentPhase::Start,
            ComponentPhase::Stop,
            ComponentPhase::Destroy,
            ComponentPhase::Configure,
        ] {
            handle.run_phase(phase, &parent).unwrap();
        }
        assert_eq!(log.lock().unwrap().len(), 6);
    }

    #[test]
    fn add_hook_n_times_runs_n_hook_contexts() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut handle = ComponentHandle::new(Box::new(recording_component("c", log)));
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let hook = Hook::from_fn("count", HookStrategyConfig::default(), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        for _ in 0..3 {
            handle.add_hook(ComponentPhase::Configure, hook.clone());
        }

        let parent = suite();
        handle.run_hooks(ComponentPhase::Configure, &parent).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        let children = parent.child_contexts();
        assert_eq!(children.len(), 3);
        assert!(children.iter().all(|c| {
            matches!(c.kind(), ContextKind::Hook { .. })
                && c.metadata()[PHASE_METADATA_KEY] == "configure"
        }));
        assert_ne!(children[0].id(), children[1].id());
    }

    #[test]
    fn fatal_hook_aborts_phase_operation() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut handle = ComponentHandle::new(Box::new(recording_component("c", log.clone())));
        handle.add_hook(
            ComponentPhase::Configure,
            Hook::from_fn("gate", HookStrategyConfig::default(), |_| {
                Err(ExecutionError::HookFailure {
                    hook: "gate".to_owned(),
                    reason: "closed".to_owned(),
                }
                .into())
            }),
        );
        let parent = suite();

        let err = handle.run_phase(ComponentPhase::Configure, &parent).unwrap_err();
        assert_eq!(err.kind(), "HookFailure");
        assert!(log.lock().unwrap().is_empty());

        let phase_ctx = Arc::clone(&parent.child_contexts()[0]);
        assert_eq!(phase_ctx.status(), ExecutionStatus::Error);
        assert_eq!(phase_ctx.child_contexts()[0].status(), ExecutionStatus::Error);
        assert!(handle.was_attempted(ComponentPhase::Configure));
        assert_eq!(handle.last_phase(), None);
    }

    #[test]
    fn phase_policy_retries_operation() {
        let attempts = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&attempts);
        let mut builder = ComponentBuilder::new("flaky");
        for phase in ComponentPhase::ALL {
            builder = builder.on(phase, |_| Ok(()));
        }
        let component = builder
            .on(ComponentPhase::Configure, move |_| {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(ExecutionError::PhaseFailure {
                        component: "flaky".to_owned(),
                        phase: "configure".to_owned(),
                        reason: "not yet".to_owned(),
                    }
                    .into())
                } else {
                    Ok(())
                }
            })
            .build()
            .unwrap();
        let mut handle = ComponentHandle::new(Box::new(component)).with_phase_policy(OnErrorConfig {
            retries: 1,
            ..OnErrorConfig::default()
        });

        let parent = suite();
        handle.run_phase(ComponentPhase::Configure, &parent).unwrap();
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
        assert_eq!(parent.child_contexts()[0].status(), ExecutionStatus::Success);
    }

    #[test]
    fn phase_operation_sees_component_runtime() {
        let mut builder = ComponentBuilder::new("stateful");
        for phase in ComponentPhase::ALL {
            builder = builder.on(phase, |_| Ok(()));
        }
        let component = builder
            .on(ComponentPhase::Configure, |env| {
                env.runtime.set("stateful.port", 4317_u16);
                Ok(())
            })
            .build()
            .unwrap();
        let mut handle = ComponentHandle::new(Box::new(component));
        handle.run_phase(ComponentPhase::Configure, &suite()).unwrap();

        assert_eq!(
            *handle.runtime().get::<u16>("stateful.port").unwrap().unwrap(),
            4317
        );
    }
}
