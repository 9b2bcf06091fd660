//! 훅: 생명주기 지점에 붙는 사용자 코드와 에러 정책 설정
//!
//! 훅은 [`HookStrategy`] 구현과 [`HookStrategyConfig`]로 구성됩니다.
//! 실행 자체는 [`crate::policy::run_hooks`]가 담당하며, 훅마다 자식 컨텍스트를
//! 만들고 [`OnErrorConfig`]에 따라 재시도/계속 여부를 결정합니다.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::component::ComponentPhase;
use crate::context::ExecutionContext;
use crate::error::{ConfigError, PipebenchError};

// ─── Phases ──────────────────────────────────────────────────────────

/// 스위트/시나리오/스텝 경계의 훅 지점
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameworkPhase {
    BeforeSuite,
    AfterSuite,
    BeforeScenario,
    AfterScenario,
    BeforeStep,
    AfterStep,
}

impl FrameworkPhase {
    /// 모든 프레임워크 페이즈
    pub const ALL: [FrameworkPhase; 6] = [
        Self::BeforeSuite,
        Self::AfterSuite,
        Self::BeforeScenario,
        Self::AfterScenario,
        Self::BeforeStep,
        Self::AfterStep,
    ];

    /// 문자열 값
    pub fn value(self) -> &'static str {
        match self {
            Self::BeforeSuite => "before_suite",
            Self::AfterSuite => "after_suite",
            Self::BeforeScenario => "before_scenario",
            Self::AfterScenario => "after_scenario",
            Self::BeforeStep => "before_step",
            Self::AfterStep => "after_step",
        }
    }
}

impl fmt::Display for FrameworkPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

impl FromStr for FrameworkPhase {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.value() == s)
            .ok_or_else(|| ConfigError::InvalidValue {
                field: "phase".to_owned(),
                reason: format!("unknown framework phase '{s}'"),
            })
    }
}

/// 훅이 붙을 수 있는 모든 지점
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HookPhase {
    /// 컴포넌트 생명주기 페이즈
    Component(ComponentPhase),
    /// 프레임워크 요소 경계
    Framework(FrameworkPhase),
}

impl HookPhase {
    /// 문자열 값 (`test.ctx.phase` 메타데이터에 기록)
    pub fn value(self) -> &'static str {
        match self {
            Self::Component(phase) => phase.value(),
            Self::Framework(phase) => phase.value(),
        }
    }
}

impl fmt::Display for HookPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.value())
    }
}

impl From<ComponentPhase> for HookPhase {
    fn from(phase: ComponentPhase) -> Self {
        Self::Component(phase)
    }
}

impl From<FrameworkPhase> for HookPhase {
    fn from(phase: FrameworkPhase) -> Self {
        Self::Framework(phase)
    }
}

// ─── Error policy ────────────────────────────────────────────────────

/// 실패 처리 정책
///
/// 총 시도 횟수는 `retries + 1`입니다. 모든 시도가 실패하면 `continue`가
/// 참일 때 실패를 기록만 하고 진행하며, 거짓이면 호출자에게 전파합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OnErrorConfig {
    /// 추가 시도 횟수
    pub retries: u32,
    /// 실패 후 계속 진행 여부
    #[serde(rename = "continue")]
    pub continue_: bool,
    /// 시도 사이 대기 시간 (초)
    pub retry_delay_seconds: f64,
}

impl Default for OnErrorConfig {
    fn default() -> Self {
        Self {
            retries: 0,
            continue_: false,
            retry_delay_seconds: 0.0,
        }
    }
}

impl OnErrorConfig {
    /// 재시도 없이 실패를 무시하는 정책
    pub fn continue_on_error() -> Self {
        Self {
            continue_: true,
            ..Self::default()
        }
    }

    /// 총 시도 횟수
    pub fn attempts(&self) -> u32 {
        self.retries.saturating_add(1)
    }

    /// 시도 사이 대기 시간
    ///
    /// [`validate`](Self::validate)를 통과한 설정에서만 의미가 있습니다.
    pub fn retry_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_delay_seconds).unwrap_or_default()
    }

    /// 설정 값을 검증합니다.
    ///
    /// 대기 시간은 음수가 아니고 [`Duration`]으로 표현 가능해야 합니다.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Duration::try_from_secs_f64(self.retry_delay_seconds).map_err(|e| ConfigError::InvalidValue {
            field: "on_error.retry_delay_seconds".to_owned(),
            reason: format!(
                "must be a non-negative number of seconds within range, got {}: {e}",
                self.retry_delay_seconds
            ),
        })?;
        Ok(())
    }
}

/// 훅 공통 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookStrategyConfig {
    /// 실패 처리 정책
    pub on_error: OnErrorConfig,
}

// ─── Hook ────────────────────────────────────────────────────────────

/// 훅 동작
///
/// 훅 자신의 실행 컨텍스트를 받습니다. 부모 요소는
/// [`ExecutionContext::get_framework_element`]로 찾을 수 있습니다.
pub trait HookStrategy: Send + Sync {
    /// 훅을 실행합니다.
    fn on_execute(&self, ctx: &ExecutionContext) -> Result<(), PipebenchError>;
}

impl<F> HookStrategy for F
where
    F: Fn(&ExecutionContext) -> Result<(), PipebenchError> + Send + Sync,
{
    fn on_execute(&self, ctx: &ExecutionContext) -> Result<(), PipebenchError> {
        self(ctx)
    }
}

/// 이름과 정책이 붙은 훅
///
/// 복제본은 같은 전략 인스턴스를 공유합니다.
#[derive(Clone)]
pub struct Hook {
    name: String,
    config: HookStrategyConfig,
    strategy: Arc<dyn HookStrategy>,
}

impl Hook {
    /// 훅을 생성합니다.
    pub fn new(
        name: impl Into<String>,
        config: HookStrategyConfig,
        strategy: Arc<dyn HookStrategy>,
    ) -> Self {
        Self {
            name: name.into(),
            config,
            strategy,
        }
    }

    /// 클로저로 훅을 생성합니다.
    pub fn from_fn<F>(name: impl Into<String>, config: HookStrategyConfig, f: F) -> Self
    where
        F: Fn(&ExecutionContext) -> Result<(), PipebenchError> + Send + Sync + 'static,
    {
        Self::new(name, config, Arc::new(f))
    }

    /// 훅 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 훅 설정
    pub fn config(&self) -> &HookStrategyConfig {
        &self.config
    }

    /// 에러 정책
    pub fn on_error(&self) -> &OnErrorConfig {
        &self.config.on_error
    }

    /// 훅 동작을 한 번 실행합니다.
    pub fn execute(&self, ctx: &ExecutionContext) -> Result<(), PipebenchError> {
        tracing::debug!(hook = %self.name, context = %ctx.name(), "executing hook");
        self.strategy.on_execute(ctx)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hook")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// 페이즈별 훅 목록 (페이즈 안에서는 등록 순서 유지)
pub type HookMap<P> = BTreeMap<P, Vec<Hook>>;
