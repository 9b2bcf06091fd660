//! pipebench-core: 텔레메트리 파이프라인 성능 테스트 오케스트레이션 엔진
//!
//! 스위트 → 시나리오 → 스텝 계층을 실행하면서 컴포넌트 생명주기를 구동하고,
//! 모든 실행 단위를 [`context::ExecutionContext`] 트리와 스팬으로 기록합니다.
//!
//! # 구성
//! - [`context`]: 실행 컨텍스트 트리, 메타데이터 상속, 스팬 상관관계
//! - [`policy`]: 재시도/계속 정책 실행기와 훅 실행
//! - [`component`]: 8단계 생명주기 상태 기계
//! - [`suite`]: 스위트/시나리오/스텝 실행과 정리(teardown)
//! - [`plugin`]: 컴포넌트/액션/훅 플러그인 레지스트리
//! - [`loader`]: YAML/TOML 스위트 정의 로더
//! - [`runtime`]: 네임스페이스별 공유 객체 저장소
//! - [`telemetry`]: 트레이서/미터 제공자 추상화와 스팬 인식 로그 레이어
//! - [`config`]: `pipebench.toml` 실행기 설정
//! - [`args`]: 플러그인용 CLI 인자 훅

pub mod action;
pub mod args;
pub mod component;
pub mod config;
pub mod context;
pub mod error;
pub mod hook;
pub mod loader;
pub mod metrics;
pub mod plugin;
pub mod policy;
pub mod runtime;
pub mod suite;
pub mod telemetry;

// --- 주요 타입 re-export ---

// 에러
pub use error::{
    CapturedError, ConfigError, ContractError, ExecutionError, PipebenchError, PluginError,
    RuntimeError, TelemetryError,
};

// 설정
pub use config::PipebenchConfig;

// 실행 모델
pub use action::{StepAction, StepEnv};
pub use component::{Component, ComponentBuilder, ComponentHandle, ComponentPhase, PhaseEnv};
pub use context::{ContextSnapshot, ExecutionContext, ExecutionStatus, Metadata};
pub use hook::{FrameworkPhase, Hook, HookPhase, HookStrategy, HookStrategyConfig, OnErrorConfig};
pub use policy::{handle_with_policy, run_hooks};
pub use suite::{Scenario, Step, Suite, SuiteReport};

// 확장 지점
pub use loader::{SuiteDefinition, SuiteFormat, load_suite_file, parse_suite};
pub use plugin::{PluginRegistry, Registries};
pub use runtime::Runtime;
pub use telemetry::TelemetryRuntime;
