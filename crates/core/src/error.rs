//! 에러 타입: 도메인별 에러 정의
//!
//! [`PipebenchError`]는 엔진 전체의 최상위 에러입니다. 각 도메인 에러는
//! `#[from]` 변환으로 `?` 연산자를 통해 자연스럽게 전파됩니다.
//!
//! 컨텍스트 트리에는 에러 자체가 아니라 [`CapturedError`] 스냅샷이 기록됩니다.
//! 원본 에러는 호출자에게 그대로 전파되고, 스냅샷은 `kind()` 문자열과
//! 메시지, 원인 체인을 보존합니다.

use std::error::Error as StdError;
use std::fmt;

use serde::{Deserialize, Serialize};

/// pipebench 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum PipebenchError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 플러그인 레지스트리 에러
    #[error("plugin error: {0}")]
    Plugin(#[from] PluginError),

    /// 컴포넌트 계약 위반
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),

    /// 훅/페이즈/스텝 실행 에러
    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// 런타임 저장소 에러
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),

    /// 텔레메트리 에러
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipebenchError {
    /// 컨텍스트에 기록되는 에러 종류 이름을 반환합니다.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "ConfigError",
            Self::Plugin(PluginError::NotFound { .. }) => "PluginNotFound",
            Self::Plugin(_) => "PluginError",
            Self::Contract(_) => "ContractViolation",
            Self::Execution(ExecutionError::HookFailure { .. }) => "HookFailure",
            Self::Execution(ExecutionError::PhaseFailure { .. }) => "PhaseFailure",
            Self::Execution(ExecutionError::StepFailure { .. }) => "StepFailure",
            Self::Execution(ExecutionError::RetryExhausted { .. }) => "RetryExhausted",
            Self::Execution(ExecutionError::Interrupted { .. }) => "Interrupted",
            Self::Runtime(_) => "RuntimeError",
            Self::Telemetry(_) => "TelemetryError",
            Self::Io(_) => "IoError",
        }
    }

    /// 설정/로딩 단계에서 발생한 에러인지 확인합니다.
    pub fn is_load_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Plugin(_) | Self::Contract(ContractError::Violation { .. }))
    }
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 플러그인 레지스트리 에러
#[derive(Debug, thiserror::Error)]
pub enum PluginError {
    /// 등록되지 않은 플러그인 이름
    #[error("{kind} plugin not found: {name}")]
    NotFound { kind: String, name: String },

    /// 플러그인 설정 역직렬화 실패
    #[error("invalid config for {kind} plugin '{name}': {reason}")]
    InvalidConfig {
        kind: String,
        name: String,
        reason: String,
    },
}

/// 컴포넌트 계약 위반
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    /// 필수 페이즈 구현 누락
    #[error("component '{component}' is missing required phase operations: {}", .missing.join(", "))]
    Violation {
        component: String,
        missing: Vec<String>,
    },

    /// 허용되지 않는 페이즈 전환
    #[error("component '{component}' cannot run phase '{to}' after '{from}'")]
    InvalidTransition {
        component: String,
        from: String,
        to: String,
    },
}

/// 사용자 코드(훅, 페이즈, 스텝) 실행 에러
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    /// 훅 실행 실패
    #[error("hook '{hook}' failed: {reason}")]
    HookFailure { hook: String, reason: String },

    /// 컴포넌트 페이즈 실행 실패
    #[error("phase '{phase}' of component '{component}' failed: {reason}")]
    PhaseFailure {
        component: String,
        phase: String,
        reason: String,
    },

    /// 스텝 액션 실행 실패
    #[error("step '{step}' failed: {reason}")]
    StepFailure { step: String, reason: String },

    /// 재시도 소진: 마지막 실패를 원인으로 보존
    #[error("'{operation}' failed after {attempts} attempts: {source}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<PipebenchError>,
    },

    /// 취소 요청으로 남은 작업을 건너뜀
    #[error("suite '{suite}' was interrupted before {next}")]
    Interrupted { suite: String, next: String },
}

/// 런타임 저장소 에러
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    /// 네임스페이스에 저장된 값의 타입이 요청과 다름
    #[error("namespace '{namespace}' does not hold a value of type {expected}")]
    TypeMismatch {
        namespace: String,
        expected: &'static str,
    },
}

/// 텔레메트리 에러
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// 스팬 내보내기 실패
    #[error("span export failed: {0}")]
    Export(String),

    /// 로깅/추적 구독자 설치 실패
    #[error("subscriber init failed: {0}")]
    SubscriberInit(String),
}

/// 컨텍스트에 기록되는 실패 스냅샷
///
/// 에러 종류, 메시지, 원인 체인(최상위 제외)을 보존합니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedError {
    /// 에러 종류 (예: `"HookFailure"`)
    pub kind: String,
    /// 사람이 읽을 수 있는 메시지
    pub message: String,
    /// 원인 체인 (가장 가까운 원인부터)
    pub cause: Vec<String>,
}

impl CapturedError {
    /// 임의의 에러 종류와 메시지로 스냅샷을 만듭니다.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
            cause: Vec::new(),
        }
    }

    /// 엔진 에러로부터 스냅샷을 만듭니다.
    pub fn from_error(err: &PipebenchError) -> Self {
        let mut cause = Vec::new();
        let mut source = err.source();
        while let Some(inner) = source {
            cause.push(inner.to_string());
            source = inner.source();
        }
        Self {
            kind: err.kind().to_owned(),
            message: err.to_string(),
            cause,
        }
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
