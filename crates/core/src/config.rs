//! 설정 관리: pipebench.toml 파싱 및 런타임 설정
//!
//! [`PipebenchConfig`]는 실행기 자체의 설정(로깅, 텔레메트리, 메트릭)을 담습니다.
//! 테스트 스위트 정의는 별도 문서이며 [`crate::loader`]가 읽습니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`PIPEBENCH_METRICS_PORT=9200` 형식)
//! 3. 설정 파일 (`pipebench.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # fn example() -> Result<(), pipebench_core::error::PipebenchError> {
//! use pipebench_core::config::PipebenchConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = PipebenchConfig::load("pipebench.toml")?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = PipebenchConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, PipebenchError};

/// pipebench 통합 설정
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipebenchConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 텔레메트리(스팬 기록) 설정
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl PipebenchConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipebenchError> {
        let mut config = Self::from_file(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, PipebenchError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                PipebenchError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                PipebenchError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, PipebenchError> {
        toml::from_str(toml_str).map_err(|e| {
            PipebenchError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `PIPEBENCH_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "PIPEBENCH_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "PIPEBENCH_GENERAL_LOG_FORMAT");

        // Telemetry
        override_bool(&mut self.telemetry.enabled, "PIPEBENCH_TELEMETRY_ENABLED");
        override_string(
            &mut self.telemetry.export_path,
            "PIPEBENCH_TELEMETRY_EXPORT_PATH",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "PIPEBENCH_METRICS_ENABLED");
        override_string(
            &mut self.metrics.listen_addr,
            "PIPEBENCH_METRICS_LISTEN_ADDR",
        );
        override_u16(&mut self.metrics.port, "PIPEBENCH_METRICS_PORT");
        override_string(&mut self.metrics.endpoint, "PIPEBENCH_METRICS_ENDPOINT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PipebenchError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        if self.telemetry.enabled && self.telemetry.export_path.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "telemetry.export_path".to_owned(),
                reason: "export_path must not be empty when telemetry is enabled".to_owned(),
            }
            .into());
        }

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "metrics.port".to_owned(),
                    reason: "port must be between 1 and 65535".to_owned(),
                }
                .into());
            }
            if !self.metrics.endpoint.starts_with('/') {
                return Err(ConfigError::InvalidValue {
                    field: "metrics.endpoint".to_owned(),
                    reason: "endpoint must start with '/'".to_owned(),
                }
                .into());
            }
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "pretty".to_owned(),
        }
    }
}

/// 텔레메트리 설정
///
/// 활성화하면 실행 컨텍스트의 스팬을 기록하고, 실행 종료 후
/// `export_path`에 JSON lines 형식으로 내보냅니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 스팬 내보내기 파일 경로
    pub export_path: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            export_path: "pipebench-spans.jsonl".to_owned(),
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// HTTP 리스너 주소
    pub listen_addr: String,
    /// HTTP 리스너 포트
    pub port: u16,
    /// 노출 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9464,
            endpoint: "/metrics".to_owned(),
        }
    }
}

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}
