//! pipebench.toml 통합 설정 테스트
//!
//! - pipebench.toml.example 파싱 테스트
//! - 환경변수 우선순위 테스트
//! - 잘못된 형식 에러 테스트

use pipebench_core::config::PipebenchConfig;
use pipebench_core::error::{ConfigError, PipebenchError};
use serial_test::serial;

#[test]
fn example_config_parses_and_validates() {
    let content = include_str!("../../../pipebench.toml.example");
    let config = PipebenchConfig::parse(content).expect("example config should parse");
    config.validate().expect("example config should pass validation");

    assert_eq!(config.general.log_level, "info");
    assert_eq!(config.general.log_format, "pretty");
    assert!(!config.telemetry.enabled);
    assert_eq!(config.metrics.port, 9464);
}

#[test]
fn example_config_matches_defaults() {
    let content = include_str!("../../../pipebench.toml.example");
    let parsed = PipebenchConfig::parse(content).unwrap();
    let defaults = PipebenchConfig::default();
    assert_eq!(parsed.telemetry.export_path, defaults.telemetry.export_path);
    assert_eq!(parsed.metrics.listen_addr, defaults.metrics.listen_addr);
    assert_eq!(parsed.metrics.endpoint, defaults.metrics.endpoint);
}

#[test]
#[serial]
fn env_overrides_win_over_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipebench.toml");
    std::fs::write(&path, "[metrics]\nenabled = true\nport = 9100\n").unwrap();

    // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
    unsafe { std::env::set_var("PIPEBENCH_METRICS_PORT", "9300") };
    let config = PipebenchConfig::load(&path);
    unsafe { std::env::remove_var("PIPEBENCH_METRICS_PORT") };

    let config = config.unwrap();
    assert!(config.metrics.enabled);
    assert_eq!(config.metrics.port, 9300);
}

#[test]
#[serial]
fn invalid_env_override_is_rejected_by_validation() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pipebench.toml");
    std::fs::write(&path, "").unwrap();

    // SAFETY: serial 테스트에서만 환경변수를 조작합니다.
    unsafe { std::env::set_var("PIPEBENCH_GENERAL_LOG_FORMAT", "xml") };
    let result = PipebenchConfig::load(&path);
    unsafe { std::env::remove_var("PIPEBENCH_GENERAL_LOG_FORMAT") };

    assert!(matches!(
        result,
        Err(PipebenchError::Config(ConfigError::InvalidValue { ref field, .. }))
            if field == "general.log_format"
    ));
}

#[test]
fn metrics_port_type_mismatch_fails() {
    let err = PipebenchConfig::parse("[metrics]\nport = \"high\"\n").unwrap_err();
    assert!(matches!(
        err,
        PipebenchError::Config(ConfigError::ParseFailed { .. })
    ));
}
