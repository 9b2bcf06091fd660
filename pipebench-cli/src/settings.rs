//! Effective configuration: file, then environment, then CLI flags.

use std::path::{Path, PathBuf};

use pipebench_core::config::PipebenchConfig;

use crate::cli::{Cli, Commands};
use crate::error::CliError;

/// Configuration file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_PATH: &str = "pipebench.toml";

/// Where the effective configuration came from.
pub fn config_source(cli: &Cli) -> Option<PathBuf> {
    match &cli.config {
        Some(path) => Some(path.clone()),
        None => {
            let default = Path::new(DEFAULT_CONFIG_PATH);
            default.exists().then(|| default.to_path_buf())
        }
    }
}

/// Load the configuration and apply CLI overrides.
///
/// An explicit `--config` must exist; the default path is optional.
pub fn resolve(cli: &Cli) -> Result<PipebenchConfig, CliError> {
    let mut config = match config_source(cli) {
        Some(path) => {
            PipebenchConfig::load(&path).map_err(|e| CliError::Config(e.to_string()))?
        }
        None => {
            let mut config = PipebenchConfig::default();
            config.apply_env_overrides();
            config
        }
    };

    apply_cli_overrides(&mut config, cli);
    config
        .validate()
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(config)
}

fn apply_cli_overrides(config: &mut PipebenchConfig, cli: &Cli) {
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }
    if let Commands::Run(args) = &cli.command {
        if let Some(path) = &args.telemetry_export {
            config.telemetry.enabled = true;
            config.telemetry.export_path = path.display().to_string();
        }
        if args.metrics {
            config.metrics.enabled = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serial_test::serial;
    use tempfile::TempDir;

    use super::*;
    use crate::cli::parse_from;

    fn cli(args: &[&str]) -> Cli {
        parse_from(args.iter().copied()).unwrap().0
    }

    #[test]
    #[serial]
    fn flags_override_file_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipebench.toml");
        fs::write(&path, "[general]\nlog_level = \"warn\"\nlog_format = \"json\"\n").unwrap();
        let path = path.display().to_string();

        let config = resolve(&cli(&[
            "pipebench",
            "--config",
            &path,
            "--log-level",
            "debug",
            "run",
            "suite.yaml",
            "--telemetry-export",
            "spans.jsonl",
        ]))
        .unwrap();

        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.general.log_format, "json");
        assert!(config.telemetry.enabled);
        assert_eq!(config.telemetry.export_path, "spans.jsonl");
        assert!(!config.metrics.enabled);
    }

    #[test]
    #[serial]
    fn explicit_missing_config_is_an_error() {
        let err = resolve(&cli(&[
            "pipebench",
            "--config",
            "/nonexistent/pipebench.toml",
            "plugins",
        ]))
        .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    #[serial]
    fn invalid_override_fails_validation() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("pipebench.toml");
        fs::write(&path, "").unwrap();
        let path = path.display().to_string();

        let err = resolve(&cli(&[
            "pipebench",
            "--config",
            &path,
            "--log-format",
            "xml",
            "plugins",
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("log_format"));
    }
}
