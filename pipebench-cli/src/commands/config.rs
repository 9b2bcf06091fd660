//! `pipebench config` command handler

use std::io::Write;
use std::path::PathBuf;

use serde::Serialize;
use tracing::info;

use pipebench_core::config::PipebenchConfig;

use crate::cli::ConfigAction;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `config` command.
///
/// `loaded` is the already-resolved configuration, kept as a `Result` so
/// `validate` can report the failure instead of aborting before rendering.
pub fn execute(
    action: &ConfigAction,
    source: Option<PathBuf>,
    loaded: Result<PipebenchConfig, CliError>,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    let source = source
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "(defaults)".to_owned());

    match action {
        ConfigAction::Validate => {
            info!(source = %source, "validating configuration");
            let report = ConfigValidationReport {
                valid: loaded.is_ok(),
                errors: loaded.as_ref().err().map(ToString::to_string).into_iter().collect(),
                source,
            };
            writer.render(&report)?;
            if !report.valid {
                return Err(CliError::Config("configuration is invalid".to_owned()));
            }
            Ok(())
        }
        ConfigAction::Show => {
            let config = loaded?;
            let config_toml = toml::to_string_pretty(&config)
                .map_err(|e| CliError::Config(format!("failed to serialize configuration: {e}")))?;
            writer.render(&ConfigReport {
                source,
                config_toml,
            })
        }
    }
}

/// Configuration validation result.
#[derive(Debug, Serialize)]
pub struct ConfigValidationReport {
    pub source: String,
    pub valid: bool,
    pub errors: Vec<String>,
}

impl Render for ConfigValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.valid {
            writeln!(w, "Configuration is valid: {}", self.source)?;
        } else {
            writeln!(w, "Configuration is invalid: {}", self.source)?;
            for error in &self.errors {
                writeln!(w, "  - {error}")?;
            }
        }
        Ok(())
    }
}

/// Effective configuration rendered as TOML.
#[derive(Debug, Serialize)]
pub struct ConfigReport {
    pub source: String,
    pub config_toml: String,
}

impl Render for ConfigReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "# source: {}", self.source)?;
        write!(w, "{}", self.config_toml)
    }
}
