//! `pipebench validate` command handler
//!
//! Loads the suite document and builds every plugin instance it references,
//! without starting any component.

use std::io::Write;
use std::path::Path;

use serde::Serialize;
use tracing::info;

use pipebench_core::error::PipebenchError;
use pipebench_core::loader::{SuiteDefinition, load_suite_file};
use pipebench_core::plugin::with_global;

use crate::cli::ValidateArgs;
use crate::error::CliError;
use crate::output::{OutputWriter, Render};

/// Execute the `validate` command.
///
/// # Errors
///
/// Returns the load error (exit code 2) after rendering the report when the
/// suite cannot be parsed or references an unknown or misconfigured plugin.
pub fn execute(args: &ValidateArgs, writer: &OutputWriter) -> Result<(), CliError> {
    info!(path = %args.suite.display(), "validating suite");

    match check(&args.suite) {
        Ok(report) => {
            writer.render(&report)?;
            Ok(())
        }
        Err(e) => {
            writer.render(&SuiteValidationReport::invalid(&args.suite, &e))?;
            Err(e.into())
        }
    }
}

fn check(path: &Path) -> Result<SuiteValidationReport, PipebenchError> {
    let definition = load_suite_file(path)?;
    with_global(|registries| definition.build(registries))?;
    Ok(SuiteValidationReport::valid(path, &definition))
}

/// Outcome of suite validation.
#[derive(Debug, Serialize)]
pub struct SuiteValidationReport {
    pub source: String,
    pub valid: bool,
    pub suite: Option<String>,
    pub components: usize,
    pub scenarios: usize,
    pub steps: usize,
    pub errors: Vec<String>,
}

impl SuiteValidationReport {
    fn valid(path: &Path, definition: &SuiteDefinition) -> Self {
        Self {
            source: path.display().to_string(),
            valid: true,
            suite: Some(definition.name.clone()),
            components: definition.components.len(),
            scenarios: definition.scenarios.len(),
            steps: definition.scenarios.iter().map(|s| s.steps.len()).sum(),
            errors: Vec::new(),
        }
    }

    fn invalid(path: &Path, error: &PipebenchError) -> Self {
        Self {
            source: path.display().to_string(),
            valid: false,
            suite: None,
            components: 0,
            scenarios: 0,
            steps: 0,
            errors: vec![error.to_string()],
        }
    }
}

impl Render for SuiteValidationReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        if self.valid {
            writeln!(
                w,
                "Suite '{}' is valid ({})",
                self.suite.as_deref().unwrap_or_default(),
                self.source
            )?;
            writeln!(
                w,
                "  components: {}, scenarios: {}, steps: {}",
                self.components, self.scenarios, self.steps
            )?;
        } else {
            writeln!(w, "Suite is invalid ({})", self.source)?;
            for error in &self.errors {
                writeln!(w, "  - {error}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use serial_test::serial;
    use tempfile::TempDir;

    use super::*;

    const SUITE: &str = r#"
name: smoke
scenarios:
  - name: only
    steps:
      - { name: first, action: noop }
      - { name: second, action: noop }
"#;

    #[test]
    #[serial]
    fn valid_suite_counts_elements() {
        pipebench_plugins::load_all_plugins();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("smoke.yaml");
        fs::write(&path, SUITE).unwrap();

        let report = check(&path).unwrap();
        assert!(report.valid);
        assert_eq!(report.suite.as_deref(), Some("smoke"));
        assert_eq!((report.components, report.scenarios, report.steps), (0, 1, 2));
    }

    #[test]
    #[serial]
    fn unknown_action_is_a_load_error() {
        pipebench_plugins::load_all_plugins();
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bad.yaml");
        fs::write(&path, SUITE.replace("action: noop }\n      - { name: second", "action: nope }\n      - { name: second")).unwrap();

        let err = check(&path).unwrap_err();
        assert_eq!(err.kind(), "PluginNotFound");
        assert!(err.is_load_error());

        let mut buf = Vec::new();
        SuiteValidationReport::invalid(&path, &err)
            .render_text(&mut buf)
            .unwrap();
        assert!(String::from_utf8(buf).unwrap().contains("nope"));
    }
}
