//! `pipebench run` command handler

use std::io::Write;
use std::sync::Arc;

use clap::ArgMatches;
use serde::Serialize;
use tracing::{error, info, warn};

use pipebench_core::args::ARG_MATCHES_NAMESPACE;
use pipebench_core::config::PipebenchConfig;
use pipebench_core::context::{ContextSnapshot, ExecutionStatus};
use pipebench_core::error::{CapturedError, PipebenchError};
use pipebench_core::loader::load_suite_file;
use pipebench_core::plugin::{Registries, with_global};
use pipebench_core::suite::SuiteReport;
use pipebench_core::telemetry::{
    JsonLinesClient, MeterProvider, MetricsMeterProvider, NoopClient, NoopMeterProvider, NoopTracerProvider,
    RecordingTracerProvider, TelemetryRuntime,
};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::metrics_server;
use crate::output::{OutputWriter, Render};

/// Execute the `run` command.
///
/// The suite runs on a blocking thread. The first Ctrl-C cancels the suite:
/// the current step finishes, remaining work is skipped and components are
/// torn down before the command returns [`CliError::Interrupted`]. A second
/// Ctrl-C abandons the teardown.
pub async fn execute(
    args: RunArgs,
    config: &PipebenchConfig,
    run_matches: ArgMatches,
    writer: &OutputWriter,
) -> Result<(), CliError> {
    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)
            .map_err(|e| CliError::Init(e.to_string()))?;
        metrics_server::record_process_gauges(&with_global(Registries::counts));
    }

    info!(path = %args.suite.display(), "loading suite");
    let definition = load_suite_file(&args.suite).map_err(PipebenchError::from)?;
    let mut suite = with_global(|registries| definition.build(registries))?;
    suite
        .process_runtime()
        .set(ARG_MATCHES_NAMESPACE, run_matches);

    let telemetry = Arc::new(telemetry_runtime(config));
    let suite_name = suite.name().to_owned();
    let cancel = suite.cancel_token();
    let run_telemetry = Arc::clone(&telemetry);
    let mut handle = tokio::task::spawn_blocking(move || suite.run(run_telemetry));

    let mut interrupted = false;
    let joined = tokio::select! {
        joined = &mut handle => joined,
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!(suite = %suite_name, "interrupt received, tearing down after the current step");
            cancel.cancel();
            interrupted = true;
            tokio::select! {
                joined = &mut handle => joined,
                Ok(()) = tokio::signal::ctrl_c() => {
                    warn!(suite = %suite_name, "second interrupt received, abandoning teardown");
                    return Err(CliError::Interrupted(suite_name));
                }
            }
        }
    };
    let report = joined.map_err(|e| CliError::SuiteFailed {
        suite: suite_name.clone(),
        reason: format!("runner thread failed: {e}"),
    })?;

    let flushed = telemetry.flush();
    let spans_exported = match &flushed {
        Ok(count) => {
            if telemetry.is_enabled() {
                info!(spans = count, path = %config.telemetry.export_path, "spans exported");
            }
            *count
        }
        Err(e) => {
            error!(error = %e, "failed to export spans");
            0
        }
    };

    let payload = RunReport::new(&report, spans_exported);
    writer.render(&payload)?;

    if interrupted {
        return Err(CliError::Interrupted(suite_name));
    }
    if !payload.success {
        let reason = match &report.error {
            Some(e) => e.to_string(),
            None => format!("{} teardown error(s)", report.teardown_errors.len()),
        };
        return Err(CliError::SuiteFailed {
            suite: suite_name,
            reason,
        });
    }
    flushed?;
    Ok(())
}

/// Build the telemetry runtime for the effective configuration.
///
/// Spans are recorded only with `[telemetry] enabled`; metrics go through the
/// `metrics` facade only with `[metrics] enabled`.
pub fn telemetry_runtime(config: &PipebenchConfig) -> TelemetryRuntime {
    let tracing_on = config.telemetry.enabled;
    let metrics_on = config.metrics.enabled;
    if !tracing_on && !metrics_on {
        return TelemetryRuntime::disabled();
    }

    if tracing_on {
        TelemetryRuntime::new(
            Arc::new(RecordingTracerProvider::new()),
            meter_provider(metrics_on),
            Arc::new(JsonLinesClient::new(&config.telemetry.export_path)),
        )
    } else {
        TelemetryRuntime::new(
            Arc::new(NoopTracerProvider),
            meter_provider(metrics_on),
            Arc::new(NoopClient),
        )
    }
}

fn meter_provider(metrics_on: bool) -> Arc<dyn MeterProvider> {
    if metrics_on {
        Arc::new(MetricsMeterProvider)
    } else {
        Arc::new(NoopMeterProvider)
    }
}

/// Result of a suite run.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub suite: String,
    pub status: ExecutionStatus,
    pub success: bool,
    pub error: Option<CapturedError>,
    pub teardown_errors: Vec<String>,
    /// Contexts in `Error` state, tolerated failures included
    pub failed_contexts: usize,
    pub spans_exported: usize,
    pub context: ContextSnapshot,
}

impl RunReport {
    pub fn new(report: &SuiteReport, spans_exported: usize) -> Self {
        let context = report.snapshot();
        Self {
            suite: context.name.clone(),
            status: context.status,
            success: report.is_success(),
            error: report.error.as_ref().map(CapturedError::from_error),
            teardown_errors: report.teardown_errors.clone(),
            failed_contexts: context.error_count(),
            spans_exported,
            context,
        }
    }
}

impl Render for RunReport {
    fn render_text(&self, w: &mut dyn Write) -> std::io::Result<()> {
        writeln!(w, "Suite: {}", self.suite)?;
        writeln!(w, "Status: {}", self.status)?;
        if let Some(error) = &self.error {
            writeln!(w, "Error: {}: {}", error.kind, error.message)?;
        }
        for teardown in &self.teardown_errors {
            writeln!(w, "Teardown error: {teardown}")?;
        }
        writeln!(w, "Failed contexts: {}", self.failed_contexts)?;
        if self.spans_exported > 0 {
            writeln!(w, "Spans exported: {}", self.spans_exported)?;
        }
        writeln!(w)?;
        render_tree(&self.context, 0, w)
    }
}

fn render_tree(node: &ContextSnapshot, depth: usize, w: &mut dyn Write) -> std::io::Result<()> {
    let indent = "  ".repeat(depth);
    write!(w, "{indent}[{}] {} {}", node.kind, node.name, node.status)?;
    match &node.error {
        Some(error) => writeln!(w, " ({}: {})", error.kind, error.message)?,
        None => writeln!(w)?,
    }
    for child in &node.children {
        render_tree(child, depth + 1, w)?;
    }
    Ok(())
}
