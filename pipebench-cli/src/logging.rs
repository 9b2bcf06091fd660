//! Logging initialization for pipebench.
//!
//! Configures `tracing-subscriber` based on the `[general]` section
//! of `PipebenchConfig`. When telemetry is enabled, the span-aware
//! layer is stacked on top so every log record also lands as a `log`
//! event on the active context span.

use anyhow::Result;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use pipebench_core::config::GeneralConfig;
use pipebench_core::telemetry::SpanEventLayer;

/// Initialize the global tracing subscriber.
///
/// Must be called exactly once, before the suite starts.
///
/// # Arguments
///
/// * `config` - General configuration (log_level, log_format)
/// * `span_events` - Attach [`SpanEventLayer`]
///
/// # Formats
///
/// * `"json"` - Machine-parseable JSON lines
/// * `"pretty"` - Human-readable output (default)
///
/// Logs go to stderr so `--output json` stays parseable on stdout.
pub fn init_tracing(config: &GeneralConfig, span_events: bool) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let span_layer = span_events.then_some(SpanEventLayer);

    match config.log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(span_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("failed to initialize JSON tracing subscriber: {}", e)
                })?;
        }
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(span_layer)
                .with(
                    tracing_subscriber::fmt::layer()
                        .pretty()
                        .with_writer(std::io::stderr),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("failed to initialize pretty tracing subscriber: {}", e)
                })?;
        }
        _ => {
            return Err(anyhow::anyhow!(
                "unknown log format '{}', expected 'json' or 'pretty'",
                config.log_format
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_format_is_rejected_before_install() {
        let config = GeneralConfig {
            log_level: "info".to_owned(),
            log_format: "xml".to_owned(),
        };
        let err = init_tracing(&config, false).unwrap_err();
        assert!(err.to_string().contains("unknown log format 'xml'"));
    }
}
