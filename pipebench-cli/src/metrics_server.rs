//! Prometheus metrics HTTP server.
//!
//! Uses the built-in HTTP listener from `metrics-exporter-prometheus`
//! to expose the engine's policy, hook, phase and step metrics while a
//! suite runs.
//!
//! # Usage
//!
//! ```ignore
//! let config = MetricsConfig::default();
//! install_metrics_recorder(&config)?;
//! record_process_gauges(&counts);
//! ```

use std::net::SocketAddr;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusBuilder;

use pipebench_core::config::MetricsConfig;
use pipebench_core::metrics::{
    BUILD_INFO, DURATION_BUCKETS, LABEL_PLUGIN_KIND, LABEL_VERSION, PLUGINS_REGISTERED,
};

/// Install the global metrics recorder and start the HTTP listener.
///
/// Must be called once per process, from inside the tokio runtime.
///
/// # Errors
///
/// - Unsupported endpoint path
/// - Invalid listen address
/// - Socket binding fails or a recorder is already installed
pub fn install_metrics_recorder(config: &MetricsConfig) -> Result<()> {
    if config.endpoint != "/metrics" {
        return Err(anyhow::anyhow!(
            "unsupported metrics endpoint '{}': only '/metrics' is currently supported",
            config.endpoint
        ));
    }

    let addr = listen_addr(config)?;

    if addr.ip().is_unspecified() {
        tracing::warn!(
            listen_addr = %addr,
            "metrics endpoint is exposed on all interfaces; restrict listen_addr in untrusted networks"
        );
    }

    tracing::info!(listen_addr = %addr, "installing Prometheus metrics recorder");

    PrometheusBuilder::new()
        .set_buckets(&DURATION_BUCKETS)
        .map_err(|e| anyhow::anyhow!("invalid histogram buckets: {}", e))?
        .with_http_listener(addr)
        .install()
        .map_err(|e| anyhow::anyhow!("failed to install metrics recorder: {}", e))?;

    pipebench_core::metrics::describe_all();

    tracing::info!(listen_addr = %addr, "Prometheus metrics endpoint active");

    Ok(())
}

/// Set the process-level gauges (plugin counts, build info).
pub fn record_process_gauges(plugin_counts: &[(&'static str, usize)]) {
    for (kind, count) in plugin_counts {
        metrics::gauge!(PLUGINS_REGISTERED, LABEL_PLUGIN_KIND => *kind).set(*count as f64);
    }
    metrics::gauge!(BUILD_INFO, LABEL_VERSION => env!("CARGO_PKG_VERSION")).set(1.0);
}

fn listen_addr(config: &MetricsConfig) -> Result<SocketAddr> {
    format!("{}:{}", config.listen_addr, config.port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid metrics listen address: {}", e))
}
