//! CLI-specific error types and exit code mapping

use pipebench_core::error::{PipebenchError, TelemetryError};

/// CLI-specific error type.
///
/// The `exit_code()` method maps errors to process exit codes.
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(String),

    /// The suite ran and ended with a fatal or teardown failure.
    #[error("suite '{suite}' failed: {reason}")]
    SuiteFailed { suite: String, reason: String },

    /// Ctrl-C arrived before the suite finished.
    #[error("interrupted while running suite '{0}'")]
    Interrupted(String),

    /// Spans could not be exported after the run.
    #[error("telemetry export failed: {0}")]
    Telemetry(#[from] TelemetryError),

    /// Metrics recorder or logging setup failed.
    #[error("initialization failed: {0}")]
    Init(String),

    /// JSON serialisation failed during output rendering.
    #[error("json output error: {0}")]
    JsonSerialize(#[from] serde_json::Error),

    /// IO error (stdout write, etc.).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapped domain error from pipebench-core.
    #[error("{0}")]
    Core(#[from] PipebenchError),
}

impl CliError {
    /// Map the error to a process exit code.
    ///
    /// | Code | Meaning                                     |
    /// |------|---------------------------------------------|
    /// | 0    | Success                                     |
    /// | 1    | Run failure (suite, interrupt, export)      |
    /// | 2    | Configuration or suite loading failure      |
    /// | 10   | IO error                                    |
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Init(_) => 2,
            Self::Core(e) if e.is_load_error() => 2,
            Self::Io(_) => 10,
            Self::SuiteFailed { .. }
            | Self::Interrupted(_)
            | Self::Telemetry(_)
            | Self::JsonSerialize(_)
            | Self::Core(_) => 1,
        }
    }
}
