//! CLI argument parsing using clap derive API
//!
//! The derive structs describe the fixed surface. Plugin flags are attached to
//! the `run` subcommand at parser-build time through the argument-hook
//! extension point, so parsing goes through [`build_command`] rather than
//! `Cli::parse()`.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{ArgMatches, Args, CommandFactory, FromArgMatches, Parser, Subcommand, ValueEnum};

use pipebench_core::args::apply_argument_hooks;

/// Name of the subcommand that receives plugin arguments.
pub const RUN_SUBCOMMAND: &str = "run";

/// pipebench -- performance-test orchestration for telemetry pipelines.
///
/// Use `pipebench <COMMAND> --help` for subcommand details.
#[derive(Parser, Debug)]
#[command(name = "pipebench", version, about, long_about = None)]
pub struct Cli {
    /// Path to the pipebench.toml configuration file.
    ///
    /// When omitted, ./pipebench.toml is used if present, defaults otherwise.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Override log level (trace, debug, info, warn, error).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    #[arg(long, global = true)]
    pub log_format: Option<String>,

    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    pub output: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output.
    Text,
    /// Machine-readable JSON.
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a test suite.
    Run(RunArgs),

    /// Load a suite and check every plugin reference without running it.
    Validate(ValidateArgs),

    /// List registered plugins.
    Plugins,

    /// Manage configuration.
    Config(ConfigArgs),
}

// ---- run ----

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Suite document (.yaml, .yml or .toml).
    pub suite: PathBuf,

    /// Record spans and append them as JSON lines to PATH.
    ///
    /// Implies `[telemetry] enabled = true`.
    #[arg(long, value_name = "PATH")]
    pub telemetry_export: Option<PathBuf>,

    /// Serve Prometheus metrics while the suite runs.
    #[arg(long)]
    pub metrics: bool,
}

// ---- validate ----

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Suite document (.yaml, .yml or .toml).
    pub suite: PathBuf,
}

// ---- config ----

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Validate the configuration file.
    Validate,
    /// Show the effective configuration (file + env + flags + defaults).
    Show,
}

/// Build the full parser, including plugin-contributed `run` flags.
///
/// Plugins must be loaded first so their argument hooks are registered.
pub fn build_command() -> clap::Command {
    Cli::command().mut_subcommand(RUN_SUBCOMMAND, apply_argument_hooks)
}

/// Parse arguments into the derive structs plus the raw matches.
///
/// The raw matches are kept so plugins can read the flags they contributed.
pub fn parse_from<I, T>(args: I) -> Result<(Cli, ArgMatches), clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let matches = build_command().try_get_matches_from(args)?;
    let cli = Cli::from_arg_matches(&matches)?;
    Ok((cli, matches))
}
