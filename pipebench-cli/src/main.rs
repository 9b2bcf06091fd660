//! pipebench -- command-line driver for performance-test suites
//!
//! Loads built-in plugins, parses arguments (including plugin flags),
//! resolves configuration, installs logging and dispatches to a subcommand.

mod cli;
mod commands;
mod error;
mod logging;
mod metrics_server;
mod output;
mod settings;

use clap::ArgMatches;

use crate::cli::{Cli, Commands, RUN_SUBCOMMAND};
use crate::error::CliError;
use crate::output::OutputWriter;

#[tokio::main]
async fn main() {
    // 인자 훅 등록이 파서 구성보다 먼저여야 함
    pipebench_plugins::load_all_plugins();

    let (cli, matches) = cli::parse_from(std::env::args_os()).unwrap_or_else(|e| e.exit());

    if let Err(e) = dispatch(cli, matches).await {
        tracing::error!(error = %e, "pipebench failed");
        eprintln!("error: {e}");
        std::process::exit(e.exit_code());
    }
}

async fn dispatch(cli: Cli, matches: ArgMatches) -> Result<(), CliError> {
    let writer = OutputWriter::new(cli.output);
    let loaded = settings::resolve(&cli);

    let general = loaded
        .as_ref()
        .map(|c| c.general.clone())
        .unwrap_or_default();
    let span_events = loaded.as_ref().is_ok_and(|c| c.telemetry.enabled);
    logging::init_tracing(&general, span_events).map_err(|e| CliError::Init(e.to_string()))?;

    tracing::debug!(command = ?cli.command, "pipebench starting");

    let source = settings::config_source(&cli);
    match cli.command {
        Commands::Run(args) => {
            let config = loaded?;
            let run_matches = matches
                .subcommand_matches(RUN_SUBCOMMAND)
                .cloned()
                .unwrap_or_default();
            commands::run::execute(args, &config, run_matches, &writer).await
        }
        Commands::Validate(args) => {
            loaded?;
            commands::validate::execute(&args, &writer)
        }
        Commands::Plugins => {
            loaded?;
            commands::plugins::execute(&writer)
        }
        Commands::Config(args) => commands::config::execute(&args.action, source, loaded, &writer),
    }
}
