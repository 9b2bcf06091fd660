//! Command handlers -- one module per subcommand

pub mod config;
pub mod plugins;
pub mod run;
pub mod validate;
