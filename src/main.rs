//! vlayer CLI entry point.

use clap::Parser;
use std::process::ExitCode;

use vlayer::cli::commands;
use vlayer::cli::{handle_error, load_config, Cli, Commands};
use vlayer::infrastructure::logging::{LogConfig, LoggerImpl};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => return handle_error(&err, cli.json),
    };

    let _logger = match LogConfig::try_from(&config.logging)
        .map_err(anyhow::Error::from)
        .and_then(|log_config| LoggerImpl::init(&log_config))
    {
        Ok(logger) => logger,
        Err(err) => return handle_error(&err, cli.json),
    };

    let result = match cli.command {
        Commands::Validate(args) => commands::validate::execute(args, config, cli.json).await,
        Commands::Rules(args) => commands::rules::execute(args, &config, cli.json),
        Commands::Config(args) => commands::config::execute(args, config, cli.json),
    };

    result.unwrap_or_else(|err| handle_error(&err, cli.json))
}
