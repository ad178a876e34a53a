//! Command-line interface.

pub mod commands;
pub mod output;

pub use output::{output, CommandOutput};

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use commands::{config::ConfigArgs, rules::RulesArgs, validate::ValidateArgs};

#[derive(Parser, Debug)]
#[command(name = "vlayer", version, about = "Validate AI-agent outputs before they act")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,

    /// Configuration file; defaults to .vlayer/config.yaml plus VLAYER_* overrides
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate one request and print the decision
    Validate(ValidateArgs),
    /// Rule document commands
    Rules(RulesArgs),
    /// Configuration commands
    Config(ConfigArgs),
}

/// Load the effective configuration.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Report a failed command and produce the failure exit code.
pub fn handle_error(err: &anyhow::Error, json: bool) -> ExitCode {
    if json {
        let body = serde_json::json!({ "error": format!("{err:#}") });
        eprintln!("{body}");
    } else {
        eprintln!("Error: {err:#}");
    }
    ExitCode::FAILURE
}
