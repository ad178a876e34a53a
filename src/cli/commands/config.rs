//! `vlayer config`: inspect the effective configuration.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use std::process::ExitCode;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

const REDACTED: &str = "********";

#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Print the merged configuration (secrets redacted)
    Show,
}

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ConfigOutput(Config);

impl ConfigOutput {
    pub fn redacted(mut config: Config) -> Self {
        if config.embedding.api_key.is_some() {
            config.embedding.api_key = Some(REDACTED.to_string());
        }
        Self(config)
    }

    fn yaml(&self) -> Result<String> {
        serde_yaml::to_string(&self.0).context("Failed to render configuration")
    }
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        self.yaml().unwrap_or_else(|err| format!("{err:#}"))
    }
}

pub fn execute(args: ConfigArgs, config: Config, json_mode: bool) -> Result<ExitCode> {
    match args.command {
        ConfigCommands::Show => {
            let out = ConfigOutput::redacted(config);
            out.yaml()?;
            output(&out, json_mode);
            Ok(ExitCode::SUCCESS)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_is_redacted() {
        let mut config = Config::default();
        config.embedding.api_key = Some("sk-live".to_string());
        let out = ConfigOutput::redacted(config);
        let human = out.to_human();
        assert!(!human.contains("sk-live"));
        assert!(human.contains(REDACTED));
        assert_eq!(out.to_json()["embedding"]["api_key"], REDACTED);
    }
}
