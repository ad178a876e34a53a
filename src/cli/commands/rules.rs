//! `vlayer rules`: inspect rule documents.

use anyhow::Result;
use clap::{Args, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;

use crate::cli::output::{list_table, output, CommandOutput};
use crate::domain::models::Config;
use crate::infrastructure::rules::RuleLoader;
use crate::services::rules::{Rule, RuleSet};

#[derive(Args, Debug)]
pub struct RulesArgs {
    #[command(subcommand)]
    pub command: RulesCommands,
}

#[derive(Subcommand, Debug)]
pub enum RulesCommands {
    /// Compile a rule document and list the rules it yields
    Check {
        /// Rule document (YAML)
        path: PathBuf,
    },
}

#[derive(Debug, Serialize)]
pub struct RuleRow {
    pub name: String,
    pub kind: String,
    pub detail: String,
}

impl From<&Rule> for RuleRow {
    fn from(rule: &Rule) -> Self {
        let detail = match rule {
            Rule::BuiltinPhysical(_) | Rule::BuiltinFinancial(_) => "always active".to_string(),
            Rule::Expression(expr) if expr.tolerance > 0.0 => {
                format!("{} (tolerance {})", expr.comparison.source(), expr.tolerance)
            }
            Rule::Expression(expr) => expr.comparison.source().to_string(),
            Rule::Delegate(delegate) => format!(
                "{} {} within {}ms{}",
                delegate.method.as_str(),
                delegate.url,
                delegate.timeout.as_millis(),
                if delegate.advisory { ", advisory" } else { "" }
            ),
        };
        Self {
            name: rule.name().to_string(),
            kind: rule.kind().to_string(),
            detail,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RuleCheckOutput {
    pub agent_id: String,
    pub rules: Vec<RuleRow>,
}

impl From<&RuleSet> for RuleCheckOutput {
    fn from(set: &RuleSet) -> Self {
        let builtins = Rule::builtins();
        Self {
            agent_id: set.agent_id().to_string(),
            rules: builtins.iter().chain(set.rules()).map(RuleRow::from).collect(),
        }
    }
}

impl CommandOutput for RuleCheckOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["rule", "kind", "detail"]);
        for row in &self.rules {
            table.add_row(vec![row.name.as_str(), row.kind.as_str(), row.detail.as_str()]);
        }
        format!("Rules for agent '{}':\n{table}", self.agent_id)
    }
}

pub fn execute(args: RulesArgs, config: &Config, json_mode: bool) -> Result<ExitCode> {
    match args.command {
        RulesCommands::Check { path } => {
            let set = RuleLoader::new(config.budget.webhook_timeout_ms).load_file(&path)?;
            output(&RuleCheckOutput::from(&set), json_mode);
            Ok(ExitCode::SUCCESS)
        }
    }
}
