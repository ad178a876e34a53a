//! `vlayer validate`: run one request through the full pipeline.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use crate::adapters::audit::TracingAuditSink;
use crate::adapters::embeddings::provider_from_config;
use crate::adapters::webhook::HttpRuleDelegate;
use crate::cli::output::{list_table, output, truncate, CommandOutput};
use crate::domain::models::{Action, Config, DecisionOutput, ValidationRequest, ValidationResult};
use crate::infrastructure::rules::RuleLoader;
use crate::services::{RuleRegistry, ValidationOrchestrator};

/// Exit code when the decision is BLOCK.
const BLOCKED_EXIT: u8 = 2;

#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Request JSON file, or `-` to read stdin
    #[arg(short, long)]
    pub request: String,

    /// Tenant whose failure mode and circuit apply
    #[arg(short, long, default_value = "default")]
    pub tenant: String,

    /// Rule document (YAML) to use instead of `rules_dir`
    #[arg(long)]
    pub rules: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct ViolationRow {
    pub rule: String,
    pub tier: String,
    pub severity_pct: f64,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ValidateOutput {
    #[serde(flatten)]
    pub decision: DecisionOutput,
    pub http_status: u16,
    pub tenant: String,
    pub agent_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded_reason: Option<String>,
    pub latency_ms: f64,
    pub violation_details: Vec<ViolationRow>,
}

impl From<&ValidationResult> for ValidateOutput {
    fn from(result: &ValidationResult) -> Self {
        let decision = DecisionOutput::from(result);
        Self {
            http_status: decision.http_status(),
            decision,
            tenant: result.tenant_id().to_string(),
            agent_id: result.agent_id().to_string(),
            degraded_reason: result.degraded_reason().map(str::to_string),
            latency_ms: result.latency_ms(),
            violation_details: result
                .violations()
                .iter()
                .map(|v| ViolationRow {
                    rule: v.rule_name().to_string(),
                    tier: v.tier().as_str().to_string(),
                    severity_pct: v.severity_pct(),
                    message: v.message().to_string(),
                })
                .collect(),
        }
    }
}

impl CommandOutput for ValidateOutput {
    fn to_human(&self) -> String {
        let d = &self.decision;
        let mut summary = list_table(&["field", "value"]);
        summary
            .add_row(vec!["request".to_string(), d.request_id.to_string()])
            .add_row(vec!["tenant / agent".to_string(), format!("{} / {}", self.tenant, self.agent_id)])
            .add_row(vec!["action".to_string(), d.action.to_string()])
            .add_row(vec!["status".to_string(), format!("{:?} ({})", d.status, self.http_status)])
            .add_row(vec![
                "risk".to_string(),
                format!("{} (confidence {:.3})", d.confidence_level, d.confidence),
            ])
            .add_row(vec!["divergence".to_string(), format!("{:.3}", d.entropy_score)]);
        if d.degraded {
            summary.add_row(vec![
                "degraded".to_string(),
                self.degraded_reason.clone().unwrap_or_else(|| "yes".to_string()),
            ]);
        }
        if let Some(drift) = &d.drift {
            summary.add_row(vec!["drift".to_string(), drift.explanation()]);
        }
        summary
            .add_row(vec!["recommendation".to_string(), d.recommendation.clone()])
            .add_row(vec!["latency".to_string(), format!("{:.1} ms", self.latency_ms)]);

        if self.violation_details.is_empty() {
            return summary.to_string();
        }

        let mut violations = list_table(&["rule", "tier", "severity %", "message"]);
        for v in &self.violation_details {
            violations.add_row(vec![
                v.rule.clone(),
                v.tier.clone(),
                format!("{:.1}", v.severity_pct),
                truncate(&v.message, 80),
            ]);
        }
        format!("{summary}\n\n{} violation(s):\n{violations}", self.violation_details.len())
    }
}

fn read_request(source: &str) -> Result<ValidationRequest> {
    let body = if source == "-" {
        let mut body = String::new();
        std::io::stdin()
            .read_to_string(&mut body)
            .context("Failed to read request from stdin")?;
        body
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read request file: {source}"))?
    };
    serde_json::from_str(&body).context("Request is not a valid validation request")
}

fn load_rules(args: &ValidateArgs, config: &Config) -> Result<RuleRegistry> {
    let loader = RuleLoader::new(config.budget.webhook_timeout_ms);
    if let Some(path) = &args.rules {
        let registry = RuleRegistry::new();
        registry.insert(loader.load_file(path)?);
        return Ok(registry);
    }
    match &config.rules_dir {
        Some(dir) => loader.load_dir(dir),
        None => Ok(RuleRegistry::new()),
    }
}

pub async fn execute(args: ValidateArgs, config: Config, json_mode: bool) -> Result<ExitCode> {
    let request = read_request(&args.request)?;
    let rules = load_rules(&args, &config)?;
    let embedder = provider_from_config(&config.embedding)?;

    let orchestrator = ValidationOrchestrator::builder(config, embedder)
        .rules(Arc::new(rules))
        .delegate(Arc::new(HttpRuleDelegate::new()?))
        .audit_sink(Arc::new(TracingAuditSink))
        .build();

    let result = orchestrator
        .validate(&args.tenant, request)
        .await
        .context("Request rejected")?;

    output(&ValidateOutput::from(&result), json_mode);

    Ok(match result.action() {
        Action::Block => ExitCode::from(BLOCKED_EXIT),
        _ => ExitCode::SUCCESS,
    })
}
