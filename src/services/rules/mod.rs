//! Compiled rule sets.
//!
//! Rule documents are data. Compilation turns each entry into one of a closed
//! set of tagged variants, validated once, so evaluation never re-parses.

pub mod expression;

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{HttpMethod, RuleDocument, RuleSpec, RuleType, SeverityTier};

pub use expression::{CmpOp, Comparison, EvalError};

/// Largest timeout a delegated rule may declare.
pub const MAX_WEBHOOK_TIMEOUT_MS: u64 = 100;

/// Built-in physical checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhysicalCheck {
    /// `|energy_out - energy_in| / energy_in` within tolerance.
    EnergyConservation,
    /// Neither declared energy may be negative.
    NonNegativeEnergy,
    /// Temperature within the configured kelvin range.
    Temperature,
    /// Pressure within the configured atm range.
    Pressure,
}

/// Built-in financial checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinancialCheck {
    /// Loss magnitude within the customer maximum.
    ValueAtRisk,
    /// Assets to liabilities within the maximum leverage.
    Leverage,
}

/// A declared numeric expression rule.
#[derive(Debug, Clone, PartialEq)]
pub struct ExpressionRule {
    pub name: String,
    pub kind: RuleType,
    pub comparison: Comparison,
    pub tolerance: f64,
    pub severity: Option<SeverityTier>,
}

/// A rule whose verdict comes from an external delegate.
#[derive(Debug, Clone, PartialEq)]
pub struct DelegateRule {
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub timeout: Duration,
    pub advisory: bool,
    pub fields: Vec<String>,
    pub severity: Option<SeverityTier>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    BuiltinPhysical(PhysicalCheck),
    BuiltinFinancial(FinancialCheck),
    Expression(ExpressionRule),
    Delegate(DelegateRule),
}

impl Rule {
    /// The always-active built-ins, in evaluation order.
    pub fn builtins() -> [Rule; 6] {
        [
            Rule::BuiltinPhysical(PhysicalCheck::NonNegativeEnergy),
            Rule::BuiltinPhysical(PhysicalCheck::EnergyConservation),
            Rule::BuiltinFinancial(FinancialCheck::ValueAtRisk),
            Rule::BuiltinPhysical(PhysicalCheck::Temperature),
            Rule::BuiltinPhysical(PhysicalCheck::Pressure),
            Rule::BuiltinFinancial(FinancialCheck::Leverage),
        ]
    }

    pub fn name(&self) -> &str {
        match self {
            Rule::BuiltinPhysical(PhysicalCheck::EnergyConservation) => "conservation_of_energy",
            Rule::BuiltinPhysical(PhysicalCheck::NonNegativeEnergy) => "non_negative_energy",
            Rule::BuiltinPhysical(PhysicalCheck::Temperature) => "temperature_range",
            Rule::BuiltinPhysical(PhysicalCheck::Pressure) => "pressure_range",
            Rule::BuiltinFinancial(FinancialCheck::ValueAtRisk) => "value_at_risk",
            Rule::BuiltinFinancial(FinancialCheck::Leverage) => "leverage_ratio",
            Rule::Expression(rule) => &rule.name,
            Rule::Delegate(rule) => &rule.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Rule::BuiltinPhysical(_) => "builtin_physical",
            Rule::BuiltinFinancial(_) => "builtin_financial",
            Rule::Expression(rule) => rule.kind.as_str(),
            Rule::Delegate(_) => "webhook",
        }
    }

    pub fn is_delegate(&self) -> bool {
        matches!(self, Rule::Delegate(_))
    }
}

/// Declared rules for one agent. Built-ins are not stored here; the engine
/// always evaluates them first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    agent_id: String,
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn empty(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            rules: Vec::new(),
        }
    }

    /// Validate and compile a rule document.
    ///
    /// `default_timeout_ms` applies to webhook entries that declare none.
    pub fn compile(document: &RuleDocument, default_timeout_ms: u64) -> DomainResult<Self> {
        let mut seen = HashSet::new();
        let mut rules = Vec::with_capacity(document.rules.len());

        for spec in &document.rules {
            if spec.name.trim().is_empty() {
                return Err(invalid("<unnamed>", "rule name cannot be empty"));
            }
            if !seen.insert(spec.name.as_str()) {
                return Err(invalid(&spec.name, "duplicate rule name"));
            }
            rules.push(compile_rule(spec, default_timeout_ms)?);
        }

        Ok(Self {
            agent_id: document.agent_id.clone(),
            rules,
        })
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

fn invalid(rule: &str, reason: impl Into<String>) -> DomainError {
    DomainError::InvalidRule {
        rule: rule.to_string(),
        reason: reason.into(),
    }
}

fn compile_rule(spec: &RuleSpec, default_timeout_ms: u64) -> DomainResult<Rule> {
    if !spec.tolerance.is_finite() || spec.tolerance < 0.0 {
        return Err(invalid(&spec.name, "tolerance must be a non-negative number"));
    }

    match spec.rule_type {
        RuleType::Physical | RuleType::Financial => {
            let source = spec
                .rule
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| invalid(&spec.name, "missing 'rule' expression"))?;
            let comparison = Comparison::parse(source).map_err(|e| invalid(&spec.name, e))?;
            Ok(Rule::Expression(ExpressionRule {
                name: spec.name.clone(),
                kind: spec.rule_type,
                comparison,
                tolerance: spec.tolerance,
                severity: spec.severity,
            }))
        }
        RuleType::Webhook => {
            let url = spec
                .url
                .as_deref()
                .ok_or_else(|| invalid(&spec.name, "missing 'url'"))?;
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(invalid(&spec.name, format!("unsupported url '{url}'")));
            }
            let timeout_ms = spec.timeout_ms.unwrap_or(default_timeout_ms);
            if timeout_ms == 0 || timeout_ms > MAX_WEBHOOK_TIMEOUT_MS {
                return Err(invalid(
                    &spec.name,
                    format!("timeout_ms must be in 1..={MAX_WEBHOOK_TIMEOUT_MS}, got {timeout_ms}"),
                ));
            }
            Ok(Rule::Delegate(DelegateRule {
                name: spec.name.clone(),
                url: url.to_string(),
                method: spec.method,
                timeout: Duration::from_millis(timeout_ms),
                advisory: spec.advisory,
                fields: spec.fields.clone(),
                severity: spec.severity,
            }))
        }
    }
}

/// Compiled rule sets keyed by agent.
#[derive(Debug, Default)]
pub struct RuleRegistry {
    sets: RwLock<HashMap<String, Arc<RuleSet>>>,
}

impl RuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install or replace the rule set for its agent.
    pub fn insert(&self, set: RuleSet) {
        self.sets.write().insert(set.agent_id().to_string(), Arc::new(set));
    }

    /// Rule set for `agent_id`; empty when none is registered.
    pub fn get(&self, agent_id: &str) -> Arc<RuleSet> {
        self.sets
            .read()
            .get(agent_id)
            .cloned()
            .unwrap_or_else(|| Arc::new(RuleSet::empty(agent_id)))
    }

    pub fn contains(&self, agent_id: &str) -> bool {
        self.sets.read().contains_key(agent_id)
    }

    pub fn remove(&self, agent_id: &str) -> bool {
        self.sets.write().remove(agent_id).is_some()
    }

    pub fn agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = self.sets.read().keys().cloned().collect();
        agents.sort();
        agents
    }

    pub fn len(&self) -> usize {
        self.sets.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.read().is_empty()
    }
}
