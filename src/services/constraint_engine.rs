//! Hard-constraint evaluation.
//!
//! Built-in physical and financial limits run first, then the agent's declared
//! rules in document order. Every rule is evaluated; one breach never stops the
//! rest. Delegated rules run concurrently, each under its own hard timeout.

use futures::future::{self, BoxFuture, FutureExt};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::errors::DomainError;
use crate::domain::models::{ConstraintLimits, SeverityTier, ValidationRequest, Violation};
use crate::domain::ports::{DelegateCall, RuleDelegate};
use crate::services::rules::{
    DelegateRule, EvalError, ExpressionRule, FinancialCheck, PhysicalCheck, Rule, RuleSet,
};

const TEMPERATURE_KEYS: [&str; 4] = ["temperature", "temperature_k", "temp", "kelvin"];
const PRESSURE_KEYS: [&str; 2] = ["pressure", "pressure_atm"];

/// Evaluates built-in limits and declared rules against a request.
#[derive(Clone)]
pub struct ConstraintEngine {
    limits: ConstraintLimits,
    delegate: Option<Arc<dyn RuleDelegate>>,
    timeout_cap: Duration,
}

impl ConstraintEngine {
    pub fn new(limits: ConstraintLimits) -> Self {
        Self {
            limits,
            delegate: None,
            timeout_cap: Duration::from_millis(crate::services::rules::MAX_WEBHOOK_TIMEOUT_MS),
        }
    }

    /// Attach the transport used by delegated rules.
    pub fn with_delegate(mut self, delegate: Arc<dyn RuleDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Upper bound applied to every delegated rule's timeout.
    pub fn with_timeout_cap(mut self, cap: Duration) -> Self {
        self.timeout_cap = cap;
        self
    }

    pub fn limits(&self) -> &ConstraintLimits {
        &self.limits
    }

    /// All violations for `request`, built-ins first, then `ruleset` in order.
    pub async fn evaluate(&self, request: &ValidationRequest, ruleset: &RuleSet) -> Vec<Violation> {
        let builtins = Rule::builtins();
        let checks: Vec<BoxFuture<'_, Vec<Violation>>> = builtins
            .iter()
            .chain(ruleset.rules())
            .map(|rule| match rule {
                Rule::Delegate(delegated) => self.run_delegate(delegated, request).boxed(),
                other => future::ready(self.evaluate_local(other, request)).boxed(),
            })
            .collect();

        let violations: Vec<Violation> = future::join_all(checks).await.into_iter().flatten().collect();
        debug!(
            agent = %request.agent_id,
            rules = builtins.len() + ruleset.len(),
            violations = violations.len(),
            "Constraints evaluated"
        );
        violations
    }

    fn evaluate_local(&self, rule: &Rule, request: &ValidationRequest) -> Vec<Violation> {
        match rule {
            Rule::BuiltinPhysical(check) => self.physical(*check, request),
            Rule::BuiltinFinancial(check) => self.financial(*check, request),
            Rule::Expression(expr) => evaluate_expression(expr, request).into_iter().collect(),
            Rule::Delegate(_) => Vec::new(),
        }
    }

    fn physical(&self, check: PhysicalCheck, request: &ValidationRequest) -> Vec<Violation> {
        let rule = Rule::BuiltinPhysical(check);
        let name = rule.name();
        match check {
            PhysicalCheck::NonNegativeEnergy => {
                let Some(physics) = request.physics else {
                    return Vec::new();
                };
                [("energy_in", physics.energy_in), ("energy_out", physics.energy_out)]
                    .into_iter()
                    .filter(|(_, value)| *value < 0.0)
                    .map(|(field, value)| {
                        Violation::measured(name, format!("Negative energy declared: {field}={value}"), value, 0.0)
                    })
                    .collect()
            }
            PhysicalCheck::EnergyConservation => {
                let Some(physics) = request.physics else {
                    return Vec::new();
                };
                let (energy_in, energy_out) = (physics.energy_in, physics.energy_out);
                if energy_in < 0.0 || energy_out < 0.0 {
                    return Vec::new();
                }
                if energy_in == 0.0 {
                    if energy_out > 0.0 {
                        return vec![Violation::measured(
                            name,
                            format!("Energy created from nothing: energy_out={energy_out} with no input"),
                            energy_out,
                            0.0,
                        )];
                    }
                    return Vec::new();
                }
                let ratio = (energy_out - energy_in).abs() / energy_in;
                if ratio > self.limits.energy_tolerance {
                    vec![Violation::measured(
                        name,
                        format!(
                            "Conservation of energy violated: {:.1}% imbalance exceeds {:.1}% tolerance",
                            ratio * 100.0,
                            self.limits.energy_tolerance * 100.0
                        ),
                        ratio,
                        self.limits.energy_tolerance,
                    )]
                } else {
                    Vec::new()
                }
            }
            PhysicalCheck::Temperature => range_check(
                name,
                "Temperature",
                "K",
                first_metric(request, &TEMPERATURE_KEYS),
                self.limits.temperature_min_k,
                self.limits.temperature_max_k,
            ),
            PhysicalCheck::Pressure => range_check(
                name,
                "Pressure",
                "atm",
                first_metric(request, &PRESSURE_KEYS),
                self.limits.pressure_min_atm,
                self.limits.pressure_max_atm,
            ),
        }
    }

    fn financial(&self, check: FinancialCheck, request: &ValidationRequest) -> Vec<Violation> {
        let rule = Rule::BuiltinFinancial(check);
        let name = rule.name();
        match check {
            FinancialCheck::ValueAtRisk => {
                let Some(loss) = request.lookup("proposed_loss").map(f64::abs) else {
                    return Vec::new();
                };
                if loss > self.limits.max_loss {
                    vec![Violation::measured(
                        name,
                        format!(
                            "Proposed loss {loss} exceeds customer maximum {}",
                            self.limits.max_loss
                        ),
                        loss,
                        self.limits.max_loss,
                    )]
                } else {
                    Vec::new()
                }
            }
            FinancialCheck::Leverage => {
                let derived = || {
                    let assets = request.lookup("assets")?;
                    let liabilities = request.lookup("liabilities").filter(|l| *l > 0.0)?;
                    Some(assets / liabilities)
                };
                let Some(ratio) = request.lookup("leverage_ratio").or_else(derived) else {
                    return Vec::new();
                };
                if ratio > self.limits.max_leverage {
                    vec![Violation::measured(
                        name,
                        format!(
                            "Leverage ratio {ratio} exceeds hard limit {}",
                            self.limits.max_leverage
                        ),
                        ratio,
                        self.limits.max_leverage,
                    )]
                } else {
                    Vec::new()
                }
            }
        }
    }

    async fn run_delegate(&self, rule: &DelegateRule, request: &ValidationRequest) -> Vec<Violation> {
        let tier = rule.severity.unwrap_or(SeverityTier::Medium);
        let timeout = rule.timeout.min(self.timeout_cap);

        let outcome = match &self.delegate {
            None => Err(DomainError::WebhookUnreachable {
                rule: rule.name.clone(),
                reason: "no delegate transport configured".to_string(),
            }),
            Some(delegate) => {
                let call = DelegateCall {
                    rule: rule.name.clone(),
                    agent_id: request.agent_id.clone(),
                    fields: rule
                        .fields
                        .iter()
                        .filter_map(|field| request.lookup(field).map(|v| (field.clone(), v)))
                        .collect::<BTreeMap<_, _>>(),
                    url: rule.url.clone(),
                    method: rule.method,
                };
                match tokio::time::timeout(timeout, delegate.evaluate(&call)).await {
                    Ok(result) => result,
                    Err(_) => Err(DomainError::WebhookTimeout {
                        rule: rule.name.clone(),
                        timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                    }),
                }
            }
        };

        match outcome {
            Ok(verdict) if verdict.approved => Vec::new(),
            Ok(verdict) => {
                let reason = verdict.reason.unwrap_or_else(|| "denied".to_string());
                vec![Violation::flagged(
                    &rule.name,
                    format!("Rule '{}' denied by delegate: {reason}", rule.name),
                    tier,
                )]
            }
            Err(err) if rule.advisory => {
                warn!(rule = %rule.name, error = %err, kind = err.kind(), "Advisory delegate failed; ignored");
                Vec::new()
            }
            Err(err) => {
                warn!(rule = %rule.name, error = %err, kind = err.kind(), "Delegate failed; rule treated as violated");
                vec![Violation::flagged(&rule.name, err.to_string(), tier)]
            }
        }
    }
}

fn first_metric(request: &ValidationRequest, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|key| request.lookup(key))
}

fn range_check(
    name: &str,
    label: &str,
    unit: &str,
    value: Option<f64>,
    min: f64,
    max: f64,
) -> Vec<Violation> {
    let Some(value) = value else {
        return Vec::new();
    };
    let limit = if value < min {
        min
    } else if value > max {
        max
    } else {
        return Vec::new();
    };
    vec![Violation::measured(
        name,
        format!("{label} {value}{unit} outside [{min}, {max}]{unit}"),
        value,
        limit,
    )]
}

fn evaluate_expression(rule: &ExpressionRule, request: &ValidationRequest) -> Option<Violation> {
    match rule
        .comparison
        .evaluate(rule.tolerance, &|name: &str| request.lookup(name))
    {
        Ok(outcome) if outcome.holds => None,
        Ok(outcome) => Some(
            Violation::measured(
                &rule.name,
                format!(
                    "Rule '{}' violated: {} (actual={}, limit={})",
                    rule.name, rule.comparison, outcome.measured, outcome.limit
                ),
                outcome.measured,
                outcome.limit,
            )
            .with_floor(rule.severity),
        ),
        Err(EvalError::Missing(field)) => {
            debug!(rule = %rule.name, field = %field, "Rule skipped, value not declared");
            None
        }
        Err(EvalError::Arithmetic(reason)) => {
            let err = DomainError::RuleEvaluation {
                rule: rule.name.clone(),
                reason,
            };
            warn!(rule = %rule.name, error = %err, "Rule evaluation failed; treated as violated");
            Some(Violation::flagged(
                &rule.name,
                err.to_string(),
                rule.severity.unwrap_or(SeverityTier::Medium),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::DomainResult;
    use crate::domain::models::RuleDocument;
    use crate::domain::ports::DelegateVerdict;
    use async_trait::async_trait;

    fn engine() -> ConstraintEngine {
        ConstraintEngine::new(ConstraintLimits::default())
    }

    fn names(violations: &[Violation]) -> Vec<&str> {
        violations.iter().map(Violation::rule_name).collect()
    }

    async fn builtins_only(request: &ValidationRequest) -> Vec<Violation> {
        engine().evaluate(request, &RuleSet::empty("a")).await
    }

    #[tokio::test]
    async fn test_energy_conservation_tolerance() {
        let over = builtins_only(&ValidationRequest::new(vec![]).with_physics(100.0, 90.0)).await;
        assert_eq!(names(&over), vec!["conservation_of_energy"]);
        assert!((over[0].measured_value() - 0.1).abs() < 1e-12);

        let within = builtins_only(&ValidationRequest::new(vec![]).with_physics(100.0, 96.0)).await;
        assert!(within.is_empty());
    }

    #[tokio::test]
    async fn test_negative_and_zero_energy() {
        let negative = builtins_only(&ValidationRequest::new(vec![]).with_physics(-5.0, 10.0)).await;
        assert_eq!(names(&negative), vec!["non_negative_energy"]);

        let from_nothing = builtins_only(&ValidationRequest::new(vec![]).with_physics(0.0, 10.0)).await;
        assert_eq!(names(&from_nothing), vec!["conservation_of_energy"]);

        let idle = builtins_only(&ValidationRequest::new(vec![]).with_physics(0.0, 0.0)).await;
        assert!(idle.is_empty());
    }

    #[tokio::test]
    async fn test_value_at_risk_uses_magnitude() {
        let request = ValidationRequest::new(vec![]).with_financial(-15_000.0);
        let violations = builtins_only(&request).await;
        assert_eq!(names(&violations), vec!["value_at_risk"]);
        assert!((violations[0].measured_value() - 15_000.0).abs() < f64::EPSILON);

        let ok = builtins_only(&ValidationRequest::new(vec![]).with_financial(-5_000.0)).await;
        assert!(ok.is_empty());
    }

    #[tokio::test]
    async fn test_every_out_of_range_metric_reported() {
        let request = ValidationRequest::new(vec![])
            .with_metric("temperature", 400.0)
            .with_metric("pressure_atm", 0.2);
        let violations = builtins_only(&request).await;
        assert_eq!(names(&violations), vec!["temperature_range", "pressure_range"]);
        assert!((violations[1].limit() - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_leverage() {
        let explicit = builtins_only(&ValidationRequest::new(vec![]).with_metric("leverage_ratio", 4.2)).await;
        assert_eq!(names(&explicit), vec!["leverage_ratio"]);
        assert!((explicit[0].severity_pct() - 40.0).abs() < 1e-9);
        assert!((explicit[0].weight() - 2.0).abs() < f64::EPSILON);

        let derived = builtins_only(
            &ValidationRequest::new(vec![])
                .with_metric("assets", 500.0)
                .with_metric("liabilities", 100.0),
        )
        .await;
        assert_eq!(names(&derived), vec!["leverage_ratio"]);

        let no_liabilities = builtins_only(
            &ValidationRequest::new(vec![])
                .with_metric("assets", 500.0)
                .with_metric("liabilities", 0.0),
        )
        .await;
        assert!(no_liabilities.is_empty());
    }

    #[tokio::test]
    async fn test_expression_rules() {
        let doc = RuleDocument::from_yaml_str(
            r#"
agent_id: a
rules:
  - name: margin_floor
    type: financial
    rule: "margin >= 0.2"
    severity: critical
  - name: needs_missing
    type: physical
    rule: "flux < 3"
  - name: ratio
    type: financial
    rule: "a / b < 1"
"#,
        )
        .unwrap();
        let set = RuleSet::compile(&doc, 100).unwrap();
        let request = ValidationRequest::new(vec![])
            .with_metric("margin", 0.19)
            .with_metric("a", 1.0)
            .with_metric("b", 0.0);

        let violations = engine().evaluate(&request, &set).await;
        assert_eq!(names(&violations), vec!["margin_floor", "ratio"]);
        // declared severity is a floor
        assert!(violations[0].is_critical());
        assert!(violations[1].message().contains("failed to evaluate"));
    }

    struct FixedDelegate {
        approve: bool,
        delay: Duration,
    }

    #[async_trait]
    impl RuleDelegate for FixedDelegate {
        async fn evaluate(&self, call: &DelegateCall) -> DomainResult<DelegateVerdict> {
            tokio::time::sleep(self.delay).await;
            assert_eq!(call.fields.get("proposed_loss"), Some(&-50.0));
            Ok(DelegateVerdict {
                approved: self.approve,
                reason: Some("sanctioned counterparty".to_string()),
            })
        }
    }

    fn webhook_set(advisory: bool) -> RuleSet {
        let yaml = format!(
            "agent_id: a\nrules:\n  - name: kyc\n    type: webhook\n    url: http://localhost/kyc\n    timeout_ms: 20\n    advisory: {advisory}\n    fields: [proposed_loss]\n"
        );
        RuleSet::compile(&RuleDocument::from_yaml_str(&yaml).unwrap(), 100).unwrap()
    }

    fn with_delegate(approve: bool, delay_ms: u64) -> ConstraintEngine {
        engine().with_delegate(Arc::new(FixedDelegate {
            approve,
            delay: Duration::from_millis(delay_ms),
        }))
    }

    #[tokio::test]
    async fn test_delegate_verdicts() {
        let request = ValidationRequest::new(vec![]).with_financial(-50.0);

        let approved = with_delegate(true, 0).evaluate(&request, &webhook_set(false)).await;
        assert!(approved.is_empty());

        let denied = with_delegate(false, 0).evaluate(&request, &webhook_set(true)).await;
        assert_eq!(names(&denied), vec!["kyc"]);
        assert_eq!(denied[0].tier(), SeverityTier::Medium);
        assert!(denied[0].message().contains("sanctioned counterparty"));
    }

    #[tokio::test]
    async fn test_delegate_timeout_fails_closed_unless_advisory() {
        let request = ValidationRequest::new(vec![]).with_financial(-50.0);

        let strict = with_delegate(true, 200).evaluate(&request, &webhook_set(false)).await;
        assert_eq!(names(&strict), vec!["kyc"]);
        assert!(strict[0].message().contains("timed out"));

        let advisory = with_delegate(true, 200).evaluate(&request, &webhook_set(true)).await;
        assert!(advisory.is_empty());
    }

    #[tokio::test]
    async fn test_missing_transport_is_unreachable() {
        let request = ValidationRequest::new(vec![]).with_financial(-50.0);
        let violations = engine().evaluate(&request, &webhook_set(false)).await;
        assert!(violations[0].message().contains("unreachable"));
    }

    #[tokio::test]
    async fn test_full_request_keeps_evaluating_after_breach() {
        let request = ValidationRequest::new(vec![])
            .with_physics(100.0, 90.0)
            .with_financial(-5000.0)
            .with_metric("leverage_ratio", 4.2);
        let violations = builtins_only(&request).await;
        assert_eq!(names(&violations), vec!["conservation_of_energy", "leverage_ratio"]);
    }
}
