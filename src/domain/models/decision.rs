use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::drift::DriftAlert;
use super::risk::{RiskAssessment, RiskLevel};
use super::violation::Violation;

/// Final disposition of a proposed output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Allow,
    Review,
    Block,
    /// Allowed, but the checks did not finish within budget.
    Caution,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "ALLOW",
            Self::Review => "REVIEW",
            Self::Block => "BLOCK",
            Self::Caution => "CAUTION",
        }
    }

    /// Whether the output may proceed to act.
    pub fn permits_execution(&self) -> bool {
        matches!(self, Self::Allow | Self::Caution)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The one externally visible artifact of a validation.
///
/// Built once by the orchestrator and never mutated afterwards; callers only
/// get read access.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationResult {
    request_id: Uuid,
    tenant_id: String,
    agent_id: String,
    violations: Vec<Violation>,
    divergence_score: Option<f64>,
    drift: Option<DriftAlert>,
    risk: RiskAssessment,
    action: Action,
    degraded: bool,
    degraded_reason: Option<String>,
    latency_ms: f64,
    timestamp: DateTime<Utc>,
}

/// All the pieces of a result, assembled by the orchestrator.
#[derive(Debug, Clone)]
pub(crate) struct ResultParts {
    pub request_id: Uuid,
    pub tenant_id: String,
    pub agent_id: String,
    pub violations: Vec<Violation>,
    pub divergence_score: Option<f64>,
    pub drift: Option<DriftAlert>,
    pub risk: RiskAssessment,
    pub action: Action,
    pub degraded_reason: Option<String>,
    pub latency_ms: f64,
}

impl ResultParts {
    pub(crate) fn finish(self) -> ValidationResult {
        ValidationResult {
            request_id: self.request_id,
            tenant_id: self.tenant_id,
            agent_id: self.agent_id,
            violations: self.violations,
            divergence_score: self.divergence_score.map(|d| d.clamp(0.0, 1.0)),
            drift: self.drift,
            risk: self.risk,
            action: self.action,
            degraded: self.degraded_reason.is_some(),
            degraded_reason: self.degraded_reason,
            latency_ms: self.latency_ms,
            timestamp: Utc::now(),
        }
    }
}

impl ValidationResult {
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Divergence in [0, 1]; `None` when the divergence check did not complete.
    pub fn divergence_score(&self) -> Option<f64> {
        self.divergence_score
    }

    pub fn drift(&self) -> Option<&DriftAlert> {
        self.drift.as_ref()
    }

    pub fn risk(&self) -> &RiskAssessment {
        &self.risk
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn degraded(&self) -> bool {
        self.degraded
    }

    /// Why the decision was rendered without a full assessment, if it was.
    pub fn degraded_reason(&self) -> Option<&str> {
        self.degraded_reason.as_deref()
    }

    pub fn latency_ms(&self) -> f64 {
        self.latency_ms
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn has_violation(&self, rule_name: &str) -> bool {
        self.violations.iter().any(|v| v.rule_name() == rule_name)
    }
}

/// Status label of a decision as presented to a hosting transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStatus {
    Ok,
    ConstraintViolated,
    HallucinationDetected,
    Caution,
}

/// Wire shape of a decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionOutput {
    pub request_id: Uuid,
    pub status: DecisionStatus,
    pub action: Action,
    pub entropy_score: f64,
    pub confidence_level: RiskLevel,
    pub confidence: f64,
    pub degraded: bool,
    pub violations: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift: Option<DriftAlert>,
    pub recommendation: String,
    pub timestamp: DateTime<Utc>,
}

impl DecisionOutput {
    /// HTTP-style status code for a hosting transport.
    pub fn http_status(&self) -> u16 {
        match (self.status, self.action) {
            (DecisionStatus::Ok, _) => 200,
            (DecisionStatus::Caution, _) => 202,
            (DecisionStatus::HallucinationDetected, _) => 400,
            (DecisionStatus::ConstraintViolated, Action::Block) => 424,
            (DecisionStatus::ConstraintViolated, _) => 422,
        }
    }
}

impl From<&ValidationResult> for DecisionOutput {
    fn from(result: &ValidationResult) -> Self {
        let status = match result.action() {
            Action::Allow => DecisionStatus::Ok,
            Action::Caution => DecisionStatus::Caution,
            Action::Review | Action::Block if !result.violations().is_empty() => {
                DecisionStatus::ConstraintViolated
            }
            // Divergence never computed: a failed dependency, not a hallucination.
            Action::Review | Action::Block if result.degraded() && result.divergence_score().is_none() => {
                DecisionStatus::ConstraintViolated
            }
            Action::Review | Action::Block => DecisionStatus::HallucinationDetected,
        };

        let recommendation = match result.action() {
            Action::Allow if result.degraded() => {
                "Checks bypassed; allowed in degraded mode.".to_string()
            }
            Action::Allow => "Safe to execute.".to_string(),
            Action::Caution => {
                "Validation budget exceeded; caution flagged for downstream review.".to_string()
            }
            Action::Review => format!(
                "Manual review recommended. Confidence: {}",
                result.risk().risk_level
            ),
            Action::Block if result.violations().is_empty() && result.degraded() => {
                "Checks did not complete; blocked under strict failure mode.".to_string()
            }
            Action::Block => result
                .violations()
                .iter()
                .find(|v| v.is_critical())
                .or_else(|| result.violations().first())
                .map_or_else(
                    || result.risk().risk_level.explanation().to_string(),
                    super::violation::Violation::impact_description,
                ),
        };

        Self {
            request_id: result.request_id(),
            status,
            action: result.action(),
            entropy_score: result.divergence_score().unwrap_or(0.0),
            confidence_level: result.risk().risk_level,
            confidence: result.risk().confidence,
            degraded: result.degraded(),
            violations: result
                .violations()
                .iter()
                .map(|v| v.message().to_string())
                .collect(),
            drift: result.drift().copied(),
            recommendation,
            timestamp: result.timestamp(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(action: Action, violations: Vec<Violation>) -> ValidationResult {
        ResultParts {
            request_id: Uuid::new_v4(),
            tenant_id: "t".to_string(),
            agent_id: "a".to_string(),
            violations,
            divergence_score: Some(0.3),
            drift: None,
            risk: RiskAssessment {
                confidence: 0.4,
                risk_level: RiskLevel::Red,
                overall_severity: 2.0,
            },
            action,
            degraded_reason: None,
            latency_ms: 1.0,
        }
        .finish()
    }

    #[test]
    fn test_status_mapping() {
        let leverage = Violation::measured("leverage_ratio", "Leverage ratio exceeds hard limit", 4.2, 3.0);

        let blocked = DecisionOutput::from(&result(Action::Block, vec![leverage.clone()]));
        assert_eq!(blocked.status, DecisionStatus::ConstraintViolated);
        assert_eq!(blocked.http_status(), 424);
        assert_eq!(blocked.violations, vec!["Leverage ratio exceeds hard limit".to_string()]);

        let review = DecisionOutput::from(&result(Action::Review, vec![leverage]));
        assert_eq!(review.http_status(), 422);

        let hallucination = DecisionOutput::from(&result(Action::Block, vec![]));
        assert_eq!(hallucination.status, DecisionStatus::HallucinationDetected);
        assert_eq!(hallucination.http_status(), 400);

        let ok = DecisionOutput::from(&result(Action::Allow, vec![]));
        assert_eq!(ok.http_status(), 200);

        let caution = DecisionOutput::from(&result(Action::Caution, vec![]));
        assert_eq!(caution.status, DecisionStatus::Caution);
        assert_eq!(caution.http_status(), 202);
    }

    #[test]
    fn test_unassessed_block_is_a_failed_dependency() {
        let parts = ResultParts {
            request_id: Uuid::new_v4(),
            tenant_id: "t".to_string(),
            agent_id: "a".to_string(),
            violations: vec![],
            divergence_score: None,
            drift: None,
            risk: RiskAssessment::unassessed(RiskLevel::Red),
            action: Action::Block,
            degraded_reason: Some("budget_exceeded".to_string()),
            latency_ms: 50.0,
        };
        let output = DecisionOutput::from(&parts.finish());
        assert_eq!(output.status, DecisionStatus::ConstraintViolated);
        assert_eq!(output.http_status(), 424);
        assert!(output.recommendation.contains("did not complete"));
    }

    #[test]
    fn test_output_serializes_screaming_case() {
        let output = DecisionOutput::from(&result(Action::Block, vec![]));
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["status"], "HALLUCINATION_DETECTED");
        assert_eq!(json["confidence_level"], "RED");
        assert_eq!(json["action"], "BLOCK");
    }

    #[test]
    fn test_divergence_is_clamped() {
        let mut parts = ResultParts {
            request_id: Uuid::new_v4(),
            tenant_id: "t".to_string(),
            agent_id: "a".to_string(),
            violations: vec![],
            divergence_score: Some(1.5),
            drift: None,
            risk: RiskAssessment::unassessed(RiskLevel::Yellow),
            action: Action::Caution,
            degraded_reason: Some("budget_exceeded".to_string()),
            latency_ms: 51.0,
        };
        let clamped = parts.clone().finish();
        assert_eq!(clamped.divergence_score(), Some(1.0));
        assert!(clamped.degraded());

        parts.divergence_score = None;
        assert_eq!(parts.finish().divergence_score(), None);
    }
}
