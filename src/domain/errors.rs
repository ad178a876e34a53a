//! Domain errors for the vlayer validation core.

use thiserror::Error;

/// Domain-level errors that can occur while validating an agent output.
///
/// Only [`DomainError::InvalidSampleCount`] ever escapes the orchestrator; the
/// remaining variants are resolved into a check's contribution (a violation, a
/// circuit failure, a degraded decision) before a result is rendered.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DomainError {
    #[error("Invalid sample count: expected {expected}, got {actual}")]
    InvalidSampleCount { expected: usize, actual: usize },

    #[error("Rule '{rule}' failed to evaluate: {reason}")]
    RuleEvaluation { rule: String, reason: String },

    #[error("Webhook for rule '{rule}' timed out after {timeout_ms}ms")]
    WebhookTimeout { rule: String, timeout_ms: u64 },

    #[error("Webhook for rule '{rule}' unreachable: {reason}")]
    WebhookUnreachable { rule: String, reason: String },

    #[error("Validation budget of {budget_ms}ms exceeded")]
    BudgetExceeded { budget_ms: u64 },

    #[error("Circuit open for tenant '{tenant}'")]
    CircuitOpen { tenant: String },

    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Invalid rule '{rule}': {reason}")]
    InvalidRule { rule: String, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DomainError {
    /// Short machine-readable name of the error kind, used in logs and audit events.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSampleCount { .. } => "invalid_sample_count",
            Self::RuleEvaluation { .. } => "rule_evaluation_error",
            Self::WebhookTimeout { .. } => "webhook_timeout",
            Self::WebhookUnreachable { .. } => "webhook_unreachable",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::CircuitOpen { .. } => "circuit_open",
            Self::Embedding(_) => "embedding_error",
            Self::InvalidRule { .. } => "invalid_rule",
            Self::SerializationError(_) => "serialization_error",
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = DomainError::InvalidSampleCount {
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.to_string(), "Invalid sample count: expected 3, got 2");

        let err = DomainError::WebhookTimeout {
            rule: "kyc".to_string(),
            timeout_ms: 100,
        };
        assert!(err.to_string().contains("100ms"));
        assert_eq!(err.kind(), "webhook_timeout");
    }

    #[test]
    fn test_from_serde_json() {
        let err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let domain: DomainError = err.into();
        assert!(matches!(domain, DomainError::SerializationError(_)));
    }
}
