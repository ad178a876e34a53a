pub mod config;
pub mod decision;
pub mod drift;
pub mod request;
pub mod risk;
pub mod rules;
pub mod violation;

pub use config::{
    BudgetConfig, CircuitBreakerConfig, Config, ConstraintLimits, DivergenceConfig, DriftConfig,
    EmbeddingConfig, FailureMode, LoggingConfig, RiskConfig, TenantsConfig,
};
pub use decision::{Action, DecisionOutput, DecisionStatus, ValidationResult};
pub use drift::DriftAlert;
pub use request::{FinancialPayload, PhysicsPayload, ValidationRequest};
pub use risk::{RiskAssessment, RiskLevel};
pub use rules::{HttpMethod, RuleDocument, RuleSpec, RuleType};
pub use violation::{SeverityTier, Violation};
