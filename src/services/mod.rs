pub mod circuit_breaker;
pub mod compliance;
pub mod constraint_engine;
pub mod divergence;
pub mod drift_detector;
pub mod guard;
pub mod orchestrator;
pub mod risk_scorer;
pub mod rules;
pub mod state_store;

pub use circuit_breaker::{Admission, AdmissionTicket, CircuitBreakerService, CircuitState, CircuitStats};
pub use constraint_engine::ConstraintEngine;
pub use divergence::DivergenceAnalyzer;
pub use drift_detector::DriftDetector;
pub use guard::{Accepted, Candidate, Guard, Rejection};
pub use orchestrator::{OrchestratorBuilder, ValidationOrchestrator};
pub use risk_scorer::RiskScorer;
pub use rules::{Rule, RuleRegistry, RuleSet};
pub use state_store::KeyedStateStore;
