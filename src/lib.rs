//! vlayer - a guardrail layer for AI-agent outputs
//!
//! Every proposed output is checked before it is allowed to act: semantic
//! divergence across several candidate samples, hard physical and financial
//! constraints (built-in and per-agent declared rules), and per-agent drift of
//! the divergence signal. The checks run concurrently under a wall-clock
//! budget behind a per-tenant circuit breaker, and each request ends in one
//! immutable decision: ALLOW, CAUTION, REVIEW or BLOCK.
//!
//! # Architecture
//!
//! - **Domain Layer** (`domain`): models, errors and the ports to external capabilities
//! - **Service Layer** (`services`): the checks, risk scoring, circuit breaking and orchestration
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging, rule document loading
//! - **Adapters** (`adapters`): embedding providers, webhook transport, audit sinks
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vlayer::adapters::embeddings::HashingEmbeddingProvider;
//! use vlayer::{Config, ValidationOrchestrator, ValidationRequest};
//!
//! # async fn run() -> anyhow::Result<()> {
//! let orchestrator =
//!     ValidationOrchestrator::builder(Config::default(), Arc::new(HashingEmbeddingProvider::default())).build();
//!
//! let request = ValidationRequest::new(vec![
//!     "Transfer 100 units".to_string(),
//!     "Transfer 100 units".to_string(),
//!     "Transfer 100 units".to_string(),
//! ]);
//! let result = orchestrator.validate("tenant-a", request).await?;
//! println!("{}", result.action());
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{
    Action, Config, DecisionOutput, DriftAlert, FailureMode, RiskAssessment, RiskLevel,
    SeverityTier, ValidationRequest, ValidationResult, Violation,
};
pub use domain::ports::{AuditEvent, AuditKind, AuditSink, EmbeddingProvider, RuleDelegate};
pub use domain::{DomainError, DomainResult};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{CircuitBreakerService, Guard, ValidationOrchestrator};
