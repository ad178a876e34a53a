//! Guard middleware around output producers.
//!
//! Wraps any async producer of agent output: the output is released to the
//! caller only if its validation permits execution.

use std::future::Future;
use thiserror::Error;
use tracing::warn;

use crate::domain::errors::DomainError;
use crate::domain::models::{Action, ValidationRequest, ValidationResult};
use crate::services::orchestrator::ValidationOrchestrator;

/// A produced output together with what must be validated for it.
#[derive(Debug, Clone)]
pub struct Candidate<T> {
    pub output: T,
    pub request: ValidationRequest,
}

/// An output that passed validation (ALLOW or CAUTION).
#[derive(Debug, Clone)]
pub struct Accepted<T> {
    pub output: T,
    pub result: ValidationResult,
}

impl<T> Accepted<T> {
    /// Whether the output was allowed only because checks did not finish.
    pub fn is_caution(&self) -> bool {
        self.result.action() == Action::Caution
    }

    /// Whether the output was released without a full assessment, either on
    /// budget exhaustion or through an open circuit.
    pub fn is_degraded(&self) -> bool {
        self.result.degraded()
    }
}

/// Why an output was withheld.
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("invalid candidate: {0}")]
    InvalidInput(DomainError),

    #[error("output held for review (risk {})", .0.risk().risk_level)]
    Review(Box<ValidationResult>),

    #[error("output blocked (risk {}, {} violation(s))", .0.risk().risk_level, .0.violations().len())]
    Blocked(Box<ValidationResult>),
}

impl Rejection {
    /// The decision behind the rejection, if validation ran.
    pub fn result(&self) -> Option<&ValidationResult> {
        match self {
            Self::InvalidInput(_) => None,
            Self::Review(result) | Self::Blocked(result) => Some(result),
        }
    }
}

/// Middleware that validates every candidate before releasing it.
#[derive(Clone)]
pub struct Guard {
    orchestrator: ValidationOrchestrator,
}

impl Guard {
    pub fn new(orchestrator: ValidationOrchestrator) -> Self {
        Self { orchestrator }
    }

    /// Run `producer`, validate its candidate for `tenant`, and release or withhold it.
    pub async fn protect<T, F, Fut>(&self, tenant: &str, producer: F) -> Result<Accepted<T>, Rejection>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Candidate<T>>,
    {
        let Candidate { output, request } = producer().await;
        let result = self
            .orchestrator
            .validate(tenant, request)
            .await
            .map_err(Rejection::InvalidInput)?;

        match result.action() {
            Action::Allow | Action::Caution => Ok(Accepted { output, result }),
            Action::Review => {
                warn!(tenant, request_id = %result.request_id(), "Output held for review");
                Err(Rejection::Review(Box::new(result)))
            }
            Action::Block => {
                warn!(tenant, request_id = %result.request_id(), "Output blocked");
                Err(Rejection::Blocked(Box::new(result)))
            }
        }
    }
}
