//! Audit sink port.
//!
//! Decisions and late check outcomes are handed to the sink after the fact;
//! persistence is the implementation's concern.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::models::{Action, RiskLevel, Violation};

/// What produced an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditKind {
    /// A rendered decision.
    Decision,
    /// Full check set run in the background while the circuit was open.
    BackgroundCheck,
    /// Checks that finished after the synchronous budget expired.
    LateCheck,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::BackgroundCheck => "background_check",
            Self::LateCheck => "late_check",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    pub kind: AuditKind,
    pub request_id: Uuid,
    pub tenant_id: String,
    pub agent_id: String,
    /// Action rendered for the request. Late and background outcomes never change it.
    pub action: Action,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_level: Option<RiskLevel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub divergence_score: Option<f64>,
    pub violations: Vec<Violation>,
    /// Regulatory articles implicated by a block.
    pub articles: Vec<String>,
    pub degraded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub timestamp: DateTime<Utc>,
}

pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent);
}
