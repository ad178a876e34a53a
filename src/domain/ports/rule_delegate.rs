//! Port for rules whose verdict is delegated to an external capability.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::domain::errors::DomainResult;
use crate::domain::models::HttpMethod;

/// One delegated evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DelegateCall {
    /// Rule name.
    pub rule: String,
    pub agent_id: String,
    /// The request fields the rule asked for, by name.
    pub fields: BTreeMap<String, f64>,
    #[serde(skip)]
    pub url: String,
    #[serde(skip)]
    pub method: HttpMethod,
}

/// Verdict returned by the delegate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct DelegateVerdict {
    pub approved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Transport for delegated rules.
///
/// Implementations report transport failures as `WebhookUnreachable`. The
/// hard timeout is enforced by the constraint engine, not the transport.
#[async_trait]
pub trait RuleDelegate: Send + Sync {
    async fn evaluate(&self, call: &DelegateCall) -> DomainResult<DelegateVerdict>;
}
