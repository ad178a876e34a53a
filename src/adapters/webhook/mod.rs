//! HTTP transport for delegated (webhook) rules.
//!
//! POST sends `{rule, agent_id, fields}` as JSON; GET sends the same data as
//! query parameters. The response must be `{approved, reason?}`. Anything
//! else, including a non-2xx status, is reported as unreachable.

use anyhow::Context;
use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::HttpMethod;
use crate::domain::ports::{DelegateCall, DelegateVerdict, RuleDelegate};

#[derive(Debug, Clone)]
pub struct HttpRuleDelegate {
    client: reqwest::Client,
}

impl HttpRuleDelegate {
    /// Per-rule timeouts are enforced by the constraint engine, so the client carries none.
    pub fn new() -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("vlayer/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build webhook HTTP client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn unreachable(call: &DelegateCall, reason: impl Into<String>) -> DomainError {
        DomainError::WebhookUnreachable {
            rule: call.rule.clone(),
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl RuleDelegate for HttpRuleDelegate {
    #[instrument(skip(self, call), fields(rule = %call.rule, url = %call.url))]
    async fn evaluate(&self, call: &DelegateCall) -> DomainResult<DelegateVerdict> {
        let request = match call.method {
            HttpMethod::Post => self.client.post(&call.url).json(call),
            HttpMethod::Get => {
                let mut query: Vec<(&str, String)> = vec![
                    ("rule", call.rule.clone()),
                    ("agent_id", call.agent_id.clone()),
                ];
                query.extend(call.fields.iter().map(|(k, v)| (k.as_str(), v.to_string())));
                self.client.get(&call.url).query(&query)
            }
        };

        let response = request
            .send()
            .await
            .map_err(|e| Self::unreachable(call, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::unreachable(call, format!("status {status}")));
        }

        let verdict: DelegateVerdict = response
            .json()
            .await
            .map_err(|e| Self::unreachable(call, format!("malformed response: {e}")))?;

        debug!(approved = verdict.approved, "Delegate answered");
        Ok(verdict)
    }
}
