//! Audit sinks.

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::domain::ports::{AuditEvent, AuditKind, AuditSink};

/// Writes every audit event as a structured tracing event on target `vlayer::audit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: AuditEvent) {
        let violations = match serde_json::to_string(&event.violations) {
            Ok(json) => json,
            Err(err) => {
                warn!(target: "vlayer::audit", error = %err, "Failed to serialize violations");
                String::from("[]")
            }
        };
        let articles = event.articles.join(",");
        let risk_level = event.risk_level.map(|r| r.to_string());

        match event.kind {
            AuditKind::Decision => info!(
                target: "vlayer::audit",
                kind = event.kind.as_str(),
                request_id = %event.request_id,
                tenant = %event.tenant_id,
                agent = %event.agent_id,
                action = %event.action,
                risk_level = risk_level.as_deref(),
                divergence = event.divergence_score,
                degraded = event.degraded,
                violations = %violations,
                articles = %articles,
                note = event.note.as_deref(),
                timestamp = %event.timestamp,
                "Validation decision"
            ),
            AuditKind::BackgroundCheck | AuditKind::LateCheck => info!(
                target: "vlayer::audit",
                kind = event.kind.as_str(),
                request_id = %event.request_id,
                tenant = %event.tenant_id,
                agent = %event.agent_id,
                action = %event.action,
                risk_level = risk_level.as_deref(),
                divergence = event.divergence_score,
                violations = %violations,
                note = event.note.as_deref(),
                timestamp = %event.timestamp,
                "Deferred check outcome"
            ),
        }
    }
}

/// Keeps events in memory; used by tests and embedders that ship events elsewhere.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn of_kind(&self, kind: AuditKind) -> Vec<AuditEvent> {
        self.events.lock().iter().filter(|e| e.kind == kind).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}
