//! Validation orchestration.
//!
//! One request: admission through the tenant's circuit breaker, the checks
//! (divergence then drift, and constraints alongside) each in their own task,
//! a wait of at most the sync budget, then one immutable decision built from
//! every check that finished in time. Checks still running when the budget
//! expires are detached, not aborted; their results are audited if they land
//! within the async budget and never change the decision.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::decision::ResultParts;
use crate::domain::models::{
    Action, Config, DriftAlert, FailureMode, RiskAssessment, RiskLevel, TenantsConfig, ValidationRequest,
    ValidationResult, Violation,
};
use crate::domain::ports::{AuditEvent, AuditKind, AuditSink, EmbeddingProvider, RuleDelegate};
use crate::services::circuit_breaker::{AdmissionTicket, CircuitBreakerService};
use crate::services::compliance::map_violations_to_articles;
use crate::services::constraint_engine::ConstraintEngine;
use crate::services::divergence::DivergenceAnalyzer;
use crate::services::drift_detector::DriftDetector;
use crate::services::risk_scorer::RiskScorer;
use crate::services::rules::{RuleRegistry, RuleSet};

/// Reason recorded on results rendered without a complete assessment.
pub mod degraded {
    pub const CIRCUIT_OPEN: &str = "circuit_open";
    pub const BUDGET_EXCEEDED: &str = "budget_exceeded";
    pub const CHECK_FAILED: &str = "check_failed";
}

/// What the check set produced for one request.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub divergence: DomainResult<f64>,
    /// Present only when the agent had prior history.
    pub drift: Option<DriftAlert>,
    pub violations: Vec<Violation>,
}

/// Divergence and the drift alert derived from it.
type DivergenceOutcome = (DomainResult<f64>, Option<DriftAlert>);

/// The concurrently dispatched checks.
struct CheckSet {
    divergence: DivergenceAnalyzer,
    constraints: ConstraintEngine,
    drift: DriftDetector,
}

impl CheckSet {
    async fn divergence_then_drift(&self, request: &ValidationRequest) -> DivergenceOutcome {
        let divergence = self.divergence.score(&request.samples).await;
        let drift = divergence
            .as_ref()
            .ok()
            .map(|d| self.drift.update_and_check(&request.agent_id, *d))
            .filter(|alert| alert.history_len > 0);
        (divergence, drift)
    }

    async fn run(&self, request: &ValidationRequest, ruleset: &RuleSet) -> CheckReport {
        let ((divergence, drift), violations) = tokio::join!(
            self.divergence_then_drift(request),
            self.constraints.evaluate(request, ruleset)
        );
        CheckReport {
            divergence,
            drift,
            violations,
        }
    }

    /// Spawn divergence and constraints as separate tasks, so either can be
    /// collected while the other is still running.
    fn spawn(
        self: &Arc<Self>,
        request: &Arc<ValidationRequest>,
        ruleset: &Arc<RuleSet>,
    ) -> (JoinHandle<DivergenceOutcome>, JoinHandle<Vec<Violation>>) {
        let divergence = {
            let checks = Arc::clone(self);
            let request = Arc::clone(request);
            tokio::spawn(async move { checks.divergence_then_drift(&request).await })
        };
        let constraints = {
            let checks = Arc::clone(self);
            let request = Arc::clone(request);
            let ruleset = Arc::clone(ruleset);
            tokio::spawn(async move { checks.constraints.evaluate(&request, &ruleset).await })
        };
        (divergence, constraints)
    }
}

/// A spawned check as seen at the sync deadline.
enum Stage<T> {
    Finished(T),
    Running(JoinHandle<T>),
}

impl<T> Stage<T> {
    async fn until(mut handle: JoinHandle<T>, deadline: tokio::time::Instant) -> Result<Self, JoinError> {
        match tokio::time::timeout_at(deadline, &mut handle).await {
            Ok(joined) => joined.map(Self::Finished),
            Err(_) => Ok(Self::Running(handle)),
        }
    }

    fn finished(&self) -> Option<&T> {
        match self {
            Self::Finished(value) => Some(value),
            Self::Running(_) => None,
        }
    }

    async fn join(self) -> Result<T, JoinError> {
        match self {
            Self::Finished(value) => Ok(value),
            Self::Running(handle) => handle.await,
        }
    }
}

/// The coordination core.
#[derive(Clone)]
pub struct ValidationOrchestrator {
    checks: Arc<CheckSet>,
    scorer: RiskScorer,
    circuits: CircuitBreakerService,
    rules: Arc<RuleRegistry>,
    audit: Option<Arc<dyn AuditSink>>,
    tenants: TenantsConfig,
    sync_budget: Duration,
    async_budget: Duration,
    entropy_threshold: f64,
}

/// Assembles an orchestrator from configuration and injected collaborators.
pub struct OrchestratorBuilder {
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
    delegate: Option<Arc<dyn RuleDelegate>>,
    rules: Option<Arc<RuleRegistry>>,
    audit: Option<Arc<dyn AuditSink>>,
    circuits: Option<CircuitBreakerService>,
    drift: Option<DriftDetector>,
}

impl OrchestratorBuilder {
    pub fn rules(mut self, rules: Arc<RuleRegistry>) -> Self {
        self.rules = Some(rules);
        self
    }

    pub fn delegate(mut self, delegate: Arc<dyn RuleDelegate>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    pub fn audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Share circuit state with another orchestrator or inspect it from tests.
    pub fn circuit_breakers(mut self, circuits: CircuitBreakerService) -> Self {
        self.circuits = Some(circuits);
        self
    }

    pub fn drift_detector(mut self, drift: DriftDetector) -> Self {
        self.drift = Some(drift);
        self
    }

    pub fn build(self) -> ValidationOrchestrator {
        let config = self.config;
        let mut constraints = ConstraintEngine::new(config.constraints.clone())
            .with_timeout_cap(Duration::from_millis(config.budget.webhook_timeout_ms));
        if let Some(delegate) = self.delegate {
            constraints = constraints.with_delegate(delegate);
        }

        ValidationOrchestrator {
            checks: Arc::new(CheckSet {
                divergence: DivergenceAnalyzer::new(self.embedder, config.divergence.sample_count),
                constraints,
                drift: self
                    .drift
                    .unwrap_or_else(|| DriftDetector::new(config.drift.clone())),
            }),
            scorer: RiskScorer::new(config.risk.clone()),
            circuits: self
                .circuits
                .unwrap_or_else(|| CircuitBreakerService::new(config.circuit_breaker.clone())),
            rules: self.rules.unwrap_or_default(),
            audit: self.audit,
            tenants: config.tenants.clone(),
            sync_budget: config.budget.sync_budget(),
            async_budget: config.budget.async_budget(),
            entropy_threshold: config.divergence.entropy_threshold,
        }
    }
}

impl ValidationOrchestrator {
    pub fn builder(config: Config, embedder: Arc<dyn EmbeddingProvider>) -> OrchestratorBuilder {
        OrchestratorBuilder {
            config,
            embedder,
            delegate: None,
            rules: None,
            audit: None,
            circuits: None,
            drift: None,
        }
    }

    pub fn rules(&self) -> &Arc<RuleRegistry> {
        &self.rules
    }

    pub fn circuit_breakers(&self) -> &CircuitBreakerService {
        &self.circuits
    }

    pub fn drift_detector(&self) -> &DriftDetector {
        &self.checks.drift
    }

    /// Validate one proposed output for `tenant`.
    ///
    /// Only a malformed sample set is returned as an error; every other failure
    /// resolves into the result's action.
    #[instrument(skip(self, request), fields(agent = %request.agent_id))]
    pub async fn validate(&self, tenant: &str, request: ValidationRequest) -> DomainResult<ValidationResult> {
        let started = Instant::now();
        self.checks.divergence.check_sample_count(&request.samples)?;

        let request_id = Uuid::new_v4();
        let mode = self.tenants.mode_for(tenant);
        let ticket = self.circuits.ticket(tenant);
        let admission = ticket.admission();
        let request = Arc::new(request);
        let ruleset = self.rules.get(&request.agent_id);

        if admission.is_bypass() && !mode.is_strict() {
            return Ok(self.bypass(tenant, request_id, request, ruleset, ticket, started));
        }
        if admission.is_bypass() {
            debug!(tenant, "Circuit open but tenant is strict; running full checks");
        }

        let deadline = tokio::time::Instant::now() + self.sync_budget;
        let (divergence, constraints) = self.checks.spawn(&request, &ruleset);
        let constraints = Stage::until(constraints, deadline).await;
        let divergence = Stage::until(divergence, deadline).await;

        let (parts, success) = match (divergence, constraints) {
            (Ok(Stage::Finished((divergence, drift))), Ok(Stage::Finished(violations))) => {
                let report = CheckReport {
                    divergence,
                    drift,
                    violations,
                };
                self.assess(request_id, tenant, &request, report, mode)
            }
            (Ok(divergence), Ok(constraints)) => {
                let err = DomainError::BudgetExceeded {
                    budget_ms: duration_ms(self.sync_budget),
                };
                let completed = constraints.finished().cloned().unwrap_or_default();
                let (action, risk) = unfinished(mode, &completed);
                warn!(
                    tenant,
                    mode = mode.as_str(),
                    action = %action,
                    completed_violations = completed.len(),
                    error = %err,
                    "Validation budget exceeded"
                );
                self.continue_late(tenant, request_id, &request, action, divergence, constraints);
                (
                    self.parts(request_id, tenant, &request, completed, None, None, risk, action)
                        .degraded(degraded::BUDGET_EXCEEDED),
                    false,
                )
            }
            (divergence, constraints) => {
                let completed = match &constraints {
                    Ok(stage) => stage.finished().cloned().unwrap_or_default(),
                    Err(_) => Vec::new(),
                };
                if let Some(join_err) = divergence.err().or_else(|| constraints.err()) {
                    warn!(tenant, error = %join_err, "Check task failed");
                }
                let (action, risk) = unfinished(mode, &completed);
                (
                    self.parts(request_id, tenant, &request, completed, None, None, risk, action)
                        .degraded(degraded::CHECK_FAILED),
                    false,
                )
            }
        };

        ticket.settle(success);
        Ok(self.render(parts, started))
    }

    /// Circuit open, tenant fails open: allow now, check in the background.
    fn bypass(
        &self,
        tenant: &str,
        request_id: Uuid,
        request: Arc<ValidationRequest>,
        ruleset: Arc<RuleSet>,
        ticket: AdmissionTicket,
        started: Instant,
    ) -> ValidationResult {
        let err = DomainError::CircuitOpen {
            tenant: tenant.to_string(),
        };
        info!(tenant, error = %err, "Checks bypassed; allowing in degraded mode");
        ticket.settle(false);

        let checks = Arc::clone(&self.checks);
        let scorer = self.scorer.clone();
        let audit = self.audit.clone();
        let budget = self.async_budget;
        let tenant_id = tenant.to_string();
        let background_request = Arc::clone(&request);
        tokio::spawn(async move {
            let request = background_request;
            match tokio::time::timeout(budget, checks.run(&request, &ruleset)).await {
                Ok(report) => {
                    let event = late_event(
                        AuditKind::BackgroundCheck,
                        request_id,
                        &tenant_id,
                        &request,
                        Action::Allow,
                        &report,
                        &scorer,
                    );
                    emit(audit.as_deref(), event);
                }
                Err(_) => {
                    warn!(tenant = %tenant_id, %request_id, "Background checks exceeded async budget");
                }
            }
        });

        let parts = self
            .parts(
                request_id,
                tenant,
                &request,
                Vec::new(),
                None,
                None,
                RiskAssessment::unassessed(RiskLevel::Yellow),
                Action::Allow,
            )
            .degraded(degraded::CIRCUIT_OPEN);
        self.render(parts, started)
    }

    /// Turn a completed report into a decision. Returns the circuit outcome.
    fn assess(
        &self,
        request_id: Uuid,
        tenant: &str,
        request: &ValidationRequest,
        report: CheckReport,
        mode: FailureMode,
    ) -> (ResultParts, bool) {
        match report.divergence {
            Ok(divergence) => {
                let risk = self.scorer.score(divergence, &report.violations);
                let action = decide(&risk, &report.violations, divergence, self.entropy_threshold);
                let parts = self.parts(
                    request_id,
                    tenant,
                    request,
                    report.violations,
                    Some(divergence),
                    report.drift,
                    risk,
                    action,
                );
                (parts, true)
            }
            Err(err) => {
                warn!(tenant, error = %err, kind = err.kind(), "Divergence check failed");
                let (action, risk) = unfinished(mode, &report.violations);
                let parts = self
                    .parts(request_id, tenant, request, report.violations, None, None, risk, action)
                    .degraded(degraded::CHECK_FAILED);
                (parts, false)
            }
        }
    }

    /// Keep waiting for detached checks, up to what is left of the async budget.
    fn continue_late(
        &self,
        tenant: &str,
        request_id: Uuid,
        request: &Arc<ValidationRequest>,
        rendered: Action,
        divergence: Stage<DivergenceOutcome>,
        constraints: Stage<Vec<Violation>>,
    ) {
        let remaining = self.async_budget.saturating_sub(self.sync_budget);
        let scorer = self.scorer.clone();
        let audit = self.audit.clone();
        let tenant_id = tenant.to_string();
        let request = Arc::clone(request);
        tokio::spawn(async move {
            let pending = async { tokio::join!(divergence.join(), constraints.join()) };
            match tokio::time::timeout(remaining, pending).await {
                Ok((Ok((divergence, drift)), Ok(violations))) => {
                    let report = CheckReport {
                        divergence,
                        drift,
                        violations,
                    };
                    let event = late_event(
                        AuditKind::LateCheck,
                        request_id,
                        &tenant_id,
                        &request,
                        rendered,
                        &report,
                        &scorer,
                    );
                    emit(audit.as_deref(), event);
                }
                Ok((divergence, constraints)) => {
                    if let Some(join_err) = divergence.err().or_else(|| constraints.err()) {
                        warn!(tenant = %tenant_id, %request_id, error = %join_err, "Late check task failed");
                    }
                }
                // Dropping the handles detaches the tasks; they are not aborted.
                Err(_) => {
                    warn!(tenant = %tenant_id, %request_id, "Late checks exceeded async budget; result discarded");
                }
            }
        });
    }

    #[allow(clippy::too_many_arguments)]
    fn parts(
        &self,
        request_id: Uuid,
        tenant: &str,
        request: &ValidationRequest,
        violations: Vec<Violation>,
        divergence_score: Option<f64>,
        drift: Option<DriftAlert>,
        risk: RiskAssessment,
        action: Action,
    ) -> ResultParts {
        ResultParts {
            request_id,
            tenant_id: tenant.to_string(),
            agent_id: request.agent_id.clone(),
            violations,
            divergence_score,
            drift,
            risk,
            action,
            degraded_reason: None,
            latency_ms: 0.0,
        }
    }

    fn render(&self, mut parts: ResultParts, started: Instant) -> ValidationResult {
        parts.latency_ms = started.elapsed().as_secs_f64() * 1000.0;
        let result = parts.finish();

        info!(
            request_id = %result.request_id(),
            tenant = result.tenant_id(),
            action = %result.action(),
            risk_level = %result.risk().risk_level,
            confidence = result.risk().confidence,
            divergence = result.divergence_score(),
            violations = result.violations().len(),
            degraded = result.degraded(),
            latency_ms = result.latency_ms(),
            "Validation decision"
        );

        let articles = if result.action() == Action::Block {
            map_violations_to_articles(result.violations())
        } else {
            Vec::new()
        };
        emit(
            self.audit.as_deref(),
            AuditEvent {
                kind: AuditKind::Decision,
                request_id: result.request_id(),
                tenant_id: result.tenant_id().to_string(),
                agent_id: result.agent_id().to_string(),
                action: result.action(),
                risk_level: Some(result.risk().risk_level),
                divergence_score: result.divergence_score(),
                violations: result.violations().to_vec(),
                articles,
                degraded: result.degraded(),
                note: result.degraded_reason().map(str::to_string),
                timestamp: result.timestamp(),
            },
        );
        result
    }
}

impl ResultParts {
    fn degraded(mut self, reason: &str) -> Self {
        self.degraded_reason = Some(reason.to_string());
        self
    }
}

/// Action for a completed assessment.
fn decide(risk: &RiskAssessment, violations: &[Violation], divergence: f64, entropy_threshold: f64) -> Action {
    if violations.iter().any(Violation::is_critical) {
        return Action::Block;
    }
    match risk.risk_level {
        RiskLevel::Red => Action::Block,
        RiskLevel::Yellow => Action::Review,
        RiskLevel::Green if divergence > entropy_threshold => Action::Review,
        RiskLevel::Green => Action::Allow,
    }
}

/// Action and placeholder risk when the checks did not complete.
fn unfinished(mode: FailureMode, completed: &[Violation]) -> (Action, RiskAssessment) {
    if mode.is_strict() || completed.iter().any(Violation::is_critical) {
        (Action::Block, RiskAssessment::unassessed(RiskLevel::Red))
    } else {
        (Action::Caution, RiskAssessment::unassessed(RiskLevel::Yellow))
    }
}

fn late_event(
    kind: AuditKind,
    request_id: Uuid,
    tenant: &str,
    request: &ValidationRequest,
    rendered: Action,
    report: &CheckReport,
    scorer: &RiskScorer,
) -> AuditEvent {
    let divergence = report.divergence.as_ref().ok().copied();
    let risk = divergence.map(|d| scorer.score(d, &report.violations));
    let note = match (&report.divergence, risk) {
        (Err(err), _) => format!("divergence unavailable: {err}"),
        (Ok(_), Some(risk)) => format!(
            "would have been {} (confidence {:.2})",
            risk.risk_level, risk.confidence
        ),
        (Ok(_), None) => String::new(),
    };
    info!(
        kind = kind.as_str(),
        %request_id,
        tenant,
        rendered = %rendered,
        violations = report.violations.len(),
        drift_detected = report.drift.is_some_and(|d| d.detected),
        "Checks completed after decision"
    );
    AuditEvent {
        kind,
        request_id,
        tenant_id: tenant.to_string(),
        agent_id: request.agent_id.clone(),
        action: rendered,
        risk_level: risk.map(|r| r.risk_level),
        divergence_score: divergence,
        violations: report.violations.clone(),
        articles: map_violations_to_articles(&report.violations),
        degraded: true,
        note: Some(note),
        timestamp: Utc::now(),
    }
}

fn emit(audit: Option<&dyn AuditSink>, event: AuditEvent) {
    if let Some(sink) = audit {
        sink.record(event);
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::SeverityTier;

    fn green(confidence: f64) -> RiskAssessment {
        RiskAssessment {
            confidence,
            risk_level: RiskLevel::Green,
            overall_severity: 0.0,
        }
    }

    #[test]
    fn test_decide() {
        assert_eq!(decide(&green(0.9), &[], 0.1, 0.4), Action::Allow);
        assert_eq!(decide(&green(0.9), &[], 0.45, 0.4), Action::Review);

        let yellow = RiskAssessment {
            risk_level: RiskLevel::Yellow,
            ..green(0.7)
        };
        assert_eq!(decide(&yellow, &[], 0.3, 0.4), Action::Review);

        let critical = Violation::flagged("kyc", "denied", SeverityTier::Critical);
        assert_eq!(decide(&yellow, &[critical], 0.0, 0.4), Action::Block);
    }

    #[test]
    fn test_unfinished_by_mode() {
        let (action, risk) = unfinished(FailureMode::Strict, &[]);
        assert_eq!(action, Action::Block);
        assert_eq!(risk.risk_level, RiskLevel::Red);

        let (action, risk) = unfinished(FailureMode::Performance, &[]);
        assert_eq!(action, Action::Caution);
        assert_eq!(risk.risk_level, RiskLevel::Yellow);
        assert!(risk.confidence.abs() < f64::EPSILON);

        let critical = Violation::measured("value_at_risk", "loss", 50_000.0, 10_000.0);
        let (action, _) = unfinished(FailureMode::Balanced, &[critical]);
        assert_eq!(action, Action::Block);
    }
}
