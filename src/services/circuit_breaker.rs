//! Per-tenant circuit breaker over a sliding failure-rate window.
//!
//! CLOSED while the failure rate over the trailing window stays at or under the
//! threshold; OPEN (checks bypassed) once it is exceeded; HALF_OPEN after the
//! cool-down, when a quota of probe requests runs the real pipeline. The probe
//! success rate decides between CLOSED and OPEN.
//!
//! A failure is a check that errored, timed out, or blew the sync budget. A
//! correctly detected BLOCK is a success.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{info, warn};

use crate::domain::models::CircuitBreakerConfig;
use crate::services::state_store::KeyedStateStore;

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Circuit is closed, requests run the full pipeline.
    Closed,
    /// Circuit is open, checks are bypassed.
    Open,
    /// Circuit is probing recovery.
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// How a request was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Circuit closed, full pipeline.
    Normal,
    /// One of the half-open probe quota; full pipeline.
    Probe,
    /// Circuit open (or probe quota spent).
    Bypass,
}

impl Admission {
    pub fn is_bypass(&self) -> bool {
        matches!(self, Self::Bypass)
    }
}

#[derive(Debug, Clone, Copy)]
struct Outcome {
    at: DateTime<Utc>,
    success: bool,
}

/// Breaker state for one tenant.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    tenant: String,
    state: CircuitState,
    outcomes: VecDeque<Outcome>,
    opened_at: Option<DateTime<Utc>>,
    state_changed_at: DateTime<Utc>,
    probes_admitted: u32,
    probe_successes: u32,
    probe_failures: u32,
    open_count: u32,
}

impl CircuitBreaker {
    pub fn new(tenant: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            tenant: tenant.into(),
            state: CircuitState::Closed,
            outcomes: VecDeque::new(),
            opened_at: None,
            state_changed_at: now,
            probes_admitted: 0,
            probe_successes: 0,
            probe_failures: 0,
            open_count: 0,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.state
    }

    /// Decide how the next request runs. May move OPEN to HALF_OPEN.
    pub fn admit(&mut self, config: &CircuitBreakerConfig, now: DateTime<Utc>) -> Admission {
        if self.state == CircuitState::Open {
            let cooled = self
                .opened_at
                .is_some_and(|opened_at| now >= opened_at + config.cooldown());
            if !cooled {
                return Admission::Bypass;
            }
            self.half_open(now);
        }

        match self.state {
            CircuitState::Closed => Admission::Normal,
            CircuitState::HalfOpen if self.probes_admitted < config.probe_quota => {
                self.probes_admitted += 1;
                Admission::Probe
            }
            _ => Admission::Bypass,
        }
    }

    /// Record the outcome of a request admitted with `admission`.
    pub fn record(
        &mut self,
        success: bool,
        admission: Admission,
        config: &CircuitBreakerConfig,
        now: DateTime<Utc>,
    ) {
        match self.state {
            CircuitState::Closed => {
                self.outcomes.push_back(Outcome { at: now, success });
                self.prune(config, now);
                let requests = self.outcomes.len();
                if requests >= config.minimum_requests as usize
                    && self.failure_rate() > config.failure_rate_threshold
                {
                    self.open(now);
                }
            }
            // Stale outcomes from requests admitted before the transition.
            CircuitState::Open => {}
            CircuitState::HalfOpen => {
                if admission != Admission::Probe {
                    return;
                }
                if success {
                    self.probe_successes += 1;
                } else {
                    self.probe_failures += 1;
                }
                self.settle_probes(config, now);
            }
        }
    }

    fn settle_probes(&mut self, config: &CircuitBreakerConfig, now: DateTime<Utc>) {
        let quota = config.probe_quota.max(1);
        let reported = self.probe_successes + self.probe_failures;
        let best_case = f64::from(self.probe_successes + quota.saturating_sub(reported));

        if best_case / f64::from(quota) < config.probe_success_rate {
            self.open(now);
        } else if reported >= quota {
            let rate = f64::from(self.probe_successes) / f64::from(reported);
            if rate >= config.probe_success_rate {
                self.close(now);
            } else {
                self.open(now);
            }
        }
    }

    fn prune(&mut self, config: &CircuitBreakerConfig, now: DateTime<Utc>) {
        let cutoff = now - config.window();
        while self.outcomes.front().is_some_and(|o| o.at <= cutoff) {
            self.outcomes.pop_front();
        }
    }

    fn failure_rate(&self) -> f64 {
        if self.outcomes.is_empty() {
            return 0.0;
        }
        self.failure_count() as f64 / self.outcomes.len() as f64
    }

    fn failure_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }

    /// Open the circuit.
    fn open(&mut self, now: DateTime<Utc>) {
        warn!(
            tenant = %self.tenant,
            from = self.state.as_str(),
            failures = self.failure_count(),
            requests = self.outcomes.len(),
            probe_failures = self.probe_failures,
            "Circuit opened"
        );
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.state_changed_at = now;
        self.open_count += 1;
        self.reset_probes();
    }

    /// Close the circuit.
    fn close(&mut self, now: DateTime<Utc>) {
        info!(
            tenant = %self.tenant,
            probe_successes = self.probe_successes,
            "Circuit closed"
        );
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.state_changed_at = now;
        self.outcomes.clear();
        self.reset_probes();
    }

    /// Transition to half-open.
    fn half_open(&mut self, now: DateTime<Utc>) {
        info!(tenant = %self.tenant, "Circuit half-open, probing recovery");
        self.state = CircuitState::HalfOpen;
        self.state_changed_at = now;
        self.reset_probes();
    }

    fn reset_probes(&mut self) {
        self.probes_admitted = 0;
        self.probe_successes = 0;
        self.probe_failures = 0;
    }

    /// Manually reset the circuit.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.state_changed_at = now;
        self.outcomes.clear();
        self.reset_probes();
        self.open_count = 0;
    }

    pub fn stats(&self, config: &CircuitBreakerConfig, now: DateTime<Utc>) -> CircuitStats {
        let cutoff = now - config.window();
        let live = self.outcomes.iter().filter(|o| o.at > cutoff);
        let (requests, failures) = live.fold((0, 0), |(r, f), o| (r + 1, f + usize::from(!o.success)));
        CircuitStats {
            tenant: self.tenant.clone(),
            state: self.state,
            failure_count: failures,
            request_count: requests,
            window_start: self
                .outcomes
                .iter()
                .find(|o| o.at > cutoff)
                .map_or(self.state_changed_at, |o| o.at),
            last_transition: self.state_changed_at,
            open_count: self.open_count,
        }
    }
}

/// Point-in-time view of a tenant's circuit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitStats {
    pub tenant: String,
    pub state: CircuitState,
    /// Failures in the trailing window.
    pub failure_count: usize,
    /// Outcomes in the trailing window.
    pub request_count: usize,
    pub window_start: DateTime<Utc>,
    pub last_transition: DateTime<Utc>,
    pub open_count: u32,
}

/// Service for managing per-tenant circuit breakers.
#[derive(Clone)]
pub struct CircuitBreakerService {
    config: CircuitBreakerConfig,
    circuits: KeyedStateStore<CircuitBreaker>,
}

impl CircuitBreakerService {
    /// Create a new circuit breaker service.
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self::with_store(config, KeyedStateStore::new())
    }

    /// Create over an existing state store.
    pub fn with_store(config: CircuitBreakerConfig, circuits: KeyedStateStore<CircuitBreaker>) -> Self {
        Self { config, circuits }
    }

    /// Create with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }

    pub fn admit(&self, tenant: &str) -> Admission {
        self.admit_at(tenant, Utc::now())
    }

    pub fn admit_at(&self, tenant: &str, now: DateTime<Utc>) -> Admission {
        if !self.config.enabled {
            return Admission::Normal;
        }
        self.circuits.with(
            tenant,
            || CircuitBreaker::new(tenant, now),
            |circuit| circuit.admit(&self.config, now),
        )
    }

    pub fn record(&self, tenant: &str, success: bool, admission: Admission) {
        self.record_at(tenant, success, admission, Utc::now());
    }

    /// Admit a request and hold its outcome until it is settled.
    pub fn ticket(&self, tenant: &str) -> AdmissionTicket {
        AdmissionTicket {
            admission: self.admit(tenant),
            circuits: self.clone(),
            tenant: tenant.to_string(),
            settled: false,
        }
    }

    pub fn record_at(&self, tenant: &str, success: bool, admission: Admission, now: DateTime<Utc>) {
        if !self.config.enabled {
            return;
        }
        self.circuits.with(
            tenant,
            || CircuitBreaker::new(tenant, now),
            |circuit| circuit.record(success, admission, &self.config, now),
        );
    }

    /// Get the state of a circuit.
    pub fn state(&self, tenant: &str) -> Option<CircuitState> {
        self.circuits.inspect(tenant, CircuitBreaker::state)
    }

    pub fn snapshot(&self, tenant: &str) -> Option<CircuitStats> {
        let now = Utc::now();
        self.circuits.inspect(tenant, |c| c.stats(&self.config, now))
    }

    /// Get statistics for all circuits.
    pub fn stats(&self) -> Vec<CircuitStats> {
        let mut stats: Vec<CircuitStats> = self
            .circuits
            .keys()
            .iter()
            .filter_map(|tenant| self.snapshot(tenant))
            .collect();
        stats.sort_by(|a, b| a.tenant.cmp(&b.tenant));
        stats
    }

    /// Manually reset a circuit.
    pub fn reset(&self, tenant: &str) {
        if self.circuits.inspect(tenant, |_| ()).is_none() {
            return;
        }
        let now = Utc::now();
        self.circuits.with(tenant, || CircuitBreaker::new(tenant, now), |c| c.reset(now));
        info!(tenant, "Circuit manually reset");
    }

    /// Get configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

/// An admitted request whose outcome the breaker is still owed.
///
/// A probe ticket dropped unsettled (the caller abandoned the request) counts
/// as a failed probe, so the half-open quota always drains.
#[must_use = "an admission ticket must be settled with its outcome"]
pub struct AdmissionTicket {
    circuits: CircuitBreakerService,
    tenant: String,
    admission: Admission,
    settled: bool,
}

impl AdmissionTicket {
    pub fn admission(&self) -> Admission {
        self.admission
    }

    pub fn settle(mut self, success: bool) {
        self.settled = true;
        self.circuits.record(&self.tenant, success, self.admission);
    }
}

impl Drop for AdmissionTicket {
    fn drop(&mut self) {
        if self.settled || self.admission != Admission::Probe {
            return;
        }
        warn!(tenant = %self.tenant, "Probe abandoned before settling; counting as failure");
        self.circuits.record(&self.tenant, false, self.admission);
    }
}
