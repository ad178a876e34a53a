//! Online drift detection over per-agent divergence history.
//!
//! Each agent keeps a running mean/variance (Welford) over a bounded window of
//! its most recent divergence values. A new value is compared against the
//! statistics of the values before it, then folded in.

use std::collections::VecDeque;
use tracing::{debug, warn};

use crate::domain::models::{DriftAlert, DriftConfig};
use crate::services::state_store::KeyedStateStore;

/// Below this the historical spread is treated as zero.
const MIN_STD_DEV: f64 = 1e-12;

/// Running statistics for one agent.
#[derive(Debug, Clone, Default)]
pub struct AgentHistory {
    samples: VecDeque<f64>,
    count: usize,
    mean: f64,
    m2: f64,
}

impl AgentHistory {
    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance, `None` below two observations.
    pub fn variance(&self) -> Option<f64> {
        (self.count >= 2).then(|| (self.m2 / (self.count - 1) as f64).max(0.0))
    }

    fn push(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = x - self.mean;
        self.m2 += delta * delta2;
        self.samples.push_back(x);
    }

    /// Reverse Welford step for the oldest retained value.
    fn evict_oldest(&mut self) {
        let Some(x) = self.samples.pop_front() else {
            return;
        };
        if self.count <= 1 {
            self.count = 0;
            self.mean = 0.0;
            self.m2 = 0.0;
            return;
        }
        self.count -= 1;
        let delta = x - self.mean;
        self.mean -= delta / self.count as f64;
        self.m2 = (self.m2 - delta * (x - self.mean)).max(0.0);
    }

    fn check(&self, x: f64, config: &DriftConfig) -> DriftAlert {
        let prior = self.count;
        let Some(variance) = self.variance().filter(|_| prior >= config.min_history.max(2)) else {
            return DriftAlert::insufficient(self.mean, x, prior);
        };
        let std_dev = variance.sqrt();
        if std_dev < MIN_STD_DEV {
            return DriftAlert::insufficient(self.mean, x, prior);
        }
        let z_score = (x - self.mean) / std_dev;
        DriftAlert {
            detected: z_score.abs() > config.z_threshold,
            z_score,
            historical_mean: self.mean,
            current_value: x,
            history_len: prior,
        }
    }
}

/// Drift detector keyed by agent.
#[derive(Clone)]
pub struct DriftDetector {
    config: DriftConfig,
    histories: KeyedStateStore<AgentHistory>,
}

impl DriftDetector {
    pub fn new(config: DriftConfig) -> Self {
        Self::with_store(config, KeyedStateStore::new())
    }

    pub fn with_store(config: DriftConfig, histories: KeyedStateStore<AgentHistory>) -> Self {
        Self { config, histories }
    }

    /// Compare `value` against the agent's history, then record it.
    pub fn update_and_check(&self, agent_key: &str, value: f64) -> DriftAlert {
        let capacity = self.config.capacity.max(1);
        let alert = self.histories.with(agent_key, AgentHistory::default, |history| {
            let alert = history.check(value, &self.config);
            while history.samples.len() >= capacity {
                history.evict_oldest();
            }
            history.push(value);
            alert
        });

        if alert.detected {
            warn!(
                agent = agent_key,
                z_score = alert.z_score,
                current = value,
                historical_mean = alert.historical_mean,
                "Drift detected"
            );
        } else {
            debug!(agent = agent_key, z_score = alert.z_score, "Drift check");
        }
        alert
    }

    /// Number of retained observations for an agent.
    pub fn history_len(&self, agent_key: &str) -> usize {
        self.histories.inspect(agent_key, AgentHistory::len).unwrap_or(0)
    }

    pub fn stats(&self, agent_key: &str) -> Option<(f64, Option<f64>)> {
        self.histories.inspect(agent_key, |h| (h.mean(), h.variance()))
    }

    pub fn reset(&self, agent_key: &str) -> bool {
        self.histories.remove(agent_key)
    }
}
