use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declared energy balance of a proposed action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhysicsPayload {
    pub energy_in: f64,
    pub energy_out: f64,
}

/// Declared financial exposure of a proposed action.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FinancialPayload {
    /// Proposed loss. Sign is not significant: a loss is its magnitude.
    pub proposed_loss: f64,
}

/// A proposed agent output awaiting a decision.
///
/// Candidate samples plus the physical, financial and metric state the agent
/// declared alongside them. Requests are shared read-only between the
/// concurrent checks once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRequest {
    /// Candidate response samples (canonically three).
    pub samples: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physics: Option<PhysicsPayload>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub financial: Option<FinancialPayload>,

    /// Named numeric metrics (temperature, pressure, leverage_ratio, ...).
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,

    /// Key of the agent that produced the samples; drift history is kept per agent.
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
}

fn default_agent_id() -> String {
    "default".to_string()
}

impl ValidationRequest {
    /// Create a request with only samples, for the default agent.
    pub fn new(samples: Vec<String>) -> Self {
        Self {
            samples,
            physics: None,
            financial: None,
            metrics: BTreeMap::new(),
            agent_id: default_agent_id(),
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    pub fn with_physics(mut self, energy_in: f64, energy_out: f64) -> Self {
        self.physics = Some(PhysicsPayload {
            energy_in,
            energy_out,
        });
        self
    }

    pub fn with_financial(mut self, proposed_loss: f64) -> Self {
        self.financial = Some(FinancialPayload { proposed_loss });
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Resolve a named value from metrics, falling back to the typed payload fields.
    ///
    /// Metric names are matched exactly; `energy_in`, `energy_out` and
    /// `proposed_loss` resolve from their payload blocks when not present as metrics.
    pub fn lookup(&self, name: &str) -> Option<f64> {
        if let Some(value) = self.metrics.get(name) {
            return Some(*value);
        }
        match name {
            "energy_in" => self.physics.map(|p| p.energy_in),
            "energy_out" => self.physics.map(|p| p.energy_out),
            "proposed_loss" => self.financial.map(|f| f.proposed_loss),
            _ => None,
        }
    }
}
