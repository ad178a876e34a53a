use serde::{Deserialize, Serialize};

/// Outcome of comparing one divergence value against an agent's history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DriftAlert {
    pub detected: bool,
    pub z_score: f64,
    pub historical_mean: f64,
    pub current_value: f64,
    /// Number of prior observations the comparison was made against.
    pub history_len: usize,
}

impl DriftAlert {
    /// An alert for an agent without enough history to judge.
    pub fn insufficient(historical_mean: f64, current_value: f64, history_len: usize) -> Self {
        Self {
            detected: false,
            z_score: 0.0,
            historical_mean,
            current_value,
            history_len,
        }
    }

    pub fn explanation(&self) -> String {
        if self.detected {
            format!(
                "Drift detected: z={:.2} (current={:.3}, historical_mean={:.3})",
                self.z_score, self.current_value, self.historical_mean
            )
        } else if self.z_score == 0.0 && self.history_len < 2 {
            "Insufficient history for drift detection".to_string()
        } else {
            format!(
                "Within normal range: z={:.2} (mean={:.3})",
                self.z_score, self.historical_mean
            )
        }
    }
}
