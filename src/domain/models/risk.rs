use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Green,
    Yellow,
    Red,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Green => "GREEN",
            Self::Yellow => "YELLOW",
            Self::Red => "RED",
        }
    }

    pub fn explanation(&self) -> &'static str {
        match self {
            Self::Green => "High confidence. Safe to execute.",
            Self::Yellow => "Moderate confidence. Manual review recommended.",
            Self::Red => "Low confidence. DO NOT EXECUTE.",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Combined confidence and tier for one request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Confidence in [0, 1].
    pub confidence: f64,
    pub risk_level: RiskLevel,
    /// Mean violation weight, 0 when there are no violations.
    pub overall_severity: f64,
}

impl RiskAssessment {
    /// Placeholder for decisions rendered without a completed assessment.
    pub fn unassessed(risk_level: RiskLevel) -> Self {
        Self {
            confidence: 0.0,
            risk_level,
            overall_severity: 0.0,
        }
    }
}
