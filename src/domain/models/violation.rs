use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity tier of a breach, by how far the measured value overshoots its limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeverityTier {
    /// Under 25% over the limit.
    Minor,
    /// 25% to 100% over the limit.
    Medium,
    /// More than 100% over the limit.
    Critical,
}

impl SeverityTier {
    pub fn weight(self) -> f64 {
        match self {
            Self::Minor => 1.0,
            Self::Medium => 2.0,
            Self::Critical => 4.0,
        }
    }

    pub fn from_pct(severity_pct: f64) -> Self {
        if severity_pct < 25.0 {
            Self::Minor
        } else if severity_pct <= 100.0 {
            Self::Medium
        } else {
            Self::Critical
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minor => "minor",
            Self::Medium => "medium",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for SeverityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Percentage by which `measured` breaches `limit`.
///
/// A zero limit has no relative scale, so the absolute overage is used.
pub fn severity_pct(measured: f64, limit: f64) -> f64 {
    let pct = if limit == 0.0 {
        measured.abs() * 100.0
    } else {
        (measured - limit).abs() / limit.abs() * 100.0
    };
    if pct.is_finite() {
        pct
    } else {
        0.0
    }
}

/// A single breached rule. Produced by the constraint engine only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    rule_name: String,
    message: String,
    measured_value: f64,
    limit: f64,
    severity_pct: f64,
    weight: f64,
    tier: SeverityTier,
}

impl Violation {
    /// A numeric breach; severity is graded from the overshoot.
    pub fn measured(
        rule_name: impl Into<String>,
        message: impl Into<String>,
        measured_value: f64,
        limit: f64,
    ) -> Self {
        let pct = severity_pct(measured_value, limit);
        let tier = SeverityTier::from_pct(pct);
        Self {
            rule_name: rule_name.into(),
            message: message.into(),
            measured_value,
            limit,
            severity_pct: pct,
            weight: tier.weight(),
            tier,
        }
    }

    /// A breach with no numeric overshoot (denied delegate, failed evaluation).
    pub fn flagged(rule_name: impl Into<String>, message: impl Into<String>, tier: SeverityTier) -> Self {
        Self {
            rule_name: rule_name.into(),
            message: message.into(),
            measured_value: 0.0,
            limit: 0.0,
            severity_pct: 0.0,
            weight: tier.weight(),
            tier,
        }
    }

    /// Raise the tier to at least `floor`. Used for declared rule severities.
    #[must_use]
    pub fn with_floor(mut self, floor: Option<SeverityTier>) -> Self {
        if let Some(floor) = floor {
            if floor > self.tier {
                self.tier = floor;
                self.weight = floor.weight();
            }
        }
        self
    }

    pub fn rule_name(&self) -> &str {
        &self.rule_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn measured_value(&self) -> f64 {
        self.measured_value
    }

    pub fn limit(&self) -> f64 {
        self.limit
    }

    pub fn severity_pct(&self) -> f64 {
        self.severity_pct
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn tier(&self) -> SeverityTier {
        self.tier
    }

    pub fn is_critical(&self) -> bool {
        self.tier == SeverityTier::Critical
    }

    /// Human-readable impact line, e.g. `Medium violation: 40.0% over limit`.
    pub fn impact_description(&self) -> String {
        let label = match self.tier {
            SeverityTier::Minor => "Minor",
            SeverityTier::Medium => "Medium",
            SeverityTier::Critical => "Critical",
        };
        format!(
            "{label} violation: {:.1}% over limit (actual={}, limit={})",
            self.severity_pct, self.measured_value, self.limit
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_boundaries() {
        assert_eq!(SeverityTier::from_pct(0.0), SeverityTier::Minor);
        assert_eq!(SeverityTier::from_pct(24.9), SeverityTier::Minor);
        assert_eq!(SeverityTier::from_pct(25.0), SeverityTier::Medium);
        assert_eq!(SeverityTier::from_pct(100.0), SeverityTier::Medium);
        assert_eq!(SeverityTier::from_pct(100.1), SeverityTier::Critical);
    }

    #[test]
    fn test_leverage_breach_is_medium() {
        let v = Violation::measured("leverage_ratio", "Leverage ratio exceeds hard limit", 4.2, 3.0);
        assert!((v.severity_pct() - 40.0).abs() < 1e-9);
        assert!((v.weight() - 2.0).abs() < f64::EPSILON);
        assert_eq!(v.tier(), SeverityTier::Medium);
        assert!(!v.is_critical());
    }

    #[test]
    fn test_zero_limit_uses_absolute_overage() {
        assert!((severity_pct(-0.5, 0.0) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_floor_only_raises() {
        let minor = Violation::measured("t", "t", 1.1, 1.0);
        assert_eq!(minor.tier(), SeverityTier::Minor);

        let raised = minor.clone().with_floor(Some(SeverityTier::Critical));
        assert_eq!(raised.tier(), SeverityTier::Critical);
        assert!((raised.weight() - 4.0).abs() < f64::EPSILON);

        let critical = Violation::measured("t", "t", 10.0, 1.0);
        let unchanged = critical.with_floor(Some(SeverityTier::Minor));
        assert_eq!(unchanged.tier(), SeverityTier::Critical);
    }

    #[test]
    fn test_flagged_has_zero_severity_pct() {
        let v = Violation::flagged("kyc", "denied", SeverityTier::Medium);
        assert!(v.severity_pct() >= 0.0);
        assert!((v.weight() - 2.0).abs() < f64::EPSILON);
    }
}
