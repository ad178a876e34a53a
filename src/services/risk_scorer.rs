//! Confidence and risk tier from divergence and violations.

use crate::domain::models::{RiskAssessment, RiskConfig, RiskLevel, Violation};

/// Pure scorer: identical inputs always yield identical assessments.
#[derive(Debug, Clone, Default)]
pub struct RiskScorer {
    config: RiskConfig,
}

impl RiskScorer {
    pub fn new(config: RiskConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, divergence: f64, violations: &[Violation]) -> RiskAssessment {
        let overall_severity = if violations.is_empty() {
            0.0
        } else {
            violations.iter().map(Violation::weight).sum::<f64>() / violations.len() as f64
        };

        let penalty = self.config.violation_penalty * violations.len() as f64;
        let raw = 1.0 - divergence - penalty;
        let confidence = if raw.is_nan() { 0.0 } else { raw.clamp(0.0, 1.0) };

        let any_critical = violations.iter().any(Violation::is_critical);
        let risk_level = if confidence < self.config.red_confidence || any_critical {
            RiskLevel::Red
        } else if confidence >= self.config.green_confidence && violations.is_empty() {
            RiskLevel::Green
        } else {
            RiskLevel::Yellow
        };

        RiskAssessment {
            confidence,
            risk_level,
            overall_severity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::SeverityTier;

    fn energy() -> Violation {
        Violation::measured("conservation_of_energy", "energy", 0.10, 0.05)
    }

    fn leverage() -> Violation {
        Violation::measured("leverage_ratio", "leverage", 4.2, 3.0)
    }

    #[test]
    fn test_clean_low_divergence_is_green() {
        let r = RiskScorer::default().score(0.1, &[]);
        assert_eq!(r.risk_level, RiskLevel::Green);
        assert!((r.confidence - 0.9).abs() < 1e-9);
        assert!(r.overall_severity.abs() < f64::EPSILON);
    }

    #[test]
    fn test_clean_moderate_divergence_is_yellow() {
        let r = RiskScorer::default().score(0.3, &[]);
        assert_eq!(r.risk_level, RiskLevel::Yellow);
    }

    #[test]
    fn test_any_violation_prevents_green() {
        let minor = Violation::measured("t", "t", 1.1, 1.0);
        let r = RiskScorer::default().score(0.0, &[minor]);
        assert!((r.confidence - 0.85).abs() < 1e-9);
        assert_eq!(r.risk_level, RiskLevel::Yellow);
        assert!((r.overall_severity - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_critical_forces_red() {
        let critical = Violation::flagged("kyc", "denied", SeverityTier::Critical);
        let r = RiskScorer::default().score(0.0, &[critical]);
        assert_eq!(r.risk_level, RiskLevel::Red);
    }

    #[test]
    fn test_end_to_end_combination() {
        // energy: 100% over -> medium; leverage: 40% over -> medium
        let r = RiskScorer::default().score(1.0 / 3.0, &[energy(), leverage()]);
        assert!((r.confidence - (1.0 - 1.0 / 3.0 - 0.3)).abs() < 1e-9);
        assert_eq!(r.risk_level, RiskLevel::Red);
        assert!((r.overall_severity - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_confidence_floors_at_zero() {
        let many: Vec<Violation> = (0..10).map(|_| leverage()).collect();
        let r = RiskScorer::default().score(0.9, &many);
        assert!(r.confidence.abs() < f64::EPSILON);
        assert_eq!(r.risk_level, RiskLevel::Red);
    }
}
