use serde::{Deserialize, Serialize};

use crate::error::PortfolioRiskError;
use crate::portfolio::weights::WeightVector;
use crate::PortfolioRiskResult;

/// Thresholds on the normalised Herfindahl index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationPolicy {
    #[serde(default = "default_high")]
    pub high: f64,
    #[serde(default = "default_moderate")]
    pub moderate: f64,
}

fn default_high() -> f64 {
    0.7
}

fn default_moderate() -> f64 {
    0.4
}

impl Default for ConcentrationPolicy {
    fn default() -> Self {
        ConcentrationPolicy {
            high: default_high(),
            moderate: default_moderate(),
        }
    }
}

impl ConcentrationPolicy {
    pub fn validate(&self) -> PortfolioRiskResult<()> {
        let in_range = |v: f64| v > 0.0 && v <= 1.0;
        if !in_range(self.moderate) || !in_range(self.high) || self.moderate >= self.high {
            return Err(PortfolioRiskError::InvalidInput {
                field: "concentration".into(),
                reason: format!(
                    "Thresholds must satisfy 0 < moderate < high <= 1 (got moderate={}, high={})",
                    self.moderate, self.high
                ),
            });
        }
        Ok(())
    }

    pub fn classify(&self, normalized: f64) -> ConcentrationLevel {
        if normalized > self.high {
            ConcentrationLevel::High
        } else if normalized > self.moderate {
            ConcentrationLevel::Moderate
        } else {
            ConcentrationLevel::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcentrationLevel {
    Low,
    Moderate,
    High,
}

impl ConcentrationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConcentrationLevel::Low => "low",
            ConcentrationLevel::Moderate => "moderate",
            ConcentrationLevel::High => "high",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concentration {
    /// Σwᵢ²
    pub herfindahl: f64,
    /// (H - 1/N) / (1 - 1/N), clamped to [0, 1]
    pub normalized: f64,
    pub level: ConcentrationLevel,
    pub universe_size: usize,
}

/// Herfindahl concentration of `weights` relative to a universe of
/// `universe_size` candidate assets.
pub fn concentration(
    weights: &WeightVector,
    universe_size: usize,
    policy: &ConcentrationPolicy,
) -> PortfolioRiskResult<Concentration> {
    policy.validate()?;
    if universe_size == 0 {
        return Err(PortfolioRiskError::InvalidInput {
            field: "universe_size".into(),
            reason: "Concentration needs at least one candidate asset".into(),
        });
    }

    let herfindahl: f64 = weights.iter().map(|(_, w)| w * w).sum();
    let normalized = if universe_size == 1 {
        1.0
    } else {
        let floor = 1.0 / universe_size as f64;
        ((herfindahl - floor) / (1.0 - floor)).clamp(0.0, 1.0)
    };

    Ok(Concentration {
        herfindahl,
        normalized,
        level: policy.classify(normalized),
        universe_size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_asset_of_nine() {
        let w = WeightVector::from_pairs([("VOO", 1.0)]).unwrap();
        let c = concentration(&w, 9, &ConcentrationPolicy::default()).unwrap();
        assert_eq!(c.herfindahl, 1.0);
        assert!((c.normalized - 1.0).abs() < 1e-12);
        assert_eq!(c.level, ConcentrationLevel::High);
    }

    #[test]
    fn test_equal_weight_is_unconcentrated() {
        let tickers: Vec<String> = (0..4).map(|i| format!("T{i}")).collect();
        let c = concentration(&WeightVector::equal(&tickers), 4, &ConcentrationPolicy::default()).unwrap();
        assert!((c.herfindahl - 0.25).abs() < 1e-12);
        assert!(c.normalized.abs() < 1e-12);
        assert_eq!(c.level, ConcentrationLevel::Low);
    }

    #[test]
    fn test_leverage_is_clamped() {
        let w = WeightVector::from_pairs([("A", 1.5), ("B", -0.5)]).unwrap();
        let c = concentration(&w, 2, &ConcentrationPolicy::default()).unwrap();
        assert_eq!(c.normalized, 1.0);
    }

    #[test]
    fn test_moderate_band() {
        // N = 4, H = 0.7² + 0.3² = 0.58 -> (0.58 - 0.25) / 0.75 = 0.44 -> moderate
        let w = WeightVector::from_pairs([("A", 0.7), ("B", 0.3)]).unwrap();
        let c = concentration(&w, 4, &ConcentrationPolicy::default()).unwrap();
        assert!((c.normalized - 0.44).abs() < 1e-12);
        assert_eq!(c.level.as_str(), "moderate");
    }

    #[test]
    fn test_single_candidate_universe() {
        let w = WeightVector::from_pairs([("A", 0.5)]).unwrap();
        let c = concentration(&w, 1, &ConcentrationPolicy::default()).unwrap();
        assert_eq!(c.normalized, 1.0);
    }

    #[test]
    fn test_policy_validation() {
        let policy = ConcentrationPolicy {
            high: 0.3,
            moderate: 0.4,
        };
        assert!(policy.validate().is_err());
        let w = WeightVector::from_pairs([("A", 1.0)]).unwrap();
        assert!(concentration(&w, 0, &ConcentrationPolicy::default()).is_err());
    }
}
