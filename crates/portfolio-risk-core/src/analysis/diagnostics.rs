use serde::{Deserialize, Serialize};

use crate::error::PortfolioRiskError;
use crate::portfolio::weights::WeightVector;
use crate::scenarios::sectors::{SectorExposure, UNMAPPED_SECTOR};
use crate::types::{Ticker, Weight};
use crate::PortfolioRiskResult;

/// Limits that trigger a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsPolicy {
    #[serde(default = "default_max_position_weight")]
    pub max_position_weight: Weight,
    #[serde(default = "default_max_sector_weight")]
    pub max_sector_weight: Weight,
}

fn default_max_position_weight() -> Weight {
    0.20
}

fn default_max_sector_weight() -> Weight {
    0.50
}

impl Default for DiagnosticsPolicy {
    fn default() -> Self {
        DiagnosticsPolicy {
            max_position_weight: default_max_position_weight(),
            max_sector_weight: default_max_sector_weight(),
        }
    }
}

impl DiagnosticsPolicy {
    pub fn validate(&self) -> PortfolioRiskResult<()> {
        for (field, value) in [
            ("diagnostics.max_position_weight", self.max_position_weight),
            ("diagnostics.max_sector_weight", self.max_sector_weight),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(PortfolioRiskError::InvalidInput {
                    field: field.into(),
                    reason: format!("Limit must be a positive weight, got {value}"),
                });
            }
        }
        Ok(())
    }
}

/// A structured observation about the current holdings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Diagnostic {
    PositionAboveLimit {
        ticker: Ticker,
        weight: Weight,
        limit: Weight,
    },
    SectorAboveLimit {
        sector: String,
        weight: Weight,
        limit: Weight,
    },
    /// Shorts carry unbounded loss potential
    ShortPosition { ticker: Ticker, weight: Weight },
}

impl Diagnostic {
    pub fn describe(&self) -> String {
        match self {
            Diagnostic::PositionAboveLimit { ticker, weight, limit } => format!(
                "{ticker} is {:.2}% of the portfolio (limit {:.2}%)",
                weight * 100.0,
                limit * 100.0
            ),
            Diagnostic::SectorAboveLimit { sector, weight, limit } => format!(
                "{sector} exposure is {:.2}% (limit {:.2}%)",
                weight * 100.0,
                limit * 100.0
            ),
            Diagnostic::ShortPosition { ticker, weight } => {
                format!("{ticker} is held short at {:.2}%", weight * 100.0)
            }
        }
    }
}

/// Position limits first (largest first), then sectors, then shorts.
/// Unmapped tickers are not treated as a sector.
pub fn diagnose(
    weights: &WeightVector,
    sector_exposure: &[SectorExposure],
    policy: &DiagnosticsPolicy,
) -> Vec<Diagnostic> {
    let mut positions: Vec<(&Ticker, Weight)> = weights
        .iter()
        .filter(|(_, w)| **w > policy.max_position_weight)
        .map(|(t, w)| (t, *w))
        .collect();
    positions.sort_by(|a, b| b.1.total_cmp(&a.1));

    let mut out: Vec<Diagnostic> = positions
        .into_iter()
        .map(|(ticker, weight)| Diagnostic::PositionAboveLimit {
            ticker: ticker.clone(),
            weight,
            limit: policy.max_position_weight,
        })
        .collect();

    out.extend(
        sector_exposure
            .iter()
            .filter(|s| s.sector != UNMAPPED_SECTOR && s.weight > policy.max_sector_weight)
            .map(|s| Diagnostic::SectorAboveLimit {
                sector: s.sector.clone(),
                weight: s.weight,
                limit: policy.max_sector_weight,
            }),
    );

    out.extend(
        weights
            .iter()
            .filter(|(_, w)| **w < 0.0)
            .map(|(ticker, w)| Diagnostic::ShortPosition {
                ticker: ticker.clone(),
                weight: *w,
            }),
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::sectors::{sector_exposure, SectorMap};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_flags_positions_sectors_and_shorts() {
        let weights = WeightVector::from_pairs([
            ("VOO", 0.33),
            ("META", 0.31),
            ("ARM", 0.21),
            ("MSFT", 0.34),
            ("NVDA", -0.19),
        ])
        .unwrap();
        let sectors: SectorMap = [
            ("VOO", "Broad Market ETF"),
            ("META", "Technology"),
            ("ARM", "Technology"),
            ("MSFT", "Technology"),
            ("NVDA", "Technology"),
        ]
        .into_iter()
        .collect();
        let exposure = sector_exposure(&weights, &sectors);
        let found = diagnose(&weights, &exposure, &DiagnosticsPolicy::default());

        let kinds: Vec<String> = found
            .iter()
            .map(|d| match d {
                Diagnostic::PositionAboveLimit { ticker, .. } => format!("position:{ticker}"),
                Diagnostic::SectorAboveLimit { sector, .. } => format!("sector:{sector}"),
                Diagnostic::ShortPosition { ticker, .. } => format!("short:{ticker}"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                "position:MSFT",
                "position:VOO",
                "position:META",
                "position:ARM",
                "sector:Technology",
                "short:NVDA",
            ]
        );
        assert!(found[5].describe().contains("-19.00%"));
    }

    #[test]
    fn test_clean_portfolio() {
        let weights = WeightVector::from_pairs([("A", 0.2), ("B", 0.2), ("C", 0.2), ("D", 0.2), ("E", 0.2)]).unwrap();
        let exposure = sector_exposure(&weights, &SectorMap::default());
        // Everything lands in "Other", which is not a real sector
        assert!(diagnose(&weights, &exposure, &DiagnosticsPolicy::default()).is_empty());
    }
}
