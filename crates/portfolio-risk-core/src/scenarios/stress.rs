//! Correlation-based stress scenarios: each asset is assumed to move with
//! the market proxy in proportion to its historical correlation with it.
//! Results are illustrative, not a factor model.

use serde::{Deserialize, Serialize};

use crate::data::returns::ReturnMatrix;
use crate::error::PortfolioRiskError;
use crate::portfolio::weights::WeightVector;
use crate::types::{Rate, Ticker, Weight};
use crate::PortfolioRiskResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressScenario {
    pub label: String,
    /// Return of the market proxy in the scenario (e.g. -0.30)
    pub market_shock: Rate,
}

impl StressScenario {
    pub fn new(label: impl Into<String>, market_shock: Rate) -> Self {
        StressScenario {
            label: label.into(),
            market_shock,
        }
    }
}

/// Market Crash, Moderate Decline and Minor Correction.
pub fn default_scenarios() -> Vec<StressScenario> {
    vec![
        StressScenario::new("Market Crash", -0.30),
        StressScenario::new("Moderate Decline", -0.15),
        StressScenario::new("Minor Correction", -0.05),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetImpact {
    pub ticker: Ticker,
    pub weight: Weight,
    pub correlation: f64,
    /// correlation × shock
    pub projected_return: Rate,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StressResult {
    pub label: String,
    pub market_shock: Rate,
    /// Σ wᵢ · projectedᵢ
    pub projected_return: Rate,
    pub asset_impacts: Vec<AssetImpact>,
}

/// Pearson correlation of every column of `returns` with column
/// `proxy`. A zero-variance series has correlation 0 with everything.
pub fn correlations_with(returns: &ReturnMatrix, proxy: &str) -> PortfolioRiskResult<Vec<f64>> {
    let p = returns.index_of(proxy).ok_or_else(|| PortfolioRiskError::UnknownAsset {
        asset: proxy.to_string(),
        context: "return matrix (market proxy)".into(),
    })?;
    let market = returns.column(p);
    Ok((0..returns.num_assets())
        .map(|j| pearson(&returns.column(j), &market))
        .collect())
}

pub fn stress_test(
    returns: &ReturnMatrix,
    weights: &WeightVector,
    proxy: &str,
    scenarios: &[StressScenario],
) -> PortfolioRiskResult<Vec<StressResult>> {
    let dense = weights.resolve(returns.tickers(), "return matrix")?;
    if let Some(bad) = scenarios.iter().find(|s| !s.market_shock.is_finite()) {
        return Err(PortfolioRiskError::InvalidInput {
            field: format!("stress_scenarios.{}", bad.label),
            reason: "Market shock must be finite".into(),
        });
    }
    let correlations = correlations_with(returns, proxy)?;

    Ok(scenarios
        .iter()
        .map(|scenario| {
            let asset_impacts: Vec<AssetImpact> = returns
                .tickers()
                .iter()
                .zip(&dense)
                .zip(&correlations)
                .filter(|((ticker, _), _)| weights.iter().any(|(t, _)| t == *ticker))
                .map(|((ticker, &weight), &correlation)| AssetImpact {
                    ticker: ticker.clone(),
                    weight,
                    correlation,
                    projected_return: correlation * scenario.market_shock,
                })
                .collect();
            let projected_return = asset_impacts
                .iter()
                .map(|a| a.weight * a.projected_return)
                .sum();
            StressResult {
                label: scenario.label.clone(),
                market_shock: scenario.market_shock,
                projected_return,
                asset_impacts,
            }
        })
        .collect())
}

fn pearson(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let mx = x.iter().sum::<f64>() / n as f64;
    let my = y.iter().sum::<f64>() / n as f64;
    let (mut sxy, mut sxx, mut syy) = (0.0, 0.0, 0.0);
    for (a, b) in x.iter().zip(y) {
        let dx = a - mx;
        let dy = b - my;
        sxy += dx * dy;
        sxx += dx * dx;
        syy += dy * dy;
    }
    if sxx <= 0.0 || syy <= 0.0 {
        return 0.0;
    }
    (sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0)
}
