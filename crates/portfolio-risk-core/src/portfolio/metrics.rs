//! Portfolio Metrics Engine: return, volatility, Sharpe ratio and the
//! decomposition of volatility into per-position contributions.

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::linalg::{mat_vec_multiply, quadratic_form, sqrt_clamped, vec_dot};
use crate::portfolio::weights::WeightVector;
use crate::risk_model::estimator::RiskModel;
use crate::types::*;
use crate::PortfolioRiskResult;

const MODEL_CONTEXT: &str = "risk model";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Share of portfolio volatility attributable to one position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContribution {
    pub ticker: Ticker,
    pub weight: Weight,
    /// dσ/dw_i
    pub marginal: f64,
    /// w_i * marginal_i; sums to σ
    pub contribution: f64,
    /// contribution / Σ contribution
    pub share: f64,
}

/// Annualisation and hurdle-rate conventions for metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsAssumptions {
    /// Annual risk-free rate (decimal)
    #[serde(default)]
    pub risk_free_rate: Rate,
    #[serde(default)]
    pub frequency: ReturnFrequency,
}

impl Default for MetricsAssumptions {
    fn default() -> Self {
        MetricsAssumptions {
            risk_free_rate: 0.0,
            frequency: ReturnFrequency::Daily,
        }
    }
}

/// Risk/return summary of one weight vector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    /// Periodic expected return
    pub expected_return: f64,
    /// Periodic volatility
    pub volatility: f64,
    /// Periodic Sharpe ratio; NaN (null in JSON) when volatility is zero
    pub sharpe_ratio: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    /// (annualized return - annual rf) / annualized volatility
    pub annualized_sharpe_ratio: f64,
    /// Ordered by |share| descending
    pub risk_contribution: Vec<RiskContribution>,
}

// ---------------------------------------------------------------------------
// Scalar metrics
// ---------------------------------------------------------------------------

/// w·μ, periodic.
pub fn expected_return(model: &RiskModel, weights: &WeightVector) -> PortfolioRiskResult<f64> {
    let w = weights.resolve(model.tickers(), MODEL_CONTEXT)?;
    Ok(vec_dot(&w, model.mean_returns()))
}

/// sqrt(max(0, wᵀΣw)), periodic.
pub fn volatility(model: &RiskModel, weights: &WeightVector) -> PortfolioRiskResult<f64> {
    let w = weights.resolve(model.tickers(), MODEL_CONTEXT)?;
    Ok(dense_volatility(model, &w))
}

/// (expected return - periodic rf) / volatility. NaN when volatility is
/// exactly zero.
pub fn sharpe_ratio(
    model: &RiskModel,
    weights: &WeightVector,
    periodic_risk_free: Rate,
) -> PortfolioRiskResult<f64> {
    let w = weights.resolve(model.tickers(), MODEL_CONTEXT)?;
    Ok(dense_sharpe(model, &w, periodic_risk_free))
}

/// Euler decomposition of volatility, ordered by |share| descending.
///
/// When the portfolio has zero volatility every marginal is zero and the
/// shares are left unnormalised (all zero).
pub fn risk_contribution(
    model: &RiskModel,
    weights: &WeightVector,
) -> PortfolioRiskResult<Vec<RiskContribution>> {
    let w = weights.resolve(model.tickers(), MODEL_CONTEXT)?;
    Ok(dense_risk_contribution(model, &w))
}

// ---------------------------------------------------------------------------
// Combined evaluation
// ---------------------------------------------------------------------------

/// All metrics of one weight vector. Fails as a whole on an unknown asset.
pub fn evaluate_portfolio(
    model: &RiskModel,
    weights: &WeightVector,
    assumptions: &MetricsAssumptions,
) -> PortfolioRiskResult<PortfolioMetrics> {
    let w = weights.resolve(model.tickers(), MODEL_CONTEXT)?;
    Ok(dense_metrics(model, &w, assumptions))
}

/// [`evaluate_portfolio`] wrapped in the standard output envelope.
pub fn calculate_portfolio_metrics(
    model: &RiskModel,
    weights: &WeightVector,
    assumptions: &MetricsAssumptions,
) -> PortfolioRiskResult<ComputationOutput<PortfolioMetrics>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let metrics = evaluate_portfolio(model, weights, assumptions)?;

    if metrics.volatility == 0.0 {
        warnings.push("Portfolio volatility is zero; Sharpe ratio is undefined (NaN)".into());
    }
    let net = weights.total();
    if (net - 1.0).abs() > 1e-6 {
        warnings.push(format!(
            "Weights sum to {net:.4}, not 1.0; metrics reflect the exposure as given"
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Mean-variance portfolio metrics with Euler risk decomposition",
        &serde_json::json!({
            "estimator": model.estimator(),
            "observations": model.observations(),
            "risk_free_rate": assumptions.risk_free_rate,
            "frequency": assumptions.frequency,
        }),
        warnings,
        elapsed,
        metrics,
    ))
}

// ---------------------------------------------------------------------------
// Dense helpers (weights aligned with model.tickers())
// ---------------------------------------------------------------------------

pub(crate) fn dense_volatility(model: &RiskModel, w: &[f64]) -> f64 {
    sqrt_clamped(quadratic_form(model.covariance(), w))
}

pub(crate) fn dense_sharpe(model: &RiskModel, w: &[f64], periodic_risk_free: Rate) -> f64 {
    let vol = dense_volatility(model, w);
    if vol == 0.0 {
        return f64::NAN;
    }
    (vec_dot(w, model.mean_returns()) - periodic_risk_free) / vol
}

pub(crate) fn dense_risk_contribution(model: &RiskModel, w: &[f64]) -> Vec<RiskContribution> {
    let vol = dense_volatility(model, w);
    let sigma_w = mat_vec_multiply(model.covariance(), w);

    let marginals: Vec<f64> = if vol > 0.0 {
        sigma_w.iter().map(|s| s / vol).collect()
    } else {
        vec![0.0; w.len()]
    };
    let contributions: Vec<f64> = w.iter().zip(&marginals).map(|(wi, m)| wi * m).collect();
    let total: f64 = contributions.iter().sum();

    let mut out: Vec<RiskContribution> = model
        .tickers()
        .iter()
        .enumerate()
        .map(|(i, ticker)| RiskContribution {
            ticker: ticker.clone(),
            weight: w[i],
            marginal: marginals[i],
            contribution: contributions[i],
            share: if total != 0.0 {
                contributions[i] / total
            } else {
                contributions[i]
            },
        })
        .collect();

    out.sort_by(|a, b| {
        b.share
            .abs()
            .total_cmp(&a.share.abs())
            .then_with(|| a.ticker.cmp(&b.ticker))
    });
    out
}

pub(crate) fn dense_metrics(
    model: &RiskModel,
    w: &[f64],
    assumptions: &MetricsAssumptions,
) -> PortfolioMetrics {
    let freq = assumptions.frequency;
    let periodic_rf = freq.periodic_rate(assumptions.risk_free_rate);

    let expected_return = vec_dot(w, model.mean_returns());
    let volatility = dense_volatility(model, w);
    let sharpe_ratio = dense_sharpe(model, w, periodic_rf);
    let annualized_return = freq.annualize_return(expected_return);
    let annualized_volatility = freq.annualize_volatility(volatility);
    let annualized_sharpe_ratio = if annualized_volatility == 0.0 {
        f64::NAN
    } else {
        (annualized_return - assumptions.risk_free_rate) / annualized_volatility
    };

    PortfolioMetrics {
        expected_return,
        volatility,
        sharpe_ratio,
        annualized_return,
        annualized_volatility,
        annualized_sharpe_ratio,
        risk_contribution: dense_risk_contribution(model, w),
    }
}
