//! Risk Model Estimator: mean-return vector and covariance matrix derived
//! from a [`ReturnMatrix`].
//!
//! The estimator sits behind the [`RiskEstimator`] trait so the covariance
//! method can be swapped without touching the consumers of [`RiskModel`].

use serde::{Deserialize, Serialize};

use crate::data::returns::ReturnMatrix;
use crate::error::PortfolioRiskError;
use crate::linalg::sqrt_clamped;
use crate::types::Ticker;
use crate::PortfolioRiskResult;

/// Default decay for the exponentially weighted estimator.
pub const DEFAULT_EWMA_LAMBDA: f64 = 0.94;

/// Statistical risk model: per-asset mean returns and covariance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskModel {
    tickers: Vec<Ticker>,
    mean_returns: Vec<f64>,
    covariance: Vec<Vec<f64>>,
    observations: usize,
    estimator: String,
}

impl RiskModel {
    /// Assemble a model from precomputed moments.
    ///
    /// The covariance must be square, match the ticker count and be
    /// symmetric.
    pub fn new(
        tickers: Vec<Ticker>,
        mean_returns: Vec<f64>,
        covariance: Vec<Vec<f64>>,
        observations: usize,
        estimator: &str,
    ) -> PortfolioRiskResult<Self> {
        let n = tickers.len();
        if n == 0 {
            return Err(PortfolioRiskError::InvalidInput {
                field: "tickers".into(),
                reason: "A risk model needs at least one asset".into(),
            });
        }
        if mean_returns.len() != n {
            return Err(PortfolioRiskError::InvalidInput {
                field: "mean_returns".into(),
                reason: format!("Expected {} values but got {}", n, mean_returns.len()),
            });
        }
        validate_covariance_matrix(&covariance, n)?;
        Ok(RiskModel {
            tickers,
            mean_returns,
            covariance,
            observations,
            estimator: estimator.to_string(),
        })
    }

    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    pub fn mean_returns(&self) -> &[f64] {
        &self.mean_returns
    }

    pub fn covariance(&self) -> &[Vec<f64>] {
        &self.covariance
    }

    pub fn observations(&self) -> usize {
        self.observations
    }

    pub fn estimator(&self) -> &str {
        &self.estimator
    }

    pub fn num_assets(&self) -> usize {
        self.tickers.len()
    }

    pub fn index_of(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    /// Standalone periodic volatility of each asset.
    pub fn asset_volatilities(&self) -> Vec<f64> {
        (0..self.num_assets())
            .map(|i| sqrt_clamped(self.covariance[i][i]))
            .collect()
    }
}

/// A method for turning historical returns into a [`RiskModel`].
pub trait RiskEstimator {
    /// Identifier recorded in the model and in report assumptions.
    fn name(&self) -> String;

    fn estimate(&self, returns: &ReturnMatrix) -> PortfolioRiskResult<RiskModel>;
}

/// Arithmetic means and sample covariance (N-1 denominator).
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleEstimator;

impl RiskEstimator for SampleEstimator {
    fn name(&self) -> String {
        "sample".to_string()
    }

    fn estimate(&self, returns: &ReturnMatrix) -> PortfolioRiskResult<RiskModel> {
        let rows = returns.rows();
        require_observations(rows.len())?;
        let means = column_means(rows);
        let weights = vec![1.0 / rows.len() as f64; rows.len()];
        // Equal weights: 1 / (1 - sum w^2) = T / (T - 1)
        let covariance = weighted_covariance(rows, &means, &weights);
        RiskModel::new(
            returns.tickers().to_vec(),
            means,
            covariance,
            rows.len(),
            &self.name(),
        )
    }
}

/// Arithmetic means with an exponentially weighted covariance.
///
/// The most recent observation has raw weight 1 and each older one is scaled
/// by `lambda`; weights are normalised and the result is bias-corrected by
/// `1 / (1 - sum w^2)`, which reduces to the sample estimator when
/// `lambda == 1`.
#[derive(Debug, Clone, Copy)]
pub struct EwmaEstimator {
    pub lambda: f64,
}

impl Default for EwmaEstimator {
    fn default() -> Self {
        EwmaEstimator {
            lambda: DEFAULT_EWMA_LAMBDA,
        }
    }
}

impl RiskEstimator for EwmaEstimator {
    fn name(&self) -> String {
        format!("ewma(lambda={})", self.lambda)
    }

    fn estimate(&self, returns: &ReturnMatrix) -> PortfolioRiskResult<RiskModel> {
        if !(self.lambda > 0.0 && self.lambda <= 1.0) {
            return Err(PortfolioRiskError::InvalidInput {
                field: "lambda".into(),
                reason: format!("Decay must be in (0, 1], got {}", self.lambda),
            });
        }
        let rows = returns.rows();
        require_observations(rows.len())?;
        let t = rows.len();

        let raw: Vec<f64> = (0..t).map(|i| self.lambda.powi((t - 1 - i) as i32)).collect();
        let total: f64 = raw.iter().sum();
        let weights: Vec<f64> = raw.iter().map(|w| w / total).collect();

        let means = column_means(rows);
        let ew_means: Vec<f64> = (0..returns.num_assets())
            .map(|j| rows.iter().zip(&weights).map(|(row, w)| w * row[j]).sum())
            .collect();
        let covariance = weighted_covariance(rows, &ew_means, &weights);

        RiskModel::new(
            returns.tickers().to_vec(),
            means,
            covariance,
            t,
            &self.name(),
        )
    }
}

/// Which estimator an analysis run uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum EstimatorKind {
    #[default]
    Sample,
    Ewma {
        #[serde(default = "default_lambda")]
        lambda: f64,
    },
}

fn default_lambda() -> f64 {
    DEFAULT_EWMA_LAMBDA
}

impl EstimatorKind {
    pub fn build(&self) -> Box<dyn RiskEstimator> {
        match *self {
            EstimatorKind::Sample => Box::new(SampleEstimator),
            EstimatorKind::Ewma { lambda } => Box::new(EwmaEstimator { lambda }),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn require_observations(t: usize) -> PortfolioRiskResult<()> {
    if t < 2 {
        return Err(PortfolioRiskError::InsufficientData {
            required: 2,
            actual: t,
        });
    }
    Ok(())
}

fn column_means(rows: &[Vec<f64>]) -> Vec<f64> {
    let cols = rows[0].len();
    let mut sums = vec![0.0; cols];
    for row in rows {
        for (s, v) in sums.iter_mut().zip(row) {
            *s += v;
        }
    }
    sums.into_iter().map(|s| s / rows.len() as f64).collect()
}

/// Reliability-weighted covariance around `centre`; weights sum to one.
#[allow(clippy::needless_range_loop)]
fn weighted_covariance(rows: &[Vec<f64>], centre: &[f64], weights: &[f64]) -> Vec<Vec<f64>> {
    let n = centre.len();
    let mut cov = vec![vec![0.0; n]; n];
    for (row, w) in rows.iter().zip(weights) {
        for i in 0..n {
            let di = row[i] - centre[i];
            for j in i..n {
                cov[i][j] += w * di * (row[j] - centre[j]);
            }
        }
    }

    let sum_sq: f64 = weights.iter().map(|w| w * w).sum();
    let correction = 1.0 / (1.0 - sum_sq);
    for i in 0..n {
        for j in i..n {
            let v = cov[i][j] * correction;
            cov[i][j] = v;
            cov[j][i] = v;
        }
    }
    cov
}

#[allow(clippy::needless_range_loop)]
fn validate_covariance_matrix(cov: &[Vec<f64>], n: usize) -> PortfolioRiskResult<()> {
    if cov.len() != n {
        return Err(PortfolioRiskError::InvalidInput {
            field: "covariance_matrix".into(),
            reason: format!("Expected {}x{} matrix but got {} rows", n, n, cov.len()),
        });
    }
    for (i, row) in cov.iter().enumerate() {
        if row.len() != n {
            return Err(PortfolioRiskError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Row {} has {} columns, expected {}", i, row.len(), n),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(PortfolioRiskError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Row {} contains a non-finite value", i),
            });
        }
    }
    for i in 0..n {
        if cov[i][i] < 0.0 {
            return Err(PortfolioRiskError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Negative variance on the diagonal at [{i},{i}]"),
            });
        }
        for j in (i + 1)..n {
            let scale = cov[i][j].abs().max(cov[j][i].abs()).max(1e-300);
            if (cov[i][j] - cov[j][i]).abs() > 1e-9 * scale.max(1e-12) {
                return Err(PortfolioRiskError::InvalidInput {
                    field: "covariance_matrix".into(),
                    reason: format!(
                        "Not symmetric: [{},{}]={} != [{},{}]={}",
                        i, j, cov[i][j], j, i, cov[j][i]
                    ),
                });
            }
        }
    }
    Ok(())
}
