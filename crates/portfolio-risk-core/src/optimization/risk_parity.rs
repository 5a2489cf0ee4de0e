use serde::{Deserialize, Serialize};

use crate::error::PortfolioRiskError;
use crate::linalg::{mat_vec_multiply, vec_dot};
use crate::optimization::{normalize_weights, Allocation, AllocationObjective};
use crate::risk_model::estimator::RiskModel;
use crate::PortfolioRiskResult;

/// Largest tolerance accepted on the share deviation.
pub const MAX_TOLERANCE: f64 = 1e-4;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskParitySettings {
    /// Stop once max |share_i - 1/N| falls below this
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Cap on full coordinate sweeps
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
}

fn default_tolerance() -> f64 {
    1e-6
}

fn default_max_iterations() -> u32 {
    5000
}

impl Default for RiskParitySettings {
    fn default() -> Self {
        RiskParitySettings {
            tolerance: default_tolerance(),
            max_iterations: default_max_iterations(),
        }
    }
}

impl RiskParitySettings {
    pub fn validate(&self) -> PortfolioRiskResult<()> {
        if !(self.tolerance > 0.0 && self.tolerance <= MAX_TOLERANCE) {
            return Err(PortfolioRiskError::InvalidInput {
                field: "optimizer.risk_parity.tolerance".into(),
                reason: format!("Must be in (0, {MAX_TOLERANCE}], got {}", self.tolerance),
            });
        }
        if self.max_iterations == 0 {
            return Err(PortfolioRiskError::InvalidInput {
                field: "optimizer.risk_parity.max_iterations".into(),
                reason: "Must be positive".into(),
            });
        }
        Ok(())
    }
}

/// Equal-risk-contribution weights, long-only.
///
/// Minimises ½yᵀΣy - Σ bᵢ ln yᵢ with bᵢ = 1/N by cyclical coordinate
/// descent; each coordinate step is the positive root of
/// Σᵢᵢyᵢ² + cᵢyᵢ - bᵢ = 0 with cᵢ = Σ_{j≠i} Σᵢⱼyⱼ. The stationary point
/// satisfies yᵢ(Σy)ᵢ = bᵢ, so w = y / Σy has equal shares.
pub fn optimize_risk_parity(
    model: &RiskModel,
    settings: &RiskParitySettings,
) -> PortfolioRiskResult<Allocation> {
    settings.validate()?;
    let objective = AllocationObjective::RiskParity;
    let cov = model.covariance();
    let n = model.num_assets();

    if let Some(i) = (0..n).find(|&i| cov[i][i] <= 0.0) {
        return Err(PortfolioRiskError::optimization(
            objective.label(),
            format!("{} has zero variance; its risk share cannot be equalised", model.tickers()[i]),
        ));
    }

    let budget = 1.0 / n as f64;
    let mut y: Vec<f64> = (0..n).map(|i| (budget / cov[i][i]).sqrt()).collect();
    let mut deviation = share_deviation(cov, &y, budget);

    for sweep in 1..=settings.max_iterations {
        for i in 0..n {
            let c: f64 = (0..n).filter(|&j| j != i).map(|j| cov[i][j] * y[j]).sum();
            let a = cov[i][i];
            y[i] = (-c + (c * c + 4.0 * a * budget).sqrt()) / (2.0 * a);
        }
        deviation = share_deviation(cov, &y, budget);
        if deviation < settings.tolerance {
            log::debug!("risk parity converged after {sweep} sweeps (deviation {deviation:.3e})");
            let weights = normalize_weights(model.tickers(), &y, objective, true)?;
            return Ok(Allocation {
                objective,
                weights,
                iterations: sweep,
                objective_value: deviation,
            });
        }
    }

    Err(PortfolioRiskError::ConvergenceFailure {
        function: "risk parity coordinate descent".into(),
        iterations: settings.max_iterations,
        last_delta: deviation,
    })
}

/// max |share_i - budget| for the portfolio proportional to `y`.
fn share_deviation(cov: &[Vec<f64>], y: &[f64], budget: f64) -> f64 {
    let sigma_y = mat_vec_multiply(cov, y);
    let total = vec_dot(y, &sigma_y);
    if total <= 0.0 {
        return f64::INFINITY;
    }
    y.iter()
        .zip(&sigma_y)
        .map(|(yi, si)| (yi * si / total - budget).abs())
        .fold(0.0, f64::max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portfolio::metrics::dense_risk_contribution;

    fn model(cov: Vec<Vec<f64>>) -> RiskModel {
        let n = cov.len();
        let tickers = (0..n).map(|i| format!("A{i}")).collect();
        RiskModel::new(tickers, vec![0.0005; n], cov, 252, "manual").unwrap()
    }

    // ------------------------------------------------------------------
    // 1. Uncorrelated assets: weights proportional to 1/σ
    // ------------------------------------------------------------------
    #[test]
    fn test_inverse_volatility_when_uncorrelated() {
        let m = model(vec![vec![0.04, 0.0], vec![0.0, 0.01]]);
        let a = optimize_risk_parity(&m, &RiskParitySettings::default()).unwrap();
        // 1/0.2 : 1/0.1 -> 1/3 : 2/3
        assert!((a.weights.get("A0") - 1.0 / 3.0).abs() < 1e-6);
        assert!((a.weights.get("A1") - 2.0 / 3.0).abs() < 1e-6);
    }

    // ------------------------------------------------------------------
    // 2. Correlated assets: shares equal within tolerance
    // ------------------------------------------------------------------
    #[test]
    fn test_equal_shares_correlated() {
        let m = model(vec![
            vec![0.00040, 0.00012, 0.00004, 0.00008],
            vec![0.00012, 0.00025, 0.00005, 0.00006],
            vec![0.00004, 0.00005, 0.00010, 0.00002],
            vec![0.00008, 0.00006, 0.00002, 0.00030],
        ]);
        let a = optimize_risk_parity(&m, &RiskParitySettings::default()).unwrap();
        let w = a.weights.resolve(m.tickers(), "risk model").unwrap();
        let rc = dense_risk_contribution(&m, &w);
        let max = rc.iter().map(|c| c.share).fold(f64::MIN, f64::max);
        let min = rc.iter().map(|c| c.share).fold(f64::MAX, f64::min);
        assert!(max - min < 1e-3);
        assert!(w.iter().all(|v| *v > 0.0));
        assert!((w.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_zero_variance_asset() {
        let m = model(vec![vec![0.04, 0.0], vec![0.0, 0.0]]);
        let err = optimize_risk_parity(&m, &RiskParitySettings::default()).unwrap_err();
        assert!(matches!(err, PortfolioRiskError::Optimization { .. }));
    }

    #[test]
    fn test_tolerance_validated() {
        let m = model(vec![vec![0.04]]);
        let settings = RiskParitySettings {
            tolerance: 1e-2,
            max_iterations: 10,
        };
        assert!(optimize_risk_parity(&m, &settings).is_err());
    }

    #[test]
    fn test_iteration_cap() {
        let m = model(vec![
            vec![0.00040, 0.00030, 0.00004],
            vec![0.00030, 0.00025, 0.00005],
            vec![0.00004, 0.00005, 0.00010],
        ]);
        let settings = RiskParitySettings {
            tolerance: 1e-15,
            max_iterations: 1,
        };
        assert!(matches!(
            optimize_risk_parity(&m, &settings),
            Err(PortfolioRiskError::ConvergenceFailure { .. })
        ));
    }
}
