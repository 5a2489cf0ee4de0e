//! Mean-variance allocations: maximum Sharpe ratio and minimum risk with an
//! optional return floor.

use serde::{Deserialize, Serialize};

use crate::error::PortfolioRiskError;
use crate::linalg::vec_dot;
use crate::optimization::quadratic::{solve_qp, QuadraticProgram};
use crate::optimization::{normalize_weights, Allocation, AllocationObjective};
use crate::portfolio::metrics::{dense_sharpe, dense_volatility};
use crate::risk_model::estimator::RiskModel;
use crate::PortfolioRiskResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MeanVarianceObjective {
    MaxSharpe,
    /// `target_return` is periodic
    MinRisk { target_return: Option<f64> },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeanVarianceSettings {
    pub objective: MeanVarianceObjective,
    pub allow_short: bool,
    pub max_iterations: u32,
}

/// Solve a mean-variance objective on `model`. `periodic_risk_free` is the
/// per-period hurdle used by the Sharpe objective.
pub fn optimize_mean_variance(
    model: &RiskModel,
    settings: &MeanVarianceSettings,
    periodic_risk_free: f64,
) -> PortfolioRiskResult<Allocation> {
    match settings.objective {
        MeanVarianceObjective::MaxSharpe => max_sharpe(model, settings, periodic_risk_free),
        MeanVarianceObjective::MinRisk { target_return } => min_risk(model, settings, target_return),
    }
}

/// min yᵀΣy s.t. (μ - rf)ᵀy = 1, then w = y / Σy.
fn max_sharpe(
    model: &RiskModel,
    settings: &MeanVarianceSettings,
    periodic_risk_free: f64,
) -> PortfolioRiskResult<Allocation> {
    let objective = AllocationObjective::MaxSharpe;
    let label = objective.label();
    let excess: Vec<f64> = model.mean_returns().iter().map(|m| m - periodic_risk_free).collect();
    let largest = excess.iter().fold(0.0_f64, |acc, e| acc.max(e.abs()));

    if !settings.allow_short && excess.iter().all(|e| *e <= 0.0) {
        return Err(PortfolioRiskError::optimization(
            label,
            "No asset has an expected return above the risk-free rate",
        ));
    }
    if largest == 0.0 {
        return Err(PortfolioRiskError::optimization(
            label,
            "Every asset earns exactly the risk-free rate",
        ));
    }

    let solution = solve_qp(
        &QuadraticProgram {
            hessian: model.covariance().to_vec(),
            linear: vec![0.0; model.num_assets()],
            equalities: vec![excess.iter().map(|e| e / largest).collect()],
            rhs: vec![1.0],
            non_negative: !settings.allow_short,
        },
        label,
        settings.max_iterations,
    )?;

    let total: f64 = solution.x.iter().sum();
    let gross: f64 = solution.x.iter().map(|v| v.abs()).sum();
    if total <= 1e-12 * gross.max(f64::MIN_POSITIVE) {
        return Err(PortfolioRiskError::optimization(
            label,
            "Tangency portfolio is undefined: the maximum-Sharpe direction has a non-positive budget",
        ));
    }

    let weights = normalize_weights(model.tickers(), &solution.x, objective, !settings.allow_short)?;
    let dense = weights.resolve(model.tickers(), "risk model")?;
    log::debug!("max sharpe solved in {} iterations", solution.iterations);
    Ok(Allocation {
        objective,
        objective_value: dense_sharpe(model, &dense, periodic_risk_free),
        weights,
        iterations: solution.iterations,
    })
}

/// min wᵀΣw s.t. Σw = 1 and, when a target is set, wᵀμ ≥ target.
///
/// The budget-only problem is solved first; if it misses the target the
/// floor is binding at the optimum and the problem is re-solved with
/// wᵀμ = target.
fn min_risk(
    model: &RiskModel,
    settings: &MeanVarianceSettings,
    target_return: Option<f64>,
) -> PortfolioRiskResult<Allocation> {
    let objective = AllocationObjective::MinRisk;
    let label = objective.label();
    let n = model.num_assets();

    let base = QuadraticProgram {
        hessian: model.covariance().to_vec(),
        linear: vec![0.0; n],
        equalities: vec![vec![1.0; n]],
        rhs: vec![1.0],
        non_negative: !settings.allow_short,
    };
    let mut solution = solve_qp(&base, label, settings.max_iterations)?;
    let mut iterations = solution.iterations;

    if let Some(target) = target_return {
        let achieved = vec_dot(&solution.x, model.mean_returns());
        if achieved < target - 1e-12 {
            let mut constrained = base;
            constrained.equalities.push(model.mean_returns().to_vec());
            constrained.rhs.push(target);
            solution = solve_qp(&constrained, label, settings.max_iterations).map_err(|e| match e {
                PortfolioRiskError::Optimization { .. } => PortfolioRiskError::optimization(
                    label,
                    format!("Target return {target:.6} per period is not attainable ({e})"),
                ),
                other => other,
            })?;
            iterations += solution.iterations;
        }
    }

    let weights = normalize_weights(model.tickers(), &solution.x, objective, !settings.allow_short)?;
    let dense = weights.resolve(model.tickers(), "risk model")?;
    Ok(Allocation {
        objective,
        objective_value: dense_volatility(model, &dense),
        weights,
        iterations,
    })
}
