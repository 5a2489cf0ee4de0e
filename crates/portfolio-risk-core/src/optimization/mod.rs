//! Allocation Optimizer: alternative weight vectors under different
//! objectives, evaluated with the same metrics as the current holdings.

pub(crate) mod linear_program;
pub mod mean_variance;
pub mod min_cvar;
pub(crate) mod quadratic;
pub mod risk_parity;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::data::returns::ReturnMatrix;
use crate::error::PortfolioRiskError;
use crate::portfolio::metrics::{evaluate_portfolio, MetricsAssumptions, PortfolioMetrics};
use crate::portfolio::tail::{tail_risk, TailRisk, DEFAULT_TAIL_ALPHA};
use crate::portfolio::weights::WeightVector;
use crate::risk_model::estimator::RiskModel;
use crate::types::*;
use crate::PortfolioRiskResult;

use self::mean_variance::{optimize_mean_variance, MeanVarianceObjective, MeanVarianceSettings};
use self::min_cvar::optimize_min_cvar;
use self::risk_parity::{optimize_risk_parity, RiskParitySettings};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Which optimizer produced an allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllocationObjective {
    MaxSharpe,
    MinRisk,
    RiskParity,
    MinCvar,
}

impl AllocationObjective {
    pub fn label(&self) -> &'static str {
        match self {
            AllocationObjective::MaxSharpe => "Max Sharpe",
            AllocationObjective::MinRisk => "Min Risk",
            AllocationObjective::RiskParity => "Risk Parity",
            AllocationObjective::MinCvar => "Mean-CVaR",
        }
    }
}

impl fmt::Display for AllocationObjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Solver output. Weights sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub objective: AllocationObjective,
    pub weights: WeightVector,
    /// Active-set iterations, simplex pivots or coordinate-descent sweeps
    pub iterations: u32,
    /// Max Sharpe: periodic Sharpe. Min Risk: periodic volatility.
    /// Risk Parity: max |share - 1/N|. Mean-CVaR: periodic CVaR.
    pub objective_value: f64,
}

/// Solver knobs shared by every objective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerSettings {
    /// Permit negative weights in the mean-variance objectives
    #[serde(default)]
    pub allow_short: bool,
    /// Annual return floor for the minimum-risk objective
    #[serde(default)]
    pub target_return: Option<Rate>,
    /// Tail probability of the CVaR objective
    #[serde(default = "default_cvar_alpha")]
    pub cvar_alpha: f64,
    /// Active-set iteration cap for the quadratic programs
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub risk_parity: RiskParitySettings,
}

fn default_cvar_alpha() -> f64 {
    DEFAULT_TAIL_ALPHA
}

fn default_max_iterations() -> u32 {
    500
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        OptimizerSettings {
            allow_short: false,
            target_return: None,
            cvar_alpha: default_cvar_alpha(),
            max_iterations: default_max_iterations(),
            risk_parity: RiskParitySettings::default(),
        }
    }
}

impl OptimizerSettings {
    pub fn validate(&self) -> PortfolioRiskResult<()> {
        if !(self.cvar_alpha > 0.0 && self.cvar_alpha < 1.0) {
            return Err(PortfolioRiskError::InvalidInput {
                field: "optimizer.cvar_alpha".into(),
                reason: format!("Must be in (0, 1), got {}", self.cvar_alpha),
            });
        }
        if self.max_iterations == 0 {
            return Err(PortfolioRiskError::InvalidInput {
                field: "optimizer.max_iterations".into(),
                reason: "Must be positive".into(),
            });
        }
        if let Some(target) = self.target_return {
            if !target.is_finite() {
                return Err(PortfolioRiskError::InvalidInput {
                    field: "optimizer.target_return".into(),
                    reason: "Must be a finite annual return".into(),
                });
            }
        }
        self.risk_parity.validate()
    }
}

/// An allocation together with its evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizedPortfolio {
    pub allocation: Allocation,
    pub metrics: PortfolioMetrics,
    pub tail_risk: TailRisk,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Run one optimizer. `model` and `returns` must cover the same tickers;
/// annual rates in `assumptions`/`settings` are converted to periodic ones.
pub fn run_optimizer(
    objective: AllocationObjective,
    model: &RiskModel,
    returns: &ReturnMatrix,
    settings: &OptimizerSettings,
    assumptions: &MetricsAssumptions,
) -> PortfolioRiskResult<Allocation> {
    let freq = assumptions.frequency;
    let periodic_rf = freq.periodic_rate(assumptions.risk_free_rate);
    match objective {
        AllocationObjective::MaxSharpe | AllocationObjective::MinRisk => {
            let mv_objective = if objective == AllocationObjective::MaxSharpe {
                MeanVarianceObjective::MaxSharpe
            } else {
                MeanVarianceObjective::MinRisk {
                    target_return: settings.target_return.map(|t| freq.periodic_rate(t)),
                }
            };
            optimize_mean_variance(
                model,
                &MeanVarianceSettings {
                    objective: mv_objective,
                    allow_short: settings.allow_short,
                    max_iterations: settings.max_iterations,
                },
                periodic_rf,
            )
        }
        AllocationObjective::RiskParity => optimize_risk_parity(model, &settings.risk_parity),
        AllocationObjective::MinCvar => optimize_min_cvar(returns, settings.cvar_alpha),
    }
}

/// Solve one objective and evaluate the result.
pub fn optimize(
    objective: AllocationObjective,
    model: &RiskModel,
    returns: &ReturnMatrix,
    settings: &OptimizerSettings,
    assumptions: &MetricsAssumptions,
) -> PortfolioRiskResult<ComputationOutput<OptimizedPortfolio>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    settings.validate()?;

    let allocation = run_optimizer(objective, model, returns, settings, assumptions)?;
    let metrics = evaluate_portfolio(model, &allocation.weights, assumptions)?;
    let tail = tail_risk(returns, &allocation.weights, settings.cvar_alpha)?;

    if returns.is_synthetic() {
        warnings.push("Optimized on synthetic returns; weights are illustrative only".into());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        methodology(objective),
        &serde_json::json!({
            "objective": objective,
            "allow_short": settings.allow_short,
            "target_return": settings.target_return,
            "cvar_alpha": settings.cvar_alpha,
            "risk_free_rate": assumptions.risk_free_rate,
            "estimator": model.estimator(),
            "observations": model.observations(),
        }),
        warnings,
        elapsed,
        OptimizedPortfolio {
            allocation,
            metrics,
            tail_risk: tail,
        },
    ))
}

pub(crate) fn methodology(objective: AllocationObjective) -> &'static str {
    match objective {
        AllocationObjective::MaxSharpe => "Maximum Sharpe ratio (convex reformulation, active-set QP)",
        AllocationObjective::MinRisk => "Minimum variance with optional return floor (active-set QP)",
        AllocationObjective::RiskParity => "Equal risk contribution (cyclical coordinate descent)",
        AllocationObjective::MinCvar => "Minimum CVaR (Rockafellar-Uryasev LP, two-phase simplex)",
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Scale raw solver output to a unit budget.
pub(crate) fn normalize_weights(
    tickers: &[Ticker],
    raw: &[f64],
    objective: AllocationObjective,
    long_only: bool,
) -> PortfolioRiskResult<WeightVector> {
    let cleaned: Vec<f64> = raw
        .iter()
        .map(|&w| if long_only && w < 0.0 { 0.0 } else { w })
        .collect();
    let total: f64 = cleaned.iter().sum();
    if !total.is_finite() || total.abs() < 1e-12 {
        return Err(PortfolioRiskError::optimization(
            objective.label(),
            "Solver returned weights that cannot be scaled to a unit budget",
        ));
    }
    let weights: Vec<f64> = cleaned.iter().map(|w| w / total).collect();
    Ok(WeightVector::from_dense(tickers, &weights))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_weights() {
        let tickers = vec!["A".to_string(), "B".to_string()];
        let w = normalize_weights(&tickers, &[3.0, -1e-14], AllocationObjective::MinCvar, true).unwrap();
        assert_eq!(w.get("A"), 1.0);
        assert_eq!(w.get("B"), 0.0);
        assert!(normalize_weights(&tickers, &[0.0, 0.0], AllocationObjective::MinCvar, true).is_err());
    }

    #[test]
    fn test_settings_validation() {
        let mut s = OptimizerSettings::default();
        assert!(s.validate().is_ok());
        s.cvar_alpha = 1.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn test_objective_serde() {
        let o: AllocationObjective = serde_json::from_str("\"min_cvar\"").unwrap();
        assert_eq!(o, AllocationObjective::MinCvar);
        assert_eq!(o.to_string(), "Mean-CVaR");
    }
}
