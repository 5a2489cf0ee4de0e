use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::analysis::config::AnalysisConfig;
use crate::analysis::diagnostics::{diagnose, Diagnostic};
use crate::data::returns::{build_return_matrix, DataOrigin, ReturnMatrix};
use crate::data::source::{fetch_with_timeout, DataSource, HistoryRequest};
#[cfg(feature = "synthetic")]
use crate::data::synthetic::synthetic_return_matrix;
use crate::optimization::{run_optimizer, Allocation, AllocationObjective};
use crate::portfolio::metrics::{evaluate_portfolio, MetricsAssumptions, PortfolioMetrics};
use crate::portfolio::tail::{tail_risk, TailRisk};
use crate::portfolio::weights::WeightVector;
use crate::risk_model::estimator::RiskModel;
use crate::scenarios::concentration::Concentration;
use crate::scenarios::scenario_report;
use crate::scenarios::sectors::SectorExposure;
use crate::scenarios::stress::StressResult;
use crate::types::*;
use crate::PortfolioRiskResult;

// ---------------------------------------------------------------------------
// Report types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSummary {
    pub origin: DataOrigin,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    pub observations: usize,
    pub assets: usize,
}

impl DataSummary {
    fn of(returns: &ReturnMatrix) -> Self {
        let dates = returns.dates();
        DataSummary {
            origin: returns.origin(),
            first_date: dates.first().copied().unwrap_or_default(),
            last_date: dates.last().copied().unwrap_or_default(),
            observations: returns.num_observations(),
            assets: returns.num_assets(),
        }
    }
}

/// Result of one optimizer; a failure does not stop the others.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AllocationStatus {
    Solved {
        allocation: Allocation,
        metrics: PortfolioMetrics,
        tail_risk: TailRisk,
    },
    Failed {
        reason: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllocationOutcome {
    /// Row label in the comparison ("Optimal", "Risk Parity", "Mean-CVaR")
    pub portfolio: String,
    pub objective: AllocationObjective,
    pub outcome: AllocationStatus,
}

impl AllocationOutcome {
    pub fn allocation(&self) -> Option<&Allocation> {
        match &self.outcome {
            AllocationStatus::Solved { allocation, .. } => Some(allocation),
            AllocationStatus::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonRow {
    pub portfolio: String,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub sharpe_ratio: f64,
    /// Historical periodic CVaR at the configured tail probability
    pub cvar: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RebalanceDirection {
    Increase,
    Decrease,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceAction {
    pub ticker: Ticker,
    pub current: Weight,
    pub target: Weight,
    /// target - current
    pub change: Weight,
    pub action: RebalanceDirection,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioAnalysis {
    pub data: DataSummary,
    pub estimator: String,
    pub current: PortfolioMetrics,
    pub current_tail_risk: TailRisk,
    pub allocations: Vec<AllocationOutcome>,
    pub comparison: Vec<ComparisonRow>,
    pub concentration: Concentration,
    pub sector_exposure: Vec<SectorExposure>,
    pub stress_results: Vec<StressResult>,
    pub diagnostics: Vec<Diagnostic>,
    /// Moves from the current holdings to the "Optimal" allocation, most
    /// negative change first; empty when that optimizer failed
    pub rebalance: Vec<RebalanceAction>,
}

/// Current-holdings view used by the `metrics` entry points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    pub data: DataSummary,
    pub estimator: String,
    pub metrics: PortfolioMetrics,
    pub tail_risk: TailRisk,
}

/// Returns plus any warnings raised while obtaining them.
#[derive(Debug, Clone)]
pub struct LoadedReturns {
    pub returns: ReturnMatrix,
    pub warnings: Vec<String>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Fetch history for the held tickers and build the return matrix.
///
/// Data failures (`DataUnavailable`, `InsufficientData`) fall back to
/// synthetic returns only when `synthetic_fallback` is configured.
pub fn load_returns(
    config: &AnalysisConfig,
    source: Arc<dyn DataSource>,
) -> PortfolioRiskResult<LoadedReturns> {
    config.validate()?;
    let tickers = config.tickers();
    let (start, end) = config.window();
    let request = HistoryRequest::new(tickers.clone(), start, end)?;

    log::info!(
        "fetching {} tickers from {} ({} to {})",
        tickers.len(),
        source.name(),
        start,
        end
    );
    let loaded = fetch_with_timeout(
        Arc::clone(&source),
        &request,
        Duration::from_secs(config.data_timeout_secs),
    )
    .and_then(|table| build_return_matrix(&table, &tickers, config.min_observations));

    match loaded {
        Ok(returns) => {
            log::info!(
                "built return matrix: {} observations x {} assets",
                returns.num_observations(),
                returns.num_assets()
            );
            Ok(LoadedReturns {
                returns,
                warnings: Vec::new(),
            })
        }
        #[cfg(feature = "synthetic")]
        Err(e) if e.is_data_error() && config.synthetic_fallback.is_some() => {
            let spec = config.synthetic_fallback.clone().unwrap_or_default();
            let msg = format!(
                "Historical data unusable ({e}); using SYNTHETIC returns (seed {}). Results are for demonstration only",
                spec.seed
            );
            log::warn!("{msg}");
            let returns = synthetic_return_matrix(&tickers, start, end, &spec)?;
            Ok(LoadedReturns {
                returns,
                warnings: vec![msg],
            })
        }
        Err(e) => Err(e),
    }
}

/// Full analysis over an already-built return matrix.
pub fn analyze_returns(
    config: &AnalysisConfig,
    returns: &ReturnMatrix,
) -> PortfolioRiskResult<ComputationOutput<PortfolioAnalysis>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    config.validate()?;
    config.weights.resolve(returns.tickers(), "return matrix")?;

    if returns.is_synthetic() {
        warnings.push("Returns are SYNTHETIC; every figure below is illustrative".into());
    }

    // --- Risk model ---
    let estimator = config.estimator.build();
    let model = estimator.estimate(returns)?;
    let assumptions = config.metrics_assumptions();
    let alpha = config.optimizer.cvar_alpha;

    // --- Current holdings ---
    let current = evaluate_portfolio(&model, &config.weights, &assumptions)?;
    let current_tail_risk = tail_risk(returns, &config.weights, alpha)?;
    if current.volatility == 0.0 {
        warnings.push("Current portfolio has zero volatility; Sharpe ratio is undefined".into());
    }
    let net = config.weights.total();
    if (net - 1.0).abs() > 1e-6 {
        warnings.push(format!("Weights sum to {net:.4}, not 1.0"));
    }

    // --- Alternative allocations ---
    let plan = [
        ("Optimal", config.optimal_objective),
        ("Risk Parity", AllocationObjective::RiskParity),
        ("Mean-CVaR", AllocationObjective::MinCvar),
    ];
    let allocations: Vec<AllocationOutcome> = plan
        .iter()
        .map(|(label, objective)| {
            let outcome = solve_and_evaluate(*objective, &model, returns, config, &assumptions);
            if let AllocationStatus::Failed { reason } = &outcome {
                let msg = format!("{label} ({objective}) allocation failed: {reason}");
                log::warn!("{msg}");
                warnings.push(msg);
            }
            AllocationOutcome {
                portfolio: label.to_string(),
                objective: *objective,
                outcome,
            }
        })
        .collect();

    let mut comparison = vec![comparison_row("Current", &current, &current_tail_risk)];
    for a in &allocations {
        if let AllocationStatus::Solved { metrics, tail_risk, .. } = &a.outcome {
            comparison.push(comparison_row(&a.portfolio, metrics, tail_risk));
        }
    }

    // --- Scenarios and diagnostics ---
    let scenarios = scenario_report(returns, &config.weights, &config.scenario_settings(), &mut warnings)?;
    let diagnostics = diagnose(&config.weights, &scenarios.sector_exposure, &config.diagnostics);

    let rebalance = match allocations.first().and_then(|a| a.allocation()) {
        Some(optimal) => rebalance_plan(&config.weights, &optimal.weights, returns.tickers()),
        None => Vec::new(),
    };

    log::info!(
        "analysis complete: {} of {} allocations solved, {} diagnostics",
        allocations.iter().filter(|a| a.allocation().is_some()).count(),
        allocations.len(),
        diagnostics.len()
    );

    let analysis = PortfolioAnalysis {
        data: DataSummary::of(returns),
        estimator: model.estimator().to_string(),
        current,
        current_tail_risk,
        allocations,
        comparison,
        concentration: scenarios.concentration,
        sector_exposure: scenarios.sector_exposure,
        stress_results: scenarios.stress_results,
        diagnostics,
        rebalance,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Historical mean-variance analytics with alternative allocations and correlation stress tests",
        &serde_json::json!({
            "risk_free_rate": config.risk_free_rate,
            "frequency": config.frequency,
            "estimator": model.estimator(),
            "optimal_objective": config.optimal_objective,
            "allow_short": config.optimizer.allow_short,
            "target_return": config.optimizer.target_return,
            "cvar_alpha": alpha,
            "market_proxy": config.market_proxy,
            "data_origin": returns.origin(),
        }),
        warnings,
        elapsed,
        analysis,
    ))
}

/// Metrics and tail risk of the current holdings only.
pub fn portfolio_metrics(
    config: &AnalysisConfig,
    returns: &ReturnMatrix,
) -> PortfolioRiskResult<ComputationOutput<MetricsReport>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    config.validate()?;

    let model = config.estimator.build().estimate(returns)?;
    let metrics = evaluate_portfolio(&model, &config.weights, &config.metrics_assumptions())?;
    let tail = tail_risk(returns, &config.weights, config.optimizer.cvar_alpha)?;
    if returns.is_synthetic() {
        warnings.push("Returns are SYNTHETIC; metrics are illustrative".into());
    }
    if metrics.volatility == 0.0 {
        warnings.push("Portfolio volatility is zero; Sharpe ratio is undefined".into());
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Mean-variance portfolio metrics with Euler risk decomposition and historical tail risk",
        &serde_json::json!({
            "risk_free_rate": config.risk_free_rate,
            "frequency": config.frequency,
            "estimator": model.estimator(),
            "cvar_alpha": config.optimizer.cvar_alpha,
        }),
        warnings,
        elapsed,
        MetricsReport {
            data: DataSummary::of(returns),
            estimator: model.estimator().to_string(),
            metrics,
            tail_risk: tail,
        },
    ))
}

/// [`load_returns`] followed by [`analyze_returns`]; loading warnings come
/// first in the envelope.
pub fn run_analysis(
    config: &AnalysisConfig,
    source: Arc<dyn DataSource>,
) -> PortfolioRiskResult<ComputationOutput<PortfolioAnalysis>> {
    let start = Instant::now();
    let loaded = load_returns(config, source)?;
    let mut output = analyze_returns(config, &loaded.returns)?;

    let mut warnings = loaded.warnings;
    warnings.append(&mut output.warnings);
    output.warnings = warnings;
    output.metadata.computation_time_us = start.elapsed().as_micros() as u64;
    Ok(output)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn solve_and_evaluate(
    objective: AllocationObjective,
    model: &RiskModel,
    returns: &ReturnMatrix,
    config: &AnalysisConfig,
    assumptions: &MetricsAssumptions,
) -> AllocationStatus {
    let solved = run_optimizer(objective, model, returns, &config.optimizer, assumptions).and_then(|allocation| {
        let metrics = evaluate_portfolio(model, &allocation.weights, assumptions)?;
        let tail = tail_risk(returns, &allocation.weights, config.optimizer.cvar_alpha)?;
        Ok((allocation, metrics, tail))
    });
    match solved {
        Ok((allocation, metrics, tail_risk)) => AllocationStatus::Solved {
            allocation,
            metrics,
            tail_risk,
        },
        Err(e) => AllocationStatus::Failed {
            reason: e.to_string(),
        },
    }
}

fn comparison_row(portfolio: &str, metrics: &PortfolioMetrics, tail: &TailRisk) -> ComparisonRow {
    ComparisonRow {
        portfolio: portfolio.to_string(),
        annualized_return: metrics.annualized_return,
        annualized_volatility: metrics.annualized_volatility,
        sharpe_ratio: metrics.annualized_sharpe_ratio,
        cvar: tail.cvar,
    }
}

/// Per-ticker change from `current` to `target`, ascending by change.
pub fn rebalance_plan(current: &WeightVector, target: &WeightVector, universe: &[Ticker]) -> Vec<RebalanceAction> {
    let mut plan: Vec<RebalanceAction> = universe
        .iter()
        .map(|ticker| {
            let from = current.get(ticker);
            let to = target.get(ticker);
            let change = to - from;
            RebalanceAction {
                ticker: ticker.clone(),
                current: from,
                target: to,
                change,
                action: if change > 0.0 {
                    RebalanceDirection::Increase
                } else {
                    RebalanceDirection::Decrease
                },
            }
        })
        .collect();
    plan.sort_by(|a, b| a.change.total_cmp(&b.change).then_with(|| a.ticker.cmp(&b.ticker)));
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rebalance_plan_ordering() {
        let universe: Vec<Ticker> = vec!["A".into(), "B".into(), "C".into()];
        let current = WeightVector::from_pairs([("A", 0.5), ("B", 0.3), ("C", 0.2)]).unwrap();
        let target = WeightVector::from_pairs([("A", 0.2), ("B", 0.3), ("C", 0.5)]).unwrap();
        let plan = rebalance_plan(&current, &target, &universe);
        assert_eq!(plan[0].ticker, "A");
        assert_eq!(plan[0].action, RebalanceDirection::Decrease);
        assert!((plan[0].change + 0.3).abs() < 1e-12);
        assert_eq!(plan[2].ticker, "C");
        assert_eq!(plan[2].action, RebalanceDirection::Increase);
    }
}
