#![cfg(feature = "synthetic")]

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use statrs::distribution::Normal;
use std::sync::Arc;

use portfolio_risk_core::analysis::engine::{AllocationStatus, RebalanceDirection};
use portfolio_risk_core::analysis::{
    analyze_returns, load_returns, portfolio_metrics, run_analysis, AnalysisConfig,
};
use portfolio_risk_core::data::returns::{DataOrigin, ReturnMatrix};
use portfolio_risk_core::data::source::{
    DataSource, HistoryRequest, PriceColumn, PriceConvention, PriceTable,
};
use portfolio_risk_core::data::synthetic::SyntheticSpec;
use portfolio_risk_core::optimization::AllocationObjective;
use portfolio_risk_core::portfolio::weights::WeightVector;
use portfolio_risk_core::scenarios::concentration::ConcentrationLevel;
use portfolio_risk_core::{PortfolioRiskError, PortfolioRiskResult};

// ===========================================================================
// Fixtures
// ===========================================================================

const TICKERS: [&str; 5] = ["AAPL", "MSFT", "TLT", "VOO", "XOM"];
const MEANS: [f64; 5] = [0.0009, 0.0007, 0.0002, 0.0005, 0.0003];
const BETAS: [f64; 5] = [1.2, 1.1, -0.2, 1.0, 0.8];
const IDIO: [f64; 5] = [0.012, 0.010, 0.006, 0.002, 0.011];

fn weekdays(start: NaiveDate, count: usize) -> Vec<NaiveDate> {
    start
        .iter_days()
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .take(count)
        .collect()
}

/// One-factor returns whose sample means are exactly `MEANS`.
fn factor_returns(t: usize) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(7);
    let z = Normal::new(0.0, 1.0).unwrap();
    let mut rows: Vec<Vec<f64>> = (0..t)
        .map(|_| {
            let market = 0.01 * rng.sample(z);
            (0..5)
                .map(|i| BETAS[i] * market + IDIO[i] * rng.sample(z))
                .collect()
        })
        .collect();
    for i in 0..5 {
        let mean = rows.iter().map(|r| r[i]).sum::<f64>() / t as f64;
        for row in rows.iter_mut() {
            row[i] += MEANS[i] - mean;
        }
    }
    rows
}

fn return_matrix(t: usize) -> ReturnMatrix {
    let dates = weekdays(NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(), t);
    ReturnMatrix::new(
        dates,
        TICKERS.iter().map(|s| s.to_string()).collect(),
        factor_returns(t),
        DataOrigin::Historical,
    )
    .unwrap()
}

/// Close prices compounding `factor_returns`, with one extra leading row.
fn price_table(t: usize) -> PriceTable {
    let rows = factor_returns(t);
    let dates = weekdays(NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(), t + 1);
    let columns = TICKERS
        .iter()
        .enumerate()
        .map(|(i, ticker)| {
            let mut price = 100.0;
            let mut values = vec![Some(price)];
            for row in &rows {
                price *= 1.0 + row[i];
                values.push(Some(price));
            }
            PriceColumn {
                ticker: ticker.to_string(),
                values,
            }
        })
        .collect();
    PriceTable::wide(PriceConvention::Close, dates, columns)
}

struct MemorySource(PriceTable);

impl DataSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    fn fetch(&self, _request: &HistoryRequest) -> PortfolioRiskResult<PriceTable> {
        Ok(self.0.clone())
    }
}

struct OfflineSource;

impl DataSource for OfflineSource {
    fn name(&self) -> &str {
        "offline"
    }

    fn fetch(&self, _request: &HistoryRequest) -> PortfolioRiskResult<PriceTable> {
        Err(PortfolioRiskError::DataUnavailable("provider unreachable".into()))
    }
}

fn config() -> AnalysisConfig {
    let json = r#"{
        "weights": {"AAPL": 0.2, "MSFT": 0.2, "TLT": 0.2, "VOO": 0.2, "XOM": 0.2},
        "sectors": {"AAPL": "Technology", "MSFT": "Technology", "TLT": "Bonds",
                    "VOO": "Broad Market ETF", "XOM": "Energy"},
        "market_proxy": "VOO",
        "end_date": "2024-12-31",
        "risk_free_rate": 0.0
    }"#;
    AnalysisConfig::from_json(json).unwrap()
}

fn solved_metrics(
    outcome: &AllocationStatus,
) -> &portfolio_risk_core::portfolio::metrics::PortfolioMetrics {
    match outcome {
        AllocationStatus::Solved { metrics, .. } => metrics,
        AllocationStatus::Failed { reason } => panic!("Expected a solved allocation: {reason}"),
    }
}

// ===========================================================================
// End-to-end
// ===========================================================================

#[test]
fn test_run_analysis_from_prices() {
    let source: Arc<dyn DataSource> = Arc::new(MemorySource(price_table(300)));
    let out = run_analysis(&config(), source).unwrap();
    let report = &out.result;

    assert_eq!(report.data.origin, DataOrigin::Historical);
    assert_eq!(report.data.observations, 300);
    assert_eq!(report.data.assets, 5);
    assert_eq!(report.estimator, "sample");

    // Prices round-trip to the generating means
    assert!((report.current.expected_return - MEANS.iter().sum::<f64>() / 5.0).abs() < 1e-9);
    assert!(report.current.volatility > 0.0);

    assert_eq!(report.allocations.len(), 3);
    assert_eq!(report.comparison.len(), 4);
    let labels: Vec<&str> = report.comparison.iter().map(|r| r.portfolio.as_str()).collect();
    assert_eq!(labels, vec!["Current", "Optimal", "Risk Parity", "Mean-CVaR"]);

    for outcome in &report.allocations {
        let allocation = outcome.allocation().expect("every optimizer should solve");
        let total = allocation.weights.total();
        assert!((total - 1.0).abs() < 1e-6, "{} sums to {total}", outcome.portfolio);
        assert!(allocation.weights.iter().all(|(_, w)| *w >= 0.0));
    }

    // Stress: three default scenarios, proxy perfectly correlated with itself
    assert_eq!(report.stress_results.len(), 3);
    let crash = &report.stress_results[0];
    let voo = crash.asset_impacts.iter().find(|a| a.ticker == "VOO").unwrap();
    assert!((voo.correlation - 1.0).abs() < 1e-9);
    assert!(crash.projected_return < 0.0);

    assert_eq!(report.concentration.level, ConcentrationLevel::Low);
    assert_eq!(report.sector_exposure[0].sector, "Technology");
    assert_eq!(report.rebalance.len(), 5);
    for pair in report.rebalance.windows(2) {
        assert!(pair[0].change <= pair[1].change);
    }
    assert!(out.warnings.is_empty(), "unexpected warnings: {:?}", out.warnings);
}

#[test]
fn test_max_sharpe_beats_equal_weight() {
    let returns = return_matrix(300);
    let out = analyze_returns(&config(), &returns).unwrap();
    let report = &out.result;
    let optimal = solved_metrics(&report.allocations[0].outcome);
    assert_eq!(report.allocations[0].objective, AllocationObjective::MaxSharpe);
    assert!(optimal.sharpe_ratio >= report.current.sharpe_ratio - 1e-12);
}

#[test]
fn test_min_risk_below_equal_weight() {
    let mut cfg = config();
    cfg.optimal_objective = AllocationObjective::MinRisk;
    let returns = return_matrix(300);
    let out = analyze_returns(&cfg, &returns).unwrap();
    let optimal = solved_metrics(&out.result.allocations[0].outcome);
    assert!(optimal.volatility <= out.result.current.volatility + 1e-12);
}

#[test]
fn test_risk_parity_equalises_shares() {
    let returns = return_matrix(300);
    let out = analyze_returns(&config(), &returns).unwrap();
    let rp = solved_metrics(&out.result.allocations[1].outcome);
    let shares: Vec<f64> = rp.risk_contribution.iter().map(|c| c.share).collect();
    let max = shares.iter().cloned().fold(f64::MIN, f64::max);
    let min = shares.iter().cloned().fold(f64::MAX, f64::min);
    assert!(max - min < 1e-3, "shares spread {}", max - min);
}

#[test]
fn test_min_cvar_not_worse_than_current_tail() {
    let returns = return_matrix(300);
    let out = analyze_returns(&config(), &returns).unwrap();
    let cvar_row = out.result.comparison.iter().find(|r| r.portfolio == "Mean-CVaR").unwrap();
    assert!(cvar_row.cvar <= out.result.current_tail_risk.cvar + 1e-9);
}

// ===========================================================================
// Failure isolation
// ===========================================================================

#[test]
fn test_failed_optimizer_does_not_stop_others() {
    let mut cfg = config();
    // 1% per day hurdle: nothing beats it
    cfg.risk_free_rate = 2.52;
    let returns = return_matrix(300);
    let out = analyze_returns(&cfg, &returns).unwrap();
    let report = &out.result;

    assert!(matches!(report.allocations[0].outcome, AllocationStatus::Failed { .. }));
    assert!(report.allocations[1].allocation().is_some());
    assert!(report.allocations[2].allocation().is_some());
    assert_eq!(report.comparison.len(), 3);
    assert!(report.rebalance.is_empty());
    assert!(out.warnings.iter().any(|w| w.contains("Optimal")));
}

#[test]
fn test_unknown_weight_ticker() {
    let mut cfg = config();
    cfg.weights.insert("TSLA", 0.1);
    let returns = return_matrix(60);
    assert!(matches!(
        analyze_returns(&cfg, &returns),
        Err(PortfolioRiskError::UnknownAsset { .. })
    ));
}

// ===========================================================================
// Data loading and the synthetic fallback
// ===========================================================================

#[test]
fn test_no_fallback_surfaces_data_error() {
    let err = load_returns(&config(), Arc::new(OfflineSource)).unwrap_err();
    assert!(err.is_data_error());
}

#[test]
fn test_fallback_is_flagged() {
    let mut cfg = config();
    cfg.synthetic_fallback = Some(SyntheticSpec::default());
    let out = run_analysis(&cfg, Arc::new(OfflineSource)).unwrap();
    assert_eq!(out.result.data.origin, DataOrigin::Synthetic);
    assert!(out.warnings[0].contains("SYNTHETIC"));
    assert!(out.warnings.iter().any(|w| w.contains("illustrative")));
}

#[test]
fn test_short_history_is_insufficient() {
    let source: Arc<dyn DataSource> = Arc::new(MemorySource(price_table(10)));
    let err = load_returns(&config(), Arc::clone(&source)).unwrap_err();
    assert!(matches!(
        err,
        PortfolioRiskError::InsufficientData { required: 30, actual: 10 }
    ));

    let mut cfg = config();
    cfg.synthetic_fallback = Some(SyntheticSpec::default());
    let loaded = load_returns(&cfg, source).unwrap();
    assert!(loaded.returns.is_synthetic());
    assert_eq!(loaded.warnings.len(), 1);
}

// ===========================================================================
// Metrics entry point and serialisation
// ===========================================================================

#[test]
fn test_portfolio_metrics_entry_point() {
    let returns = return_matrix(120);
    let out = portfolio_metrics(&config(), &returns).unwrap();
    assert_eq!(out.result.metrics.risk_contribution.len(), 5);
    assert!(out.result.tail_risk.cvar >= out.result.tail_risk.var);
    assert_eq!(out.result.tail_risk.tail_observations, 6);
}

#[test]
fn test_zero_weights_serialise_nan_sharpe_as_null() {
    let mut cfg = config();
    cfg.weights = WeightVector::from_pairs(TICKERS.iter().map(|t| (*t, 0.0))).unwrap();
    let returns = return_matrix(60);
    let out = portfolio_metrics(&cfg, &returns).unwrap();
    assert!(out.result.metrics.sharpe_ratio.is_nan());
    let json = serde_json::to_value(&out).unwrap();
    assert!(json["result"]["metrics"]["sharpe_ratio"].is_null());
}

#[test]
fn test_rebalance_directions() {
    let returns = return_matrix(300);
    let out = analyze_returns(&config(), &returns).unwrap();
    for action in &out.result.rebalance {
        let expected = if action.change > 0.0 {
            RebalanceDirection::Increase
        } else {
            RebalanceDirection::Decrease
        };
        assert_eq!(action.action, expected);
        assert!((action.target - action.current - action.change).abs() < 1e-15);
    }
}
