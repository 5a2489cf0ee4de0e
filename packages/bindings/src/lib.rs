use napi::Result as NapiResult;
use napi_derive::napi;

use portfolio_risk_core::analysis::{self, AnalysisConfig};
use portfolio_risk_core::data::returns::ReturnMatrix;
use portfolio_risk_core::optimization::{self, AllocationObjective};
use portfolio_risk_core::scenarios;

/// Convert any Display error into a napi::Error.
fn to_napi_error(e: impl std::fmt::Display) -> napi::Error {
    napi::Error::from_reason(e.to_string())
}

/// Parse and validate the two JSON inputs every entry point takes.
fn parse_inputs(config_json: &str, returns_json: &str) -> NapiResult<(AnalysisConfig, ReturnMatrix)> {
    let config = AnalysisConfig::from_json(config_json).map_err(to_napi_error)?;
    let returns: ReturnMatrix = serde_json::from_str(returns_json).map_err(to_napi_error)?;
    Ok((config, returns))
}

// ---------------------------------------------------------------------------
// Analysis
// ---------------------------------------------------------------------------

#[napi]
pub fn analyze_portfolio(config_json: String, returns_json: String) -> NapiResult<String> {
    let (config, returns) = parse_inputs(&config_json, &returns_json)?;
    let output = analysis::analyze_returns(&config, &returns).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

#[napi]
pub fn portfolio_metrics(config_json: String, returns_json: String) -> NapiResult<String> {
    let (config, returns) = parse_inputs(&config_json, &returns_json)?;
    let output = analysis::portfolio_metrics(&config, &returns).map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// `objective` is one of `max_sharpe`, `min_risk`, `risk_parity`, `min_cvar`.
#[napi]
pub fn optimize_portfolio(config_json: String, returns_json: String, objective: String) -> NapiResult<String> {
    let (config, returns) = parse_inputs(&config_json, &returns_json)?;
    let objective: AllocationObjective =
        serde_json::from_value(serde_json::Value::String(objective)).map_err(to_napi_error)?;
    let model = config.estimator.build().estimate(&returns).map_err(to_napi_error)?;
    let output = optimization::optimize(
        objective,
        &model,
        &returns,
        &config.optimizer,
        &config.metrics_assumptions(),
    )
    .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[napi]
pub fn stress_scenarios(config_json: String, returns_json: String) -> NapiResult<String> {
    let (config, returns) = parse_inputs(&config_json, &returns_json)?;
    let output = scenarios::analyze_scenarios(&returns, &config.weights, &config.scenario_settings())
        .map_err(to_napi_error)?;
    serde_json::to_string(&output).map_err(to_napi_error)
}
