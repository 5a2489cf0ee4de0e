//! Scenario & Concentration Analyzer.

pub mod concentration;
pub mod sectors;
pub mod stress;

use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::data::returns::ReturnMatrix;
use crate::portfolio::weights::WeightVector;
use crate::types::*;
use crate::PortfolioRiskResult;

use self::concentration::{concentration, Concentration, ConcentrationPolicy};
use self::sectors::{sector_exposure, SectorExposure, SectorMap};
use self::stress::{stress_test, StressResult, StressScenario};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioSettings {
    #[serde(default)]
    pub sectors: SectorMap,
    /// Ticker whose correlations drive the stress projections
    #[serde(default)]
    pub market_proxy: Option<Ticker>,
    #[serde(default)]
    pub concentration: ConcentrationPolicy,
    /// Defaults to the three standard market scenarios when empty
    #[serde(default)]
    pub stress_scenarios: Vec<StressScenario>,
}

impl ScenarioSettings {
    pub fn scenarios(&self) -> Vec<StressScenario> {
        if self.stress_scenarios.is_empty() {
            stress::default_scenarios()
        } else {
            self.stress_scenarios.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    pub concentration: Concentration,
    pub sector_exposure: Vec<SectorExposure>,
    /// Empty when no market proxy is configured
    pub stress_results: Vec<StressResult>,
}

/// Concentration, sector exposure and stress projections for `weights`.
pub fn analyze_scenarios(
    returns: &ReturnMatrix,
    weights: &WeightVector,
    settings: &ScenarioSettings,
) -> PortfolioRiskResult<ComputationOutput<ScenarioReport>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let report = scenario_report(returns, weights, settings, &mut warnings)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Herfindahl concentration, sector aggregation and correlation-scaled market shocks",
        &serde_json::json!({
            "universe_size": returns.num_assets(),
            "market_proxy": settings.market_proxy,
            "concentration_thresholds": settings.concentration,
            "sectors_mapped": settings.sectors.len(),
        }),
        warnings,
        elapsed,
        report,
    ))
}

pub(crate) fn scenario_report(
    returns: &ReturnMatrix,
    weights: &WeightVector,
    settings: &ScenarioSettings,
    warnings: &mut Vec<String>,
) -> PortfolioRiskResult<ScenarioReport> {
    weights.resolve(returns.tickers(), "return matrix")?;
    let concentration = concentration(weights, returns.num_assets(), &settings.concentration)?;
    let sector_exposure = sector_exposure(weights, &settings.sectors);

    let stress_results = match &settings.market_proxy {
        Some(proxy) => stress_test(returns, weights, proxy, &settings.scenarios())?,
        None => {
            let msg = "No market proxy configured; stress scenarios skipped".to_string();
            log::warn!("{msg}");
            warnings.push(msg);
            Vec::new()
        }
    };

    Ok(ScenarioReport {
        concentration,
        sector_exposure,
        stress_results,
    })
}
