use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::analysis::diagnostics::DiagnosticsPolicy;
use crate::data::returns::DEFAULT_MIN_OBSERVATIONS;
#[cfg(feature = "synthetic")]
use crate::data::synthetic::SyntheticSpec;
use crate::error::PortfolioRiskError;
use crate::optimization::{AllocationObjective, OptimizerSettings};
use crate::portfolio::metrics::MetricsAssumptions;
use crate::portfolio::weights::WeightVector;
use crate::risk_model::estimator::EstimatorKind;
use crate::scenarios::concentration::ConcentrationPolicy;
use crate::scenarios::sectors::SectorMap;
use crate::scenarios::stress::StressScenario;
use crate::scenarios::ScenarioSettings;
use crate::types::*;
use crate::PortfolioRiskResult;

/// Everything one analysis run needs besides the data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Current holdings; their tickers form the analysed universe
    pub weights: WeightVector,
    #[serde(default)]
    pub sectors: SectorMap,
    /// Must be one of the held tickers
    #[serde(default)]
    pub market_proxy: Option<Ticker>,
    /// Last day of the history window; today when absent
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: u32,
    /// Annual risk-free rate
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: Rate,
    #[serde(default)]
    pub frequency: ReturnFrequency,
    #[serde(default)]
    pub estimator: EstimatorKind,
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    #[serde(default = "default_data_timeout_secs")]
    pub data_timeout_secs: u64,
    /// Mean-variance objective reported as "Optimal"
    #[serde(default = "default_optimal_objective")]
    pub optimal_objective: AllocationObjective,
    #[serde(default)]
    pub optimizer: OptimizerSettings,
    #[serde(default)]
    pub concentration: ConcentrationPolicy,
    #[serde(default)]
    pub stress_scenarios: Vec<StressScenario>,
    #[serde(default)]
    pub diagnostics: DiagnosticsPolicy,
    /// Opt-in synthetic returns when historical data cannot be used
    #[cfg(feature = "synthetic")]
    #[serde(default)]
    pub synthetic_fallback: Option<SyntheticSpec>,
}

fn default_lookback_days() -> u32 {
    365 * 3
}

fn default_risk_free_rate() -> Rate {
    0.02
}

fn default_min_observations() -> usize {
    DEFAULT_MIN_OBSERVATIONS
}

fn default_data_timeout_secs() -> u64 {
    30
}

fn default_optimal_objective() -> AllocationObjective {
    AllocationObjective::MaxSharpe
}

impl AnalysisConfig {
    /// A config with every policy at its default.
    pub fn new(weights: WeightVector) -> Self {
        AnalysisConfig {
            weights,
            sectors: SectorMap::default(),
            market_proxy: None,
            end_date: None,
            lookback_days: default_lookback_days(),
            risk_free_rate: default_risk_free_rate(),
            frequency: ReturnFrequency::default(),
            estimator: EstimatorKind::default(),
            min_observations: default_min_observations(),
            data_timeout_secs: default_data_timeout_secs(),
            optimal_objective: default_optimal_objective(),
            optimizer: OptimizerSettings::default(),
            concentration: ConcentrationPolicy::default(),
            stress_scenarios: Vec::new(),
            diagnostics: DiagnosticsPolicy::default(),
            #[cfg(feature = "synthetic")]
            synthetic_fallback: None,
        }
    }

    pub fn from_json(json: &str) -> PortfolioRiskResult<Self> {
        let config: AnalysisConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PortfolioRiskResult<()> {
        if self.weights.is_empty() {
            return Err(PortfolioRiskError::InvalidInput {
                field: "weights".into(),
                reason: "At least one position is required".into(),
            });
        }
        if let Some((ticker, _)) = self.weights.iter().find(|(_, w)| !w.is_finite()) {
            return Err(PortfolioRiskError::InvalidInput {
                field: format!("weights.{ticker}"),
                reason: "Weight must be a finite number".into(),
            });
        }
        if let Some(proxy) = &self.market_proxy {
            if !self.weights.iter().any(|(t, _)| t == proxy) {
                return Err(PortfolioRiskError::UnknownAsset {
                    asset: proxy.clone(),
                    context: "portfolio weights (market proxy)".into(),
                });
            }
        }
        if self.lookback_days == 0 {
            return Err(PortfolioRiskError::InvalidInput {
                field: "lookback_days".into(),
                reason: "Must be positive".into(),
            });
        }
        if !self.risk_free_rate.is_finite() {
            return Err(PortfolioRiskError::InvalidInput {
                field: "risk_free_rate".into(),
                reason: "Must be a finite annual rate".into(),
            });
        }
        if self.min_observations < 2 {
            return Err(PortfolioRiskError::InvalidInput {
                field: "min_observations".into(),
                reason: "A covariance needs at least 2 observations".into(),
            });
        }
        if self.data_timeout_secs == 0 {
            return Err(PortfolioRiskError::InvalidInput {
                field: "data_timeout_secs".into(),
                reason: "Must be positive".into(),
            });
        }
        if !matches!(
            self.optimal_objective,
            AllocationObjective::MaxSharpe | AllocationObjective::MinRisk
        ) {
            return Err(PortfolioRiskError::InvalidInput {
                field: "optimal_objective".into(),
                reason: "Must be max_sharpe or min_risk".into(),
            });
        }
        if let Some(bad) = self.stress_scenarios.iter().find(|s| !s.market_shock.is_finite()) {
            return Err(PortfolioRiskError::InvalidInput {
                field: format!("stress_scenarios.{}", bad.label),
                reason: "Market shock must be finite".into(),
            });
        }
        self.optimizer.validate()?;
        self.concentration.validate()?;
        self.diagnostics.validate()
    }

    /// Held tickers in sorted order.
    pub fn tickers(&self) -> Vec<Ticker> {
        self.weights.tickers()
    }

    /// `[end - lookback_days, end]`
    pub fn window(&self) -> (NaiveDate, NaiveDate) {
        let end = self
            .end_date
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let start = end
            .checked_sub_days(Days::new(u64::from(self.lookback_days)))
            .unwrap_or(NaiveDate::MIN);
        (start, end)
    }

    pub fn metrics_assumptions(&self) -> MetricsAssumptions {
        MetricsAssumptions {
            risk_free_rate: self.risk_free_rate,
            frequency: self.frequency,
        }
    }

    pub fn scenario_settings(&self) -> ScenarioSettings {
        ScenarioSettings {
            sectors: self.sectors.clone(),
            market_proxy: self.market_proxy.clone(),
            concentration: self.concentration,
            stress_scenarios: self.stress_scenarios.clone(),
        }
    }
}
