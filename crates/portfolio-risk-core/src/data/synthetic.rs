//! Synthetic return generation for the explicit demonstration fallback.
//!
//! Matrices produced here are always flagged [`DataOrigin::Synthetic`]; they
//! are never merged with historical data.

use chrono::{Datelike, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;

use crate::data::returns::{DataOrigin, ReturnMatrix};
use crate::error::PortfolioRiskError;
use crate::types::Ticker;
use crate::PortfolioRiskResult;

/// Parameters of the i.i.d. normal return generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticSpec {
    /// Mean periodic return of every asset.
    #[serde(default = "default_mean")]
    pub mean: f64,
    /// Standard deviation of every asset's periodic return.
    #[serde(default = "default_std_dev")]
    pub std_dev: f64,
    /// Seed for reproducibility.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_mean() -> f64 {
    0.0005
}

fn default_std_dev() -> f64 {
    0.015
}

fn default_seed() -> u64 {
    42
}

impl Default for SyntheticSpec {
    fn default() -> Self {
        SyntheticSpec {
            mean: default_mean(),
            std_dev: default_std_dev(),
            seed: default_seed(),
        }
    }
}

/// Weekdays in `[start, end]`.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|d| *d <= end)
        .filter(|d| !matches!(d.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

/// Independent normal draws for every asset on every business day of the
/// window.
pub fn synthetic_return_matrix(
    tickers: &[Ticker],
    start: NaiveDate,
    end: NaiveDate,
    spec: &SyntheticSpec,
) -> PortfolioRiskResult<ReturnMatrix> {
    let normal = Normal::new(spec.mean, spec.std_dev).map_err(|e| PortfolioRiskError::InvalidInput {
        field: "synthetic.std_dev".into(),
        reason: format!("Invalid Normal parameters: {e}"),
    })?;

    let dates = business_days(start, end);
    let mut rng = StdRng::seed_from_u64(spec.seed);
    let rows: Vec<Vec<f64>> = dates
        .iter()
        .map(|_| tickers.iter().map(|_| rng.sample(&normal)).collect())
        .collect();

    log::debug!(
        "generated synthetic returns: {} assets x {} business days",
        tickers.len(),
        dates.len()
    );

    ReturnMatrix::new(dates, tickers.to_vec(), rows, DataOrigin::Synthetic)
}
