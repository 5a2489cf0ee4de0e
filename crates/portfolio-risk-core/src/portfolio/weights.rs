use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::PortfolioRiskError;
use crate::types::{Ticker, Weight};
use crate::PortfolioRiskResult;

/// Portfolio holdings as ticker -> weight.
///
/// Shorts (negative) and leverage (> 1) are allowed and no normalisation is
/// applied. Assets of a model that are absent from the vector carry weight 0.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector(BTreeMap<Ticker, Weight>);

impl WeightVector {
    pub fn new() -> Self {
        WeightVector(BTreeMap::new())
    }

    /// Build from (ticker, weight) pairs. Rejects non-finite weights.
    pub fn from_pairs<I, S>(pairs: I) -> PortfolioRiskResult<Self>
    where
        I: IntoIterator<Item = (S, Weight)>,
        S: Into<Ticker>,
    {
        let mut map = BTreeMap::new();
        for (ticker, weight) in pairs {
            let ticker = ticker.into();
            if !weight.is_finite() {
                return Err(PortfolioRiskError::InvalidInput {
                    field: format!("weights.{ticker}"),
                    reason: "Weight must be a finite number".into(),
                });
            }
            map.insert(ticker, weight);
        }
        Ok(WeightVector(map))
    }

    /// Dense weights aligned with `tickers`.
    pub fn from_dense(tickers: &[Ticker], weights: &[Weight]) -> Self {
        WeightVector(
            tickers
                .iter()
                .cloned()
                .zip(weights.iter().copied())
                .collect(),
        )
    }

    /// 1/N on every ticker.
    pub fn equal(tickers: &[Ticker]) -> Self {
        let w = if tickers.is_empty() {
            0.0
        } else {
            1.0 / tickers.len() as f64
        };
        WeightVector(tickers.iter().map(|t| (t.clone(), w)).collect())
    }

    pub fn get(&self, ticker: &str) -> Weight {
        self.0.get(ticker).copied().unwrap_or(0.0)
    }

    pub fn insert(&mut self, ticker: impl Into<Ticker>, weight: Weight) {
        self.0.insert(ticker.into(), weight);
    }

    pub fn tickers(&self) -> Vec<Ticker> {
        self.0.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Ticker, &Weight)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sum of all weights (net exposure).
    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Sum of absolute weights (gross exposure).
    pub fn gross_exposure(&self) -> f64 {
        self.0.values().map(|w| w.abs()).sum()
    }

    /// Dense weights in the order of `universe`.
    ///
    /// Every key must appear in `universe`; `context` names the universe in
    /// the error (e.g. "risk model").
    pub fn resolve(&self, universe: &[Ticker], context: &str) -> PortfolioRiskResult<Vec<Weight>> {
        if let Some(unknown) = self.0.keys().find(|t| !universe.contains(t)) {
            return Err(PortfolioRiskError::UnknownAsset {
                asset: unknown.clone(),
                context: context.to_string(),
            });
        }
        Ok(universe.iter().map(|t| self.get(t)).collect())
    }
}

impl FromIterator<(Ticker, Weight)> for WeightVector {
    fn from_iter<I: IntoIterator<Item = (Ticker, Weight)>>(iter: I) -> Self {
        WeightVector(iter.into_iter().collect())
    }
}
