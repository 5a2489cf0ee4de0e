use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::portfolio::weights::WeightVector;
use crate::types::{Ticker, Weight};

/// Label used for tickers missing from the map.
pub const UNMAPPED_SECTOR: &str = "Other";

/// Static ticker -> sector lookup.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SectorMap(BTreeMap<Ticker, String>);

impl SectorMap {
    pub fn new(entries: BTreeMap<Ticker, String>) -> Self {
        SectorMap(entries)
    }

    pub fn sector_of(&self, ticker: &str) -> &str {
        self.0.get(ticker).map(String::as_str).unwrap_or(UNMAPPED_SECTOR)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<Ticker>, L: Into<String>> FromIterator<(S, L)> for SectorMap {
    fn from_iter<I: IntoIterator<Item = (S, L)>>(iter: I) -> Self {
        SectorMap(iter.into_iter().map(|(t, s)| (t.into(), s.into())).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectorExposure {
    pub sector: String,
    pub weight: Weight,
    pub tickers: Vec<Ticker>,
}

/// Net weight per sector, largest |exposure| first, ties by sector name.
pub fn sector_exposure(weights: &WeightVector, sectors: &SectorMap) -> Vec<SectorExposure> {
    let mut grouped: BTreeMap<&str, (f64, Vec<Ticker>)> = BTreeMap::new();
    for (ticker, w) in weights.iter() {
        let entry = grouped.entry(sectors.sector_of(ticker)).or_default();
        entry.0 += w;
        entry.1.push(ticker.clone());
    }

    let mut out: Vec<SectorExposure> = grouped
        .into_iter()
        .map(|(sector, (weight, tickers))| SectorExposure {
            sector: sector.to_string(),
            weight,
            tickers,
        })
        .collect();
    out.sort_by(|a, b| {
        b.weight
            .abs()
            .total_cmp(&a.weight.abs())
            .then_with(|| a.sector.cmp(&b.sector))
    });
    out
}
