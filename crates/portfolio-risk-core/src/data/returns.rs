//! Return Series Builder: turns a provider table into an aligned, gap-free
//! matrix of periodic returns (rows = dates, columns = assets).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::data::source::{PriceConvention, PriceTable, TableShape};
use crate::error::PortfolioRiskError;
use crate::types::Ticker;
use crate::PortfolioRiskResult;

/// Default minimum number of return observations for a usable covariance.
pub const DEFAULT_MIN_OBSERVATIONS: usize = 30;

/// Where the numbers in a [`ReturnMatrix`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOrigin {
    Historical,
    Synthetic,
}

/// Aligned periodic returns. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ReturnMatrixData")]
pub struct ReturnMatrix {
    dates: Vec<NaiveDate>,
    tickers: Vec<Ticker>,
    rows: Vec<Vec<f64>>,
    origin: DataOrigin,
}

/// Unvalidated wire form; deserialisation goes through [`ReturnMatrix::new`].
#[derive(Deserialize)]
struct ReturnMatrixData {
    dates: Vec<NaiveDate>,
    tickers: Vec<Ticker>,
    rows: Vec<Vec<f64>>,
    origin: DataOrigin,
}

impl TryFrom<ReturnMatrixData> for ReturnMatrix {
    type Error = PortfolioRiskError;

    fn try_from(data: ReturnMatrixData) -> Result<Self, Self::Error> {
        ReturnMatrix::new(data.dates, data.tickers, data.rows, data.origin)
    }
}

impl ReturnMatrix {
    /// Build a matrix from already-aligned rows.
    ///
    /// Every row must have one finite value per ticker, dates must be strictly
    /// increasing and tickers unique.
    pub fn new(
        dates: Vec<NaiveDate>,
        tickers: Vec<Ticker>,
        rows: Vec<Vec<f64>>,
        origin: DataOrigin,
    ) -> PortfolioRiskResult<Self> {
        if tickers.is_empty() {
            return Err(PortfolioRiskError::InvalidInput {
                field: "tickers".into(),
                reason: "A return matrix needs at least one asset".into(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for t in &tickers {
            if !seen.insert(t.as_str()) {
                return Err(PortfolioRiskError::InvalidInput {
                    field: "tickers".into(),
                    reason: format!("Duplicate ticker {t}"),
                });
            }
        }
        if dates.len() != rows.len() {
            return Err(PortfolioRiskError::InvalidInput {
                field: "dates".into(),
                reason: format!("{} dates for {} rows", dates.len(), rows.len()),
            });
        }
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(PortfolioRiskError::InvalidInput {
                field: "dates".into(),
                reason: "Dates must be strictly increasing".into(),
            });
        }
        for (i, row) in rows.iter().enumerate() {
            if row.len() != tickers.len() {
                return Err(PortfolioRiskError::InvalidInput {
                    field: format!("rows[{i}]"),
                    reason: format!("Expected {} values, got {}", tickers.len(), row.len()),
                });
            }
            if row.iter().any(|v| !v.is_finite()) {
                return Err(PortfolioRiskError::InvalidInput {
                    field: format!("rows[{i}]"),
                    reason: "Returns must be finite".into(),
                });
            }
        }
        Ok(ReturnMatrix {
            dates,
            tickers,
            rows,
            origin,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn tickers(&self) -> &[Ticker] {
        &self.tickers
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn origin(&self) -> DataOrigin {
        self.origin
    }

    pub fn is_synthetic(&self) -> bool {
        self.origin == DataOrigin::Synthetic
    }

    pub fn num_observations(&self) -> usize {
        self.rows.len()
    }

    pub fn num_assets(&self) -> usize {
        self.tickers.len()
    }

    pub fn index_of(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    /// All observations of one asset, in date order.
    pub fn column(&self, index: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[index]).collect()
    }

    /// Portfolio return per date for a dense weight vector aligned with
    /// `tickers()`.
    pub fn portfolio_returns(&self, weights: &[f64]) -> Vec<f64> {
        self.rows
            .iter()
            .map(|row| row.iter().zip(weights).map(|(r, w)| r * w).sum())
            .collect()
    }
}

/// Convert a provider table into a [`ReturnMatrix`] for `tickers`.
///
/// Extra columns in the table are ignored. Fails with `DataUnavailable` when
/// the convention is undeclared or a requested ticker has no usable column,
/// and with `InsufficientData` when fewer than `min_observations` complete
/// rows remain.
pub fn build_return_matrix(
    table: &PriceTable,
    tickers: &[Ticker],
    min_observations: usize,
) -> PortfolioRiskResult<ReturnMatrix> {
    let convention = table.convention.ok_or_else(|| {
        PortfolioRiskError::DataUnavailable(
            "Price table does not declare its convention (close, adjusted close or return)".into(),
        )
    })?;

    if tickers.is_empty() {
        return Err(PortfolioRiskError::InvalidInput {
            field: "tickers".into(),
            reason: "At least one ticker required".into(),
        });
    }

    let (dates, columns) = to_wide(&table.shape)?;

    // Locate each requested ticker
    let mut missing: Vec<&str> = Vec::new();
    let mut selected: Vec<&Vec<Option<f64>>> = Vec::with_capacity(tickers.len());
    for t in tickers {
        match columns.get(t.as_str()) {
            Some(col) if col.iter().any(|v| v.is_some_and(f64::is_finite)) => selected.push(col),
            _ => missing.push(t.as_str()),
        }
    }
    if !missing.is_empty() {
        return Err(PortfolioRiskError::DataUnavailable(format!(
            "No usable {} series for: {}",
            convention_label(convention),
            missing.join(", ")
        )));
    }

    let series: Vec<Vec<Option<f64>>> = if convention.is_price() {
        selected.iter().map(|col| pct_change(col)).collect()
    } else {
        selected.iter().map(|col| col.to_vec()).collect()
    };

    // Price changes are undefined on the first date
    let first_row = if convention.is_price() { 1 } else { 0 };

    let mut out_dates = Vec::new();
    let mut out_rows = Vec::new();
    for (i, date) in dates.iter().enumerate().skip(first_row) {
        let row: Option<Vec<f64>> = series
            .iter()
            .map(|s| s[i].filter(|v| v.is_finite()))
            .collect();
        if let Some(row) = row {
            out_dates.push(*date);
            out_rows.push(row);
        }
    }

    if out_rows.len() < min_observations {
        return Err(PortfolioRiskError::InsufficientData {
            required: min_observations,
            actual: out_rows.len(),
        });
    }

    log::debug!(
        "built return matrix: {} assets x {} observations (dropped {} rows)",
        tickers.len(),
        out_rows.len(),
        dates.len() - out_rows.len()
    );

    ReturnMatrix::new(out_dates, tickers.to_vec(), out_rows, DataOrigin::Historical)
}

fn convention_label(convention: PriceConvention) -> &'static str {
    match convention {
        PriceConvention::Close => "close price",
        PriceConvention::AdjustedClose => "adjusted close price",
        PriceConvention::Return => "return",
    }
}

/// Simple percentage change; gaps and zero prices propagate as `None`.
fn pct_change(prices: &[Option<f64>]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(prices.len());
    out.push(None);
    for w in prices.windows(2) {
        let change = match (w[0], w[1]) {
            (Some(prev), Some(cur)) if prev != 0.0 && prev.is_finite() && cur.is_finite() => {
                Some(cur / prev - 1.0)
            }
            _ => None,
        };
        out.push(change);
    }
    out.truncate(prices.len());
    out
}

type WideColumns<'a> = HashMap<&'a str, Vec<Option<f64>>>;

/// Normalise either table shape into sorted dates plus per-ticker columns.
fn to_wide(shape: &TableShape) -> PortfolioRiskResult<(Vec<NaiveDate>, WideColumns<'_>)> {
    match shape {
        TableShape::Wide { dates, columns } => {
            for col in columns {
                if col.values.len() != dates.len() {
                    return Err(PortfolioRiskError::DataUnavailable(format!(
                        "Column {} has {} values for {} dates",
                        col.ticker,
                        col.values.len(),
                        dates.len()
                    )));
                }
            }
            let mut order: Vec<usize> = (0..dates.len()).collect();
            order.sort_by_key(|&i| dates[i]);
            if order.windows(2).any(|w| dates[w[0]] == dates[w[1]]) {
                return Err(PortfolioRiskError::DataUnavailable(
                    "Wide table contains duplicate dates".into(),
                ));
            }
            let sorted_dates = order.iter().map(|&i| dates[i]).collect();
            let mut cols = HashMap::with_capacity(columns.len());
            for col in columns {
                let values = order.iter().map(|&i| col.values[i]).collect();
                cols.insert(col.ticker.as_str(), values);
            }
            Ok((sorted_dates, cols))
        }
        TableShape::Long { records } => {
            let mut grid: BTreeMap<NaiveDate, HashMap<&str, Option<f64>>> = BTreeMap::new();
            for rec in records {
                let cell = grid.entry(rec.date).or_default();
                if cell.insert(rec.ticker.as_str(), rec.value).is_some() {
                    return Err(PortfolioRiskError::DataUnavailable(format!(
                        "Duplicate observation for {} on {}",
                        rec.ticker, rec.date
                    )));
                }
            }
            let dates: Vec<NaiveDate> = grid.keys().copied().collect();
            let mut cols: WideColumns<'_> = HashMap::new();
            for rec in records {
                cols.entry(rec.ticker.as_str())
                    .or_insert_with(|| vec![None; dates.len()]);
            }
            for (i, cell) in grid.values().enumerate() {
                for (ticker, value) in cell {
                    if let Some(col) = cols.get_mut(ticker) {
                        col[i] = *value;
                    }
                }
            }
            Ok((dates, cols))
        }
    }
}
