//! Boundary with the market-data provider.
//!
//! The provider is an external collaborator: it receives a [`HistoryRequest`]
//! and answers with a [`PriceTable`] in either a wide (one column per ticker)
//! or long (one record per date/ticker pair) shape. The table must declare
//! which price convention it carries; undeclared tables are rejected by the
//! return builder instead of being guessed at.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::PortfolioRiskError;
use crate::types::Ticker;
use crate::PortfolioRiskResult;

/// What the values of a [`PriceTable`] represent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceConvention {
    /// Raw closing prices.
    Close,
    /// Closing prices adjusted for splits and dividends.
    AdjustedClose,
    /// Periodic simple returns, already computed by the provider.
    Return,
}

impl PriceConvention {
    pub fn is_price(&self) -> bool {
        !matches!(self, PriceConvention::Return)
    }
}

/// A single observation of a long-format table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceRecord {
    pub date: NaiveDate,
    pub ticker: Ticker,
    pub value: Option<f64>,
}

/// One ticker's column of a wide-format table, aligned with `dates`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceColumn {
    pub ticker: Ticker,
    pub values: Vec<Option<f64>>,
}

/// Layout of the provider's response.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "layout", rename_all = "snake_case")]
pub enum TableShape {
    Wide {
        dates: Vec<NaiveDate>,
        columns: Vec<PriceColumn>,
    },
    Long {
        records: Vec<PriceRecord>,
    },
}

/// Historical table returned by a [`DataSource`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceTable {
    /// Declared price convention. `None` means the provider did not say.
    pub convention: Option<PriceConvention>,
    pub shape: TableShape,
}

impl PriceTable {
    pub fn wide(convention: PriceConvention, dates: Vec<NaiveDate>, columns: Vec<PriceColumn>) -> Self {
        PriceTable {
            convention: Some(convention),
            shape: TableShape::Wide { dates, columns },
        }
    }

    pub fn long(convention: PriceConvention, records: Vec<PriceRecord>) -> Self {
        PriceTable {
            convention: Some(convention),
            shape: TableShape::Long { records },
        }
    }
}

/// Request sent to the provider: which tickers over which window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRequest {
    pub tickers: Vec<Ticker>,
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl HistoryRequest {
    pub fn new(tickers: Vec<Ticker>, start: NaiveDate, end: NaiveDate) -> PortfolioRiskResult<Self> {
        if tickers.is_empty() {
            return Err(PortfolioRiskError::InvalidInput {
                field: "tickers".into(),
                reason: "At least one ticker must be requested".into(),
            });
        }
        if start > end {
            return Err(PortfolioRiskError::InvalidInput {
                field: "start".into(),
                reason: format!("Start date {start} is after end date {end}"),
            });
        }
        Ok(HistoryRequest { tickers, start, end })
    }
}

/// A provider of historical prices or returns.
///
/// Implementations report every failure (network, unknown ticker, empty
/// window) as [`PortfolioRiskError::DataUnavailable`].
pub trait DataSource: Send + Sync {
    /// Short human-readable name used in logs and warnings.
    fn name(&self) -> &str;

    fn fetch(&self, request: &HistoryRequest) -> PortfolioRiskResult<PriceTable>;
}

/// Call `source.fetch` on a worker thread and wait at most `timeout`.
///
/// A single attempt is made; re-running the whole analysis is the retry unit.
/// On timeout the worker is left to finish on its own and its answer is
/// discarded.
pub fn fetch_with_timeout(
    source: Arc<dyn DataSource>,
    request: &HistoryRequest,
    timeout: Duration,
) -> PortfolioRiskResult<PriceTable> {
    let (tx, rx) = mpsc::channel();
    let worker_request = request.clone();
    let worker_source = Arc::clone(&source);

    thread::Builder::new()
        .name("history-fetch".into())
        .spawn(move || {
            let _ = tx.send(worker_source.fetch(&worker_request));
        })
        .map_err(|e| {
            PortfolioRiskError::DataUnavailable(format!("Could not start fetch worker: {e}"))
        })?;

    match rx.recv_timeout(timeout) {
        Ok(result) => result,
        Err(mpsc::RecvTimeoutError::Timeout) => Err(PortfolioRiskError::DataUnavailable(format!(
            "{} did not answer within {:.1}s",
            source.name(),
            timeout.as_secs_f64()
        ))),
        Err(mpsc::RecvTimeoutError::Disconnected) => Err(PortfolioRiskError::DataUnavailable(
            format!("{} fetch worker terminated without a response", source.name()),
        )),
    }
}
