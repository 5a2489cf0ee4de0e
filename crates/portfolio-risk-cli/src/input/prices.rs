//! CSV price files as a [`DataSource`].
//!
//! Wide files carry a `date` column followed by one column per ticker; long
//! files carry `date,ticker,value` records. Empty cells are gaps. The file
//! itself does not say whether it holds prices or returns, so the convention
//! comes from the command line and is passed through undeclared otherwise.

use chrono::NaiveDate;
use clap::ValueEnum;
use std::collections::HashSet;
use std::path::PathBuf;

use portfolio_risk_core::data::source::{
    DataSource, HistoryRequest, PriceColumn, PriceConvention, PriceRecord, PriceTable, TableShape,
};
use portfolio_risk_core::{PortfolioRiskError, PortfolioRiskResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CsvLayout {
    /// date,TICKER1,TICKER2,...
    Wide,
    /// date,ticker,value
    Long,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConventionArg {
    Close,
    AdjClose,
    Return,
}

impl From<ConventionArg> for PriceConvention {
    fn from(arg: ConventionArg) -> Self {
        match arg {
            ConventionArg::Close => PriceConvention::Close,
            ConventionArg::AdjClose => PriceConvention::AdjustedClose,
            ConventionArg::Return => PriceConvention::Return,
        }
    }
}

pub struct CsvPriceSource {
    name: String,
    path: PathBuf,
    layout: CsvLayout,
    convention: Option<PriceConvention>,
}

impl CsvPriceSource {
    pub fn new(path: PathBuf, layout: CsvLayout, convention: Option<PriceConvention>) -> Self {
        CsvPriceSource {
            name: format!("csv:{}", path.display()),
            path,
            layout,
            convention,
        }
    }

    fn read_wide(&self, request: &HistoryRequest) -> PortfolioRiskResult<PriceTable> {
        let mut reader = self.reader()?;
        let headers = reader.headers().map_err(|e| self.unavailable(e))?.clone();
        if !headers.get(0).is_some_and(|h| h.eq_ignore_ascii_case("date")) {
            return Err(self.unavailable("first column must be 'date'"));
        }
        let wanted: HashSet<&str> = request.tickers.iter().map(String::as_str).collect();
        let kept: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .skip(1)
            .filter(|(_, h)| wanted.contains(h))
            .map(|(i, h)| (i, h.to_string()))
            .collect();

        let mut dates = Vec::new();
        let mut columns: Vec<PriceColumn> = kept
            .iter()
            .map(|(_, ticker)| PriceColumn {
                ticker: ticker.clone(),
                values: Vec::new(),
            })
            .collect();

        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| self.unavailable(e))?;
            let date = parse_date(record.get(0).unwrap_or_default(), line + 2).map_err(|e| self.unavailable(e))?;
            if date < request.start || date > request.end {
                continue;
            }
            dates.push(date);
            for ((index, _), column) in kept.iter().zip(columns.iter_mut()) {
                let cell = record.get(*index).unwrap_or_default();
                column.values.push(parse_value(cell, line + 2).map_err(|e| self.unavailable(e))?);
            }
        }

        if dates.is_empty() {
            return Err(self.unavailable(format!(
                "no rows between {} and {}",
                request.start, request.end
            )));
        }
        Ok(PriceTable {
            convention: self.convention,
            shape: TableShape::Wide { dates, columns },
        })
    }

    fn read_long(&self, request: &HistoryRequest) -> PortfolioRiskResult<PriceTable> {
        let mut reader = self.reader()?;
        let headers = reader.headers().map_err(|e| self.unavailable(e))?.clone();
        let position = |name: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| self.unavailable(format!("missing '{name}' column")))
        };
        let (date_col, ticker_col, value_col) = (position("date")?, position("ticker")?, position("value")?);
        let wanted: HashSet<&str> = request.tickers.iter().map(String::as_str).collect();

        let mut records = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| self.unavailable(e))?;
            let ticker = record.get(ticker_col).unwrap_or_default();
            if !wanted.contains(ticker) {
                continue;
            }
            let date = parse_date(record.get(date_col).unwrap_or_default(), line + 2)
                .map_err(|e| self.unavailable(e))?;
            if date < request.start || date > request.end {
                continue;
            }
            let value = parse_value(record.get(value_col).unwrap_or_default(), line + 2)
                .map_err(|e| self.unavailable(e))?;
            records.push(PriceRecord {
                date,
                ticker: ticker.to_string(),
                value,
            });
        }

        if records.is_empty() {
            return Err(self.unavailable(format!(
                "no records between {} and {}",
                request.start, request.end
            )));
        }
        Ok(PriceTable {
            convention: self.convention,
            shape: TableShape::Long { records },
        })
    }

    fn reader(&self) -> PortfolioRiskResult<csv::Reader<std::fs::File>> {
        csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(&self.path)
            .map_err(|e| self.unavailable(e))
    }

    fn unavailable(&self, reason: impl std::fmt::Display) -> PortfolioRiskError {
        PortfolioRiskError::DataUnavailable(format!("{}: {reason}", self.path.display()))
    }
}

impl DataSource for CsvPriceSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, request: &HistoryRequest) -> PortfolioRiskResult<PriceTable> {
        log::debug!("reading {:?} price file {}", self.layout, self.path.display());
        match self.layout {
            CsvLayout::Wide => self.read_wide(request),
            CsvLayout::Long => self.read_long(request),
        }
    }
}

/// Source used when no price file was given; only the synthetic fallback can
/// recover from it.
pub struct NoPriceSource;

impl DataSource for NoPriceSource {
    fn name(&self) -> &str {
        "none"
    }

    fn fetch(&self, _request: &HistoryRequest) -> PortfolioRiskResult<PriceTable> {
        Err(PortfolioRiskError::DataUnavailable(
            "no price file given (use --prices or --returns)".into(),
        ))
    }
}

fn parse_date(cell: &str, line: usize) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(cell, "%Y-%m-%d").map_err(|e| format!("line {line}: bad date '{cell}' ({e})"))
}

fn parse_value(cell: &str, line: usize) -> Result<Option<f64>, String> {
    if cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("null") {
        return Ok(None);
    }
    cell.parse::<f64>()
        .map(Some)
        .map_err(|e| format!("line {line}: bad number '{cell}' ({e})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use portfolio_risk_core::data::returns::build_return_matrix;
    use std::fs;

    fn request(tickers: &[&str]) -> HistoryRequest {
        HistoryRequest::new(
            tickers.iter().map(|t| t.to_string()).collect(),
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
        )
        .unwrap()
    }

    fn write(contents: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prices.csv");
        fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn test_wide_file_to_returns() {
        let (_dir, path) = write(
            "date,AAPL,MSFT,IGNORED\n\
             2024-01-03,101,202,1\n\
             2023-12-29,99,199,1\n\
             2024-01-02,100,200,1\n\
             2024-01-04,,204,1\n\
             2024-01-05,103,206,1\n",
        );
        let source = CsvPriceSource::new(path, CsvLayout::Wide, Some(PriceConvention::Close));
        let table = source.fetch(&request(&["AAPL", "MSFT"])).unwrap();
        match &table.shape {
            TableShape::Wide { dates, columns } => {
                // 2023-12-29 is outside the window; file order is kept
                assert_eq!(dates.len(), 4);
                assert_eq!(dates[0], NaiveDate::from_ymd_opt(2024, 1, 3).unwrap());
                assert_eq!(columns.len(), 2);
                assert_eq!(columns[0].values[2], None);
            }
            other => panic!("Expected wide table, got {other:?}"),
        }

        // The return builder sorts by date
        let tickers = vec!["AAPL".to_string(), "MSFT".to_string()];
        let returns = build_return_matrix(&table, &tickers, 1).unwrap();
        // 01-03 complete; 01-04 and 01-05 touch the AAPL gap
        assert_eq!(returns.num_observations(), 1);
        assert!((returns.rows()[0][0] - 0.01).abs() < 1e-12);
        assert!((returns.rows()[0][1] - 0.01).abs() < 1e-12);
    }

    #[test]
    fn test_long_file_with_returns_convention() {
        let (_dir, path) = write(
            "date,ticker,value\n\
             2024-01-02,VOO,0.01\n\
             2024-01-02,TLT,-0.002\n\
             2024-01-03,VOO,-0.005\n\
             2024-01-03,TLT,0.001\n\
             2024-01-03,SPY,0.3\n",
        );
        let source = CsvPriceSource::new(path, CsvLayout::Long, Some(PriceConvention::Return));
        let table = source.fetch(&request(&["VOO", "TLT"])).unwrap();
        let tickers = vec!["VOO".to_string(), "TLT".to_string()];
        let returns = build_return_matrix(&table, &tickers, 2).unwrap();
        assert_eq!(returns.num_observations(), 2);
        assert_eq!(returns.rows()[1], vec![-0.005, 0.001]);
    }

    #[test]
    fn test_undeclared_convention_is_rejected_downstream() {
        let (_dir, path) = write("date,VOO\n2024-01-02,100\n2024-01-03,101\n");
        let source = CsvPriceSource::new(path, CsvLayout::Wide, None);
        let table = source.fetch(&request(&["VOO"])).unwrap();
        assert!(table.convention.is_none());
        let err = build_return_matrix(&table, &["VOO".to_string()], 1).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_bad_cells_are_data_errors() {
        let (_dir, path) = write("date,VOO\n2024-01-02,abc\n");
        let source = CsvPriceSource::new(path, CsvLayout::Wide, Some(PriceConvention::Close));
        let err = source.fetch(&request(&["VOO"])).unwrap_err();
        assert!(err.to_string().contains("bad number"));

        let (_dir, path) = write("when,VOO\n2024-01-02,1\n");
        let source = CsvPriceSource::new(path, CsvLayout::Wide, Some(PriceConvention::Close));
        assert!(source.fetch(&request(&["VOO"])).unwrap_err().is_data_error());
    }

    #[test]
    fn test_missing_file_is_data_error() {
        let source = CsvPriceSource::new(
            PathBuf::from("/no/such/prices.csv"),
            CsvLayout::Long,
            Some(PriceConvention::Close),
        );
        assert!(source.fetch(&request(&["VOO"])).unwrap_err().is_data_error());
        assert!(NoPriceSource.fetch(&request(&["VOO"])).unwrap_err().is_data_error());
    }
}
