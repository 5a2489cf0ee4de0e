pub mod analyze;
pub mod metrics;
pub mod optimize;
pub mod stress;

use chrono::NaiveDate;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;

use portfolio_risk_core::analysis::{load_returns, AnalysisConfig};
use portfolio_risk_core::data::returns::ReturnMatrix;
use portfolio_risk_core::data::source::DataSource;
use portfolio_risk_core::data::synthetic::SyntheticSpec;

use crate::input;
use crate::input::prices::{ConventionArg, CsvLayout, CsvPriceSource, NoPriceSource};

/// Where the portfolio and its history come from; shared by every subcommand.
#[derive(Args)]
pub struct DataArgs {
    /// Portfolio config (JSON or YAML); read from stdin when omitted
    #[arg(long)]
    pub config: Option<String>,

    /// CSV file of prices or returns
    #[arg(long, conflicts_with = "returns")]
    pub prices: Option<String>,

    /// Layout of the --prices file
    #[arg(long, value_enum, default_value = "wide")]
    pub layout: CsvLayout,

    /// What the --prices values are; required for the file to be usable
    #[arg(long, value_enum)]
    pub convention: Option<ConventionArg>,

    /// JSON return matrix ({dates, tickers, rows, origin}) used as-is
    #[arg(long)]
    pub returns: Option<String>,

    /// Fall back to seeded synthetic returns when history is unusable
    #[arg(long)]
    pub synthetic_fallback: bool,

    /// Override the config's end of the history window (YYYY-MM-DD)
    #[arg(long)]
    pub end_date: Option<NaiveDate>,

    /// Override the config's annual risk-free rate
    #[arg(long, allow_hyphen_values = true)]
    pub risk_free_rate: Option<f64>,
}

/// Config plus returns, with any warnings raised while loading them.
pub struct Inputs {
    pub config: AnalysisConfig,
    pub returns: ReturnMatrix,
    pub warnings: Vec<String>,
}

impl DataArgs {
    pub fn load_config(&self) -> Result<AnalysisConfig, Box<dyn std::error::Error>> {
        let mut config: AnalysisConfig = if let Some(ref path) = self.config {
            input::file::read_config(path)?
        } else if let Some(config) = input::stdin::read_stdin()? {
            config
        } else {
            return Err("--config <file.json|file.yaml> or stdin required".into());
        };

        if let Some(end) = self.end_date {
            config.end_date = Some(end);
        }
        if let Some(rf) = self.risk_free_rate {
            config.risk_free_rate = rf;
        }
        if self.synthetic_fallback && config.synthetic_fallback.is_none() {
            config.synthetic_fallback = Some(SyntheticSpec::default());
        }
        config.validate()?;
        Ok(config)
    }

    pub fn source(&self) -> Arc<dyn DataSource> {
        match self.prices {
            Some(ref path) => Arc::new(CsvPriceSource::new(
                PathBuf::from(path),
                self.layout,
                self.convention.map(Into::into),
            )),
            None => Arc::new(NoPriceSource),
        }
    }

    /// Config and return matrix, either from `--returns` or fetched through
    /// [`DataArgs::source`].
    pub fn load(&self) -> Result<Inputs, Box<dyn std::error::Error>> {
        let config = self.load_config()?;
        if let Some(ref path) = self.returns {
            let returns: ReturnMatrix = input::file::read_json(path)?;
            return Ok(Inputs {
                config,
                returns,
                warnings: Vec::new(),
            });
        }
        let loaded = load_returns(&config, self.source())?;
        Ok(Inputs {
            config,
            returns: loaded.returns,
            warnings: loaded.warnings,
        })
    }
}
