use serde::{Deserialize, Serialize};

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = f64;

/// Portfolio weight of a single position (0.25 = 25% of capital).
pub type Weight = f64;

/// Asset identifier as quoted by the data source (e.g. "VOO").
pub type Ticker = String;

/// Frequency of return observations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnFrequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annual,
}

impl ReturnFrequency {
    /// Number of periods in a year for annualisation
    pub fn periods_per_year(&self) -> f64 {
        match self {
            ReturnFrequency::Daily => 252.0,
            ReturnFrequency::Weekly => 52.0,
            ReturnFrequency::Monthly => 12.0,
            ReturnFrequency::Quarterly => 4.0,
            ReturnFrequency::Annual => 1.0,
        }
    }

    /// Scale a periodic return to an annual one (i.i.d. returns).
    pub fn annualize_return(&self, periodic: f64) -> f64 {
        periodic * self.periods_per_year()
    }

    /// Scale a periodic volatility to an annual one (square-root-of-time).
    pub fn annualize_volatility(&self, periodic: f64) -> f64 {
        periodic * self.periods_per_year().sqrt()
    }

    /// Convert an annual rate into its per-period equivalent.
    pub fn periodic_rate(&self, annual: Rate) -> Rate {
        annual / self.periods_per_year()
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}
