use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortfolioRiskError {
    #[error("Data unavailable: {0}")]
    DataUnavailable(String),

    #[error("Unknown asset: {asset} is not part of the {context}")]
    UnknownAsset { asset: String, context: String },

    #[error("Optimization failed: {objective} — {reason}")]
    Optimization { objective: String, reason: String },

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta:e})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: f64,
    },

    #[error("Insufficient data: {required} observations required, {actual} available")]
    InsufficientData { required: usize, actual: usize },

    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl PortfolioRiskError {
    /// True for the failures a solver can produce (infeasible problem or
    /// iteration cap reached).
    pub fn is_optimization_error(&self) -> bool {
        matches!(
            self,
            PortfolioRiskError::Optimization { .. } | PortfolioRiskError::ConvergenceFailure { .. }
        )
    }

    /// True when the error means historical data could not be obtained in a
    /// usable form.
    pub fn is_data_error(&self) -> bool {
        matches!(
            self,
            PortfolioRiskError::DataUnavailable(_) | PortfolioRiskError::InsufficientData { .. }
        )
    }

    pub(crate) fn optimization(objective: &str, reason: impl Into<String>) -> Self {
        PortfolioRiskError::Optimization {
            objective: objective.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for PortfolioRiskError {
    fn from(e: serde_json::Error) -> Self {
        PortfolioRiskError::SerializationError(e.to_string())
    }
}
