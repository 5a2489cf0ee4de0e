pub mod error;
pub mod types;

pub(crate) mod linalg;

pub mod data;
pub mod portfolio;
pub mod risk_model;

#[cfg(feature = "optimization")]
pub mod optimization;

#[cfg(feature = "scenarios")]
pub mod scenarios;

#[cfg(all(feature = "optimization", feature = "scenarios"))]
pub mod analysis;

pub use error::PortfolioRiskError;
pub use types::*;

/// Standard result type for all portfolio risk computations
pub type PortfolioRiskResult<T> = Result<T, PortfolioRiskError>;
