//! Analysis Engine: orchestrates data loading, estimation, metrics,
//! optimizers and scenarios into one report.

pub mod config;
pub mod diagnostics;
pub mod engine;

pub use config::AnalysisConfig;
pub use engine::{
    analyze_returns, load_returns, portfolio_metrics, run_analysis, MetricsReport, PortfolioAnalysis,
};
