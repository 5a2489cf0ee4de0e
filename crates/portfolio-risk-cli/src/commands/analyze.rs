use clap::Args;
use serde_json::Value;

use portfolio_risk_core::analysis::{analyze_returns, run_analysis};

use super::DataArgs;

#[derive(Args)]
pub struct AnalyzeArgs {
    #[command(flatten)]
    pub data: DataArgs,
}

pub fn run_analyze(args: AnalyzeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let config = args.data.load_config()?;
    let result = match args.data.returns {
        Some(ref path) => {
            let returns = crate::input::file::read_json(path)?;
            analyze_returns(&config, &returns)?
        }
        None => run_analysis(&config, args.data.source())?,
    };
    Ok(serde_json::to_value(result)?)
}
