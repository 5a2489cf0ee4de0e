use clap::Args;
use serde_json::Value;

use portfolio_risk_core::analysis::portfolio_metrics;

use super::DataArgs;

#[derive(Args)]
pub struct MetricsArgs {
    #[command(flatten)]
    pub data: DataArgs,
}

pub fn run_metrics(args: MetricsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let inputs = args.data.load()?;
    let mut result = portfolio_metrics(&inputs.config, &inputs.returns)?;
    let mut warnings = inputs.warnings;
    warnings.append(&mut result.warnings);
    result.warnings = warnings;
    Ok(serde_json::to_value(result)?)
}
