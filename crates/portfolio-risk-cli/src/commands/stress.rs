use clap::Args;
use serde_json::Value;

use portfolio_risk_core::scenarios::analyze_scenarios;

use super::DataArgs;

#[derive(Args)]
pub struct StressArgs {
    #[command(flatten)]
    pub data: DataArgs,
}

pub fn run_stress(args: StressArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let inputs = args.data.load()?;
    let mut result = analyze_scenarios(
        &inputs.returns,
        &inputs.config.weights,
        &inputs.config.scenario_settings(),
    )?;
    let mut warnings = inputs.warnings;
    warnings.append(&mut result.warnings);
    result.warnings = warnings;
    Ok(serde_json::to_value(result)?)
}
