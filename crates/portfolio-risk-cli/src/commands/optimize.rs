use clap::{Args, ValueEnum};
use serde_json::Value;

use portfolio_risk_core::optimization::{optimize, AllocationObjective};

use super::DataArgs;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum ObjectiveArg {
    MaxSharpe,
    MinRisk,
    RiskParity,
    MinCvar,
}

impl From<ObjectiveArg> for AllocationObjective {
    fn from(arg: ObjectiveArg) -> Self {
        match arg {
            ObjectiveArg::MaxSharpe => AllocationObjective::MaxSharpe,
            ObjectiveArg::MinRisk => AllocationObjective::MinRisk,
            ObjectiveArg::RiskParity => AllocationObjective::RiskParity,
            ObjectiveArg::MinCvar => AllocationObjective::MinCvar,
        }
    }
}

#[derive(Args)]
pub struct OptimizeArgs {
    #[command(flatten)]
    pub data: DataArgs,

    /// Allocation objective
    #[arg(long, value_enum, default_value = "max-sharpe")]
    pub objective: ObjectiveArg,

    /// Allow short positions (mean-variance objectives only)
    #[arg(long)]
    pub allow_short: bool,

    /// Annual target return for min-risk
    #[arg(long, allow_hyphen_values = true)]
    pub target_return: Option<f64>,

    /// Tail probability for min-cvar
    #[arg(long)]
    pub alpha: Option<f64>,
}

pub fn run_optimize(args: OptimizeArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let inputs = args.data.load()?;
    let config = inputs.config;

    let mut settings = config.optimizer.clone();
    settings.allow_short |= args.allow_short;
    if args.target_return.is_some() {
        settings.target_return = args.target_return;
    }
    if let Some(alpha) = args.alpha {
        settings.cvar_alpha = alpha;
    }

    let model = config.estimator.build().estimate(&inputs.returns)?;
    let mut result = optimize(
        args.objective.into(),
        &model,
        &inputs.returns,
        &settings,
        &config.metrics_assumptions(),
    )?;
    let mut warnings = inputs.warnings;
    warnings.append(&mut result.warnings);
    result.warnings = warnings;
    Ok(serde_json::to_value(result)?)
}
