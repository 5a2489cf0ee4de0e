mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;

use commands::analyze::AnalyzeArgs;
use commands::metrics::MetricsArgs;
use commands::optimize::OptimizeArgs;
use commands::stress::StressArgs;

/// Portfolio risk/return analytics and allocation comparison
#[derive(Parser)]
#[command(
    name = "prisk",
    version,
    about = "Portfolio risk/return analytics and allocation comparison",
    long_about = "Builds aligned periodic returns for a portfolio, estimates a risk model \
                  and reports expected return, volatility, Sharpe ratio, risk contributions \
                  and tail risk. Compares the current holdings with max-Sharpe / min-risk, \
                  risk-parity and min-CVaR allocations and runs concentration, sector and \
                  market stress analysis."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,
}

#[derive(Subcommand)]
enum Commands {
    /// Full analysis: metrics, alternative allocations, stress tests, rebalance plan
    Analyze(AnalyzeArgs),
    /// Metrics and tail risk of the current holdings
    Metrics(MetricsArgs),
    /// Run a single allocation optimizer
    Optimize(OptimizeArgs),
    /// Concentration, sector exposure and market stress scenarios
    Stress(StressArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Analyze(args) => commands::analyze::run_analyze(args),
        Commands::Metrics(args) => commands::metrics::run_metrics(args),
        Commands::Optimize(args) => commands::optimize::run_optimize(args),
        Commands::Stress(args) => commands::stress::run_stress(args),
        Commands::Version => {
            println!("prisk {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
