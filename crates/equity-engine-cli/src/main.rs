mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::backtest::BacktestArgs;
use commands::build::BuildArgs;
use commands::growth::CagrArgs;
use commands::macro_penalty::RatePenaltyArgs;
use commands::signal::SignalArgs;

/// Fundamental expected returns and max-Sharpe portfolios
#[derive(Parser)]
#[command(
    name = "eqe",
    version,
    about = "Fundamental expected returns and max-Sharpe portfolios",
    long_about = "Builds growth-based expected-return signals for listed equities, \
                  optimizes a constrained maximum-Sharpe portfolio with a risk-free \
                  floor, converts it into whole shares and backtests the rebalancing."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log progress to stderr (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Build and allocate the portfolio of one date
    Build(BuildArgs),
    /// Rebalance on a fixed cadence and mark to market in between
    Backtest(BacktestArgs),
    /// Expected-return signals of one date
    Signal(SignalArgs),
    /// Multi-horizon growth from quarterly values or a snapshot
    Cagr(CagrArgs),
    /// Rate-hike and leverage penalties of a segment
    RatePenalty(RatePenaltyArgs),
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

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Build(args) => commands::build::run_build(args),
        Commands::Backtest(args) => commands::backtest::run_backtest(args),
        Commands::Signal(args) => commands::signal::run_signal(args),
        Commands::Cagr(args) => commands::growth::run_cagr(args),
        Commands::RatePenalty(args) => commands::macro_penalty::run_rate_penalty(args),
        Commands::Version => {
            println!("eqe {}", env!("CARGO_PKG_VERSION"));
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
