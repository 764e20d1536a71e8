use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use equity_engine_core::backtest::{run_backtest as simulate, BacktestRequest};

use super::SnapshotArgs;

/// Arguments for a walk-forward backtest
#[derive(Args)]
pub struct BacktestArgs {
    #[command(flatten)]
    pub source: SnapshotArgs,

    /// First rebalance date (YYYY-MM-DD)
    #[arg(long)]
    pub start: NaiveDate,

    /// Last valuation date (YYYY-MM-DD)
    #[arg(long)]
    pub end: NaiveDate,

    /// Initial capital
    #[arg(long, default_value = "100000")]
    pub capital: Decimal,

    /// Benchmark rows between rebalances
    #[arg(long, default_value = "21")]
    pub every: usize,

    /// Print only the equity curve
    #[arg(long)]
    pub curve_only: bool,
}

pub fn run_backtest(args: BacktestArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let snapshot = args.source.load_snapshot()?;
    let request = BacktestRequest {
        start: args.start,
        end: args.end,
        initial_capital: args.capital,
        rebalance_every: args.every,
        config: args.source.load_config()?,
    };
    let output = simulate(&snapshot, &request)?;
    if args.curve_only {
        return Ok(serde_json::to_value(&output.result.curve)?);
    }
    Ok(serde_json::to_value(output)?)
}
