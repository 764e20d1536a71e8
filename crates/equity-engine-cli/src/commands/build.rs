use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::info;

use equity_engine_core::builder::PortfolioBuilder;

use super::SnapshotArgs;

/// Arguments for a single-date portfolio build
#[derive(Args)]
pub struct BuildArgs {
    #[command(flatten)]
    pub source: SnapshotArgs,

    /// Portfolio date (YYYY-MM-DD)
    #[arg(long)]
    pub date: NaiveDate,

    /// Capital to allocate
    #[arg(long)]
    pub capital: Decimal,

    /// Cap on any single equity (e.g. 0.10)
    #[arg(long)]
    pub max_per_asset: Option<f64>,

    /// Cap on any equity sector
    #[arg(long)]
    pub max_per_sector: Option<f64>,

    /// Floor on the risk-free asset
    #[arg(long)]
    pub min_fixed_income: Option<f64>,

    /// L2 regularization strength
    #[arg(long)]
    pub gamma: Option<f64>,

    /// Include the signal diagnostics and price tables in the output
    #[arg(long)]
    pub verification: bool,
}

pub fn run_build(args: BuildArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let snapshot = args.source.load_snapshot()?;
    let mut config = args.source.load_config()?;
    if let Some(v) = args.max_per_asset {
        config.max_per_asset = v;
    }
    if let Some(v) = args.max_per_sector {
        config.max_per_sector = v;
    }
    if let Some(v) = args.min_fixed_income {
        config.min_fixed_income = v;
    }
    if let Some(v) = args.gamma {
        config.l2_gamma = v;
    }

    let builder = PortfolioBuilder::new(config)?;
    let output = builder.build(&snapshot, args.date, args.capital)?;
    info!(
        date = %args.date,
        held = output.result.allocation.positions.len(),
        "build finished"
    );

    let mut value = serde_json::to_value(output)?;
    if !args.verification {
        if let Some(result) = value.get_mut("result").and_then(Value::as_object_mut) {
            result.remove("verification");
        }
    }
    Ok(value)
}
