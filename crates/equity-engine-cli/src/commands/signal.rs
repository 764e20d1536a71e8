use chrono::NaiveDate;
use clap::Args;
use serde_json::Value;
use std::collections::BTreeMap;

use equity_engine_core::builder::{PortfolioBuilder, ReturnRow};

use super::SnapshotArgs;

/// Arguments for expected-return signals on one date
#[derive(Args)]
pub struct SignalArgs {
    #[command(flatten)]
    pub source: SnapshotArgs,

    /// Signal date (YYYY-MM-DD)
    #[arg(long)]
    pub date: NaiveDate,

    /// Full breakdown of a single ticker
    #[arg(long)]
    pub ticker: Option<String>,
}

pub fn run_signal(args: SignalArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let snapshot = args.source.load_snapshot()?;
    let builder = PortfolioBuilder::new(args.source.load_config()?)?;
    let run = builder.evaluate_signals(&snapshot, args.date)?;

    match args.ticker {
        Some(ticker) => {
            if let Some(signal) = run.signals.iter().find(|s| s.ticker == ticker) {
                return Ok(serde_json::to_value(signal)?);
            }
            match run.exclusions.get(&ticker) {
                Some(reason) => Err(format!("{} excluded on {}: {}", ticker, args.date, reason).into()),
                None => Err(format!("{} is not in the universe on {}", ticker, args.date).into()),
            }
        }
        None => {
            let rows: Vec<ReturnRow> = run.signals.iter().map(ReturnRow::from).collect();
            let exclusions: BTreeMap<&str, String> = run
                .exclusions
                .iter()
                .map(|(ticker, reason)| (ticker.as_str(), reason.to_string()))
                .collect();
            Ok(serde_json::json!({
                "result": rows,
                "exclusions": exclusions,
                "warnings": run.warnings,
            }))
        }
    }
}
