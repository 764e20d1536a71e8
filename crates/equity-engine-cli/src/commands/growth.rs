use chrono::{Datelike, NaiveDate};
use clap::Args;
use serde_json::Value;

use equity_engine_core::growth::{estimate_cagr, tempo, GrowthLine};
use equity_engine_core::signals::ReturnSignalBuilder;

use super::SnapshotArgs;

/// Arguments for multi-horizon growth estimation
#[derive(Args)]
pub struct CagrArgs {
    /// Comma-separated quarterly values, oldest first
    #[arg(long, value_delimiter = ',', allow_hyphen_values = true)]
    pub values: Option<Vec<f64>>,

    /// Period end of the last value (YYYY-MM-DD)
    #[arg(long)]
    pub end: Option<NaiveDate>,

    /// Ticker whose growth table to print from the snapshot
    #[arg(long)]
    pub ticker: Option<String>,

    /// Visibility date for the snapshot table (YYYY-MM-DD)
    #[arg(long)]
    pub date: Option<NaiveDate>,

    #[command(flatten)]
    pub source: SnapshotArgs,
}

pub fn run_cagr(args: CagrArgs) -> Result<Value, Box<dyn std::error::Error>> {
    if let Some(values) = args.values {
        let end = args.end.ok_or("--end is required with --values")?;
        if end.month() % 3 != 0 {
            return Err(format!("{} is not a quarter end month", end).into());
        }
        let t_last = tempo(end);
        let n = values.len();
        let points: Vec<(f64, f64)> = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| (t_last - (n - 1 - i) as f64 * 0.25, v))
            .collect();
        let estimate = estimate_cagr(&points);
        return Ok(serde_json::json!({
            "result": {
                "y8": estimate.horizons.y8,
                "y6": estimate.horizons.y6,
                "y4": estimate.horizons.y4,
                "y2": estimate.horizons.y2,
                "min": estimate.min,
                "ordering": estimate.horizons.ordering(),
                "last_value": estimate.last_value,
                "forecast": estimate.forecast,
                "forecast_min": estimate.forecast_min,
            }
        }));
    }

    let ticker = args.ticker.ok_or("--values or --ticker is required")?;
    let date = args.date.ok_or("--date is required with --ticker")?;
    let snapshot = args.source.load_snapshot()?;
    let config = args.source.load_config()?;
    let asset = snapshot
        .assets
        .get(&ticker)
        .ok_or_else(|| format!("{} not found in the snapshot", ticker))?;

    let table = ReturnSignalBuilder::new(config.signal).growth_table(asset, date);
    let rows: Vec<Value> = [
        GrowthLine::Revenue,
        GrowthLine::Ebitda,
        GrowthLine::NetIncome,
        GrowthLine::Dividends,
        GrowthLine::Blended,
    ]
    .into_iter()
    .filter_map(|line| table.latest(line, date))
    .map(|r| {
        serde_json::json!({
            "line": r.line,
            "period_end": r.period_end,
            "visible_from": r.visible_from,
            "y8": r.horizons.y8,
            "y6": r.horizons.y6,
            "y4": r.horizons.y4,
            "y2": r.horizons.y2,
            "min": r.min,
            "ordering": r.ordering,
            "delayed": r.is_delay_marker(),
        })
    })
    .collect();
    if rows.is_empty() {
        return Err(format!("{} has no balance sheet disclosed by {}", ticker, date).into());
    }
    Ok(serde_json::json!({ "result": rows }))
}
