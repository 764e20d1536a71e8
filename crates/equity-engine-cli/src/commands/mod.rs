pub mod backtest;
pub mod build;
pub mod growth;
pub mod macro_penalty;
pub mod signal;

use clap::Args;
use equity_engine_core::config::BuildConfig;
use equity_engine_core::data::MarketSnapshot;
use tracing::debug;

use crate::input;

/// Market data and tuning shared by every snapshot-driven command.
#[derive(Args)]
pub struct SnapshotArgs {
    /// Path to a JSON or YAML market snapshot (read from stdin, either format, when omitted)
    #[arg(long)]
    pub snapshot: Option<String>,

    /// Path to a JSON or YAML build configuration
    #[arg(long)]
    pub config: Option<String>,

    /// Consider every asset, not only the last index composition
    #[arg(long)]
    pub no_index: bool,
}

impl SnapshotArgs {
    /// Snapshot with the LFTS3 column filled in.
    pub fn load_snapshot(&self) -> Result<MarketSnapshot, Box<dyn std::error::Error>> {
        let snapshot: MarketSnapshot = if let Some(ref path) = self.snapshot {
            input::file::read_structured(path)?
        } else if let Some(snapshot) = input::stdin::read_stdin()? {
            snapshot
        } else {
            return Err("--snapshot is required (or pipe a snapshot on stdin)".into());
        };
        debug!(
            assets = snapshot.assets.len(),
            benchmark_rows = snapshot.benchmark.len(),
            "snapshot loaded"
        );
        Ok(snapshot.with_synthetic_risk_free())
    }

    pub fn load_config(&self) -> Result<BuildConfig, Box<dyn std::error::Error>> {
        let mut config: BuildConfig = match self.config {
            Some(ref path) => input::file::read_structured(path)?,
            None => BuildConfig::default(),
        };
        if self.no_index {
            config.include_index_in_universe = false;
        }
        Ok(config)
    }
}
