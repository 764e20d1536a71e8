use clap::Args;
use serde_json::Value;

use equity_engine_core::signals::{MacroAdjustmentEstimator, SignalParameters};

/// Arguments for the rate-hike and leverage penalties
#[derive(Args)]
pub struct RatePenaltyArgs {
    /// Probability of a policy-rate hike (0 to 1)
    #[arg(long)]
    pub probability: f64,

    /// Segment of the asset
    #[arg(long)]
    pub segment: String,

    /// Net debt/EBITDA, to include the leverage penalty
    #[arg(long, allow_hyphen_values = true)]
    pub net_debt_ebitda: Option<f64>,
}

pub fn run_rate_penalty(args: RatePenaltyArgs) -> Result<Value, Box<dyn std::error::Error>> {
    if !(0.0..=1.0).contains(&args.probability) {
        return Err(format!("--probability must lie in [0, 1], got {}", args.probability).into());
    }
    let params = SignalParameters::default();
    let estimator = MacroAdjustmentEstimator::new(params.rate.clone());
    let rate_penalty = estimator.rate_penalty(args.probability, &args.segment);
    let debt_penalty = args.net_debt_ebitda.map(|x| params.debt_ramp.apply(x));

    Ok(serde_json::json!({
        "result": {
            "rate_penalty": rate_penalty,
            "rate_sensitive": estimator.is_rate_sensitive(&args.segment),
            "debt_penalty": debt_penalty,
            "penalty": rate_penalty * debt_penalty.unwrap_or(1.0),
        }
    }))
}
