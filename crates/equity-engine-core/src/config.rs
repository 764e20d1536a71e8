use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::optimizer::OptimizerParameters;
use crate::signals::SignalParameters;
use crate::universe::UniverseParameters;
use crate::EngineResult;

/// Everything a portfolio build can be tuned with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Cap on any single equity.
    pub max_per_asset: f64,
    /// Cap on any equity sector.
    pub max_per_sector: f64,
    /// Floor on the risk-free sector.
    pub min_fixed_income: f64,
    /// L2 regularization strength.
    pub l2_gamma: f64,
    /// Optimized weights below this are dropped.
    pub min_alloc_weight: f64,
    /// Restrict the universe to the last published index composition.
    pub include_index_in_universe: bool,
    pub signal: SignalParameters,
    pub universe: UniverseParameters,
    pub optimizer: OptimizerParameters,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            max_per_asset: 0.10,
            max_per_sector: 0.20,
            min_fixed_income: 0.20,
            l2_gamma: 5.0,
            min_alloc_weight: 0.005,
            include_index_in_universe: true,
            signal: SignalParameters::default(),
            universe: UniverseParameters::default(),
            optimizer: OptimizerParameters::default(),
        }
    }
}

impl BuildConfig {
    pub fn validate(&self) -> EngineResult<()> {
        unit_interval("max_per_asset", self.max_per_asset)?;
        unit_interval("max_per_sector", self.max_per_sector)?;
        unit_interval("min_fixed_income", self.min_fixed_income)?;
        unit_interval("min_alloc_weight", self.min_alloc_weight)?;
        unit_interval("optimizer.risk_free_haircut", self.optimizer.risk_free_haircut)?;
        if !(self.l2_gamma >= 0.0 && self.l2_gamma.is_finite()) {
            return Err(EngineError::InvalidInput {
                field: "l2_gamma".into(),
                reason: format!("must be a non-negative number, got {}", self.l2_gamma),
            });
        }
        if self.optimizer.trading_days <= 0.0 {
            return Err(EngineError::InvalidInput {
                field: "optimizer.trading_days".into(),
                reason: "must be positive".into(),
            });
        }
        if self.universe.lookback_rows < 3 {
            return Err(EngineError::InvalidInput {
                field: "universe.lookback_rows".into(),
                reason: "need at least 3 rows of prices".into(),
            });
        }
        if self.universe.share_class_root_len == 0 {
            return Err(EngineError::InvalidInput {
                field: "universe.share_class_root_len".into(),
                reason: "must be positive".into(),
            });
        }
        let ramp = &self.signal.debt_ramp;
        if ramp.x_upper <= ramp.x_lower {
            return Err(EngineError::InvalidInput {
                field: "signal.debt_ramp".into(),
                reason: "x_upper must exceed x_lower".into(),
            });
        }
        let multiples = &self.signal.multiples;
        if !(multiples.decay > 0.0 && multiples.decay <= 1.0) {
            return Err(EngineError::InvalidInput {
                field: "signal.multiples.decay".into(),
                reason: format!("must lie in (0, 1], got {}", multiples.decay),
            });
        }
        Ok(())
    }
}

fn unit_interval(field: &str, value: f64) -> EngineResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(EngineError::InvalidInput {
            field: field.into(),
            reason: format!("must lie in [0, 1], got {}", value),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults_are_valid() {
        BuildConfig::default().validate().unwrap();
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let cfg: BuildConfig =
            serde_json::from_str(r#"{"max_per_asset": 0.15, "universe": {"max_missing": 10}}"#)
                .unwrap();
        assert_eq!(cfg.max_per_asset, 0.15);
        assert_eq!(cfg.max_per_sector, 0.20);
        assert_eq!(cfg.universe.max_missing, 10);
        assert_eq!(cfg.universe.lookback_rows, 756);
        assert_eq!(cfg.optimizer.risk_free_haircut, 0.9);
        assert_eq!(cfg.signal.bank_segment, "Bancos");
    }

    #[test]
    fn test_out_of_range_weight_rejected() {
        let cfg = BuildConfig {
            max_per_sector: 1.5,
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("max_per_sector"));
    }

    #[test]
    fn test_negative_gamma_rejected() {
        let cfg = BuildConfig {
            l2_gamma: -1.0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
