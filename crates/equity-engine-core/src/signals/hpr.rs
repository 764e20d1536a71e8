use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use super::macro_adjustment::{LinearRamp, MacroAdjustmentEstimator, RatePenaltyParameters};
use crate::data::AssetHistory;
use crate::growth::{CagrHorizons, CagrTable, GrowthEstimator, GrowthLine, GrowthOrdering};
use crate::multiples::technical::{technical_snapshot, trailing_mean_close};
use crate::multiples::{MultipleStatsEstimator, MultipleStatsParameters};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Tuning of the expected-return signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalParameters {
    /// Penalty by normalized net debt/EBITDA.
    pub debt_ramp: LinearRamp,
    pub rate: RatePenaltyParameters,
    pub multiples: MultipleStatsParameters,
    /// Segment using the bank growth blend.
    pub bank_segment: String,
    /// Net margin (mean less one std) at or below which an asset is cyclical.
    pub cyclical_net_margin_floor: f64,
    /// EBITDA margin (mean less one std) at or below which an asset is cyclical.
    pub cyclical_ebitda_margin_floor: f64,
    /// Yearly decay of the trend-score average.
    pub bullish_decay: f64,
    /// Months of closes averaged to price dividend yields.
    pub dividend_price_window_months: u32,
}

impl Default for SignalParameters {
    fn default() -> Self {
        Self {
            debt_ramp: LinearRamp {
                x_lower: 2.0,
                x_upper: 4.0,
                y_lower: 1.0,
                y_upper: 0.5,
            },
            rate: RatePenaltyParameters::default(),
            multiples: MultipleStatsParameters::default(),
            bank_segment: "Bancos".to_string(),
            cyclical_net_margin_floor: 0.0,
            cyclical_ebitda_margin_floor: 0.02,
            bullish_decay: 0.8,
            dividend_price_window_months: 36,
        }
    }
}

/// Market-wide inputs shared by every asset on one date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalContext {
    pub as_of: NaiveDate,
    pub risk_free_rate: f64,
    pub rate_hike_probability: f64,
}

/// Why an asset got no signal on a date.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ExclusionReason {
    #[error("no balance sheet disclosed")]
    NoFundamentals,
    #[error("no price history")]
    NoPriceHistory,
    #[error("no blended growth record")]
    NoGrowthRecord,
    #[error("{0} history too short")]
    MissingMultiple(String),
    #[error("net debt/EBITDA unavailable")]
    MissingLeverage,
    #[error("expected return is not finite")]
    NonFinite,
}

/// Expected annual return of one asset with its full breakdown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedReturnSignal {
    pub ticker: String,
    pub as_of: NaiveDate,
    pub segment: String,
    pub expected_return: f64,
    /// Blended growth before penalties.
    pub growth: f64,
    /// `debt_penalty × rate_penalty`.
    pub penalty: f64,
    pub debt_penalty: f64,
    pub rate_penalty: f64,
    pub growth_horizons: CagrHorizons,
    pub growth_min: f64,
    pub ordering: GrowthOrdering,
    pub long_term_growth: f64,
    pub short_term_growth: f64,
    pub cyclical: bool,
    pub delayed_disclosure: bool,
    /// 0.7 revenue + 0.3 profit two-year growth; `None` while delayed.
    pub revenue_floor_growth: Option<f64>,
    pub bullish_score: f64,
    pub bullish_mean: Option<f64>,
    pub net_margin_floor: f64,
    pub ebitda_margin_floor: f64,
    pub net_debt_ebitda: f64,
    pub ev_sales_deviation: Option<f64>,
    pub ev_ebitda_deviation: Option<f64>,
    pub dividend_yield: Option<f64>,
    pub dividend_yield_min: Option<f64>,
    pub rate_hike_probability: f64,
    pub risk_free_rate: f64,
    /// Annualized trailing returns over 72, 36, 12, 6, 3 and 1 months.
    pub trailing_returns: [Option<f64>; 6],
}

/// Long and short growth horizons plus the blended growth.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrowthBlend {
    pub long_term: f64,
    pub short_term: f64,
    pub growth: f64,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Computes the holding-period-return signal of each asset.
#[derive(Debug, Clone)]
pub struct ReturnSignalBuilder {
    params: SignalParameters,
    growth: GrowthEstimator,
    multiples: MultipleStatsEstimator,
    macro_adjustment: MacroAdjustmentEstimator,
}

impl ReturnSignalBuilder {
    pub fn new(params: SignalParameters) -> Self {
        Self {
            growth: GrowthEstimator::new(params.bank_segment.clone()),
            multiples: MultipleStatsEstimator::new(params.multiples.clone()),
            macro_adjustment: MacroAdjustmentEstimator::new(params.rate.clone()),
            params,
        }
    }

    pub fn macro_adjustment(&self) -> &MacroAdjustmentEstimator {
        &self.macro_adjustment
    }

    /// Growth table of `asset`: the shipped one when present, otherwise
    /// derived from its balance sheets.
    pub fn growth_table(&self, asset: &AssetHistory, as_of: NaiveDate) -> CagrTable {
        if asset.cagr.is_empty() {
            self.growth.table(&asset.fundamentals, as_of)
        } else {
            CagrTable::from_records(&asset.cagr)
        }
    }

    /// Signal of `ticker`, or `None` when its data cannot support one.
    pub fn build(
        &self,
        ticker: &str,
        asset: &AssetHistory,
        ctx: &SignalContext,
    ) -> Option<ExpectedReturnSignal> {
        match self.evaluate(ticker, asset, ctx) {
            Ok(signal) => Some(signal),
            Err(reason) => {
                debug!(ticker, as_of = %ctx.as_of, %reason, "asset excluded");
                None
            }
        }
    }

    /// Signal of `ticker` using only data visible on `ctx.as_of`.
    pub fn evaluate(
        &self,
        ticker: &str,
        asset: &AssetHistory,
        ctx: &SignalContext,
    ) -> Result<ExpectedReturnSignal, ExclusionReason> {
        let as_of = ctx.as_of;
        let latest_sheet = asset
            .fundamentals
            .at_or_before(as_of)
            .ok_or(ExclusionReason::NoFundamentals)?;
        let segment = latest_sheet.classification.segment.clone();
        let is_bank = segment == self.params.bank_segment;

        let multiples = asset.multiples.until(as_of);
        if multiples.is_empty() {
            return Err(ExclusionReason::NoPriceHistory);
        }

        // --- Growth ---
        let table = self.growth_table(asset, as_of);
        let blended = table
            .latest(GrowthLine::Blended, as_of)
            .ok_or(ExclusionReason::NoGrowthRecord)?;
        let delayed = table
            .latest(GrowthLine::Revenue, as_of)
            .is_some_and(|r| r.is_delay_marker());
        let (horizons, growth_min) = if delayed {
            (CagrHorizons::ZERO, 0.0)
        } else {
            (blended.horizons, blended.min)
        };
        let revenue_floor_growth = if delayed {
            None
        } else {
            revenue_floor(&table, as_of, is_bank)
        };

        // --- Multiples and trend ---
        let stats = self.multiples.evaluate(multiples);
        let net_margin = stats
            .net_margin
            .ok_or_else(|| ExclusionReason::MissingMultiple("net_margin".into()))?;
        let ebitda_margin = stats
            .ebitda_margin
            .ok_or_else(|| ExclusionReason::MissingMultiple("ebitda_margin".into()))?;
        let leverage = stats
            .normalized_net_debt_ebitda
            .ok_or(ExclusionReason::MissingLeverage)?;
        let technical = technical_snapshot(multiples, self.params.bullish_decay)
            .ok_or(ExclusionReason::NoPriceHistory)?;

        let net_margin_floor = net_margin.one_std_floor();
        let ebitda_margin_floor = ebitda_margin.one_std_floor();
        let cyclical = net_margin_floor <= self.params.cyclical_net_margin_floor
            || ebitda_margin_floor <= self.params.cyclical_ebitda_margin_floor;

        let blend = blend_growth(
            &horizons,
            growth_min,
            blended.ordering,
            technical.bullish_score,
            cyclical,
        );

        // --- Penalties ---
        let debt_penalty = self.params.debt_ramp.apply(leverage);
        let rate_penalty = self
            .macro_adjustment
            .rate_penalty(ctx.rate_hike_probability, &segment);
        let penalty = debt_penalty * rate_penalty;
        let expected_return = blend.growth * penalty;
        if !expected_return.is_finite() {
            return Err(ExclusionReason::NonFinite);
        }

        // --- Dividends (reported, not part of the return) ---
        let reference_price =
            trailing_mean_close(multiples, self.params.dividend_price_window_months);
        let dividends = table.latest(GrowthLine::Dividends, as_of);
        let yield_of = |amount: f64| {
            reference_price
                .filter(|p| *p > 0.0)
                .map(|p| amount / p)
        };

        Ok(ExpectedReturnSignal {
            ticker: ticker.to_string(),
            as_of: technical.date,
            segment,
            expected_return,
            growth: blend.growth,
            penalty,
            debt_penalty,
            rate_penalty,
            growth_horizons: horizons,
            growth_min,
            ordering: blended.ordering,
            long_term_growth: blend.long_term,
            short_term_growth: blend.short_term,
            cyclical,
            delayed_disclosure: delayed,
            revenue_floor_growth,
            bullish_score: technical.bullish_score,
            bullish_mean: technical.bullish_mean,
            net_margin_floor,
            ebitda_margin_floor,
            net_debt_ebitda: leverage,
            ev_sales_deviation: stats.ev_sales.and_then(|s| s.deviation),
            ev_ebitda_deviation: stats.ev_ebitda.and_then(|s| s.deviation),
            dividend_yield: dividends.and_then(|d| yield_of(d.forecast)),
            dividend_yield_min: dividends.and_then(|d| yield_of(d.forecast_min)),
            rate_hike_probability: ctx.rate_hike_probability,
            risk_free_rate: ctx.risk_free_rate,
            trailing_returns: technical.trailing_returns,
        })
    }
}

/// Blend the growth horizons by curve shape, trend strength and
/// cyclicality.
///
/// Weights on long, short and minimum growth always sum to one. A strong
/// trend (`bullish` near 1) shifts weight from the conservative minimum to
/// the long and short horizons; cyclical assets never use the short one.
pub fn blend_growth(
    horizons: &CagrHorizons,
    growth_min: f64,
    ordering: GrowthOrdering,
    bullish: f64,
    cyclical: bool,
) -> GrowthBlend {
    let (long_term, short_term) = match ordering {
        GrowthOrdering::Accelerating => (horizons.y6, 0.7 * horizons.y4 + 0.3 * horizons.y2),
        GrowthOrdering::Mixed => (horizons.y8, horizons.y4),
        GrowthOrdering::Decelerating => (0.7 * horizons.y8 + 0.3 * horizons.y6, horizons.y4),
    };
    let growth = if cyclical {
        long_term * (0.5 * bullish) + growth_min * (1.0 - 0.5 * bullish)
    } else {
        long_term * (0.3 + 0.3 * bullish)
            + short_term * (0.4 * bullish)
            + growth_min * (0.7 - 0.7 * bullish)
    };
    GrowthBlend {
        long_term,
        short_term,
        growth,
    }
}

/// Two-year revenue growth blended with two-year profit growth.
fn revenue_floor(table: &CagrTable, as_of: NaiveDate, is_bank: bool) -> Option<f64> {
    let revenue = table.latest(GrowthLine::Revenue, as_of)?;
    let profit_line = if is_bank {
        GrowthLine::NetIncome
    } else {
        GrowthLine::Ebitda
    };
    let profit = table.latest(profit_line, as_of)?;
    Some(0.7 * revenue.horizons.y2 + 0.3 * profit.horizons.y2)
}
