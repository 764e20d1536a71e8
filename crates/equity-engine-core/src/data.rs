//! Input data model: what the loading layer hands to the engine for a run.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::growth::CagrRecord;
use crate::series::{AscendingSeries, Dated};

// ---------------------------------------------------------------------------
// Fundamentals
// ---------------------------------------------------------------------------

/// Three-level sector taxonomy. `segment` is the finest level and is the
/// key used by sector constraints, the bank blend and rate sensitivity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorClassification {
    pub sector: String,
    pub subsector: String,
    pub segment: String,
}

/// Trailing dividends per share paid in each 12-month block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct DividendHistory {
    pub m12: f64,
    pub m24: f64,
    pub m36: f64,
    pub m48: f64,
    pub m60: f64,
}

impl DividendHistory {
    pub fn yields(&self, price: f64) -> Option<[f64; 5]> {
        if price <= 0.0 || !price.is_finite() {
            return None;
        }
        Some([
            self.m12 / price,
            self.m24 / price,
            self.m36 / price,
            self.m48 / price,
            self.m60 / price,
        ])
    }
}

/// One balance sheet. Flow lines are trailing-twelve-month figures.
///
/// The record becomes visible on `disclosed_on`, never on `period_end`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FundamentalsRecord {
    pub period_end: NaiveDate,
    pub disclosed_on: NaiveDate,
    pub revenue: f64,
    pub ebitda: f64,
    pub net_income: f64,
    #[serde(default)]
    pub controlling_net_income: f64,
    #[serde(default)]
    pub gross_debt: f64,
    #[serde(default)]
    pub net_debt: f64,
    #[serde(default)]
    pub lease_debt: f64,
    #[serde(default)]
    pub operating_cash_flow: f64,
    #[serde(default)]
    pub investing_cash_flow: f64,
    #[serde(default)]
    pub financing_cash_flow: f64,
    #[serde(default)]
    pub shares_outstanding: f64,
    pub classification: SectorClassification,
    #[serde(default)]
    pub close_price: f64,
    #[serde(default)]
    pub dividends: DividendHistory,
}

impl Dated for FundamentalsRecord {
    fn date(&self) -> NaiveDate {
        self.disclosed_on
    }
}

// ---------------------------------------------------------------------------
// Daily multiples
// ---------------------------------------------------------------------------

/// Daily market-derived record. Missing multiples stay `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiplesObservation {
    pub date: NaiveDate,
    /// Close restated to the current share count.
    pub close: f64,
    /// Dividend- and split-adjusted close; the price used for returns.
    pub adjusted_close: f64,
    #[serde(default)]
    pub enterprise_value: Option<f64>,
    #[serde(default)]
    pub ev_sales: Option<f64>,
    #[serde(default)]
    pub ev_ebitda: Option<f64>,
    #[serde(default)]
    pub price_earnings: Option<f64>,
    #[serde(default)]
    pub net_margin: Option<f64>,
    #[serde(default)]
    pub ebitda_margin: Option<f64>,
    #[serde(default)]
    pub net_debt_ebitda: Option<f64>,
}

impl Dated for MultiplesObservation {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// The valuation multiples tracked by the deviation statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Multiple {
    EvSales,
    EvEbitda,
    PriceEarnings,
    NetMargin,
    EbitdaMargin,
}

impl Multiple {
    pub const ALL: [Multiple; 5] = [
        Multiple::EvSales,
        Multiple::EvEbitda,
        Multiple::PriceEarnings,
        Multiple::NetMargin,
        Multiple::EbitdaMargin,
    ];

    pub fn value(&self, obs: &MultiplesObservation) -> Option<f64> {
        match self {
            Multiple::EvSales => obs.ev_sales,
            Multiple::EvEbitda => obs.ev_ebitda,
            Multiple::PriceEarnings => obs.price_earnings,
            Multiple::NetMargin => obs.net_margin,
            Multiple::EbitdaMargin => obs.ebitda_margin,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Multiple::EvSales => "ev_sales",
            Multiple::EvEbitda => "ev_ebitda",
            Multiple::PriceEarnings => "price_earnings",
            Multiple::NetMargin => "net_margin",
            Multiple::EbitdaMargin => "ebitda_margin",
        }
    }
}

// ---------------------------------------------------------------------------
// Benchmark and macro inputs
// ---------------------------------------------------------------------------

/// One row of the combined benchmark table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkObservation {
    pub date: NaiveDate,
    /// Trailing 12-month risk-free rate, in percent.
    #[serde(default, alias = "anula100")]
    pub annual_rate_pct: Option<f64>,
    /// Daily risk-free rate, in percent.
    #[serde(default, alias = "diario")]
    pub daily_rate_pct: Option<f64>,
    /// Market index level.
    #[serde(default, alias = "IBOV")]
    pub index_level: Option<f64>,
    /// Cumulative risk-free index (LFTS3).
    #[serde(default, alias = "LFTS3")]
    pub risk_free_index: Option<f64>,
}

impl Dated for BenchmarkObservation {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// Market-implied probability of a policy-rate hike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateOutlook {
    pub date: NaiveDate,
    pub hike_probability: f64,
}

impl Dated for RateOutlook {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

/// Index membership published on `date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexComposition {
    pub date: NaiveDate,
    pub tickers: Vec<String>,
}

impl Dated for IndexComposition {
    fn date(&self) -> NaiveDate {
        self.date
    }
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Everything known about one ticker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetHistory {
    pub fundamentals: AscendingSeries<FundamentalsRecord>,
    pub multiples: AscendingSeries<MultiplesObservation>,
    /// Precomputed growth table. Derived from `fundamentals` when empty.
    #[serde(default)]
    pub cagr: Vec<CagrRecord>,
}

impl AssetHistory {
    /// Adjusted closes up to and including `date`.
    pub fn adjusted_closes(&self, date: NaiveDate) -> Vec<(NaiveDate, f64)> {
        self.multiples
            .until(date)
            .iter()
            .map(|m| (m.date, m.adjusted_close))
            .collect()
    }
}

/// The complete input of a build or backtest.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub assets: BTreeMap<String, AssetHistory>,
    pub benchmark: AscendingSeries<BenchmarkObservation>,
    #[serde(default)]
    pub rate_outlook: AscendingSeries<RateOutlook>,
    #[serde(default)]
    pub index_compositions: AscendingSeries<IndexComposition>,
}

impl MarketSnapshot {
    /// Fill the LFTS3 column from the daily rate where it is missing.
    ///
    /// The index compounds `1 + daily/100` from 1.0 at the first row; rows
    /// without a daily rate carry the previous level.
    pub fn with_synthetic_risk_free(mut self) -> Self {
        if self.benchmark.iter().all(|b| b.risk_free_index.is_some()) {
            return self;
        }
        let mut level = 1.0;
        let rows: Vec<BenchmarkObservation> = self
            .benchmark
            .iter()
            .map(|row| {
                level *= 1.0 + row.daily_rate_pct.unwrap_or(0.0) / 100.0;
                BenchmarkObservation {
                    risk_free_index: Some(level),
                    ..row.clone()
                }
            })
            .collect();
        self.benchmark = AscendingSeries::new(rows);
        self
    }

    /// Last trailing annual rate published on or before `date`, as a decimal.
    pub fn risk_free_rate(&self, date: NaiveDate) -> Option<f64> {
        self.benchmark
            .until(date)
            .iter()
            .rev()
            .find_map(|b| b.annual_rate_pct)
            .map(|pct| pct / 100.0)
    }

    pub fn rate_hike_probability(&self, date: NaiveDate) -> Option<f64> {
        self.rate_outlook.at_or_before(date).map(|r| r.hike_probability)
    }

    /// LFTS3 levels up to and including `date`.
    pub fn risk_free_index_series(&self, date: NaiveDate) -> Vec<(NaiveDate, f64)> {
        self.benchmark
            .until(date)
            .iter()
            .filter_map(|b| b.risk_free_index.map(|v| (b.date, v)))
            .collect()
    }

    /// IBOV levels up to and including `date`.
    pub fn market_index_series(&self, date: NaiveDate) -> Vec<(NaiveDate, f64)> {
        self.benchmark
            .until(date)
            .iter()
            .filter_map(|b| b.index_level.map(|v| (b.date, v)))
            .collect()
    }

    /// Constituents of the latest composition published strictly before `date`.
    pub fn index_members(&self, date: NaiveDate) -> Option<&[String]> {
        self.index_compositions
            .before(date)
            .last()
            .map(|c| c.tickers.as_slice())
    }
}
