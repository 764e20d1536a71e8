//! Walk-forward simulation: rebuild the portfolio on a fixed cadence of
//! benchmark dates and mark the holdings to market in between.

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::info;

use crate::allocation::{to_money, AllocationResult};
use crate::builder::PortfolioBuilder;
use crate::config::BuildConfig;
use crate::data::MarketSnapshot;
use crate::error::EngineError;
use crate::types::{with_metadata, ComputationOutput, Money, Weight};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

fn default_rebalance_every() -> usize {
    21
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_capital: Money,
    /// Benchmark rows between rebalances.
    #[serde(default = "default_rebalance_every")]
    pub rebalance_every: usize,
    #[serde(default)]
    pub config: BuildConfig,
}

/// Portfolio value and rebased benchmarks on one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub portfolio: Money,
    pub market_index: Option<f64>,
    pub risk_free: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceRecord {
    pub date: NaiveDate,
    pub until: NaiveDate,
    pub capital: Money,
    pub weights: BTreeMap<String, Weight>,
    pub allocation: AllocationResult,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSummary {
    pub total_return: f64,
    pub annualized_return: f64,
    pub annualized_volatility: f64,
    pub max_drawdown: f64,
    /// Against the risk-free curve; absent for the risk-free curve itself.
    pub sharpe_ratio: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestOutput {
    pub curve: Vec<EquityPoint>,
    pub rebalances: Vec<RebalanceRecord>,
    pub portfolio: PerformanceSummary,
    pub market_index: Option<PerformanceSummary>,
    pub risk_free: PerformanceSummary,
}

// ---------------------------------------------------------------------------
// Simulation
// ---------------------------------------------------------------------------

/// Every `every`-th date plus the last one.
pub fn rebalance_dates(dates: &[NaiveDate], every: usize) -> Vec<NaiveDate> {
    let mut out: Vec<NaiveDate> = dates.iter().step_by(every.max(1)).copied().collect();
    if let Some(&last) = dates.last() {
        if out.last() != Some(&last) {
            out.push(last);
        }
    }
    out
}

pub fn run_backtest(
    snapshot: &MarketSnapshot,
    request: &BacktestRequest,
) -> EngineResult<ComputationOutput<BacktestOutput>> {
    let start = Instant::now();
    validate_request(request)?;
    let builder = PortfolioBuilder::new(request.config.clone())?;
    let rf_ticker = request.config.universe.risk_free_ticker.clone();
    let trading_days = request.config.optimizer.trading_days;

    let rows: Vec<_> = snapshot
        .benchmark
        .between(request.start, request.end)
        .iter()
        .filter(|b| b.risk_free_index.is_some())
        .collect();
    if rows.len() < 2 {
        return Err(EngineError::InsufficientData(format!(
            "{} benchmark rows with LFTS3 between {} and {}",
            rows.len(),
            request.start,
            request.end
        )));
    }
    let dates: Vec<NaiveDate> = rows.iter().map(|b| b.date).collect();
    let schedule = rebalance_dates(&dates, request.rebalance_every);

    let mut warnings = Vec::new();
    let mut capital = request.initial_capital;
    let mut portfolio_curve: Vec<(NaiveDate, Money)> = Vec::new();
    let mut rebalances = Vec::with_capacity(schedule.len().saturating_sub(1));

    for pair in schedule.windows(2) {
        let (from, until) = (pair[0], pair[1]);
        let built = builder.build(snapshot, from, capital)?;
        let allocation = built.result.allocation;

        // Each position grows with its own price ratio since `from`.
        let mut legs = Vec::with_capacity(allocation.positions.len());
        for (ticker, money) in &allocation.positions {
            let base = price_at(snapshot, ticker, &rf_ticker, from)?;
            legs.push((ticker.as_str(), *money, base));
        }

        if !portfolio_curve.is_empty() {
            portfolio_curve.pop();
        }
        for &date in dates.iter().filter(|d| **d >= from && **d <= until) {
            let mut value = allocation.leftover;
            for (ticker, money, base) in &legs {
                let ratio = price_at(snapshot, ticker, &rf_ticker, date)? / base;
                value += *money * to_money(ratio, "prices")?;
            }
            portfolio_curve.push((date, value.round_dp(2)));
        }
        capital = portfolio_curve
            .last()
            .map(|(_, v)| *v)
            .unwrap_or(capital);

        info!(%from, %until, %capital, "rebalance period closed");
        warnings.extend(built.warnings.iter().map(|w| format!("{}: {}", from, w)));
        rebalances.push(RebalanceRecord {
            date: from,
            until,
            capital: allocation.total,
            weights: built.result.weights,
            allocation,
            warnings: built.warnings,
        });
    }

    // --- Benchmarks rebased to the initial capital ---
    let initial = request.initial_capital.to_f64().unwrap_or(0.0);
    let rf_levels: BTreeMap<NaiveDate, f64> = rows
        .iter()
        .filter_map(|b| b.risk_free_index.map(|v| (b.date, v)))
        .collect();
    let ibov_levels: BTreeMap<NaiveDate, f64> = rows
        .iter()
        .filter_map(|b| b.index_level.map(|v| (b.date, v)))
        .collect();
    let rf_base = rf_levels.values().next().copied().unwrap_or(1.0);
    let ibov_base = ibov_levels.values().next().copied();

    let curve: Vec<EquityPoint> = portfolio_curve
        .iter()
        .map(|(date, value)| EquityPoint {
            date: *date,
            portfolio: *value,
            market_index: ibov_base
                .zip(ibov_levels.get(date))
                .map(|(base, level)| initial * level / base),
            risk_free: rf_levels.get(date).map(|l| initial * l / rf_base).unwrap_or(f64::NAN),
        })
        .collect();

    let portfolio_values: Vec<f64> = curve
        .iter()
        .map(|p| p.portfolio.to_f64().unwrap_or(f64::NAN))
        .collect();
    let rf_values: Vec<f64> = curve.iter().map(|p| p.risk_free).collect();
    let ibov_values: Vec<f64> = curve.iter().filter_map(|p| p.market_index).collect();

    let risk_free = summarize(&rf_values, trading_days, None)?;
    let portfolio = summarize(&portfolio_values, trading_days, Some(risk_free.annualized_return))?;
    let market_index = if ibov_values.len() == curve.len() {
        Some(summarize(&ibov_values, trading_days, Some(risk_free.annualized_return))?)
    } else {
        warnings.push("IBOV missing on some dates; no market summary".into());
        None
    };

    info!(
        periods = rebalances.len(),
        total_return = portfolio.total_return,
        "backtest finished"
    );

    let output = BacktestOutput {
        curve,
        rebalances,
        portfolio,
        market_index,
        risk_free,
    };
    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Walk-forward rebalanced max-Sharpe portfolio marked to market daily",
        request,
        warnings,
        elapsed,
        output,
    ))
}

/// Price of `ticker` on the last observation at or before `date`.
fn price_at(
    snapshot: &MarketSnapshot,
    ticker: &str,
    risk_free_ticker: &str,
    date: NaiveDate,
) -> EngineResult<f64> {
    let price = if ticker == risk_free_ticker {
        snapshot
            .benchmark
            .until(date)
            .iter()
            .rev()
            .find_map(|b| b.risk_free_index)
    } else {
        snapshot
            .assets
            .get(ticker)
            .and_then(|a| a.multiples.at_or_before(date))
            .map(|m| m.adjusted_close)
    };
    match price {
        Some(p) if p > 0.0 && p.is_finite() => Ok(p),
        _ => Err(EngineError::InsufficientData(format!(
            "no usable price for {} on or before {}",
            ticker, date
        ))),
    }
}

/// Summary statistics of a value curve with one point per trading day.
pub fn summarize(
    values: &[f64],
    trading_days: f64,
    risk_free_annual: Option<f64>,
) -> EngineResult<PerformanceSummary> {
    if values.len() < 3 || values.iter().any(|v| !v.is_finite() || *v <= 0.0) {
        return Err(EngineError::InsufficientData(
            "At least 3 positive values required".into(),
        ));
    }
    let returns: Vec<f64> = values.windows(2).map(|w| w[1] / w[0] - 1.0).collect();
    let total_return = values[values.len() - 1] / values[0] - 1.0;
    let annualized_return = (1.0 + total_return).powf(trading_days / returns.len() as f64) - 1.0;
    let annualized_volatility = returns.iter().std_dev() * trading_days.sqrt();
    let sharpe_ratio = risk_free_annual.map(|rf| {
        if annualized_volatility == 0.0 {
            0.0
        } else {
            (annualized_return - rf) / annualized_volatility
        }
    });
    Ok(PerformanceSummary {
        total_return,
        annualized_return,
        annualized_volatility,
        max_drawdown: max_drawdown(values),
        sharpe_ratio,
    })
}

/// Largest peak-to-trough loss as a positive fraction.
pub fn max_drawdown(values: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0;
    for &v in values {
        if v > peak {
            peak = v;
        }
        if peak > 0.0 {
            let dd = (peak - v) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }
    max_dd
}

fn validate_request(request: &BacktestRequest) -> EngineResult<()> {
    if request.start >= request.end {
        return Err(EngineError::DateError(format!(
            "start {} must precede end {}",
            request.start, request.end
        )));
    }
    if request.initial_capital <= Decimal::ZERO {
        return Err(EngineError::InvalidInput {
            field: "initial_capital".into(),
            reason: "Capital must be positive".into(),
        });
    }
    if request.rebalance_every == 0 {
        return Err(EngineError::InvalidInput {
            field: "rebalance_every".into(),
            reason: "must be at least 1".into(),
        });
    }
    Ok(())
}
