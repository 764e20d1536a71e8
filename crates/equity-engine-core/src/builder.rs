//! One-date portfolio construction: signals, universe, optimization and
//! whole-share allocation, plus the tables needed to audit the result.

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::allocation::{AllocationResult, DiscreteAllocator};
use crate::config::BuildConfig;
use crate::data::{AssetHistory, MarketSnapshot};
use crate::error::EngineError;
use crate::optimizer::{PortfolioConstraints, PortfolioOptimizer, PortfolioPerformance};
use crate::panel::PricePanel;
use crate::signals::{ExclusionReason, ExpectedReturnSignal, ReturnSignalBuilder, SignalContext};
use crate::types::{with_metadata, ComputationOutput, Money, Weight};
use crate::universe::{Candidate, UniverseFilter};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Signals of every asset considered on one date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalRun {
    pub context: SignalContext,
    /// Sorted by descending expected return.
    pub signals: Vec<ExpectedReturnSignal>,
    pub exclusions: BTreeMap<String, ExclusionReason>,
    pub warnings: Vec<String>,
}

/// Headline columns of one signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnRow {
    pub ticker: String,
    pub segment: String,
    pub expected_return: f64,
    pub growth: f64,
    pub ev_sales_deviation: Option<f64>,
    pub ev_ebitda_deviation: Option<f64>,
    pub bullish_score: f64,
    pub bullish_mean: Option<f64>,
    pub trailing_returns: [Option<f64>; 6],
}

impl From<&ExpectedReturnSignal> for ReturnRow {
    fn from(s: &ExpectedReturnSignal) -> Self {
        Self {
            ticker: s.ticker.clone(),
            segment: s.segment.clone(),
            expected_return: s.expected_return,
            growth: s.growth,
            ev_sales_deviation: s.ev_sales_deviation,
            ev_ebitda_deviation: s.ev_ebitda_deviation,
            bullish_score: s.bullish_score,
            bullish_mean: s.bullish_mean,
            trailing_returns: s.trailing_returns,
        }
    }
}

/// Tables for auditing a build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationBundle {
    /// Full signal breakdown, best expected return first.
    pub diagnostics: Vec<ExpectedReturnSignal>,
    pub returns: Vec<ReturnRow>,
    /// Adjusted closes of every signaled asset.
    pub adjusted_prices: PricePanel,
    /// `adjusted_prices` with the LFTS3 and IBOV columns appended.
    pub benchmark_prices: PricePanel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioBuildOutput {
    pub date: NaiveDate,
    pub capital: Money,
    pub risk_free_rate: f64,
    pub rate_hike_probability: f64,
    pub weights: BTreeMap<String, Weight>,
    pub performance: PortfolioPerformance,
    pub shrinkage: f64,
    pub allocation: AllocationResult,
    pub verification: VerificationBundle,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct PortfolioBuilder {
    config: BuildConfig,
    signals: ReturnSignalBuilder,
    filter: UniverseFilter,
    optimizer: PortfolioOptimizer,
}

impl PortfolioBuilder {
    pub fn new(config: BuildConfig) -> EngineResult<Self> {
        config.validate()?;
        Ok(Self {
            signals: ReturnSignalBuilder::new(config.signal.clone()),
            filter: UniverseFilter::new(config.universe.clone()),
            optimizer: PortfolioOptimizer::new(config.optimizer.clone()),
            config,
        })
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Risk-free rate and rate-hike probability known on `date`.
    pub fn context(&self, snapshot: &MarketSnapshot, date: NaiveDate) -> EngineResult<SignalContext> {
        let risk_free_rate = snapshot.risk_free_rate(date).ok_or_else(|| {
            EngineError::InsufficientData(format!("no risk-free rate on or before {}", date))
        })?;
        let rate_hike_probability = snapshot.rate_hike_probability(date).ok_or_else(|| {
            EngineError::InsufficientData(format!("no rate outlook on or before {}", date))
        })?;
        Ok(SignalContext {
            as_of: date,
            risk_free_rate,
            rate_hike_probability,
        })
    }

    /// Assets eligible on `date`: the last published index composition when
    /// configured and available, otherwise every asset of the snapshot.
    pub fn universe_assets<'a>(
        &self,
        snapshot: &'a MarketSnapshot,
        date: NaiveDate,
        warnings: &mut Vec<String>,
    ) -> Vec<(&'a str, &'a AssetHistory)> {
        let members = if self.config.include_index_in_universe {
            snapshot.index_members(date)
        } else {
            None
        };
        match members {
            Some(tickers) => {
                let mut out: Vec<(&str, &AssetHistory)> = Vec::with_capacity(tickers.len());
                for t in tickers {
                    match snapshot.assets.get_key_value(t) {
                        Some((k, asset)) => out.push((k.as_str(), asset)),
                        None => warnings.push(format!("{}: index member without data", t)),
                    }
                }
                out.sort_by(|a, b| a.0.cmp(b.0));
                out.dedup_by(|a, b| a.0 == b.0);
                out
            }
            None => snapshot
                .assets
                .iter()
                .map(|(k, a)| (k.as_str(), a))
                .collect(),
        }
    }

    /// Expected-return signal of every eligible asset on `date`.
    pub fn evaluate_signals(&self, snapshot: &MarketSnapshot, date: NaiveDate) -> EngineResult<SignalRun> {
        let context = self.context(snapshot, date)?;
        let mut warnings = Vec::new();
        let assets = self.universe_assets(snapshot, date, &mut warnings);

        let mut signals = Vec::with_capacity(assets.len());
        let mut exclusions = BTreeMap::new();
        for (ticker, result) in self.evaluate_all(&assets, &context) {
            match result {
                Ok(signal) => signals.push(signal),
                Err(reason) => {
                    debug!(%ticker, %date, %reason, "asset excluded");
                    warnings.push(format!("{}: {}", ticker, reason));
                    exclusions.insert(ticker, reason);
                }
            }
        }
        signals.sort_by(|a, b| {
            b.expected_return
                .total_cmp(&a.expected_return)
                .then_with(|| a.ticker.cmp(&b.ticker))
        });
        if signals.is_empty() {
            warn!(%date, candidates = assets.len(), "no asset produced a signal");
        }
        info!(%date, signals = signals.len(), excluded = exclusions.len(), "signals evaluated");

        Ok(SignalRun {
            context,
            signals,
            exclusions,
            warnings,
        })
    }

    #[cfg(feature = "parallel")]
    fn evaluate_all(
        &self,
        assets: &[(&str, &AssetHistory)],
        ctx: &SignalContext,
    ) -> Vec<(String, Result<ExpectedReturnSignal, ExclusionReason>)> {
        use rayon::prelude::*;
        assets
            .par_iter()
            .map(|(ticker, asset)| (ticker.to_string(), self.signals.evaluate(ticker, asset, ctx)))
            .collect()
    }

    #[cfg(not(feature = "parallel"))]
    fn evaluate_all(
        &self,
        assets: &[(&str, &AssetHistory)],
        ctx: &SignalContext,
    ) -> Vec<(String, Result<ExpectedReturnSignal, ExclusionReason>)> {
        assets
            .iter()
            .map(|(ticker, asset)| (ticker.to_string(), self.signals.evaluate(ticker, asset, ctx)))
            .collect()
    }

    /// Build and allocate the portfolio of `date` with `capital`.
    pub fn build(
        &self,
        snapshot: &MarketSnapshot,
        date: NaiveDate,
        capital: Money,
    ) -> EngineResult<ComputationOutput<PortfolioBuildOutput>> {
        let start = Instant::now();
        if capital <= Decimal::ZERO {
            return Err(EngineError::InvalidInput {
                field: "capital".into(),
                reason: "Capital must be positive".into(),
            });
        }

        let run = self.evaluate_signals(snapshot, date)?;
        let mut warnings = run.warnings.clone();

        // --- Price tables ---
        let columns: Vec<(String, Vec<(NaiveDate, f64)>)> = run
            .signals
            .iter()
            .filter_map(|s| {
                snapshot
                    .assets
                    .get(&s.ticker)
                    .map(|a| (s.ticker.clone(), a.adjusted_closes(date)))
            })
            .collect::<BTreeMap<_, _>>()
            .into_iter()
            .collect();
        let adjusted = PricePanel::from_columns(columns);
        let risk_free_series = snapshot.risk_free_index_series(date);

        let candidates: Vec<Candidate> = run
            .signals
            .iter()
            .map(|s| Candidate {
                ticker: s.ticker.clone(),
                expected_return: s.expected_return,
                sector: s.segment.clone(),
            })
            .collect();
        let assets_label = candidates
            .iter()
            .map(|c| c.ticker.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let fail = |e: EngineError| EngineError::AllocationFailed {
            date,
            capital,
            assets: assets_label.clone(),
            reason: e.to_string(),
        };

        // --- Universe, optimization, allocation ---
        let (universe, notes) = self
            .filter
            .apply(
                &candidates,
                &adjusted,
                &risk_free_series,
                run.context.risk_free_rate,
            )
            .map_err(fail)?;
        warnings.extend(notes);

        let constraints = PortfolioConstraints::for_universe(
            &universe,
            &self.config.universe.risk_free_sector,
            self.config.max_per_asset,
            self.config.max_per_sector,
            self.config.min_fixed_income,
            self.config.l2_gamma,
            self.config.min_alloc_weight,
        );
        let optimized = self.optimizer.optimize(&universe, &constraints).map_err(fail)?;

        let last = universe.prices.last_prices().ok_or_else(|| {
            fail(EngineError::InsufficientData(
                "last price row is incomplete".into(),
            ))
        })?;
        let latest: BTreeMap<String, f64> = universe.tickers.iter().cloned().zip(last).collect();
        let allocation = DiscreteAllocator
            .allocate(date, &optimized.weights, &latest, capital)
            .map_err(fail)?;

        let tolerance = Decimal::from(allocation.positions.len().max(1) as u64) * dec!(0.01);
        if (allocation.total - capital).abs() > tolerance {
            return Err(fail(EngineError::InvalidInput {
                field: "allocation".into(),
                reason: format!(
                    "allocated total {} differs from capital by more than {}",
                    allocation.total, tolerance
                ),
            }));
        }
        info!(
            %date,
            %capital,
            held = allocation.positions.len(),
            leftover = %allocation.leftover,
            "portfolio allocated"
        );

        // --- Verification tables ---
        let adjusted_prices = adjusted.drop_empty();
        let benchmark_prices = adjusted_prices
            .left_join_column(&self.config.universe.risk_free_ticker, &risk_free_series)
            .left_join_column("IBOV", &snapshot.market_index_series(date));
        let diagnostics: Vec<ExpectedReturnSignal> = run
            .signals
            .iter()
            .filter(|s| adjusted_prices.column_index(&s.ticker).is_some())
            .cloned()
            .collect();
        let returns = diagnostics.iter().map(ReturnRow::from).collect();

        let output = PortfolioBuildOutput {
            date,
            capital,
            risk_free_rate: run.context.risk_free_rate,
            rate_hike_probability: run.context.rate_hike_probability,
            weights: optimized.weights,
            performance: optimized.performance,
            shrinkage: optimized.shrinkage,
            allocation,
            verification: VerificationBundle {
                diagnostics,
                returns,
                adjusted_prices,
                benchmark_prices,
            },
        };

        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata(
            "Growth-based expected returns with Ledoit-Wolf max-Sharpe allocation",
            &self.config,
            warnings,
            elapsed,
            output,
        ))
    }
}

/// Build the portfolio of `date` in one call.
pub fn build_portfolio(
    snapshot: &MarketSnapshot,
    date: NaiveDate,
    capital: Money,
    config: &BuildConfig,
) -> EngineResult<ComputationOutput<PortfolioBuildOutput>> {
    PortfolioBuilder::new(config.clone())?.build(snapshot, date, capital)
}
