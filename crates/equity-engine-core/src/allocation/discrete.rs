use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::EngineError;
use crate::types::{Money, Weight};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Whole-share holdings bought with a fixed amount of capital.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub date: NaiveDate,
    /// Amount invested per ticker, rounded to cents.
    pub positions: BTreeMap<String, Money>,
    pub shares: BTreeMap<String, u64>,
    /// Prices the shares were bought at.
    pub prices: BTreeMap<String, Money>,
    pub leftover: Money,
    /// Sum of positions plus leftover.
    pub total: Money,
}

impl AllocationResult {
    pub fn invested(&self) -> Money {
        self.positions.values().copied().sum()
    }
}

struct Target {
    ticker: String,
    weight: Decimal,
    price: Decimal,
    shares: u64,
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

/// Greedy conversion of continuous weights into share counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscreteAllocator;

impl DiscreteAllocator {
    pub fn allocate(
        &self,
        date: NaiveDate,
        weights: &BTreeMap<String, Weight>,
        prices: &BTreeMap<String, f64>,
        capital: Money,
    ) -> EngineResult<AllocationResult> {
        let mut targets = targets(weights, prices, capital)?;
        let mut available = capital;

        // Round one: as many whole shares as each weight affords.
        for t in targets.iter_mut() {
            let budget = (t.weight * capital).min(available);
            let n = (budget / t.price).floor().to_u64().unwrap_or(0);
            t.shares = n;
            available -= Decimal::from(n) * t.price;
        }

        // Round two: one share at a time to the affordable asset furthest below
        // its weight. Once every affordable asset is at or above target the
        // least overweight one is topped up, so the loop only stops when no
        // share fits in the remaining cash.
        let mut extra = 0u32;
        loop {
            let held: Decimal = targets.iter().map(|t| t.value()).sum();
            let pick = targets
                .iter()
                .enumerate()
                .filter(|(_, t)| t.price <= available)
                .map(|(i, t)| {
                    let current = if held.is_zero() {
                        Decimal::ZERO
                    } else {
                        t.value() / held
                    };
                    (i, t.weight - current)
                })
                .fold(None, |best: Option<(usize, Decimal)>, (i, d)| match best {
                    Some((_, bd)) if bd >= d => best,
                    _ => Some((i, d)),
                });
            let Some((i, _)) = pick else { break };
            targets[i].shares += 1;
            available -= targets[i].price;
            extra += 1;
        }
        debug!(extra_shares = extra, leftover = %available, "greedy allocation");

        let mut positions = BTreeMap::new();
        let mut shares = BTreeMap::new();
        let mut bought_at = BTreeMap::new();
        for t in &targets {
            if t.shares == 0 {
                continue;
            }
            positions.insert(t.ticker.clone(), t.value().round_dp(2));
            shares.insert(t.ticker.clone(), t.shares);
            bought_at.insert(t.ticker.clone(), t.price);
        }
        let total = positions.values().copied().sum::<Decimal>() + available;

        Ok(AllocationResult {
            date,
            positions,
            shares,
            prices: bought_at,
            leftover: available,
            total,
        })
    }
}

impl Target {
    fn value(&self) -> Decimal {
        Decimal::from(self.shares) * self.price
    }
}

/// Positive weights renormalized to one, in descending weight order.
fn targets(
    weights: &BTreeMap<String, Weight>,
    prices: &BTreeMap<String, f64>,
    capital: Money,
) -> EngineResult<Vec<Target>> {
    if capital <= Decimal::ZERO {
        return Err(EngineError::InvalidInput {
            field: "capital".into(),
            reason: "Capital must be positive".into(),
        });
    }
    let positive: Vec<(&String, f64)> = weights
        .iter()
        .filter(|(_, w)| **w > 0.0)
        .map(|(t, w)| (t, *w))
        .collect();
    let sum: f64 = positive.iter().map(|(_, w)| w).sum();
    if positive.is_empty() || !sum.is_finite() {
        return Err(EngineError::InsufficientData(
            "no positive weight to allocate".into(),
        ));
    }

    let mut out = Vec::with_capacity(positive.len());
    for (ticker, w) in positive {
        let price = prices.get(ticker).copied().ok_or_else(|| EngineError::InvalidInput {
            field: "prices".into(),
            reason: format!("No price for {}", ticker),
        })?;
        let price = to_money(price, "prices")?;
        if price <= Decimal::ZERO {
            return Err(EngineError::InvalidInput {
                field: "prices".into(),
                reason: format!("Non-positive price for {}", ticker),
            });
        }
        out.push(Target {
            ticker: ticker.clone(),
            weight: to_money(w / sum, "weights")?,
            price,
            shares: 0,
        });
    }
    out.sort_by(|a, b| b.weight.cmp(&a.weight));
    Ok(out)
}

/// Convert a float amount into `Money`.
pub fn to_money(value: f64, field: &str) -> EngineResult<Money> {
    Decimal::try_from(value).map_err(|e| EngineError::InvalidInput {
        field: field.into(),
        reason: format!("{} is not representable: {}", value, e),
    })
}
