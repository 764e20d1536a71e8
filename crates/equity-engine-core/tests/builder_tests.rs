// =====================================================================
// End-to-end portfolio construction
// =====================================================================

mod common;

use common::*;
use equity_engine_core::builder::{build_portfolio, PortfolioBuilder};
use equity_engine_core::config::BuildConfig;
use equity_engine_core::EngineError;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const TOL: f64 = 1e-3;

// -----------------------------------------------------------------------
// 1. Constraints hold on the built portfolio
// -----------------------------------------------------------------------

#[test]
fn test_build_respects_weight_constraints() {
    let snap = snapshot();
    let out = build_portfolio(&snap, build_date(), dec!(100000), &BuildConfig::default()).unwrap();
    let weights = &out.result.weights;

    let total: f64 = weights.values().sum();
    assert!((total - 1.0).abs() < TOL, "weights sum to {}", total);
    assert!(weights.values().all(|w| *w >= 0.0));

    for (ticker, w) in weights {
        if ticker != "LFTS3" {
            assert!(*w <= 0.10 + TOL, "{} over the asset cap: {}", ticker, w);
        }
    }
    let energy = weights.get("ENGI4").copied().unwrap_or(0.0)
        + weights.get("TAEE11").copied().unwrap_or(0.0);
    assert!(energy <= 0.20 + TOL, "energy sector at {}", energy);
    assert!(weights["LFTS3"] >= 0.20 - TOL);
}

#[test]
fn test_build_filters_the_universe() {
    let snap = snapshot();
    let out = build_portfolio(&snap, build_date(), dec!(100000), &BuildConfig::default()).unwrap();
    let weights = &out.result.weights;

    // Share classes collapse to the best one.
    assert!(weights.contains_key("ENGI4"));
    assert!(!weights.contains_key("ENGI3"));
    // Below the risk-free rate.
    assert!(!weights.contains_key("WEAK3"));
    // Outside the index composition.
    assert!(!weights.contains_key("VALE3"));
    assert_eq!(weights.len(), 6);
    assert_eq!(out.result.risk_free_rate, 0.10);
}

// -----------------------------------------------------------------------
// 2. Allocation conserves capital
// -----------------------------------------------------------------------

#[test]
fn test_allocation_conserves_capital() {
    let snap = snapshot();
    let capital = dec!(250000);
    let out = build_portfolio(&snap, build_date(), capital, &BuildConfig::default()).unwrap();
    let alloc = &out.result.allocation;

    let tolerance = Decimal::from(alloc.positions.len() as u64) * dec!(0.01);
    assert!((alloc.total - capital).abs() <= tolerance);
    assert_eq!(alloc.total, alloc.invested() + alloc.leftover);
    assert!(alloc.leftover >= Decimal::ZERO);
    assert_eq!(alloc.date, build_date());
    for (ticker, shares) in &alloc.shares {
        let money = alloc.positions[ticker];
        let price = alloc.prices[ticker];
        assert!((Decimal::from(*shares) * price - money).abs() <= dec!(0.005));
    }
}

// -----------------------------------------------------------------------
// 3. Verification tables
// -----------------------------------------------------------------------

#[test]
fn test_verification_tables_carry_benchmarks() {
    let snap = snapshot();
    let out = build_portfolio(&snap, build_date(), dec!(100000), &BuildConfig::default()).unwrap();
    let v = &out.result.verification;

    assert!(v.adjusted_prices.column_index("ENGI3").is_some());
    assert!(v.adjusted_prices.column_index("WEAK3").is_some());
    assert!(v.adjusted_prices.column_index("LFTS3").is_none());
    assert!(v.benchmark_prices.column_index("LFTS3").is_some());
    assert!(v.benchmark_prices.column_index("IBOV").is_some());
    assert_eq!(v.diagnostics.len(), 7);
    assert_eq!(v.returns.len(), 7);
    assert_eq!(v.returns[0].ticker, "PETR4");
}

#[test]
fn test_build_is_deterministic() {
    let snap = snapshot();
    let builder = PortfolioBuilder::new(BuildConfig::default()).unwrap();
    let a = builder.build(&snap, build_date(), dec!(100000)).unwrap();
    let b = builder.build(&snap, build_date(), dec!(100000)).unwrap();
    assert_eq!(a.result.weights, b.result.weights);
    assert_eq!(a.result.allocation, b.result.allocation);
}

// -----------------------------------------------------------------------
// 4. Failures
// -----------------------------------------------------------------------

#[test]
fn test_zero_capital_is_rejected() {
    let snap = snapshot();
    let err = build_portfolio(&snap, build_date(), Decimal::ZERO, &BuildConfig::default()).unwrap_err();
    match err {
        EngineError::InvalidInput { field, .. } => assert_eq!(field, "capital"),
        other => panic!("Expected InvalidInput, got {:?}", other),
    }
}

#[test]
fn test_high_rates_leave_nothing_to_allocate() {
    let snap = snapshot_with_rate(50.0);
    let err = build_portfolio(&snap, build_date(), dec!(100000), &BuildConfig::default()).unwrap_err();
    match err {
        EngineError::AllocationFailed { date, capital, .. } => {
            assert_eq!(date, build_date());
            assert_eq!(capital, dec!(100000));
        }
        other => panic!("Expected AllocationFailed, got {:?}", other),
    }
}

#[test]
fn test_missing_rate_outlook_is_insufficient_data() {
    let mut snap = snapshot();
    snap.rate_outlook = Default::default();
    let err = build_portfolio(&snap, build_date(), dec!(100000), &BuildConfig::default()).unwrap_err();
    assert!(matches!(err, EngineError::InsufficientData(_)));
}

#[test]
fn test_invalid_config_is_rejected_up_front() {
    let config = BuildConfig {
        max_per_asset: 1.5,
        ..BuildConfig::default()
    };
    assert!(PortfolioBuilder::new(config).is_err());
}
