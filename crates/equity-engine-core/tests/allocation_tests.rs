// =====================================================================
// Whole-share allocation
// =====================================================================

use chrono::NaiveDate;
use equity_engine_core::allocation::DiscreteAllocator;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 2, 20).unwrap()
}

fn map<T: Copy>(pairs: &[(&str, T)]) -> BTreeMap<String, T> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

// -----------------------------------------------------------------------
// 1. Weights become whole shares
// -----------------------------------------------------------------------

#[test]
fn test_weights_become_whole_shares() {
    let weights = map(&[("AAA", 0.6), ("BBB", 0.4)]);
    let prices = map(&[("AAA", 30.0), ("BBB", 45.0)]);
    let result = DiscreteAllocator
        .allocate(date(), &weights, &prices, dec!(100000))
        .unwrap();

    assert_eq!(result.shares["AAA"], 2001);
    assert_eq!(result.shares["BBB"], 888);
    assert_eq!(result.positions["AAA"], dec!(60030));
    assert_eq!(result.positions["BBB"], dec!(39960));
    assert_eq!(result.leftover, dec!(10));
    assert!(result.leftover < dec!(45));
    assert_eq!(result.total, dec!(100000));
}

// -----------------------------------------------------------------------
// 2. Conservation across many price levels
// -----------------------------------------------------------------------

#[test]
fn test_total_always_matches_capital() {
    let weights = map(&[("AAA", 0.1), ("BBB", 0.1), ("CCC", 0.08), ("LFTS3", 0.72)]);
    for (i, capital) in [dec!(1000), dec!(12345.67), dec!(500000)].into_iter().enumerate() {
        let bump = i as f64 * 0.37;
        let prices = map(&[
            ("AAA", 17.31 + bump),
            ("BBB", 42.9 + bump),
            ("CCC", 8.05 + bump),
            ("LFTS3", 14.2271 + bump),
        ]);
        let result = DiscreteAllocator
            .allocate(date(), &weights, &prices, capital)
            .unwrap();
        let tolerance = Decimal::from(result.positions.len() as u64) * dec!(0.01);
        assert!(
            (result.total - capital).abs() <= tolerance,
            "total {} vs capital {}",
            result.total,
            capital
        );
        assert!(result.leftover >= Decimal::ZERO);
        assert_eq!(result.total, result.invested() + result.leftover);
        let cheapest = result.prices.values().copied().min().unwrap();
        assert!(result.leftover < cheapest, "{} left with shares at {}", result.leftover, cheapest);
    }
}

#[test]
fn test_spare_cash_buys_shares_when_weights_are_met() {
    let weights = map(&[("AAAA3", 0.5), ("BBBB3", 0.5)]);
    let prices = map(&[("AAAA3", 10.0), ("BBBB3", 10.0)]);
    let result = DiscreteAllocator
        .allocate(date(), &weights, &prices, dec!(39.99))
        .unwrap();
    assert_eq!(result.shares.values().sum::<u64>(), 3);
    assert!(result.leftover < dec!(10));
    assert_eq!(result.total, dec!(39.99));
}

#[test]
fn test_zero_weights_are_not_held() {
    let weights = map(&[("AAA", 0.5), ("BBB", 0.5), ("CCC", 0.0)]);
    let prices = map(&[("AAA", 10.0), ("BBB", 20.0), ("CCC", 5.0)]);
    let result = DiscreteAllocator
        .allocate(date(), &weights, &prices, dec!(1000))
        .unwrap();
    assert!(!result.shares.contains_key("CCC"));
    assert_eq!(result.shares.len(), 2);
}
