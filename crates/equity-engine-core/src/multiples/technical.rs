//! Price-derived indicators: moving-average trend score and return windows.

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::data::MultiplesObservation;

pub const TRADING_DAYS_PER_MONTH: usize = 21;

/// Moving-average lengths, in months, compared pairwise by the trend score.
pub const BULLISH_WINDOWS_MONTHS: [usize; 8] = [1, 3, 6, 9, 12, 18, 24, 36];

/// Return horizons, in months, longest first.
pub const RETURN_HORIZONS_MONTHS: [usize; 6] = [72, 36, 12, 6, 3, 1];

const MA_RELATIVE_EPS: f64 = 1e-12;

/// Annualized price returns around one date.
///
/// `forward` windows look past the date and are only meaningful to
/// consumers validating signals after the fact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ReturnWindows {
    pub trailing: [Option<f64>; 6],
    pub forward: [Option<f64>; 6],
}

/// Trend indicators of an asset at the last date of its price history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TechnicalSnapshot {
    pub date: NaiveDate,
    /// Share of moving-average pairs where the shorter average is above
    /// the longer one.
    pub bullish_score: f64,
    /// Time-decayed mean of the score over the whole history.
    pub bullish_mean: Option<f64>,
    pub trailing_returns: [Option<f64>; 6],
}

/// Trend score at every index of `prices`.
///
/// Averages use up to `21 × months` trailing points, fewer at the start of
/// the history.
pub fn bullish_scores(prices: &[f64]) -> Vec<f64> {
    let mut prefix = Vec::with_capacity(prices.len() + 1);
    prefix.push(0.0);
    for p in prices {
        let last = prefix.last().copied().unwrap_or(0.0);
        prefix.push(last + p);
    }

    let n_windows = BULLISH_WINDOWS_MONTHS.len();
    let pairs = (n_windows * (n_windows - 1) / 2) as f64;
    let mut averages = [0.0; 8];

    (0..prices.len())
        .map(|t| {
            for (slot, months) in BULLISH_WINDOWS_MONTHS.iter().enumerate() {
                let len = (months * TRADING_DAYS_PER_MONTH).min(t + 1);
                averages[slot] = (prefix[t + 1] - prefix[t + 1 - len]) / len as f64;
            }
            let mut above = 0usize;
            for i in 0..n_windows {
                for j in (i + 1)..n_windows {
                    let tol = MA_RELATIVE_EPS * averages[j].abs().max(1.0);
                    if averages[i] > averages[j] + tol {
                        above += 1;
                    }
                }
            }
            above as f64 / pairs
        })
        .collect()
}

/// Mean of `values` weighted by `decay^(Δdays/365)` from the last date.
/// Needs at least two points.
pub fn decayed_mean(values: &[(NaiveDate, f64)], decay: f64) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let &(as_of, _) = values.last()?;
    let (mut num, mut den) = (0.0, 0.0);
    for (date, v) in values {
        let w = decay.powf((as_of - *date).num_days() as f64 / 365.0);
        num += w * v;
        den += w;
    }
    (den > 0.0).then(|| num / den)
}

/// Annualized returns over each horizon ending and starting at `index`.
pub fn return_windows(prices: &[f64], index: usize) -> ReturnWindows {
    let mut windows = ReturnWindows::default();
    let Some(&here) = prices.get(index) else {
        return windows;
    };
    for (slot, months) in RETURN_HORIZONS_MONTHS.iter().enumerate() {
        let shift = months * TRADING_DAYS_PER_MONTH;
        let exponent = 12.0 / *months as f64;
        windows.trailing[slot] = index
            .checked_sub(shift)
            .and_then(|i| prices.get(i))
            .and_then(|&past| annualize(here, past, exponent));
        windows.forward[slot] = prices
            .get(index + shift)
            .and_then(|&future| annualize(future, here, exponent));
    }
    windows
}

fn annualize(end: f64, start: f64, exponent: f64) -> Option<f64> {
    if start <= 0.0 || end <= 0.0 {
        return None;
    }
    let r = (end / start).powf(exponent) - 1.0;
    r.is_finite().then_some(r)
}

/// Trend score, its decayed mean and trailing returns at the last point of
/// `series`.
pub fn technical_snapshot(series: &[MultiplesObservation], decay: f64) -> Option<TechnicalSnapshot> {
    let last = series.last()?;
    let prices: Vec<f64> = series.iter().map(|o| o.adjusted_close).collect();
    let scores = bullish_scores(&prices);
    let dated: Vec<(NaiveDate, f64)> = series
        .iter()
        .zip(&scores)
        .map(|(o, s)| (o.date, *s))
        .collect();
    Some(TechnicalSnapshot {
        date: last.date,
        bullish_score: *scores.last()?,
        bullish_mean: decayed_mean(&dated, decay),
        trailing_returns: return_windows(&prices, prices.len() - 1).trailing,
    })
}

/// Mean equivalent close over the `months` before the last observation.
pub fn trailing_mean_close(series: &[MultiplesObservation], months: u32) -> Option<f64> {
    let last = series.last()?;
    let cutoff = last.date.checked_sub_months(Months::new(months))?;
    let closes: Vec<f64> = series
        .iter()
        .filter(|o| o.date >= cutoff && o.close.is_finite())
        .map(|o| o.close)
        .collect();
    if closes.is_empty() {
        return None;
    }
    Some(closes.iter().sum::<f64>() / closes.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_rising_prices_score_one() {
        let prices: Vec<f64> = (0..1000).map(|i| 10.0 + i as f64 * 0.01).collect();
        let scores = bullish_scores(&prices);
        assert!((scores[999] - 1.0).abs() < 1e-12);
        // First point: every average equals the price.
        assert_eq!(scores[0], 0.0);
    }

    #[test]
    fn test_falling_prices_score_zero() {
        let prices: Vec<f64> = (0..1000).map(|i| 50.0 - i as f64 * 0.01).collect();
        let scores = bullish_scores(&prices);
        assert_eq!(scores[999], 0.0);
    }

    #[test]
    fn test_flat_prices_score_zero() {
        let prices = vec![7.3; 900];
        assert!(bullish_scores(&prices).iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_decayed_mean_needs_two_points() {
        assert!(decayed_mean(&[(d(2020, 1, 1), 1.0)], 0.8).is_none());
        let m = decayed_mean(&[(d(2020, 1, 1), 0.0), (d(2020, 1, 1), 1.0)], 0.8).unwrap();
        assert!((m - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_return_windows_annualize() {
        // 10% per 21 days.
        let prices: Vec<f64> = (0..100).map(|i| 1.1_f64.powf(i as f64 / 21.0)).collect();
        let w = return_windows(&prices, 42);
        let one_month = w.trailing[5].unwrap();
        assert!((one_month - (1.1_f64.powi(12) - 1.0)).abs() < 1e-9);
        assert!(w.trailing[4].is_none(), "3m window needs 63 points of history");
        let fwd = w.forward[5].unwrap();
        assert!((fwd - one_month).abs() < 1e-9);
        assert!(w.forward[4].is_none());
    }

    #[test]
    fn test_trailing_mean_close_window() {
        let start = d(2020, 1, 1);
        let series: Vec<MultiplesObservation> = (0..800)
            .map(|i| MultiplesObservation {
                date: start + Duration::days(i),
                close: if i < 400 { 1.0 } else { 3.0 },
                adjusted_close: 1.0,
                enterprise_value: None,
                ev_sales: None,
                ev_ebitda: None,
                price_earnings: None,
                net_margin: None,
                ebitda_margin: None,
                net_debt_ebitda: None,
            })
            .collect();
        let m = trailing_mean_close(&series, 6).unwrap();
        assert!((m - 3.0).abs() < 1e-12);
        let snap = technical_snapshot(&series, 0.8).unwrap();
        assert_eq!(snap.date, start + Duration::days(799));
        assert_eq!(snap.bullish_score, 0.0);
    }
}
