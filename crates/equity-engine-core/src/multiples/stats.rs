use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::data::{Multiple, MultiplesObservation};

/// Net debt/EBITDA at or above this is reported as is.
const DEBT_NORMALIZATION_CAP: f64 = 10.0;

/// Spread below which a history is treated as flat.
const FLAT_STD: f64 = 1e-12;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Tuning of the truncated, time-weighted multiple statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultipleStatsParameters {
    /// Distance from the recent mean, in standard deviations, beyond which
    /// an old observation is discarded.
    pub outlier_std_devs: f64,
    /// Length of the recent window, in years.
    pub window_years: u32,
    /// Yearly decay of observation weights.
    pub decay: f64,
    /// Observations required before any statistic is emitted.
    pub min_observations: usize,
}

impl Default for MultipleStatsParameters {
    fn default() -> Self {
        Self {
            outlier_std_devs: 4.0,
            window_years: 5,
            decay: 0.85,
            min_observations: 252,
        }
    }
}

/// Weighted location and spread of a cleaned series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedStats {
    pub mean: f64,
    pub std: f64,
}

/// Statistics of one multiple at the latest date it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MultipleSnapshot {
    pub multiple: Multiple,
    pub date: NaiveDate,
    pub current: f64,
    pub mean: f64,
    pub std: f64,
    /// `(current - mean) / std`; `None` for a flat history.
    pub deviation: Option<f64>,
}

impl MultipleSnapshot {
    /// Mean less one standard deviation: a conservative level.
    pub fn one_std_floor(&self) -> f64 {
        self.mean - self.std
    }
}

/// All multiple statistics of one asset at one date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiplesStats {
    pub ev_sales: Option<MultipleSnapshot>,
    pub ev_ebitda: Option<MultipleSnapshot>,
    pub price_earnings: Option<MultipleSnapshot>,
    pub net_margin: Option<MultipleSnapshot>,
    pub ebitda_margin: Option<MultipleSnapshot>,
    pub net_debt_ebitda: Option<f64>,
    /// Net debt/EBITDA restated to a through-the-cycle EBITDA margin.
    pub normalized_net_debt_ebitda: Option<f64>,
}

impl MultiplesStats {
    pub fn get(&self, multiple: Multiple) -> Option<&MultipleSnapshot> {
        match multiple {
            Multiple::EvSales => self.ev_sales.as_ref(),
            Multiple::EvEbitda => self.ev_ebitda.as_ref(),
            Multiple::PriceEarnings => self.price_earnings.as_ref(),
            Multiple::NetMargin => self.net_margin.as_ref(),
            Multiple::EbitdaMargin => self.ebitda_margin.as_ref(),
        }
    }
}

// ---------------------------------------------------------------------------
// Estimator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct MultipleStatsEstimator {
    params: MultipleStatsParameters,
}

impl MultipleStatsEstimator {
    pub fn new(params: MultipleStatsParameters) -> Self {
        Self { params }
    }

    /// Statistics over `series`, which must already stop at the
    /// simulation date.
    pub fn evaluate(&self, series: &[MultiplesObservation]) -> MultiplesStats {
        let mut stats = MultiplesStats {
            ev_sales: self.snapshot(series, Multiple::EvSales),
            ev_ebitda: self.snapshot(series, Multiple::EvEbitda),
            price_earnings: self.snapshot(series, Multiple::PriceEarnings),
            net_margin: self.snapshot(series, Multiple::NetMargin),
            ebitda_margin: self.snapshot(series, Multiple::EbitdaMargin),
            net_debt_ebitda: series.iter().rev().find_map(|o| o.net_debt_ebitda),
            normalized_net_debt_ebitda: None,
        };
        stats.normalized_net_debt_ebitda = stats
            .net_debt_ebitda
            .map(|raw| normalize_net_debt_ebitda(raw, stats.ebitda_margin.as_ref()));
        stats
    }

    /// Statistics of one multiple, or `None` while the history is shorter
    /// than `min_observations`.
    pub fn snapshot(
        &self,
        series: &[MultiplesObservation],
        multiple: Multiple,
    ) -> Option<MultipleSnapshot> {
        let observed: Vec<(NaiveDate, f64)> = series
            .iter()
            .filter_map(|o| multiple.value(o).map(|v| (o.date, v)))
            .filter(|(_, v)| v.is_finite())
            .collect();
        let start = observed.iter().position(|(_, v)| *v != 0.0)?;
        let observed = &observed[start..];
        if observed.len() < self.params.min_observations {
            return None;
        }

        let stats = self.truncated_stats(observed)?;
        let &(date, current) = observed.last()?;
        let deviation = (stats.std > FLAT_STD).then(|| (current - stats.mean) / stats.std);
        Some(MultipleSnapshot {
            multiple,
            date,
            current,
            mean: stats.mean,
            std: stats.std,
            deviation,
        })
    }

    /// Time-weighted mean and population std after dropping old outliers.
    ///
    /// Outliers are judged against the plain mean/std of the recent window
    /// and are only discarded when they are older than that window.
    pub fn truncated_stats(&self, values: &[(NaiveDate, f64)]) -> Option<WeightedStats> {
        let &(last_date, _) = values.last()?;
        let window_start = last_date.checked_sub_months(Months::new(12 * self.params.window_years))?;

        let recent: Vec<f64> = values
            .iter()
            .filter(|(d, _)| *d > window_start)
            .map(|(_, v)| *v)
            .collect();
        let recent_mean = recent.iter().mean();
        let recent_std = recent.iter().std_dev();
        let band = self.params.outlier_std_devs * recent_std;

        let kept: Vec<(NaiveDate, f64)> = values
            .iter()
            .copied()
            .filter(|(d, v)| {
                let outlier = band.is_finite() && (v - recent_mean).abs() > band;
                !(outlier && *d < window_start)
            })
            .collect();

        weighted_stats(&kept, last_date, self.params.decay)
    }
}

/// Exponentially time-weighted mean and population std.
///
/// An observation `Δ` days before `as_of` weighs `decay^(Δ/365)`.
pub fn weighted_stats(
    values: &[(NaiveDate, f64)],
    as_of: NaiveDate,
    decay: f64,
) -> Option<WeightedStats> {
    if values.is_empty() {
        return None;
    }
    let weights: Vec<f64> = values
        .iter()
        .map(|(d, _)| decay.powf((as_of - *d).num_days() as f64 / 365.0))
        .collect();
    let total: f64 = weights.iter().sum();
    if total <= 0.0 || !total.is_finite() {
        return None;
    }
    let mean = values
        .iter()
        .zip(&weights)
        .map(|((_, v), w)| v * w)
        .sum::<f64>()
        / total;
    let var = values
        .iter()
        .zip(&weights)
        .map(|((_, v), w)| w * (v - mean).powi(2))
        .sum::<f64>()
        / total;
    Some(WeightedStats {
        mean,
        std: var.sqrt(),
    })
}

/// Restate leverage as if EBITDA margin were closer to its history.
fn normalize_net_debt_ebitda(raw: f64, ebitda_margin: Option<&MultipleSnapshot>) -> f64 {
    let Some(margin) = ebitda_margin else {
        return raw;
    };
    if raw >= DEBT_NORMALIZATION_CAP || margin.mean <= 0.0 {
        return raw;
    }
    let blended = 0.3 * margin.current + 0.7 * margin.mean;
    if blended <= 0.0 {
        return raw;
    }
    raw * margin.current / blended
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn obs(date: NaiveDate, margin: Option<f64>) -> MultiplesObservation {
        MultiplesObservation {
            date,
            close: 10.0,
            adjusted_close: 10.0,
            enterprise_value: None,
            ev_sales: None,
            ev_ebitda: None,
            price_earnings: None,
            net_margin: margin,
            ebitda_margin: margin,
            net_debt_ebitda: Some(2.0),
        }
    }

    fn daily(n: usize, f: impl Fn(usize) -> Option<f64>) -> Vec<MultiplesObservation> {
        let start = d(2015, 1, 1);
        (0..n)
            .map(|i| obs(start + Duration::days(i as i64), f(i)))
            .collect()
    }

    // -----------------------------------------------------------------------
    // 1. Weighted statistics
    // -----------------------------------------------------------------------
    #[test]
    fn test_weighted_stats_decay_favours_recent() {
        let vals = vec![(d(2020, 1, 1), 0.0), (d(2021, 1, 1), 1.0)];
        let s = weighted_stats(&vals, d(2021, 1, 1), 0.5).unwrap();
        // Weights 0.5^(366/365) and 1.
        let w0 = 0.5_f64.powf(366.0 / 365.0);
        assert!((s.mean - 1.0 / (1.0 + w0)).abs() < 1e-12);
        assert!(s.mean > 0.5);
    }

    #[test]
    fn test_constant_series_has_zero_std() {
        let vals: Vec<(NaiveDate, f64)> = (0..10)
            .map(|i| (d(2020, 1, 1) + Duration::days(i), 3.0))
            .collect();
        let s = weighted_stats(&vals, d(2020, 1, 10), 0.85).unwrap();
        assert!((s.mean - 3.0).abs() < 1e-12);
        assert!(s.std.abs() < 1e-12);
    }

    // -----------------------------------------------------------------------
    // 2. Outliers are only dropped outside the recent window
    // -----------------------------------------------------------------------
    #[test]
    fn test_old_outlier_dropped_recent_outlier_kept() {
        let est = MultipleStatsEstimator::default();
        let base: Vec<(NaiveDate, f64)> = (0..3000)
            .map(|i| {
                let v = 1.0 + 0.01 * ((i % 7) as f64);
                (d(2012, 1, 1) + Duration::days(i), v)
            })
            .collect();
        let mut without_tenth = base.clone();
        without_tenth.remove(10);
        let clean = est.truncated_stats(&without_tenth).unwrap();

        let mut with_old = base.clone();
        with_old[10].1 = 500.0;
        let old = est.truncated_stats(&with_old).unwrap();
        assert!((old.mean - clean.mean).abs() < 1e-9, "old outlier should be dropped");

        let mut with_recent = base.clone();
        let last = with_recent.len() - 1;
        with_recent[last].1 = 500.0;
        let recent = est.truncated_stats(&with_recent).unwrap();
        assert!(recent.mean > clean.mean + 0.1, "recent outlier should be kept");
    }

    // -----------------------------------------------------------------------
    // 3. Minimum history and leading zeros
    // -----------------------------------------------------------------------
    #[test]
    fn test_snapshot_requires_min_observations() {
        let est = MultipleStatsEstimator::default();
        let short = daily(251, |_| Some(0.1));
        assert!(est.snapshot(&short, Multiple::NetMargin).is_none());
        let long = daily(252, |_| Some(0.1));
        assert!(est.snapshot(&long, Multiple::NetMargin).is_some());
    }

    #[test]
    fn test_leading_zeros_do_not_count_as_history() {
        let est = MultipleStatsEstimator::default();
        let series = daily(300, |i| if i < 100 { Some(0.0) } else { Some(0.1) });
        assert!(est.snapshot(&series, Multiple::NetMargin).is_none());
    }

    #[test]
    fn test_deviation_sign_follows_current_value() {
        let est = MultipleStatsEstimator::default();
        let series = daily(600, |i| Some(0.10 + 0.01 * ((i % 5) as f64)));
        let mut high = series.clone();
        high.last_mut().unwrap().net_margin = Some(0.20);
        let snap = est.snapshot(&high, Multiple::NetMargin).unwrap();
        assert!(snap.deviation.unwrap() > 0.0);
        assert_eq!(snap.current, 0.20);
        assert!(snap.one_std_floor() < snap.mean);
    }

    #[test]
    fn test_flat_history_has_no_deviation() {
        let est = MultipleStatsEstimator::default();
        let series = daily(300, |_| Some(0.1));
        let snap = est.snapshot(&series, Multiple::NetMargin).unwrap();
        assert!(snap.deviation.is_none());
    }

    // -----------------------------------------------------------------------
    // 4. Net debt/EBITDA normalization
    // -----------------------------------------------------------------------
    #[test]
    fn test_normalized_leverage_scales_with_margin_gap() {
        let margin = MultipleSnapshot {
            multiple: Multiple::EbitdaMargin,
            date: d(2020, 1, 1),
            current: 0.10,
            mean: 0.20,
            std: 0.02,
            deviation: Some(-5.0),
        };
        let n = normalize_net_debt_ebitda(3.0, Some(&margin));
        assert!((n - 3.0 * 0.10 / (0.03 + 0.14)).abs() < 1e-12);
        assert_eq!(normalize_net_debt_ebitda(12.0, Some(&margin)), 12.0);
        assert_eq!(normalize_net_debt_ebitda(3.0, None), 3.0);
    }

    #[test]
    fn test_evaluate_fills_leverage_from_latest_value() {
        let est = MultipleStatsEstimator::default();
        let mut series = daily(300, |_| Some(0.1));
        series.last_mut().unwrap().net_debt_ebitda = None;
        let stats = est.evaluate(&series);
        assert_eq!(stats.net_debt_ebitda, Some(2.0));
        assert!(stats.net_margin.is_some());
        assert!(stats.ev_sales.is_none());
        // Flat margin: current equals mean, no restatement.
        assert!((stats.normalized_net_debt_ebitda.unwrap() - 2.0).abs() < 1e-12);
    }
}
