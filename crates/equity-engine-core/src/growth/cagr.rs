use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::data::FundamentalsRecord;
use crate::series::Dated;

/// `min` value marking an overdue balance sheet.
pub const DELAY_SENTINEL: f64 = -1.0;

/// Points required in the trailing two years before a fit is attempted.
const MIN_RECENT_POINTS: usize = 9;

/// Quarterly cadence: a full `y`-year window holds `4y + 1` points.
const POINTS_PER_YEAR: f64 = 4.0;

const TEMPO_EPS: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Fundamental line a growth record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthLine {
    Revenue,
    Ebitda,
    NetIncome,
    Dividends,
    /// Sector-weighted blend of revenue, EBITDA and net income.
    Blended,
}

impl GrowthLine {
    pub fn value(&self, record: &FundamentalsRecord) -> Option<f64> {
        match self {
            GrowthLine::Revenue => Some(record.revenue),
            GrowthLine::Ebitda => Some(record.ebitda),
            GrowthLine::NetIncome => Some(record.net_income),
            GrowthLine::Dividends => Some(record.dividends.m12),
            GrowthLine::Blended => None,
        }
    }
}

/// Growth rates over the four trailing horizons.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CagrHorizons {
    pub y8: f64,
    pub y6: f64,
    pub y4: f64,
    pub y2: f64,
}

impl CagrHorizons {
    pub const ZERO: CagrHorizons = CagrHorizons {
        y8: 0.0,
        y6: 0.0,
        y4: 0.0,
        y2: 0.0,
    };

    pub fn min(&self) -> f64 {
        self.y8.min(self.y6).min(self.y4).min(self.y2)
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.y8, self.y6, self.y4, self.y2]
    }

    pub fn ordering(&self) -> GrowthOrdering {
        let h = self.as_array();
        if h.windows(2).all(|w| w[0] <= w[1]) {
            GrowthOrdering::Accelerating
        } else if h.windows(2).all(|w| w[0] >= w[1]) {
            GrowthOrdering::Decelerating
        } else {
            GrowthOrdering::Mixed
        }
    }

    /// Weighted sum of several horizon sets.
    pub fn blend(parts: &[(f64, CagrHorizons)]) -> CagrHorizons {
        parts
            .iter()
            .fold(CagrHorizons::ZERO, |acc, (w, h)| CagrHorizons {
                y8: acc.y8 + w * h.y8,
                y6: acc.y6 + w * h.y6,
                y4: acc.y4 + w * h.y4,
                y2: acc.y2 + w * h.y2,
            })
    }
}

/// Shape of the horizon curve.
///
/// Accelerating means the short horizons grow fastest (8 ≤ 6 ≤ 4 ≤ 2).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthOrdering {
    Accelerating,
    #[default]
    Mixed,
    Decelerating,
}

/// Result of one regression pass over a window of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CagrEstimate {
    pub horizons: CagrHorizons,
    pub min: f64,
    pub last_value: f64,
    pub forecast: f64,
    pub forecast_min: f64,
}

impl CagrEstimate {
    pub(crate) fn inestimable(last_value: f64) -> Self {
        CagrEstimate {
            horizons: CagrHorizons::ZERO,
            min: 0.0,
            last_value,
            forecast: last_value,
            forecast_min: last_value,
        }
    }
}

/// Growth of one line as visible from `visible_from`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CagrRecord {
    pub line: GrowthLine,
    pub period_end: NaiveDate,
    pub visible_from: NaiveDate,
    pub horizons: CagrHorizons,
    pub min: f64,
    #[serde(default)]
    pub ordering: GrowthOrdering,
    #[serde(default)]
    pub last_value: f64,
    #[serde(default)]
    pub forecast: f64,
    #[serde(default)]
    pub forecast_min: f64,
}

impl Dated for CagrRecord {
    fn date(&self) -> NaiveDate {
        self.visible_from
    }
}

impl CagrRecord {
    pub fn from_estimate(
        line: GrowthLine,
        period_end: NaiveDate,
        visible_from: NaiveDate,
        estimate: &CagrEstimate,
    ) -> Self {
        CagrRecord {
            line,
            period_end,
            visible_from,
            horizons: estimate.horizons,
            min: estimate.min,
            ordering: GrowthOrdering::Mixed,
            last_value: estimate.last_value,
            forecast: estimate.forecast,
            forecast_min: estimate.forecast_min,
        }
    }

    /// Revenue row flagging a balance sheet that is overdue on `visible_from`.
    pub fn delay_marker(period_end: NaiveDate, visible_from: NaiveDate) -> Self {
        CagrRecord {
            line: GrowthLine::Revenue,
            period_end,
            visible_from,
            horizons: CagrHorizons::ZERO,
            min: DELAY_SENTINEL,
            ordering: GrowthOrdering::Mixed,
            last_value: 0.0,
            forecast: 0.0,
            forecast_min: 0.0,
        }
    }

    pub fn is_delay_marker(&self) -> bool {
        self.min == DELAY_SENTINEL
    }
}

// ---------------------------------------------------------------------------
// Estimation
// ---------------------------------------------------------------------------

/// Continuous time coordinate: year plus month/12.
pub fn tempo(date: NaiveDate) -> f64 {
    date.year() as f64 + date.month() as f64 / 12.0
}

/// Log-linear growth over the 8/6/4/2-year sub-windows of `points`.
///
/// `points` are `(tempo, value)` pairs in ascending order covering at most
/// eight years. Any degenerate fit yields all-zero horizons.
pub fn estimate_cagr(points: &[(f64, f64)]) -> CagrEstimate {
    let Some(&(t_last, last_value)) = points.last() else {
        return CagrEstimate::inestimable(0.0);
    };

    // Log growth is undefined until the line turns positive. An entirely
    // non-positive line is kept whole and handled by the shift below.
    let start = points.iter().position(|&(_, v)| v > 0.0).unwrap_or(0);
    let window = &points[start..];

    let recent = window
        .iter()
        .filter(|(t, _)| *t >= t_last - 2.0 - TEMPO_EPS)
        .count();
    if recent < MIN_RECENT_POINTS {
        return CagrEstimate::inestimable(last_value);
    }

    let shift = match positivity_shift(window) {
        Some(s) => s,
        None => return CagrEstimate::inestimable(last_value),
    };

    let logs: Vec<(f64, f64)> = window.iter().map(|&(t, v)| (t, (v + shift).ln())).collect();

    let mut rates = [0.0; 4];
    for (slot, years) in [8.0_f64, 6.0, 4.0, 2.0].iter().enumerate() {
        let sub: Vec<(f64, f64)> = logs
            .iter()
            .copied()
            .filter(|(t, _)| *t >= t_last - years - TEMPO_EPS)
            .collect();
        let Some(slope) = ols_slope(&sub) else {
            return CagrEstimate::inestimable(last_value);
        };
        let credibility = sub.len() as f64 / (years * POINTS_PER_YEAR + 1.0);
        rates[slot] = (slope * credibility * credibility).exp() - 1.0;
    }

    let horizons = CagrHorizons {
        y8: rates[0],
        y6: rates[1],
        y4: rates[2],
        y2: rates[3],
    };
    let min = horizons.min();
    CagrEstimate {
        horizons,
        min,
        last_value,
        forecast: last_value * (1.0 + horizons.y8),
        forecast_min: last_value * (1.0 + min),
    }
}

/// Offset making every value strictly positive while keeping the trend.
///
/// Zero when the window is already positive; `None` for an all-zero window.
/// A zero minimum is shifted too, since its logarithm is undefined.
fn positivity_shift(window: &[(f64, f64)]) -> Option<f64> {
    let n = window.len() as f64;
    let (mut min, mut max, mut sum) = (f64::INFINITY, f64::NEG_INFINITY, 0.0);
    for &(_, v) in window {
        min = min.min(v);
        max = max.max(v);
        sum += v;
    }
    if min > 0.0 {
        return Some(0.0);
    }
    let scale = if max > 0.0 { max } else { min.abs() };
    if scale == 0.0 {
        return None;
    }
    let mean = sum / n;
    let cushion = (mean / 2.0).clamp(scale / 20.0, scale / 5.0);
    Some(-min + cushion)
}

/// Least-squares slope of `y` against `t`.
fn ols_slope(points: &[(f64, f64)]) -> Option<f64> {
    if points.len() < 2 {
        return None;
    }
    let n = points.len() as f64;
    let mean_t = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var = 0.0;
    for &(t, y) in points {
        cov += (t - mean_t) * (y - mean_y);
        var += (t - mean_t) * (t - mean_t);
    }
    if var <= 0.0 {
        return None;
    }
    let slope = cov / var;
    slope.is_finite().then_some(slope)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Quarterly points ending at `end_year` (December), value from `f(i)`.
    fn quarterly(n: usize, end_year: i32, f: impl Fn(usize) -> f64) -> Vec<(f64, f64)> {
        let last = end_year as f64 + 1.0;
        (0..n)
            .map(|i| {
                let t = last - (n - 1 - i) as f64 * 0.25;
                (t, f(i))
            })
            .collect()
    }

    // -----------------------------------------------------------------------
    // 1. Exponential growth is recovered on every horizon
    // -----------------------------------------------------------------------
    #[test]
    fn test_recovers_constant_growth() {
        let pts = quarterly(33, 2023, |i| 100.0 * 1.10_f64.powf(i as f64 * 0.25));
        let est = estimate_cagr(&pts);
        for c in est.horizons.as_array() {
            assert!((c - 0.10).abs() < 1e-9, "expected 10% growth, got {}", c);
        }
        assert!((est.min - 0.10).abs() < 1e-9);
        let last = pts.last().unwrap().1;
        assert!((est.forecast - last * 1.10).abs() < 1e-6);
    }

    // -----------------------------------------------------------------------
    // 2. Too few recent points means zero growth, not an error
    // -----------------------------------------------------------------------
    #[test]
    fn test_sparse_recent_window_is_inestimable() {
        let pts = quarterly(8, 2023, |i| 100.0 + i as f64);
        let est = estimate_cagr(&pts);
        assert_eq!(est.horizons, CagrHorizons::ZERO);
        assert_eq!(est.min, 0.0);
        assert_eq!(est.last_value, 107.0);
    }

    #[test]
    fn test_empty_points_are_inestimable() {
        let est = estimate_cagr(&[]);
        assert_eq!(est.horizons, CagrHorizons::ZERO);
    }

    // -----------------------------------------------------------------------
    // 3. All-negative line approaching zero grows
    // -----------------------------------------------------------------------
    #[test]
    fn test_negative_series_rising_toward_zero_has_positive_growth() {
        let pts = quarterly(33, 2023, |i| -200.0 + 6.0 * i as f64);
        assert!(pts.iter().all(|p| p.1 < 0.0));
        let est = estimate_cagr(&pts);
        for c in est.horizons.as_array() {
            assert!(c > 0.0, "shifted CAGR should be positive, got {}", c);
        }
    }

    #[test]
    fn test_negative_series_falling_has_negative_growth() {
        let pts = quarterly(33, 2023, |i| -8.0 - 6.0 * i as f64);
        let est = estimate_cagr(&pts);
        assert!(est.horizons.y8 < 0.0);
    }

    // -----------------------------------------------------------------------
    // 4. Leading non-positive points are ignored
    // -----------------------------------------------------------------------
    #[test]
    fn test_zero_minimum_is_shifted() {
        assert_eq!(positivity_shift(&[(2020.25, 5.0), (2020.5, 10.0)]), Some(0.0));
        // mean 5, scale 10: cushion clamps to scale / 5
        assert_eq!(positivity_shift(&[(2020.25, 0.0), (2020.5, 10.0)]), Some(2.0));
        assert_eq!(positivity_shift(&[(2020.25, 0.0), (2020.5, 0.0)]), None);
    }

    #[test]
    fn test_points_before_first_positive_are_dropped() {
        let mut pts = quarterly(33, 2023, |i| 100.0 * 1.05_f64.powf(i as f64 * 0.25));
        let clean = estimate_cagr(&pts[8..]);
        for p in pts.iter_mut().take(8) {
            p.1 = -50.0;
        }
        let dirty = estimate_cagr(&pts);
        assert_eq!(clean.horizons, dirty.horizons);
    }

    // -----------------------------------------------------------------------
    // 5. Sparse long windows are dampened
    // -----------------------------------------------------------------------
    #[test]
    fn test_short_history_dampens_long_horizon() {
        // Three years of quarters: the 8y window holds 13 of 33 points.
        let pts = quarterly(13, 2023, |i| 100.0 * 1.20_f64.powf(i as f64 * 0.25));
        let est = estimate_cagr(&pts);
        assert!((est.horizons.y2 - 0.20).abs() < 1e-9);
        let expected_y8 = (1.20_f64.ln() * (13.0_f64 / 33.0).powi(2)).exp() - 1.0;
        assert!((est.horizons.y8 - expected_y8).abs() < 1e-9);
        assert!(est.horizons.y8 < est.horizons.y4);
    }

    // -----------------------------------------------------------------------
    // 6. Ordering flag
    // -----------------------------------------------------------------------
    #[test]
    fn test_ordering_classification() {
        let acc = CagrHorizons { y8: 0.01, y6: 0.02, y4: 0.03, y2: 0.04 };
        let dec = CagrHorizons { y8: 0.04, y6: 0.03, y4: 0.02, y2: 0.01 };
        let mix = CagrHorizons { y8: 0.04, y6: 0.01, y4: 0.03, y2: 0.02 };
        assert_eq!(acc.ordering(), GrowthOrdering::Accelerating);
        assert_eq!(dec.ordering(), GrowthOrdering::Decelerating);
        assert_eq!(mix.ordering(), GrowthOrdering::Mixed);
        assert_eq!(CagrHorizons::ZERO.ordering(), GrowthOrdering::Accelerating);
    }

    #[test]
    fn test_delay_marker_roundtrip_through_json() {
        let d = NaiveDate::from_ymd_opt(2023, 6, 30).unwrap();
        let marker = CagrRecord::delay_marker(d, d);
        assert!(marker.is_delay_marker());
        let json = serde_json::to_string(&marker).unwrap();
        let back: CagrRecord = serde_json::from_str(&json).unwrap();
        assert!(back.is_delay_marker());
    }

    #[test]
    fn test_tempo_is_year_plus_month_fraction() {
        let d = NaiveDate::from_ymd_opt(2020, 6, 30).unwrap();
        assert!((tempo(d) - 2020.5).abs() < 1e-12);
    }
}
