use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::cagr::{estimate_cagr, tempo, CagrEstimate, CagrHorizons, CagrRecord, GrowthLine, GrowthOrdering};
use crate::data::FundamentalsRecord;
use crate::series::AscendingSeries;

/// Trailing span fed to each regression.
const HISTORY_YEARS: f64 = 8.0;

/// A regression needs more than this many quarters in the trailing window.
const MIN_HISTORY_POINTS: usize = 20;

/// Years of history before the ordering flag is trusted.
const ORDERING_WARMUP_YEARS: i32 = 6;

/// Growth history of one asset, one ascending vector per line.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CagrTable {
    pub revenue: Vec<CagrRecord>,
    pub ebitda: Vec<CagrRecord>,
    pub net_income: Vec<CagrRecord>,
    pub dividends: Vec<CagrRecord>,
    pub blended: Vec<CagrRecord>,
}

impl CagrTable {
    /// Group a flat list of records (as shipped by a loader) by line.
    pub fn from_records(records: &[CagrRecord]) -> Self {
        let mut table = CagrTable::default();
        for record in records {
            table.line_mut(record.line).push(record.clone());
        }
        for line in [
            GrowthLine::Revenue,
            GrowthLine::Ebitda,
            GrowthLine::NetIncome,
            GrowthLine::Dividends,
            GrowthLine::Blended,
        ] {
            table.line_mut(line).sort_by_key(|r| r.visible_from);
        }
        table
    }

    pub fn line(&self, line: GrowthLine) -> &[CagrRecord] {
        match line {
            GrowthLine::Revenue => &self.revenue,
            GrowthLine::Ebitda => &self.ebitda,
            GrowthLine::NetIncome => &self.net_income,
            GrowthLine::Dividends => &self.dividends,
            GrowthLine::Blended => &self.blended,
        }
    }

    fn line_mut(&mut self, line: GrowthLine) -> &mut Vec<CagrRecord> {
        match line {
            GrowthLine::Revenue => &mut self.revenue,
            GrowthLine::Ebitda => &mut self.ebitda,
            GrowthLine::NetIncome => &mut self.net_income,
            GrowthLine::Dividends => &mut self.dividends,
            GrowthLine::Blended => &mut self.blended,
        }
    }

    /// Most recent record of `line` visible on `as_of`.
    ///
    /// Ties on the visibility date resolve to the later entry so that an
    /// appended delay marker wins over the balance sheet it follows.
    pub fn latest(&self, line: GrowthLine, as_of: NaiveDate) -> Option<&CagrRecord> {
        self.line(line)
            .iter()
            .filter(|r| r.visible_from <= as_of)
            .fold(None, |best: Option<&CagrRecord>, r| match best {
                Some(b) if b.visible_from > r.visible_from => Some(b),
                _ => Some(r),
            })
    }

    pub fn is_empty(&self) -> bool {
        self.revenue.is_empty() && self.blended.is_empty()
    }
}

/// Builds growth tables from raw balance sheets.
#[derive(Debug, Clone)]
pub struct GrowthEstimator {
    bank_segment: String,
}

impl GrowthEstimator {
    pub fn new(bank_segment: impl Into<String>) -> Self {
        Self {
            bank_segment: bank_segment.into(),
        }
    }

    /// Full growth table from the balance sheets disclosed by `as_of`.
    pub fn table(
        &self,
        fundamentals: &AscendingSeries<FundamentalsRecord>,
        as_of: NaiveDate,
    ) -> CagrTable {
        let mut visible: Vec<&FundamentalsRecord> = fundamentals.until(as_of).iter().collect();
        visible.sort_by_key(|r| r.period_end);
        let Some(latest) = visible.last().copied() else {
            return CagrTable::default();
        };

        let mut revenue = cagr_history(&visible, GrowthLine::Revenue);
        let ebitda = cagr_history(&visible, GrowthLine::Ebitda);
        let net_income = cagr_history(&visible, GrowthLine::NetIncome);
        let dividends = cagr_history(&visible, GrowthLine::Dividends);
        let mut blended = blended_history(
            &revenue,
            &ebitda,
            &net_income,
            latest.classification.segment == self.bank_segment,
        );
        assign_ordering(&mut blended);

        if let Some(marker) = disclosure_delay(latest, as_of) {
            debug!(
                period_end = %latest.period_end,
                %as_of,
                "next balance sheet overdue, flagging revenue growth"
            );
            revenue.push(marker);
        }

        CagrTable {
            revenue,
            ebitda,
            net_income,
            dividends,
            blended,
        }
    }
}

/// One growth record per balance sheet, each fitted on the trailing eight
/// years up to that sheet.
pub fn cagr_history(records: &[&FundamentalsRecord], line: GrowthLine) -> Vec<CagrRecord> {
    let points: Vec<(f64, f64)> = records
        .iter()
        .map(|r| (tempo(r.period_end), line.value(r).unwrap_or(0.0)))
        .collect();

    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let t_now = points[i].0;
            let first = points[..=i].partition_point(|(t, _)| *t < t_now - HISTORY_YEARS - 1e-9);
            let window = &points[first..=i];
            let mut estimate = if window.len() > MIN_HISTORY_POINTS {
                estimate_cagr(window)
            } else {
                CagrEstimate::inestimable(points[i].1)
            };
            if line == GrowthLine::Dividends {
                let d = &record.dividends;
                let payout_floor = (d.m12 + d.m24 + d.m36) / 3.0;
                estimate.forecast_min = estimate.forecast_min.min(payout_floor);
            }
            CagrRecord::from_estimate(line, record.period_end, record.disclosed_on, &estimate)
        })
        .collect()
}

/// Sector-weighted blend of the three operating lines.
///
/// Banks carry no meaningful EBITDA: 60% revenue and 40% net income.
/// Everyone else: 40% revenue, 30% EBITDA, 30% net income.
pub fn blended_history(
    revenue: &[CagrRecord],
    ebitda: &[CagrRecord],
    net_income: &[CagrRecord],
    is_bank: bool,
) -> Vec<CagrRecord> {
    revenue
        .iter()
        .zip(ebitda)
        .zip(net_income)
        .map(|((r, e), n)| {
            let horizons = if is_bank {
                CagrHorizons::blend(&[(0.6, r.horizons), (0.4, n.horizons)])
            } else {
                CagrHorizons::blend(&[(0.4, r.horizons), (0.3, e.horizons), (0.3, n.horizons)])
            };
            CagrRecord {
                line: GrowthLine::Blended,
                period_end: r.period_end,
                visible_from: r.visible_from,
                horizons,
                min: horizons.min(),
                ordering: GrowthOrdering::Mixed,
                last_value: 0.0,
                forecast: 0.0,
                forecast_min: 0.0,
            }
        })
        .collect()
}

/// Set the ordering flag on records dated six or more years after the
/// first one; earlier records stay `Mixed`.
pub fn assign_ordering(records: &mut [CagrRecord]) {
    let Some(first_year) = records.iter().map(|r| r.visible_from.year()).min() else {
        return;
    };
    for record in records.iter_mut() {
        record.ordering = if record.visible_from.year() >= first_year + ORDERING_WARMUP_YEARS {
            record.horizons.ordering()
        } else {
            GrowthOrdering::Mixed
        };
    }
}

/// Delay marker when the balance sheet following `latest` is between three
/// and six months past its own deadline on `as_of`.
///
/// The next period closes three months after `latest.period_end` and is due
/// three months after closing.
pub fn disclosure_delay(latest: &FundamentalsRecord, as_of: NaiveDate) -> Option<CagrRecord> {
    let next_period = latest.period_end.checked_add_months(Months::new(3))?;
    let overdue_from = latest.period_end.checked_add_months(Months::new(6))?;
    let stale_from = latest.period_end.checked_add_months(Months::new(9))?;
    if as_of < overdue_from || as_of >= stale_from {
        return None;
    }
    Some(CagrRecord::delay_marker(
        next_period,
        overdue_from.max(latest.disclosed_on),
    ))
}
