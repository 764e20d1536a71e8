//! Date × ticker price table with the row/column filters the universe
//! and the reports need.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Prices by date (rows, ascending) and ticker (columns).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PricePanel {
    pub dates: Vec<NaiveDate>,
    pub tickers: Vec<String>,
    /// `rows[t][j]` is the price of `tickers[j]` on `dates[t]`.
    pub rows: Vec<Vec<Option<f64>>>,
}

impl PricePanel {
    /// Outer join of per-ticker series on date.
    pub fn from_columns(columns: Vec<(String, Vec<(NaiveDate, f64)>)>) -> Self {
        let dates: BTreeSet<NaiveDate> = columns
            .iter()
            .flat_map(|(_, s)| s.iter().map(|(d, _)| *d))
            .collect();
        let dates: Vec<NaiveDate> = dates.into_iter().collect();
        let position: BTreeMap<NaiveDate, usize> =
            dates.iter().enumerate().map(|(i, d)| (*d, i)).collect();

        let mut rows = vec![vec![None; columns.len()]; dates.len()];
        let mut tickers = Vec::with_capacity(columns.len());
        for (j, (ticker, series)) in columns.into_iter().enumerate() {
            for (date, price) in series {
                if price.is_finite() {
                    if let Some(&t) = position.get(&date) {
                        rows[t][j] = Some(price);
                    }
                }
            }
            tickers.push(ticker);
        }
        Self {
            dates,
            tickers,
            rows,
        }
    }

    pub fn n_rows(&self) -> usize {
        self.dates.len()
    }

    pub fn n_cols(&self) -> usize {
        self.tickers.len()
    }

    pub fn column_index(&self, ticker: &str) -> Option<usize> {
        self.tickers.iter().position(|t| t == ticker)
    }

    pub fn column(&self, j: usize) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r[j]).collect()
    }

    pub fn missing_in_column(&self, j: usize) -> usize {
        self.rows.iter().filter(|r| r[j].is_none()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.rows.iter().all(|r| r.iter().all(Option::is_some))
    }

    /// Last `n` rows.
    pub fn tail_rows(&self, n: usize) -> Self {
        let start = self.n_rows().saturating_sub(n);
        Self {
            dates: self.dates[start..].to_vec(),
            tickers: self.tickers.clone(),
            rows: self.rows[start..].to_vec(),
        }
    }

    /// Columns for which `keep(j)` holds, in their current order.
    pub fn filter_columns(&self, mut keep: impl FnMut(usize) -> bool) -> Self {
        let kept: Vec<usize> = (0..self.n_cols()).filter(|&j| keep(j)).collect();
        Self {
            dates: self.dates.clone(),
            tickers: kept.iter().map(|&j| self.tickers[j].clone()).collect(),
            rows: self
                .rows
                .iter()
                .map(|r| kept.iter().map(|&j| r[j]).collect())
                .collect(),
        }
    }

    /// Rows for which `keep(t)` holds.
    pub fn filter_rows(&self, mut keep: impl FnMut(usize) -> bool) -> Self {
        let kept: Vec<usize> = (0..self.n_rows()).filter(|&t| keep(t)).collect();
        Self {
            dates: kept.iter().map(|&t| self.dates[t]).collect(),
            tickers: self.tickers.clone(),
            rows: kept.iter().map(|&t| self.rows[t].clone()).collect(),
        }
    }

    pub fn select_columns(&self, tickers: &BTreeSet<String>) -> Self {
        self.filter_columns(|j| tickers.contains(&self.tickers[j]))
    }

    /// Drop rows with any missing price.
    pub fn drop_incomplete_rows(&self) -> Self {
        self.filter_rows(|t| self.rows[t].iter().all(Option::is_some))
    }

    /// Drop rows and columns with no price at all.
    pub fn drop_empty(&self) -> Self {
        let cols = self.filter_columns(|j| self.rows.iter().any(|r| r[j].is_some()));
        let rows = cols.rows.clone();
        cols.filter_rows(|t| rows[t].iter().any(Option::is_some))
    }

    /// Append `series` as a column, keeping only dates present in both.
    pub fn inner_join_column(&self, name: &str, series: &[(NaiveDate, f64)]) -> Self {
        let lookup: BTreeMap<NaiveDate, f64> = series.iter().copied().collect();
        let mut out = self.filter_rows(|t| lookup.contains_key(&self.dates[t]));
        out.tickers.push(name.to_string());
        for (t, row) in out.rows.iter_mut().enumerate() {
            row.push(lookup.get(&out.dates[t]).copied());
        }
        out
    }

    /// Append `series` as a column on the existing dates.
    pub fn left_join_column(&self, name: &str, series: &[(NaiveDate, f64)]) -> Self {
        let lookup: BTreeMap<NaiveDate, f64> = series.iter().copied().collect();
        let mut out = self.clone();
        out.tickers.push(name.to_string());
        for (t, row) in out.rows.iter_mut().enumerate() {
            row.push(lookup.get(&self.dates[t]).copied());
        }
        out
    }

    /// Prices of the last row, if it is complete.
    pub fn last_prices(&self) -> Option<Vec<f64>> {
        self.rows.last()?.iter().copied().collect()
    }
}
