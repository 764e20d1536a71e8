use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

use crate::error::EngineError;
use crate::panel::PricePanel;
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Tuning of the cross-sectional filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UniverseParameters {
    /// Price rows kept for covariance estimation (three trading years).
    pub lookback_rows: usize,
    /// Most missing prices tolerated in the lookback.
    pub max_missing: usize,
    /// Trailing rows that must all be priced.
    pub recent_rows: usize,
    /// Ticker prefix shared by share classes of one issuer.
    pub share_class_root_len: usize,
    pub risk_free_ticker: String,
    pub risk_free_sector: String,
}

impl Default for UniverseParameters {
    fn default() -> Self {
        Self {
            lookback_rows: 3 * 252,
            max_missing: 5,
            recent_rows: 3,
            share_class_root_len: 4,
            risk_free_ticker: "LFTS3".to_string(),
            risk_free_sector: "RF".to_string(),
        }
    }
}

/// An asset with a signal, before filtering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub ticker: String,
    pub expected_return: f64,
    pub sector: String,
}

/// The investable universe of one date, aligned with a complete price panel.
///
/// `tickers`, `expected_returns` and `sectors` follow the panel's column
/// order; the risk-free asset is the last column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredUniverse {
    pub tickers: Vec<String>,
    pub expected_returns: Vec<f64>,
    pub sectors: Vec<String>,
    pub prices: PricePanel,
    pub risk_free_rate: f64,
    pub risk_free_index: usize,
}

impl FilteredUniverse {
    pub fn len(&self) -> usize {
        self.tickers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickers.is_empty()
    }

    /// Tickers other than the risk-free asset.
    pub fn equities(&self) -> impl Iterator<Item = &str> {
        self.tickers
            .iter()
            .enumerate()
            .filter(move |(i, _)| *i != self.risk_free_index)
            .map(|(_, t)| t.as_str())
    }
}

// ---------------------------------------------------------------------------
// Filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct UniverseFilter {
    params: UniverseParameters,
}

impl UniverseFilter {
    pub fn new(params: UniverseParameters) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &UniverseParameters {
        &self.params
    }

    /// Reduce `candidates` to the assets worth optimizing over.
    ///
    /// Returns the universe and one note per dropped candidate.
    pub fn apply(
        &self,
        candidates: &[Candidate],
        prices: &PricePanel,
        risk_free_index: &[(NaiveDate, f64)],
        risk_free_rate: f64,
    ) -> EngineResult<(FilteredUniverse, Vec<String>)> {
        let mut notes = Vec::new();

        // --- Cross-sectional screens ---
        let mut ranked: Vec<&Candidate> = candidates.iter().collect();
        ranked.sort_by(|a, b| b.expected_return.total_cmp(&a.expected_return));

        let mut roots: HashSet<String> = HashSet::new();
        let mut survivors: Vec<&Candidate> = Vec::new();
        for c in ranked {
            let root: String = c.ticker.chars().take(self.params.share_class_root_len).collect();
            if !roots.insert(root) {
                notes.push(format!("{}: lower-return share class of the same issuer", c.ticker));
                continue;
            }
            if c.expected_return < risk_free_rate {
                notes.push(format!(
                    "{}: expected return {:.4} below risk-free {:.4}",
                    c.ticker, c.expected_return, risk_free_rate
                ));
                continue;
            }
            survivors.push(c);
        }

        // --- Price history screens ---
        let wanted: BTreeSet<String> = survivors.iter().map(|c| c.ticker.clone()).collect();
        let window = prices.tail_rows(self.params.lookback_rows);
        let window = window.select_columns(&wanted);
        for c in &survivors {
            if window.column_index(&c.ticker).is_none() {
                notes.push(format!("{}: no price history", c.ticker));
            }
        }

        let sparse_ok = window.filter_columns(|j| {
            let missing = window.missing_in_column(j);
            if missing > self.params.max_missing {
                notes.push(format!("{}: {} missing prices in lookback", window.tickers[j], missing));
                false
            } else {
                true
            }
        });
        let recent_from = sparse_ok.n_rows().saturating_sub(self.params.recent_rows);
        let current = sparse_ok.filter_columns(|j| {
            let stale = sparse_ok.rows[recent_from..].iter().any(|r| r[j].is_none());
            if stale {
                notes.push(format!("{}: missing recent prices", sparse_ok.tickers[j]));
            }
            !stale
        });
        let complete = current.drop_incomplete_rows();

        if complete.n_cols() == 0 {
            return Err(EngineError::InsufficientData(
                "no eligible assets left after filtering".into(),
            ));
        }

        // --- Risk-free asset ---
        let panel = complete.inner_join_column(&self.params.risk_free_ticker, risk_free_index);
        if panel.n_rows() < 3 {
            return Err(EngineError::InsufficientData(format!(
                "only {} price rows overlap the risk-free index",
                panel.n_rows()
            )));
        }

        let mut expected_returns = Vec::with_capacity(panel.n_cols());
        let mut sectors = Vec::with_capacity(panel.n_cols());
        for ticker in &complete.tickers {
            let c = survivors
                .iter()
                .find(|c| &c.ticker == ticker)
                .ok_or_else(|| EngineError::InvalidInput {
                    field: "prices".into(),
                    reason: format!("column {} has no candidate", ticker),
                })?;
            expected_returns.push(c.expected_return);
            sectors.push(c.sector.clone());
        }
        expected_returns.push(risk_free_rate);
        sectors.push(self.params.risk_free_sector.clone());

        for note in &notes {
            debug!(%note, "universe filter");
        }
        info!(
            candidates = candidates.len(),
            eligible = complete.n_cols(),
            rows = panel.n_rows(),
            "universe filtered"
        );

        Ok((
            FilteredUniverse {
                tickers: panel.tickers.clone(),
                risk_free_index: panel.n_cols() - 1,
                expected_returns,
                sectors,
                prices: panel,
                risk_free_rate,
            },
            notes,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pretty_assertions::assert_eq;

    fn dates(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
        (0..n).map(|i| start + Duration::days(i as i64)).collect()
    }

    fn series(n: usize, base: f64) -> Vec<(NaiveDate, f64)> {
        dates(n)
            .into_iter()
            .enumerate()
            .map(|(i, d)| (d, base + (i as f64 * 0.3).sin()))
            .collect()
    }

    fn cand(ticker: &str, r: f64, sector: &str) -> Candidate {
        Candidate {
            ticker: ticker.into(),
            expected_return: r,
            sector: sector.into(),
        }
    }

    fn rf_index(n: usize) -> Vec<(NaiveDate, f64)> {
        dates(n)
            .into_iter()
            .enumerate()
            .map(|(i, d)| (d, 1.0004_f64.powi(i as i32)))
            .collect()
    }

    // -----------------------------------------------------------------------
    // 1. Assets below the risk-free rate never reach the optimizer
    // -----------------------------------------------------------------------
    #[test]
    fn test_below_risk_free_is_excluded() {
        let prices = PricePanel::from_columns(vec![
            ("AAAA3".into(), series(100, 10.0)),
            ("BBBB3".into(), series(100, 20.0)),
        ]);
        let (u, notes) = UniverseFilter::default()
            .apply(
                &[cand("AAAA3", 0.15, "X"), cand("BBBB3", 0.08, "Y")],
                &prices,
                &rf_index(100),
                0.10,
            )
            .unwrap();
        assert_eq!(u.tickers, vec!["AAAA3".to_string(), "LFTS3".to_string()]);
        assert_eq!(u.expected_returns, vec![0.15, 0.10]);
        assert_eq!(u.sectors, vec!["X".to_string(), "RF".to_string()]);
        assert_eq!(u.risk_free_index, 1);
        assert!(notes.iter().any(|n| n.starts_with("BBBB3")));
    }

    // -----------------------------------------------------------------------
    // 2. Share classes collapse to the best one
    // -----------------------------------------------------------------------
    #[test]
    fn test_share_classes_collapse() {
        let prices = PricePanel::from_columns(vec![
            ("PETR3".into(), series(50, 10.0)),
            ("PETR4".into(), series(50, 11.0)),
        ]);
        let (u, _) = UniverseFilter::default()
            .apply(
                &[cand("PETR3", 0.20, "O"), cand("PETR4", 0.25, "O")],
                &prices,
                &rf_index(50),
                0.10,
            )
            .unwrap();
        assert_eq!(u.equities().collect::<Vec<_>>(), vec!["PETR4"]);
    }

    // -----------------------------------------------------------------------
    // 3. Price-history screens
    // -----------------------------------------------------------------------
    #[test]
    fn test_sparse_and_stale_columns_dropped() {
        let mut sparse = series(60, 10.0);
        for i in [5, 10, 15, 20, 25, 30] {
            sparse[i].1 = f64::NAN;
        }
        let mut stale = series(60, 10.0);
        stale.pop();
        let mut one_gap = series(60, 10.0);
        one_gap.remove(30);
        let prices = PricePanel::from_columns(vec![
            ("AAAA3".into(), series(60, 10.0)),
            ("BBBB3".into(), sparse),
            ("CCCC3".into(), stale),
            ("DDDD3".into(), one_gap),
        ]);
        let cands = [
            cand("AAAA3", 0.2, "A"),
            cand("BBBB3", 0.2, "B"),
            cand("CCCC3", 0.2, "C"),
            cand("DDDD3", 0.2, "D"),
        ];
        let (u, notes) = UniverseFilter::default()
            .apply(&cands, &prices, &rf_index(60), 0.1)
            .unwrap();
        assert_eq!(u.equities().collect::<Vec<_>>(), vec!["AAAA3", "DDDD3"]);
        // The gap row of DDDD3 is dropped for everyone.
        assert_eq!(u.prices.n_rows(), 59);
        assert!(u.prices.is_complete());
        assert_eq!(notes.len(), 2);
    }

    #[test]
    fn test_lookback_limits_rows() {
        let prices = PricePanel::from_columns(vec![("AAAA3".into(), series(1000, 10.0))]);
        let (u, _) = UniverseFilter::default()
            .apply(&[cand("AAAA3", 0.2, "A")], &prices, &rf_index(1000), 0.1)
            .unwrap();
        assert_eq!(u.prices.n_rows(), 756);
    }

    #[test]
    fn test_empty_universe_is_an_error() {
        let prices = PricePanel::from_columns(vec![("AAAA3".into(), series(50, 10.0))]);
        let err = UniverseFilter::default()
            .apply(&[cand("AAAA3", 0.05, "A")], &prices, &rf_index(50), 0.1)
            .unwrap_err();
        assert!(matches!(err, EngineError::InsufficientData(_)));
    }
}
