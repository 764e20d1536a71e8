//! Tabular views of the command results, shared by the table and CSV
//! formatters.

use serde_json::{Map, Value};

/// One titled block of rows.
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Section {
    fn new(title: &str, headers: &[&str]) -> Self {
        Self {
            title: title.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }
}

/// Sections for a known result shape, or `None` to fall back to a plain
/// field/value rendering.
pub fn sections(value: &Value) -> Option<Vec<Section>> {
    let envelope = value.as_object();
    let result = envelope.and_then(|m| m.get("result")).unwrap_or(value);
    match result {
        Value::Object(map) if map.contains_key("allocation") && map.contains_key("weights") => {
            Some(build_sections(map))
        }
        Value::Object(map) if map.contains_key("rebalances") && map.contains_key("curve") => {
            Some(backtest_sections(map))
        }
        Value::Array(rows) if envelope.is_some_and(|m| m.contains_key("exclusions")) => {
            let exclusions = envelope.and_then(|m| m.get("exclusions"));
            Some(vec![signal_section(rows, exclusions)])
        }
        Value::Array(rows) if rows.iter().all(|r| r.get("portfolio").is_some()) && !rows.is_empty() => {
            Some(vec![curve_section(rows)])
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Build
// ---------------------------------------------------------------------------

fn build_sections(result: &Map<String, Value>) -> Vec<Section> {
    let allocation = result.get("allocation").unwrap_or(&Value::Null);
    let mut holdings = holdings_section("Holdings", result.get("weights"), allocation, None);
    holdings.rows.sort_by(|a, b| a[0].cmp(&b[0]));

    let performance = result.get("performance").unwrap_or(&Value::Null);
    let mut summary = Section::new("Summary", &["Field", "Value"]);
    let rows: [(&str, String); 9] = [
        ("date", text(result.get("date"))),
        ("capital", text(result.get("capital"))),
        ("total", text(allocation.get("total"))),
        ("leftover", text(allocation.get("leftover"))),
        ("expected_return", pct(performance.get("expected_return"))),
        ("volatility", pct(performance.get("volatility"))),
        ("sharpe_ratio", fixed(performance.get("sharpe_ratio"), 3)),
        ("risk_free_rate", pct(result.get("risk_free_rate"))),
        ("shrinkage", fixed(result.get("shrinkage"), 4)),
    ];
    for (field, value) in rows {
        summary.rows.push(vec![field.to_string(), value]);
    }
    vec![holdings, summary]
}

/// Ticker / weight / shares / price / money rows of every held or
/// weighted asset. `date` prefixes each row when given.
fn holdings_section(
    title: &str,
    weights: Option<&Value>,
    allocation: &Value,
    date: Option<&str>,
) -> Section {
    let mut headers = vec!["Ticker", "Weight", "Shares", "Price", "Money"];
    if date.is_some() {
        headers.insert(0, "Date");
    }
    let mut section = Section::new(title, &headers);
    let Some(Value::Object(weights)) = weights else {
        return section;
    };
    for (ticker, weight) in weights {
        let shares = allocation.get("shares").and_then(|s| s.get(ticker));
        let held = shares.and_then(Value::as_u64).unwrap_or(0) > 0;
        if !held && weight.as_f64().unwrap_or(0.0) <= 0.0 {
            continue;
        }
        let mut row = vec![
            ticker.clone(),
            pct(Some(weight)),
            shares.map(|s| text(Some(s))).unwrap_or_else(|| "0".into()),
            text(allocation.get("prices").and_then(|p| p.get(ticker))),
            text(allocation.get("positions").and_then(|p| p.get(ticker))),
        ];
        if let Some(d) = date {
            row.insert(0, d.to_string());
        }
        section.rows.push(row);
    }
    section
}

// ---------------------------------------------------------------------------
// Backtest
// ---------------------------------------------------------------------------

fn backtest_sections(result: &Map<String, Value>) -> Vec<Section> {
    let mut performance = Section::new(
        "Performance",
        &["Series", "Total return", "Annualized", "Volatility", "Max drawdown", "Sharpe"],
    );
    for series in ["portfolio", "market_index", "risk_free"] {
        let Some(s) = result.get(series).filter(|s| !s.is_null()) else {
            continue;
        };
        performance.rows.push(vec![
            series.to_string(),
            pct(s.get("total_return")),
            pct(s.get("annualized_return")),
            pct(s.get("annualized_volatility")),
            pct(s.get("max_drawdown")),
            fixed(s.get("sharpe_ratio"), 3),
        ]);
    }

    let mut rebalances = holdings_section("Rebalances", None, &Value::Null, Some(""));
    if let Some(Value::Array(records)) = result.get("rebalances") {
        for record in records {
            let date = text(record.get("date"));
            let allocation = record.get("allocation").unwrap_or(&Value::Null);
            let block = holdings_section("", record.get("weights"), allocation, Some(date.as_str()));
            rebalances.rows.extend(block.rows);
        }
    }
    vec![performance, rebalances]
}

fn curve_section(points: &[Value]) -> Section {
    let mut section = Section::new("Equity curve", &["Date", "Portfolio", "IBOV", "LFTS3"]);
    for p in points {
        section.rows.push(vec![
            text(p.get("date")),
            text(p.get("portfolio")),
            fixed(p.get("market_index"), 2),
            fixed(p.get("risk_free"), 2),
        ]);
    }
    section
}

// ---------------------------------------------------------------------------
// Signals
// ---------------------------------------------------------------------------

/// Ticker / expected-return rows, followed by excluded tickers with their
/// reason.
fn signal_section(rows: &[Value], exclusions: Option<&Value>) -> Section {
    let mut section = Section::new(
        "Signals",
        &["Ticker", "Segment", "Expected return", "Growth", "Trend", "Reason"],
    );
    for r in rows {
        section.rows.push(vec![
            text(r.get("ticker")),
            text(r.get("segment")),
            pct(r.get("expected_return")),
            pct(r.get("growth")),
            fixed(r.get("bullish_score"), 2),
            String::new(),
        ]);
    }
    if let Some(Value::Object(excluded)) = exclusions {
        for (ticker, reason) in excluded {
            let mut row = vec![String::new(); 6];
            row[0] = ticker.clone();
            row[5] = text(Some(reason));
            section.rows.push(row);
        }
    }
    section
}

// ---------------------------------------------------------------------------
// Cells
// ---------------------------------------------------------------------------

fn text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn pct(value: Option<&Value>) -> String {
    value
        .and_then(Value::as_f64)
        .map(|v| format!("{:.2}%", v * 100.0))
        .unwrap_or_default()
}

fn fixed(value: Option<&Value>, decimals: usize) -> String {
    value
        .and_then(Value::as_f64)
        .map(|v| format!("{:.*}", decimals, v))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    // -----------------------------------------------------------------------
    // 1. Build holdings
    // -----------------------------------------------------------------------
    #[test]
    fn test_build_result_lists_held_assets() {
        let value = json!({
            "result": {
                "date": "2024-02-20",
                "capital": "1000",
                "weights": { "PETR4": 0.1, "VALE3": 0.0, "LFTS3": 0.9 },
                "performance": { "expected_return": 0.11, "volatility": 0.02, "sharpe_ratio": 1.0 },
                "risk_free_rate": 0.1,
                "shrinkage": 0.2,
                "allocation": {
                    "shares": { "PETR4": 3, "LFTS3": 60 },
                    "prices": { "PETR4": "30", "LFTS3": "15" },
                    "positions": { "PETR4": "90", "LFTS3": "900" },
                    "leftover": "10",
                    "total": "1000"
                }
            }
        });
        let sections = sections(&value).unwrap();
        assert_eq!(sections[0].title, "Holdings");
        assert_eq!(sections[0].rows.len(), 2);
        assert_eq!(
            sections[0].rows[1],
            vec!["PETR4", "10.00%", "3", "30", "90"]
        );
        assert!(sections[1].rows.contains(&vec!["leftover".to_string(), "10".to_string()]));
    }

    #[test]
    fn test_backtest_rebalances_are_dated_holdings() {
        let value = json!({
            "result": {
                "curve": [],
                "rebalances": [
                    {
                        "date": "2024-01-02",
                        "weights": { "ITUB4": 1.0 },
                        "allocation": { "shares": { "ITUB4": 30 }, "prices": { "ITUB4": "33" }, "positions": { "ITUB4": "990" } }
                    },
                    {
                        "date": "2024-02-01",
                        "weights": { "ITUB4": 1.0 },
                        "allocation": { "shares": { "ITUB4": 29 }, "prices": { "ITUB4": "34" }, "positions": { "ITUB4": "986" } }
                    }
                ],
                "portfolio": { "total_return": 0.05, "annualized_return": 0.4, "annualized_volatility": 0.1, "max_drawdown": 0.02, "sharpe_ratio": 1.5 },
                "market_index": null,
                "risk_free": { "total_return": 0.01, "annualized_return": 0.1, "annualized_volatility": 0.0, "max_drawdown": 0.0, "sharpe_ratio": null }
            }
        });
        let sections = sections(&value).unwrap();
        assert_eq!(sections[0].rows.len(), 2);
        assert_eq!(sections[0].rows[0][1], "5.00%");
        assert_eq!(sections[0].rows[1][5], "");
        assert_eq!(sections[1].headers[0], "Date");
        assert_eq!(
            sections[1].rows[1],
            vec!["2024-02-01", "ITUB4", "100.00%", "29", "34", "986"]
        );
    }

    // -----------------------------------------------------------------------
    // 2. Signals and fallbacks
    // -----------------------------------------------------------------------
    #[test]
    fn test_signal_rows_show_exclusion_reason() {
        let value = json!({
            "result": [
                { "ticker": "PETR4", "segment": "Petróleo", "expected_return": 0.25, "growth": 0.2, "bullish_score": 0.5 }
            ],
            "exclusions": { "TAEE11": "net_margin history too short" }
        });
        let sections = sections(&value).unwrap();
        assert_eq!(sections[0].rows.len(), 2);
        assert_eq!(sections[0].rows[0][2], "25.00%");
        assert_eq!(sections[0].rows[0][5], "");
        assert_eq!(sections[0].rows[1][0], "TAEE11");
        assert_eq!(sections[0].rows[1][5], "net_margin history too short");
        assert_eq!(sections[0].rows[1][2], "");
    }

    #[test]
    fn test_unknown_shapes_fall_back() {
        assert!(sections(&json!({ "result": { "rate_penalty": 1.05 } })).is_none());
        assert!(sections(&json!({ "result": [] })).is_none());
        assert!(sections(&json!({ "result": [{ "line": "net_income", "y8": 0.1 }] })).is_none());
    }
}
