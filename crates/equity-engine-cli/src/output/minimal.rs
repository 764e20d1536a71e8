use serde_json::Value;

/// Print only the answer: share counts for a build, the portfolio's total
/// return for a backtest, one expected return per ticker for signals, the
/// headline number otherwise.
pub fn print_minimal(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);
    for line in minimal_lines(result) {
        println!("{}", line);
    }
}

fn minimal_lines(result: &Value) -> Vec<String> {
    match result {
        Value::Object(map) if map.contains_key("allocation") => map
            .get("allocation")
            .and_then(|a| a.get("shares"))
            .and_then(Value::as_object)
            .map(|shares| {
                shares
                    .iter()
                    .map(|(ticker, n)| format!("{} {}", ticker, scalar(n)))
                    .collect()
            })
            .unwrap_or_default(),
        Value::Object(map) if map.contains_key("rebalances") => map
            .get("portfolio")
            .and_then(|p| p.get("total_return"))
            .map(|r| vec![scalar(r)])
            .unwrap_or_default(),
        Value::Object(map) => ["penalty", "expected_return", "y8"]
            .iter()
            .find_map(|key| map.get(*key).filter(|v| !v.is_null()))
            .or_else(|| map.values().next())
            .map(|v| vec![scalar(v)])
            .unwrap_or_default(),
        Value::Array(rows) => rows
            .iter()
            .filter_map(|row| {
                if let Some(ticker) = row.get("ticker") {
                    let er = row.get("expected_return").unwrap_or(&Value::Null);
                    Some(format!("{} {}", scalar(ticker), scalar(er)))
                } else if let Some(line) = row.get("line") {
                    Some(format!("{} {}", scalar(line), scalar(row.get("y8")?)))
                } else {
                    let (date, level) = (row.get("date")?, row.get("portfolio")?);
                    Some(format!("{} {}", scalar(date), scalar(level)))
                }
            })
            .collect(),
        other => vec![scalar(other)],
    }
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}
