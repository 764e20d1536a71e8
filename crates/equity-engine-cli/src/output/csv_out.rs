use serde_json::Value;
use std::io;

use super::report::{self, Section};

/// Write the result as CSV on stdout. Multi-section results (a build's
/// holdings and summary, a backtest's performance and rebalances) are
/// written as consecutive tables separated by a blank line.
pub fn print_csv(value: &Value) {
    let written = match report::sections(value) {
        Some(sections) => write_sections(&sections),
        None => write_fields(value),
    };
    if let Err(e) = written {
        eprintln!("CSV write error: {}", e);
    }
}

fn write_sections(sections: &[Section]) -> csv::Result<()> {
    for (i, section) in sections.iter().enumerate() {
        if i > 0 {
            println!();
        }
        let mut wtr = csv::Writer::from_writer(io::stdout());
        wtr.write_record(section.headers.iter().map(|h| column_name(h)))?;
        for row in &section.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
    }
    Ok(())
}

fn write_fields(value: &Value) -> csv::Result<()> {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);
    let mut wtr = csv::Writer::from_writer(io::stdout());
    match result {
        Value::Array(rows) => {
            if let Some(Value::Object(first)) = rows.first() {
                let headers: Vec<&String> = first.keys().collect();
                wtr.write_record(&headers)?;
                for row in rows {
                    wtr.write_record(headers.iter().map(|h| field(row.get(h.as_str()))))?;
                }
            }
        }
        Value::Object(map) => {
            wtr.write_record(["field", "value"])?;
            for (key, val) in map {
                wtr.write_record([key.clone(), field(Some(val))])?;
            }
        }
        other => wtr.write_record([field(Some(other))])?,
    }
    wtr.flush()?;
    Ok(())
}

/// `Expected return` becomes `expected_return`.
fn column_name(header: &str) -> String {
    header.to_lowercase().replace(' ', "_")
}

fn field(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => serde_json::to_string(other).unwrap_or_default(),
    }
}
