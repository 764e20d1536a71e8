use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::report::{self, Section};

/// Render a command result as tables: holdings, performance and signal views
/// for the portfolio commands, a field/value table otherwise.
pub fn print_table(value: &Value) {
    match report::sections(value) {
        Some(sections) => sections.iter().for_each(print_section),
        None => print_fields(value),
    }
    if let Value::Object(envelope) = value {
        print_notes(envelope);
    }
}

fn print_section(section: &Section) {
    println!("{}", section.title);
    if section.rows.is_empty() {
        println!("(none)\n");
        return;
    }
    let mut builder = Builder::default();
    builder.push_record(&section.headers);
    for row in &section.rows {
        builder.push_record(row);
    }
    println!("{}\n", Table::from(builder));
}

/// Growth rows and penalty breakdowns.
fn print_fields(value: &Value) {
    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);
    let mut builder = Builder::default();
    match result {
        Value::Array(rows) => {
            let Some(Value::Object(first)) = rows.first() else {
                println!("(none)");
                return;
            };
            let headers: Vec<&String> = first.keys().collect();
            builder.push_record(headers.iter().map(|h| h.as_str()));
            for row in rows {
                builder.push_record(headers.iter().map(|h| cell(row.get(h.as_str()))));
            }
        }
        Value::Object(map) => {
            builder.push_record(["Field", "Value"]);
            for (key, val) in map {
                builder.push_record([key.clone(), cell(Some(val))]);
            }
        }
        other => {
            println!("{}", cell(Some(other)));
            return;
        }
    }
    println!("{}", Table::from(builder));
}

fn print_notes(envelope: &Map<String, Value>) {
    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("Warnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }
    if let Some(Value::String(methodology)) = envelope.get("methodology") {
        println!("\nMethodology: {}", methodology);
    }
}

fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => "-".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| cell(Some(v)))
            .collect::<Vec<_>>()
            .join(", "),
        Some(other) => serde_json::to_string(other).unwrap_or_default(),
    }
}
