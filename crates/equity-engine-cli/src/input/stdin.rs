use serde::de::DeserializeOwned;
use std::io::{self, Read};

/// Read a snapshot or config piped on stdin, as JSON or YAML.
/// Returns `None` when stdin is a terminal or the pipe is empty.
pub fn read_stdin<T: DeserializeOwned>() -> Result<Option<T>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;
    parse_document(&buffer)
}

/// JSON when the document opens with `{`, YAML otherwise.
fn parse_document<T: DeserializeOwned>(text: &str) -> Result<Option<T>, Box<dyn std::error::Error>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    let value = if trimmed.starts_with('{') {
        serde_json::from_str(trimmed).map_err(|e| format!("Failed to parse stdin as JSON: {}", e))?
    } else {
        serde_yaml::from_str(trimmed).map_err(|e| format!("Failed to parse stdin as YAML: {}", e))?
    };
    Ok(Some(value))
}
