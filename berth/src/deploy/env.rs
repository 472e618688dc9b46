//! Environment blob parsing

use std::collections::HashMap;

/// Turn a newline-delimited `KEY=VALUE` blob into `KEY=VALUE` entries.
///
/// Blank lines and `#` comments are skipped, an `export ` prefix is ignored
/// and matching surrounding quotes are stripped from values. Lines without
/// `=` or with an empty key are dropped. Entries keep the order in which a
/// key first appears; a repeated key takes its last value.
pub fn prepare_environment_variables(blob: Option<&str>) -> Vec<String> {
    let Some(blob) = blob else {
        return Vec::new();
    };

    let mut order: Vec<String> = Vec::new();
    let mut values: HashMap<String, String> = HashMap::new();

    for line in blob.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").map(str::trim_start).unwrap_or(line);

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        if !values.contains_key(key) {
            order.push(key.to_string());
        }
        values.insert(key.to_string(), unquote(value.trim()).to_string());
    }

    order
        .into_iter()
        .map(|key| {
            let value = values.remove(&key).unwrap_or_default();
            format!("{}={}", key, value)
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'"' || first == b'\'') {
            return &value[1..value.len() - 1];
        }
    }
    value
}
