pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Render a scalar cell. Floats are cut to six decimals; containers fall back
/// to compact JSON.
pub fn format_scalar(value: &Value, null: &str) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if !n.is_i64() && !n.is_u64() => format!("{f:.6}"),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => null.to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

/// Flatten nested objects into `(dotted.path, value)` pairs. Arrays are
/// indexed (`path[0].field`).
pub fn flatten(prefix: &str, value: &Value, out: &mut Vec<(String, Value)>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten(&path, val, out);
            }
        }
        Value::Array(arr) if !arr.is_empty() => {
            for (i, val) in arr.iter().enumerate() {
                flatten(&format!("{prefix}[{i}]"), val, out);
            }
        }
        _ => out.push((prefix.to_string(), value.clone())),
    }
}
