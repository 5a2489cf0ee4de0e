use serde_json::Value;
use std::io;

use super::{flatten, format_scalar};

/// Write output as a two-column `field,value` CSV to stdout, one row per
/// flattened leaf of the result, followed by the warnings.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());
    let _ = wtr.write_record(["field", "value"]);

    let result = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);
    let mut rows = Vec::new();
    flatten("", result, &mut rows);
    for (path, val) in &rows {
        let _ = wtr.write_record([path.as_str(), &format_csv_value(val)]);
    }

    if let Some(Value::Array(warnings)) = value.get("warnings") {
        for (i, w) in warnings.iter().enumerate() {
            let _ = wtr.write_record([format!("warnings[{i}]"), format_csv_value(w)]);
        }
    }

    let _ = wtr.flush();
}

fn format_csv_value(value: &Value) -> String {
    match value {
        // Full precision for machine consumers
        Value::Number(n) => n.to_string(),
        Value::Array(arr) if arr.is_empty() => String::new(),
        _ => format_scalar(value, ""),
    }
}
