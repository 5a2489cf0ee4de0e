use serde_json::Value;

use super::format_scalar;

/// Print just the key answer value from the output.
///
/// Looks for well-known result fields in order of priority, then falls back
/// to the first field of the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    // analyze, metrics, optimize, stress
    let priority_pointers = [
        "/current/annualized_sharpe_ratio",
        "/metrics/annualized_sharpe_ratio",
        "/allocation/objective_value",
        "/concentration/level",
        "/annualized_sharpe_ratio",
    ];

    for pointer in &priority_pointers {
        if let Some(val) = result_obj.pointer(pointer) {
            if !val.is_null() {
                println!("{}", format_scalar(val, "null"));
                return;
            }
        }
    }

    if let Value::Object(map) = result_obj {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_scalar(val, "null"));
            return;
        }
    }

    println!("{}", format_scalar(result_obj, "null"));
}
