use colored::Colorize;
use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::format_scalar;

/// Format output as tables using the tabled crate.
///
/// Scalars and nested objects of the result go into one `Field | Value`
/// table; every list of records (comparison, stress results, rebalance plan,
/// ...) gets a table of its own.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => match map.get("result") {
            Some(result) => print_result_tables(result, map),
            None => print_sections("", value),
        },
        Value::Array(arr) => print_record_table(arr),
        _ => println!("{}", value),
    }
}

fn print_result_tables(result: &Value, envelope: &Map<String, Value>) {
    print_sections("", result);

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\n{}", "Warnings:".yellow().bold());
            for w in warnings {
                if let Value::String(s) = w {
                    println!("  - {}", s);
                }
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_sections(prefix: &str, value: &Value) {
    let mut fields: Vec<(String, String)> = Vec::new();
    let mut lists: Vec<(String, &Vec<Value>)> = Vec::new();
    collect(prefix, value, &mut fields, &mut lists);

    if !fields.is_empty() {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in &fields {
            builder.push_record([key.as_str(), val.as_str()]);
        }
        println!("{}", Table::from(builder));
    }

    for (title, arr) in lists {
        println!("\n{}", title.bold());
        print_record_table(arr);
    }
}

/// Split a value into scalar leaves and lists of records.
fn collect<'a>(
    prefix: &str,
    value: &'a Value,
    fields: &mut Vec<(String, String)>,
    lists: &mut Vec<(String, &'a Vec<Value>)>,
) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let path = join(prefix, key);
                collect(&path, val, fields, lists);
            }
        }
        Value::Array(arr) if arr.iter().any(Value::is_object) => lists.push((prefix.to_string(), arr)),
        _ => fields.push((prefix.to_string(), format_value(value))),
    }
}

fn print_record_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    let rows: Vec<Vec<(String, String)>> = arr
        .iter()
        .map(|item| {
            let mut cells = Vec::new();
            record_cells("", item, &mut cells);
            cells
        })
        .collect();

    // Union of columns in first-seen order
    let mut headers: Vec<String> = Vec::new();
    for row in &rows {
        for (key, _) in row {
            if !headers.contains(key) {
                headers.push(key.clone());
            }
        }
    }

    let mut builder = Builder::default();
    builder.push_record(headers.iter().map(|h| if h.is_empty() { "value" } else { h.as_str() }));
    for row in &rows {
        builder.push_record(headers.iter().map(|h| {
            row.iter()
                .find(|(key, _)| key == h)
                .map(|(_, v)| v.clone())
                .unwrap_or_default()
        }));
    }
    println!("{}", Table::from(builder));
}

/// Flatten one record: nested objects become dotted columns, nested lists
/// are summarised.
fn record_cells(prefix: &str, value: &Value, cells: &mut Vec<(String, String)>) {
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                record_cells(&join(prefix, key), val, cells);
            }
        }
        Value::Array(arr) if arr.iter().any(Value::is_object) => {
            cells.push((prefix.to_string(), format!("[{} items]", arr.len())));
        }
        _ => cells.push((prefix.to_string(), format_value(value))),
    }
}

fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}.{key}")
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        _ => format_scalar(value, "null"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lists_split_from_fields() {
        let value = json!({
            "concentration": {"herfindahl": 0.25, "level": "low"},
            "sector_exposure": [{"sector": "Technology", "weight": 0.5, "tickers": ["AAPL", "MSFT"]}],
            "rebalance": []
        });
        let mut fields = Vec::new();
        let mut lists = Vec::new();
        collect("", &value, &mut fields, &mut lists);
        assert_eq!(fields[0], ("concentration.herfindahl".to_string(), "0.250000".to_string()));
        assert_eq!(fields[2], ("rebalance".to_string(), String::new()));
        assert_eq!(lists.len(), 1);
        assert_eq!(lists[0].0, "sector_exposure");

        let mut cells = Vec::new();
        record_cells("", &lists[0].1[0], &mut cells);
        assert_eq!(cells[1], ("tickers".to_string(), "AAPL, MSFT".to_string()));
    }
}
