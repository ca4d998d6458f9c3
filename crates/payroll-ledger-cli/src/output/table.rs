use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

use super::{page_summary, scalar};

/// Format output as tables using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_envelope(result, map);
            } else if let Some(record) = map.get("record") {
                print_outcome(record, map);
            } else if let Some(Value::Array(items)) = map.get("items") {
                print_rows(items);
                if let Some(summary) = page_summary(map) {
                    println!("{}", summary);
                }
            } else {
                print_fields(map);
            }
        }
        Value::Array(rows) => print_rows(rows),
        _ => println!("{}", scalar(value)),
    }
}

fn print_envelope(result: &Value, envelope: &Map<String, Value>) {
    match result {
        Value::Object(fields) => print_fields(fields),
        other => print_table(other),
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

/// Generate/reissue: the record, then the YTD row it produced.
fn print_outcome(record: &Value, outcome: &Map<String, Value>) {
    if let Value::Object(fields) = record {
        print_fields(fields);
    }
    if let Some(Value::Object(ytd)) = outcome.get("ytd") {
        println!("\nYear to date:");
        match ytd.get("totals") {
            Some(Value::Object(totals)) => print_fields(totals),
            _ => print_fields(ytd),
        }
    }
    if outcome.get("replayed").and_then(Value::as_bool) == Some(true) {
        println!("\n(period already generated; existing record returned)");
    }
}

fn print_fields(map: &Map<String, Value>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    for (key, val) in map {
        builder.push_record([key.as_str(), &cell(val)]);
    }
    println!("{}", Table::from(builder));
}

fn print_rows(rows: &[Value]) {
    let Some(Value::Object(first)) = rows.first() else {
        if rows.is_empty() {
            println!("(no rows)");
        }
        for row in rows {
            println!("{}", cell(row));
        }
        return;
    };

    let headers: Vec<String> = flatten(first).into_iter().map(|(k, _)| k).collect();
    let mut builder = Builder::default();
    builder.push_record(&headers);
    for row in rows.iter().filter_map(Value::as_object) {
        let cells = flatten(row);
        builder.push_record(headers.iter().map(|h| {
            cells
                .iter()
                .find(|(k, _)| k == h)
                .map(|(_, v)| cell(v))
                .unwrap_or_default()
        }));
    }
    println!("{}", Table::from(builder));
}

/// Nested objects (a record's period, an entry's key) become dotted columns.
fn flatten(row: &Map<String, Value>) -> Vec<(String, &Value)> {
    let mut cols = Vec::new();
    for (key, val) in row {
        match val {
            Value::Object(inner) if !inner.is_empty() => {
                for (sub, v) in inner {
                    cols.push((format!("{key}.{sub}"), v));
                }
            }
            _ => cols.push((key.clone(), val)),
        }
    }
    cols
}

fn cell(value: &Value) -> String {
    match value {
        Value::Array(items) => items.iter().map(cell).collect::<Vec<_>>().join(", "),
        Value::Object(map) if map.is_empty() => String::new(),
        other => scalar(other),
    }
}
