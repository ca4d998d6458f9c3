pub mod csv_out;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::{Map, Value};

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("JSON serialization error: {}", e),
        },
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// The part of a command's output a flat formatter should show.
///
/// Computation envelopes carry it under `result`, generate and reissue under
/// `record`, and paged listings under `items`.
pub(crate) fn primary(value: &Value) -> &Value {
    match value {
        Value::Object(map) => ["result", "record", "items"]
            .iter()
            .find_map(|k| map.get(*k))
            .unwrap_or(value),
        _ => value,
    }
}

/// Page footer for `{items, page, size, total}` listings.
pub(crate) fn page_summary(map: &Map<String, Value>) -> Option<String> {
    let total = map.get("total")?.as_u64()?;
    let page = map.get("page")?.as_u64()?;
    let size = map.get("size")?.as_u64()?;
    let shown = map.get("items")?.as_array()?.len();
    Some(format!("page {page} (size {size}): {shown} of {total} rows"))
}

pub(crate) fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}
