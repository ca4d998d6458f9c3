use serde_json::Value;
use std::io;

use super::{primary, scalar};

/// Write output as CSV to stdout.
///
/// Lists become one row per element; single objects become field,value rows.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match primary(value) {
        Value::Array(rows) => write_rows(&mut wtr, rows),
        Value::Object(map) => {
            let _ = wtr.write_record(["field", "value"]);
            for (key, val) in map {
                let _ = wtr.write_record([key.as_str(), &scalar(val)]);
            }
        }
        other => {
            let _ = wtr.write_record([&scalar(other)]);
        }
    }

    let _ = wtr.flush();
}

fn write_rows<W: io::Write>(wtr: &mut csv::Writer<W>, rows: &[Value]) {
    let Some(Value::Object(first)) = rows.first() else {
        for row in rows {
            let _ = wtr.write_record([&scalar(row)]);
        }
        return;
    };

    let headers: Vec<&str> = first.keys().map(String::as_str).collect();
    let _ = wtr.write_record(&headers);
    for row in rows.iter().filter_map(Value::as_object) {
        let cells: Vec<String> = headers
            .iter()
            .map(|h| row.get(*h).map(scalar).unwrap_or_default())
            .collect();
        let _ = wtr.write_record(&cells);
    }
}
