use serde_json::Value;

use super::{primary, scalar};

/// The headline figure of each kind of output, in order of preference.
const HEADLINE_KEYS: [&str; 8] = [
    "net_pay",
    "total_balance",
    "balance",
    "social_security",
    "gross_pay",
    "total",
    "reapplied",
    "version",
];

/// Print just the key answer value from the output.
pub fn print_minimal(value: &Value) {
    println!("{}", headline(value));
}

fn headline(value: &Value) -> String {
    let section = primary(value);

    if let Value::Object(map) = section {
        if let Some(val) = HEADLINE_KEYS
            .iter()
            .filter_map(|k| map.get(*k))
            .find(|v| !v.is_null())
        {
            return scalar(val);
        }
        // YTD snapshots nest their figures under `totals`
        if let Some(totals @ Value::Object(_)) = map.get("totals") {
            return headline(totals);
        }
        if let Some((key, val)) = map.iter().next() {
            return format!("{}: {}", key, scalar(val));
        }
    }

    // Lists print one headline per row
    if let Value::Array(rows) = section {
        return rows.iter().map(headline).collect::<Vec<_>>().join("\n");
    }

    scalar(section)
}
