pub mod employees;
pub mod payroll;
pub mod taxes;
pub mod withhold;

use payroll_ledger_core::PageRequest;
use rust_decimal::Decimal;

/// Parse a `name=amount` pair such as `healthInsurance=120.00`.
pub fn parse_named_amount(s: &str) -> Result<(String, Decimal), String> {
    let (name, amount) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=AMOUNT, got '{s}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(format!("missing deduction name in '{s}'"));
    }
    let amount = amount
        .trim()
        .parse::<Decimal>()
        .map_err(|e| format!("invalid amount in '{s}': {e}"))?;
    Ok((name.to_string(), amount))
}

/// `--page` and `--size` together make a page request; `--size` alone means page 0.
pub fn page_request(page: Option<usize>, size: Option<usize>) -> Result<Option<PageRequest>, String> {
    match (page, size) {
        (None, None) => Ok(None),
        (_, Some(0)) => Err("--size must be at least 1".to_string()),
        (page, Some(size)) => Ok(Some(PageRequest {
            page: page.unwrap_or(0),
            size,
        })),
        (Some(_), None) => Err("--page requires --size".to_string()),
    }
}
