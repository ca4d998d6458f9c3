use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// All monetary values. Wraps Decimal to prevent accidental f64 usage.
pub type Money = Decimal;

/// Rates expressed as decimals (0.062 = 6.2%). Never as percentages.
pub type Rate = Decimal;

/// Reported hours on a withhold entry
pub type Hours = Decimal;

/// Company identifier as issued by the employee directory
pub type CompanyId = u32;

/// Employee identifier as issued by the HR system
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EmployeeId(pub String);

impl EmployeeId {
    pub fn new(id: impl Into<String>) -> Self {
        EmployeeId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EmployeeId {
    fn from(s: &str) -> Self {
        EmployeeId(s.to_string())
    }
}

/// Who forced a change outside the normal flow, when, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditNote {
    pub reason: String,
    pub actor: Option<String>,
    pub at: DateTime<Utc>,
}

impl AuditNote {
    pub fn now(reason: impl Into<String>, actor: Option<String>) -> Self {
        AuditNote {
            reason: reason.into(),
            actor,
            at: Utc::now(),
        }
    }
}

/// Page request for listing queries. Pages are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub size: usize,
}

/// One page of an ordered result set
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub size: usize,
    pub total: usize,
}

impl<T> Page<T> {
    /// Slice an already-ordered collection into the requested page.
    pub fn from_sorted(all: Vec<T>, request: Option<PageRequest>) -> Self {
        let total = all.len();
        match request {
            None => Page {
                items: all,
                page: 0,
                size: total,
                total,
            },
            Some(req) => {
                let items = all
                    .into_iter()
                    .skip(req.page.saturating_mul(req.size))
                    .take(req.size)
                    .collect();
                Page {
                    items,
                    page: req.page,
                    size: req.size,
                    total,
                }
            }
        }
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "rust_decimal_128bit".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_slicing() {
        let all: Vec<u32> = (0..7).collect();
        let page = Page::from_sorted(all, Some(PageRequest { page: 1, size: 3 }));
        assert_eq!(page.items, vec![3, 4, 5]);
        assert_eq!(page.total, 7);
    }

    #[test]
    fn test_unpaged_returns_everything() {
        let page = Page::from_sorted(vec!["a", "b"], None);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.size, 2);
    }

    #[test]
    fn test_employee_id_serializes_transparently() {
        let id = EmployeeId::new("EMP-7");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"EMP-7\"");
    }
}
