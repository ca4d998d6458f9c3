use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PayrollError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Overflow in {context}: magnitude {value} exceeds ceiling {ceiling}")]
    Overflow {
        context: String,
        value: String,
        ceiling: Decimal,
    },

    #[error("Duplicate period: {period} already applied for employee {employee_id}")]
    DuplicatePeriod { employee_id: String, period: String },

    #[error("Overlapping period: {period} overlaps {existing} for employee {employee_id}")]
    OverlappingPeriod {
        employee_id: String,
        period: String,
        existing: String,
    },

    #[error("Insufficient gross pay for employee {employee_id} in {period}: net pay would be {net_pay}")]
    InsufficientGrossPay {
        employee_id: String,
        period: String,
        net_pay: Decimal,
    },

    #[error("Not found: {entity} {key}")]
    NotFound { entity: String, key: String },

    #[error("Concurrency conflict on {key} after {attempts} attempt(s)")]
    ConcurrencyConflict { key: String, attempts: u32 },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl PayrollError {
    pub(crate) fn invalid(field: &str, reason: impl Into<String>) -> Self {
        PayrollError::InvalidInput {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(entity: &str, key: impl ToString) -> Self {
        PayrollError::NotFound {
            entity: entity.to_string(),
            key: key.to_string(),
        }
    }

    /// Lock contention or isolation failure; safe to re-run the operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PayrollError::ConcurrencyConflict { .. })
    }

    /// Rejected before any mutation; the caller can resubmit corrected input.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            PayrollError::InvalidInput { .. }
                | PayrollError::Overflow { .. }
                | PayrollError::OverlappingPeriod { .. }
        )
    }
}

impl From<serde_json::Error> for PayrollError {
    fn from(e: serde_json::Error) -> Self {
        PayrollError::SerializationError(e.to_string())
    }
}
