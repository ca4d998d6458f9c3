pub mod concurrency;
pub mod config;
pub mod error;
pub mod memory;
pub mod money;
pub mod notify;
pub mod store;
pub mod tax;
pub mod types;
pub mod ytd;

#[cfg(feature = "payroll")]
pub mod payroll;

#[cfg(feature = "withhold")]
pub mod withhold;

pub use config::{PayrollConfig, StatutoryRates};
pub use error::PayrollError;
pub use types::*;

/// Standard result type for all payroll ledger operations
pub type PayrollResult<T> = Result<T, PayrollError>;
