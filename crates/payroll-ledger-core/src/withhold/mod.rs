pub mod entry;
pub mod ledger;

pub use entry::{HoursReport, StatusOverride, WithholdEntry, WithholdKey, WithholdStatus};
pub use ledger::{CompanyBalance, EmployeeWithholdRow, WithholdFilter, WithholdLedger};
