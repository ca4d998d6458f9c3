//! Boundaries to the persistence and employee-directory collaborators.
//!
//! Implementations must make each single-row write atomic. Serialization of
//! read-modify-write sequences is the engine's job (see `concurrency`); a
//! store that detects an isolation failure reports it as
//! `PayrollError::ConcurrencyConflict` and the caller retries.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::*;
use crate::ytd::{PreviousMonthTax, YtdRecord};
use crate::PayrollResult;

#[cfg(feature = "payroll")]
use crate::payroll::PayrollRecord;
#[cfg(feature = "payroll")]
use uuid::Uuid;

#[cfg(feature = "withhold")]
use crate::withhold::{WithholdEntry, WithholdKey};

/// Year-to-date rows and their seed records.
pub trait YtdStore: Send + Sync {
    fn find_by_employee_and_year(
        &self,
        employee_id: &EmployeeId,
        year: i32,
    ) -> PayrollResult<Option<YtdRecord>>;

    /// Insert or replace the row for `(employee_id, year)`.
    fn save_ytd(&self, row: &YtdRecord) -> PayrollResult<()>;

    fn insert_seed(&self, seed: &PreviousMonthTax) -> PayrollResult<()>;

    fn seeds_for_employee(&self, employee_id: &EmployeeId)
        -> PayrollResult<Vec<PreviousMonthTax>>;
}

/// Payroll records. Lookups that return a single record consider only
/// records that have not been superseded.
#[cfg(feature = "payroll")]
pub trait RecordStore: YtdStore {
    fn insert_record(&self, record: &PayrollRecord) -> PayrollResult<()>;

    fn update_record(&self, record: &PayrollRecord) -> PayrollResult<()>;

    fn find_record(&self, id: Uuid) -> PayrollResult<Option<PayrollRecord>>;

    /// Every record for the employee, superseded ones included, in no particular order.
    fn records_for_employee(&self, employee_id: &EmployeeId) -> PayrollResult<Vec<PayrollRecord>>;

    /// Active record with the latest pay date.
    fn find_latest_by_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> PayrollResult<Option<PayrollRecord>>;

    /// Active record with the latest `pay_period_end` strictly before `date`.
    fn find_before_date(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> PayrollResult<Option<PayrollRecord>>;

    /// Issue the next check number for a company. Numbers start at 1 and never repeat.
    fn next_check_number(&self, company_id: CompanyId) -> PayrollResult<u64>;
}

/// Withhold ledger entries keyed by `(employee, project, month, year, type)`.
#[cfg(feature = "withhold")]
pub trait WithholdStore: Send + Sync {
    fn find_by_ledger_key(&self, key: &WithholdKey) -> PayrollResult<Option<WithholdEntry>>;

    /// Insert or replace the entry for `entry.key`.
    fn save_withhold(&self, entry: &WithholdEntry) -> PayrollResult<()>;

    fn withhold_for_employees(
        &self,
        employee_ids: &[EmployeeId],
    ) -> PayrollResult<Vec<WithholdEntry>>;

    fn all_withhold(&self) -> PayrollResult<Vec<WithholdEntry>>;
}

/// Employee as known to the HR directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeProfile {
    pub employee_id: EmployeeId,
    pub first_name: String,
    pub last_name: String,
    pub company_id: Option<CompanyId>,
    pub company_name: Option<String>,
}

pub trait EmployeeDirectory: Send + Sync {
    fn profile(&self, employee_id: &EmployeeId) -> PayrollResult<Option<EmployeeProfile>>;

    fn employees_in_company(&self, company_id: CompanyId) -> PayrollResult<Vec<EmployeeProfile>>;

    fn all_employees(&self) -> PayrollResult<Vec<EmployeeProfile>>;
}
