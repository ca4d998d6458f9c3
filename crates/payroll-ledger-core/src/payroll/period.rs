use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PayrollError;
use crate::types::*;
use crate::ytd::PeriodKey;
use crate::PayrollResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayrollPeriod {
    pub employee_id: EmployeeId,
    pub pay_period_start: NaiveDate,
    pub pay_period_end: NaiveDate,
    pub pay_date: NaiveDate,
}

impl PayrollPeriod {
    pub fn new(
        employee_id: EmployeeId,
        pay_period_start: NaiveDate,
        pay_period_end: NaiveDate,
        pay_date: NaiveDate,
    ) -> PayrollResult<Self> {
        let period = PayrollPeriod {
            employee_id,
            pay_period_start,
            pay_period_end,
            pay_date,
        };
        period.validate()?;
        Ok(period)
    }

    /// `start <= end < pay_date`
    pub fn validate(&self) -> PayrollResult<()> {
        if self.employee_id.as_str().trim().is_empty() {
            return Err(PayrollError::invalid("employee_id", "Employee id is required"));
        }
        if self.pay_period_start > self.pay_period_end {
            return Err(PayrollError::invalid(
                "pay_period_start",
                format!(
                    "Period start {} is after period end {}",
                    self.pay_period_start, self.pay_period_end
                ),
            ));
        }
        if self.pay_date <= self.pay_period_end {
            return Err(PayrollError::invalid(
                "pay_date",
                format!(
                    "Pay date {} must fall after period end {}",
                    self.pay_date, self.pay_period_end
                ),
            ));
        }
        Ok(())
    }

    pub fn key(&self) -> PeriodKey {
        PeriodKey {
            start: self.pay_period_start,
            end: self.pay_period_end,
        }
    }

    /// Calendar year the period's pay counts toward.
    pub fn tax_year(&self) -> i32 {
        self.pay_date.year()
    }

    /// Work starts after January of the year it is paid in. A December
    /// period paid in January opens the new year.
    pub fn starts_mid_year(&self) -> bool {
        self.pay_period_start.year() == self.tax_year() && self.pay_period_start.month() > 1
    }

    /// Date ranges intersect (both ends inclusive).
    pub fn overlaps(&self, other: &PayrollPeriod) -> bool {
        self.pay_period_start <= other.pay_period_end
            && other.pay_period_start <= self.pay_period_end
    }
}

impl fmt::Display for PayrollPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}..{} (paid {})",
            self.pay_period_start, self.pay_period_end, self.pay_date
        )
    }
}
