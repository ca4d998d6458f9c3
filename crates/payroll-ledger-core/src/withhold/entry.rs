use chrono::{DateTime, Utc};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::error::PayrollError;
use crate::money::{is_rounded, round_money, MoneyGuard};
use crate::types::*;
use crate::PayrollResult;

// ---------------------------------------------------------------------------
// Key
// ---------------------------------------------------------------------------

/// Identity of a withhold entry: one employee, project, month and entry type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WithholdKey {
    pub employee_id: EmployeeId,
    pub project_name: String,
    pub month: u32,
    pub year: i32,
    pub entry_type: String,
}

impl WithholdKey {
    pub fn new(
        employee_id: impl Into<EmployeeId>,
        project_name: impl Into<String>,
        month: u32,
        year: i32,
        entry_type: impl Into<String>,
    ) -> Self {
        WithholdKey {
            employee_id: employee_id.into(),
            project_name: project_name.into(),
            month,
            year,
            entry_type: entry_type.into(),
        }
    }

    pub fn validate(&self) -> PayrollResult<()> {
        if self.employee_id.as_str().trim().is_empty() {
            return Err(PayrollError::invalid("employee_id", "Employee id is required"));
        }
        if self.project_name.trim().is_empty() {
            return Err(PayrollError::invalid("project_name", "Project name is required"));
        }
        if !(1..=12).contains(&self.month) {
            return Err(PayrollError::invalid(
                "month",
                format!("Month must be 1-12, got {}", self.month),
            ));
        }
        if !(1900..=9999).contains(&self.year) {
            return Err(PayrollError::invalid(
                "year",
                format!("Year {} is out of range", self.year),
            ));
        }
        if self.entry_type.trim().is_empty() {
            return Err(PayrollError::invalid("entry_type", "Entry type is required"));
        }
        Ok(())
    }

    /// Sort key: employee, then chronological, then project and type.
    pub(crate) fn ordering(&self) -> (&EmployeeId, i32, u32, &str, &str) {
        (
            &self.employee_id,
            self.year,
            self.month,
            &self.project_name,
            &self.entry_type,
        )
    }
}

impl fmt::Display for WithholdKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{:04}-{:02}/{}",
            self.employee_id, self.project_name, self.year, self.month, self.entry_type
        )
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithholdStatus {
    Open,
    PartiallyPaid,
    Settled,
}

impl WithholdStatus {
    /// Zero balance is settled, a balance strictly between zero and the
    /// actual amount is partially paid, anything else is open.
    pub fn derive(balance: Money, actual_amt: Money) -> Self {
        if balance.is_zero() {
            WithholdStatus::Settled
        } else if balance > dec!(0) && balance < actual_amt {
            WithholdStatus::PartiallyPaid
        } else {
            WithholdStatus::Open
        }
    }
}

impl fmt::Display for WithholdStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WithholdStatus::Open => "open",
            WithholdStatus::PartiallyPaid => "partially-paid",
            WithholdStatus::Settled => "settled",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for WithholdStatus {
    type Err = PayrollError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" => Ok(WithholdStatus::Open),
            "partially-paid" | "partially_paid" | "partial" => Ok(WithholdStatus::PartiallyPaid),
            "settled" => Ok(WithholdStatus::Settled),
            other => Err(PayrollError::invalid(
                "status",
                format!("Unknown withhold status '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusOverride {
    pub status: WithholdStatus,
    pub note: AuditNote,
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WithholdEntry {
    pub id: Uuid,
    pub key: WithholdKey,
    pub actual_hours: Hours,
    pub actual_rate: Rate,
    pub actual_amt: Money,
    pub paid_hours: Option<Hours>,
    pub paid_rate: Option<Rate>,
    /// Zero until the paid side is reported
    pub paid_amt: Money,
    pub balance: Money,
    /// Derived from `balance` and `actual_amt`
    pub status: WithholdStatus,
    #[serde(default)]
    pub status_override: Option<StatusOverride>,
    #[serde(default)]
    pub bill_rate: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WithholdEntry {
    pub(crate) fn open(key: WithholdKey) -> Self {
        let now = Utc::now();
        WithholdEntry {
            id: Uuid::new_v4(),
            key,
            actual_hours: dec!(0),
            actual_rate: dec!(0),
            actual_amt: dec!(0),
            paid_hours: None,
            paid_rate: None,
            paid_amt: dec!(0),
            balance: dec!(0),
            status: WithholdStatus::Settled,
            status_override: None,
            bill_rate: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Status as reported: the override if one is in force, else derived.
    pub fn effective_status(&self) -> WithholdStatus {
        self.status_override
            .as_ref()
            .map(|o| o.status)
            .unwrap_or(self.status)
    }

    pub(crate) fn recompute(&mut self, guard: &MoneyGuard) -> PayrollResult<()> {
        self.balance = guard.sub("balance", self.actual_amt, self.paid_amt)?;
        self.status = WithholdStatus::derive(self.balance, self.actual_amt);
        self.updated_at = Utc::now();
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Hours and rate reported for one side (actual or paid) of an entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HoursReport {
    pub key: WithholdKey,
    pub hours: Hours,
    pub rate: Rate,
    /// Amount as stated by the source document; defaults to `hours × rate`
    #[serde(default)]
    pub amount: Option<Money>,
    #[serde(default)]
    pub bill_rate: Option<String>,
}

impl HoursReport {
    pub fn new(key: WithholdKey, hours: Hours, rate: Rate) -> Self {
        HoursReport {
            key,
            hours,
            rate,
            amount: None,
            bill_rate: None,
        }
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }

    pub fn with_bill_rate(mut self, bill_rate: impl Into<String>) -> Self {
        self.bill_rate = Some(bill_rate.into());
        self
    }

    pub fn validate(&self) -> PayrollResult<()> {
        self.key.validate()?;
        if self.hours < dec!(0) {
            return Err(PayrollError::invalid("hours", "Hours cannot be negative"));
        }
        if self.rate < dec!(0) {
            return Err(PayrollError::invalid("rate", "Rate cannot be negative"));
        }
        if let Some(amount) = self.amount {
            if amount < dec!(0) {
                return Err(PayrollError::invalid("amount", "Amount cannot be negative"));
            }
            if !is_rounded(amount) {
                return Err(PayrollError::invalid("amount", "Amount must be in whole cents"));
            }
        }
        Ok(())
    }

    /// The amount to book: the stated amount if it agrees with
    /// `hours × rate` within `tolerance`, else the rounded product.
    pub fn resolve_amount(&self, guard: &MoneyGuard, tolerance: Money) -> PayrollResult<Money> {
        let expected = guard.mul("amount", self.hours, self.rate)?;
        match self.amount {
            None => Ok(round_money(expected)),
            Some(stated) => {
                let drift = (stated - expected).abs();
                if drift > tolerance {
                    return Err(PayrollError::invalid(
                        "amount",
                        format!(
                            "Amount {} disagrees with {} h × {} = {} by more than {}",
                            stated, self.hours, self.rate, expected, tolerance
                        ),
                    ));
                }
                Ok(stated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> WithholdKey {
        WithholdKey::new("E1", "ProjA", 6, 2024, "contract")
    }

    #[test]
    fn test_status_derivation() {
        assert_eq!(WithholdStatus::derive(dec!(0), dec!(8000)), WithholdStatus::Settled);
        assert_eq!(
            WithholdStatus::derive(dec!(500), dec!(8000)),
            WithholdStatus::PartiallyPaid
        );
        assert_eq!(WithholdStatus::derive(dec!(8000), dec!(8000)), WithholdStatus::Open);
        // Overpaid
        assert_eq!(WithholdStatus::derive(dec!(-20), dec!(8000)), WithholdStatus::Open);
    }

    #[test]
    fn test_key_validation() {
        assert!(key().validate().is_ok());
        let mut k = key();
        k.month = 13;
        match k.validate().unwrap_err() {
            PayrollError::InvalidInput { field, .. } => assert_eq!(field, "month"),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_key_display() {
        assert_eq!(key().to_string(), "E1/ProjA/2024-06/contract");
    }

    #[test]
    fn test_amount_within_tolerance_is_kept() {
        let guard = MoneyGuard::new(dec!(1_000_000_000));
        let report = HoursReport::new(key(), dec!(37.5), dec!(33.333)).with_amount(dec!(1250.00));
        // 37.5 × 33.333 = 1249.9875
        assert_eq!(report.resolve_amount(&guard, dec!(0.02)).unwrap(), dec!(1250.00));
        assert!(report.resolve_amount(&guard, dec!(0.001)).is_err());
    }

    #[test]
    fn test_amount_defaults_to_rounded_product() {
        let guard = MoneyGuard::new(dec!(1_000_000_000));
        let report = HoursReport::new(key(), dec!(37.5), dec!(33.333));
        assert_eq!(report.resolve_amount(&guard, dec!(0.01)).unwrap(), dec!(1249.99));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(
            "partially-paid".parse::<WithholdStatus>().unwrap(),
            WithholdStatus::PartiallyPaid
        );
        assert!("closed".parse::<WithholdStatus>().is_err());
    }
}
