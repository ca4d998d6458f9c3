use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::PayrollError;
use crate::money::{is_rounded, MoneyGuard};
use crate::types::*;
use crate::PayrollResult;

// ---------------------------------------------------------------------------
// Totals
// ---------------------------------------------------------------------------

/// Cumulative or per-period pay and withholding totals.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct YtdTotals {
    pub gross_pay: Money,
    pub net_pay: Money,
    pub federal_tax: Money,
    pub state_tax: Money,
    pub local_tax: Money,
    pub social_security: Money,
    pub medicare: Money,
    #[serde(default)]
    pub additional_medicare: Money,
}

impl YtdTotals {
    pub fn zero() -> Self {
        Self::default()
    }

    fn fields(&self) -> [(&'static str, Money); 8] {
        [
            ("gross_pay", self.gross_pay),
            ("net_pay", self.net_pay),
            ("federal_tax", self.federal_tax),
            ("state_tax", self.state_tax),
            ("local_tax", self.local_tax),
            ("social_security", self.social_security),
            ("medicare", self.medicare),
            ("additional_medicare", self.additional_medicare),
        ]
    }

    fn combine(
        &self,
        other: &YtdTotals,
        guard: &MoneyGuard,
        op: fn(&MoneyGuard, &str, Decimal, Decimal) -> PayrollResult<Decimal>,
    ) -> PayrollResult<YtdTotals> {
        Ok(YtdTotals {
            gross_pay: op(guard, "ytd.gross_pay", self.gross_pay, other.gross_pay)?,
            net_pay: op(guard, "ytd.net_pay", self.net_pay, other.net_pay)?,
            federal_tax: op(guard, "ytd.federal_tax", self.federal_tax, other.federal_tax)?,
            state_tax: op(guard, "ytd.state_tax", self.state_tax, other.state_tax)?,
            local_tax: op(guard, "ytd.local_tax", self.local_tax, other.local_tax)?,
            social_security: op(
                guard,
                "ytd.social_security",
                self.social_security,
                other.social_security,
            )?,
            medicare: op(guard, "ytd.medicare", self.medicare, other.medicare)?,
            additional_medicare: op(
                guard,
                "ytd.additional_medicare",
                self.additional_medicare,
                other.additional_medicare,
            )?,
        })
    }

    pub fn checked_add(&self, other: &YtdTotals, guard: &MoneyGuard) -> PayrollResult<YtdTotals> {
        self.combine(other, guard, MoneyGuard::add)
    }

    pub fn checked_sub(&self, other: &YtdTotals, guard: &MoneyGuard) -> PayrollResult<YtdTotals> {
        self.combine(other, guard, MoneyGuard::sub)
    }

    /// Every field non-negative and expressed in whole cents.
    pub fn validate_contribution(&self) -> PayrollResult<()> {
        for (field, value) in self.fields() {
            if value < dec!(0) {
                return Err(PayrollError::invalid(field, "Contribution cannot be negative"));
            }
            if !is_rounded(value) {
                return Err(PayrollError::invalid(field, "Contribution must be in whole cents"));
            }
        }
        Ok(())
    }

    /// Medicare including the Additional Medicare surtax
    pub fn medicare_total(&self) -> Money {
        self.medicare + self.additional_medicare
    }
}

// ---------------------------------------------------------------------------
// Period identity
// ---------------------------------------------------------------------------

/// Identity of a pay period within one employee's timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PeriodKey {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// One period's contribution to the cumulative row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodContribution {
    pub period: PeriodKey,
    pub pay_date: NaiveDate,
    pub totals: YtdTotals,
}

// ---------------------------------------------------------------------------
// Stored row
// ---------------------------------------------------------------------------

/// Cumulative row for one employee and calendar year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct YtdRecord {
    pub employee_id: EmployeeId,
    pub year: i32,
    pub totals: YtdTotals,
    /// Starting point carried from a seed record, zero otherwise
    pub opening: YtdTotals,
    pub pay_periods_count: u32,
    pub last_pay_date: Option<NaiveDate>,
    /// Contributions already folded into `totals`, by period
    pub applied: Vec<PeriodContribution>,
}

impl YtdRecord {
    pub fn open(employee_id: EmployeeId, year: i32, opening: YtdTotals) -> Self {
        YtdRecord {
            employee_id,
            year,
            totals: opening.clone(),
            opening,
            pay_periods_count: 0,
            last_pay_date: None,
            applied: Vec::new(),
        }
    }

    pub fn applied_for(&self, period: &PeriodKey) -> Option<&PeriodContribution> {
        self.applied.iter().find(|c| &c.period == period)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YtdSource {
    /// Read from the cumulative row
    Ledger,
    /// No row yet; started from a seed record
    Seed,
    /// No row and no seed
    Zero,
}

/// Cumulative totals as of a point in an employee's year.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct YtdSnapshot {
    pub employee_id: EmployeeId,
    pub year: i32,
    pub totals: YtdTotals,
    pub source: YtdSource,
    pub pay_periods_count: u32,
    pub last_pay_date: Option<NaiveDate>,
}

impl YtdSnapshot {
    pub fn from_record(row: &YtdRecord) -> Self {
        YtdSnapshot {
            employee_id: row.employee_id.clone(),
            year: row.year,
            totals: row.totals.clone(),
            source: YtdSource::Ledger,
            pay_periods_count: row.pay_periods_count,
            last_pay_date: row.last_pay_date,
        }
    }
}

// ---------------------------------------------------------------------------
// Seed record
// ---------------------------------------------------------------------------

/// Cumulative withholding imported from a prior payroll system.
///
/// Amounts are year-to-date as of `period_end`. Seeds are immutable once
/// stored and only consulted while the employee has no row for the year.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviousMonthTax {
    pub employee_id: EmployeeId,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub federal_tax_withheld: Money,
    pub state_tax_withheld: Money,
    pub state_tax_name: Option<String>,
    pub local_tax_withheld: Money,
    pub social_security_withheld: Money,
    pub medicare_withheld: Money,
    pub total_gross_pay: Money,
    pub total_net_pay: Money,
    pub h1b_wage: Option<Money>,
    pub h1b_prevailing_wage: Option<Money>,
    #[serde(default)]
    pub additional_fields: BTreeMap<String, serde_json::Value>,
}

impl PreviousMonthTax {
    pub fn year(&self) -> i32 {
        self.period_end.year()
    }

    pub fn validate(&self) -> PayrollResult<()> {
        if self.period_start > self.period_end {
            return Err(PayrollError::invalid(
                "period_start",
                "Seed period start must not be after its end",
            ));
        }
        self.to_totals().validate_contribution()?;
        for (field, value) in [
            ("h1b_wage", self.h1b_wage),
            ("h1b_prevailing_wage", self.h1b_prevailing_wage),
        ] {
            if matches!(value, Some(v) if v < dec!(0)) {
                return Err(PayrollError::invalid(field, "Wage cannot be negative"));
            }
        }
        Ok(())
    }

    pub fn to_totals(&self) -> YtdTotals {
        YtdTotals {
            gross_pay: self.total_gross_pay,
            net_pay: self.total_net_pay,
            federal_tax: self.federal_tax_withheld,
            state_tax: self.state_tax_withheld,
            local_tax: self.local_tax_withheld,
            social_security: self.social_security_withheld,
            medicare: self.medicare_withheld,
            additional_medicare: Decimal::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn totals(gross: Money) -> YtdTotals {
        YtdTotals {
            gross_pay: gross,
            net_pay: gross * dec!(0.7),
            ..YtdTotals::zero()
        }
    }

    #[test]
    fn test_checked_add_and_sub_are_inverse() {
        let guard = MoneyGuard::new(dec!(1_000_000));
        let a = totals(dec!(1000));
        let b = totals(dec!(250));
        let sum = a.checked_add(&b, &guard).unwrap();
        assert_eq!(sum.gross_pay, dec!(1250));
        assert_eq!(sum.checked_sub(&b, &guard).unwrap(), a);
    }

    #[test]
    fn test_checked_add_respects_ceiling() {
        let guard = MoneyGuard::new(dec!(1000));
        assert!(totals(dec!(900)).checked_add(&totals(dec!(200)), &guard).is_err());
    }

    #[test]
    fn test_negative_contribution_rejected() {
        let mut t = totals(dec!(100));
        t.state_tax = dec!(-1);
        match t.validate_contribution().unwrap_err() {
            PayrollError::InvalidInput { field, .. } => assert_eq!(field, "state_tax"),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_seed_year_is_period_end_year() {
        let seed = PreviousMonthTax {
            employee_id: EmployeeId::new("E1"),
            period_start: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            period_end: NaiveDate::from_ymd_opt(2024, 5, 31).unwrap(),
            federal_tax_withheld: dec!(4000),
            state_tax_withheld: dec!(1000),
            state_tax_name: Some("VA".to_string()),
            local_tax_withheld: dec!(0),
            social_security_withheld: dec!(2480),
            medicare_withheld: dec!(580),
            total_gross_pay: dec!(40000),
            total_net_pay: dec!(31940),
            h1b_wage: None,
            h1b_prevailing_wage: None,
            additional_fields: BTreeMap::new(),
        };
        assert_eq!(seed.year(), 2024);
        assert!(seed.validate().is_ok());
        assert_eq!(seed.to_totals().gross_pay, dec!(40000));
        assert_eq!(seed.to_totals().medicare_total(), dec!(580));
    }
}
