use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::error::PayrollError;
use crate::money::{is_rounded, MoneyGuard};
use crate::payroll::period::PayrollPeriod;
use crate::tax::StatutoryTaxes;
use crate::types::*;
use crate::ytd::{PeriodContribution, YtdTotals};
use crate::PayrollResult;

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Federal, state and local withholding supplied by the tax-policy service,
/// already rounded to cents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionalTaxes {
    pub federal_tax: Money,
    pub state_tax: Money,
    pub local_tax: Money,
    #[serde(default)]
    pub state_tax_name: Option<String>,
}

impl JurisdictionalTaxes {
    pub fn validate(&self) -> PayrollResult<()> {
        for (field, value) in [
            ("federal_tax", self.federal_tax),
            ("state_tax", self.state_tax),
            ("local_tax", self.local_tax),
        ] {
            validate_amount(field, value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomDeduction {
    pub name: String,
    pub amount: Money,
}

/// Named deductions taken from gross pay after taxes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deductions {
    /// Standard deductions by name (health insurance, 401k, ...)
    #[serde(default)]
    pub other: BTreeMap<String, Money>,
    /// Employer-defined deductions, in the order they appear on the paystub
    #[serde(default)]
    pub custom: Vec<CustomDeduction>,
}

impl Deductions {
    pub fn validate(&self) -> PayrollResult<()> {
        for (name, amount) in &self.other {
            if name.trim().is_empty() {
                return Err(PayrollError::invalid("other_deductions", "Deduction name is empty"));
            }
            validate_amount(&format!("other_deductions.{name}"), *amount)?;
        }
        for (i, d) in self.custom.iter().enumerate() {
            if d.name.trim().is_empty() {
                return Err(PayrollError::invalid(
                    "custom_deductions",
                    format!("Custom deduction {} has no name", i + 1),
                ));
            }
            validate_amount(&format!("custom_deductions.{}", d.name), d.amount)?;
        }
        Ok(())
    }

    pub fn total(&self, guard: &MoneyGuard) -> PayrollResult<Money> {
        let other = guard.sum("other_deductions", self.other.values().copied())?;
        let custom = guard.sum("custom_deductions", self.custom.iter().map(|d| d.amount))?;
        guard.add("deductions", other, custom)
    }
}

fn validate_amount(field: &str, value: Money) -> PayrollResult<()> {
    if value < dec!(0) {
        return Err(PayrollError::invalid(field, "Amount cannot be negative"));
    }
    if !is_rounded(value) {
        return Err(PayrollError::invalid(field, "Amount must be in whole cents"));
    }
    Ok(())
}

/// Request to generate (or preview) the record for one pay period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratePayrollRequest {
    pub period: PayrollPeriod,
    pub gross_pay: Money,
    #[serde(default)]
    pub taxes: JurisdictionalTaxes,
    #[serde(default)]
    pub deductions: Deductions,
    #[serde(default)]
    pub fica_exempt: bool,
}

impl GeneratePayrollRequest {
    pub fn validate(&self) -> PayrollResult<()> {
        self.period.validate()?;
        if self.gross_pay < dec!(0) {
            return Err(PayrollError::invalid("gross_pay", "Gross pay cannot be negative"));
        }
        if !is_rounded(self.gross_pay) {
            return Err(PayrollError::invalid("gross_pay", "Gross pay must be in whole cents"));
        }
        self.taxes.validate()?;
        self.deductions.validate()
    }
}

/// Corrected inputs for an already generated period.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReissueRequest {
    pub gross_pay: Money,
    #[serde(default)]
    pub taxes: JurisdictionalTaxes,
    #[serde(default)]
    pub deductions: Deductions,
    #[serde(default)]
    pub fica_exempt: bool,
    pub reason: String,
    #[serde(default)]
    pub actor: Option<String>,
}

// ---------------------------------------------------------------------------
// Record
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Processed,
    Paid,
    Superseded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollRecord {
    pub id: Uuid,
    pub period: PayrollPeriod,
    pub gross_pay: Money,
    pub federal_tax: Money,
    pub state_tax: Money,
    pub state_tax_name: Option<String>,
    pub local_tax: Money,
    pub social_security: Money,
    pub medicare: Money,
    pub additional_medicare: Money,
    pub other_deductions: BTreeMap<String, Money>,
    pub custom_deductions: Vec<CustomDeduction>,
    pub total_taxes: Money,
    pub total_deductions: Money,
    pub net_pay: Money,
    pub fica_exempt: bool,
    /// Year-to-date gross including this period
    pub ytd_gross_pay: Money,
    /// Year-to-date net including this period
    pub ytd_net_pay: Money,
    pub check_number: Option<u64>,
    pub status: RecordStatus,
    pub supersedes: Option<Uuid>,
    pub superseded_by: Option<Uuid>,
    pub reissue_note: Option<AuditNote>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PayrollRecord {
    pub fn employee_id(&self) -> &EmployeeId {
        &self.period.employee_id
    }

    pub fn is_active(&self) -> bool {
        self.status != RecordStatus::Superseded
    }

    /// This record's contribution to the year-to-date row.
    pub fn contribution(&self) -> PeriodContribution {
        PeriodContribution {
            period: self.period.key(),
            pay_date: self.period.pay_date,
            totals: YtdTotals {
                gross_pay: self.gross_pay,
                net_pay: self.net_pay,
                federal_tax: self.federal_tax,
                state_tax: self.state_tax,
                local_tax: self.local_tax,
                social_security: self.social_security,
                medicare: self.medicare,
                additional_medicare: self.additional_medicare,
            },
        }
    }

    /// Whether `request` would produce this record again. `state_tax_name`
    /// is the name the request resolves to once the seed fallback applies.
    pub fn matches_request(
        &self,
        request: &GeneratePayrollRequest,
        state_tax_name: Option<&str>,
    ) -> bool {
        self.period == request.period
            && self.state_tax_name.as_deref() == state_tax_name
            && self.gross_pay == request.gross_pay
            && self.federal_tax == request.taxes.federal_tax
            && self.state_tax == request.taxes.state_tax
            && self.local_tax == request.taxes.local_tax
            && self.other_deductions == request.deductions.other
            && self.custom_deductions == request.deductions.custom
            && self.fica_exempt == request.fica_exempt
    }
}

// ---------------------------------------------------------------------------
// Net pay
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetPay {
    pub total_taxes: Money,
    pub total_deductions: Money,
    pub net_pay: Money,
}

/// `gross − (six taxes) − Σ other − Σ custom`, exact. Negative results are
/// returned as-is for the caller to reject.
pub fn compute_net_pay(
    gross_pay: Money,
    taxes: &JurisdictionalTaxes,
    statutory: &StatutoryTaxes,
    deductions: &Deductions,
    guard: &MoneyGuard,
) -> PayrollResult<NetPay> {
    let total_taxes = guard.sum(
        "total_taxes",
        [
            taxes.federal_tax,
            taxes.state_tax,
            taxes.local_tax,
            statutory.social_security,
            statutory.medicare,
            statutory.additional_medicare,
        ],
    )?;
    let total_deductions = deductions.total(guard)?;
    let withheld = guard.add("withheld", total_taxes, total_deductions)?;
    let net_pay: Decimal = guard.sub("net_pay", gross_pay, withheld)?;
    Ok(NetPay {
        total_taxes,
        total_deductions,
        net_pay,
    })
}
