use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::config::StatutoryRates;
use crate::error::PayrollError;
use crate::money::{round_money, MoneyGuard};
use crate::types::*;
use crate::PayrollResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatutoryTaxInput {
    /// Gross pay for this period only
    pub gross_pay: Money,
    /// Cumulative gross for the calendar year before this period
    pub ytd_gross_before: Money,
    /// FICA-exempt employees (e.g. nonresident visa holders) owe none of these taxes
    #[serde(default)]
    pub fica_exempt: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatutoryTaxes {
    pub social_security: Money,
    pub medicare: Money,
    pub additional_medicare: Money,
    /// Portion of this period's gross below the wage base
    pub social_security_wages: Money,
    /// Portion of this period's gross above the Additional Medicare threshold
    pub additional_medicare_wages: Money,
}

impl StatutoryTaxes {
    pub fn zero() -> Self {
        StatutoryTaxes {
            social_security: Decimal::ZERO,
            medicare: Decimal::ZERO,
            additional_medicare: Decimal::ZERO,
            social_security_wages: Decimal::ZERO,
            additional_medicare_wages: Decimal::ZERO,
        }
    }

    pub fn total(&self) -> Money {
        self.social_security + self.medicare + self.additional_medicare
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

/// Social Security, Medicare and Additional Medicare for a single period.
///
/// The capped taxes are computed as the difference between the rounded
/// cumulative liability after and before the period. Before rounding this is
/// exactly `min(gross, max(0, cap - ytd)) × rate` and the threshold-crossing
/// formula for Additional Medicare; after rounding the per-period amounts sum
/// to the rounded annual liability, so a year never drifts past the cap.
#[derive(Debug, Clone)]
pub struct TaxCalculator {
    rates: StatutoryRates,
    guard: MoneyGuard,
}

impl TaxCalculator {
    pub fn new(rates: StatutoryRates, guard: MoneyGuard) -> Self {
        TaxCalculator { rates, guard }
    }

    pub fn rates(&self) -> &StatutoryRates {
        &self.rates
    }

    pub fn compute(&self, input: &StatutoryTaxInput) -> PayrollResult<StatutoryTaxes> {
        if input.gross_pay < dec!(0) {
            return Err(PayrollError::invalid(
                "gross_pay",
                "Gross pay cannot be negative",
            ));
        }
        if input.ytd_gross_before < dec!(0) {
            return Err(PayrollError::invalid(
                "ytd_gross_before",
                "Year-to-date gross cannot be negative",
            ));
        }
        let g = &self.guard;
        g.check("gross_pay", input.gross_pay)?;
        let before = g.check("ytd_gross_before", input.ytd_gross_before)?;
        let after = g.add("ytd_gross_after", before, input.gross_pay)?;

        if input.fica_exempt {
            return Ok(StatutoryTaxes::zero());
        }

        let r = &self.rates;

        // Social Security: capped at the annual wage base
        let cap = r.social_security_wage_base;
        let ss_before = round_money(g.mul("social_security", before.min(cap), r.social_security_rate)?);
        let ss_after = round_money(g.mul("social_security", after.min(cap), r.social_security_rate)?);
        let social_security = ss_after - ss_before;
        let social_security_wages = input.gross_pay.min((cap - before).max(dec!(0)));

        // Medicare: uncapped
        let medicare = round_money(g.mul("medicare", input.gross_pay, r.medicare_rate)?);

        // Additional Medicare: only the slice of this period above the threshold
        let threshold = r.additional_medicare_threshold;
        let excess_before = (before - threshold).max(dec!(0));
        let excess_after = (after - threshold).max(dec!(0));
        let am_before = round_money(g.mul(
            "additional_medicare",
            excess_before,
            r.additional_medicare_rate,
        )?);
        let am_after = round_money(g.mul(
            "additional_medicare",
            excess_after,
            r.additional_medicare_rate,
        )?);

        Ok(StatutoryTaxes {
            social_security,
            medicare,
            additional_medicare: am_after - am_before,
            social_security_wages,
            additional_medicare_wages: excess_after - excess_before,
        })
    }

    /// [`compute`](Self::compute) wrapped in the standard computation envelope.
    pub fn calculate(
        &self,
        input: &StatutoryTaxInput,
    ) -> PayrollResult<ComputationOutput<StatutoryTaxes>> {
        let start = Instant::now();
        let mut warnings: Vec<String> = Vec::new();

        let result = self.compute(input)?;
        let r = &self.rates;
        let after = input.ytd_gross_before + input.gross_pay;

        if input.fica_exempt {
            warnings.push("Employee is FICA-exempt; statutory taxes are zero.".to_string());
        } else {
            if input.ytd_gross_before >= r.social_security_wage_base {
                warnings.push(
                    "Social Security wage base already reached; no Social Security withheld."
                        .to_string(),
                );
            } else if after > r.social_security_wage_base {
                warnings.push(format!(
                    "Social Security wage base reached this period; only {} of {} is taxable.",
                    result.social_security_wages, input.gross_pay
                ));
            }
            if input.ytd_gross_before <= r.additional_medicare_threshold
                && after > r.additional_medicare_threshold
            {
                warnings.push(format!(
                    "Additional Medicare threshold crossed this period; {} is subject to the surtax.",
                    result.additional_medicare_wages
                ));
            }
        }

        let assumptions = serde_json::json!({
            "gross_pay": input.gross_pay.to_string(),
            "ytd_gross_before": input.ytd_gross_before.to_string(),
            "fica_exempt": input.fica_exempt,
            "social_security_rate": r.social_security_rate.to_string(),
            "social_security_wage_base": r.social_security_wage_base.to_string(),
            "medicare_rate": r.medicare_rate.to_string(),
            "additional_medicare_rate": r.additional_medicare_rate.to_string(),
            "additional_medicare_threshold": r.additional_medicare_threshold.to_string(),
            "rounding": "half away from zero, cents",
        });

        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata(
            "Statutory FICA withholding from pre-period year-to-date gross",
            &assumptions,
            warnings,
            elapsed,
            result,
        ))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
