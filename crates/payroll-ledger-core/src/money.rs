//! Fixed-point money arithmetic.
//!
//! Every amount the engine computes passes through [`round_money`] exactly
//! once, at the point it is computed. Stored amounts are never re-rounded on
//! read. Arithmetic goes through [`MoneyGuard`], which rejects any
//! intermediate whose magnitude exceeds the configured ceiling.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::error::PayrollError;
use crate::types::*;
use crate::PayrollResult;

/// Cents.
pub const MONEY_SCALE: u32 = 2;

/// Round half away from zero to cents.
pub fn round_money(value: Decimal) -> Money {
    value.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// True when the value carries no precision beyond cents.
pub fn is_rounded(value: Decimal) -> bool {
    round_money(value) == value
}

/// Division with an explicit result scale and rounding strategy.
pub fn divide(
    numerator: Decimal,
    denominator: Decimal,
    scale: u32,
    strategy: RoundingStrategy,
) -> PayrollResult<Decimal> {
    if denominator.is_zero() {
        return Err(PayrollError::invalid("denominator", "Division by zero"));
    }
    let quotient = numerator.checked_div(denominator).ok_or_else(|| {
        PayrollError::Overflow {
            context: "division".to_string(),
            value: format!("{numerator} / {denominator}"),
            ceiling: Decimal::MAX,
        }
    })?;
    Ok(quotient.round_dp_with_strategy(scale, strategy))
}

/// Magnitude ceiling applied to every money-bearing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoneyGuard {
    pub ceiling: Money,
}

impl MoneyGuard {
    pub fn new(ceiling: Money) -> Self {
        MoneyGuard { ceiling }
    }

    pub fn check(&self, context: &str, value: Decimal) -> PayrollResult<Decimal> {
        if value.abs() > self.ceiling {
            return Err(PayrollError::Overflow {
                context: context.to_string(),
                value: value.to_string(),
                ceiling: self.ceiling,
            });
        }
        Ok(value)
    }

    pub fn add(&self, context: &str, a: Decimal, b: Decimal) -> PayrollResult<Decimal> {
        let sum = a
            .checked_add(b)
            .ok_or_else(|| self.overflowed(context, format!("{a} + {b}")))?;
        self.check(context, sum)
    }

    pub fn sub(&self, context: &str, a: Decimal, b: Decimal) -> PayrollResult<Decimal> {
        let diff = a
            .checked_sub(b)
            .ok_or_else(|| self.overflowed(context, format!("{a} - {b}")))?;
        self.check(context, diff)
    }

    pub fn mul(&self, context: &str, a: Decimal, b: Decimal) -> PayrollResult<Decimal> {
        let product = a
            .checked_mul(b)
            .ok_or_else(|| self.overflowed(context, format!("{a} * {b}")))?;
        self.check(context, product)
    }

    pub fn sum<I>(&self, context: &str, values: I) -> PayrollResult<Decimal>
    where
        I: IntoIterator<Item = Decimal>,
    {
        values
            .into_iter()
            .try_fold(Decimal::ZERO, |acc, v| self.add(context, acc, v))
    }

    fn overflowed(&self, context: &str, value: String) -> PayrollError {
        PayrollError::Overflow {
            context: context.to_string(),
            value,
            ceiling: self.ceiling,
        }
    }
}
