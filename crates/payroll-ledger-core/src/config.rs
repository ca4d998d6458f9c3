use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PayrollError;
use crate::money::MoneyGuard;
use crate::types::*;
use crate::PayrollResult;

/// Statutory payroll tax constants owned by this engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatutoryRates {
    pub social_security_rate: Rate,
    /// Annual Social Security wage base
    pub social_security_wage_base: Money,
    pub medicare_rate: Rate,
    pub additional_medicare_rate: Rate,
    /// Annual wages above which Additional Medicare applies (filing-status independent)
    pub additional_medicare_threshold: Money,
}

impl StatutoryRates {
    /// Published FICA constants for the supported tax years.
    pub fn published(tax_year: i32) -> Option<Self> {
        let wage_base = match tax_year {
            2023 => dec!(160_200),
            2024 => dec!(168_600),
            2025 => dec!(176_100),
            _ => return None,
        };
        Some(StatutoryRates {
            social_security_rate: dec!(0.062),
            social_security_wage_base: wage_base,
            medicare_rate: dec!(0.0145),
            additional_medicare_rate: dec!(0.009),
            additional_medicare_threshold: dec!(200_000),
        })
    }

    fn validate(&self) -> PayrollResult<()> {
        for (field, rate) in [
            ("social_security_rate", self.social_security_rate),
            ("medicare_rate", self.medicare_rate),
            ("additional_medicare_rate", self.additional_medicare_rate),
        ] {
            if rate < dec!(0) || rate > dec!(1) {
                return Err(PayrollError::invalid(field, "Rate must be between 0 and 1"));
            }
        }
        if self.social_security_wage_base <= dec!(0) {
            return Err(PayrollError::invalid(
                "social_security_wage_base",
                "Wage base must be positive",
            ));
        }
        if self.additional_medicare_threshold <= dec!(0) {
            return Err(PayrollError::invalid(
                "additional_medicare_threshold",
                "Threshold must be positive",
            ));
        }
        Ok(())
    }
}

/// Engine configuration. Passed explicitly; nothing reads ambient state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollConfig {
    /// Calendar year whose statutory constants are loaded. Pay dates outside it are rejected.
    pub tax_year: i32,
    pub rates: StatutoryRates,
    #[serde(default = "default_money_ceiling")]
    pub money_ceiling: Money,
    /// Allowed gap between a reported amount and hours × rate
    #[serde(default = "default_withhold_tolerance")]
    pub withhold_tolerance: Money,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
    /// Retries after the first attempt when a lock cannot be acquired
    #[serde(default = "default_max_conflict_retries")]
    pub max_conflict_retries: u32,
    /// Reject a first period after January when neither YTD nor a seed exists
    #[serde(default)]
    pub require_opening_balance: bool,
}

fn default_money_ceiling() -> Money {
    dec!(1_000_000_000)
}

fn default_withhold_tolerance() -> Money {
    dec!(0.01)
}

fn default_lock_timeout_ms() -> u64 {
    250
}

fn default_max_conflict_retries() -> u32 {
    3
}

impl PayrollConfig {
    pub fn for_tax_year(tax_year: i32) -> PayrollResult<Self> {
        let rates = StatutoryRates::published(tax_year).ok_or_else(|| {
            PayrollError::invalid(
                "tax_year",
                format!("No published statutory rates for {tax_year}; supply them explicitly"),
            )
        })?;
        Ok(PayrollConfig {
            tax_year,
            rates,
            money_ceiling: default_money_ceiling(),
            withhold_tolerance: default_withhold_tolerance(),
            lock_timeout_ms: default_lock_timeout_ms(),
            max_conflict_retries: default_max_conflict_retries(),
            require_opening_balance: false,
        })
    }

    pub fn validate(&self) -> PayrollResult<()> {
        self.rates.validate()?;
        if self.money_ceiling <= dec!(0) {
            return Err(PayrollError::invalid(
                "money_ceiling",
                "Ceiling must be positive",
            ));
        }
        if self.withhold_tolerance < dec!(0) {
            return Err(PayrollError::invalid(
                "withhold_tolerance",
                "Tolerance cannot be negative",
            ));
        }
        if self.lock_timeout_ms == 0 {
            return Err(PayrollError::invalid(
                "lock_timeout_ms",
                "Lock timeout must be at least 1ms",
            ));
        }
        Ok(())
    }

    pub fn guard(&self) -> MoneyGuard {
        MoneyGuard::new(self.money_ceiling)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl Default for PayrollConfig {
    fn default() -> Self {
        PayrollConfig {
            tax_year: 2024,
            rates: StatutoryRates {
                social_security_rate: dec!(0.062),
                social_security_wage_base: dec!(168_600),
                medicare_rate: dec!(0.0145),
                additional_medicare_rate: dec!(0.009),
                additional_medicare_threshold: dec!(200_000),
            },
            money_ceiling: default_money_ceiling(),
            withhold_tolerance: default_withhold_tolerance(),
            lock_timeout_ms: default_lock_timeout_ms(),
            max_conflict_retries: default_max_conflict_retries(),
            require_opening_balance: false,
        }
    }
}
