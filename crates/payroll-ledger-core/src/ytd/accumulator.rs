use chrono::Datelike;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::concurrency::KeyedLocks;
use crate::error::PayrollError;
use crate::money::MoneyGuard;
use crate::store::YtdStore;
use crate::types::*;
use crate::ytd::totals::*;
use crate::PayrollResult;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct RowKey(EmployeeId, i32);

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ytd {}/{}", self.0, self.1)
    }
}

/// Owns every mutation of the cumulative year-to-date rows.
///
/// Advancement is keyed by period identity: each row remembers the
/// contributions it has absorbed, so replaying a period is detected instead of
/// double-counted.
pub struct YtdAccumulator {
    store: Arc<dyn YtdStore>,
    guard: MoneyGuard,
    locks: KeyedLocks<RowKey>,
}

impl YtdAccumulator {
    pub fn new(store: Arc<dyn YtdStore>, guard: MoneyGuard, lock_timeout: Duration) -> Self {
        YtdAccumulator {
            store,
            guard,
            locks: KeyedLocks::new(lock_timeout),
        }
    }

    /// Cumulative totals before the next period is processed.
    ///
    /// Falls back to the most recent seed for the year when no row exists,
    /// then to zero. Never writes.
    pub fn snapshot(&self, employee_id: &EmployeeId, year: i32) -> PayrollResult<YtdSnapshot> {
        if let Some(row) = self.store.find_by_employee_and_year(employee_id, year)? {
            return Ok(YtdSnapshot::from_record(&row));
        }
        let (totals, source) = match self.latest_seed(employee_id, year)? {
            Some(seed) => (seed.to_totals(), YtdSource::Seed),
            None => (YtdTotals::zero(), YtdSource::Zero),
        };
        tracing::debug!(employee_id = %employee_id, year, ?source, "ytd snapshot without row");
        Ok(YtdSnapshot {
            employee_id: employee_id.clone(),
            year,
            totals,
            source,
            pay_periods_count: 0,
            last_pay_date: None,
        })
    }

    /// Snapshot as it stood before `period` was applied. Used when a period
    /// is recomputed in place.
    pub fn snapshot_excluding(
        &self,
        employee_id: &EmployeeId,
        year: i32,
        period: &PeriodKey,
    ) -> PayrollResult<YtdSnapshot> {
        let mut snap = self.snapshot(employee_id, year)?;
        if let Some(row) = self.store.find_by_employee_and_year(employee_id, year)? {
            if let Some(applied) = row.applied_for(period) {
                snap.totals = snap.totals.checked_sub(&applied.totals, &self.guard)?;
                snap.pay_periods_count = snap.pay_periods_count.saturating_sub(1);
            }
        }
        Ok(snap)
    }

    /// The contribution the row holds for `period`, if it was applied.
    pub fn contribution_for(
        &self,
        employee_id: &EmployeeId,
        year: i32,
        period: &PeriodKey,
    ) -> PayrollResult<Option<PeriodContribution>> {
        Ok(self
            .store
            .find_by_employee_and_year(employee_id, year)?
            .and_then(|row| row.applied_for(period).cloned()))
    }

    pub fn is_applied(
        &self,
        employee_id: &EmployeeId,
        year: i32,
        period: &PeriodKey,
    ) -> PayrollResult<bool> {
        Ok(self.contribution_for(employee_id, year, period)?.is_some())
    }

    /// Fold one period's contribution into the row, creating it if absent.
    ///
    /// A second call for the same period fails with `DuplicatePeriod` when the
    /// contribution is identical, and with `InvalidInput` when it differs.
    pub fn advance(
        &self,
        employee_id: &EmployeeId,
        year: i32,
        contribution: &PeriodContribution,
    ) -> PayrollResult<YtdSnapshot> {
        contribution.totals.validate_contribution()?;
        if contribution.pay_date.year() != year {
            return Err(PayrollError::invalid(
                "pay_date",
                format!("Pay date {} is outside {}", contribution.pay_date, year),
            ));
        }

        let key = RowKey(employee_id.clone(), year);
        self.locks.with_lock(&key, || {
            let mut row = self.load_or_open(employee_id, year)?;

            if let Some(existing) = row.applied_for(&contribution.period) {
                if existing == contribution {
                    return Err(PayrollError::DuplicatePeriod {
                        employee_id: employee_id.to_string(),
                        period: contribution.period.to_string(),
                    });
                }
                return Err(PayrollError::invalid(
                    "period",
                    format!(
                        "Period {} was already applied with different totals; reissue the record instead",
                        contribution.period
                    ),
                ));
            }

            row.totals = row.totals.checked_add(&contribution.totals, &self.guard)?;
            row.pay_periods_count += 1;
            row.last_pay_date = row.last_pay_date.max(Some(contribution.pay_date));
            row.applied.push(contribution.clone());
            self.store.save_ytd(&row)?;

            tracing::info!(
                employee_id = %employee_id,
                year,
                period = %contribution.period,
                ytd_gross = %row.totals.gross_pay,
                "ytd advanced"
            );
            Ok(YtdSnapshot::from_record(&row))
        })
    }

    /// Swap the contribution recorded for `replacement.period` for a new one.
    /// The only path that may lower a cumulative field.
    pub fn replace(
        &self,
        employee_id: &EmployeeId,
        year: i32,
        replacement: &PeriodContribution,
    ) -> PayrollResult<YtdSnapshot> {
        replacement.totals.validate_contribution()?;

        let key = RowKey(employee_id.clone(), year);
        self.locks.with_lock(&key, || {
            let mut row = self.load_or_open(employee_id, year)?;
            let position = row
                .applied
                .iter()
                .position(|c| c.period == replacement.period)
                .ok_or_else(|| {
                    PayrollError::not_found(
                        "ytd contribution",
                        format!("{employee_id} {}", replacement.period),
                    )
                })?;

            let previous = row.applied[position].totals.clone();
            row.totals = row
                .totals
                .checked_sub(&previous, &self.guard)?
                .checked_add(&replacement.totals, &self.guard)?;
            row.applied[position] = replacement.clone();
            row.last_pay_date = row.applied.iter().map(|c| c.pay_date).max();
            self.store.save_ytd(&row)?;

            tracing::info!(
                employee_id = %employee_id,
                year,
                period = %replacement.period,
                ytd_gross = %row.totals.gross_pay,
                "ytd contribution replaced"
            );
            Ok(YtdSnapshot::from_record(&row))
        })
    }

    /// Store a seed record. Rejected once the year already has a row, since
    /// the seed would never be read.
    pub fn record_seed(&self, seed: &PreviousMonthTax) -> PayrollResult<()> {
        seed.validate()?;
        let year = seed.year();
        let key = RowKey(seed.employee_id.clone(), year);
        self.locks.with_lock(&key, || {
            if self
                .store
                .find_by_employee_and_year(&seed.employee_id, year)?
                .is_some()
            {
                return Err(PayrollError::invalid(
                    "employee_id",
                    format!(
                        "Employee {} already has year-to-date totals for {}",
                        seed.employee_id, year
                    ),
                ));
            }
            self.store.insert_seed(seed)
        })
    }

    /// Most recent seed (by period end) whose period ends in `year`.
    pub fn latest_seed(
        &self,
        employee_id: &EmployeeId,
        year: i32,
    ) -> PayrollResult<Option<PreviousMonthTax>> {
        Ok(self
            .store
            .seeds_for_employee(employee_id)?
            .into_iter()
            .filter(|s| s.year() == year)
            .max_by_key(|s| s.period_end))
    }

    fn load_or_open(&self, employee_id: &EmployeeId, year: i32) -> PayrollResult<YtdRecord> {
        if let Some(row) = self.store.find_by_employee_and_year(employee_id, year)? {
            return Ok(row);
        }
        let opening = self
            .latest_seed(employee_id, year)?
            .map(|s| s.to_totals())
            .unwrap_or_default();
        Ok(YtdRecord::open(employee_id.clone(), year, opening))
    }
}
