use chrono::{NaiveDate, Utc};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::concurrency::{retry_on_conflict, KeyedLocks};
use crate::config::PayrollConfig;
use crate::error::PayrollError;
use crate::money::MoneyGuard;
use crate::notify::{dispatch, LedgerEvent, Notifier};
use crate::payroll::period::PayrollPeriod;
use crate::payroll::record::*;
use crate::store::{EmployeeDirectory, RecordStore, YtdStore};
use crate::tax::{StatutoryTaxInput, StatutoryTaxes, TaxCalculator};
use crate::types::*;
use crate::ytd::{PreviousMonthTax, YtdAccumulator, YtdSnapshot, YtdSource};
use crate::PayrollResult;

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollOutcome {
    pub record: PayrollRecord,
    /// Cumulative totals after this period
    pub ytd: YtdSnapshot,
    /// True when an identical request had already been generated
    pub replayed: bool,
}

/// What `generate` would produce, without persisting anything.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PayrollPreview {
    pub period: PayrollPeriod,
    pub gross_pay: Money,
    pub federal_tax: Money,
    pub state_tax: Money,
    pub state_tax_name: Option<String>,
    pub local_tax: Money,
    pub statutory: StatutoryTaxes,
    pub total_taxes: Money,
    pub total_deductions: Money,
    pub net_pay: Money,
    pub ytd_before: YtdSnapshot,
    pub ytd_gross_pay: Money,
    pub ytd_net_pay: Money,
}

struct Priced {
    statutory: StatutoryTaxes,
    net: NetPay,
    state_tax_name: Option<String>,
    ytd_gross_pay: Money,
    ytd_net_pay: Money,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Builds payroll records and keeps the year-to-date rows in step with them.
///
/// Each employee's `snapshot -> taxes -> persist -> advance` sequence runs
/// under that employee's lock. Different employees proceed in parallel.
pub struct PayrollEngine {
    config: PayrollConfig,
    guard: MoneyGuard,
    calculator: TaxCalculator,
    accumulator: YtdAccumulator,
    store: Arc<dyn RecordStore>,
    directory: Arc<dyn EmployeeDirectory>,
    notifier: Arc<dyn Notifier>,
    locks: KeyedLocks<EmployeeId>,
}

impl PayrollEngine {
    pub fn new<S>(
        config: PayrollConfig,
        store: Arc<S>,
        directory: Arc<dyn EmployeeDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> PayrollResult<Self>
    where
        S: RecordStore + 'static,
    {
        config.validate()?;
        let guard = config.guard();
        let ytd_store: Arc<dyn YtdStore> = store.clone();
        Ok(PayrollEngine {
            calculator: TaxCalculator::new(config.rates.clone(), guard.clone()),
            accumulator: YtdAccumulator::new(ytd_store, guard.clone(), config.lock_timeout()),
            locks: KeyedLocks::new(config.lock_timeout()),
            guard,
            store,
            directory,
            notifier,
            config,
        })
    }

    pub fn config(&self) -> &PayrollConfig {
        &self.config
    }

    pub fn accumulator(&self) -> &YtdAccumulator {
        &self.accumulator
    }

    // -- commands ----------------------------------------------------------

    /// Generate the record for one pay period and advance the employee's
    /// year-to-date row.
    ///
    /// Re-submitting an identical request returns the stored record with
    /// `replayed = true` and leaves the totals as they are. If an earlier
    /// attempt persisted the record but failed to advance, the replay
    /// completes the advance.
    pub fn generate(&self, request: &GeneratePayrollRequest) -> PayrollResult<PayrollOutcome> {
        request.validate()?;
        self.check_tax_year(&request.period)?;
        let employee_id = &request.period.employee_id;

        let outcome = retry_on_conflict(self.config.max_conflict_retries, || {
            self.locks
                .with_lock(employee_id, || self.generate_locked(request))
        })?;

        if !outcome.replayed {
            dispatch(
                self.notifier.as_ref(),
                LedgerEvent::PayrollGenerated {
                    record_id: outcome.record.id,
                    employee_id: employee_id.clone(),
                    pay_date: outcome.record.period.pay_date,
                    net_pay: outcome.record.net_pay,
                },
            );
        }
        Ok(outcome)
    }

    fn generate_locked(&self, request: &GeneratePayrollRequest) -> PayrollResult<PayrollOutcome> {
        let period = &request.period;
        let employee_id = &period.employee_id;
        let year = period.tax_year();
        let active = self.active_records(employee_id)?;

        if let Some(existing) = active.iter().find(|r| r.period.key() == period.key()) {
            let state_tax_name = self.resolve_state_tax_name(request, year)?;
            if existing.matches_request(request, state_tax_name.as_deref()) {
                tracing::info!(
                    employee_id = %employee_id,
                    period = %period.key(),
                    record_id = %existing.id,
                    "identical payroll request replayed"
                );
                let ytd = self.ensure_applied(existing)?;
                return Ok(PayrollOutcome {
                    record: existing.clone(),
                    ytd,
                    replayed: true,
                });
            }
            return Err(PayrollError::DuplicatePeriod {
                employee_id: employee_id.to_string(),
                period: period.key().to_string(),
            });
        }
        self.check_sequence(period, &active)?;
        self.reconcile(employee_id, year, &active)?;

        let before = self.accumulator.snapshot(employee_id, year)?;
        self.check_opening_balance(period, &before)?;
        let priced = self.price(request, &before)?;

        let check_number = self.issue_check_number(employee_id)?;
        let record = self.build_record(request, priced, check_number, None);
        self.store.insert_record(&record)?;

        let ytd = match self.accumulator.advance(employee_id, year, &record.contribution()) {
            Ok(snap) => snap,
            Err(e) => {
                tracing::error!(
                    employee_id = %employee_id,
                    record_id = %record.id,
                    error = %e,
                    "record persisted but ytd advance failed; replay the request or run recover"
                );
                return Err(e);
            }
        };

        tracing::info!(
            employee_id = %employee_id,
            period = %period.key(),
            record_id = %record.id,
            gross_pay = %record.gross_pay,
            net_pay = %record.net_pay,
            "payroll generated"
        );
        Ok(PayrollOutcome {
            record,
            ytd,
            replayed: false,
        })
    }

    /// Run the generate computation against the current snapshot without
    /// persisting anything.
    pub fn preview(
        &self,
        request: &GeneratePayrollRequest,
    ) -> PayrollResult<ComputationOutput<PayrollPreview>> {
        let start = Instant::now();
        request.validate()?;
        self.check_tax_year(&request.period)?;

        let period = &request.period;
        let employee_id = &period.employee_id;
        let active = self.active_records(employee_id)?;
        if let Some(existing) = active.iter().find(|r| r.period.overlaps(period)) {
            return Err(PayrollError::OverlappingPeriod {
                employee_id: employee_id.to_string(),
                period: period.key().to_string(),
                existing: existing.period.key().to_string(),
            });
        }
        self.check_sequence(period, &active)?;
        let before = self.reconciled_snapshot(employee_id, period.tax_year(), &active)?;
        self.check_opening_balance(period, &before)?;

        let tax_input = StatutoryTaxInput {
            gross_pay: request.gross_pay,
            ytd_gross_before: before.totals.gross_pay,
            fica_exempt: request.fica_exempt,
        };
        let mut warnings = self.calculator.calculate(&tax_input)?.warnings;
        match before.source {
            YtdSource::Seed => warnings.push(
                "Year-to-date totals start from an imported seed record.".to_string(),
            ),
            YtdSource::Zero if period.starts_mid_year() => warnings.push(format!(
                "No year-to-date history for {}; starting from zero.",
                period.tax_year()
            )),
            _ => {}
        }

        let priced = self.price(request, &before)?;
        let result = PayrollPreview {
            period: period.clone(),
            gross_pay: request.gross_pay,
            federal_tax: request.taxes.federal_tax,
            state_tax: request.taxes.state_tax,
            state_tax_name: priced.state_tax_name,
            local_tax: request.taxes.local_tax,
            statutory: priced.statutory,
            total_taxes: priced.net.total_taxes,
            total_deductions: priced.net.total_deductions,
            net_pay: priced.net.net_pay,
            ytd_before: before,
            ytd_gross_pay: priced.ytd_gross_pay,
            ytd_net_pay: priced.ytd_net_pay,
        };

        let assumptions = serde_json::json!({
            "tax_year": self.config.tax_year,
            "fica_exempt": request.fica_exempt,
            "ytd_source": result.ytd_before.source,
            "social_security_wage_base": self.config.rates.social_security_wage_base.to_string(),
            "additional_medicare_threshold": self.config.rates.additional_medicare_threshold.to_string(),
        });

        let elapsed = start.elapsed().as_micros() as u64;
        Ok(with_metadata(
            "Payroll preview: statutory taxes from pre-period YTD, net = gross - taxes - deductions",
            &assumptions,
            warnings,
            elapsed,
            result,
        ))
    }

    /// Replace a generated record with corrected inputs.
    ///
    /// The original is marked superseded and the year-to-date row swaps its
    /// contribution for the new one under the same period key. Only the
    /// employee's latest active record in the year may be reissued.
    pub fn reissue(&self, record_id: Uuid, request: &ReissueRequest) -> PayrollResult<PayrollOutcome> {
        if request.reason.trim().is_empty() {
            return Err(PayrollError::invalid("reason", "A reissue needs a reason"));
        }
        let employee_id = self.record(record_id)?.employee_id().clone();

        let outcome = retry_on_conflict(self.config.max_conflict_retries, || {
            self.locks
                .with_lock(&employee_id, || self.reissue_locked(record_id, request))
        })?;

        if let Some(supersedes) = outcome.record.supersedes {
            dispatch(
                self.notifier.as_ref(),
                LedgerEvent::PayrollReissued {
                    record_id: outcome.record.id,
                    supersedes,
                    employee_id,
                    net_pay: outcome.record.net_pay,
                },
            );
        }
        Ok(outcome)
    }

    fn reissue_locked(&self, record_id: Uuid, request: &ReissueRequest) -> PayrollResult<PayrollOutcome> {
        let mut original = self.record(record_id)?;
        if !original.is_active() {
            return Err(PayrollError::invalid(
                "record_id",
                format!("Record {record_id} was already superseded"),
            ));
        }
        let employee_id = original.employee_id().clone();
        let year = original.period.tax_year();

        let later = self
            .active_records(&employee_id)?
            .into_iter()
            .filter(|r| r.period.tax_year() == year && r.period.pay_date > original.period.pay_date)
            .count();
        if later > 0 {
            return Err(PayrollError::invalid(
                "record_id",
                format!(
                    "Record {record_id} is followed by {later} later period(s) in {year}; only the latest period can be reissued"
                ),
            ));
        }

        let corrected = GeneratePayrollRequest {
            period: original.period.clone(),
            gross_pay: request.gross_pay,
            taxes: request.taxes.clone(),
            deductions: request.deductions.clone(),
            fica_exempt: request.fica_exempt,
        };
        corrected.validate()?;

        let active = self.active_records(&employee_id)?;
        self.reconcile(&employee_id, year, &active)?;
        let key = original.period.key();
        let before = self.accumulator.snapshot_excluding(&employee_id, year, &key)?;
        let priced = self.price(&corrected, &before)?;

        let check_number = self.issue_check_number(&employee_id)?;
        let mut record = self.build_record(&corrected, priced, check_number, Some(original.id));
        record.reissue_note = Some(AuditNote::now(request.reason.clone(), request.actor.clone()));
        self.store.insert_record(&record)?;

        original.status = RecordStatus::Superseded;
        original.superseded_by = Some(record.id);
        original.updated_at = Utc::now();
        self.store.update_record(&original)?;

        let ytd = self
            .accumulator
            .replace(&employee_id, year, &record.contribution())?;

        tracing::info!(
            employee_id = %employee_id,
            period = %key,
            record_id = %record.id,
            supersedes = %original.id,
            reason = %request.reason,
            "payroll reissued"
        );
        Ok(PayrollOutcome {
            record,
            ytd,
            replayed: false,
        })
    }

    /// Mark a record as paid out. Marking an already paid record is a no-op.
    pub fn mark_paid(&self, record_id: Uuid) -> PayrollResult<PayrollRecord> {
        let employee_id = self.record(record_id)?.employee_id().clone();
        retry_on_conflict(self.config.max_conflict_retries, || {
            self.locks.with_lock(&employee_id, || {
                let mut record = self.record(record_id)?;
                match record.status {
                    RecordStatus::Paid => Ok(record),
                    RecordStatus::Superseded => Err(PayrollError::invalid(
                        "record_id",
                        format!("Record {record_id} was superseded and cannot be paid"),
                    )),
                    RecordStatus::Processed => {
                        record.status = RecordStatus::Paid;
                        record.updated_at = Utc::now();
                        self.store.update_record(&record)?;
                        tracing::info!(record_id = %record_id, "payroll marked paid");
                        Ok(record)
                    }
                }
            })
        })
    }

    /// Re-apply any active record of `year` whose contribution is missing
    /// from, or stale in, the year-to-date row. Returns the ids repaired.
    pub fn recover(&self, employee_id: &EmployeeId, year: i32) -> PayrollResult<Vec<Uuid>> {
        retry_on_conflict(self.config.max_conflict_retries, || {
            self.locks.with_lock(employee_id, || {
                let active = self.active_records(employee_id)?;
                self.reconcile(employee_id, year, &active)
            })
        })
    }

    /// Store an opening-balance seed for an employee.
    pub fn record_seed(&self, seed: &PreviousMonthTax) -> PayrollResult<()> {
        self.locks
            .with_lock(&seed.employee_id, || self.accumulator.record_seed(seed))?;
        tracing::info!(
            employee_id = %seed.employee_id,
            period_end = %seed.period_end,
            "ytd seed recorded"
        );
        Ok(())
    }

    // -- queries -----------------------------------------------------------

    /// Active records, newest pay date first.
    pub fn history(&self, employee_id: &EmployeeId) -> PayrollResult<Vec<PayrollRecord>> {
        let mut records = self.active_records(employee_id)?;
        records.sort_by(|a, b| {
            b.period
                .pay_date
                .cmp(&a.period.pay_date)
                .then(b.period.pay_period_start.cmp(&a.period.pay_period_start))
        });
        Ok(records)
    }

    /// Most recent active record whose period ends strictly before `date`.
    pub fn latest_before(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> PayrollResult<Option<PayrollRecord>> {
        self.store.find_before_date(employee_id, date)
    }

    pub fn latest(&self, employee_id: &EmployeeId) -> PayrollResult<Option<PayrollRecord>> {
        self.store.find_latest_by_employee(employee_id)
    }

    /// Any record by id, superseded ones included.
    pub fn record(&self, record_id: Uuid) -> PayrollResult<PayrollRecord> {
        self.store
            .find_record(record_id)?
            .ok_or_else(|| PayrollError::not_found("payroll record", record_id))
    }

    pub fn ytd(&self, employee_id: &EmployeeId, year: i32) -> PayrollResult<YtdSnapshot> {
        self.accumulator.snapshot(employee_id, year)
    }

    // -- internals ---------------------------------------------------------

    fn active_records(&self, employee_id: &EmployeeId) -> PayrollResult<Vec<PayrollRecord>> {
        Ok(self
            .store
            .records_for_employee(employee_id)?
            .into_iter()
            .filter(PayrollRecord::is_active)
            .collect())
    }

    fn check_tax_year(&self, period: &PayrollPeriod) -> PayrollResult<()> {
        if period.tax_year() != self.config.tax_year {
            return Err(PayrollError::invalid(
                "pay_date",
                format!(
                    "Pay date {} falls outside the configured tax year {}",
                    period.pay_date, self.config.tax_year
                ),
            ));
        }
        Ok(())
    }

    /// No overlap with an active record, and no pay date earlier than the
    /// latest already generated in the same year.
    fn check_sequence(&self, period: &PayrollPeriod, active: &[PayrollRecord]) -> PayrollResult<()> {
        if let Some(existing) = active.iter().find(|r| r.period.overlaps(period)) {
            return Err(PayrollError::OverlappingPeriod {
                employee_id: period.employee_id.to_string(),
                period: period.key().to_string(),
                existing: existing.period.key().to_string(),
            });
        }
        let latest = active
            .iter()
            .filter(|r| r.period.tax_year() == period.tax_year())
            .map(|r| r.period.pay_date)
            .max();
        if let Some(latest) = latest {
            if period.pay_date < latest {
                return Err(PayrollError::invalid(
                    "pay_date",
                    format!(
                        "Pay date {} precedes the latest generated pay date {}",
                        period.pay_date, latest
                    ),
                ));
            }
        }
        Ok(())
    }

    fn check_opening_balance(&self, period: &PayrollPeriod, before: &YtdSnapshot) -> PayrollResult<()> {
        if self.config.require_opening_balance
            && before.source == YtdSource::Zero
            && period.starts_mid_year()
        {
            return Err(PayrollError::not_found(
                "opening balance",
                format!("{} {}", period.employee_id, period.tax_year()),
            ));
        }
        Ok(())
    }

    fn price(&self, request: &GeneratePayrollRequest, before: &YtdSnapshot) -> PayrollResult<Priced> {
        let statutory = self.calculator.compute(&StatutoryTaxInput {
            gross_pay: request.gross_pay,
            ytd_gross_before: before.totals.gross_pay,
            fica_exempt: request.fica_exempt,
        })?;
        let net = compute_net_pay(
            request.gross_pay,
            &request.taxes,
            &statutory,
            &request.deductions,
            &self.guard,
        )?;
        if net.net_pay < dec!(0) {
            return Err(PayrollError::InsufficientGrossPay {
                employee_id: request.period.employee_id.to_string(),
                period: request.period.key().to_string(),
                net_pay: net.net_pay,
            });
        }

        let state_tax_name = self.resolve_state_tax_name(request, before.year)?;

        Ok(Priced {
            ytd_gross_pay: self.guard.add("ytd_gross_pay", before.totals.gross_pay, request.gross_pay)?,
            ytd_net_pay: self.guard.add("ytd_net_pay", before.totals.net_pay, net.net_pay)?,
            statutory,
            net,
            state_tax_name,
        })
    }

    /// The requested state name, else the one on the employee's seed.
    fn resolve_state_tax_name(
        &self,
        request: &GeneratePayrollRequest,
        year: i32,
    ) -> PayrollResult<Option<String>> {
        match &request.taxes.state_tax_name {
            Some(name) => Ok(Some(name.clone())),
            None => Ok(self
                .accumulator
                .latest_seed(&request.period.employee_id, year)?
                .and_then(|seed| seed.state_tax_name)),
        }
    }

    /// Bring the row in line with every active record of `year`, oldest pay
    /// date first, so that nothing is priced from a row missing a persisted
    /// period. Caller holds the employee lock.
    fn reconcile(
        &self,
        employee_id: &EmployeeId,
        year: i32,
        active: &[PayrollRecord],
    ) -> PayrollResult<Vec<Uuid>> {
        let mut records: Vec<&PayrollRecord> = active
            .iter()
            .filter(|r| r.period.tax_year() == year)
            .collect();
        records.sort_by_key(|r| (r.period.pay_date, r.period.pay_period_start));

        let mut repaired = Vec::new();
        for record in records {
            let applied = self
                .accumulator
                .contribution_for(employee_id, year, &record.period.key())?;
            if applied.as_ref() != Some(&record.contribution()) {
                self.ensure_applied(record)?;
                repaired.push(record.id);
            }
        }
        if !repaired.is_empty() {
            tracing::warn!(
                employee_id = %employee_id,
                year,
                repaired = repaired.len(),
                "ytd row repaired from persisted records"
            );
        }
        Ok(repaired)
    }

    /// The snapshot `reconcile` would leave behind, computed without writing.
    fn reconciled_snapshot(
        &self,
        employee_id: &EmployeeId,
        year: i32,
        active: &[PayrollRecord],
    ) -> PayrollResult<YtdSnapshot> {
        let mut snap = self.accumulator.snapshot(employee_id, year)?;
        for record in active.iter().filter(|r| r.period.tax_year() == year) {
            let contribution = record.contribution();
            let applied = self
                .accumulator
                .contribution_for(employee_id, year, &contribution.period)?;
            match applied {
                Some(applied) if applied == contribution => continue,
                Some(applied) => {
                    snap.totals = snap
                        .totals
                        .checked_sub(&applied.totals, &self.guard)?
                        .checked_add(&contribution.totals, &self.guard)?;
                }
                None => {
                    snap.totals = snap.totals.checked_add(&contribution.totals, &self.guard)?;
                    snap.pay_periods_count += 1;
                    snap.last_pay_date = snap.last_pay_date.max(Some(contribution.pay_date));
                }
            }
            snap.source = YtdSource::Ledger;
        }
        Ok(snap)
    }

    fn issue_check_number(&self, employee_id: &EmployeeId) -> PayrollResult<Option<u64>> {
        match self.directory.profile(employee_id)?.and_then(|p| p.company_id) {
            Some(company_id) => Ok(Some(self.store.next_check_number(company_id)?)),
            None => Ok(None),
        }
    }

    fn build_record(
        &self,
        request: &GeneratePayrollRequest,
        priced: Priced,
        check_number: Option<u64>,
        supersedes: Option<Uuid>,
    ) -> PayrollRecord {
        let now = Utc::now();
        PayrollRecord {
            id: Uuid::new_v4(),
            period: request.period.clone(),
            gross_pay: request.gross_pay,
            federal_tax: request.taxes.federal_tax,
            state_tax: request.taxes.state_tax,
            state_tax_name: priced.state_tax_name,
            local_tax: request.taxes.local_tax,
            social_security: priced.statutory.social_security,
            medicare: priced.statutory.medicare,
            additional_medicare: priced.statutory.additional_medicare,
            other_deductions: request.deductions.other.clone(),
            custom_deductions: request.deductions.custom.clone(),
            total_taxes: priced.net.total_taxes,
            total_deductions: priced.net.total_deductions,
            net_pay: priced.net.net_pay,
            fica_exempt: request.fica_exempt,
            ytd_gross_pay: priced.ytd_gross_pay,
            ytd_net_pay: priced.ytd_net_pay,
            check_number,
            status: RecordStatus::Processed,
            supersedes,
            superseded_by: None,
            reissue_note: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Make the row hold exactly this record's contribution.
    fn ensure_applied(&self, record: &PayrollRecord) -> PayrollResult<YtdSnapshot> {
        let employee_id = record.employee_id();
        let year = record.period.tax_year();
        let contribution = record.contribution();
        match self
            .accumulator
            .contribution_for(employee_id, year, &contribution.period)?
        {
            None => self.accumulator.advance(employee_id, year, &contribution),
            Some(applied) if applied != contribution => {
                self.accumulator.replace(employee_id, year, &contribution)
            }
            Some(_) => self.accumulator.snapshot(employee_id, year),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{InMemoryStore, StaticDirectory};
    use crate::notify::NoopNotifier;
    use crate::store::EmployeeProfile;

    fn d(m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, m, day).unwrap()
    }

    fn engine_with(store: Arc<InMemoryStore>) -> PayrollEngine {
        let directory = StaticDirectory::new(vec![EmployeeProfile {
            employee_id: EmployeeId::new("E1"),
            first_name: "Ada".to_string(),
            last_name: "Byron".to_string(),
            company_id: Some(7),
            company_name: Some("Acme".to_string()),
        }]);
        PayrollEngine::new(
            PayrollConfig::default(),
            store,
            Arc::new(directory),
            Arc::new(NoopNotifier),
        )
        .unwrap()
    }

    fn request(start: NaiveDate, end: NaiveDate, pay: NaiveDate, gross: Money) -> GeneratePayrollRequest {
        GeneratePayrollRequest {
            period: PayrollPeriod::new(EmployeeId::new("E1"), start, end, pay).unwrap(),
            gross_pay: gross,
            taxes: JurisdictionalTaxes {
                federal_tax: dec!(400),
                state_tax: dec!(150),
                local_tax: dec!(0),
                state_tax_name: Some("VA".to_string()),
            },
            deductions: Deductions::default(),
            fica_exempt: false,
        }
    }

    #[test]
    fn test_generate_stamps_ytd_and_check_number() {
        let engine = engine_with(Arc::new(InMemoryStore::new()));
        let first = engine
            .generate(&request(d(1, 1), d(1, 15), d(1, 20), dec!(4000)))
            .unwrap();
        let second = engine
            .generate(&request(d(1, 16), d(1, 31), d(2, 5), dec!(4000)))
            .unwrap();

        assert_eq!(first.record.check_number, Some(1));
        assert_eq!(second.record.check_number, Some(2));
        assert_eq!(second.record.ytd_gross_pay, dec!(8000));
        assert_eq!(
            second.record.ytd_net_pay,
            first.record.net_pay + second.record.net_pay
        );
        assert_eq!(second.ytd.pay_periods_count, 2);
    }

    #[test]
    fn test_changed_request_for_same_period_is_duplicate() {
        let engine = engine_with(Arc::new(InMemoryStore::new()));
        engine
            .generate(&request(d(1, 1), d(1, 15), d(1, 20), dec!(4000)))
            .unwrap();
        match engine
            .generate(&request(d(1, 1), d(1, 15), d(1, 20), dec!(4100)))
            .unwrap_err()
        {
            PayrollError::DuplicatePeriod { period, .. } => {
                assert_eq!(period, "2024-01-01..2024-01-15")
            }
            other => panic!("Expected DuplicatePeriod, got {:?}", other),
        }
    }

    #[test]
    fn test_out_of_order_pay_date_rejected() {
        let engine = engine_with(Arc::new(InMemoryStore::new()));
        engine
            .generate(&request(d(2, 1), d(2, 15), d(2, 20), dec!(4000)))
            .unwrap();
        match engine
            .generate(&request(d(1, 1), d(1, 15), d(1, 20), dec!(4000)))
            .unwrap_err()
        {
            PayrollError::InvalidInput { field, .. } => assert_eq!(field, "pay_date"),
            other => panic!("Expected InvalidInput, got {:?}", other),
        }
    }

    #[test]
    fn test_pay_date_outside_configured_year_rejected() {
        let engine = engine_with(Arc::new(InMemoryStore::new()));
        let req = GeneratePayrollRequest {
            period: PayrollPeriod::new(
                EmployeeId::new("E1"),
                d(12, 16),
                d(12, 31),
                NaiveDate::from_ymd_opt(2025, 1, 3).unwrap(),
            )
            .unwrap(),
            ..request(d(1, 1), d(1, 15), d(1, 20), dec!(4000))
        };
        assert!(engine.generate(&req).unwrap_err().is_validation());
    }

    #[test]
    fn test_recover_applies_missing_contribution() {
        let store = Arc::new(InMemoryStore::new());
        let engine = engine_with(store.clone());
        let outcome = engine
            .generate(&request(d(1, 1), d(1, 15), d(1, 20), dec!(4000)))
            .unwrap();

        // Simulate a crash between persisting the record and advancing the row
        let mut row = store
            .find_by_employee_and_year(&EmployeeId::new("E1"), 2024)
            .unwrap()
            .unwrap();
        row.applied.clear();
        row.totals = row.opening.clone();
        row.pay_periods_count = 0;
        store.save_ytd(&row).unwrap();

        let repaired = engine.recover(&EmployeeId::new("E1"), 2024).unwrap();
        assert_eq!(repaired, vec![outcome.record.id]);
        let snap = engine.ytd(&EmployeeId::new("E1"), 2024).unwrap();
        assert_eq!(snap.totals.gross_pay, dec!(4000));
        assert!(engine.recover(&EmployeeId::new("E1"), 2024).unwrap().is_empty());
    }

    #[test]
    fn test_preview_does_not_persist() {
        let engine = engine_with(Arc::new(InMemoryStore::new()));
        let out = engine
            .preview(&request(d(3, 1), d(3, 15), d(3, 20), dec!(4000)))
            .unwrap();
        assert_eq!(out.result.statutory.social_security, dec!(248.00));
        assert_eq!(out.result.statutory.medicare, dec!(58.00));
        assert!(out
            .warnings
            .iter()
            .any(|w| w.contains("starting from zero")));
        assert!(engine.history(&EmployeeId::new("E1")).unwrap().is_empty());
    }

    #[test]
    fn test_mark_paid() {
        let engine = engine_with(Arc::new(InMemoryStore::new()));
        let outcome = engine
            .generate(&request(d(1, 1), d(1, 15), d(1, 20), dec!(4000)))
            .unwrap();
        let paid = engine.mark_paid(outcome.record.id).unwrap();
        assert_eq!(paid.status, RecordStatus::Paid);
        assert_eq!(
            engine.mark_paid(outcome.record.id).unwrap().status,
            RecordStatus::Paid
        );
        assert!(matches!(
            engine.mark_paid(Uuid::new_v4()).unwrap_err(),
            PayrollError::NotFound { .. }
        ));
    }
}
