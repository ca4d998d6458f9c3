use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use uuid::Uuid;

use crate::concurrency::{retry_on_conflict, KeyedLocks};
use crate::config::PayrollConfig;
use crate::error::PayrollError;
use crate::money::MoneyGuard;
use crate::notify::{dispatch, LedgerEvent, Notifier};
use crate::store::{EmployeeDirectory, EmployeeProfile, WithholdStore};
use crate::types::*;
use crate::withhold::entry::*;
use crate::PayrollResult;

// ---------------------------------------------------------------------------
// Query types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyBalance {
    pub company_id: CompanyId,
    pub company_name: Option<String>,
    pub total_balance: Money,
    pub entry_count: usize,
    /// Employees with at least one entry
    pub employee_count: usize,
}

/// One withhold entry flattened with the employee's name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmployeeWithholdRow {
    pub entry_id: Uuid,
    pub employee_id: EmployeeId,
    pub first_name: String,
    pub last_name: String,
    pub project_name: String,
    pub month: u32,
    pub year: i32,
    pub entry_type: String,
    pub actual_hours: Hours,
    pub actual_rate: Rate,
    pub actual_amt: Money,
    pub paid_hours: Option<Hours>,
    pub paid_rate: Option<Rate>,
    pub paid_amt: Money,
    pub balance: Money,
    pub status: WithholdStatus,
    pub bill_rate: Option<String>,
}

impl EmployeeWithholdRow {
    fn new(profile: &EmployeeProfile, entry: &WithholdEntry) -> Self {
        EmployeeWithholdRow {
            entry_id: entry.id,
            employee_id: entry.key.employee_id.clone(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            project_name: entry.key.project_name.clone(),
            month: entry.key.month,
            year: entry.key.year,
            entry_type: entry.key.entry_type.clone(),
            actual_hours: entry.actual_hours,
            actual_rate: entry.actual_rate,
            actual_amt: entry.actual_amt,
            paid_hours: entry.paid_hours,
            paid_rate: entry.paid_rate,
            paid_amt: entry.paid_amt,
            balance: entry.balance,
            status: entry.effective_status(),
            bill_rate: entry.bill_rate.clone(),
        }
    }
}

/// Conjunctive filter for [`WithholdLedger::search`]. Unset fields match anything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WithholdFilter {
    #[serde(default)]
    pub employee_id: Option<EmployeeId>,
    /// Case-insensitive substring of the project name
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub month: Option<u32>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub entry_type: Option<String>,
    #[serde(default)]
    pub status: Option<WithholdStatus>,
}

impl WithholdFilter {
    pub fn matches(&self, entry: &WithholdEntry) -> bool {
        let key = &entry.key;
        self.employee_id.as_ref().map_or(true, |e| &key.employee_id == e)
            && self.project_name.as_ref().map_or(true, |p| {
                key.project_name
                    .to_lowercase()
                    .contains(&p.to_lowercase())
            })
            && self.month.map_or(true, |m| key.month == m)
            && self.year.map_or(true, |y| key.year == y)
            && self
                .entry_type
                .as_ref()
                .map_or(true, |t| key.entry_type.eq_ignore_ascii_case(t))
            && self.status.map_or(true, |s| entry.effective_status() == s)
    }
}

#[derive(Clone, Copy)]
enum Side {
    Actual,
    Paid,
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Actual-versus-paid reconciliation per employee, project, month and type.
///
/// Updates to one ledger key are serialized; different keys proceed in
/// parallel. `balance` and `status` are recomputed on every report.
pub struct WithholdLedger {
    store: Arc<dyn WithholdStore>,
    directory: Arc<dyn EmployeeDirectory>,
    notifier: Arc<dyn Notifier>,
    locks: KeyedLocks<WithholdKey>,
    guard: MoneyGuard,
    tolerance: Money,
    max_retries: u32,
}

impl WithholdLedger {
    pub fn new(
        config: &PayrollConfig,
        store: Arc<dyn WithholdStore>,
        directory: Arc<dyn EmployeeDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> PayrollResult<Self> {
        config.validate()?;
        Ok(WithholdLedger {
            store,
            directory,
            notifier,
            locks: KeyedLocks::new(config.lock_timeout()),
            guard: config.guard(),
            tolerance: config.withhold_tolerance,
            max_retries: config.max_conflict_retries,
        })
    }

    /// Record worked hours and rate, creating the entry if absent.
    pub fn report_actual(&self, report: &HoursReport) -> PayrollResult<WithholdEntry> {
        self.report(report, Side::Actual)
    }

    /// Record paid hours and rate. The entry must already have an actual side.
    pub fn report_paid(&self, report: &HoursReport) -> PayrollResult<WithholdEntry> {
        self.report(report, Side::Paid)
    }

    fn report(&self, report: &HoursReport, side: Side) -> PayrollResult<WithholdEntry> {
        report.validate()?;
        let amount = report.resolve_amount(&self.guard, self.tolerance)?;
        let key = &report.key;

        let (entry, was) = retry_on_conflict(self.max_retries, || {
            self.locks.with_lock(key, || {
                let existing = self.store.find_by_ledger_key(key)?;
                let was = existing.as_ref().map(WithholdEntry::effective_status);
                let mut entry = match (existing, &side) {
                    (Some(entry), _) => entry,
                    (None, Side::Actual) => WithholdEntry::open(key.clone()),
                    (None, Side::Paid) => {
                        return Err(PayrollError::not_found("withhold entry", key));
                    }
                };

                match side {
                    Side::Actual => {
                        entry.actual_hours = report.hours;
                        entry.actual_rate = report.rate;
                        entry.actual_amt = amount;
                    }
                    Side::Paid => {
                        entry.paid_hours = Some(report.hours);
                        entry.paid_rate = Some(report.rate);
                        entry.paid_amt = amount;
                    }
                }
                if report.bill_rate.is_some() {
                    entry.bill_rate = report.bill_rate.clone();
                }
                if let Some(cleared) = entry.status_override.take() {
                    tracing::info!(
                        key = %key,
                        status = %cleared.status,
                        "withhold status override cleared by report"
                    );
                }
                entry.recompute(&self.guard)?;
                self.store.save_withhold(&entry)?;
                Ok((entry, was))
            })
        })?;

        tracing::info!(
            key = %key,
            actual_amt = %entry.actual_amt,
            paid_amt = %entry.paid_amt,
            balance = %entry.balance,
            status = %entry.status,
            "withhold entry updated"
        );

        if entry.status == WithholdStatus::Settled && was != Some(WithholdStatus::Settled) {
            dispatch(
                self.notifier.as_ref(),
                LedgerEvent::WithholdSettled {
                    entry_id: entry.id,
                    employee_id: key.employee_id.clone(),
                    project_name: key.project_name.clone(),
                    month: key.month,
                    year: key.year,
                    entry_type: key.entry_type.clone(),
                },
            );
        }
        Ok(entry)
    }

    /// Force a status outside the derived rule. Cleared by the next report.
    pub fn override_status(
        &self,
        key: &WithholdKey,
        status: WithholdStatus,
        note: AuditNote,
    ) -> PayrollResult<WithholdEntry> {
        if note.reason.trim().is_empty() {
            return Err(PayrollError::invalid("reason", "An override needs a reason"));
        }
        retry_on_conflict(self.max_retries, || {
            self.locks.with_lock(key, || {
                let mut entry = self
                    .store
                    .find_by_ledger_key(key)?
                    .ok_or_else(|| PayrollError::not_found("withhold entry", key))?;
                tracing::warn!(
                    key = %key,
                    derived = %entry.status,
                    forced = %status,
                    reason = %note.reason,
                    "withhold status overridden"
                );
                entry.status_override = Some(StatusOverride {
                    status,
                    note: note.clone(),
                });
                self.store.save_withhold(&entry)?;
                Ok(entry)
            })
        })
    }

    pub fn entry(&self, key: &WithholdKey) -> PayrollResult<WithholdEntry> {
        self.store
            .find_by_ledger_key(key)?
            .ok_or_else(|| PayrollError::not_found("withhold entry", key))
    }

    /// Sum of balances over every entry of the company's employees.
    pub fn balance_by_company(&self, company_id: CompanyId) -> PayrollResult<CompanyBalance> {
        let employees = self.directory.employees_in_company(company_id)?;
        if employees.is_empty() {
            return Err(PayrollError::not_found("company", company_id));
        }
        let company_name = employees.iter().find_map(|e| e.company_name.clone());
        let ids: Vec<EmployeeId> = employees.iter().map(|e| e.employee_id.clone()).collect();

        let mut seen = BTreeSet::new();
        let mut holders = BTreeSet::new();
        let mut total = dec!(0);
        for entry in self.store.withhold_for_employees(&ids)? {
            if !seen.insert(entry.id) {
                continue;
            }
            holders.insert(entry.key.employee_id.clone());
            total = self.guard.add("company_balance", total, entry.balance)?;
        }

        Ok(CompanyBalance {
            company_id,
            company_name,
            total_balance: total,
            entry_count: seen.len(),
            employee_count: holders.len(),
        })
    }

    /// Balances for every company that has at least one entry.
    pub fn company_balances(&self) -> PayrollResult<Vec<CompanyBalance>> {
        let employees = self.directory.all_employees()?;
        let company_of: HashMap<&EmployeeId, &EmployeeProfile> = employees
            .iter()
            .filter(|e| e.company_id.is_some())
            .map(|e| (&e.employee_id, e))
            .collect();

        let mut by_company: BTreeMap<CompanyId, CompanyBalance> = BTreeMap::new();
        let mut holders: BTreeMap<CompanyId, BTreeSet<EmployeeId>> = BTreeMap::new();
        let mut seen = BTreeSet::new();

        for entry in self.store.all_withhold()? {
            if !seen.insert(entry.id) {
                continue;
            }
            let Some(profile) = company_of.get(&entry.key.employee_id) else {
                continue;
            };
            let Some(company_id) = profile.company_id else {
                continue;
            };
            let row = by_company.entry(company_id).or_insert_with(|| CompanyBalance {
                company_id,
                company_name: profile.company_name.clone(),
                total_balance: dec!(0),
                entry_count: 0,
                employee_count: 0,
            });
            row.total_balance = self.guard.add("company_balance", row.total_balance, entry.balance)?;
            row.entry_count += 1;
            holders
                .entry(company_id)
                .or_default()
                .insert(entry.key.employee_id.clone());
        }

        Ok(by_company
            .into_values()
            .map(|mut row| {
                row.employee_count = holders.get(&row.company_id).map_or(0, BTreeSet::len);
                row
            })
            .collect())
    }

    /// One row per entry of the company's employees, with names attached.
    /// Ordering is stable across calls so pages do not shift.
    pub fn employee_withhold_history(
        &self,
        company_id: CompanyId,
        page: Option<PageRequest>,
    ) -> PayrollResult<Page<EmployeeWithholdRow>> {
        let employees = self.directory.employees_in_company(company_id)?;
        if employees.is_empty() {
            return Err(PayrollError::not_found("company", company_id));
        }
        let profiles: HashMap<&EmployeeId, &EmployeeProfile> =
            employees.iter().map(|e| (&e.employee_id, e)).collect();
        let ids: Vec<EmployeeId> = employees.iter().map(|e| e.employee_id.clone()).collect();

        let mut seen = BTreeSet::new();
        let mut rows: Vec<EmployeeWithholdRow> = self
            .store
            .withhold_for_employees(&ids)?
            .iter()
            .filter(|entry| seen.insert(entry.id))
            .filter_map(|entry| {
                profiles
                    .get(&entry.key.employee_id)
                    .map(|profile| EmployeeWithholdRow::new(profile, entry))
            })
            .collect();

        rows.sort_by(|a, b| {
            (&a.last_name, &a.first_name, &a.employee_id, a.year, a.month)
                .cmp(&(&b.last_name, &b.first_name, &b.employee_id, b.year, b.month))
                .then_with(|| a.project_name.cmp(&b.project_name))
                .then_with(|| a.entry_type.cmp(&b.entry_type))
                .then_with(|| a.entry_id.cmp(&b.entry_id))
        });
        Ok(Page::from_sorted(rows, page))
    }

    pub fn search(
        &self,
        filter: &WithholdFilter,
        page: Option<PageRequest>,
    ) -> PayrollResult<Page<WithholdEntry>> {
        let mut entries: Vec<WithholdEntry> = self
            .store
            .all_withhold()?
            .into_iter()
            .filter(|e| filter.matches(e))
            .collect();
        entries.sort_by(|a, b| {
            a.key
                .ordering()
                .cmp(&b.key.ordering())
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(Page::from_sorted(entries, page))
    }
}
