//! In-process implementations of the store and directory boundaries.
//!
//! Every map sits behind a `parking_lot::RwLock` that is held only for the
//! duration of one call, so each single-row write is atomic. The whole store
//! can be exported to a serde [`StoreSnapshot`] and rebuilt from one.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::PayrollError;
use crate::store::{EmployeeDirectory, EmployeeProfile, YtdStore};
use crate::types::*;
use crate::ytd::{PreviousMonthTax, YtdRecord};
use crate::PayrollResult;

#[cfg(feature = "payroll")]
use crate::payroll::PayrollRecord;
#[cfg(feature = "payroll")]
use chrono::NaiveDate;
#[cfg(feature = "payroll")]
use std::collections::BTreeMap;
#[cfg(feature = "payroll")]
use crate::store::RecordStore;
#[cfg(feature = "payroll")]
use uuid::Uuid;

#[cfg(feature = "withhold")]
use crate::store::WithholdStore;
#[cfg(feature = "withhold")]
use crate::withhold::{WithholdEntry, WithholdKey};

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

/// Serializable image of an [`InMemoryStore`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub ytd: Vec<YtdRecord>,
    #[serde(default)]
    pub seeds: Vec<PreviousMonthTax>,
    #[cfg(feature = "payroll")]
    #[serde(default)]
    pub records: Vec<PayrollRecord>,
    /// Last check number issued per company
    #[cfg(feature = "payroll")]
    #[serde(default)]
    pub check_numbers: BTreeMap<CompanyId, u64>,
    #[cfg(feature = "withhold")]
    #[serde(default)]
    pub withhold: Vec<WithholdEntry>,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct InMemoryStore {
    ytd: RwLock<HashMap<(EmployeeId, i32), YtdRecord>>,
    seeds: RwLock<Vec<PreviousMonthTax>>,
    #[cfg(feature = "payroll")]
    records: RwLock<HashMap<Uuid, PayrollRecord>>,
    #[cfg(feature = "payroll")]
    check_numbers: RwLock<BTreeMap<CompanyId, u64>>,
    #[cfg(feature = "withhold")]
    withhold: RwLock<HashMap<WithholdKey, WithholdEntry>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> PayrollResult<Self> {
        let store = InMemoryStore::new();
        {
            let mut ytd = store.ytd.write();
            for row in snapshot.ytd {
                let key = (row.employee_id.clone(), row.year);
                if ytd.insert(key, row).is_some() {
                    return Err(PayrollError::Storage(
                        "snapshot holds two ytd rows for the same employee and year".to_string(),
                    ));
                }
            }
        }
        *store.seeds.write() = snapshot.seeds;

        #[cfg(feature = "payroll")]
        {
            let mut records = store.records.write();
            for record in snapshot.records {
                if records.insert(record.id, record).is_some() {
                    return Err(PayrollError::Storage(
                        "snapshot holds duplicate payroll record ids".to_string(),
                    ));
                }
            }
            *store.check_numbers.write() = snapshot.check_numbers;
        }

        #[cfg(feature = "withhold")]
        {
            let mut withhold = store.withhold.write();
            for entry in snapshot.withhold {
                if withhold.insert(entry.key.clone(), entry).is_some() {
                    return Err(PayrollError::Storage(
                        "snapshot holds duplicate withhold keys".to_string(),
                    ));
                }
            }
        }

        Ok(store)
    }

    /// Copy of the current contents, in a stable order.
    pub fn snapshot(&self) -> StoreSnapshot {
        let mut ytd: Vec<YtdRecord> = self.ytd.read().values().cloned().collect();
        ytd.sort_by(|a, b| (&a.employee_id, a.year).cmp(&(&b.employee_id, b.year)));

        #[cfg(feature = "payroll")]
        let records = {
            let mut records: Vec<PayrollRecord> = self.records.read().values().cloned().collect();
            records.sort_by(|a, b| {
                (a.employee_id(), a.created_at, a.id).cmp(&(b.employee_id(), b.created_at, b.id))
            });
            records
        };

        #[cfg(feature = "withhold")]
        let withhold = {
            let mut entries: Vec<WithholdEntry> = self.withhold.read().values().cloned().collect();
            entries.sort_by(|a, b| a.key.ordering().cmp(&b.key.ordering()));
            entries
        };

        StoreSnapshot {
            ytd,
            seeds: self.seeds.read().clone(),
            #[cfg(feature = "payroll")]
            records,
            #[cfg(feature = "payroll")]
            check_numbers: self.check_numbers.read().clone(),
            #[cfg(feature = "withhold")]
            withhold,
        }
    }
}

impl YtdStore for InMemoryStore {
    fn find_by_employee_and_year(
        &self,
        employee_id: &EmployeeId,
        year: i32,
    ) -> PayrollResult<Option<YtdRecord>> {
        Ok(self.ytd.read().get(&(employee_id.clone(), year)).cloned())
    }

    fn save_ytd(&self, row: &YtdRecord) -> PayrollResult<()> {
        self.ytd
            .write()
            .insert((row.employee_id.clone(), row.year), row.clone());
        Ok(())
    }

    fn insert_seed(&self, seed: &PreviousMonthTax) -> PayrollResult<()> {
        let mut seeds = self.seeds.write();
        let clash = seeds.iter().any(|s| {
            s.employee_id == seed.employee_id
                && s.period_start == seed.period_start
                && s.period_end == seed.period_end
        });
        if clash {
            return Err(PayrollError::invalid(
                "period_end",
                format!(
                    "A seed for {} covering {}..{} already exists",
                    seed.employee_id, seed.period_start, seed.period_end
                ),
            ));
        }
        seeds.push(seed.clone());
        Ok(())
    }

    fn seeds_for_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> PayrollResult<Vec<PreviousMonthTax>> {
        Ok(self
            .seeds
            .read()
            .iter()
            .filter(|s| &s.employee_id == employee_id)
            .cloned()
            .collect())
    }
}

#[cfg(feature = "payroll")]
impl RecordStore for InMemoryStore {
    fn insert_record(&self, record: &PayrollRecord) -> PayrollResult<()> {
        let mut records = self.records.write();
        if records.contains_key(&record.id) {
            return Err(PayrollError::Storage(format!(
                "payroll record {} already exists",
                record.id
            )));
        }
        records.insert(record.id, record.clone());
        Ok(())
    }

    fn update_record(&self, record: &PayrollRecord) -> PayrollResult<()> {
        let mut records = self.records.write();
        match records.get_mut(&record.id) {
            Some(slot) => {
                *slot = record.clone();
                Ok(())
            }
            None => Err(PayrollError::not_found("payroll record", record.id)),
        }
    }

    fn find_record(&self, id: Uuid) -> PayrollResult<Option<PayrollRecord>> {
        Ok(self.records.read().get(&id).cloned())
    }

    fn records_for_employee(&self, employee_id: &EmployeeId) -> PayrollResult<Vec<PayrollRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.employee_id() == employee_id)
            .cloned()
            .collect())
    }

    fn find_latest_by_employee(
        &self,
        employee_id: &EmployeeId,
    ) -> PayrollResult<Option<PayrollRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| r.employee_id() == employee_id && r.is_active())
            .max_by_key(|r| (r.period.pay_date, r.period.pay_period_end))
            .cloned())
    }

    fn find_before_date(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> PayrollResult<Option<PayrollRecord>> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|r| {
                r.employee_id() == employee_id && r.is_active() && r.period.pay_period_end < date
            })
            .max_by_key(|r| (r.period.pay_period_end, r.period.pay_date))
            .cloned())
    }

    fn next_check_number(&self, company_id: CompanyId) -> PayrollResult<u64> {
        let mut numbers = self.check_numbers.write();
        let next = numbers.entry(company_id).or_insert(0);
        *next += 1;
        Ok(*next)
    }
}

#[cfg(feature = "withhold")]
impl WithholdStore for InMemoryStore {
    fn find_by_ledger_key(&self, key: &WithholdKey) -> PayrollResult<Option<WithholdEntry>> {
        Ok(self.withhold.read().get(key).cloned())
    }

    fn save_withhold(&self, entry: &WithholdEntry) -> PayrollResult<()> {
        self.withhold.write().insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn withhold_for_employees(
        &self,
        employee_ids: &[EmployeeId],
    ) -> PayrollResult<Vec<WithholdEntry>> {
        Ok(self
            .withhold
            .read()
            .values()
            .filter(|e| employee_ids.contains(&e.key.employee_id))
            .cloned()
            .collect())
    }

    fn all_withhold(&self) -> PayrollResult<Vec<WithholdEntry>> {
        Ok(self.withhold.read().values().cloned().collect())
    }
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

/// Fixed employee list, e.g. loaded from a state file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StaticDirectory {
    pub employees: Vec<EmployeeProfile>,
}

impl StaticDirectory {
    pub fn new(employees: Vec<EmployeeProfile>) -> Self {
        StaticDirectory { employees }
    }
}

impl EmployeeDirectory for StaticDirectory {
    fn profile(&self, employee_id: &EmployeeId) -> PayrollResult<Option<EmployeeProfile>> {
        Ok(self
            .employees
            .iter()
            .find(|e| &e.employee_id == employee_id)
            .cloned())
    }

    fn employees_in_company(&self, company_id: CompanyId) -> PayrollResult<Vec<EmployeeProfile>> {
        Ok(self
            .employees
            .iter()
            .filter(|e| e.company_id == Some(company_id))
            .cloned()
            .collect())
    }

    fn all_employees(&self) -> PayrollResult<Vec<EmployeeProfile>> {
        Ok(self.employees.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ytd::YtdTotals;
    use rust_decimal_macros::dec;

    #[test]
    fn test_snapshot_round_trip_keeps_rows() {
        let store = InMemoryStore::new();
        let mut row = YtdRecord::open(EmployeeId::new("E1"), 2024, YtdTotals::zero());
        row.totals.gross_pay = dec!(1234.56);
        store.save_ytd(&row).unwrap();

        let json = serde_json::to_string(&store.snapshot()).unwrap();
        let restored =
            InMemoryStore::from_snapshot(serde_json::from_str(&json).unwrap()).unwrap();
        let back = restored
            .find_by_employee_and_year(&EmployeeId::new("E1"), 2024)
            .unwrap()
            .unwrap();
        assert_eq!(back.totals.gross_pay, dec!(1234.56));
    }

    #[cfg(feature = "payroll")]
    #[test]
    fn test_check_numbers_are_per_company() {
        let store = InMemoryStore::new();
        assert_eq!(store.next_check_number(1).unwrap(), 1);
        assert_eq!(store.next_check_number(1).unwrap(), 2);
        assert_eq!(store.next_check_number(2).unwrap(), 1);
        assert_eq!(store.snapshot().check_numbers.get(&1), Some(&2));
    }

    #[test]
    fn test_directory_company_filter() {
        let dir = StaticDirectory::new(vec![
            EmployeeProfile {
                employee_id: EmployeeId::new("E1"),
                first_name: "A".to_string(),
                last_name: "B".to_string(),
                company_id: Some(3),
                company_name: None,
            },
            EmployeeProfile {
                employee_id: EmployeeId::new("E2"),
                first_name: "C".to_string(),
                last_name: "D".to_string(),
                company_id: None,
                company_name: None,
            },
        ]);
        assert_eq!(dir.employees_in_company(3).unwrap().len(), 1);
        assert!(dir.profile(&EmployeeId::new("E9")).unwrap().is_none());
    }
}
