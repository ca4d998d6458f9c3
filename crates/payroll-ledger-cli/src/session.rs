use parking_lot::RwLock;
use payroll_ledger_core::memory::{InMemoryStore, StaticDirectory, StoreSnapshot};
use payroll_ledger_core::notify::{LedgerEvent, Notifier, NotifyError};
use payroll_ledger_core::payroll::PayrollEngine;
use payroll_ledger_core::store::EmployeeProfile;
use payroll_ledger_core::withhold::WithholdLedger;
use payroll_ledger_core::PayrollConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

use crate::input::file;

/// On-disk ledger: the employee directory plus the store image.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LedgerState {
    #[serde(default)]
    pub employees: Vec<EmployeeProfile>,
    #[serde(default)]
    pub store: StoreSnapshot,
}

/// Resolve the engine configuration from `--config`, else `--tax-year`,
/// else the built-in default year.
pub fn load_config(
    path: Option<&str>,
    tax_year: Option<i32>,
) -> Result<PayrollConfig, Box<dyn std::error::Error>> {
    let config = match (path, tax_year) {
        (Some(path), _) => file::read_document::<PayrollConfig>(path)?,
        (None, Some(year)) => PayrollConfig::for_tax_year(year)?,
        (None, None) => PayrollConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

/// Logs ledger events as they are emitted during one invocation.
struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &LedgerEvent) -> Result<(), NotifyError> {
        let body = serde_json::to_string(event).map_err(|e| NotifyError(e.to_string()))?;
        tracing::info!(event = %body, "ledger event");
        Ok(())
    }
}

/// One CLI invocation's view of the ledger file.
pub struct Session {
    pub config: PayrollConfig,
    path: PathBuf,
    store: Arc<InMemoryStore>,
    employees: RwLock<Vec<EmployeeProfile>>,
}

impl Session {
    pub fn open(path: &str, config: PayrollConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let path = file::absolute(path)?;
        let state = if path.exists() {
            file::read_document::<LedgerState>(&path.to_string_lossy())?
        } else {
            tracing::debug!(path = %path.display(), "no ledger file yet, starting empty");
            LedgerState::default()
        };
        let store = InMemoryStore::from_snapshot(state.store)?;
        Ok(Session {
            config,
            path,
            store: Arc::new(store),
            employees: RwLock::new(state.employees),
        })
    }

    fn directory(&self) -> Arc<StaticDirectory> {
        Arc::new(StaticDirectory::new(self.employees.read().clone()))
    }

    pub fn engine(&self) -> Result<PayrollEngine, Box<dyn std::error::Error>> {
        Ok(PayrollEngine::new(
            self.config.clone(),
            self.store.clone(),
            self.directory(),
            Arc::new(LogNotifier),
        )?)
    }

    pub fn ledger(&self) -> Result<WithholdLedger, Box<dyn std::error::Error>> {
        Ok(WithholdLedger::new(
            &self.config,
            self.store.clone(),
            self.directory(),
            Arc::new(LogNotifier),
        )?)
    }

    /// Insert or replace the profile with the same employee id.
    pub fn upsert_employee(&self, profile: EmployeeProfile) {
        let mut employees = self.employees.write();
        match employees
            .iter_mut()
            .find(|e| e.employee_id == profile.employee_id)
        {
            Some(existing) => *existing = profile,
            None => employees.push(profile),
        }
        employees.sort_by(|a, b| a.employee_id.cmp(&b.employee_id));
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let state = LedgerState {
            employees: self.employees.read().clone(),
            store: self.store.snapshot(),
        };
        file::write_json_atomic(&self.path, &state)?;
        tracing::debug!(path = %self.path.display(), "ledger saved");
        Ok(())
    }
}
