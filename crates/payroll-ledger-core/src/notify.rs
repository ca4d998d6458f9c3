use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::*;

#[derive(Debug, Error)]
#[error("Notification failed: {0}")]
pub struct NotifyError(pub String);

/// Events published after a ledger mutation has been committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    PayrollGenerated {
        record_id: Uuid,
        employee_id: EmployeeId,
        pay_date: NaiveDate,
        net_pay: Money,
    },
    PayrollReissued {
        record_id: Uuid,
        supersedes: Uuid,
        employee_id: EmployeeId,
        net_pay: Money,
    },
    WithholdSettled {
        entry_id: Uuid,
        employee_id: EmployeeId,
        project_name: String,
        month: u32,
        year: i32,
        entry_type: String,
    },
}

/// Fire-and-forget sink for ledger events. A failure is logged and never
/// undoes the mutation that produced the event.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &LedgerEvent) -> Result<(), NotifyError>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn notify(&self, _event: &LedgerEvent) -> Result<(), NotifyError> {
        Ok(())
    }
}

pub(crate) fn dispatch(notifier: &dyn Notifier, event: LedgerEvent) {
    if let Err(e) = notifier.notify(&event) {
        tracing::warn!(error = %e, ?event, "notifier failed; mutation kept");
    }
}
