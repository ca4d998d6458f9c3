use clap::Args;
use serde_json::Value;

use payroll_ledger_core::store::EmployeeProfile;
use payroll_ledger_core::{CompanyId, EmployeeId};

use crate::session::Session;

/// Arguments for adding or updating a directory entry
#[derive(Args)]
pub struct EmployeeArgs {
    #[arg(long)]
    pub employee_id: String,

    #[arg(long)]
    pub first_name: String,

    #[arg(long)]
    pub last_name: String,

    /// Client company the employee is placed with
    #[arg(long)]
    pub company_id: Option<CompanyId>,

    #[arg(long)]
    pub company_name: Option<String>,
}

pub fn run_employee_upsert(args: EmployeeArgs, session: &Session) -> Result<Value, Box<dyn std::error::Error>> {
    if args.employee_id.trim().is_empty() {
        return Err("--employee-id must not be empty".into());
    }
    let profile = EmployeeProfile {
        employee_id: EmployeeId::new(args.employee_id),
        first_name: args.first_name,
        last_name: args.last_name,
        company_id: args.company_id,
        company_name: args.company_name,
    };
    session.upsert_employee(profile.clone());
    session.save()?;
    Ok(serde_json::to_value(profile)?)
}
