use clap::Args;
use rust_decimal::Decimal;
use serde_json::Value;

use payroll_ledger_core::withhold::{HoursReport, WithholdFilter, WithholdKey, WithholdStatus};
use payroll_ledger_core::{AuditNote, CompanyId, EmployeeId};

use super::page_request;
use crate::input;
use crate::session::Session;

/// Employee, project, month, year and entry type naming one ledger row
#[derive(Args)]
pub struct KeyArgs {
    #[arg(long)]
    pub employee_id: Option<String>,

    #[arg(long)]
    pub project: Option<String>,

    /// Month of service (1-12)
    #[arg(long)]
    pub month: Option<u32>,

    #[arg(long)]
    pub year: Option<i32>,

    /// Engagement type, e.g. contract or w2
    #[arg(long, default_value = "contract")]
    pub entry_type: String,
}

impl KeyArgs {
    fn key(&self) -> Result<WithholdKey, Box<dyn std::error::Error>> {
        Ok(WithholdKey::new(
            EmployeeId::new(
                self.employee_id
                    .clone()
                    .ok_or("--employee-id is required (or provide --input)")?,
            ),
            self.project
                .clone()
                .ok_or("--project is required (or provide --input)")?,
            self.month.ok_or("--month is required (or provide --input)")?,
            self.year.ok_or("--year is required (or provide --input)")?,
            self.entry_type.clone(),
        ))
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Arguments for reporting one side of a withhold entry
#[derive(Args)]
pub struct HoursArgs {
    /// Path to JSON or YAML report file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    #[command(flatten)]
    pub key: KeyArgs,

    #[arg(long)]
    pub hours: Option<Decimal>,

    #[arg(long)]
    pub rate: Option<Decimal>,

    /// Amount stated on the source document, checked against hours × rate
    #[arg(long)]
    pub amount: Option<Decimal>,

    /// Free-text client bill rate
    #[arg(long)]
    pub bill_rate: Option<String>,
}

fn hours_report(args: HoursArgs) -> Result<HoursReport, Box<dyn std::error::Error>> {
    if let Some(report) = input::read_request(args.input.as_deref())? {
        return Ok(report);
    }
    let mut report = HoursReport::new(
        args.key.key()?,
        args.hours.ok_or("--hours is required (or provide --input)")?,
        args.rate.ok_or("--rate is required (or provide --input)")?,
    );
    report.amount = args.amount;
    report.bill_rate = args.bill_rate;
    Ok(report)
}

pub fn run_withhold_actual(args: HoursArgs, session: &Session) -> Result<Value, Box<dyn std::error::Error>> {
    let report = hours_report(args)?;
    let entry = session.ledger()?.report_actual(&report)?;
    session.save()?;
    Ok(serde_json::to_value(entry)?)
}

pub fn run_withhold_paid(args: HoursArgs, session: &Session) -> Result<Value, Box<dyn std::error::Error>> {
    let report = hours_report(args)?;
    let entry = session.ledger()?.report_paid(&report)?;
    session.save()?;
    Ok(serde_json::to_value(entry)?)
}

/// Arguments for forcing a withhold status
#[derive(Args)]
pub struct OverrideArgs {
    #[command(flatten)]
    pub key: KeyArgs,

    /// open, partially-paid or settled
    #[arg(long)]
    pub status: WithholdStatus,

    /// Why the derived status is being overridden
    #[arg(long)]
    pub reason: String,

    #[arg(long)]
    pub actor: Option<String>,
}

pub fn run_withhold_override(args: OverrideArgs, session: &Session) -> Result<Value, Box<dyn std::error::Error>> {
    let key = args.key.key()?;
    let entry = session
        .ledger()?
        .override_status(&key, args.status, AuditNote::now(args.reason, args.actor))?;
    session.save()?;
    Ok(serde_json::to_value(entry)?)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Arguments for company balances
#[derive(Args)]
pub struct BalanceArgs {
    /// Company to total; omit for every company with entries
    #[arg(long)]
    pub company_id: Option<CompanyId>,
}

pub fn run_withhold_balance(args: BalanceArgs, session: &Session) -> Result<Value, Box<dyn std::error::Error>> {
    let ledger = session.ledger()?;
    match args.company_id {
        Some(company_id) => Ok(serde_json::to_value(ledger.balance_by_company(company_id)?)?),
        None => Ok(serde_json::to_value(ledger.company_balances()?)?),
    }
}

/// Arguments for a company's withhold history
#[derive(Args)]
pub struct WithholdHistoryArgs {
    #[arg(long)]
    pub company_id: CompanyId,

    /// Zero-based page number
    #[arg(long)]
    pub page: Option<usize>,

    /// Rows per page
    #[arg(long)]
    pub size: Option<usize>,
}

pub fn run_withhold_history(
    args: WithholdHistoryArgs,
    session: &Session,
) -> Result<Value, Box<dyn std::error::Error>> {
    let page = page_request(args.page, args.size)?;
    let rows = session
        .ledger()?
        .employee_withhold_history(args.company_id, page)?;
    Ok(serde_json::to_value(rows)?)
}

/// Arguments for filtering withhold entries
#[derive(Args)]
pub struct SearchArgs {
    #[arg(long)]
    pub employee_id: Option<String>,

    /// Case-insensitive substring of the project name
    #[arg(long)]
    pub project: Option<String>,

    #[arg(long)]
    pub month: Option<u32>,

    #[arg(long)]
    pub year: Option<i32>,

    #[arg(long)]
    pub entry_type: Option<String>,

    #[arg(long)]
    pub status: Option<WithholdStatus>,

    #[arg(long)]
    pub page: Option<usize>,

    #[arg(long)]
    pub size: Option<usize>,
}

pub fn run_withhold_search(args: SearchArgs, session: &Session) -> Result<Value, Box<dyn std::error::Error>> {
    let page = page_request(args.page, args.size)?;
    let filter = WithholdFilter {
        employee_id: args.employee_id.map(EmployeeId::new),
        project_name: args.project,
        month: args.month,
        year: args.year,
        entry_type: args.entry_type,
        status: args.status,
    };
    Ok(serde_json::to_value(session.ledger()?.search(&filter, page)?)?)
}
