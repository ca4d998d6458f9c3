use chrono::NaiveDate;
use clap::Args;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use uuid::Uuid;

use payroll_ledger_core::payroll::{
    CustomDeduction, Deductions, GeneratePayrollRequest, JurisdictionalTaxes, PayrollPeriod,
    ReissueRequest,
};
use payroll_ledger_core::ytd::PreviousMonthTax;
use payroll_ledger_core::EmployeeId;

use super::parse_named_amount;
use crate::input;
use crate::session::Session;

// ---------------------------------------------------------------------------
// Shared pay flags
// ---------------------------------------------------------------------------

/// Gross pay, jurisdictional withholding and deductions for one period
#[derive(Args)]
pub struct PayArgs {
    /// Gross pay for the period
    #[arg(long)]
    pub gross_pay: Option<Decimal>,

    /// Federal income tax withheld
    #[arg(long, default_value = "0")]
    pub federal_tax: Decimal,

    /// State income tax withheld
    #[arg(long, default_value = "0")]
    pub state_tax: Decimal,

    /// State the state tax is paid to (e.g. "CA")
    #[arg(long)]
    pub state_tax_name: Option<String>,

    /// Local income tax withheld
    #[arg(long, default_value = "0")]
    pub local_tax: Decimal,

    /// Standard deduction as NAME=AMOUNT (repeatable)
    #[arg(long, value_parser = parse_named_amount)]
    pub deduction: Vec<(String, Decimal)>,

    /// Custom deduction as NAME=AMOUNT, kept in the order given (repeatable)
    #[arg(long, value_parser = parse_named_amount)]
    pub custom_deduction: Vec<(String, Decimal)>,

    /// Employee is exempt from FICA
    #[arg(long)]
    pub fica_exempt: bool,
}

impl PayArgs {
    fn taxes(&self) -> JurisdictionalTaxes {
        JurisdictionalTaxes {
            federal_tax: self.federal_tax,
            state_tax: self.state_tax,
            local_tax: self.local_tax,
            state_tax_name: self.state_tax_name.clone(),
        }
    }

    fn deductions(&self) -> Result<Deductions, Box<dyn std::error::Error>> {
        let mut deductions = Deductions::default();
        for (name, amount) in &self.deduction {
            if deductions.other.insert(name.clone(), *amount).is_some() {
                return Err(format!("--deduction {name} given more than once").into());
            }
        }
        deductions.custom = self
            .custom_deduction
            .iter()
            .map(|(name, amount)| CustomDeduction {
                name: name.clone(),
                amount: *amount,
            })
            .collect();
        Ok(deductions)
    }
}

// ---------------------------------------------------------------------------
// Generate / preview
// ---------------------------------------------------------------------------

/// Arguments for generating or previewing a payroll record
#[derive(Args)]
pub struct GenerateArgs {
    /// Path to JSON or YAML request file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    #[arg(long)]
    pub employee_id: Option<String>,

    /// First day of the pay period (YYYY-MM-DD)
    #[arg(long)]
    pub period_start: Option<NaiveDate>,

    /// Last day of the pay period (YYYY-MM-DD)
    #[arg(long)]
    pub period_end: Option<NaiveDate>,

    /// Date the check is issued (YYYY-MM-DD)
    #[arg(long)]
    pub pay_date: Option<NaiveDate>,

    #[command(flatten)]
    pub pay: PayArgs,
}

fn generate_request(args: GenerateArgs) -> Result<GeneratePayrollRequest, Box<dyn std::error::Error>> {
    if let Some(request) = input::read_request(args.input.as_deref())? {
        return Ok(request);
    }
    let employee_id = args
        .employee_id
        .ok_or("--employee-id is required (or provide --input)")?;
    let period = PayrollPeriod::new(
        EmployeeId::new(employee_id),
        args.period_start
            .ok_or("--period-start is required (or provide --input)")?,
        args.period_end
            .ok_or("--period-end is required (or provide --input)")?,
        args.pay_date
            .ok_or("--pay-date is required (or provide --input)")?,
    )?;
    Ok(GeneratePayrollRequest {
        period,
        gross_pay: args
            .pay
            .gross_pay
            .ok_or("--gross-pay is required (or provide --input)")?,
        taxes: args.pay.taxes(),
        deductions: args.pay.deductions()?,
        fica_exempt: args.pay.fica_exempt,
    })
}

pub fn run_preview(args: GenerateArgs, session: &Session) -> Result<Value, Box<dyn std::error::Error>> {
    let request = generate_request(args)?;
    let preview = session.engine()?.preview(&request)?;
    Ok(serde_json::to_value(preview)?)
}

pub fn run_generate(args: GenerateArgs, session: &Session) -> Result<Value, Box<dyn std::error::Error>> {
    let request = generate_request(args)?;
    let outcome = session.engine()?.generate(&request)?;
    session.save()?;
    Ok(serde_json::to_value(outcome)?)
}

// ---------------------------------------------------------------------------
// Reissue / mark paid
// ---------------------------------------------------------------------------

/// Arguments for reissuing a record with corrected inputs
#[derive(Args)]
pub struct ReissueArgs {
    /// Id of the record being replaced
    #[arg(long)]
    pub record_id: Uuid,

    /// Path to JSON or YAML correction file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Why the record is being reissued
    #[arg(long)]
    pub reason: Option<String>,

    /// Who requested the reissue
    #[arg(long)]
    pub actor: Option<String>,

    #[command(flatten)]
    pub pay: PayArgs,
}

pub fn run_reissue(args: ReissueArgs, session: &Session) -> Result<Value, Box<dyn std::error::Error>> {
    let request: ReissueRequest = match input::read_request(args.input.as_deref())? {
        Some(request) => request,
        None => ReissueRequest {
            gross_pay: args
                .pay
                .gross_pay
                .ok_or("--gross-pay is required (or provide --input)")?,
            taxes: args.pay.taxes(),
            deductions: args.pay.deductions()?,
            fica_exempt: args.pay.fica_exempt,
            reason: args
                .reason
                .clone()
                .ok_or("--reason is required (or provide --input)")?,
            actor: args.actor.clone(),
        },
    };
    let outcome = session.engine()?.reissue(args.record_id, &request)?;
    session.save()?;
    Ok(serde_json::to_value(outcome)?)
}

/// Arguments naming one payroll record
#[derive(Args)]
pub struct RecordArgs {
    #[arg(long)]
    pub record_id: Uuid,
}

pub fn run_mark_paid(args: RecordArgs, session: &Session) -> Result<Value, Box<dyn std::error::Error>> {
    let record = session.engine()?.mark_paid(args.record_id)?;
    session.save()?;
    Ok(serde_json::to_value(record)?)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Arguments for listing an employee's records
#[derive(Args)]
pub struct HistoryArgs {
    #[arg(long)]
    pub employee_id: String,

    /// Only the latest record paid strictly before this date
    #[arg(long)]
    pub before: Option<NaiveDate>,
}

pub fn run_history(args: HistoryArgs, session: &Session) -> Result<Value, Box<dyn std::error::Error>> {
    let engine = session.engine()?;
    let employee_id = EmployeeId::new(args.employee_id);
    match args.before {
        Some(date) => {
            let record = engine
                .latest_before(&employee_id, date)?
                .ok_or_else(|| format!("No payroll record for {employee_id} before {date}"))?;
            Ok(serde_json::to_value(record)?)
        }
        None => Ok(serde_json::to_value(engine.history(&employee_id)?)?),
    }
}

/// Arguments naming an employee and tax year
#[derive(Args)]
pub struct YtdArgs {
    #[arg(long)]
    pub employee_id: String,

    /// Calendar year (defaults to the configured tax year)
    #[arg(long)]
    pub year: Option<i32>,
}

pub fn run_ytd(args: YtdArgs, session: &Session) -> Result<Value, Box<dyn std::error::Error>> {
    let year = args.year.unwrap_or(session.config.tax_year);
    let snapshot = session
        .engine()?
        .ytd(&EmployeeId::new(args.employee_id), year)?;
    Ok(serde_json::to_value(snapshot)?)
}

pub fn run_recover(args: YtdArgs, session: &Session) -> Result<Value, Box<dyn std::error::Error>> {
    let year = args.year.unwrap_or(session.config.tax_year);
    let employee_id = EmployeeId::new(args.employee_id);
    let engine = session.engine()?;
    let reapplied = engine.recover(&employee_id, year)?;
    if !reapplied.is_empty() {
        session.save()?;
    }
    Ok(json!({
        "employee_id": employee_id,
        "year": year,
        "reapplied": reapplied,
        "ytd": engine.ytd(&employee_id, year)?,
    }))
}

// ---------------------------------------------------------------------------
// Seeds
// ---------------------------------------------------------------------------

/// Arguments for importing an opening balance
#[derive(Args)]
pub struct SeedArgs {
    /// Path to JSON or YAML seed file
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_record_seed(args: SeedArgs, session: &Session) -> Result<Value, Box<dyn std::error::Error>> {
    let seed: PreviousMonthTax = input::read_request(args.input.as_deref())?
        .ok_or("--input <seed.json> or stdin required for an opening balance")?;
    let engine = session.engine()?;
    engine.record_seed(&seed)?;
    session.save()?;
    Ok(serde_json::to_value(engine.ytd(&seed.employee_id, seed.year())?)?)
}
