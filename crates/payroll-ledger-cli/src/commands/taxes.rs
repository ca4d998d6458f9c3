use clap::Args;
use payroll_ledger_core::tax::{StatutoryTaxInput, TaxCalculator};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::input;
use crate::session::Session;

/// Arguments for a standalone statutory tax computation
#[derive(Args)]
pub struct StatutoryTaxArgs {
    /// Path to JSON or YAML input file (overrides individual flags)
    #[arg(long)]
    pub input: Option<String>,

    /// Gross pay for the period
    #[arg(long)]
    pub gross_pay: Option<Decimal>,

    /// Year-to-date gross pay before this period
    #[arg(long, default_value = "0")]
    pub ytd_gross_before: Decimal,

    /// Employee is exempt from FICA
    #[arg(long)]
    pub fica_exempt: bool,
}

pub fn run_statutory_taxes(
    args: StatutoryTaxArgs,
    session: &Session,
) -> Result<Value, Box<dyn std::error::Error>> {
    let tax_input: StatutoryTaxInput = match input::read_request(args.input.as_deref())? {
        Some(request) => request,
        None => StatutoryTaxInput {
            gross_pay: args
                .gross_pay
                .ok_or("--gross-pay is required (or provide --input)")?,
            ytd_gross_before: args.ytd_gross_before,
            fica_exempt: args.fica_exempt,
        },
    };

    let calculator = TaxCalculator::new(session.config.rates.clone(), session.config.guard());
    let result = calculator.calculate(&tax_input)?;
    Ok(serde_json::to_value(result)?)
}
