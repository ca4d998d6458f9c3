mod commands;
mod input;
mod output;
mod session;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::EnvFilter;

use commands::employees::EmployeeArgs;
use commands::payroll::{
    GenerateArgs, HistoryArgs, RecordArgs, ReissueArgs, SeedArgs, YtdArgs,
};
use commands::taxes::StatutoryTaxArgs;
use commands::withhold::{
    BalanceArgs, HoursArgs, OverrideArgs, SearchArgs, WithholdHistoryArgs,
};
use session::Session;

/// Payroll ledger, year-to-date accrual and withhold reconciliation
#[derive(Parser)]
#[command(
    name = "payroll",
    version,
    about = "Payroll ledger, year-to-date accrual and withhold reconciliation",
    long_about = "Generates payroll records with statutory FICA withholding computed \
                  from year-to-date totals, keeps the per-employee cumulative rows, and \
                  reconciles actual-versus-paid withhold balances. State is kept in a \
                  JSON ledger file between invocations."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Payroll configuration file (YAML or JSON)
    #[arg(long, global = true)]
    config: Option<String>,

    /// Tax year to use when no configuration file is given
    #[arg(long, global = true)]
    tax_year: Option<i32>,

    /// Ledger state file
    #[arg(long, default_value = "ledger.json", global = true)]
    state: String,

    /// Enable verbose logging to stderr. Repeat for more (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Social Security, Medicare and Additional Medicare for one period
    StatutoryTaxes(StatutoryTaxArgs),
    /// Compute a payroll record without saving it
    Preview(GenerateArgs),
    /// Generate and save the payroll record for a period
    Generate(GenerateArgs),
    /// Replace a generated record with corrected inputs
    Reissue(ReissueArgs),
    /// Mark a payroll record as paid
    MarkPaid(RecordArgs),
    /// Active payroll records for an employee, newest first
    History(HistoryArgs),
    /// Year-to-date totals for an employee
    Ytd(YtdArgs),
    /// Re-apply persisted records missing from the year-to-date row
    Recover(YtdArgs),
    /// Store an opening-balance seed imported from a prior system
    RecordSeed(SeedArgs),
    /// Add or update an employee in the directory
    EmployeeUpsert(EmployeeArgs),
    /// Report actual hours and rate for a withhold entry
    WithholdActual(HoursArgs),
    /// Report paid hours and rate for a withhold entry
    WithholdPaid(HoursArgs),
    /// Force a withhold status with an audit note
    WithholdOverride(OverrideArgs),
    /// Withhold balance for one company, or every company
    WithholdBalance(BalanceArgs),
    /// Withhold entries of a company's employees with names attached
    WithholdHistory(WithholdHistoryArgs),
    /// Filter withhold entries
    WithholdSearch(SearchArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn main() {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => EnvFilter::new("warn"),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Version = cli.command {
        println!("payroll {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    let result = session::load_config(cli.config.as_deref(), cli.tax_year)
        .and_then(|config| Session::open(&cli.state, config))
        .and_then(|session| run(cli.command, &session));

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}

fn run(command: Commands, session: &Session) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    match command {
        Commands::StatutoryTaxes(args) => commands::taxes::run_statutory_taxes(args, session),
        Commands::Preview(args) => commands::payroll::run_preview(args, session),
        Commands::Generate(args) => commands::payroll::run_generate(args, session),
        Commands::Reissue(args) => commands::payroll::run_reissue(args, session),
        Commands::MarkPaid(args) => commands::payroll::run_mark_paid(args, session),
        Commands::History(args) => commands::payroll::run_history(args, session),
        Commands::Ytd(args) => commands::payroll::run_ytd(args, session),
        Commands::Recover(args) => commands::payroll::run_recover(args, session),
        Commands::RecordSeed(args) => commands::payroll::run_record_seed(args, session),
        Commands::EmployeeUpsert(args) => commands::employees::run_employee_upsert(args, session),
        Commands::WithholdActual(args) => commands::withhold::run_withhold_actual(args, session),
        Commands::WithholdPaid(args) => commands::withhold::run_withhold_paid(args, session),
        Commands::WithholdOverride(args) => commands::withhold::run_withhold_override(args, session),
        Commands::WithholdBalance(args) => commands::withhold::run_withhold_balance(args, session),
        Commands::WithholdHistory(args) => commands::withhold::run_withhold_history(args, session),
        Commands::WithholdSearch(args) => commands::withhold::run_withhold_search(args, session),
        Commands::Version => Ok(serde_json::json!({ "version": env!("CARGO_PKG_VERSION") })),
    }
}
