use chrono::{Duration, NaiveDate};
use payroll_ledger_core::memory::{InMemoryStore, StaticDirectory};
use payroll_ledger_core::notify::{LedgerEvent, NoopNotifier, Notifier, NotifyError};
use payroll_ledger_core::payroll::*;
use payroll_ledger_core::store::{EmployeeProfile, RecordStore, YtdStore};
use payroll_ledger_core::ytd::{PreviousMonthTax, YtdRecord, YtdSource};
use payroll_ledger_core::{CompanyId, EmployeeId, Money, PayrollConfig, PayrollError, PayrollResult};
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ===========================================================================
// Fixtures
// ===========================================================================

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

fn directory() -> Arc<StaticDirectory> {
    Arc::new(StaticDirectory::new(vec![EmployeeProfile {
        employee_id: EmployeeId::new("E1"),
        first_name: "Katherine".to_string(),
        last_name: "Johnson".to_string(),
        company_id: Some(10),
        company_name: Some("Langley Consulting".to_string()),
    }]))
}

fn engine_with_config(config: PayrollConfig) -> PayrollEngine {
    PayrollEngine::new(
        config,
        Arc::new(InMemoryStore::new()),
        directory(),
        Arc::new(NoopNotifier),
    )
    .unwrap()
}

fn engine() -> PayrollEngine {
    engine_with_config(PayrollConfig::default())
}

fn request(
    employee: &str,
    start: NaiveDate,
    end: NaiveDate,
    pay: NaiveDate,
    gross: Money,
) -> GeneratePayrollRequest {
    GeneratePayrollRequest {
        period: PayrollPeriod::new(EmployeeId::new(employee), start, end, pay).unwrap(),
        gross_pay: gross,
        taxes: JurisdictionalTaxes {
            federal_tax: dec!(1500),
            state_tax: dec!(400),
            local_tax: dec!(0),
            state_tax_name: None,
        },
        deductions: Deductions::default(),
        fica_exempt: false,
    }
}

fn seed(employee: &str, gross: Money, ss: Money, medicare: Money) -> PreviousMonthTax {
    PreviousMonthTax {
        employee_id: EmployeeId::new(employee),
        period_start: d(2024, 1, 1),
        period_end: d(2024, 6, 30),
        federal_tax_withheld: dec!(30000),
        state_tax_withheld: dec!(9000),
        state_tax_name: Some("CA".to_string()),
        local_tax_withheld: dec!(0),
        social_security_withheld: ss,
        medicare_withheld: medicare,
        total_gross_pay: gross,
        total_net_pay: gross - dec!(39000) - ss - medicare,
        h1b_wage: None,
        h1b_prevailing_wage: None,
        additional_fields: BTreeMap::new(),
    }
}

// ===========================================================================
// Net pay
// ===========================================================================

#[test]
fn test_net_pay_is_gross_less_taxes_and_deductions() {
    let engine = engine();
    let mut req = request("E1", d(2024, 1, 1), d(2024, 1, 15), d(2024, 1, 19), dec!(5000));
    req.taxes = JurisdictionalTaxes {
        federal_tax: dec!(612.34),
        state_tax: dec!(201.11),
        local_tax: dec!(15.01),
        state_tax_name: Some("VA".to_string()),
    };
    req.deductions
        .other
        .insert("healthInsurance".to_string(), dec!(120.00));
    req.deductions.custom.push(CustomDeduction {
        name: "Parking".to_string(),
        amount: dec!(45.55),
    });

    let out = engine.generate(&req).unwrap();
    let r = &out.record;
    assert_eq!(r.social_security, dec!(310.00));
    assert_eq!(r.medicare, dec!(72.50));
    assert_eq!(r.additional_medicare, dec!(0));
    assert_eq!(r.net_pay, dec!(3623.49));
    assert_eq!(
        r.net_pay,
        r.gross_pay
            - (r.federal_tax
                + r.state_tax
                + r.local_tax
                + r.social_security
                + r.medicare
                + r.additional_medicare)
            - r.other_deductions.values().copied().sum::<Decimal>()
            - r.custom_deductions.iter().map(|c| c.amount).sum::<Decimal>()
    );
    assert_eq!(r.state_tax_name.as_deref(), Some("VA"));
    assert_eq!(r.status, RecordStatus::Processed);
}

#[test]
fn test_negative_net_pay_rejected_without_side_effects() {
    let engine = engine();
    let mut req = request("E1", d(2024, 1, 1), d(2024, 1, 15), d(2024, 1, 19), dec!(1000));
    req.taxes.federal_tax = dec!(950);
    req.taxes.state_tax = dec!(0);

    match engine.generate(&req).unwrap_err() {
        PayrollError::InsufficientGrossPay {
            employee_id,
            net_pay,
            ..
        } => {
            assert_eq!(employee_id, "E1");
            assert_eq!(net_pay, dec!(-26.50));
        }
        other => panic!("Expected InsufficientGrossPay, got {:?}", other),
    }
    assert!(engine.history(&EmployeeId::new("E1")).unwrap().is_empty());
    assert_eq!(
        engine.ytd(&EmployeeId::new("E1"), 2024).unwrap().source,
        YtdSource::Zero
    );
}

// ===========================================================================
// Statutory caps across a year
// ===========================================================================

#[test]
fn test_yearly_sums_respect_cap_and_threshold_exactly() {
    let engine = engine();
    let gross = dec!(10000.01);
    let mut ss_total = dec!(0);
    let mut am_total = dec!(0);
    let mut medicare_total = dec!(0);

    for i in 0..26 {
        let start = d(2024, 1, 1) + Duration::days(14 * i);
        let end = start + Duration::days(13);
        let pay = end + Duration::days(1);
        let out = engine.generate(&request("E1", start, end, pay, gross)).unwrap();
        ss_total += out.record.social_security;
        am_total += out.record.additional_medicare;
        medicare_total += out.record.medicare;
    }

    let year_gross = gross * dec!(26);
    // Social Security never exceeds cap × rate
    assert_eq!(ss_total, dec!(10453.20));
    assert!(ss_total <= dec!(168600) * dec!(0.062));
    // Additional Medicare equals max(0, gross - threshold) × rate, rounded once
    assert_eq!(
        am_total,
        ((year_gross - dec!(200000)) * dec!(0.009)).round_dp(2)
    );
    assert_eq!(am_total, dec!(540.00));

    let ytd = engine.ytd(&EmployeeId::new("E1"), 2024).unwrap();
    assert_eq!(ytd.totals.gross_pay, year_gross);
    assert_eq!(ytd.totals.social_security, ss_total);
    assert_eq!(ytd.totals.additional_medicare, am_total);
    assert_eq!(ytd.totals.medicare, medicare_total);
    assert_eq!(ytd.pay_periods_count, 26);
}

#[test]
fn test_social_security_cap_crossing_from_seed() {
    // SS cap $168,600 at 6.2%, YTD $168,000, period $2,000 -> $37.20
    let engine = engine();
    engine
        .record_seed(&seed("E2", dec!(168000), dec!(10416.00), dec!(2436.00)))
        .unwrap();

    let mut req = request("E2", d(2024, 7, 1), d(2024, 7, 15), d(2024, 7, 19), dec!(2000));
    req.taxes.federal_tax = dec!(300);
    req.taxes.state_tax = dec!(100);
    let out = engine.generate(&req).unwrap();

    assert_eq!(out.record.social_security, dec!(37.20));
    assert_eq!(out.record.medicare, dec!(29.00));
    assert_eq!(out.record.additional_medicare, dec!(0));
    assert_eq!(out.record.ytd_gross_pay, dec!(170000));
    // State name falls back to the seed
    assert_eq!(out.record.state_tax_name.as_deref(), Some("CA"));
    // No company in the directory, no check number
    assert_eq!(out.record.check_number, None);
}

#[test]
fn test_additional_medicare_threshold_crossing() {
    // YTD $195,000, period $10,000, threshold $200,000 at 0.9% -> $45.00
    let engine = engine();
    engine
        .record_seed(&seed("E3", dec!(195000), dec!(10453.20), dec!(2827.50)))
        .unwrap();

    let out = engine
        .generate(&request("E3", d(2024, 7, 1), d(2024, 7, 31), d(2024, 8, 2), dec!(10000)))
        .unwrap();
    assert_eq!(out.record.additional_medicare, dec!(45.00));
    assert_eq!(out.record.social_security, dec!(0));
    assert_eq!(out.ytd.totals.additional_medicare, dec!(45.00));
}

#[test]
fn test_fica_exempt_employee_pays_no_statutory_tax() {
    let engine = engine();
    let mut req = request("E1", d(2024, 1, 1), d(2024, 1, 15), d(2024, 1, 19), dec!(5000));
    req.fica_exempt = true;
    let out = engine.generate(&req).unwrap();
    assert_eq!(out.record.social_security, dec!(0));
    assert_eq!(out.record.medicare, dec!(0));
    assert_eq!(out.record.net_pay, dec!(3100));
}

// ===========================================================================
// Idempotence and overlap
// ===========================================================================

#[test]
fn test_identical_replay_returns_original_and_keeps_ytd() {
    let engine = engine();
    let req = request("E1", d(2024, 1, 1), d(2024, 1, 15), d(2024, 1, 19), dec!(5000));
    let first = engine.generate(&req).unwrap();
    let before = engine.ytd(&EmployeeId::new("E1"), 2024).unwrap();

    let replay = engine.generate(&req).unwrap();
    assert!(replay.replayed);
    assert_eq!(replay.record.id, first.record.id);
    assert_eq!(replay.record.check_number, first.record.check_number);
    assert_eq!(engine.ytd(&EmployeeId::new("E1"), 2024).unwrap(), before);
    assert_eq!(engine.history(&EmployeeId::new("E1")).unwrap().len(), 1);
}

#[test]
fn test_changed_state_name_is_not_a_replay() {
    let engine = engine();
    let mut req = request("E1", d(2024, 1, 1), d(2024, 1, 15), d(2024, 1, 19), dec!(5000));
    req.taxes.state_tax_name = Some("CA".to_string());
    engine.generate(&req).unwrap();

    req.taxes.state_tax_name = Some("NY".to_string());
    match engine.generate(&req).unwrap_err() {
        PayrollError::DuplicatePeriod { employee_id, .. } => assert_eq!(employee_id, "E1"),
        other => panic!("Expected DuplicatePeriod, got {:?}", other),
    }
}

#[test]
fn test_overlapping_period_rejected() {
    let engine = engine();
    engine
        .generate(&request("E1", d(2024, 1, 1), d(2024, 1, 15), d(2024, 1, 19), dec!(5000)))
        .unwrap();
    match engine
        .generate(&request("E1", d(2024, 1, 10), d(2024, 1, 24), d(2024, 1, 26), dec!(5000)))
        .unwrap_err()
    {
        PayrollError::OverlappingPeriod {
            period, existing, ..
        } => {
            assert_eq!(period, "2024-01-10..2024-01-24");
            assert_eq!(existing, "2024-01-01..2024-01-15");
        }
        other => panic!("Expected OverlappingPeriod, got {:?}", other),
    }
}

#[test]
fn test_preview_matches_generate() {
    let engine = engine();
    let req = request("E1", d(2024, 1, 1), d(2024, 1, 15), d(2024, 1, 19), dec!(7500));
    let preview = engine.preview(&req).unwrap();
    let generated = engine.generate(&req).unwrap();
    assert_eq!(preview.result.net_pay, generated.record.net_pay);
    assert_eq!(
        preview.result.statutory.social_security,
        generated.record.social_security
    );
    assert_eq!(preview.result.ytd_gross_pay, generated.record.ytd_gross_pay);
}

// ===========================================================================
// Queries
// ===========================================================================

#[test]
fn test_history_and_latest_before() {
    let engine = engine();
    let p1 = engine
        .generate(&request("E1", d(2024, 1, 1), d(2024, 1, 15), d(2024, 1, 19), dec!(5000)))
        .unwrap();
    let p2 = engine
        .generate(&request("E1", d(2024, 1, 16), d(2024, 1, 31), d(2024, 2, 2), dec!(5000)))
        .unwrap();
    let p3 = engine
        .generate(&request("E1", d(2024, 2, 1), d(2024, 2, 15), d(2024, 2, 16), dec!(5000)))
        .unwrap();

    let ids: Vec<_> = engine
        .history(&EmployeeId::new("E1"))
        .unwrap()
        .into_iter()
        .map(|r| r.id)
        .collect();
    assert_eq!(ids, vec![p3.record.id, p2.record.id, p1.record.id]);

    let e1 = EmployeeId::new("E1");
    assert_eq!(
        engine.latest_before(&e1, d(2024, 2, 1)).unwrap().map(|r| r.id),
        Some(p2.record.id)
    );
    assert_eq!(
        engine.latest_before(&e1, d(2024, 1, 31)).unwrap().map(|r| r.id),
        Some(p1.record.id)
    );
    assert!(engine.latest_before(&e1, d(2024, 1, 1)).unwrap().is_none());
    assert_eq!(engine.latest(&e1).unwrap().map(|r| r.id), Some(p3.record.id));

    // Check numbers are issued per company in order
    assert_eq!(p1.record.check_number, Some(1));
    assert_eq!(p3.record.check_number, Some(3));
}

// ===========================================================================
// Reissue
// ===========================================================================

#[test]
fn test_reissue_supersedes_and_replaces_ytd_contribution() {
    let engine = engine();
    let e1 = EmployeeId::new("E1");
    let first = engine
        .generate(&request("E1", d(2024, 1, 1), d(2024, 1, 15), d(2024, 1, 19), dec!(5000)))
        .unwrap();
    let second = engine
        .generate(&request("E1", d(2024, 1, 16), d(2024, 1, 31), d(2024, 2, 2), dec!(6000)))
        .unwrap();

    let correction = ReissueRequest {
        gross_pay: dec!(5500),
        taxes: JurisdictionalTaxes {
            federal_tax: dec!(1400),
            state_tax: dec!(380),
            local_tax: dec!(0),
            state_tax_name: None,
        },
        deductions: Deductions::default(),
        fica_exempt: false,
        reason: "Overtime hours were double counted".to_string(),
        actor: Some("payroll-admin".to_string()),
    };

    // Not the latest period of the year
    match engine.reissue(first.record.id, &correction).unwrap_err() {
        PayrollError::InvalidInput { field, .. } => assert_eq!(field, "record_id"),
        other => panic!("Expected InvalidInput, got {:?}", other),
    }

    let reissued = engine.reissue(second.record.id, &correction).unwrap();
    assert_eq!(reissued.record.supersedes, Some(second.record.id));
    assert_eq!(reissued.record.social_security, dec!(341.00));
    assert_eq!(reissued.ytd.totals.gross_pay, dec!(10500));
    assert_eq!(reissued.ytd.pay_periods_count, 2);
    assert_eq!(reissued.record.ytd_gross_pay, dec!(10500));
    assert!(reissued.record.reissue_note.is_some());

    let old = engine.record(second.record.id).unwrap();
    assert_eq!(old.status, RecordStatus::Superseded);
    assert_eq!(old.superseded_by, Some(reissued.record.id));

    let history = engine.history(&e1).unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].id, reissued.record.id);

    // A superseded record cannot be reissued again
    assert!(engine.reissue(second.record.id, &correction).is_err());
}

// ===========================================================================
// Seeds and opening balances
// ===========================================================================

#[test]
fn test_seed_rejected_once_ytd_row_exists() {
    let engine = engine();
    engine
        .generate(&request("E1", d(2024, 1, 1), d(2024, 1, 15), d(2024, 1, 19), dec!(5000)))
        .unwrap();
    match engine
        .record_seed(&seed("E1", dec!(50000), dec!(3100), dec!(725)))
        .unwrap_err()
    {
        PayrollError::InvalidInput { field, .. } => assert_eq!(field, "employee_id"),
        other => panic!("Expected InvalidInput, got {:?}", other),
    }
}

#[test]
fn test_opening_balance_required_mid_year() {
    let config = PayrollConfig {
        require_opening_balance: true,
        ..PayrollConfig::default()
    };
    let engine = engine_with_config(config);
    match engine
        .generate(&request("E1", d(2024, 3, 1), d(2024, 3, 15), d(2024, 3, 20), dec!(5000)))
        .unwrap_err()
    {
        PayrollError::NotFound { entity, key } => {
            assert_eq!(entity, "opening balance");
            assert_eq!(key, "E1 2024");
        }
        other => panic!("Expected NotFound, got {:?}", other),
    }
    // A January start needs no opening balance
    assert!(engine
        .generate(&request("E1", d(2024, 1, 1), d(2024, 1, 15), d(2024, 1, 19), dec!(5000)))
        .is_ok());
}

#[test]
fn test_december_period_paid_in_january_opens_the_year() {
    let config = PayrollConfig {
        require_opening_balance: true,
        ..PayrollConfig::for_tax_year(2025).unwrap()
    };
    let engine = engine_with_config(config);
    let out = engine
        .generate(&request("E1", d(2024, 12, 16), d(2024, 12, 31), d(2025, 1, 3), dec!(5000)))
        .unwrap();
    assert_eq!(out.ytd.year, 2025);
    assert_eq!(out.ytd.totals.gross_pay, dec!(5000));
}

// ===========================================================================
// Failed year-to-date advances
// ===========================================================================

/// Store whose next `save_ytd` fails once after `fail_next_save` is called.
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    fail_next: AtomicBool,
}

impl FlakyStore {
    fn fail_next_save(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl YtdStore for FlakyStore {
    fn find_by_employee_and_year(
        &self,
        employee_id: &EmployeeId,
        year: i32,
    ) -> PayrollResult<Option<YtdRecord>> {
        self.inner.find_by_employee_and_year(employee_id, year)
    }

    fn save_ytd(&self, row: &YtdRecord) -> PayrollResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(PayrollError::Storage("db down".to_string()));
        }
        self.inner.save_ytd(row)
    }

    fn insert_seed(&self, seed: &PreviousMonthTax) -> PayrollResult<()> {
        self.inner.insert_seed(seed)
    }

    fn seeds_for_employee(&self, employee_id: &EmployeeId) -> PayrollResult<Vec<PreviousMonthTax>> {
        self.inner.seeds_for_employee(employee_id)
    }
}

impl RecordStore for FlakyStore {
    fn insert_record(&self, record: &PayrollRecord) -> PayrollResult<()> {
        self.inner.insert_record(record)
    }

    fn update_record(&self, record: &PayrollRecord) -> PayrollResult<()> {
        self.inner.update_record(record)
    }

    fn find_record(&self, id: Uuid) -> PayrollResult<Option<PayrollRecord>> {
        self.inner.find_record(id)
    }

    fn records_for_employee(&self, employee_id: &EmployeeId) -> PayrollResult<Vec<PayrollRecord>> {
        self.inner.records_for_employee(employee_id)
    }

    fn find_latest_by_employee(&self, employee_id: &EmployeeId) -> PayrollResult<Option<PayrollRecord>> {
        self.inner.find_latest_by_employee(employee_id)
    }

    fn find_before_date(
        &self,
        employee_id: &EmployeeId,
        date: NaiveDate,
    ) -> PayrollResult<Option<PayrollRecord>> {
        self.inner.find_before_date(employee_id, date)
    }

    fn next_check_number(&self, company_id: CompanyId) -> PayrollResult<u64> {
        self.inner.next_check_number(company_id)
    }
}

#[test]
fn test_next_period_is_priced_after_failed_advance_is_repaired() {
    let store = Arc::new(FlakyStore::default());
    let engine = PayrollEngine::new(
        PayrollConfig::default(),
        store.clone(),
        directory(),
        Arc::new(NoopNotifier),
    )
    .unwrap();
    let employee = EmployeeId::new("E1");

    store.fail_next_save();
    let half_year = request("E1", d(2024, 1, 1), d(2024, 6, 30), d(2024, 7, 5), dec!(168600));
    match engine.generate(&half_year).unwrap_err() {
        PayrollError::Storage(msg) => assert_eq!(msg, "db down"),
        other => panic!("Expected Storage, got {:?}", other),
    }
    // The record was persisted; the row never saw it
    assert_eq!(engine.history(&employee).unwrap().len(), 1);

    let preview = engine
        .preview(&request("E1", d(2024, 7, 1), d(2024, 7, 31), d(2024, 8, 5), dec!(10000)))
        .unwrap();
    assert_eq!(preview.result.statutory.social_security, dec!(0));
    assert_eq!(preview.result.ytd_gross_pay, dec!(178600));

    let july = engine
        .generate(&request("E1", d(2024, 7, 1), d(2024, 7, 31), d(2024, 8, 5), dec!(10000)))
        .unwrap();
    assert_eq!(july.record.social_security, dec!(0));
    assert_eq!(july.record.ytd_gross_pay, dec!(178600));

    let ytd = engine.ytd(&employee, 2024).unwrap();
    assert_eq!(ytd.totals.gross_pay, dec!(178600));
    assert_eq!(ytd.totals.social_security, dec!(10453.20));
    assert_eq!(ytd.pay_periods_count, 2);
    assert!(engine.recover(&employee, 2024).unwrap().is_empty());
}

// ===========================================================================
// Notifications
// ===========================================================================

#[derive(Default)]
struct Recording(Mutex<Vec<LedgerEvent>>);

impl Notifier for Recording {
    fn notify(&self, event: &LedgerEvent) -> Result<(), NotifyError> {
        self.0.lock().unwrap().push(event.clone());
        Ok(())
    }
}

struct Broken;

impl Notifier for Broken {
    fn notify(&self, _event: &LedgerEvent) -> Result<(), NotifyError> {
        Err(NotifyError("smtp unavailable".to_string()))
    }
}

#[test]
fn test_generate_notifies_once_per_record() {
    let recording = Arc::new(Recording::default());
    let engine = PayrollEngine::new(
        PayrollConfig::default(),
        Arc::new(InMemoryStore::new()),
        directory(),
        recording.clone(),
    )
    .unwrap();
    let req = request("E1", d(2024, 1, 1), d(2024, 1, 15), d(2024, 1, 19), dec!(5000));
    engine.generate(&req).unwrap();
    engine.generate(&req).unwrap();

    let events = recording.0.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], LedgerEvent::PayrollGenerated { .. }));
}

#[test]
fn test_notifier_failure_does_not_roll_back() {
    let engine = PayrollEngine::new(
        PayrollConfig::default(),
        Arc::new(InMemoryStore::new()),
        directory(),
        Arc::new(Broken),
    )
    .unwrap();
    let out = engine
        .generate(&request("E1", d(2024, 1, 1), d(2024, 1, 15), d(2024, 1, 19), dec!(5000)))
        .unwrap();
    assert_eq!(engine.record(out.record.id).unwrap().id, out.record.id);
}
