pub mod builder;
pub mod period;
pub mod record;

pub use builder::{PayrollEngine, PayrollOutcome, PayrollPreview};
pub use period::PayrollPeriod;
pub use record::{
    compute_net_pay, CustomDeduction, Deductions, GeneratePayrollRequest, JurisdictionalTaxes,
    NetPay, PayrollRecord, RecordStatus, ReissueRequest,
};
