pub mod accumulator;
pub mod totals;

pub use accumulator::YtdAccumulator;
pub use totals::{
    PeriodContribution, PeriodKey, PreviousMonthTax, YtdRecord, YtdSnapshot, YtdSource,
    YtdTotals,
};
