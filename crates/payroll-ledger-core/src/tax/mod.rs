pub mod statutory;

pub use statutory::{StatutoryTaxInput, StatutoryTaxes, TaxCalculator};
