//! Per-owner quota accounting.

pub mod ledger;

pub use ledger::QuotaLedger;
