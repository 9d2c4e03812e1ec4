//! Database access for nas-ingest

pub mod ledger;

pub use ledger::{path_key, CreateOutcome, DirtyEntry, Ledger, LedgerSummary, UpdateOutcome};
