//! nas-ingest library interface
//!
//! Audio triage-and-repair pipeline: files dropped into the ingestion
//! directory are scored, recorded in the ledger, and either handed to the
//! metadata completer (clean) or quarantined and repaired (dirty). Repaired
//! copies re-enter ingestion as new files.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod utils;

pub use crate::error::{TriageError, TriageResult};
