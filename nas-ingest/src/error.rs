//! Error types for nas-ingest
//!
//! Every per-file failure in the pipeline maps to exactly one variant here,
//! and each variant has one recovery action applied by the triage engine:
//!
//! | Variant                 | Recovery                                           |
//! |-------------------------|----------------------------------------------------|
//! | `UnsupportedPath`       | leave the file untouched, nothing recorded         |
//! | `Scoring`               | substitute the fail-safe score 1.0                 |
//! | `LedgerConflict`        | no-op, another worker owns the path                |
//! | `LedgerUnavailable`     | log and skip; the next sweep retries the file      |
//! | `QuarantineMove`        | leave the file in place, `repair_status` NEEDED    |
//! | `RepairToolUnavailable` | repair branch disabled for the process lifetime    |
//! | `RepairExecution`       | mark UNFIXABLE, quarantined original kept          |
//! | `Reinjection`           | delete workspace artifact, mark UNFIXABLE          |
//! | `MetadataInvocation`    | mark metadata FAILED                               |

use std::path::PathBuf;
use thiserror::Error;

/// Pipeline error taxonomy
#[derive(Debug, Error)]
pub enum TriageError {
    /// Path cannot be stored as a ledger key (not valid UTF-8)
    #[error("Unsupported path {}: not valid UTF-8", .0.display())]
    UnsupportedPath(PathBuf),

    /// Scorer could not produce a valid score
    #[error("Scoring failed for {path}: {reason}")]
    Scoring { path: PathBuf, reason: String },

    /// Another worker already claimed this path
    #[error("Ledger already holds {0}")]
    LedgerConflict(String),

    /// Ledger persistence unreachable
    #[error("Ledger unavailable: {0}")]
    LedgerUnavailable(#[source] nas_common::Error),

    /// Moving a file into quarantine failed
    #[error("Failed to quarantine {path}: {source}")]
    QuarantineMove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// External repair tool missing at startup
    #[error("Repair tool unavailable: {0}")]
    RepairToolUnavailable(String),

    /// Repair tool exited non-zero, timed out, or produced no output
    #[error("Repair of {path} failed: {diagnostic}")]
    RepairExecution { path: PathBuf, diagnostic: String },

    /// Promoting a repaired workspace file into ingestion failed
    #[error("Failed to re-inject {path}: {source}")]
    Reinjection {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Metadata completer could not run or reported failure
    #[error("Metadata completion failed for {path}: {reason}")]
    MetadataInvocation { path: PathBuf, reason: String },
}

impl From<nas_common::Error> for TriageError {
    fn from(err: nas_common::Error) -> Self {
        TriageError::LedgerUnavailable(err)
    }
}

/// Result type for pipeline operations
pub type TriageResult<T> = Result<T, TriageError>;
