//! Ledger record and status types
//!
//! A record is on exactly one branch: clean records only ever move
//! `metadata_status`, dirty records only ever move `repair_status`. The field
//! belonging to the other branch stays `NONE`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Metadata completion progress (clean branch)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetadataStatus {
    /// Waiting for the metadata completer
    Pending,
    /// Metadata completer running
    Processing,
    /// Metadata completer succeeded
    Completed,
    /// Metadata completer failed, timed out or could not be launched
    Failed,
    /// Not applicable (dirty branch)
    None,
}

/// Repair progress (dirty branch)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RepairStatus {
    /// Not applicable (clean branch)
    None,
    /// Classified dirty, awaiting quarantine and repair
    Needed,
    /// Repair tool invoked
    Attempted,
    /// Repaired copy re-injected into the ingestion directory
    Fixed,
    /// Repair failed; quarantined original kept
    Unfixable,
}

impl MetadataStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataStatus::Pending => "PENDING",
            MetadataStatus::Processing => "PROCESSING",
            MetadataStatus::Completed => "COMPLETED",
            MetadataStatus::Failed => "FAILED",
            MetadataStatus::None => "NONE",
        }
    }
}

impl RepairStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepairStatus::None => "NONE",
            RepairStatus::Needed => "NEEDED",
            RepairStatus::Attempted => "ATTEMPTED",
            RepairStatus::Fixed => "FIXED",
            RepairStatus::Unfixable => "UNFIXABLE",
        }
    }
}

impl fmt::Display for MetadataStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for RepairStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for status strings read back from the ledger that match no variant
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown status value: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for MetadataStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(MetadataStatus::Pending),
            "PROCESSING" => Ok(MetadataStatus::Processing),
            "COMPLETED" => Ok(MetadataStatus::Completed),
            "FAILED" => Ok(MetadataStatus::Failed),
            "NONE" => Ok(MetadataStatus::None),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl FromStr for RepairStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NONE" => Ok(RepairStatus::None),
            "NEEDED" => Ok(RepairStatus::Needed),
            "ATTEMPTED" => Ok(RepairStatus::Attempted),
            "FIXED" => Ok(RepairStatus::Fixed),
            "UNFIXABLE" => Ok(RepairStatus::Unfixable),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// A single status mutation, naming both the column and its new value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Metadata(MetadataStatus),
    Repair(RepairStatus),
}

/// One row of the processing ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub path: String,
    pub display_name: String,
    pub is_clean: bool,
    /// Badness score in [0,1]; write-once
    pub noise_score: f64,
    pub scanned_at: DateTime<Utc>,
    pub metadata_status: MetadataStatus,
    pub repair_status: RepairStatus,
}

impl FileRecord {
    /// Statuses a freshly classified record starts with
    pub fn initial_statuses(is_clean: bool) -> (MetadataStatus, RepairStatus) {
        if is_clean {
            (MetadataStatus::Pending, RepairStatus::None)
        } else {
            (MetadataStatus::None, RepairStatus::Needed)
        }
    }
}

/// Pipeline state of a single file, used for transition logging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriageState {
    Discovered,
    Scored,
    Clean,
    Dirty,
    MetadataPending,
    MetadataDone,
    MetadataFailed,
    Quarantined,
    RepairAttempted,
    RepairSucceeded,
    RepairFailed,
}
