//! Repair orchestration
//!
//! Drives a quarantined file through one repair attempt:
//!
//! 1. Refuse files that already carry `max_generations` repair prefixes
//! 2. Run the repair tool into a private attempt directory in the workspace
//! 3. Move the output into the ingestion directory under a fresh name
//!
//! The quarantined original is only ever read. Every failure after step 1
//! removes the attempt directory, so nothing is left behind in the workspace
//! and nothing appears in ingestion.

use crate::db::ledger::{path_key, Ledger};
use crate::error::TriageError;
use crate::services::repair_tool::RepairTool;
use crate::utils::fs_move::{move_no_clobber_async, numbered_name, split_file_name, MAX_NAME_ATTEMPTS};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

/// Prefix marking one repair generation
pub const REPAIRED_PREFIX: &str = "repaired_";

/// Canonical extension of repaired output
pub const REPAIRED_EXTENSION: &str = "flac";

/// Why a repair attempt produced nothing
#[derive(Debug, Error)]
pub enum RepairFailure {
    #[error("already repaired {generations} times")]
    GenerationCap { generations: u32 },

    #[error("repair tool failed: {diagnostic}")]
    Execution { diagnostic: String },

    #[error("repair tool reported success but wrote no output")]
    MissingOutput,

    #[error("workspace unavailable: {0}")]
    Workspace(#[source] io::Error),

    #[error("re-injection failed: {0}")]
    Reinjection(#[source] io::Error),
}

impl RepairFailure {
    /// Named pipeline error for this failure
    pub fn into_triage_error(self, path: &Path) -> TriageError {
        match self {
            RepairFailure::Reinjection(source) => TriageError::Reinjection {
                path: path.to_path_buf(),
                source,
            },
            other => TriageError::RepairExecution {
                path: path.to_path_buf(),
                diagnostic: other.to_string(),
            },
        }
    }
}

/// Result of `RepairOrchestrator::attempt_repair`
#[derive(Debug)]
pub enum RepairResult {
    /// No repair tool; nothing was attempted
    Unavailable,
    /// Repaired copy now lives at this ingestion path
    Repaired(PathBuf),
    Failed(RepairFailure),
}

pub struct RepairOrchestrator {
    tool: Option<Arc<dyn RepairTool>>,
    ledger: Arc<Ledger>,
    ingest_dir: PathBuf,
    workspace_dir: PathBuf,
    strength_db: f64,
    max_generations: u32,
    unavailable_logged: AtomicBool,
}

impl RepairOrchestrator {
    pub fn new(
        tool: Option<Arc<dyn RepairTool>>,
        ledger: Arc<Ledger>,
        ingest_dir: PathBuf,
        workspace_dir: PathBuf,
        strength_db: f64,
        max_generations: u32,
    ) -> Self {
        Self {
            tool,
            ledger,
            ingest_dir,
            workspace_dir,
            strength_db,
            max_generations,
            unavailable_logged: AtomicBool::new(false),
        }
    }

    pub fn is_available(&self) -> bool {
        self.tool.is_some()
    }

    pub async fn attempt_repair(&self, quarantined: &Path) -> RepairResult {
        let Some(tool) = &self.tool else {
            if !self.unavailable_logged.swap(true, Ordering::SeqCst) {
                tracing::error!(
                    "Repair tool unavailable; dirty files stay quarantined with repair_status NEEDED"
                );
            }
            return RepairResult::Unavailable;
        };

        if let Err(failure) = self.check_generation(quarantined) {
            return RepairResult::Failed(failure);
        }
        let (stem, _) = split_file_name(quarantined);

        let attempt_dir = self.workspace_dir.join(Uuid::new_v4().to_string());
        if let Err(e) = tokio::fs::create_dir_all(&attempt_dir).await {
            return RepairResult::Failed(RepairFailure::Workspace(e));
        }

        let repaired_stem = format!("{}{}", REPAIRED_PREFIX, stem);
        let output = attempt_dir.join(format!("{}.{}", repaired_stem, REPAIRED_EXTENSION));

        let outcome = tool.repair(quarantined, &output, self.strength_db).await;

        let result = if !outcome.success {
            RepairResult::Failed(RepairFailure::Execution {
                diagnostic: outcome.diagnostic,
            })
        } else if !tokio::fs::try_exists(&output).await.unwrap_or(false) {
            RepairResult::Failed(RepairFailure::MissingOutput)
        } else {
            match self.reinject(&output, &repaired_stem).await {
                Ok(new_path) => RepairResult::Repaired(new_path),
                Err(e) => RepairResult::Failed(RepairFailure::Reinjection(e)),
            }
        };

        if let Err(e) = tokio::fs::remove_dir_all(&attempt_dir).await {
            tracing::warn!(
                dir = %attempt_dir.display(),
                error = %e,
                "Failed to clean up repair attempt directory"
            );
        }

        match &result {
            RepairResult::Repaired(new_path) => tracing::info!(
                source = %quarantined.display(),
                repaired = %new_path.display(),
                "Repair succeeded, re-injected into ingestion"
            ),
            RepairResult::Failed(failure) => tracing::warn!(
                source = %quarantined.display(),
                reason = %failure,
                "Repair failed"
            ),
            RepairResult::Unavailable => {}
        }

        result
    }

    /// Refuse files that already carry `max_generations` repair prefixes
    pub fn check_generation(&self, quarantined: &Path) -> Result<(), RepairFailure> {
        let (stem, _) = split_file_name(quarantined);
        let generations = repair_generations(&stem);
        if generations >= self.max_generations {
            tracing::warn!(
                path = %quarantined.display(),
                generations,
                "Repair generation cap reached"
            );
            return Err(RepairFailure::GenerationCap { generations });
        }
        Ok(())
    }

    /// Remove attempt directories left in the workspace by an interrupted run.
    ///
    /// Must run before any worker starts. Returns the number of entries removed.
    pub async fn clear_stale_attempts(&self) -> io::Result<usize> {
        let mut entries = match tokio::fs::read_dir(&self.workspace_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e),
        };

        let mut removed = 0;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let result = if entry.file_type().await?.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => {
                    tracing::info!(entry = %path.display(), "Removed stale repair attempt");
                    removed += 1;
                }
                Err(e) => tracing::warn!(
                    entry = %path.display(),
                    error = %e,
                    "Failed to remove stale repair attempt"
                ),
            }
        }
        Ok(removed)
    }

    /// Move workspace output into ingestion under a name unused on disk and in the ledger
    async fn reinject(&self, output: &Path, repaired_stem: &str) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.ingest_dir).await?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let candidate = self.ingest_dir.join(numbered_name(
                repaired_stem,
                Some(REPAIRED_EXTENSION),
                attempt,
            ));

            if tokio::fs::try_exists(&candidate).await.unwrap_or(true) {
                continue;
            }
            let Some(key) = path_key(&candidate) else {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("ingestion path {} is not valid UTF-8", candidate.display()),
                ));
            };
            let known = self
                .ledger
                .is_known(key)
                .await
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            if known {
                continue;
            }

            match move_no_clobber_async(output.to_path_buf(), candidate.clone()).await {
                Ok(()) => return Ok(candidate),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            }
        }

        Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("no free ingestion name for {}", repaired_stem),
        ))
    }
}

/// Number of leading `repaired_` prefixes on a file stem
pub fn repair_generations(stem: &str) -> u32 {
    let mut rest = stem;
    let mut count = 0;
    while let Some(stripped) = rest.strip_prefix(REPAIRED_PREFIX) {
        count += 1;
        rest = stripped;
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_generations() {
        assert_eq!(repair_generations("song"), 0);
        assert_eq!(repair_generations("repaired_song"), 1);
        assert_eq!(repair_generations("repaired_repaired_repaired_song_2"), 3);
        assert_eq!(repair_generations("song_repaired_"), 0);
    }

    #[test]
    fn test_reinjection_failure_maps_to_reinjection_error() {
        let err = RepairFailure::Reinjection(io::Error::new(io::ErrorKind::Other, "disk full"))
            .into_triage_error(Path::new("/q/a.flac"));
        assert!(matches!(err, TriageError::Reinjection { .. }));

        let err = RepairFailure::MissingOutput.into_triage_error(Path::new("/q/a.flac"));
        assert!(matches!(err, TriageError::RepairExecution { .. }));
    }
}
