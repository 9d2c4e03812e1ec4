//! Triage state machine
//!
//! `handle` takes one discovered path through
//!
//! ```text
//! DISCOVERED -> SCORED -> CLEAN -> METADATA_PENDING -> METADATA_DONE | METADATA_FAILED
//!                      -> DIRTY -> QUARANTINED -> REPAIR_ATTEMPTED -> REPAIR_SUCCEEDED | REPAIR_FAILED
//! ```
//!
//! A successful repair yields a new path that starts over at DISCOVERED.
//! Every failure is handled here and reported as a `TriageOutcome`; nothing
//! is propagated to the caller.

use crate::db::ledger::{path_key, CreateOutcome, Ledger, UpdateOutcome};
use crate::error::TriageError;
use crate::models::{MetadataStatus, RepairStatus, StatusUpdate, TriageState};
use crate::services::metadata_invoker::MetadataCompletionInvoker;
use crate::services::quarantine::Quarantine;
use crate::services::repair_orchestrator::{RepairFailure, RepairOrchestrator, RepairResult};
use crate::services::scorer::{fail_safe_score, Scorer};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Final disposition of one `handle` call
#[derive(Debug, Clone, PartialEq)]
pub enum TriageOutcome {
    /// Path already in the ledger; not rescored
    Skipped,
    /// Another worker created the record first
    LostClaim,
    /// Ledger could not be read or written
    LedgerUnavailable,
    /// Path has no ledger key; file left untouched
    UnsupportedPath,
    Clean {
        metadata: MetadataStatus,
    },
    /// Quarantined without a repair attempt (no repair tool)
    Quarantined {
        quarantined_path: PathBuf,
    },
    /// Dirty file could not be moved; left in ingestion
    QuarantineFailed,
    Repaired {
        quarantined_path: PathBuf,
        new_path: PathBuf,
    },
    Unfixable {
        quarantined_path: PathBuf,
    },
}

impl TriageOutcome {
    /// Path of a repaired file that re-entered ingestion
    pub fn reinjected_path(&self) -> Option<&Path> {
        match self {
            TriageOutcome::Repaired { new_path, .. } => Some(new_path),
            _ => None,
        }
    }
}

/// Counts from `TriageEngine::recover_interrupted`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Metadata completions run again
    pub redriven: usize,
    /// Metadata records whose file had vanished
    pub failed_missing: usize,
    /// Repairs cut short by the restart, now UNFIXABLE
    pub abandoned_repairs: usize,
    /// Workspace entries left by interrupted attempts
    pub stale_attempts: usize,
}

pub struct TriageEngine {
    ledger: Arc<Ledger>,
    scorer: Arc<dyn Scorer>,
    metadata: Option<Arc<dyn MetadataCompletionInvoker>>,
    quarantine: Quarantine,
    repair: RepairOrchestrator,
    noise_threshold: f64,
}

impl TriageEngine {
    pub fn new(
        ledger: Arc<Ledger>,
        scorer: Arc<dyn Scorer>,
        metadata: Option<Arc<dyn MetadataCompletionInvoker>>,
        quarantine: Quarantine,
        repair: RepairOrchestrator,
        noise_threshold: f64,
    ) -> Self {
        Self {
            ledger,
            scorer,
            metadata,
            quarantine,
            repair,
            noise_threshold,
        }
    }

    /// Classify and route one file
    pub async fn handle(&self, path: &Path) -> TriageOutcome {
        let Some(key) = path_key(path) else {
            log_error(&TriageError::UnsupportedPath(path.to_path_buf()));
            return TriageOutcome::UnsupportedPath;
        };
        transition(path, TriageState::Discovered);

        match self.ledger.is_known(key).await {
            Ok(true) => {
                debug!(path = %path.display(), "Already in ledger, skipping");
                return TriageOutcome::Skipped;
            }
            Ok(false) => {}
            Err(e) => {
                log_error(&TriageError::from(e));
                return TriageOutcome::LedgerUnavailable;
            }
        }

        let score = fail_safe_score(self.scorer.as_ref(), path).await;
        let is_clean = score < self.noise_threshold;
        transition(path, TriageState::Scored);

        match self.ledger.create(key, is_clean, score).await {
            Ok(CreateOutcome::Created) => {}
            Ok(CreateOutcome::AlreadyExists) => {
                debug!(
                    path = %path.display(),
                    "{}",
                    TriageError::LedgerConflict(key.to_string())
                );
                return TriageOutcome::LostClaim;
            }
            Err(e) => {
                log_error(&TriageError::from(e));
                return TriageOutcome::LedgerUnavailable;
            }
        }

        info!(
            path = %path.display(),
            score,
            clean = is_clean,
            "File classified"
        );

        if is_clean {
            transition(path, TriageState::Clean);
            let metadata = self.complete_metadata(path, key).await;
            TriageOutcome::Clean { metadata }
        } else {
            transition(path, TriageState::Dirty);
            self.quarantine_and_repair(path, key).await
        }
    }

    /// Run the metadata completer and record the result
    async fn complete_metadata(&self, path: &Path, key: &str) -> MetadataStatus {
        let Some(invoker) = &self.metadata else {
            debug!(path = %path.display(), "Metadata completion disabled, record stays PENDING");
            return MetadataStatus::Pending;
        };

        transition(path, TriageState::MetadataPending);
        self.record(key, StatusUpdate::Metadata(MetadataStatus::Processing))
            .await;

        let status = match invoker.complete(path).await {
            Ok(true) => MetadataStatus::Completed,
            Ok(false) => {
                log_error(&TriageError::MetadataInvocation {
                    path: path.to_path_buf(),
                    reason: "completer reported failure".to_string(),
                });
                MetadataStatus::Failed
            }
            Err(e) => {
                log_error(&e);
                MetadataStatus::Failed
            }
        };

        self.record(key, StatusUpdate::Metadata(status)).await;
        transition(
            path,
            if status == MetadataStatus::Completed {
                TriageState::MetadataDone
            } else {
                TriageState::MetadataFailed
            },
        );
        status
    }

    async fn quarantine_and_repair(&self, path: &Path, key: &str) -> TriageOutcome {
        let quarantined_path = match self.quarantine.admit(path).await {
            Ok(p) => p,
            Err(e) => {
                log_error(&e);
                return TriageOutcome::QuarantineFailed;
            }
        };
        transition(path, TriageState::Quarantined);

        if !self.repair.is_available() {
            // Logs the unavailable diagnostic on first use
            self.repair.attempt_repair(&quarantined_path).await;
            return TriageOutcome::Quarantined { quarantined_path };
        }

        if let Err(failure) = self.repair.check_generation(&quarantined_path) {
            return self.mark_unfixable(path, key, quarantined_path, failure).await;
        }

        self.record(key, StatusUpdate::Repair(RepairStatus::Attempted))
            .await;
        transition(path, TriageState::RepairAttempted);

        match self.repair.attempt_repair(&quarantined_path).await {
            RepairResult::Repaired(new_path) => {
                self.record(key, StatusUpdate::Repair(RepairStatus::Fixed))
                    .await;
                transition(path, TriageState::RepairSucceeded);
                TriageOutcome::Repaired {
                    quarantined_path,
                    new_path,
                }
            }
            RepairResult::Failed(failure) => {
                self.mark_unfixable(path, key, quarantined_path, failure)
                    .await
            }
            RepairResult::Unavailable => TriageOutcome::Quarantined { quarantined_path },
        }
    }

    async fn mark_unfixable(
        &self,
        path: &Path,
        key: &str,
        quarantined_path: PathBuf,
        failure: RepairFailure,
    ) -> TriageOutcome {
        log_error(&failure.into_triage_error(&quarantined_path));
        self.record(key, StatusUpdate::Repair(RepairStatus::Unfixable))
            .await;
        transition(path, TriageState::RepairFailed);
        TriageOutcome::Unfixable { quarantined_path }
    }

    /// Settle records and workspace state left by an interrupted run.
    ///
    /// Must run before any worker starts:
    /// - stale attempt directories are removed from the repair workspace
    /// - repairs still ATTEMPTED are marked UNFIXABLE; their quarantined
    ///   copy is kept as is
    /// - metadata PENDING or PROCESSING is completed again when the file is
    ///   still present and marked FAILED otherwise; skipped while metadata
    ///   completion is disabled
    pub async fn recover_interrupted(&self) -> Result<RecoveryReport, TriageError> {
        let mut report = RecoveryReport::default();

        report.stale_attempts = match self.repair.clear_stale_attempts().await {
            Ok(removed) => removed,
            Err(e) => {
                warn!(error = %e, "Could not scan repair workspace for stale attempts");
                0
            }
        };

        for record in self
            .ledger
            .records_with_repair_status(RepairStatus::Attempted)
            .await?
        {
            warn!(path = %record.path, "Repair interrupted by restart, marking UNFIXABLE");
            self.record(&record.path, StatusUpdate::Repair(RepairStatus::Unfixable))
                .await;
            report.abandoned_repairs += 1;
        }

        if self.metadata.is_some() {
            for status in [MetadataStatus::Processing, MetadataStatus::Pending] {
                let records = self.ledger.records_with_metadata_status(status).await?;
                for record in records {
                    let path = PathBuf::from(&record.path);
                    if tokio::fs::try_exists(&path).await.unwrap_or(false) {
                        info!(path = %path.display(), previous = %status, "Resuming metadata completion");
                        self.complete_metadata(&path, &record.path).await;
                        report.redriven += 1;
                    } else {
                        warn!(path = %path.display(), "File vanished before metadata completion");
                        self.record(&record.path, StatusUpdate::Metadata(MetadataStatus::Failed))
                            .await;
                        report.failed_missing += 1;
                    }
                }
            }
        }

        if report != RecoveryReport::default() {
            info!(
                redriven = report.redriven,
                failed_missing = report.failed_missing,
                abandoned_repairs = report.abandoned_repairs,
                stale_attempts = report.stale_attempts,
                "Recovered interrupted records"
            );
        }
        Ok(report)
    }

    /// Write a status, logging instead of failing
    async fn record(&self, key: &str, update: StatusUpdate) {
        match self.ledger.set_status(key, update).await {
            Ok(UpdateOutcome::Updated) => {}
            Ok(UpdateOutcome::NotFound) => {
                warn!(path = key, ?update, "Status update for unknown ledger path");
            }
            Err(e) => log_error(&TriageError::from(e)),
        }
    }
}

fn transition(path: &Path, state: TriageState) {
    debug!(path = %path.display(), state = ?state, "Triage transition");
}

fn log_error(err: &TriageError) {
    match err {
        TriageError::LedgerUnavailable(_)
        | TriageError::QuarantineMove { .. }
        | TriageError::UnsupportedPath(_) => {
            error!(error = %err, "Triage step failed")
        }
        _ => warn!(error = %err, "Triage step failed"),
    }
}
