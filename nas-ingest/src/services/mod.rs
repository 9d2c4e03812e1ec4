//! Pipeline services

pub mod ingest_watcher;
pub mod metadata_invoker;
pub mod quarantine;
pub mod repair_orchestrator;
pub mod repair_tool;
pub mod scorer;
pub mod triage_engine;
pub mod worker_pool;

pub use ingest_watcher::IngestWatcher;
pub use metadata_invoker::{CommandMetadataInvoker, MetadataCompletionInvoker};
pub use quarantine::Quarantine;
pub use repair_orchestrator::{RepairFailure, RepairOrchestrator, RepairResult};
pub use repair_tool::{FfmpegDenoiser, RepairOutcome, RepairTool};
pub use scorer::{fail_safe_score, CommandScorer, Scorer, ScoringError, FAIL_SAFE_SCORE};
pub use triage_engine::{RecoveryReport, TriageEngine, TriageOutcome};
pub use worker_pool::{work_queue, WorkerPool};
