//! In-process stand-ins for the external collaborators

use async_trait::async_trait;
use nas_ingest::services::{
    MetadataCompletionInvoker, RepairOutcome, RepairTool, Scorer, ScoringError,
};
use nas_ingest::{TriageError, TriageResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Returns the same score for every file and counts calls
pub struct FixedScorer {
    score: f64,
    calls: AtomicUsize,
}

impl FixedScorer {
    pub fn new(score: f64) -> Self {
        Self {
            score,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scorer for FixedScorer {
    async fn score(&self, _path: &Path) -> Result<f64, ScoringError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.score)
    }
}

/// Score chosen by file name; unlisted names get `default`
pub struct ScriptedScorer {
    scores: HashMap<String, f64>,
    default: f64,
}

impl ScriptedScorer {
    pub fn new(default: f64) -> Self {
        Self {
            scores: HashMap::new(),
            default,
        }
    }

    pub fn with(mut self, file_name: &str, score: f64) -> Self {
        self.scores.insert(file_name.to_string(), score);
        self
    }
}

#[async_trait]
impl Scorer for ScriptedScorer {
    async fn score(&self, path: &Path) -> Result<f64, ScoringError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(*self.scores.get(&name).unwrap_or(&self.default))
    }
}

pub struct FailingScorer;

#[async_trait]
impl Scorer for FailingScorer {
    async fn score(&self, _path: &Path) -> Result<f64, ScoringError> {
        Err(ScoringError::Other("decoder rejected file".to_string()))
    }
}

pub struct PanickingScorer;

#[async_trait]
impl Scorer for PanickingScorer {
    async fn score(&self, _path: &Path) -> Result<f64, ScoringError> {
        panic!("scorer blew up");
    }
}

/// How `ScriptedRepairTool` responds
#[derive(Debug, Clone)]
pub enum RepairBehavior {
    /// Write these bytes to the destination and report success
    Succeed(Vec<u8>),
    /// Report failure without writing anything
    Fail(String),
    /// Write a partial file, then report failure
    FailWithPartialOutput,
    /// Report success without writing anything
    SucceedWithoutOutput,
}

pub struct ScriptedRepairTool {
    behavior: RepairBehavior,
    calls: Mutex<Vec<(PathBuf, PathBuf, f64)>>,
}

impl ScriptedRepairTool {
    pub fn new(behavior: RepairBehavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(PathBuf, PathBuf, f64)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl RepairTool for ScriptedRepairTool {
    async fn repair(&self, source: &Path, destination: &Path, strength_db: f64) -> RepairOutcome {
        self.calls.lock().unwrap().push((
            source.to_path_buf(),
            destination.to_path_buf(),
            strength_db,
        ));

        match &self.behavior {
            RepairBehavior::Succeed(bytes) => {
                tokio::fs::write(destination, bytes).await.unwrap();
                RepairOutcome::succeeded()
            }
            RepairBehavior::Fail(diagnostic) => RepairOutcome::failed(diagnostic.clone()),
            RepairBehavior::FailWithPartialOutput => {
                tokio::fs::write(destination, b"partial").await.unwrap();
                RepairOutcome::failed("encoder crashed")
            }
            RepairBehavior::SucceedWithoutOutput => RepairOutcome::succeeded(),
        }
    }
}

/// How `RecordingMetadataInvoker` responds
#[derive(Debug, Clone, Copy)]
pub enum MetadataBehavior {
    Succeed,
    ReportFailure,
    LaunchError,
}

pub struct RecordingMetadataInvoker {
    behavior: MetadataBehavior,
    calls: Mutex<Vec<PathBuf>>,
}

impl RecordingMetadataInvoker {
    pub fn new(behavior: MetadataBehavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<PathBuf> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataCompletionInvoker for RecordingMetadataInvoker {
    async fn complete(&self, path: &Path) -> TriageResult<bool> {
        self.calls.lock().unwrap().push(path.to_path_buf());
        match self.behavior {
            MetadataBehavior::Succeed => Ok(true),
            MetadataBehavior::ReportFailure => Ok(false),
            MetadataBehavior::LaunchError => Err(TriageError::MetadataInvocation {
                path: path.to_path_buf(),
                reason: "program not found".to_string(),
            }),
        }
    }
}
