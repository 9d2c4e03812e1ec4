//! Temporary directory layout with a ledger

use nas_ingest::db::Ledger;
use nas_ingest::services::{
    MetadataCompletionInvoker, Quarantine, RepairOrchestrator, RepairTool, Scorer, TriageEngine,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

pub const STRENGTH_DB: f64 = 12.0;
pub const MAX_GENERATIONS: u32 = 3;

/// Ingestion, quarantine and workspace directories under one temp root.
///
/// Keep the layout alive for the duration of the test.
pub struct TestLayout {
    pub root: TempDir,
    pub ingest: PathBuf,
    pub quarantine: PathBuf,
    pub workspace: PathBuf,
    pub ledger: Arc<Ledger>,
}

impl TestLayout {
    pub async fn new() -> Self {
        let root = TempDir::new().unwrap();
        let ingest = root.path().join("downloads");
        let quarantine = root.path().join("quarantine");
        let workspace = root.path().join("repair_workspace");
        for dir in [&ingest, &quarantine, &workspace] {
            std::fs::create_dir_all(dir).unwrap();
        }
        let ledger = Arc::new(Ledger::open(&root.path().join("nas.db"), 2000).await.unwrap());

        Self {
            root,
            ingest,
            quarantine,
            workspace,
            ledger,
        }
    }

    /// Write a file into the ingestion directory
    pub fn drop_file(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let path = self.ingest.join(name);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&path, bytes).unwrap();
        path
    }

    pub fn orchestrator(&self, tool: Option<Arc<dyn RepairTool>>) -> RepairOrchestrator {
        RepairOrchestrator::new(
            tool,
            Arc::clone(&self.ledger),
            self.ingest.clone(),
            self.workspace.clone(),
            STRENGTH_DB,
            MAX_GENERATIONS,
        )
    }

    pub fn engine(
        &self,
        scorer: Arc<dyn Scorer>,
        tool: Option<Arc<dyn RepairTool>>,
        metadata: Option<Arc<dyn MetadataCompletionInvoker>>,
    ) -> TriageEngine {
        TriageEngine::new(
            Arc::clone(&self.ledger),
            scorer,
            metadata,
            Quarantine::new(self.quarantine.clone()),
            self.orchestrator(tool),
            0.5,
        )
    }

    pub fn ingest_files(&self) -> Vec<PathBuf> {
        list_files(&self.ingest)
    }

    pub fn quarantine_files(&self) -> Vec<PathBuf> {
        list_files(&self.quarantine)
    }

    /// Everything left anywhere under the workspace, directories included
    pub fn workspace_entries(&self) -> Vec<PathBuf> {
        walkdir::WalkDir::new(&self.workspace)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .collect()
    }
}

fn list_files(dir: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .collect();
    files.sort();
    files
}
