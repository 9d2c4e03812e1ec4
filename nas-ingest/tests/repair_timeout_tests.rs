//! Repair tool timeouts against real child processes
//!
//! Kept in its own test binary and serialized: each test writes and then
//! executes a script, and a concurrent fork could hold the script open for
//! writing.

#![cfg(unix)]

mod helpers;

use helpers::{key, FixedScorer, TestLayout};
use nas_ingest::models::RepairStatus;
use nas_ingest::services::{
    FfmpegDenoiser, Quarantine, RepairOrchestrator, RepairTool, TriageEngine, TriageOutcome,
};
use serial_test::serial;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

const HANGING_TOOL: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
    echo "fake ffmpeg version 0"
    exit 0
fi
for last; do :; done
printf partial > "$last"
exec sleep 30
"#;

const SILENT_TOOL: &str = r#"#!/bin/sh
exec sleep 30
"#;

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let script = dir.join(name);
    std::fs::write(&script, body).unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    script
}

#[tokio::test]
#[serial]
async fn test_repair_timeout_marks_unfixable() {
    let layout = TestLayout::new().await;
    let script = write_script(layout.root.path(), "fake-ffmpeg", HANGING_TOOL);

    let tool = FfmpegDenoiser::new(script.to_str().unwrap(), Duration::from_millis(300))
        .await
        .expect("script answers -version");
    let orchestrator = RepairOrchestrator::new(
        Some(Arc::new(tool) as Arc<dyn RepairTool>),
        Arc::clone(&layout.ledger),
        layout.ingest.clone(),
        layout.workspace.clone(),
        12.0,
        3,
    );
    let engine = TriageEngine::new(
        Arc::clone(&layout.ledger),
        Arc::new(FixedScorer::new(0.9)),
        None,
        Quarantine::new(layout.quarantine.clone()),
        orchestrator,
        0.5,
    );
    let path = layout.drop_file("slow.wav", b"RIFF slow");

    let outcome = tokio::time::timeout(Duration::from_secs(10), engine.handle(&path))
        .await
        .expect("timeout enforced by the orchestrator");

    let quarantined = layout.quarantine.join("slow.wav");
    assert_eq!(
        outcome,
        TriageOutcome::Unfixable {
            quarantined_path: quarantined.clone()
        }
    );
    assert_eq!(std::fs::read(&quarantined).unwrap(), b"RIFF slow");
    assert!(layout.workspace_entries().is_empty());
    assert!(layout.ingest_files().is_empty());

    let record = layout.ledger.get(&key(&path)).await.unwrap().unwrap();
    assert_eq!(record.repair_status, RepairStatus::Unfixable);
}

#[tokio::test]
#[serial]
async fn test_unanswered_version_check_is_unavailable() {
    let layout = TestLayout::new().await;
    let script = write_script(layout.root.path(), "silent-ffmpeg", SILENT_TOOL);

    let started = Instant::now();
    let result = FfmpegDenoiser::new(script.to_str().unwrap(), Duration::from_millis(300)).await;

    assert!(matches!(
        result,
        Err(nas_ingest::TriageError::RepairToolUnavailable(_))
    ));
    assert!(started.elapsed() < Duration::from_secs(10));
}
