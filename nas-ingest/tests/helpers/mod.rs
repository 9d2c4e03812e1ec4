//! Test Helper Utilities
//!
//! Shared fakes and directory layouts for nas-ingest integration tests

#![allow(dead_code)]

pub mod fakes;
pub mod layout;

pub use fakes::{
    FailingScorer, FixedScorer, MetadataBehavior, PanickingScorer, RecordingMetadataInvoker,
    RepairBehavior, ScriptedRepairTool, ScriptedScorer,
};
pub use layout::TestLayout;

/// Ledger key of a test path
pub fn key(path: &std::path::Path) -> String {
    nas_ingest::db::path_key(path)
        .expect("test paths are UTF-8")
        .to_string()
}
