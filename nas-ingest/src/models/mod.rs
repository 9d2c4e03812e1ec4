//! Data models for the ingestion pipeline

pub mod file_record;

pub use file_record::{
    FileRecord, MetadataStatus, RepairStatus, StatusUpdate, TriageState, UnknownStatus,
};
