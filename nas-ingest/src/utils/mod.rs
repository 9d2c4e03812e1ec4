//! Utility modules for nas-ingest

pub mod db_retry;
pub mod fs_move;
pub mod process;

pub use db_retry::retry_on_lock;
