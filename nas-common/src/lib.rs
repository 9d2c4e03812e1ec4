//! # NAS Common Library
//!
//! Shared code for the audio ingestion services:
//! - Error and result types
//! - TOML bootstrap configuration and root folder resolution
//! - Logging initialization
//! - SQLite connection setup

pub mod config;
pub mod db;
pub mod error;
pub mod logging;

pub use error::{Error, Result};
