//! Service configuration for nas-ingest
//!
//! The service tables (`[ingest]`, `[scorer]`, `[repair]`, `[metadata]`) live
//! in the same TOML file as the bootstrap settings from
//! `nas_common::config::TomlConfig`. Every field has a default, so an absent
//! file or an empty table yields a runnable configuration apart from the
//! scorer program, which has no sensible default.

use nas_common::config::{self, TomlConfig};
use nas_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Everything read from the configuration file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(flatten)]
    pub bootstrap: TomlConfig,

    #[serde(default)]
    pub ingest: IngestSection,

    #[serde(default)]
    pub scorer: ScorerConfig,

    #[serde(default)]
    pub repair: RepairConfig,

    #[serde(default)]
    pub metadata: MetadataConfig,
}

/// `[ingest]` table as written in the file; directories are optional
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    pub ingest_dir: Option<PathBuf>,
    pub quarantine_dir: Option<PathBuf>,
    pub workspace_dir: Option<PathBuf>,
    pub noise_threshold: f64,
    pub extensions: Vec<String>,
    pub workers: usize,
    pub queue_capacity: usize,
    pub settle_delay_ms: u64,
    pub db_max_lock_wait_ms: u64,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            ingest_dir: None,
            quarantine_dir: None,
            workspace_dir: None,
            noise_threshold: 0.5,
            extensions: ["flac", "mp3", "wav", "m4a"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            workers: 4,
            queue_capacity: 256,
            settle_delay_ms: 1000,
            db_max_lock_wait_ms: 5000,
        }
    }
}

/// `[scorer]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Scoring program; invoked as `<program> <args...> <path>`
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            timeout_secs: 60,
        }
    }
}

/// `[repair]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    pub enabled: bool,
    pub program: String,
    /// Noise reduction strength in dB
    pub strength_db: f64,
    pub timeout_secs: u64,
    /// Repaired files carrying this many `repaired_` prefixes are not repaired again
    pub max_generations: u32,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "ffmpeg".to_string(),
            strength_db: 12.0,
            timeout_secs: 300,
            max_generations: 3,
        }
    }
}

/// `[metadata]` table
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    pub enabled: bool,
    pub program: String,
    pub args: Vec<String>,
    pub timeout_secs: u64,
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "nas-metadata".to_string(),
            args: vec!["--write".to_string(), "--backup".to_string()],
            timeout_secs: 120,
        }
    }
}

/// Fully resolved service configuration
#[derive(Debug, Clone, Serialize)]
pub struct IngestConfig {
    pub root_folder: PathBuf,
    pub database_path: PathBuf,
    pub ingest_dir: PathBuf,
    pub quarantine_dir: PathBuf,
    pub workspace_dir: PathBuf,
    pub noise_threshold: f64,
    /// Lower-cased, without leading dots
    pub extensions: Vec<String>,
    pub workers: usize,
    pub queue_capacity: usize,
    pub settle_delay_ms: u64,
    pub db_max_lock_wait_ms: u64,
    pub scorer: ScorerConfig,
    pub repair: RepairConfig,
    pub metadata: MetadataConfig,
}

impl IngestConfig {
    /// Resolve against a root folder, filling directory defaults under it
    pub fn resolve(file: &ConfigFile, root_folder: PathBuf) -> Self {
        let under_root = |configured: &Option<PathBuf>, default_name: &str| match configured {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root_folder.join(path),
            None => root_folder.join(default_name),
        };

        let section = &file.ingest;
        Self {
            database_path: file.bootstrap.database_path(&root_folder),
            ingest_dir: under_root(&section.ingest_dir, "downloads"),
            quarantine_dir: under_root(&section.quarantine_dir, "quarantine"),
            workspace_dir: under_root(&section.workspace_dir, "repair_workspace"),
            noise_threshold: section.noise_threshold,
            extensions: normalize_extensions(&section.extensions),
            workers: section.workers,
            queue_capacity: section.queue_capacity,
            settle_delay_ms: section.settle_delay_ms,
            db_max_lock_wait_ms: section.db_max_lock_wait_ms,
            scorer: file.scorer.clone(),
            repair: file.repair.clone(),
            metadata: file.metadata.clone(),
            root_folder,
        }
    }

    /// Defaults under `root_folder`, as if no file were present
    pub fn with_root(root_folder: PathBuf) -> Self {
        Self::resolve(&ConfigFile::default(), root_folder)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(self.noise_threshold > 0.0 && self.noise_threshold <= 1.0) {
            return Err(Error::Config(format!(
                "noise_threshold must be in (0, 1], got {}",
                self.noise_threshold
            )));
        }
        if self.workers == 0 {
            return Err(Error::Config("workers must be at least 1".to_string()));
        }
        if self.queue_capacity == 0 {
            return Err(Error::Config("queue_capacity must be at least 1".to_string()));
        }
        if self.extensions.is_empty() {
            return Err(Error::Config("extensions must not be empty".to_string()));
        }

        let dirs = [
            ("ingest_dir", &self.ingest_dir),
            ("quarantine_dir", &self.quarantine_dir),
            ("workspace_dir", &self.workspace_dir),
        ];
        for (i, (name_a, a)) in dirs.iter().enumerate() {
            for (name_b, b) in dirs.iter().skip(i + 1) {
                if a.starts_with(b) || b.starts_with(a) {
                    return Err(Error::Config(format!(
                        "{} ({}) and {} ({}) must be disjoint",
                        name_a,
                        a.display(),
                        name_b,
                        b.display()
                    )));
                }
            }
        }

        Ok(())
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Create the three working directories if missing
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [&self.ingest_dir, &self.quarantine_dir, &self.workspace_dir] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }
}

fn normalize_extensions(extensions: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = extensions
        .iter()
        .map(|e| e.trim().trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

/// Load the configuration file (if any) and resolve the root folder.
///
/// Returns the parsed file alongside the resolved service config so the
/// caller can initialize logging from the bootstrap section.
pub fn load(
    config_arg: Option<&Path>,
    root_folder_arg: Option<&Path>,
) -> Result<(ConfigFile, IngestConfig)> {
    let file = match config::locate_config_file(config_arg)? {
        Some(path) => config::load_toml::<ConfigFile>(&path)?,
        None => ConfigFile::default(),
    };

    let root_folder = config::resolve_root_folder(root_folder_arg, &file.bootstrap);
    let resolved = IngestConfig::resolve(&file, root_folder);
    resolved.validate()?;
    Ok((file, resolved))
}
