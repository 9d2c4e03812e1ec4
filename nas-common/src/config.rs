//! Bootstrap configuration loading and root folder resolution
//!
//! Settings sources, highest priority first:
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. TOML configuration file
//! 4. OS-dependent compiled defaults

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit configuration file
pub const CONFIG_ENV_VAR: &str = "NAS_CONFIG";

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "NAS_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML file
///
/// These settings cannot change during runtime. The service must restart
/// to pick up changes.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the ingestion, quarantine and workspace trees
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Path to SQLite ledger database (defaults to `<root>/nas.db`)
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log file path (optional, logs to stderr only if not specified)
    #[serde(default)]
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Ledger database path, relative to the root folder unless absolute
    pub fn database_path(&self, root_folder: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => root_folder.join(path),
            None => root_folder.join("nas.db"),
        }
    }
}

/// Locate the configuration file.
///
/// Returns `None` when no file exists at any candidate location; an explicit
/// path (CLI or environment) that does not exist is an error.
pub fn locate_config_file(cli_arg: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = cli_arg {
        return explicit_config(path);
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        return explicit_config(Path::new(&path));
    }

    let user_config = dirs::config_dir().map(|d| d.join("nas").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Ok(Some(path));
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/nas/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }
    }

    Ok(None)
}

fn explicit_config(path: &Path) -> Result<Option<PathBuf>> {
    if path.exists() {
        Ok(Some(path.to_path_buf()))
    } else {
        Err(Error::Config(format!(
            "Config file not found: {}",
            path.display()
        )))
    }
}

/// Parse a TOML file into any deserializable configuration type
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let parsed = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;
    debug!("Loaded configuration from {}", path.display());
    Ok(parsed)
}

/// Root folder resolution
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml_config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("nas"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/nas"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("nas"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/nas"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("nas"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\nas"))
    } else {
        PathBuf::from("./nas_data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_defaults_under_root() {
        let config = TomlConfig::default();
        assert_eq!(
            config.database_path(Path::new("/srv/nas")),
            PathBuf::from("/srv/nas/nas.db")
        );
    }

    #[test]
    fn test_relative_database_path_joins_root() {
        let config = TomlConfig {
            database_path: Some(PathBuf::from("state/ledger.db")),
            ..Default::default()
        };
        assert_eq!(
            config.database_path(Path::new("/srv/nas")),
            PathBuf::from("/srv/nas/state/ledger.db")
        );
    }

    #[test]
    fn test_cli_root_folder_wins() {
        let config = TomlConfig {
            root_folder: Some(PathBuf::from("/from/toml")),
            ..Default::default()
        };
        let resolved = resolve_root_folder(Some(Path::new("/from/cli")), &config);
        assert_eq!(resolved, PathBuf::from("/from/cli"));
    }

    #[test]
    fn test_logging_defaults() {
        let config: TomlConfig = toml::from_str("").unwrap();
        assert_eq!(config.logging.level, "info");
        assert!(config.logging.file.is_none());
    }
}
