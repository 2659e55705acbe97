//! Application configuration.
//!
//! Reads `config/default.toml` (or the file given with `--config`) and lets
//! `SCOREBOARD_*` environment variables override individual values. A
//! missing file means defaults; a file that exists but does not parse is an
//! error.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use scoreboard_backup::BackupConfig;
use scoreboard_store::StoreConfig;
use serde::Deserialize;

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Top-level settings, one TOML table per concern.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    /// Default tracing filter when `RUST_LOG` is unset.
    pub log_level: String,
    pub store: StoreConfig,
    pub backup: BackupConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            store: StoreConfig::default(),
            backup: BackupConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load from `path` and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::from_file(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("failed to read {}", path.display()));
            }
        };
        toml::from_str(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Apply `SCOREBOARD_*` overrides looked up through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(level) = lookup("SCOREBOARD_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(dir) = lookup("SCOREBOARD_DATA_DIR") {
            self.store.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("SCOREBOARD_BACKUP_DIR") {
            self.backup.backup_dir = PathBuf::from(dir);
        }
        if let Some(secs) = lookup("SCOREBOARD_BACKUP_INTERVAL_SECS") {
            self.backup.interval_secs = secs
                .parse()
                .with_context(|| format!("SCOREBOARD_BACKUP_INTERVAL_SECS is not a number: {secs}"))?;
        }
        Ok(())
    }
}
