//! Location of the backing store file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Where the store lives on disk.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    /// Directory holding the backing file. Created on bootstrap if missing.
    pub data_dir: PathBuf,
    /// File name of the SQLite database inside `data_dir`.
    pub db_file: String,
}

impl StoreConfig {
    /// Build a config for `db_file` inside `data_dir`.
    pub fn new(data_dir: impl AsRef<Path>, db_file: impl Into<String>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            db_file: db_file.into(),
        }
    }

    /// Full path to the backing file.
    pub fn path(&self) -> PathBuf {
        self.data_dir.join(&self.db_file)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new("./data", "scores.db")
    }
}
