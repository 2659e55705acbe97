//! Backup destination and cadence.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// One day.
pub const DEFAULT_INTERVAL_SECS: u64 = 24 * 60 * 60;

/// Where snapshots go and how often they are taken.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BackupConfig {
    /// Directory receiving snapshot files. Created on demand.
    pub backup_dir: PathBuf,
    /// Seconds between two scheduled snapshots.
    pub interval_secs: u64,
    /// Snapshot file name prefix.
    pub file_prefix: String,
    /// Snapshot file name extension, including the dot.
    pub file_extension: String,
}

impl BackupConfig {
    /// Defaults with a different destination directory.
    pub fn with_dir(backup_dir: impl Into<PathBuf>) -> Self {
        Self {
            backup_dir: backup_dir.into(),
            ..Self::default()
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Snapshot file name for a cycle started at `at`, e.g.
    /// `database_backup_20240309_070501.db`.
    pub fn file_name(&self, at: DateTime<Utc>) -> String {
        format!(
            "{}{}{}",
            self.file_prefix,
            at.format("%Y%m%d_%H%M%S"),
            self.file_extension
        )
    }
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            backup_dir: PathBuf::from("./backups"),
            interval_secs: DEFAULT_INTERVAL_SECS,
            file_prefix: "database_backup_".to_string(),
            file_extension: ".db".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn default_is_daily() {
        assert_eq!(BackupConfig::default().interval(), Duration::from_secs(86_400));
    }

    #[test]
    fn file_name_embeds_second_precision_timestamp() {
        let config = BackupConfig::default();
        let at = Utc.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        assert_eq!(config.file_name(at), "database_backup_20240309_070501.db");
    }

    #[test]
    fn file_names_differ_one_second_apart() {
        let config = BackupConfig::with_dir("/tmp/x");
        let at = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let later = at + chrono::TimeDelta::seconds(1);
        assert_ne!(config.file_name(at), config.file_name(later));
    }
}
