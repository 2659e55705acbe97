//! Backup error types.
//!
//! Every failure of a backup cycle surfaces as a [`BackupError`]. None of
//! them is fatal to the process: the scheduler logs the error and waits
//! for the next tick.

use std::path::PathBuf;

use scoreboard_store::StoreError;

/// Errors produced by a backup cycle.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    /// The backup directory is missing and could not be created.
    #[error("cannot create backup directory {}: {source}", path.display())]
    BackupDir {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The store file to copy does not exist.
    #[error("database file does not exist: {}", path.display())]
    SourceMissing { path: PathBuf },

    /// The store is in-memory and has nothing to copy.
    #[error("store has no backing file")]
    NoBackingFile,

    /// Reading the source or writing the snapshot failed.
    #[error("snapshot i/o failed at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Another cycle is still copying.
    #[error("a backup is already in progress")]
    InProgress,

    /// The configured interval cannot drive a timer.
    #[error("backup interval must be greater than zero and fit the timer range")]
    InvalidInterval,

    /// Acquiring the store lock or flushing the store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias used throughout the backup crate.
pub type BackupResult<T> = std::result::Result<T, BackupError>;
