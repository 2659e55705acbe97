//! Scheduled snapshots of the Scoreboard store.
//!
//! - **[`scheduler`]** -- background task that wakes on a fixed interval and
//!   runs one backup cycle under the store lock.
//! - **[`snapshot`]** -- the cycle itself: ensure the backup directory,
//!   verify the source, stream the bytes into a timestamped file.
//! - **[`config`]** -- destination directory, interval and file naming.
//! - **[`error`]** -- [`BackupError`] via [`thiserror`].
//!
//! Snapshots accumulate; nothing here prunes old files.

pub mod config;
pub mod error;
pub mod scheduler;
pub mod snapshot;

pub use config::BackupConfig;
pub use error::{BackupError, BackupResult};
pub use scheduler::{BackupOutcome, BackupRun, BackupScheduler, BackupState};
pub use snapshot::Snapshot;
