//! Recurring backup scheduler.
//!
//! The scheduler owns a background tokio task that wakes once per
//! configured interval and copies the live store file into the backup
//! directory.
//!
//! # State machine
//!
//! ```text
//! Idle  --tick-->  BackingUp  --copy done (ok or failed)-->  Idle
//! ```
//!
//! The first tick fires one full interval after [`BackupScheduler::start`].
//! Each cycle holds the store lock from the WAL checkpoint until the copy
//! is finished, so no repository write can interleave with it. A failed
//! cycle is logged and recorded in [`BackupScheduler::last_run`]; there is
//! no retry before the next tick.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use scoreboard_store::Database;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

use crate::config::BackupConfig;
use crate::error::{BackupError, BackupResult};
use crate::snapshot::{self, Snapshot};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Whether a copy is currently running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackupState {
    /// Waiting for the next tick.
    Idle,
    /// A copy is in progress.
    BackingUp,
}

/// How a finished cycle ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Completed { path: PathBuf, bytes: u64 },
    Failed { error: String },
}

/// Record of the most recent cycle.
#[derive(Debug, Clone)]
pub struct BackupRun {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub outcome: BackupOutcome,
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Periodic snapshotter for one store.
///
/// Cheaply cloneable (`Arc`-backed); clones share state and lifecycle.
#[derive(Clone)]
pub struct BackupScheduler {
    inner: Arc<SchedulerInner>,
}

struct SchedulerInner {
    db: Database,
    config: BackupConfig,

    /// `true` while a cycle is copying.
    backing_up: AtomicBool,

    last_run: Mutex<Option<BackupRun>>,

    /// Wakes the background loop on shutdown.
    notify: Notify,

    /// When `true` the background loop exits at its next wait point.
    shutdown: AtomicBool,
}

impl BackupScheduler {
    /// Create a scheduler for `db` **without** starting the background loop.
    ///
    /// `db` is the same handle the repository uses; its connection lock is
    /// the lock every cycle acquires.
    pub fn new(db: Database, config: BackupConfig) -> BackupResult<Self> {
        if config.interval_secs == 0 || Instant::now().checked_add(config.interval()).is_none() {
            return Err(BackupError::InvalidInterval);
        }
        Ok(Self {
            inner: Arc::new(SchedulerInner {
                db,
                config,
                backing_up: AtomicBool::new(false),
                last_run: Mutex::new(None),
                notify: Notify::new(),
                shutdown: AtomicBool::new(false),
            }),
        })
    }

    /// Spawn the background loop onto the tokio runtime.
    ///
    /// Returns a [`JoinHandle`] that resolves after [`shutdown`](Self::shutdown).
    pub fn start(&self) -> JoinHandle<()> {
        let scheduler = self.clone();
        tokio::spawn(async move {
            info!(
                interval_secs = scheduler.inner.config.interval_secs,
                backup_dir = %scheduler.inner.config.backup_dir.display(),
                "backup scheduler started"
            );
            scheduler.run_loop().await;
            info!("backup scheduler stopped");
        })
    }

    /// Run one backup cycle now and return the snapshot path.
    ///
    /// Fails with [`BackupError::InProgress`] if another cycle is copying.
    pub async fn run_once(&self) -> BackupResult<PathBuf> {
        if self.inner.backing_up.swap(true, Ordering::AcqRel) {
            return Err(BackupError::InProgress);
        }
        let _idle_on_exit = IdleGuard(&self.inner.backing_up);

        let started_at = Utc::now();
        info!("backup started");
        let result = self.copy_under_lock().await;
        let completed_at = Utc::now();

        let outcome = match &result {
            Ok(snapshot) => {
                info!(
                    path = %snapshot.path.display(),
                    bytes = snapshot.bytes,
                    "backup created successfully"
                );
                BackupOutcome::Completed {
                    path: snapshot.path.clone(),
                    bytes: snapshot.bytes,
                }
            }
            Err(err) => {
                error!(error = %err, "backup failed");
                BackupOutcome::Failed {
                    error: err.to_string(),
                }
            }
        };

        *self
            .inner
            .last_run
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(BackupRun {
            started_at,
            completed_at,
            outcome,
        });

        result.map(|snapshot| snapshot.path)
    }

    /// Current state of the state machine.
    pub fn state(&self) -> BackupState {
        if self.inner.backing_up.load(Ordering::Acquire) {
            BackupState::BackingUp
        } else {
            BackupState::Idle
        }
    }

    /// The most recently finished cycle, if any.
    pub fn last_run(&self) -> Option<BackupRun> {
        self.inner
            .last_run
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn config(&self) -> &BackupConfig {
        &self.inner.config
    }

    /// Ask the background loop to stop. A copy already running finishes
    /// first.
    pub fn shutdown(&self) {
        info!("backup scheduler shutdown requested");
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner.notify.notify_one();
    }

    // -- Private helpers ----------------------------------------------------

    /// Checkpoint and copy while holding the store lock.
    async fn copy_under_lock(&self) -> BackupResult<Snapshot> {
        let source = self
            .inner
            .db
            .path()
            .ok_or(BackupError::NoBackingFile)?
            .to_path_buf();
        let config = self.inner.config.clone();

        let snapshot = self
            .inner
            .db
            .execute(move |conn| {
                Database::checkpoint(conn)?;
                let file_name = config.file_name(Utc::now());
                Ok(snapshot::create_snapshot(
                    &source,
                    &config.backup_dir,
                    &file_name,
                ))
            })
            .await??;
        Ok(snapshot)
    }

    /// Background loop: wait for a tick or shutdown, whichever comes first.
    async fn run_loop(&self) {
        let period = self.inner.config.interval();
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if self.inner.shutdown.load(Ordering::Acquire) {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {
                    // Failures are logged and recorded by `run_once`.
                    let _ = self.run_once().await;
                    info!(next_in_secs = period.as_secs(), "waiting for next backup");
                }
                _ = self.inner.notify.notified() => {}
            }
        }
    }
}

/// Returns the scheduler to Idle when a cycle ends, including when the
/// `run_once` future is dropped mid-copy.
struct IdleGuard<'a>(&'a AtomicBool);

impl Drop for IdleGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
