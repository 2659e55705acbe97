//! SQLite database handle, bootstrap and pragmas.
//!
//! The [`Database`] struct wraps a `rusqlite::Connection` behind an
//! `Arc<Mutex<>>` and exposes async methods that use
//! `tokio::task::spawn_blocking` to avoid blocking the async runtime.
//!
//! The connection mutex doubles as the store-wide exclusive lock: every
//! repository statement runs under it, and so does the backup copy. A
//! snapshot therefore never observes a half-applied write.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::Connection;
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::migration;

/// Thread-safe handle to a SQLite database.
///
/// All read/write operations go through [`Database::execute`] which
/// dispatches onto the blocking thread pool via `tokio::task::spawn_blocking`.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl Database {
    /// Ensure the storage directory and backing file exist, then bring the
    /// schema up to date.
    ///
    /// Safe to call on every process start. If the file did not exist and
    /// the schema cannot be created, the new file is removed again so a
    /// half-initialized store is never left behind.
    pub fn bootstrap(config: &StoreConfig) -> StoreResult<Self> {
        let path = config.path();

        if !config.data_dir.exists() {
            std::fs::create_dir_all(&config.data_dir).map_err(|e| {
                error!(dir = %config.data_dir.display(), error = %e, "failed to create data directory");
                StoreError::Init {
                    path: config.data_dir.display().to_string(),
                    message: format!("failed to create directory: {e}"),
                }
            })?;
            info!(dir = %config.data_dir.display(), "created data directory");
        }

        let fresh = !path.exists();
        let db = Self::open(&path).map_err(|e| match e {
            StoreError::Sqlite(err) => StoreError::Init {
                path: path.display().to_string(),
                message: err.to_string(),
            },
            other => other,
        })?;

        let migrated = {
            let conn = db.lock()?;
            migration::run_all(&conn)
        };
        if let Err(err) = migrated {
            error!(path = %path.display(), %err, "schema creation failed");
            if fresh {
                drop(db);
                remove_store_files(&path);
            }
            return Err(err);
        }

        if fresh {
            info!(path = %path.display(), "database and schema created");
        } else {
            info!(path = %path.display(), "database opened");
        }
        Ok(db)
    }

    /// Open (or create) a database at `path` and apply pragmas.
    ///
    /// This call blocks briefly (file I/O), so call it during startup before
    /// entering the main async loop, or wrap it in `spawn_blocking` yourself.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "opening database");

        let conn = Connection::open(path)?;
        Self::apply_pragmas(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Create an in-memory database, for tests.
    pub fn open_in_memory() -> StoreResult<Self> {
        debug!("opening in-memory database");

        let conn = Connection::open_in_memory()?;
        Self::apply_pragmas(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Open the database and run all pending migrations.
    pub async fn open_and_migrate(path: impl AsRef<Path> + Send + 'static) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let db = tokio::task::spawn_blocking(move || Self::open(&path)).await??;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Path of the backing file, or `None` for in-memory databases.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Run all pending schema migrations.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        self.execute(|conn| migration::run_all(conn)).await
    }

    /// Execute an arbitrary closure against the connection on the blocking pool.
    ///
    /// The closure runs while the store-wide lock is held.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let count: i64 = db.execute(|conn| {
    ///     let count = conn.query_row("SELECT count(*) FROM scores", [], |row| row.get(0))?;
    ///     Ok(count)
    /// }).await?;
    /// ```
    pub async fn execute<F, T>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&Connection) -> StoreResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        tokio::task::spawn_blocking(move || {
            let conn = db.lock()?;
            f(&conn)
        })
        .await?
    }

    /// Flush the write-ahead log into the main database file.
    ///
    /// Call with the lock held; afterwards the main file alone holds every
    /// committed write.
    pub fn checkpoint(conn: &Connection) -> StoreResult<()> {
        let (busy, log_frames, checkpointed): (i64, i64, i64) = conn.query_row(
            "PRAGMA wal_checkpoint(TRUNCATE)",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;
        if busy != 0 {
            warn!(log_frames, checkpointed, "wal checkpoint could not complete");
        } else {
            debug!(log_frames, checkpointed, "wal checkpoint complete");
        }
        Ok(())
    }

    /// Acquire the store-wide lock on the calling thread.
    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StoreError::TaskJoin(format!("mutex poisoned: {e}")))
    }

    // ── pragmas ──────────────────────────────────────────────────────

    /// Apply pragmas to a fresh connection.
    fn apply_pragmas(conn: &Connection) -> StoreResult<()> {
        debug!("applying SQLite pragmas");

        // WAL mode: readers do not block the writer.
        conn.pragma_update(None, "journal_mode", "WAL")?;

        // NORMAL sync is safe with WAL: we only lose the last transaction
        // on a power failure, not corruption.
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        conn.pragma_update(None, "foreign_keys", "ON")?;

        // Busy timeout so concurrent writers wait instead of failing immediately.
        conn.pragma_update(None, "busy_timeout", 5_000_i32)?;

        debug!("database pragmas applied");
        Ok(())
    }
}

/// Best-effort removal of a backing file and its WAL side files.
fn remove_store_files(path: &Path) {
    let mut targets = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut side = path.as_os_str().to_owned();
        side.push(suffix);
        targets.push(PathBuf::from(side));
    }
    for target in targets {
        match std::fs::remove_file(&target) {
            Ok(()) => debug!(path = %target.display(), "removed half-initialized file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %target.display(), error = %e, "failed to remove file"),
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────
