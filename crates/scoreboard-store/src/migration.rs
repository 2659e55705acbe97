//! Schema migration system.
//!
//! Migrations are stored as static SQL strings keyed by version number.
//! The applied version is tracked in a `_migrations` table, so opening an
//! already-initialized store is a no-op and a store whose schema never got
//! written is completed on the next open.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};
use crate::timestamp;

/// A single migration definition.
struct Migration {
    /// Monotonically increasing version number (1, 2, 3, ...).
    version: u32,
    /// Human-readable description.
    description: &'static str,
    /// Raw SQL to execute. May contain multiple statements separated by `;`.
    sql: &'static str,
}

/// All migrations in order. Add new migrations to the end of this array.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    description: "initial schema: score records",
    // `user_id` is unique store-wide, not per chat.
    sql: r#"
        CREATE TABLE scores (
            id                  INTEGER PRIMARY KEY AUTOINCREMENT,
            display_name        TEXT NOT NULL,
            user_id             INTEGER NOT NULL UNIQUE,
            chat_id             INTEGER NOT NULL,
            length              INTEGER NOT NULL DEFAULT 0,
            length_updated_at   TEXT,
            positive_count      INTEGER NOT NULL DEFAULT 0,
            positive_updated_at TEXT,
            negative_count      INTEGER NOT NULL DEFAULT 0,
            negative_updated_at TEXT
        );
        CREATE INDEX idx_scores_chat ON scores(chat_id);
        CREATE INDEX idx_scores_display_name ON scores(display_name);
    "#,
}];

// ── public API ───────────────────────────────────────────────────────

/// Bring the schema of `conn` up to [`latest_version`].
///
/// Synchronous; callers run it under the store lock.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    ensure_migrations_table(conn)?;

    let from = current_version(conn)?;
    for migration in MIGRATIONS.iter().filter(|m| m.version > from) {
        apply(conn, migration)?;
    }
    debug!(from, to = latest_version(), "schema up to date");
    Ok(())
}

/// Highest applied schema version, or 0 for an empty store.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("cannot read schema version: {e}"),
    })
}

/// The version the schema reaches once every migration is applied.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

// ── internals ────────────────────────────────────────────────────────

fn ensure_migrations_table(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  TEXT NOT NULL
        );",
    )
    .map_err(|e| StoreError::Migration {
        version: 0,
        message: format!("cannot create _migrations: {e}"),
    })
}

/// Apply one migration atomically. The schema change and its
/// `_migrations` row commit together or not at all.
fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    let failed = |step: &str, e: rusqlite::Error| {
        warn!(version = migration.version, step, error = %e, "migration rolled back");
        StoreError::Migration {
            version: migration.version,
            message: format!("{step}: {e}"),
        }
    };

    // Dropping `tx` without commit rolls back.
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| failed("begin", e))?;
    tx.execute_batch(migration.sql)
        .map_err(|e| failed("schema", e))?;
    tx.execute(
        "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![migration.version, migration.description, timestamp::now()],
    )
    .map_err(|e| failed("record", e))?;
    tx.commit().map_err(|e| failed("commit", e))?;

    info!(
        version = migration.version,
        description = migration.description,
        "schema migration applied"
    );
    Ok(())
}

// ── tests ────────────────────────────────────────────────────────────
