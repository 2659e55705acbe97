//! # scoreboard-store
//!
//! Storage engine for Scoreboard.
//!
//! Persists per-user, per-chat score records in a single SQLite file.
//! [`Database::bootstrap`] prepares the directory, the file and the schema;
//! [`ScoreStore`] serves typed reads and updates on top of the returned
//! handle.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  ScoreStore (lookups, updates, counters) │
//! ├─────────────────────────────────────────┤
//! │  Database (rusqlite WAL, store lock)     │
//! │  Migrations (versioned, transactional)   │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Quick start
//!
//! ```ignore
//! use scoreboard_store::{Database, ScoreStore, StoreConfig};
//!
//! let db = Database::bootstrap(&StoreConfig::default())?;
//! let scores = ScoreStore::new(db.clone());
//! scores.set_score(user_id, chat_id, 42).await?;
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod migration;
pub mod score_store;
pub mod timestamp;

// ── re-exports ───────────────────────────────────────────────────────

pub use config::StoreConfig;
pub use db::Database;
pub use error::{StoreError, StoreResult};
pub use score_store::{Member, NewScoreRecord, Score, ScoreRecord, ScoreStore, Verdict};
