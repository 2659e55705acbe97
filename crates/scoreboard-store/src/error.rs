//! Error types for the scoreboard-store crate.
//!
//! All storage operations return [`StoreError`] via [`StoreResult`].

use thiserror::Error;

/// Alias for `Result<T, StoreError>`.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in the storage engine.
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite operation failed.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The storage directory or backing file could not be prepared.
    #[error("failed to initialize store at {path}: {message}")]
    Init { path: String, message: String },

    /// A schema migration failed.
    #[error("migration v{version} failed: {message}")]
    Migration { version: u32, message: String },

    /// The requested record was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A stored timestamp does not match the persisted layout.
    #[error("malformed timestamp {value:?}: {message}")]
    Timestamp { value: String, message: String },

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An invalid argument was provided to a store operation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A blocking task was cancelled or panicked.
    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::TaskJoin(err.to_string())
    }
}

impl StoreError {
    /// Returns `true` for the "no matching record" outcome.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
