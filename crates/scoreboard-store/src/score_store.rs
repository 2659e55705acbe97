//! Score record persistence.
//!
//! One row per tracked participant: a display name, the messaging
//! platform's user id, the chat the record belongs to, the current length
//! and two event counters ("positive" and "negative") with their
//! last-update timestamps. Rows are inserted once via [`ScoreStore::enroll`]
//! and afterwards only updated, never deleted.
//!
//! The platform user id is unique across the whole store, although most
//! lookups are keyed by (user, chat). A participant can therefore belong to
//! one chat only.

use chrono::{DateTime, Utc};
use rusqlite::{OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, instrument};

use crate::db::Database;
use crate::error::{StoreError, StoreResult};
use crate::timestamp;

// ═══════════════════════════════════════════════════════════════════════
//  Types
// ═══════════════════════════════════════════════════════════════════════

/// A persisted score record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Store-assigned row id. Never reused.
    pub id: i64,
    /// Human-readable handle; not unique.
    pub display_name: String,
    /// Messaging platform user id; unique store-wide.
    pub user_id: i64,
    /// Chat the record belongs to.
    pub chat_id: i64,
    /// Current score value.
    pub length: i64,
    /// When `length` last changed through a score update.
    pub length_updated_at: Option<DateTime<Utc>>,
    /// Number of favorable events.
    pub positive_count: i64,
    /// When the last favorable event happened.
    pub positive_updated_at: Option<DateTime<Utc>>,
    /// Number of unfavorable events.
    pub negative_count: i64,
    /// When the last unfavorable event happened.
    pub negative_updated_at: Option<DateTime<Utc>>,
}

/// Input for [`ScoreStore::enroll`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewScoreRecord {
    pub display_name: String,
    pub user_id: i64,
    pub chat_id: i64,
    pub length: i64,
}

/// A chat member as returned by [`ScoreStore::list_members`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    pub user_id: i64,
    pub display_name: String,
}

/// Current length of a participant and when it last changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Score {
    pub length: i64,
    /// `None` until the first score update.
    pub length_updated_at: Option<DateTime<Utc>>,
}

/// Which event counter an increment applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    /// A favorable event.
    Positive,
    /// An unfavorable event.
    Negative,
}

impl Verdict {
    fn increment_sql(self) -> &'static str {
        match self {
            Self::Positive => {
                "UPDATE scores SET length = ?1, positive_count = positive_count + 1, \
                 positive_updated_at = ?2 WHERE user_id = ?3 AND chat_id = ?4"
            }
            Self::Negative => {
                "UPDATE scores SET length = ?1, negative_count = negative_count + 1, \
                 negative_updated_at = ?2 WHERE user_id = ?3 AND chat_id = ?4"
            }
        }
    }

    fn max_updated_at_sql(self) -> &'static str {
        match self {
            Self::Positive => "SELECT MAX(positive_updated_at) FROM scores WHERE chat_id = ?1",
            Self::Negative => "SELECT MAX(negative_updated_at) FROM scores WHERE chat_id = ?1",
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Negative => "negative",
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  ScoreStore
// ═══════════════════════════════════════════════════════════════════════

const RECORD_COLUMNS: &str = "id, display_name, user_id, chat_id, length, length_updated_at, \
     positive_count, positive_updated_at, negative_count, negative_updated_at";

/// Reads and updates of score records.
///
/// Every operation is a single statement executed under the store-wide
/// lock held by [`Database::execute`].
#[derive(Clone)]
pub struct ScoreStore {
    db: Database,
}

impl ScoreStore {
    /// Create a new score store backed by `db`.
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new record and return it.
    ///
    /// Fails with [`StoreError::Conflict`] if `user_id` is already tracked
    /// in any chat.
    #[instrument(skip(self, record), fields(user_id = record.user_id, chat_id = record.chat_id))]
    pub async fn enroll(&self, record: NewScoreRecord) -> StoreResult<ScoreRecord> {
        if record.display_name.is_empty() {
            return Err(StoreError::InvalidArgument(
                "display name must not be empty".into(),
            ));
        }

        self.db
            .execute(move |conn| {
                conn.execute(
                    "INSERT INTO scores (display_name, user_id, chat_id, length) \
                     VALUES (?1, ?2, ?3, ?4)",
                    rusqlite::params![
                        record.display_name,
                        record.user_id,
                        record.chat_id,
                        record.length
                    ],
                )
                .map_err(|e| {
                    if let rusqlite::Error::SqliteFailure(ref err, _) = e
                        && err.code == rusqlite::ErrorCode::ConstraintViolation
                    {
                        return StoreError::Conflict(format!(
                            "user {} is already tracked",
                            record.user_id
                        ));
                    }
                    StoreError::Sqlite(e)
                })?;

                let stored = ScoreRecord {
                    id: conn.last_insert_rowid(),
                    display_name: record.display_name,
                    user_id: record.user_id,
                    chat_id: record.chat_id,
                    length: record.length,
                    length_updated_at: None,
                    positive_count: 0,
                    positive_updated_at: None,
                    negative_count: 0,
                    negative_updated_at: None,
                };
                debug!(id = stored.id, "score record enrolled");
                Ok(stored)
            })
            .await
    }

    /// Look up the platform user id of the record named `name`.
    ///
    /// Display names are not unique; when several records share a name,
    /// whichever the store yields first wins.
    #[instrument(skip(self))]
    pub async fn find_user_id_by_name(&self, name: &str) -> StoreResult<i64> {
        let name = name.to_string();
        self.db
            .execute(move |conn| {
                let user_id: Option<i64> = conn
                    .query_row(
                        "SELECT user_id FROM scores WHERE display_name = ?1 LIMIT 1",
                        rusqlite::params![name],
                        |row| row.get(0),
                    )
                    .optional()?;
                let user_id = user_id.ok_or_else(|| StoreError::NotFound {
                    entity: "score record",
                    id: format!("name={name}"),
                })?;
                debug!(%name, user_id, "user id resolved");
                Ok(user_id)
            })
            .await
    }

    /// All members of a chat, in the store's natural order.
    #[instrument(skip(self))]
    pub async fn list_members(&self, chat_id: i64) -> StoreResult<Vec<Member>> {
        self.db
            .execute(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT user_id, display_name FROM scores WHERE chat_id = ?1 ORDER BY id",
                )?;
                let members = stmt
                    .query_map(rusqlite::params![chat_id], |row| {
                        Ok(Member {
                            user_id: row.get(0)?,
                            display_name: row.get(1)?,
                        })
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(members)
            })
            .await
    }

    /// Current length of `user_id` in `chat_id`.
    #[instrument(skip(self))]
    pub async fn get_score(&self, user_id: i64, chat_id: i64) -> StoreResult<Score> {
        self.db
            .execute(move |conn| {
                let row: Option<(i64, Option<String>)> = conn
                    .query_row(
                        "SELECT length, length_updated_at FROM scores \
                         WHERE user_id = ?1 AND chat_id = ?2",
                        rusqlite::params![user_id, chat_id],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;
                let (length, updated_at) = row.ok_or_else(|| not_found(user_id, chat_id))?;
                Ok(Score {
                    length,
                    length_updated_at: timestamp::parse_opt(updated_at)?,
                })
            })
            .await
    }

    /// The full record of `user_id` in `chat_id`.
    #[instrument(skip(self))]
    pub async fn get_record(&self, user_id: i64, chat_id: i64) -> StoreResult<ScoreRecord> {
        self.db
            .execute(move |conn| {
                let row = conn
                    .query_row(
                        &format!(
                            "SELECT {RECORD_COLUMNS} FROM scores WHERE user_id = ?1 AND chat_id = ?2"
                        ),
                        rusqlite::params![user_id, chat_id],
                        RecordRow::from_row,
                    )
                    .optional()?;
                row.ok_or_else(|| not_found(user_id, chat_id))?.into_record()
            })
            .await
    }

    /// Overwrite the length of `user_id` in `chat_id` and stamp the update
    /// time.
    #[instrument(skip(self))]
    pub async fn set_score(&self, user_id: i64, chat_id: i64, new_length: i64) -> StoreResult<()> {
        let now = timestamp::now();
        self.db
            .execute(move |conn| {
                let updated = conn
                    .execute(
                        "UPDATE scores SET length = ?1, length_updated_at = ?2 \
                         WHERE user_id = ?3 AND chat_id = ?4",
                        rusqlite::params![new_length, now, user_id, chat_id],
                    )
                    .inspect_err(|e| {
                        error!(user_id, chat_id, error = %e, "failed to update score");
                    })?;
                if updated == 0 {
                    return Err(not_found(user_id, chat_id));
                }
                debug!(user_id, chat_id, new_length, "score updated");
                Ok(())
            })
            .await
    }

    /// Set the length and record one favorable event.
    pub async fn increment_positive(
        &self,
        user_id: i64,
        chat_id: i64,
        new_length: i64,
    ) -> StoreResult<()> {
        self.increment(Verdict::Positive, user_id, chat_id, new_length)
            .await
    }

    /// Set the length and record one unfavorable event.
    pub async fn increment_negative(
        &self,
        user_id: i64,
        chat_id: i64,
        new_length: i64,
    ) -> StoreResult<()> {
        self.increment(Verdict::Negative, user_id, chat_id, new_length)
            .await
    }

    /// Set the length, bump the `verdict` counter by one and stamp its
    /// update time, all in one statement.
    #[instrument(skip(self))]
    pub async fn increment(
        &self,
        verdict: Verdict,
        user_id: i64,
        chat_id: i64,
        new_length: i64,
    ) -> StoreResult<()> {
        let now = timestamp::now();
        self.db
            .execute(move |conn| {
                let updated = conn
                    .execute(
                        verdict.increment_sql(),
                        rusqlite::params![new_length, now, user_id, chat_id],
                    )
                    .inspect_err(|e| {
                        error!(user_id, chat_id, %verdict, error = %e, "failed to record event");
                    })?;
                if updated == 0 {
                    return Err(not_found(user_id, chat_id));
                }
                debug!(user_id, chat_id, %verdict, new_length, "event recorded");
                Ok(())
            })
            .await
    }

    /// Latest favorable event in `chat_id`, or `None` if there was none.
    pub async fn max_positive_updated_at(&self, chat_id: i64) -> StoreResult<Option<DateTime<Utc>>> {
        self.max_updated_at(Verdict::Positive, chat_id).await
    }

    /// Latest unfavorable event in `chat_id`, or `None` if there was none.
    pub async fn max_negative_updated_at(&self, chat_id: i64) -> StoreResult<Option<DateTime<Utc>>> {
        self.max_updated_at(Verdict::Negative, chat_id).await
    }

    /// Latest `verdict` event across every record of `chat_id`.
    ///
    /// A stored value outside the timestamp layout is reported as
    /// [`StoreError::Timestamp`], never as "no data".
    #[instrument(skip(self))]
    pub async fn max_updated_at(
        &self,
        verdict: Verdict,
        chat_id: i64,
    ) -> StoreResult<Option<DateTime<Utc>>> {
        self.db
            .execute(move |conn| {
                let raw: Option<String> = conn
                    .query_row(verdict.max_updated_at_sql(), rusqlite::params![chat_id], |row| {
                        row.get(0)
                    })
                    .inspect_err(|e| {
                        error!(chat_id, %verdict, error = %e, "failed to query last update time");
                    })?;
                let latest = timestamp::parse_opt(raw).inspect_err(|e| {
                    error!(chat_id, %verdict, error = %e, "failed to parse last update time");
                })?;
                if latest.is_none() {
                    debug!(chat_id, %verdict, "no events recorded yet");
                }
                Ok(latest)
            })
            .await
    }

    /// Overwrite the length of every record in `chat_id` without touching
    /// any timestamp. Returns the number of records changed.
    #[instrument(skip(self))]
    pub async fn set_chat_length(&self, chat_id: i64, new_length: i64) -> StoreResult<usize> {
        self.db
            .execute(move |conn| {
                let updated = conn
                    .execute(
                        "UPDATE scores SET length = ?1 WHERE chat_id = ?2",
                        rusqlite::params![new_length, chat_id],
                    )
                    .inspect_err(|e| {
                        error!(chat_id, error = %e, "failed to update chat length");
                    })?;
                debug!(chat_id, new_length, updated, "chat length updated");
                Ok(updated)
            })
            .await
    }

    /// Number of records in the store.
    pub async fn count(&self) -> StoreResult<i64> {
        self.db
            .execute(|conn| {
                let count = conn.query_row("SELECT count(*) FROM scores", [], |row| row.get(0))?;
                Ok(count)
            })
            .await
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Internal helpers
// ═══════════════════════════════════════════════════════════════════════

fn not_found(user_id: i64, chat_id: i64) -> StoreError {
    StoreError::NotFound {
        entity: "score record",
        id: format!("user={user_id} chat={chat_id}"),
    }
}

/// Raw row with timestamps still in their text form.
struct RecordRow {
    id: i64,
    display_name: String,
    user_id: i64,
    chat_id: i64,
    length: i64,
    length_updated_at: Option<String>,
    positive_count: i64,
    positive_updated_at: Option<String>,
    negative_count: i64,
    negative_updated_at: Option<String>,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            display_name: row.get(1)?,
            user_id: row.get(2)?,
            chat_id: row.get(3)?,
            length: row.get(4)?,
            length_updated_at: row.get(5)?,
            positive_count: row.get(6)?,
            positive_updated_at: row.get(7)?,
            negative_count: row.get(8)?,
            negative_updated_at: row.get(9)?,
        })
    }

    fn into_record(self) -> StoreResult<ScoreRecord> {
        Ok(ScoreRecord {
            id: self.id,
            display_name: self.display_name,
            user_id: self.user_id,
            chat_id: self.chat_id,
            length: self.length,
            length_updated_at: timestamp::parse_opt(self.length_updated_at)?,
            positive_count: self.positive_count,
            positive_updated_at: timestamp::parse_opt(self.positive_updated_at)?,
            negative_count: self.negative_count,
            negative_updated_at: timestamp::parse_opt(self.negative_updated_at)?,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    async fn setup_store() -> ScoreStore {
        let db = Database::open_in_memory().unwrap();
        db.run_migrations().await.unwrap();
        ScoreStore::new(db)
    }

    fn member(name: &str, user_id: i64, chat_id: i64) -> NewScoreRecord {
        NewScoreRecord {
            display_name: name.to_string(),
            user_id,
            chat_id,
            length: 10,
        }
    }

    /// Write a raw value into a timestamp column, bypassing the formatter.
    async fn force_column(store: &ScoreStore, column: &'static str, user_id: i64, value: &str) {
        let value = value.to_string();
        store
            .db
            .execute(move |conn| {
                conn.execute(
                    &format!("UPDATE scores SET {column} = ?1 WHERE user_id = ?2"),
                    rusqlite::params![value, user_id],
                )?;
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn enroll_assigns_increasing_ids() {
        let store = setup_store().await;

        let a = store.enroll(member("alice", 1, 100)).await.unwrap();
        let b = store.enroll(member("bob", 2, 100)).await.unwrap();

        assert!(b.id > a.id);
        assert_eq!(a.length, 10);
        assert_eq!(a.positive_count, 0);
        assert!(a.length_updated_at.is_none());
        assert_eq!(store.count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn enroll_rejects_empty_name() {
        let store = setup_store().await;
        let err = store.enroll(member("", 1, 100)).await.unwrap_err();
        assert!(matches!(err, StoreError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn enroll_same_user_in_other_chat_conflicts() {
        let store = setup_store().await;
        store.enroll(member("alice", 1, 100)).await.unwrap();

        // The user id is unique store-wide, so a second chat is rejected.
        let err = store.enroll(member("alice", 1, 200)).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn find_user_id_by_name() {
        let store = setup_store().await;
        store.enroll(member("alice", 1, 100)).await.unwrap();
        store.enroll(member("bob", 2, 100)).await.unwrap();

        assert_eq!(store.find_user_id_by_name("bob").await.unwrap(), 2);
        let err = store.find_user_id_by_name("carol").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn find_user_id_by_name_is_exact() {
        let store = setup_store().await;
        store.enroll(member("alice", 1, 100)).await.unwrap();

        assert!(store.find_user_id_by_name("Alice").await.unwrap_err().is_not_found());
        assert!(store.find_user_id_by_name("ali").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn list_members_filters_by_chat() {
        let store = setup_store().await;
        store.enroll(member("alice", 1, 100)).await.unwrap();
        store.enroll(member("bob", 2, 200)).await.unwrap();
        store.enroll(member("carol", 3, 100)).await.unwrap();

        let members = store.list_members(100).await.unwrap();
        assert_eq!(
            members,
            vec![
                Member { user_id: 1, display_name: "alice".into() },
                Member { user_id: 3, display_name: "carol".into() },
            ]
        );
        assert!(store.list_members(300).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn get_score_before_any_update() {
        let store = setup_store().await;
        store.enroll(member("alice", 1, 100)).await.unwrap();

        let score = store.get_score(1, 100).await.unwrap();
        assert_eq!(score.length, 10);
        assert!(score.length_updated_at.is_none());
    }

    #[tokio::test]
    async fn get_score_wrong_chat_is_not_found() {
        let store = setup_store().await;
        store.enroll(member("alice", 1, 100)).await.unwrap();

        let err = store.get_score(1, 999).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn set_score_overwrites_and_stamps() {
        let store = setup_store().await;
        store.enroll(member("alice", 1, 100)).await.unwrap();

        let before = Utc::now() - chrono::TimeDelta::seconds(1);
        store.set_score(1, 100, 42).await.unwrap();

        let score = store.get_score(1, 100).await.unwrap();
        assert_eq!(score.length, 42);
        let stamped = score.length_updated_at.unwrap();
        assert!(stamped >= before);

        store.set_score(1, 100, -3).await.unwrap();
        assert_eq!(store.get_score(1, 100).await.unwrap().length, -3);
    }

    #[tokio::test]
    async fn set_score_missing_row_is_not_found() {
        let store = setup_store().await;
        let err = store.set_score(1, 100, 42).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn increment_positive_bumps_counter_and_length() {
        let store = setup_store().await;
        store.enroll(member("alice", 1, 100)).await.unwrap();

        store.increment_positive(1, 100, 15).await.unwrap();
        store.increment_positive(1, 100, 20).await.unwrap();

        let record = store.get_record(1, 100).await.unwrap();
        assert_eq!(record.length, 20);
        assert_eq!(record.positive_count, 2);
        assert!(record.positive_updated_at.is_some());
        assert_eq!(record.negative_count, 0);
        assert!(record.negative_updated_at.is_none());
        // Score updates and events are stamped independently.
        assert!(record.length_updated_at.is_none());
    }

    #[tokio::test]
    async fn increment_negative_bumps_counter() {
        let store = setup_store().await;
        store.enroll(member("alice", 1, 100)).await.unwrap();

        store.increment_negative(1, 100, 5).await.unwrap();

        let record = store.get_record(1, 100).await.unwrap();
        assert_eq!(record.length, 5);
        assert_eq!(record.negative_count, 1);
        assert!(record.negative_updated_at.is_some());
        assert_eq!(record.positive_count, 0);
    }

    #[tokio::test]
    async fn increment_missing_row_is_not_found() {
        let store = setup_store().await;
        let err = store.increment_negative(7, 100, 5).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn max_updated_at_without_events_is_none() {
        let store = setup_store().await;
        store.enroll(member("alice", 1, 100)).await.unwrap();

        assert!(store.max_positive_updated_at(100).await.unwrap().is_none());
        assert!(store.max_negative_updated_at(100).await.unwrap().is_none());
        // An unknown chat behaves the same.
        assert!(store.max_positive_updated_at(555).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn max_updated_at_picks_latest_in_chat() {
        let store = setup_store().await;
        store.enroll(member("alice", 1, 100)).await.unwrap();
        store.enroll(member("bob", 2, 100)).await.unwrap();
        store.enroll(member("carol", 3, 200)).await.unwrap();

        force_column(&store, "positive_updated_at", 1, "2024-01-01 10:00:00Z").await;
        force_column(&store, "positive_updated_at", 2, "2024-02-01 10:00:00Z").await;
        force_column(&store, "positive_updated_at", 3, "2025-01-01 10:00:00Z").await;

        let latest = store.max_positive_updated_at(100).await.unwrap().unwrap();
        assert_eq!(latest, timestamp::parse("2024-02-01 10:00:00Z").unwrap());
        assert!(store.max_negative_updated_at(100).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn max_updated_at_malformed_value_is_parse_error() {
        let store = setup_store().await;
        store.enroll(member("alice", 1, 100)).await.unwrap();
        force_column(&store, "negative_updated_at", 1, "2024-01-01T10:00:00.123").await;

        let err = store.max_negative_updated_at(100).await.unwrap_err();
        assert!(matches!(err, StoreError::Timestamp { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn set_chat_length_touches_only_that_chat() {
        let store = setup_store().await;
        store.enroll(member("alice", 1, 100)).await.unwrap();
        store.enroll(member("bob", 2, 100)).await.unwrap();
        store.enroll(member("carol", 3, 200)).await.unwrap();

        assert_eq!(store.set_chat_length(100, 0).await.unwrap(), 2);

        assert_eq!(store.get_score(1, 100).await.unwrap().length, 0);
        assert_eq!(store.get_score(2, 100).await.unwrap().length, 0);
        assert_eq!(store.get_score(3, 200).await.unwrap().length, 10);
        assert!(store.get_score(1, 100).await.unwrap().length_updated_at.is_none());
    }

    #[test]
    fn verdict_display() {
        assert_eq!(Verdict::Positive.to_string(), "positive");
        assert_eq!(Verdict::Negative.to_string(), "negative");
    }
}
