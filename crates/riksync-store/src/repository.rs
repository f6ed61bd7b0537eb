//! SQLite implementation of the storage ports
//!
//! Provides the concrete SQLite-based implementation of
//! `IStateRepository` and `IRecordStore` from riksync-core.
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy                                     |
//! |-----------------|----------|----------------------------------------------|
//! | ResourceType    | TEXT     | `as_str()` / `FromStr`                       |
//! | AttemptId       | TEXT     | UUID string via `to_string()` / `FromStr`    |
//! | AttemptStatus   | TEXT     | `as_str()` / `FromStr`                       |
//! | DateTime<Utc>   | TEXT     | RFC 3339, UTC, microsecond precision         |
//! | u64 / u32       | INTEGER  | stored as i64, negative values are rejected  |
//! | bool            | INTEGER  | 0 / 1                                        |
//!
//! Normalized records are upserted by natural key with
//! `INSERT ... ON CONFLICT DO UPDATE`: the payload columns and `updated_at`
//! are overwritten, `first_seen_at` keeps the time of the first insert.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use riksync_core::domain::{
    AttemptId, AttemptStatus, Document, Member, NormalizedRecord, ResourceType, Speech,
    SyncAttempt, SyncCursor, VoteRecord,
};
use riksync_core::ports::{AttemptFilter, IRecordStore, IStateRepository};

use crate::StoreError;

/// SQLite-backed sync state and record store
///
/// Cheap to clone: clones share the same connection pool.
#[derive(Clone)]
pub struct SqliteStateRepository {
    pool: SqlitePool,
}

impl SqliteStateRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns `(first_seen_at, updated_at)` of the stored row sharing
    /// `record`'s natural key.
    pub async fn record_timestamps(
        &self,
        record: &NormalizedRecord,
    ) -> anyhow::Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let query = match record {
            NormalizedRecord::Member(m) => {
                sqlx::query("SELECT first_seen_at, updated_at FROM members WHERE member_id = ?")
                    .bind(m.member_id.as_str())
            }
            NormalizedRecord::Document(d) => {
                sqlx::query("SELECT first_seen_at, updated_at FROM documents WHERE document_id = ?")
                    .bind(d.document_id.as_str())
            }
            NormalizedRecord::Speech(sp) => sqlx::query(
                "SELECT first_seen_at, updated_at FROM speeches \
                 WHERE document_id = ? AND speech_number = ?",
            )
            .bind(sp.document_id.as_str())
            .bind(sp.speech_number),
            NormalizedRecord::Vote(v) => sqlx::query(
                "SELECT first_seen_at, updated_at FROM votes WHERE vote_id = ? AND member_id = ?",
            )
            .bind(v.vote_id.as_str())
            .bind(v.member_id.as_str()),
        };

        match query.fetch_optional(&self.pool).await? {
            Some(row) => {
                let first_seen: String = row.get("first_seen_at");
                let updated: String = row.get("updated_at");
                Ok(Some((parse_datetime(&first_seen)?, parse_datetime(&updated)?)))
            }
            None => Ok(None),
        }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Fixed-width UTC timestamps, so text order matches time order
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a DateTime<Utc> from an RFC 3339 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::CorruptRow(format!("Failed to parse datetime '{}': {}", s, e)))
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    match s {
        Some(ref val) if !val.is_empty() => parse_datetime(val).map(Some),
        _ => Ok(None),
    }
}

fn to_u64(value: i64, column: &str) -> Result<u64, StoreError> {
    u64::try_from(value)
        .map_err(|_| StoreError::CorruptRow(format!("negative value {} in {}", value, column)))
}

fn to_i64(value: u64, column: &str) -> Result<i64, StoreError> {
    i64::try_from(value)
        .map_err(|_| StoreError::QueryFailed(format!("value {} too large for {}", value, column)))
}

fn parse_resource_type(s: &str) -> Result<ResourceType, StoreError> {
    ResourceType::from_str(s).map_err(|e| StoreError::CorruptRow(e.to_string()))
}

fn table_for(resource_type: ResourceType) -> &'static str {
    match resource_type {
        ResourceType::Members => "members",
        ResourceType::Speeches => "speeches",
        ResourceType::Documents => "documents",
        ResourceType::Votes => "votes",
    }
}

// ============================================================================
// Row mapping functions
// ============================================================================

fn cursor_from_row(row: &SqliteRow) -> Result<SyncCursor, StoreError> {
    let resource_type: String = row.get("resource_type");
    let offset: i64 = row.get("cursor_offset");
    let total_fetched: i64 = row.get("total_fetched");
    let is_complete: i64 = row.get("is_complete");
    let last_sync: Option<String> = row.get("last_sync_timestamp");
    let last_error: Option<String> = row.get("last_error");
    let retry_count: i64 = row.get("retry_count");

    Ok(SyncCursor::from_parts(
        parse_resource_type(&resource_type)?,
        to_u64(offset, "cursor_offset")?,
        to_u64(total_fetched, "total_fetched")?,
        is_complete != 0,
        parse_optional_datetime(last_sync)?,
        last_error,
        u32::try_from(retry_count)
            .map_err(|_| StoreError::CorruptRow(format!("invalid retry_count {}", retry_count)))?,
    ))
}

fn attempt_from_row(row: &SqliteRow) -> Result<SyncAttempt, StoreError> {
    let id: String = row.get("id");
    let resource_type: String = row.get("resource_type");
    let status: String = row.get("status");
    let started_at: String = row.get("started_at");
    let completed_at: Option<String> = row.get("completed_at");
    let records_processed: i64 = row.get("records_processed");
    let error_message: Option<String> = row.get("error_message");

    Ok(SyncAttempt::from_parts(
        AttemptId::from_str(&id).map_err(|e| StoreError::CorruptRow(e.to_string()))?,
        parse_resource_type(&resource_type)?,
        AttemptStatus::from_str(&status).map_err(|e| StoreError::CorruptRow(e.to_string()))?,
        parse_datetime(&started_at)?,
        parse_optional_datetime(completed_at)?,
        to_u64(records_processed, "records_processed")?,
        error_message,
    ))
}

// ============================================================================
// Record upserts
// ============================================================================

impl SqliteStateRepository {
    async fn upsert_member(&self, m: &Member, now: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO members \
             (member_id, first_name, last_name, sort_name, party, constituency, status, \
              birth_year, gender, image_url, first_seen_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(member_id) DO UPDATE SET \
              first_name = excluded.first_name, last_name = excluded.last_name, \
              sort_name = excluded.sort_name, party = excluded.party, \
              constituency = excluded.constituency, status = excluded.status, \
              birth_year = excluded.birth_year, gender = excluded.gender, \
              image_url = excluded.image_url, updated_at = excluded.updated_at",
        )
        .bind(&m.member_id)
        .bind(&m.first_name)
        .bind(&m.last_name)
        .bind(&m.sort_name)
        .bind(&m.party)
        .bind(&m.constituency)
        .bind(&m.status)
        .bind(m.birth_year)
        .bind(&m.gender)
        .bind(&m.image_url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_speech(&self, s: &Speech, now: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO speeches \
             (document_id, speech_number, speech_id, speaker, party, member_id, speech_date, \
              section_heading, session_year, url, first_seen_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(document_id, speech_number) DO UPDATE SET \
              speech_id = excluded.speech_id, speaker = excluded.speaker, \
              party = excluded.party, member_id = excluded.member_id, \
              speech_date = excluded.speech_date, section_heading = excluded.section_heading, \
              session_year = excluded.session_year, url = excluded.url, \
              updated_at = excluded.updated_at",
        )
        .bind(&s.document_id)
        .bind(s.speech_number)
        .bind(&s.speech_id)
        .bind(&s.speaker)
        .bind(&s.party)
        .bind(&s.member_id)
        .bind(&s.speech_date)
        .bind(&s.section_heading)
        .bind(&s.session_year)
        .bind(&s.url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_document(&self, d: &Document, now: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO documents \
             (document_id, session_year, designation, document_type, subtype, title, subtitle, \
              date, organ, published_at, url, first_seen_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(document_id) DO UPDATE SET \
              session_year = excluded.session_year, designation = excluded.designation, \
              document_type = excluded.document_type, subtype = excluded.subtype, \
              title = excluded.title, subtitle = excluded.subtitle, date = excluded.date, \
              organ = excluded.organ, published_at = excluded.published_at, \
              url = excluded.url, updated_at = excluded.updated_at",
        )
        .bind(&d.document_id)
        .bind(&d.session_year)
        .bind(&d.designation)
        .bind(&d.document_type)
        .bind(&d.subtype)
        .bind(&d.title)
        .bind(&d.subtitle)
        .bind(&d.date)
        .bind(&d.organ)
        .bind(&d.published_at)
        .bind(&d.url)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_vote(&self, v: &VoteRecord, now: &str) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO votes \
             (vote_id, member_id, name, party, constituency, vote, subject, designation, \
              item_number, session_year, vote_date, first_seen_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(vote_id, member_id) DO UPDATE SET \
              name = excluded.name, party = excluded.party, \
              constituency = excluded.constituency, vote = excluded.vote, \
              subject = excluded.subject, designation = excluded.designation, \
              item_number = excluded.item_number, session_year = excluded.session_year, \
              vote_date = excluded.vote_date, updated_at = excluded.updated_at",
        )
        .bind(&v.vote_id)
        .bind(&v.member_id)
        .bind(&v.name)
        .bind(&v.party)
        .bind(&v.constituency)
        .bind(&v.vote)
        .bind(&v.subject)
        .bind(&v.designation)
        .bind(v.item_number)
        .bind(&v.session_year)
        .bind(&v.vote_date)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ============================================================================
// IStateRepository implementation
// ============================================================================

#[async_trait::async_trait]
impl IStateRepository for SqliteStateRepository {
    // --- Cursors ---

    async fn get_cursor(&self, resource_type: ResourceType) -> anyhow::Result<SyncCursor> {
        let row = sqlx::query("SELECT * FROM sync_cursors WHERE resource_type = ?")
            .bind(resource_type.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(cursor_from_row(r)?),
            None => Err(StoreError::MissingCursor(resource_type.to_string()).into()),
        }
    }

    async fn list_cursors(&self) -> anyhow::Result<Vec<SyncCursor>> {
        let rows = sqlx::query("SELECT * FROM sync_cursors ORDER BY resource_type ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut cursors = Vec::with_capacity(rows.len());
        for row in &rows {
            cursors.push(cursor_from_row(row)?);
        }
        Ok(cursors)
    }

    async fn save_cursor(&self, cursor: &SyncCursor) -> anyhow::Result<()> {
        let resource_type = cursor.resource_type();
        let result = sqlx::query(
            "UPDATE sync_cursors SET \
             cursor_offset = ?, total_fetched = ?, is_complete = ?, \
             last_sync_timestamp = ?, last_error = ?, retry_count = ? \
             WHERE resource_type = ?",
        )
        .bind(to_i64(cursor.offset(), "cursor_offset")?)
        .bind(to_i64(cursor.total_fetched(), "total_fetched")?)
        .bind(i64::from(cursor.is_complete()))
        .bind(cursor.last_sync_timestamp().map(|dt| format_datetime(&dt)))
        .bind(cursor.last_error())
        .bind(i64::from(cursor.retry_count()))
        .bind(resource_type.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::MissingCursor(resource_type.to_string()).into());
        }

        tracing::trace!(
            resource = %resource_type,
            offset = cursor.offset(),
            is_complete = cursor.is_complete(),
            "Saved sync cursor"
        );
        Ok(())
    }

    // --- Attempt log ---

    async fn insert_attempt(&self, attempt: &SyncAttempt) -> anyhow::Result<()> {
        let id = attempt.id().to_string();
        sqlx::query(
            "INSERT INTO sync_attempts \
             (id, resource_type, status, started_at, completed_at, records_processed, error_message) \
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(attempt.resource_type().as_str())
        .bind(attempt.status().as_str())
        .bind(format_datetime(&attempt.started_at()))
        .bind(attempt.completed_at().map(|dt| format_datetime(&dt)))
        .bind(to_i64(attempt.records_processed(), "records_processed")?)
        .bind(attempt.error_message())
        .execute(&self.pool)
        .await?;

        tracing::trace!(attempt_id = %id, resource = %attempt.resource_type(), "Inserted sync attempt");
        Ok(())
    }

    async fn finish_attempt(&self, attempt: &SyncAttempt) -> anyhow::Result<()> {
        let id = attempt.id().to_string();
        if !attempt.status().is_terminal() {
            return Err(StoreError::QueryFailed(format!(
                "attempt {} has no terminal status to persist",
                id
            ))
            .into());
        }

        let result = sqlx::query(
            "UPDATE sync_attempts SET \
             status = ?, completed_at = ?, records_processed = ?, error_message = ? \
             WHERE id = ? AND status = 'running'",
        )
        .bind(attempt.status().as_str())
        .bind(attempt.completed_at().map(|dt| format_datetime(&dt)))
        .bind(to_i64(attempt.records_processed(), "records_processed")?)
        .bind(attempt.error_message())
        .bind(&id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::AttemptNotRunning(id).into());
        }

        tracing::trace!(attempt_id = %id, status = %attempt.status(), "Finished sync attempt");
        Ok(())
    }

    async fn get_attempt(&self, id: &AttemptId) -> anyhow::Result<Option<SyncAttempt>> {
        let row = sqlx::query("SELECT * FROM sync_attempts WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(attempt_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn query_attempts(&self, filter: &AttemptFilter) -> anyhow::Result<Vec<SyncAttempt>> {
        let mut sql = String::from("SELECT * FROM sync_attempts WHERE 1=1");
        let mut binds: Vec<String> = Vec::new();

        if let Some(resource_type) = filter.resource_type {
            sql.push_str(" AND resource_type = ?");
            binds.push(resource_type.as_str().to_string());
        }

        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            binds.push(status.as_str().to_string());
        }

        if let Some(ref started_before) = filter.started_before {
            sql.push_str(" AND started_at < ?");
            binds.push(format_datetime(started_before));
        }

        sql.push_str(" ORDER BY started_at DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        let mut query = sqlx::query(&sql);
        for bind in &binds {
            query = query.bind(bind);
        }

        let rows = query.fetch_all(&self.pool).await?;

        let mut attempts = Vec::with_capacity(rows.len());
        for row in &rows {
            attempts.push(attempt_from_row(row)?);
        }
        Ok(attempts)
    }
}

// ============================================================================
// IRecordStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IRecordStore for SqliteStateRepository {
    async fn upsert_record(&self, record: &NormalizedRecord) -> anyhow::Result<()> {
        let now = format_datetime(&Utc::now());
        match record {
            NormalizedRecord::Member(m) => self.upsert_member(m, &now).await?,
            NormalizedRecord::Speech(s) => self.upsert_speech(s, &now).await?,
            NormalizedRecord::Document(d) => self.upsert_document(d, &now).await?,
            NormalizedRecord::Vote(v) => self.upsert_vote(v, &now).await?,
        }

        tracing::trace!(
            resource = %record.resource_type(),
            key = %record.natural_key(),
            "Upserted record"
        );
        Ok(())
    }

    async fn count_records(&self, resource_type: ResourceType) -> anyhow::Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", table_for(resource_type));
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(to_u64(count, table_for(resource_type))?)
    }
}
