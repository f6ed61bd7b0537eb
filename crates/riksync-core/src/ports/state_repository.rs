//! State repository ports (driven/secondary ports)
//!
//! This module defines the interfaces for persisting sync progress
//! (cursors), the append-only attempt log, and the normalized records
//! themselves.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   and don't need domain-level classification. Every storage error is
//!   terminal for the cycle that hit it.
//! - The `AttemptFilter` struct provides a composable query mechanism
//!   for the attempt log without exposing storage details.
//! - All write operations take references to domain entities, allowing
//!   the caller to retain ownership.

use chrono::{DateTime, Utc};

use crate::domain::{
    AttemptId, AttemptStatus, NormalizedRecord, ResourceType, SyncAttempt, SyncCursor,
};

/// Filter criteria for querying sync attempts
///
/// All fields are optional; when `None`, no filtering is applied for that
/// field. Multiple filters are combined with AND logic. Results are
/// always ordered newest first.
///
/// # Example
///
/// ```
/// use riksync_core::domain::{AttemptStatus, ResourceType};
/// use riksync_core::ports::AttemptFilter;
///
/// let filter = AttemptFilter::new()
///     .with_resource_type(ResourceType::Speeches)
///     .with_status(AttemptStatus::Failed)
///     .with_limit(20);
/// assert_eq!(filter.limit, Some(20));
/// ```
#[derive(Debug, Clone, Default)]
pub struct AttemptFilter {
    /// Filter by resource type
    pub resource_type: Option<ResourceType>,
    /// Filter by attempt status
    pub status: Option<AttemptStatus>,
    /// Only attempts started before this timestamp
    pub started_before: Option<DateTime<Utc>>,
    /// Maximum number of attempts returned
    pub limit: Option<u32>,
}

impl AttemptFilter {
    /// Creates a new empty filter (matches all attempts)
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = Some(resource_type);
        self
    }

    pub fn with_status(mut self, status: AttemptStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_started_before(mut self, started_before: DateTime<Utc>) -> Self {
        self.started_before = Some(started_before);
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Port for the durable sync cursor and the attempt log
#[async_trait::async_trait]
pub trait IStateRepository: Send + Sync {
    // --- Cursors ---

    /// Loads the cursor of a resource type.
    ///
    /// Cursor rows are created at initialization, so a missing row is an
    /// error rather than an empty result.
    async fn get_cursor(&self, resource_type: ResourceType) -> anyhow::Result<SyncCursor>;

    /// Loads every cursor, ordered by resource type name
    async fn list_cursors(&self) -> anyhow::Result<Vec<SyncCursor>>;

    /// Writes a cursor back in place
    async fn save_cursor(&self, cursor: &SyncCursor) -> anyhow::Result<()>;

    // --- Attempt log ---

    /// Appends a new (running) attempt
    async fn insert_attempt(&self, attempt: &SyncAttempt) -> anyhow::Result<()>;

    /// Persists the terminal transition of an attempt.
    ///
    /// Only a stored attempt that is still running may be finished; any
    /// other case is an error.
    async fn finish_attempt(&self, attempt: &SyncAttempt) -> anyhow::Result<()>;

    /// Retrieves an attempt by ID
    async fn get_attempt(&self, id: &AttemptId) -> anyhow::Result<Option<SyncAttempt>>;

    /// Queries the attempt log
    async fn query_attempts(&self, filter: &AttemptFilter) -> anyhow::Result<Vec<SyncAttempt>>;
}

/// Port for idempotent storage of normalized records
#[async_trait::async_trait]
pub trait IRecordStore: Send + Sync {
    /// Inserts or updates a record by its natural key
    async fn upsert_record(&self, record: &NormalizedRecord) -> anyhow::Result<()>;

    /// Number of stored records of a resource type
    async fn count_records(&self, resource_type: ResourceType) -> anyhow::Result<u64>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attempt_filter_builder() {
        let now = Utc::now();
        let filter = AttemptFilter::new()
            .with_resource_type(ResourceType::Votes)
            .with_status(AttemptStatus::Running)
            .with_started_before(now)
            .with_limit(5);

        assert_eq!(filter.resource_type, Some(ResourceType::Votes));
        assert_eq!(filter.status, Some(AttemptStatus::Running));
        assert_eq!(filter.started_before, Some(now));
        assert_eq!(filter.limit, Some(5));
    }

    #[test]
    fn test_attempt_filter_default_matches_all() {
        let filter = AttemptFilter::default();
        assert!(filter.resource_type.is_none());
        assert!(filter.status.is_none());
        assert!(filter.started_before.is_none());
        assert!(filter.limit.is_none());
    }
}
