//! SyncCursor domain entity
//!
//! The cursor is the durable pagination and progress marker for one
//! resource type. It is read at the start of every cycle and written back
//! once the cycle has committed its records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::resource::ResourceType;

/// Durable progress marker for one resource type
///
/// `offset` only moves forward through [`SyncCursor::record_success`] and
/// only moves back through [`SyncCursor::reset`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncCursor {
    resource_type: ResourceType,
    offset: u64,
    total_fetched: u64,
    is_complete: bool,
    last_sync_timestamp: Option<DateTime<Utc>>,
    last_error: Option<String>,
    retry_count: u32,
}

impl SyncCursor {
    /// Creates a fresh cursor at offset zero
    pub fn new(resource_type: ResourceType) -> Self {
        Self {
            resource_type,
            offset: 0,
            total_fetched: 0,
            is_complete: false,
            last_sync_timestamp: None,
            last_error: None,
            retry_count: 0,
        }
    }

    /// Reconstitutes a cursor from storage
    pub fn from_parts(
        resource_type: ResourceType,
        offset: u64,
        total_fetched: u64,
        is_complete: bool,
        last_sync_timestamp: Option<DateTime<Utc>>,
        last_error: Option<String>,
        retry_count: u32,
    ) -> Self {
        Self {
            resource_type,
            offset,
            total_fetched,
            is_complete,
            last_sync_timestamp,
            last_error,
            retry_count,
        }
    }

    // --- Getters ---

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    /// Last position fully consumed
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn total_fetched(&self) -> u64 {
        self.total_fetched
    }

    pub fn is_complete(&self) -> bool {
        self.is_complete
    }

    pub fn last_sync_timestamp(&self) -> Option<DateTime<Utc>> {
        self.last_sync_timestamp
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    // --- Transitions ---

    /// Applies a committed cycle.
    ///
    /// The cursor is complete when the page came back short: exactly
    /// `requested_batch` records means there may be more.
    pub fn record_success(&mut self, processed: u64, requested_batch: u64, now: DateTime<Utc>) {
        self.offset += processed;
        self.total_fetched += processed;
        self.is_complete = processed < requested_batch;
        self.retry_count = 0;
        self.last_error = None;
        self.last_sync_timestamp = Some(now);
    }

    /// Marks the resource as exhausted after an empty page.
    ///
    /// Offset and totals are left where they were.
    pub fn mark_exhausted(&mut self, now: DateTime<Utc>) {
        self.is_complete = true;
        self.retry_count = 0;
        self.last_error = None;
        self.last_sync_timestamp = Some(now);
    }

    /// Records a failed cycle for observability
    pub fn record_failure(&mut self, message: impl Into<String>) {
        self.last_error = Some(message.into());
        self.retry_count = self.retry_count.saturating_add(1);
    }

    /// Rewinds the cursor so the resource is fetched again from the start.
    ///
    /// `total_fetched` is a lifetime counter and survives the reset.
    pub fn reset(&mut self) {
        self.offset = 0;
        self.is_complete = false;
        self.retry_count = 0;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_cursor_is_empty() {
        let cursor = SyncCursor::new(ResourceType::Members);
        assert_eq!(cursor.offset(), 0);
        assert_eq!(cursor.total_fetched(), 0);
        assert!(!cursor.is_complete());
        assert!(cursor.last_sync_timestamp().is_none());
        assert!(cursor.last_error().is_none());
        assert_eq!(cursor.retry_count(), 0);
    }

    #[test]
    fn test_full_page_is_not_complete() {
        let mut cursor = SyncCursor::new(ResourceType::Speeches);
        cursor.record_success(100, 100, Utc::now());
        assert_eq!(cursor.offset(), 100);
        assert_eq!(cursor.total_fetched(), 100);
        assert!(!cursor.is_complete());
    }

    #[test]
    fn test_short_page_is_complete() {
        let mut cursor = SyncCursor::new(ResourceType::Speeches);
        cursor.record_success(100, 100, Utc::now());
        cursor.record_success(99, 100, Utc::now());
        assert_eq!(cursor.offset(), 199);
        assert!(cursor.is_complete());
    }

    #[test]
    fn test_success_clears_failure_state() {
        let mut cursor = SyncCursor::new(ResourceType::Votes);
        cursor.record_failure("timeout");
        cursor.record_failure("timeout again");
        assert_eq!(cursor.retry_count(), 2);
        assert_eq!(cursor.last_error(), Some("timeout again"));

        cursor.record_success(10, 50, Utc::now());
        assert_eq!(cursor.retry_count(), 0);
        assert!(cursor.last_error().is_none());
    }

    #[test]
    fn test_failure_does_not_move_offset() {
        let mut cursor = SyncCursor::new(ResourceType::Votes);
        cursor.record_success(50, 50, Utc::now());
        cursor.record_failure("server error");
        assert_eq!(cursor.offset(), 50);
        assert_eq!(cursor.total_fetched(), 50);
    }

    #[test]
    fn test_mark_exhausted_keeps_offset() {
        let mut cursor = SyncCursor::new(ResourceType::Members);
        cursor.record_success(200, 200, Utc::now());
        cursor.mark_exhausted(Utc::now());
        assert!(cursor.is_complete());
        assert_eq!(cursor.offset(), 200);
        assert_eq!(cursor.total_fetched(), 200);
    }

    #[test]
    fn test_reset_rewinds_but_keeps_total() {
        let mut cursor = SyncCursor::new(ResourceType::Documents);
        cursor.record_success(30, 100, Utc::now());
        cursor.record_failure("boom");
        cursor.reset();
        assert_eq!(cursor.offset(), 0);
        assert!(!cursor.is_complete());
        assert_eq!(cursor.retry_count(), 0);
        assert!(cursor.last_error().is_none());
        assert_eq!(cursor.total_fetched(), 30);
    }
}
