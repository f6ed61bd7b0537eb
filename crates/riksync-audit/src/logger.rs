//! AuditLogger - sync attempt lifecycle service
//!
//! Wraps the attempt-log half of `IStateRepository`. Every cycle opens an
//! attempt with [`AuditLogger::begin`] and closes it exactly once with
//! [`AuditLogger::complete`] or [`AuditLogger::fail`].
//!
//! Persistence errors are propagated: a cycle whose attempt cannot be
//! recorded must not proceed as if it had been.

use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};
use riksync_core::{
    domain::{AttemptStatus, ResourceType, SyncAttempt},
    ports::{AttemptFilter, IStateRepository},
};

/// High-level service over the append-only attempt log.
pub struct AuditLogger {
    state_repo: Arc<dyn IStateRepository>,
}

impl AuditLogger {
    pub fn new(state_repo: Arc<dyn IStateRepository>) -> Self {
        Self { state_repo }
    }

    // ========================================================================
    // Attempt lifecycle
    // ========================================================================

    /// Opens and persists a running attempt for `resource_type`.
    pub async fn begin(&self, resource_type: ResourceType) -> anyhow::Result<SyncAttempt> {
        let attempt = SyncAttempt::begin(resource_type);
        self.state_repo
            .insert_attempt(&attempt)
            .await
            .with_context(|| format!("Failed to record start of {} sync", resource_type))?;

        tracing::debug!(
            attempt_id = %attempt.id(),
            resource = %resource_type,
            "Sync attempt started"
        );
        Ok(attempt)
    }

    /// Marks the attempt completed with `records` processed and persists it.
    pub async fn complete(&self, attempt: &mut SyncAttempt, records: u64) -> anyhow::Result<()> {
        attempt.complete(records)?;
        self.state_repo
            .finish_attempt(attempt)
            .await
            .with_context(|| format!("Failed to record completion of attempt {}", attempt.id()))?;

        tracing::info!(
            attempt_id = %attempt.id(),
            resource = %attempt.resource_type(),
            records,
            duration_ms = attempt.duration().map(|d| d.num_milliseconds()),
            "Sync attempt completed"
        );
        Ok(())
    }

    /// Marks the attempt failed with `message` and persists it.
    pub async fn fail(
        &self,
        attempt: &mut SyncAttempt,
        message: impl Into<String>,
    ) -> anyhow::Result<()> {
        attempt.fail(message)?;
        self.state_repo
            .finish_attempt(attempt)
            .await
            .with_context(|| format!("Failed to record failure of attempt {}", attempt.id()))?;

        tracing::warn!(
            attempt_id = %attempt.id(),
            resource = %attempt.resource_type(),
            error = attempt.error_message().unwrap_or_default(),
            "Sync attempt failed"
        );
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Most recent attempts, newest first, optionally for one resource type.
    pub async fn recent(
        &self,
        resource_type: Option<ResourceType>,
        limit: u32,
    ) -> anyhow::Result<Vec<SyncAttempt>> {
        let mut filter = AttemptFilter::new().with_limit(limit);
        if let Some(r) = resource_type {
            filter = filter.with_resource_type(r);
        }
        self.state_repo.query_attempts(&filter).await
    }

    /// Attempts still marked running although they started more than
    /// `bound` ago; their invocation most likely crashed.
    pub async fn stale_running(&self, bound: Duration) -> anyhow::Result<Vec<SyncAttempt>> {
        let filter = AttemptFilter::new()
            .with_status(AttemptStatus::Running)
            .with_started_before(Utc::now() - bound);
        self.state_repo.query_attempts(&filter).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use riksync_core::domain::{AttemptId, SyncCursor};

    use super::*;

    /// Mock repository recording attempt writes
    struct MockRepo {
        inserted: Mutex<Vec<SyncAttempt>>,
        finished: Mutex<Vec<SyncAttempt>>,
        fail_writes: bool,
    }

    impl MockRepo {
        fn new() -> Self {
            Self {
                inserted: Mutex::new(Vec::new()),
                finished: Mutex::new(Vec::new()),
                fail_writes: false,
            }
        }

        fn failing() -> Self {
            Self {
                fail_writes: true,
                ..Self::new()
            }
        }
    }

    #[async_trait]
    impl IStateRepository for MockRepo {
        async fn get_cursor(&self, r: ResourceType) -> anyhow::Result<SyncCursor> {
            Ok(SyncCursor::new(r))
        }
        async fn list_cursors(&self) -> anyhow::Result<Vec<SyncCursor>> {
            Ok(vec![])
        }
        async fn save_cursor(&self, _c: &SyncCursor) -> anyhow::Result<()> {
            Ok(())
        }
        async fn insert_attempt(&self, attempt: &SyncAttempt) -> anyhow::Result<()> {
            if self.fail_writes {
                anyhow::bail!("disk full");
            }
            self.inserted.lock().unwrap().push(attempt.clone());
            Ok(())
        }
        async fn finish_attempt(&self, attempt: &SyncAttempt) -> anyhow::Result<()> {
            if self.fail_writes {
                anyhow::bail!("disk full");
            }
            self.finished.lock().unwrap().push(attempt.clone());
            Ok(())
        }
        async fn get_attempt(&self, _id: &AttemptId) -> anyhow::Result<Option<SyncAttempt>> {
            Ok(None)
        }
        async fn query_attempts(&self, filter: &AttemptFilter) -> anyhow::Result<Vec<SyncAttempt>> {
            let inserted = self.inserted.lock().unwrap();
            Ok(inserted
                .iter()
                .filter(|a| filter.resource_type.map_or(true, |r| a.resource_type() == r))
                .filter(|a| filter.status.map_or(true, |s| a.status() == s))
                .filter(|a| filter.started_before.map_or(true, |t| a.started_at() < t))
                .take(filter.limit.unwrap_or(u32::MAX) as usize)
                .cloned()
                .collect())
        }
    }

    #[tokio::test]
    async fn test_begin_persists_running_attempt() {
        let repo = Arc::new(MockRepo::new());
        let logger = AuditLogger::new(repo.clone());

        let attempt = logger.begin(ResourceType::Members).await.unwrap();

        let inserted = repo.inserted.lock().unwrap();
        assert_eq!(inserted.len(), 1);
        assert_eq!(inserted[0].id(), attempt.id());
        assert_eq!(inserted[0].status(), AttemptStatus::Running);
    }

    #[tokio::test]
    async fn test_complete_records_count() {
        let repo = Arc::new(MockRepo::new());
        let logger = AuditLogger::new(repo.clone());

        let mut attempt = logger.begin(ResourceType::Speeches).await.unwrap();
        logger.complete(&mut attempt, 100).await.unwrap();

        let finished = repo.finished.lock().unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status(), AttemptStatus::Completed);
        assert_eq!(finished[0].records_processed(), 100);
    }

    #[tokio::test]
    async fn test_fail_records_message() {
        let repo = Arc::new(MockRepo::new());
        let logger = AuditLogger::new(repo.clone());

        let mut attempt = logger.begin(ResourceType::Votes).await.unwrap();
        logger.fail(&mut attempt, "sync cancelled").await.unwrap();

        let finished = repo.finished.lock().unwrap();
        assert_eq!(finished[0].status(), AttemptStatus::Failed);
        assert_eq!(finished[0].error_message(), Some("sync cancelled"));
    }

    #[tokio::test]
    async fn test_second_transition_is_rejected() {
        let repo = Arc::new(MockRepo::new());
        let logger = AuditLogger::new(repo.clone());

        let mut attempt = logger.begin(ResourceType::Documents).await.unwrap();
        logger.complete(&mut attempt, 5).await.unwrap();
        assert!(logger.fail(&mut attempt, "late").await.is_err());
        assert_eq!(repo.finished.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_storage_errors_propagate() {
        let logger = AuditLogger::new(Arc::new(MockRepo::failing()));
        let err = logger.begin(ResourceType::Members).await.unwrap_err();
        assert!(format!("{:#}", err).contains("disk full"));
    }

    #[tokio::test]
    async fn test_recent_filters_by_resource() {
        let repo = Arc::new(MockRepo::new());
        let logger = AuditLogger::new(repo.clone());

        logger.begin(ResourceType::Members).await.unwrap();
        logger.begin(ResourceType::Votes).await.unwrap();
        logger.begin(ResourceType::Members).await.unwrap();

        assert_eq!(logger.recent(None, 10).await.unwrap().len(), 3);
        assert_eq!(
            logger
                .recent(Some(ResourceType::Members), 10)
                .await
                .unwrap()
                .len(),
            2
        );
        assert_eq!(logger.recent(None, 1).await.unwrap().len(), 1);
    }
}
