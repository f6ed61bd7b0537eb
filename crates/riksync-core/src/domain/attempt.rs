//! SyncAttempt domain entity
//!
//! One attempt is recorded per cycle invocation in the append-only audit
//! log. Unlike the cursor, attempts are history: they are never rewritten
//! once terminal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::newtypes::AttemptId;
use super::resource::ResourceType;

/// Status of a sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptStatus {
    /// Attempt is in progress (or its process crashed)
    Running,
    /// Attempt finished and committed its records
    Completed,
    /// Attempt failed; see the error message
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Running => "running",
            AttemptStatus::Completed => "completed",
            AttemptStatus::Failed => "failed",
        }
    }

    /// Returns true once the attempt reached a terminal status
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AttemptStatus::Running)
    }
}

impl std::fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AttemptStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(AttemptStatus::Running),
            "completed" => Ok(AttemptStatus::Completed),
            "failed" => Ok(AttemptStatus::Failed),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown attempt status: {other}"
            ))),
        }
    }
}

/// A single recorded sync invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAttempt {
    id: AttemptId,
    resource_type: ResourceType,
    status: AttemptStatus,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    records_processed: u64,
    error_message: Option<String>,
}

impl SyncAttempt {
    /// Starts a new running attempt
    pub fn begin(resource_type: ResourceType) -> Self {
        Self {
            id: AttemptId::new(),
            resource_type,
            status: AttemptStatus::Running,
            started_at: Utc::now(),
            completed_at: None,
            records_processed: 0,
            error_message: None,
        }
    }

    /// Reconstitutes an attempt from storage
    pub fn from_parts(
        id: AttemptId,
        resource_type: ResourceType,
        status: AttemptStatus,
        started_at: DateTime<Utc>,
        completed_at: Option<DateTime<Utc>>,
        records_processed: u64,
        error_message: Option<String>,
    ) -> Self {
        Self {
            id,
            resource_type,
            status,
            started_at,
            completed_at,
            records_processed,
            error_message,
        }
    }

    // --- Getters ---

    pub fn id(&self) -> &AttemptId {
        &self.id
    }

    pub fn resource_type(&self) -> ResourceType {
        self.resource_type
    }

    pub fn status(&self) -> AttemptStatus {
        self.status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn records_processed(&self) -> u64 {
        self.records_processed
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Wall-clock duration, once terminal
    pub fn duration(&self) -> Option<Duration> {
        self.completed_at.map(|done| done - self.started_at)
    }

    // --- Transitions ---

    /// Marks the attempt completed with the number of upserted records
    pub fn complete(&mut self, records_processed: u64) -> Result<(), DomainError> {
        self.ensure_running(AttemptStatus::Completed)?;
        self.status = AttemptStatus::Completed;
        self.records_processed = records_processed;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Marks the attempt failed with the given message
    pub fn fail(&mut self, message: impl Into<String>) -> Result<(), DomainError> {
        self.ensure_running(AttemptStatus::Failed)?;
        self.status = AttemptStatus::Failed;
        self.error_message = Some(message.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// A running attempt older than `bound` most likely belongs to a
    /// crashed invocation.
    pub fn is_stale(&self, now: DateTime<Utc>, bound: Duration) -> bool {
        self.status == AttemptStatus::Running && now - self.started_at > bound
    }

    fn ensure_running(&self, target: AttemptStatus) -> Result<(), DomainError> {
        if self.status.is_terminal() {
            return Err(DomainError::InvalidState {
                from: self.status.to_string(),
                to: target.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_is_running() {
        let attempt = SyncAttempt::begin(ResourceType::Members);
        assert_eq!(attempt.status(), AttemptStatus::Running);
        assert!(attempt.completed_at().is_none());
        assert_eq!(attempt.records_processed(), 0);
        assert!(attempt.duration().is_none());
    }

    #[test]
    fn test_complete_sets_count_and_timestamp() {
        let mut attempt = SyncAttempt::begin(ResourceType::Votes);
        attempt.complete(42).unwrap();
        assert_eq!(attempt.status(), AttemptStatus::Completed);
        assert_eq!(attempt.records_processed(), 42);
        assert!(attempt.completed_at().is_some());
        assert!(attempt.error_message().is_none());
    }

    #[test]
    fn test_fail_sets_message() {
        let mut attempt = SyncAttempt::begin(ResourceType::Speeches);
        attempt.fail("HTTP 404").unwrap();
        assert_eq!(attempt.status(), AttemptStatus::Failed);
        assert_eq!(attempt.error_message(), Some("HTTP 404"));
    }

    #[test]
    fn test_only_one_terminal_transition() {
        let mut attempt = SyncAttempt::begin(ResourceType::Documents);
        attempt.complete(1).unwrap();

        let err = attempt.fail("late failure").unwrap_err();
        assert_eq!(
            err,
            DomainError::InvalidState {
                from: "completed".into(),
                to: "failed".into(),
            }
        );
        assert!(attempt.complete(2).is_err());
        assert_eq!(attempt.records_processed(), 1);
    }

    #[test]
    fn test_is_stale() {
        let started = Utc::now() - Duration::hours(2);
        let attempt = SyncAttempt::from_parts(
            AttemptId::new(),
            ResourceType::Members,
            AttemptStatus::Running,
            started,
            None,
            0,
            None,
        );
        assert!(attempt.is_stale(Utc::now(), Duration::minutes(30)));
        assert!(!attempt.is_stale(Utc::now(), Duration::hours(3)));

        let mut finished = attempt.clone();
        finished.complete(0).unwrap();
        assert!(!finished.is_stale(Utc::now(), Duration::minutes(30)));
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            AttemptStatus::Running,
            AttemptStatus::Completed,
            AttemptStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<AttemptStatus>().unwrap(), status);
        }
        assert!("cancelled".parse::<AttemptStatus>().is_err());
    }
}
