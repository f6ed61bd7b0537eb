//! riksync Sync - incremental batch synchronization engine
//!
//! Provides:
//! - Single-resource sync cycles driven by a durable cursor
//! - The strategic plan: one cycle per resource type in priority order
//! - Cooperative cancellation of in-flight cycles
//! - The inbound trigger and response contract
//!
//! ## Modules
//!
//! - [`engine`] - `SyncOrchestrator` running cycles, plans, previews and resets
//! - [`trigger`] - `SyncRequest` / `SyncResponse` wire shapes

pub mod engine;
pub mod trigger;

use riksync_api::ApiError;
use riksync_core::domain::DomainError;
use thiserror::Error;

pub use engine::{
    CycleOptions, CycleResult, PhaseOutcome, PhaseResult, PlanOptions, PlanSummary,
    PreviewResult, ResourceStatus, SyncOrchestrator,
};
pub use trigger::{ResourceSelector, SyncRequest, SyncResponse};

/// Message recorded on attempts aborted through the cancellation token
pub const CANCELLED_MESSAGE: &str = "sync cancelled";

/// Errors that can occur during a sync cycle
#[derive(Debug, Error)]
pub enum SyncError {
    /// The cancellation token fired before the cycle committed
    #[error("Sync cancelled")]
    Cancelled,

    /// The request URL could not be built (unknown resource, zero batch)
    #[error("Invalid sync request: {0}")]
    InvalidRequest(#[from] ApiError),

    /// The page fetch failed after the resilience layer gave up
    #[error("Fetch failed: {0:#}")]
    Fetch(anyhow::Error),

    /// Reading or writing the cursor or the attempt log failed
    #[error("Storage error: {0:#}")]
    Storage(anyhow::Error),

    /// A domain-level error propagated from riksync-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_keeps_context_chain() {
        let err = SyncError::Storage(
            anyhow::anyhow!("database is locked").context("Failed to load cursor"),
        );
        assert_eq!(
            err.to_string(),
            "Storage error: Failed to load cursor: database is locked"
        );
    }

    #[test]
    fn test_api_error_converts_to_invalid_request() {
        let err: SyncError = ApiError::InvalidRequest("batch size must be positive".into()).into();
        assert!(matches!(err, SyncError::InvalidRequest(_)));
    }
}
