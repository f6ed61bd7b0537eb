//! Incremental batch synchronization engine
//!
//! The [`SyncOrchestrator`] drives one resource type at a time through a
//! fetch-map-upsert cycle, using the durable [`SyncCursor`] as its only
//! source of pagination state.
//!
//! ## Cycle Flow
//!
//! 1. **Cursor**: load it; a complete cursor means there is nothing to do
//! 2. **Batch size**: pinned by the caller or computed adaptively
//! 3. **Fetch**: build the page URL and fetch it through the API port
//! 4. **Store**: map every item and upsert it by natural key
//! 5. **Bookkeeping**: advance and save the cursor, close the attempt
//!
//! A failure in steps 3 or 4 closes the attempt as failed and records the
//! error on the cursor without moving its offset. Cancellation closes the
//! attempt as failed and leaves the cursor untouched.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use riksync_api::batch_size::{AdaptiveBatchSizer, BatchLimits};
use riksync_api::mapper::{extract_items, map_item};
use riksync_api::url_builder::UrlBuilder;
use riksync_api::ApiError;
use riksync_audit::AuditLogger;
use riksync_core::config::Config;
use riksync_core::domain::{AttemptId, ResourceType, SyncAttempt, SyncCursor};
use riksync_core::ports::{IOpenDataApi, IRecordStore, IStateRepository};

use crate::{SyncError, CANCELLED_MESSAGE};

// ============================================================================
// Options and results
// ============================================================================

/// Caller-controlled parameters of a single cycle
#[derive(Debug, Clone, Default)]
pub struct CycleOptions {
    /// Extra query filters; date-range keys replace their placeholder
    pub filters: BTreeMap<String, String>,
    /// Pinned batch size, bypassing adaptive sizing
    pub batch_size: Option<u32>,
}

/// Outcome of one cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CycleResult {
    pub resource_type: ResourceType,
    /// Records upserted during this cycle
    pub records_processed: u64,
    /// Batch size requested, `None` when the cycle did no work
    pub batch_size: Option<u32>,
    /// Cursor offset after the cycle
    pub offset: u64,
    pub total_fetched: u64,
    pub is_complete: bool,
    /// Attempt row written for this cycle, `None` when the cycle did no work
    pub attempt_id: Option<AttemptId>,
}

impl CycleResult {
    fn from_cursor(
        cursor: &SyncCursor,
        records_processed: u64,
        batch_size: Option<u32>,
        attempt: Option<&SyncAttempt>,
    ) -> Self {
        Self {
            resource_type: cursor.resource_type(),
            records_processed,
            batch_size,
            offset: cursor.offset(),
            total_fetched: cursor.total_fetched(),
            is_complete: cursor.is_complete(),
            attempt_id: attempt.map(|a| *a.id()),
        }
    }
}

/// Parameters applied to every phase of a strategic plan
#[derive(Debug, Clone, Default)]
pub struct PlanOptions {
    pub filters: BTreeMap<String, String>,
    pub batch_size: Option<u32>,
}

/// What happened to one resource type during a strategic plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PhaseOutcome {
    /// The cursor was already complete; no cycle ran
    Skipped,
    #[serde(rename_all = "camelCase")]
    Completed {
        records_processed: u64,
        is_complete: bool,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PhaseResult {
    pub resource_type: ResourceType,
    #[serde(flatten)]
    pub outcome: PhaseOutcome,
}

/// Aggregated result of a strategic plan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSummary {
    pub total_processed: u64,
    /// Phases in execution order
    pub phases: Vec<PhaseResult>,
    /// Whether cancellation stopped the plan before every phase ran
    pub cancelled: bool,
}

impl PlanSummary {
    pub fn has_failures(&self) -> bool {
        self.phases
            .iter()
            .any(|p| matches!(p.outcome, PhaseOutcome::Failed { .. }))
    }

    /// Failed phase messages joined as `"<type>: <error>; ..."`
    pub fn failure_message(&self) -> Option<String> {
        let failures: Vec<String> = self
            .phases
            .iter()
            .filter_map(|p| match &p.outcome {
                PhaseOutcome::Failed { error } => Some(format!("{}: {}", p.resource_type, error)),
                _ => None,
            })
            .collect();
        (!failures.is_empty()).then(|| failures.join("; "))
    }

    fn push(&mut self, resource_type: ResourceType, outcome: PhaseOutcome) {
        self.phases.push(PhaseResult {
            resource_type,
            outcome,
        });
    }
}

/// The request a cycle would send, computed without fetching
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResult {
    pub resource_type: ResourceType,
    pub url: String,
    pub offset: u64,
    pub batch_size: u32,
    pub is_complete: bool,
}

/// Cursor and stored record count of one resource type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceStatus {
    pub cursor: SyncCursor,
    pub record_count: u64,
}

/// Result of the fetch-map-upsert step
enum Batch {
    Empty { latency: Duration },
    Stored { processed: u64, latency: Duration },
}

// ============================================================================
// SyncOrchestrator
// ============================================================================

/// Incremental batch synchronization engine
///
/// ## Dependencies
///
/// - `api`: paged reads from the open-data API (resilience included)
/// - `state`: sync cursors and the attempt log
/// - `records`: idempotent storage of normalized records
pub struct SyncOrchestrator {
    config: Config,
    api: Arc<dyn IOpenDataApi>,
    state: Arc<dyn IStateRepository>,
    records: Arc<dyn IRecordStore>,
    audit: AuditLogger,
    urls: UrlBuilder,
    sizer: AdaptiveBatchSizer,
}

impl SyncOrchestrator {
    /// Creates an orchestrator over an immutable configuration.
    ///
    /// Fails when the configured base URL or endpoint table is unusable.
    pub fn new(
        config: Config,
        api: Arc<dyn IOpenDataApi>,
        state: Arc<dyn IStateRepository>,
        records: Arc<dyn IRecordStore>,
    ) -> Result<Self, SyncError> {
        let urls = UrlBuilder::new(&config.api.base_url, &config.resources)?;
        let audit = AuditLogger::new(Arc::clone(&state));
        Ok(Self {
            config,
            api,
            state,
            records,
            audit,
            urls,
            sizer: AdaptiveBatchSizer::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn audit(&self) -> &AuditLogger {
        &self.audit
    }

    // ========================================================================
    // Single cycle
    // ========================================================================

    /// Runs one fetch-map-upsert cycle for `resource_type`.
    ///
    /// A complete cursor returns a zero-work result without any network
    /// call or attempt row; resuming it requires [`SyncOrchestrator::reset`].
    ///
    /// # Errors
    ///
    /// - [`SyncError::Cancelled`] when `cancel` fires before the cursor is
    ///   committed; the cursor is left as it was
    /// - [`SyncError::Fetch`] / [`SyncError::InvalidRequest`] when the page
    ///   could not be obtained; the failure is recorded on the cursor
    /// - [`SyncError::Storage`] when the cursor or attempt log is unusable
    #[tracing::instrument(skip(self, options, cancel), fields(resource = %resource_type))]
    pub async fn run_cycle(
        &self,
        resource_type: ResourceType,
        options: &CycleOptions,
        cancel: &CancellationToken,
    ) -> Result<CycleResult, SyncError> {
        if cancel.is_cancelled() {
            return Err(SyncError::Cancelled);
        }

        let mut cursor = self.load_cursor(resource_type).await?;
        if cursor.is_complete() {
            debug!("Cursor complete, nothing to fetch");
            return Ok(CycleResult::from_cursor(&cursor, 0, None, None));
        }

        let batch_size = self.batch_size_for(resource_type, options.batch_size)?;
        let mut attempt = self
            .audit
            .begin(resource_type)
            .await
            .map_err(SyncError::Storage)?;

        info!(
            offset = cursor.offset(),
            batch_size,
            attempt_id = %attempt.id(),
            "Starting sync cycle"
        );

        let batch = self
            .fetch_batch(resource_type, &cursor, &options.filters, batch_size, cancel)
            .await;

        match batch {
            Ok(Batch::Empty { latency }) => {
                self.sizer.record_success(resource_type, latency);
                cursor.mark_exhausted(Utc::now());
                self.commit(&cursor, &mut attempt, 0).await?;
                info!(offset = cursor.offset(), "Empty page, resource exhausted");
                Ok(CycleResult::from_cursor(&cursor, 0, Some(batch_size), Some(&attempt)))
            }
            Ok(Batch::Stored { processed, latency }) => {
                self.sizer.record_success(resource_type, latency);
                cursor.record_success(processed, u64::from(batch_size), Utc::now());
                self.commit(&cursor, &mut attempt, processed).await?;
                info!(
                    records = processed,
                    offset = cursor.offset(),
                    is_complete = cursor.is_complete(),
                    latency_ms = latency.as_millis() as u64,
                    "Sync cycle completed"
                );
                Ok(CycleResult::from_cursor(
                    &cursor,
                    processed,
                    Some(batch_size),
                    Some(&attempt),
                ))
            }
            Err(SyncError::Cancelled) => {
                warn!("Sync cycle cancelled");
                self.audit
                    .fail(&mut attempt, CANCELLED_MESSAGE)
                    .await
                    .map_err(SyncError::Storage)?;
                Err(SyncError::Cancelled)
            }
            Err(err) => {
                let message = err.to_string();
                warn!(error = %message, "Sync cycle failed");
                self.sizer.record_error(resource_type);
                self.audit
                    .fail(&mut attempt, message.as_str())
                    .await
                    .map_err(SyncError::Storage)?;
                cursor.record_failure(message);
                self.save_cursor(&cursor).await?;
                Err(err)
            }
        }
    }

    /// Steps 3 and 4: build the URL, fetch the page, map and upsert.
    ///
    /// Only the fetch is raced against `cancel`; between upserts the token
    /// is polled.
    async fn fetch_batch(
        &self,
        resource_type: ResourceType,
        cursor: &SyncCursor,
        filters: &BTreeMap<String, String>,
        batch_size: u32,
        cancel: &CancellationToken,
    ) -> Result<Batch, SyncError> {
        let url = self
            .urls
            .build_url(resource_type, filters, cursor.offset(), batch_size)?;

        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            page = self.api.fetch_page(resource_type, url.as_str()) => {
                page.map_err(SyncError::Fetch)?
            }
        };
        let latency = page.latency;

        let Some(payload) = page.payload else {
            return Ok(Batch::Empty { latency });
        };
        let items = extract_items(resource_type, &payload);
        if items.is_empty() {
            return Ok(Batch::Empty { latency });
        }

        let fetched = items.len();
        let mut processed = 0u64;
        for item in items {
            if cancel.is_cancelled() {
                return Err(SyncError::Cancelled);
            }

            let record = match map_item(resource_type, item) {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "Skipping malformed item");
                    continue;
                }
            };

            match self.records.upsert_record(&record).await {
                Ok(()) => processed += 1,
                Err(e) => warn!(
                    key = %record.natural_key(),
                    error = %format!("{e:#}"),
                    "Skipping record that failed to upsert"
                ),
            }
        }

        debug!(fetched, processed, "Batch stored");
        Ok(Batch::Stored { processed, latency })
    }

    /// Saves the advanced cursor, then closes the attempt as completed.
    async fn commit(
        &self,
        cursor: &SyncCursor,
        attempt: &mut SyncAttempt,
        processed: u64,
    ) -> Result<(), SyncError> {
        if let Err(err) = self.save_cursor(cursor).await {
            if let Err(e) = self.audit.fail(attempt, err.to_string()).await {
                warn!(error = %format!("{e:#}"), "Failed to close attempt after cursor write error");
            }
            return Err(err);
        }
        self.audit
            .complete(attempt, processed)
            .await
            .map_err(SyncError::Storage)
    }

    fn batch_size_for(
        &self,
        resource_type: ResourceType,
        pinned: Option<u32>,
    ) -> Result<u32, SyncError> {
        if let Some(size) = pinned {
            return Ok(size.max(1));
        }
        let resource = self
            .config
            .resources
            .get(resource_type)
            .ok_or(ApiError::UnknownResource(resource_type))?;
        let limits = BatchLimits::new(resource, &self.config.batch);
        Ok(self.sizer.next_batch_size(resource_type, &limits))
    }

    async fn load_cursor(&self, resource_type: ResourceType) -> Result<SyncCursor, SyncError> {
        self.state
            .get_cursor(resource_type)
            .await
            .map_err(SyncError::Storage)
    }

    async fn save_cursor(&self, cursor: &SyncCursor) -> Result<(), SyncError> {
        self.state
            .save_cursor(cursor)
            .await
            .map_err(SyncError::Storage)
    }

    // ========================================================================
    // Strategic plan
    // ========================================================================

    /// Runs one cycle per resource type in ascending priority order.
    ///
    /// Complete resource types are skipped. A failing phase is recorded and
    /// the plan moves on. The configured inter-phase delay separates two
    /// executed phases. Cancellation stops the plan.
    #[tracing::instrument(skip(self, options, cancel))]
    pub async fn run_strategic_plan(
        &self,
        options: &PlanOptions,
        cancel: &CancellationToken,
    ) -> PlanSummary {
        let mut summary = PlanSummary::default();
        let delay = self.config.plan.inter_phase_delay();
        let cycle_options = CycleOptions {
            filters: options.filters.clone(),
            batch_size: options.batch_size,
        };
        let mut executed_any = false;

        for resource_type in self.config.resources.in_priority_order() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            match self.load_cursor(resource_type).await {
                Ok(cursor) if cursor.is_complete() => {
                    debug!(resource = %resource_type, "Phase skipped, cursor complete");
                    summary.push(resource_type, PhaseOutcome::Skipped);
                    continue;
                }
                Ok(_) => {}
                Err(err) => {
                    summary.push(
                        resource_type,
                        PhaseOutcome::Failed {
                            error: err.to_string(),
                        },
                    );
                    continue;
                }
            }

            if executed_any && !delay.is_zero() {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        summary.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            executed_any = true;

            match self.run_cycle(resource_type, &cycle_options, cancel).await {
                Ok(result) => {
                    summary.total_processed += result.records_processed;
                    summary.push(
                        resource_type,
                        PhaseOutcome::Completed {
                            records_processed: result.records_processed,
                            is_complete: result.is_complete,
                        },
                    );
                }
                Err(SyncError::Cancelled) => {
                    summary.push(
                        resource_type,
                        PhaseOutcome::Failed {
                            error: CANCELLED_MESSAGE.to_string(),
                        },
                    );
                    summary.cancelled = true;
                    break;
                }
                Err(err) => {
                    summary.push(
                        resource_type,
                        PhaseOutcome::Failed {
                            error: err.to_string(),
                        },
                    );
                }
            }
        }

        info!(
            total_processed = summary.total_processed,
            phases = summary.phases.len(),
            failed = summary.has_failures(),
            cancelled = summary.cancelled,
            "Strategic plan finished"
        );
        summary
    }

    // ========================================================================
    // Preview, reset, status
    // ========================================================================

    /// Computes the next request for `resource_type` without fetching it
    /// and without touching any state.
    pub async fn preview(
        &self,
        resource_type: ResourceType,
        options: &CycleOptions,
    ) -> Result<PreviewResult, SyncError> {
        let cursor = self.load_cursor(resource_type).await?;
        let batch_size = self.batch_size_for(resource_type, options.batch_size)?;
        let url = self
            .urls
            .build_url(resource_type, &options.filters, cursor.offset(), batch_size)?;

        Ok(PreviewResult {
            resource_type,
            url: url.to_string(),
            offset: cursor.offset(),
            batch_size,
            is_complete: cursor.is_complete(),
        })
    }

    /// Rewinds the cursor of `resource_type` to the start
    #[tracing::instrument(skip(self))]
    pub async fn reset(&self, resource_type: ResourceType) -> Result<SyncCursor, SyncError> {
        let mut cursor = self.load_cursor(resource_type).await?;
        cursor.reset();
        self.save_cursor(&cursor).await?;
        info!(
            resource = %resource_type,
            total_fetched = cursor.total_fetched(),
            "Cursor reset"
        );
        Ok(cursor)
    }

    /// Every cursor with the number of records stored for its type
    pub async fn status(&self) -> Result<Vec<ResourceStatus>, SyncError> {
        let cursors = self.state.list_cursors().await.map_err(SyncError::Storage)?;
        let mut statuses = Vec::with_capacity(cursors.len());
        for cursor in cursors {
            let record_count = self
                .records
                .count_records(cursor.resource_type())
                .await
                .map_err(SyncError::Storage)?;
            statuses.push(ResourceStatus {
                cursor,
                record_count,
            });
        }
        Ok(statuses)
    }
}
