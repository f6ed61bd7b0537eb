//! Adaptive batch sizing
//!
//! The page size requested for a resource grows while the upstream answers
//! quickly and shrinks when it slows down or fails. The rule itself is the
//! pure [`compute_batch_size`]; [`AdaptiveBatchSizer`] keeps the per-resource
//! observations it needs.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use riksync_core::config::{BatchConfig, ResourceConfig};
use riksync_core::domain::ResourceType;
use tracing::debug;

/// Bounds and thresholds for one resource type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    pub default: u32,
    pub min: u32,
    pub max: u32,
    pub fast_latency: Duration,
    pub slow_latency: Duration,
    pub error_floor_threshold: u32,
}

impl BatchLimits {
    pub fn new(resource: &ResourceConfig, batch: &BatchConfig) -> Self {
        let min = resource.min_batch_size.max(1);
        Self {
            default: resource.default_batch_size,
            min,
            max: resource.max_batch_size.max(min),
            fast_latency: batch.fast_latency(),
            slow_latency: batch.slow_latency(),
            error_floor_threshold: batch.error_floor_threshold,
        }
    }
}

/// Computes the next batch size.
///
/// More than `error_floor_threshold` consecutive errors forces the minimum.
/// Otherwise the default is scaled by 1.5 after a fast error-free response
/// or by 0.5 after a slow one, halved once per consecutive error, and
/// clamped to `[min, max]`. Without a latency sample no scaling applies.
pub fn compute_batch_size(
    limits: &BatchLimits,
    last_latency: Option<Duration>,
    consecutive_errors: u32,
) -> u32 {
    if consecutive_errors > limits.error_floor_threshold {
        return limits.min;
    }

    let mut size = limits.default as f64;
    match last_latency {
        Some(latency) if latency < limits.fast_latency && consecutive_errors == 0 => size *= 1.5,
        Some(latency) if latency > limits.slow_latency => size *= 0.5,
        _ => {}
    }
    for _ in 0..consecutive_errors {
        size *= 0.5;
    }

    (size.floor() as u32).clamp(limits.min, limits.max)
}

#[derive(Debug, Default, Clone, Copy)]
struct ResourceStats {
    last_latency: Option<Duration>,
    consecutive_errors: u32,
}

/// Per-resource latency and error tracking for [`compute_batch_size`]
#[derive(Debug, Default)]
pub struct AdaptiveBatchSizer {
    stats: Mutex<HashMap<ResourceType, ResourceStats>>,
}

impl AdaptiveBatchSizer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ResourceType, ResourceStats>> {
        self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Batch size to request next for `resource_type`
    pub fn next_batch_size(&self, resource_type: ResourceType, limits: &BatchLimits) -> u32 {
        let stats = self.lock().get(&resource_type).copied().unwrap_or_default();
        let size = compute_batch_size(limits, stats.last_latency, stats.consecutive_errors);
        debug!(
            resource = %resource_type,
            batch_size = size,
            consecutive_errors = stats.consecutive_errors,
            last_latency_ms = stats.last_latency.map(|d| d.as_millis() as u64),
            "Computed adaptive batch size"
        );
        size
    }

    pub fn record_success(&self, resource_type: ResourceType, latency: Duration) {
        let mut stats = self.lock();
        let entry = stats.entry(resource_type).or_default();
        entry.last_latency = Some(latency);
        entry.consecutive_errors = 0;
    }

    pub fn record_error(&self, resource_type: ResourceType) {
        let mut stats = self.lock();
        let entry = stats.entry(resource_type).or_default();
        entry.consecutive_errors = entry.consecutive_errors.saturating_add(1);
    }

    pub fn consecutive_errors(&self, resource_type: ResourceType) -> u32 {
        self.lock()
            .get(&resource_type)
            .map_or(0, |s| s.consecutive_errors)
    }
}
