//! Client-side rate limiting for the open-data API
//!
//! Keeps outbound traffic under `N` requests per rolling second and honors
//! server-imposed cooldowns after HTTP 429 responses.
//!
//! ## Architecture
//!
//! - [`TokenBucket`]: token bucket with capacity `N` and refill `N`/second,
//!   whose effective capacity shrinks on throttle and recovers on success
//! - [`RateLimiter`]: the bucket plus a cooldown deadline that takes
//!   precedence over it
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use riksync_api::rate_limit::RateLimiter;
//!
//! # async fn example() {
//! let limiter = RateLimiter::new(5);
//! limiter.acquire().await;
//! // ... make API call, receive 429 with Retry-After: 2 ...
//! limiter.on_throttle(Some(Duration::from_secs(2)));
//! # }
//! ```

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Successes needed before the effective capacity grows again
const RECOVERY_INTERVAL: u64 = 100;

/// Shortest sleep while waiting for a token
const MIN_WAIT: Duration = Duration::from_millis(10);

/// Longest delay accepted from an HTTP-date `Retry-After`
const MAX_RETRY_AFTER_SECS: u64 = 3600;

// ============================================================================
// TokenBucket
// ============================================================================

/// Mutable bucket state, protected by a single Mutex.
#[derive(Debug)]
struct BucketState {
    /// Current number of available tokens (fractional for smooth refill)
    tokens: f64,
    last_refill: Instant,
    /// Capacity after throttle adjustments
    effective_capacity: u32,
    /// Successes since the last throttle or recovery step
    success_count: u64,
}

/// Token bucket for the whole upstream API.
///
/// Tokens are consumed on each request and refilled at a constant rate.
/// When no tokens are available callers must wait for refill.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: u32,
    refill_rate: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    /// Creates a full bucket.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of tokens
    /// * `refill_rate` - Tokens added per second
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            state: Mutex::new(BucketState {
                tokens: capacity as f64,
                last_refill: Instant::now(),
                effective_capacity: capacity,
                success_count: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds the tokens accrued since the last refill, capped at the
    /// effective capacity.
    fn refill(state: &mut BucketState, refill_rate: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        if elapsed > 0.0 {
            state.tokens =
                (state.tokens + elapsed * refill_rate).min(state.effective_capacity as f64);
            state.last_refill = now;
        }
    }

    /// Takes one token if available.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        Self::refill(&mut state, self.refill_rate);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Estimated time until one token is available; zero when one already is.
    pub fn time_until_available(&self) -> Duration {
        let mut state = self.lock();
        Self::refill(&mut state, self.refill_rate);
        if state.tokens >= 1.0 {
            Duration::ZERO
        } else if self.refill_rate > 0.0 {
            Duration::from_secs_f64((1.0 - state.tokens) / self.refill_rate)
        } else {
            Duration::MAX
        }
    }

    pub fn available_tokens(&self) -> f64 {
        let mut state = self.lock();
        Self::refill(&mut state, self.refill_rate);
        state.tokens
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn effective_capacity(&self) -> u32 {
        self.lock().effective_capacity
    }

    /// Records a successful call.
    ///
    /// Every [`RECOVERY_INTERVAL`] successes the effective capacity grows by
    /// 5% (at least one token) up to the configured capacity.
    pub fn on_success(&self) {
        let mut state = self.lock();
        state.success_count += 1;
        if state.success_count % RECOVERY_INTERVAL == 0 && state.effective_capacity < self.capacity
        {
            let old = state.effective_capacity;
            let increase = ((old as f64) * 0.05).max(1.0) as u32;
            state.effective_capacity = (old + increase).min(self.capacity);
            debug!(
                old_capacity = old,
                new_capacity = state.effective_capacity,
                "Adaptive recovery: increasing bucket capacity"
            );
        }
    }

    /// Records a 429: halves the effective capacity (floor 1) and resets
    /// the success counter.
    pub fn on_throttle(&self) {
        let mut state = self.lock();
        let old = state.effective_capacity;
        state.effective_capacity = (old / 2).max(1);
        state.tokens = state.tokens.min(state.effective_capacity as f64);
        state.success_count = 0;
        warn!(
            old_capacity = old,
            new_capacity = state.effective_capacity,
            "Throttle detected: reducing bucket capacity by 50%"
        );
    }
}

// ============================================================================
// RateLimiter
// ============================================================================

/// Rate limiter shared by every request of one client, retries included.
///
/// A server cooldown (set from a 429 `Retry-After`) takes precedence over
/// the bucket: no token is handed out before the cooldown deadline.
#[derive(Debug)]
pub struct RateLimiter {
    bucket: TokenBucket,
    cooldown_until: Mutex<Option<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter allowing `requests_per_second` requests per
    /// rolling second. Zero is treated as one.
    pub fn new(requests_per_second: u32) -> Self {
        let n = requests_per_second.max(1);
        Self {
            bucket: TokenBucket::new(n, n as f64),
            cooldown_until: Mutex::new(None),
        }
    }

    fn cooldown(&self) -> MutexGuard<'_, Option<Instant>> {
        self.cooldown_until
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Waits for the cooldown to pass, then for a token.
    pub async fn acquire(&self) {
        if let Some(remaining) = self.cooldown_remaining() {
            debug!(
                wait_ms = remaining.as_millis() as u64,
                "Waiting for server cooldown"
            );
            tokio::time::sleep(remaining).await;
        }

        loop {
            if self.bucket.try_acquire() {
                return;
            }
            let wait = self.bucket.time_until_available().max(MIN_WAIT);
            debug!(wait_ms = wait.as_millis() as u64, "Rate limited, waiting for token");
            tokio::time::sleep(wait).await;
        }
    }

    /// Time left before the server cooldown ends, if one is active.
    pub fn cooldown_remaining(&self) -> Option<Duration> {
        let deadline = (*self.cooldown())?;
        let now = Instant::now();
        (deadline > now).then(|| deadline - now)
    }

    /// Extends the cooldown deadline. An earlier deadline never shortens a
    /// later one already set.
    pub fn set_cooldown(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        let mut cooldown = self.cooldown();
        if cooldown.map_or(true, |current| deadline > current) {
            *cooldown = Some(deadline);
        }
    }

    pub fn on_success(&self) {
        self.bucket.on_success();
    }

    /// Records a 429 response, with the server's requested delay if any.
    pub fn on_throttle(&self, retry_after: Option<Duration>) {
        info!(
            retry_after_ms = retry_after.map(|d| d.as_millis() as u64),
            "Recording throttle event"
        );
        self.bucket.on_throttle();
        if let Some(delay) = retry_after {
            self.set_cooldown(delay);
        }
    }

    pub fn effective_capacity(&self) -> u32 {
        self.bucket.effective_capacity()
    }

    pub fn available_tokens(&self) -> f64 {
        self.bucket.available_tokens()
    }
}

// ============================================================================
// Retry-After header parsing
// ============================================================================

/// Parses a `Retry-After` header value.
///
/// The header can be either an integer number of seconds (`"30"`) or an
/// HTTP-date (`"Fri, 31 Dec 2027 23:59:59 GMT"`), taken as the time left
/// from now. Dates in the past or more than an hour away are rejected.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let diff = date.with_timezone(&chrono::Utc) - chrono::Utc::now();
        if let Ok(secs) = u64::try_from(diff.num_seconds()) {
            if secs <= MAX_RETRY_AFTER_SECS {
                return Some(Duration::from_secs(secs));
            }
        }
    }

    warn!(value, "Could not parse Retry-After header");
    None
}
