//! Retry decisions for outbound calls
//!
//! The client drives an explicit loop; after every failed attempt it asks
//! [`RetryPolicy::decide`] what to do next, handing over an immutable
//! [`AttemptContext`]. The policy never sleeps and never performs I/O.
//!
//! ## Budgets
//!
//! - 429 and 5xx share the HTTP budget (`max_retries`). A 429 waits for the
//!   server's `Retry-After` when one was given.
//! - Timeouts and connection failures have their own budget
//!   (`network_max_retries`) and a longer base delay.
//! - Everything else (404, 413/414, wrong content type, undecodable body,
//!   other 4xx) is terminal.
//! - Whatever the mix, no call makes more than `max_attempts` attempts.

use std::time::Duration;

use riksync_core::config::RetryConfig;

use crate::ApiError;

/// Progress of one logical call across its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptContext {
    /// Attempts made so far, including the one that just failed
    pub attempt: u32,
    /// Retries spent on 429 / 5xx
    pub http_retries: u32,
    /// Retries spent on timeouts and connection failures
    pub network_retries: u32,
    /// Sum of all backoff delays scheduled so far
    pub total_delay: Duration,
}

impl AttemptContext {
    /// Context after the first attempt
    pub fn first() -> Self {
        Self {
            attempt: 1,
            http_retries: 0,
            network_retries: 0,
            total_delay: Duration::ZERO,
        }
    }

    fn after_http_retry(self, delay: Duration) -> Self {
        Self {
            attempt: self.attempt + 1,
            http_retries: self.http_retries + 1,
            total_delay: self.total_delay + delay,
            ..self
        }
    }

    fn after_network_retry(self, delay: Duration) -> Self {
        Self {
            attempt: self.attempt + 1,
            network_retries: self.network_retries + 1,
            total_delay: self.total_delay + delay,
            ..self
        }
    }
}

/// What to do after a failed attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Sleep for `delay`, then try again with `next`
    Retry {
        delay: Duration,
        next: AttemptContext,
    },
    /// Surface the error as-is (terminal, or category budget spent)
    GiveUp,
    /// The hard attempt ceiling was hit
    Exhausted,
}

/// How a failure is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureClass {
    Network,
    Throttled(Option<Duration>),
    Server,
    Terminal,
}

fn classify(error: &ApiError) -> FailureClass {
    match error {
        ApiError::Network(_) | ApiError::Timeout(_) => FailureClass::Network,
        ApiError::RateLimited { retry_after } => FailureClass::Throttled(*retry_after),
        ApiError::Server { .. } => FailureClass::Server,
        _ => FailureClass::Terminal,
    }
}

/// Retry policy built from the `retry` configuration section
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    jitter: bool,
    network_max_retries: u32,
    network_base_delay: Duration,
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.base_delay(),
            max_delay: config.max_delay(),
            multiplier: config.multiplier,
            jitter: config.jitter,
            network_max_retries: config.network_max_retries,
            network_base_delay: config.network_base_delay(),
            max_attempts: config.max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Decides the next step after `error` ended the attempt described by `ctx`.
    pub fn decide(&self, ctx: &AttemptContext, error: &ApiError) -> RetryDecision {
        let class = classify(error);
        if class == FailureClass::Terminal {
            return RetryDecision::GiveUp;
        }
        if ctx.attempt >= self.max_attempts {
            return RetryDecision::Exhausted;
        }

        match class {
            FailureClass::Throttled(retry_after) => {
                if ctx.http_retries >= self.max_retries {
                    return RetryDecision::GiveUp;
                }
                let delay = retry_after
                    .unwrap_or_else(|| self.backoff(self.base_delay, ctx.http_retries));
                RetryDecision::Retry {
                    delay,
                    next: ctx.after_http_retry(delay),
                }
            }
            FailureClass::Server => {
                if ctx.http_retries >= self.max_retries {
                    return RetryDecision::GiveUp;
                }
                let delay = self.backoff(self.base_delay, ctx.http_retries);
                RetryDecision::Retry {
                    delay,
                    next: ctx.after_http_retry(delay),
                }
            }
            FailureClass::Network => {
                if ctx.network_retries >= self.network_max_retries {
                    return RetryDecision::GiveUp;
                }
                let delay = self.backoff(self.network_base_delay, ctx.network_retries);
                RetryDecision::Retry {
                    delay,
                    next: ctx.after_network_retry(delay),
                }
            }
            FailureClass::Terminal => RetryDecision::GiveUp,
        }
    }

    /// `base * multiplier^retry`, capped at `max_delay`, jittered by ±25%
    /// and capped again.
    pub fn backoff(&self, base: Duration, retry: u32) -> Duration {
        let max_ms = self.max_delay.as_millis() as f64;
        let raw = base.as_millis() as f64 * self.multiplier.powi(retry as i32);
        let capped = raw.min(max_ms);

        let delay = if self.jitter {
            let jitter_factor = 0.75 + (rand::random::<f64>() * 0.5);
            (capped * jitter_factor).min(max_ms)
        } else {
            capped
        };

        Duration::from_millis(delay as u64)
    }
}
