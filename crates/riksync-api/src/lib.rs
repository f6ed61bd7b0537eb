//! riksync API - Riksdag open-data client
//!
//! Provides the outbound adapter for the open-data API:
//! - Query URL construction for every resource listing
//! - A resilience layer (rate limiting, retries, circuit breaking,
//!   health probing, adaptive batch sizing)
//! - Normalization of the nested listing payloads into domain records
//!
//! ## Modules
//!
//! - [`batch_size`] - Adaptive batch sizing from latency and error streaks
//! - [`circuit_breaker`] - Closed / Open / HalfOpen breaker for the upstream API
//! - [`client`] - HTTP client implementing the `IOpenDataApi` port
//! - [`health`] - Cached periodic upstream health probe
//! - [`mapper`] - Listing payload extraction and record normalization
//! - [`rate_limit`] - Token bucket limiter with server cooldown
//! - [`retry`] - Pure retry decisions over an immutable attempt context
//! - [`url_builder`] - Paged query URL construction

pub mod batch_size;
pub mod circuit_breaker;
pub mod client;
pub mod health;
pub mod mapper;
pub mod rate_limit;
pub mod retry;
pub mod url_builder;

use std::time::Duration;

use riksync_core::domain::ResourceType;
use thiserror::Error;

/// Errors that can occur when talking to the open-data API
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, DNS, TLS or body transfer failure
    #[error("Network error: {0}")]
    Network(String),

    /// The request exceeded the configured hard timeout
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The server answered 429
    #[error("Too many requests, retry after {retry_after:?}")]
    RateLimited {
        /// Server-provided delay, when the `Retry-After` header was parseable
        retry_after: Option<Duration>,
    },

    /// The server answered with a 5xx status
    #[error("Server error: HTTP {status}")]
    Server { status: u16 },

    /// The requested listing does not exist (404)
    #[error("Not found: {0}")]
    NotFound(String),

    /// The server refused the request size (413 / 414)
    #[error("Request too large: HTTP {status}")]
    PayloadTooLarge { status: u16 },

    /// The response was not JSON
    #[error("Invalid content type: {0}")]
    InvalidContentType(String),

    /// The response body could not be decoded
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Any other 4xx status
    #[error("Client error: HTTP {status}")]
    Client { status: u16 },

    /// The circuit breaker rejected the call without touching the network
    #[error("Circuit breaker is open")]
    CircuitOpen,

    /// The last health probe failed; calls fail fast until the next probe
    #[error("Upstream API is unhealthy")]
    Unhealthy,

    /// The hard attempt ceiling was reached
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// The resource type has no endpoint configuration
    #[error("No endpoint configured for resource type: {0}")]
    UnknownResource(ResourceType),

    /// The request could not be built from the given arguments
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl ApiError {
    /// Classifies a non-success HTTP status.
    ///
    /// `retry_after` is only kept for 429 responses.
    pub fn from_status(status: u16, retry_after: Option<Duration>, url: &str) -> Self {
        match status {
            429 => ApiError::RateLimited { retry_after },
            404 => ApiError::NotFound(url.to_string()),
            413 | 414 => ApiError::PayloadTooLarge { status },
            500..=599 => ApiError::Server { status },
            _ => ApiError::Client { status },
        }
    }

    /// Whether this outcome counts against the circuit breaker.
    ///
    /// Only transport, timeout, 429 and 5xx outcomes do; a missing listing
    /// or an oversized request says nothing about upstream health.
    pub fn counts_as_breaker_failure(&self) -> bool {
        matches!(
            self,
            ApiError::Network(_)
                | ApiError::Timeout(_)
                | ApiError::RateLimited { .. }
                | ApiError::Server { .. }
        )
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout(err.to_string())
        } else if err.is_decode() {
            ApiError::InvalidResponse(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_classification() {
        let url = "https://data.riksdagen.se/personlista/";
        assert!(matches!(
            ApiError::from_status(429, Some(Duration::from_secs(3)), url),
            ApiError::RateLimited {
                retry_after: Some(d)
            } if d == Duration::from_secs(3)
        ));
        assert!(matches!(
            ApiError::from_status(404, None, url),
            ApiError::NotFound(_)
        ));
        assert!(matches!(
            ApiError::from_status(414, None, url),
            ApiError::PayloadTooLarge { status: 414 }
        ));
        assert!(matches!(
            ApiError::from_status(503, None, url),
            ApiError::Server { status: 503 }
        ));
        assert!(matches!(
            ApiError::from_status(400, None, url),
            ApiError::Client { status: 400 }
        ));
    }

    #[test]
    fn test_breaker_failure_classification() {
        assert!(ApiError::Timeout("slow".into()).counts_as_breaker_failure());
        assert!(ApiError::Network("reset".into()).counts_as_breaker_failure());
        assert!(ApiError::RateLimited { retry_after: None }.counts_as_breaker_failure());
        assert!(ApiError::Server { status: 502 }.counts_as_breaker_failure());

        assert!(!ApiError::NotFound("x".into()).counts_as_breaker_failure());
        assert!(!ApiError::PayloadTooLarge { status: 413 }.counts_as_breaker_failure());
        assert!(!ApiError::InvalidContentType("text/html".into()).counts_as_breaker_failure());
        assert!(!ApiError::CircuitOpen.counts_as_breaker_failure());
    }
}
