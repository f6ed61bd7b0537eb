//! Open-data API client
//!
//! [`OpenDataClient`] wires the resilience layer around a `reqwest::Client`
//! and implements the [`IOpenDataApi`] port. Every logical fetch goes
//! through the same steps on each attempt:
//!
//! 1. health check (cached, fails fast while unhealthy)
//! 2. circuit breaker admission (fails fast while open)
//! 3. rate limiter token (server cooldown first)
//! 4. one GET with the hard request timeout
//!
//! Failed attempts are handed to the [`RetryPolicy`], which decides whether
//! and when to try again.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use riksync_api::client::OpenDataClient;
//! use riksync_core::config::Config;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = OpenDataClient::new(&Config::default())?;
//! let page = client
//!     .fetch_json("https://data.riksdagen.se/personlista/?utformat=json&antal=10")
//!     .await?;
//! println!("took {:?}", page.latency);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use reqwest::header::{CONTENT_TYPE, RETRY_AFTER};
use reqwest::Client;
use riksync_core::config::Config;
use riksync_core::domain::ResourceType;
use riksync_core::ports::{FetchedPage, IOpenDataApi};
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::circuit_breaker::CircuitBreaker;
use crate::health::HealthChecker;
use crate::rate_limit::{parse_retry_after, RateLimiter};
use crate::retry::{AttemptContext, RetryDecision, RetryPolicy};
use crate::url_builder::UrlBuilder;
use crate::ApiError;

/// HTTP client for the open-data API
#[derive(Debug)]
pub struct OpenDataClient {
    http: Client,
    urls: UrlBuilder,
    limiter: Arc<RateLimiter>,
    breaker: Arc<CircuitBreaker>,
    health: HealthChecker,
    retry: RetryPolicy,
}

impl OpenDataClient {
    /// Creates a client from the `api`, `rate_limiting`, `retry`,
    /// `circuit_breaker`, `health_check` and `resources` sections.
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(config.api.request_timeout())
            .user_agent(config.api.user_agent.clone())
            .build()
            .map_err(|e| ApiError::InvalidRequest(format!("cannot build HTTP client: {}", e)))?;

        let urls = UrlBuilder::new(&config.api.base_url, &config.resources)?;
        let health = HealthChecker::new(urls.base_url(), &config.health_check)?;

        Ok(Self {
            http,
            urls,
            limiter: Arc::new(RateLimiter::new(config.rate_limiting.requests_per_second)),
            breaker: Arc::new(CircuitBreaker::new(&config.circuit_breaker)),
            health,
            retry: RetryPolicy::from_config(&config.retry),
        })
    }

    pub fn url_builder(&self) -> &UrlBuilder {
        &self.urls
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Fetches and decodes one JSON page, retrying per the retry policy.
    ///
    /// An empty body yields `payload: None`.
    pub async fn fetch_json(&self, url: &str) -> Result<FetchedPage, ApiError> {
        let url = Url::parse(url)
            .map_err(|e| ApiError::InvalidRequest(format!("invalid URL {}: {}", url, e)))?;
        let mut ctx = AttemptContext::first();

        loop {
            self.health.ensure_healthy(&self.http).await?;
            let permit = self.breaker.check()?;
            self.limiter.acquire().await;

            let started = Instant::now();
            let outcome = self.send_once(&url).await;
            permit.record(&outcome);

            let err = match outcome {
                Ok(payload) => {
                    self.limiter.on_success();
                    let latency = started.elapsed();
                    if ctx.attempt > 1 {
                        info!(url = %url, attempt = ctx.attempt, "Request succeeded after retries");
                    }
                    return Ok(FetchedPage::new(payload, latency));
                }
                Err(err) => err,
            };

            if let ApiError::RateLimited { retry_after } = &err {
                self.limiter.on_throttle(*retry_after);
            }

            match self.retry.decide(&ctx, &err) {
                RetryDecision::Retry { delay, next } => {
                    warn!(
                        url = %url,
                        attempt = ctx.attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    ctx = next;
                }
                RetryDecision::GiveUp => {
                    debug!(url = %url, attempt = ctx.attempt, error = %err, "Giving up on request");
                    return Err(err);
                }
                RetryDecision::Exhausted => {
                    warn!(url = %url, attempts = ctx.attempt, error = %err, "Retries exhausted");
                    return Err(ApiError::RetriesExhausted {
                        attempts: ctx.attempt,
                        last_error: err.to_string(),
                    });
                }
            }
        }
    }

    /// Performs a single GET and classifies the outcome.
    async fn send_once(&self, url: &Url) -> Result<Option<Value>, ApiError> {
        debug!(url = %url, "GET");
        let response = self.http.get(url.clone()).send().await?;
        let status = response.status();

        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            return Err(ApiError::from_status(status.as_u16(), retry_after, url.as_str()));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let body = response.bytes().await?;

        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        if !content_type.contains("json") {
            return Err(ApiError::InvalidContentType(content_type));
        }

        serde_json::from_slice(&body)
            .map(Some)
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl IOpenDataApi for OpenDataClient {
    async fn fetch_page(&self, resource_type: ResourceType, url: &str) -> anyhow::Result<FetchedPage> {
        debug!(resource = %resource_type, url, "Fetching page");
        Ok(self.fetch_json(url).await?)
    }
}
