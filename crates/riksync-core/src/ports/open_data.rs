//! Open-data API port (driven/secondary port)
//!
//! This module defines the interface the orchestrator uses to fetch one
//! page of a resource listing. The production implementation lives in
//! `riksync-api` and wraps every call in the resilience layer (rate
//! limiting, retries, circuit breaking, health checking).
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because errors at port boundaries are
//!   adapter-specific. Callers that need the category downcast to the
//!   adapter's typed error.
//! - The payload is kept as raw JSON; normalization is the resource
//!   mapper's job, not the transport's.

use std::time::Duration;

use crate::domain::ResourceType;

/// One fetched page of an open-data listing
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    /// Decoded JSON body, `None` when the response body was empty
    pub payload: Option<serde_json::Value>,
    /// Time spent on the successful request, used for adaptive batch sizing
    pub latency: Duration,
}

impl FetchedPage {
    pub fn new(payload: Option<serde_json::Value>, latency: Duration) -> Self {
        Self { payload, latency }
    }
}

/// Port for reading the legislature's open-data API
#[async_trait::async_trait]
pub trait IOpenDataApi: Send + Sync {
    /// Fetches a single page from a fully built request URL
    async fn fetch_page(&self, resource_type: ResourceType, url: &str)
        -> anyhow::Result<FetchedPage>;
}
