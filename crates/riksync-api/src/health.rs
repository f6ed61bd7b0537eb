//! Cached upstream health probe
//!
//! Before a call goes out the client asks the [`HealthChecker`] whether the
//! upstream is usable. A real probe (GET on the configured path with a
//! short timeout) runs at most once per interval; in between the cached
//! verdict is returned. While the verdict is unhealthy every call fails
//! fast with [`ApiError::Unhealthy`].

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use reqwest::Client;
use riksync_core::config::HealthCheckConfig;
use tokio::time::Instant;
use tracing::{debug, warn};
use url::Url;

use crate::ApiError;

#[derive(Debug, Clone, Copy)]
struct Verdict {
    checked_at: Instant,
    healthy: bool,
}

/// Interval-gated health probe with a cached verdict
#[derive(Debug)]
pub struct HealthChecker {
    enabled: bool,
    probe_url: Url,
    interval: Duration,
    timeout: Duration,
    last: Mutex<Option<Verdict>>,
}

impl HealthChecker {
    /// Creates a checker probing `config.path` relative to `base_url`.
    pub fn new(base_url: &Url, config: &HealthCheckConfig) -> Result<Self, ApiError> {
        let probe_url = base_url
            .join(&config.path)
            .map_err(|e| ApiError::InvalidRequest(format!("health check path: {}", e)))?;
        Ok(Self {
            enabled: config.enabled,
            probe_url,
            interval: config.interval(),
            timeout: config.timeout(),
            last: Mutex::new(None),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Verdict>> {
        self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Cached verdict if it is still fresh
    fn cached(&self) -> Option<bool> {
        let last = (*self.lock())?;
        (last.checked_at.elapsed() < self.interval).then_some(last.healthy)
    }

    /// Returns `Ok` when the upstream is considered healthy.
    pub async fn ensure_healthy(&self, http: &Client) -> Result<(), ApiError> {
        if !self.enabled {
            return Ok(());
        }

        let healthy = match self.cached() {
            Some(healthy) => healthy,
            None => {
                let healthy = self.probe(http).await;
                *self.lock() = Some(Verdict {
                    checked_at: Instant::now(),
                    healthy,
                });
                healthy
            }
        };

        if healthy {
            Ok(())
        } else {
            Err(ApiError::Unhealthy)
        }
    }

    /// Any answer below 500 counts as healthy.
    async fn probe(&self, http: &Client) -> bool {
        match http
            .get(self.probe_url.clone())
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status();
                debug!(url = %self.probe_url, status = status.as_u16(), "Health probe answered");
                if status.is_server_error() {
                    warn!(status = status.as_u16(), "Health probe failed, upstream unhealthy");
                    false
                } else {
                    true
                }
            }
            Err(err) => {
                warn!(error = %err, "Health probe failed, upstream unreachable");
                false
            }
        }
    }

    /// Last recorded verdict, fresh or not
    pub fn last_verdict(&self) -> Option<bool> {
        self.lock().map(|v| v.healthy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(enabled: bool) -> HealthCheckConfig {
        HealthCheckConfig {
            enabled,
            path: "/".to_string(),
            interval_secs: 300,
            timeout_secs: 1,
        }
    }

    #[tokio::test]
    async fn test_disabled_checker_never_probes() {
        // Nothing listens on this port; a real probe would fail
        let base = Url::parse("http://127.0.0.1:9").expect("valid url");
        let checker = HealthChecker::new(&base, &config(false)).expect("checker");
        assert!(checker.ensure_healthy(&Client::new()).await.is_ok());
        assert!(checker.last_verdict().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_unhealthy_and_cached() {
        let base = Url::parse("http://127.0.0.1:9").expect("valid url");
        let checker = HealthChecker::new(&base, &config(true)).expect("checker");
        let http = Client::new();

        assert!(matches!(
            checker.ensure_healthy(&http).await,
            Err(ApiError::Unhealthy)
        ));
        assert_eq!(checker.last_verdict(), Some(false));
        assert_eq!(checker.cached(), Some(false));
    }

    #[test]
    fn test_probe_url_joins_path() {
        let base = Url::parse("https://data.riksdagen.se").expect("valid url");
        let mut cfg = config(true);
        cfg.path = "/personlista/?utformat=json&antal=1".to_string();
        let checker = HealthChecker::new(&base, &cfg).expect("checker");
        assert_eq!(
            checker.probe_url.as_str(),
            "https://data.riksdagen.se/personlista/?utformat=json&antal=1"
        );
    }
}
