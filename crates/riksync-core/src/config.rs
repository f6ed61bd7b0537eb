//! Configuration module for riksync.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//!
//! The loaded [`Config`] is an immutable value: components receive it (or the
//! section they need) at construction time and never consult globals.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::ResourceType;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for riksync.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub rate_limiting: RateLimitingConfig,
    pub retry: RetryConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub health_check: HealthCheckConfig,
    pub batch: BatchConfig,
    pub resources: ResourcesConfig,
    pub plan: PlanConfig,
    pub database: DatabaseConfig,
    pub audit: AuditConfig,
    pub daemon: DaemonConfig,
    pub logging: LoggingConfig,
}

/// Upstream open-data API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Scheme and host every endpoint path is joined onto.
    pub base_url: String,
    /// Hard timeout for a single HTTP request, in seconds.
    pub request_timeout_secs: u64,
    /// `User-Agent` header sent with every request.
    pub user_agent: String,
}

/// Client-side request rate limiting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Maximum requests per rolling one-second window.
    pub requests_per_second: u32,
}

/// Retry policy for outbound calls.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries allowed for 429 and 5xx responses.
    pub max_retries: u32,
    /// First backoff delay for HTTP-level retries, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for any single backoff delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Exponential growth factor between retries.
    pub multiplier: f64,
    /// Whether to randomize delays by ±25%.
    pub jitter: bool,
    /// Retries allowed for timeouts and connection failures.
    pub network_max_retries: u32,
    /// First backoff delay for network retries, in milliseconds.
    pub network_base_delay_ms: u64,
    /// Absolute ceiling on attempts for one call, whatever the failure mix.
    pub max_attempts: u32,
}

/// Circuit breaker thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    /// Time the circuit stays open after the last failure, in milliseconds.
    pub recovery_timeout_ms: u64,
    /// Concurrent trial calls admitted while half-open.
    pub half_open_max_calls: u32,
}

/// Periodic upstream health probe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthCheckConfig {
    pub enabled: bool,
    /// Path probed relative to `api.base_url`.
    pub path: String,
    /// Minimum seconds between two probes.
    pub interval_secs: u64,
    pub timeout_secs: u64,
}

/// Adaptive batch sizing thresholds shared by all resource types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    /// Responses faster than this grow the batch, in milliseconds.
    pub fast_latency_ms: u64,
    /// Responses slower than this shrink the batch, in milliseconds.
    pub slow_latency_ms: u64,
    /// Consecutive errors above this force the minimum batch size.
    pub error_floor_threshold: u32,
}

/// Endpoint and batch settings of a single resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Endpoint template: path plus base query string, placeholders included.
    pub endpoint: String,
    /// Query parameter carrying the batch size for this endpoint.
    pub batch_param: String,
    /// Query parameter carrying the 1-based page number.
    pub page_param: String,
    /// Filter keys that overwrite a placeholder already in the template.
    #[serde(default)]
    pub date_params: Vec<String>,
    /// Position in the strategic plan (lower runs first).
    pub priority: u32,
    pub default_batch_size: u32,
    pub min_batch_size: u32,
    pub max_batch_size: u32,
}

/// Per-resource settings, keyed by resource type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourcesConfig(pub BTreeMap<ResourceType, ResourceConfig>);

/// Strategic plan settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanConfig {
    /// Pause between two executed phases, in milliseconds.
    pub inter_phase_delay_ms: u64,
}

/// SQLite database location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Attempt log settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Running attempts older than this are reported as stale, in minutes.
    pub stale_after_minutes: u64,
}

/// Background daemon settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Seconds between two strategic plan runs.
    pub interval_secs: u64,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/riksync/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("riksync")
            .join("config.yaml")
    }

    /// Serialize to YAML, as written by `riksync config init`.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Duration accessors
// ---------------------------------------------------------------------------

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl RetryConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn network_base_delay(&self) -> Duration {
        Duration::from_millis(self.network_base_delay_ms)
    }
}

impl CircuitBreakerConfig {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_millis(self.recovery_timeout_ms)
    }
}

impl HealthCheckConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl BatchConfig {
    pub fn fast_latency(&self) -> Duration {
        Duration::from_millis(self.fast_latency_ms)
    }

    pub fn slow_latency(&self) -> Duration {
        Duration::from_millis(self.slow_latency_ms)
    }
}

impl PlanConfig {
    pub fn inter_phase_delay(&self) -> Duration {
        Duration::from_millis(self.inter_phase_delay_ms)
    }
}

impl AuditConfig {
    pub fn stale_after(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.stale_after_minutes as i64)
    }
}

impl DaemonConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl ResourcesConfig {
    /// Settings of one resource type, if configured
    pub fn get(&self, resource_type: ResourceType) -> Option<&ResourceConfig> {
        self.0.get(&resource_type)
    }

    /// Configured resource types in ascending priority order.
    ///
    /// Ties are broken by resource type so the order is deterministic.
    pub fn in_priority_order(&self) -> Vec<ResourceType> {
        let mut types: Vec<(u32, ResourceType)> =
            self.0.iter().map(|(r, cfg)| (cfg.priority, *r)).collect();
        types.sort();
        types.into_iter().map(|(_, r)| r).collect()
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

// Config derives Default because all its fields implement Default.
// (clippy::derivable_impls)

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://data.riksdagen.se".to_string(),
            request_timeout_secs: 30,
            user_agent: concat!("riksync/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 5,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 5,
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
            jitter: true,
            network_max_retries: 2,
            network_base_delay_ms: 5_000,
            max_attempts: 8,
        }
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout_ms: 60_000,
            half_open_max_calls: 1,
        }
    }
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: "/".to_string(),
            interval_secs: 300,
            timeout_secs: 10,
        }
    }
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            fast_latency_ms: 1_000,
            slow_latency_ms: 5_000,
            error_floor_threshold: 3,
        }
    }
}

impl Default for ResourcesConfig {
    fn default() -> Self {
        let mut map = BTreeMap::new();
        map.insert(
            ResourceType::Members,
            ResourceConfig {
                endpoint: "/personlista/?utformat=json&sort=sorteringsnamn&sortorder=asc"
                    .to_string(),
                batch_param: "antal".to_string(),
                page_param: "p".to_string(),
                date_params: Vec::new(),
                priority: ResourceType::Members.default_priority(),
                default_batch_size: 100,
                min_batch_size: 10,
                max_batch_size: 500,
            },
        );
        map.insert(
            ResourceType::Documents,
            ResourceConfig {
                endpoint: "/dokumentlista/?from=&tom=&sort=datum&sortorder=desc&utformat=json"
                    .to_string(),
                batch_param: "antal".to_string(),
                page_param: "p".to_string(),
                date_params: vec!["from".to_string(), "tom".to_string()],
                priority: ResourceType::Documents.default_priority(),
                default_batch_size: 50,
                min_batch_size: 5,
                max_batch_size: 200,
            },
        );
        map.insert(
            ResourceType::Speeches,
            ResourceConfig {
                endpoint: "/anforandelista/?anf_datum_from=&anf_datum_tom=&utformat=json"
                    .to_string(),
                batch_param: "sz".to_string(),
                page_param: "p".to_string(),
                date_params: vec!["anf_datum_from".to_string(), "anf_datum_tom".to_string()],
                priority: ResourceType::Speeches.default_priority(),
                default_batch_size: 100,
                min_batch_size: 10,
                max_batch_size: 500,
            },
        );
        map.insert(
            ResourceType::Votes,
            ResourceConfig {
                endpoint: "/voteringlista/?utformat=json&gruppering=".to_string(),
                batch_param: "sz".to_string(),
                page_param: "p".to_string(),
                date_params: Vec::new(),
                priority: ResourceType::Votes.default_priority(),
                default_batch_size: 200,
                min_batch_size: 20,
                max_batch_size: 1_000,
            },
        );
        Self(map)
    }
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            inter_phase_delay_ms: 2_000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("riksync")
                .join("riksync.db"),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            stale_after_minutes: 30,
        }
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            interval_secs: 3_600,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"retry.max_attempts"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

fn positive(errors: &mut Vec<ValidationError>, field: &str, value: u64) {
    if value == 0 {
        errors.push(ValidationError {
            field: field.into(),
            message: "must be greater than 0".into(),
        });
    }
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- api ---
        if !(self.api.base_url.starts_with("http://") || self.api.base_url.starts_with("https://"))
        {
            errors.push(ValidationError {
                field: "api.base_url".into(),
                message: format!("must be an http(s) URL, got '{}'", self.api.base_url),
            });
        }
        positive(
            &mut errors,
            "api.request_timeout_secs",
            self.api.request_timeout_secs,
        );

        // --- rate_limiting ---
        positive(
            &mut errors,
            "rate_limiting.requests_per_second",
            self.rate_limiting.requests_per_second as u64,
        );

        // --- retry ---
        positive(&mut errors, "retry.max_attempts", self.retry.max_attempts as u64);
        positive(&mut errors, "retry.max_delay_ms", self.retry.max_delay_ms);
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            errors.push(ValidationError {
                field: "retry.base_delay_ms".into(),
                message: format!(
                    "base_delay_ms ({}) must not exceed max_delay_ms ({})",
                    self.retry.base_delay_ms, self.retry.max_delay_ms
                ),
            });
        }
        if self.retry.multiplier.is_nan() || self.retry.multiplier < 1.0 {
            errors.push(ValidationError {
                field: "retry.multiplier".into(),
                message: "must be at least 1.0".into(),
            });
        }

        // --- circuit_breaker ---
        positive(
            &mut errors,
            "circuit_breaker.failure_threshold",
            self.circuit_breaker.failure_threshold as u64,
        );
        positive(
            &mut errors,
            "circuit_breaker.success_threshold",
            self.circuit_breaker.success_threshold as u64,
        );
        positive(
            &mut errors,
            "circuit_breaker.half_open_max_calls",
            self.circuit_breaker.half_open_max_calls as u64,
        );

        // --- health_check ---
        if self.health_check.enabled {
            positive(
                &mut errors,
                "health_check.interval_secs",
                self.health_check.interval_secs,
            );
            positive(
                &mut errors,
                "health_check.timeout_secs",
                self.health_check.timeout_secs,
            );
            if !self.health_check.path.starts_with('/') {
                errors.push(ValidationError {
                    field: "health_check.path".into(),
                    message: "must start with '/'".into(),
                });
            }
        }

        // --- batch ---
        if self.batch.fast_latency_ms >= self.batch.slow_latency_ms {
            errors.push(ValidationError {
                field: "batch.fast_latency_ms".into(),
                message: format!(
                    "fast_latency_ms ({}) must be below slow_latency_ms ({})",
                    self.batch.fast_latency_ms, self.batch.slow_latency_ms
                ),
            });
        }

        // --- resources ---
        for resource in ResourceType::ALL {
            let Some(cfg) = self.resources.get(resource) else {
                errors.push(ValidationError {
                    field: format!("resources.{resource}"),
                    message: "missing endpoint configuration".into(),
                });
                continue;
            };
            let prefix = format!("resources.{resource}");
            if !cfg.endpoint.starts_with('/') {
                errors.push(ValidationError {
                    field: format!("{prefix}.endpoint"),
                    message: "must start with '/'".into(),
                });
            }
            if cfg.batch_param.is_empty() {
                errors.push(ValidationError {
                    field: format!("{prefix}.batch_param"),
                    message: "must not be empty".into(),
                });
            }
            if cfg.page_param.is_empty() {
                errors.push(ValidationError {
                    field: format!("{prefix}.page_param"),
                    message: "must not be empty".into(),
                });
            }
            if cfg.min_batch_size == 0 {
                errors.push(ValidationError {
                    field: format!("{prefix}.min_batch_size"),
                    message: "must be greater than 0".into(),
                });
            }
            if !(cfg.min_batch_size <= cfg.default_batch_size
                && cfg.default_batch_size <= cfg.max_batch_size)
            {
                errors.push(ValidationError {
                    field: format!("{prefix}.default_batch_size"),
                    message: format!(
                        "expected min ({}) <= default ({}) <= max ({})",
                        cfg.min_batch_size, cfg.default_batch_size, cfg.max_batch_size
                    ),
                });
            }
        }

        // --- daemon ---
        positive(&mut errors, "daemon.interval_secs", self.daemon.interval_secs);

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use riksync_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .api_base_url("http://127.0.0.1:8080")
///     .requests_per_second(2)
///     .logging_level("debug")
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- api ---

    pub fn api_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.config.api.base_url = base_url.into();
        self
    }

    pub fn request_timeout_secs(mut self, seconds: u64) -> Self {
        self.config.api.request_timeout_secs = seconds;
        self
    }

    // --- rate_limiting ---

    pub fn requests_per_second(mut self, n: u32) -> Self {
        self.config.rate_limiting.requests_per_second = n;
        self
    }

    // --- retry ---

    pub fn retry_max_retries(mut self, n: u32) -> Self {
        self.config.retry.max_retries = n;
        self
    }

    pub fn retry_delays_ms(mut self, base: u64, max: u64) -> Self {
        self.config.retry.base_delay_ms = base;
        self.config.retry.max_delay_ms = max;
        self
    }

    pub fn retry_jitter(mut self, jitter: bool) -> Self {
        self.config.retry.jitter = jitter;
        self
    }

    pub fn retry_network(mut self, max_retries: u32, base_delay_ms: u64) -> Self {
        self.config.retry.network_max_retries = max_retries;
        self.config.retry.network_base_delay_ms = base_delay_ms;
        self
    }

    pub fn retry_max_attempts(mut self, n: u32) -> Self {
        self.config.retry.max_attempts = n;
        self
    }

    // --- circuit_breaker ---

    pub fn circuit_failure_threshold(mut self, n: u32) -> Self {
        self.config.circuit_breaker.failure_threshold = n;
        self
    }

    pub fn circuit_success_threshold(mut self, n: u32) -> Self {
        self.config.circuit_breaker.success_threshold = n;
        self
    }

    pub fn circuit_recovery_timeout_ms(mut self, ms: u64) -> Self {
        self.config.circuit_breaker.recovery_timeout_ms = ms;
        self
    }

    // --- health_check ---

    pub fn health_check_enabled(mut self, enabled: bool) -> Self {
        self.config.health_check.enabled = enabled;
        self
    }

    pub fn health_check_path(mut self, path: impl Into<String>) -> Self {
        self.config.health_check.path = path.into();
        self
    }

    pub fn health_check_interval_secs(mut self, seconds: u64) -> Self {
        self.config.health_check.interval_secs = seconds;
        self
    }

    // --- resources ---

    pub fn resource(mut self, resource_type: ResourceType, resource: ResourceConfig) -> Self {
        self.config.resources.0.insert(resource_type, resource);
        self
    }

    pub fn resource_batch_sizes(
        mut self,
        resource_type: ResourceType,
        default: u32,
        min: u32,
        max: u32,
    ) -> Self {
        if let Some(cfg) = self.config.resources.0.get_mut(&resource_type) {
            cfg.default_batch_size = default;
            cfg.min_batch_size = min;
            cfg.max_batch_size = max;
        }
        self
    }

    pub fn resource_priority(mut self, resource_type: ResourceType, priority: u32) -> Self {
        if let Some(cfg) = self.config.resources.0.get_mut(&resource_type) {
            cfg.priority = priority;
        }
        self
    }

    // --- plan ---

    pub fn inter_phase_delay_ms(mut self, ms: u64) -> Self {
        self.config.plan.inter_phase_delay_ms = ms;
        self
    }

    // --- database ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.database.path = path;
        self
    }

    // --- daemon ---

    pub fn daemon_interval_secs(mut self, seconds: u64) -> Self {
        self.config.daemon.interval_secs = seconds;
        self
    }

    // --- logging ---

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_format(mut self, format: impl Into<String>) -> Self {
        self.config.logging.format = format.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.api.base_url, "https://data.riksdagen.se");
        assert_eq!(cfg.api.request_timeout_secs, 30);
        assert_eq!(cfg.rate_limiting.requests_per_second, 5);
        assert_eq!(cfg.retry.max_retries, 5);
        assert_eq!(cfg.retry.network_max_retries, 2);
        assert!(cfg.retry.network_base_delay_ms > cfg.retry.base_delay_ms);
        assert!(cfg.retry.network_max_retries < cfg.retry.max_retries);
        assert_eq!(cfg.circuit_breaker.failure_threshold, 5);
        assert_eq!(cfg.circuit_breaker.success_threshold, 2);
        assert!(cfg.health_check.enabled);
        assert_eq!(cfg.batch.error_floor_threshold, 3);
        assert_eq!(cfg.resources.0.len(), ResourceType::ALL.len());
        assert_eq!(cfg.logging.level, "info");
        assert_eq!(cfg.logging.format, "text");
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    #[test]
    fn default_batch_param_names_differ_per_endpoint() {
        let cfg = Config::default();
        let members = cfg.resources.get(ResourceType::Members).unwrap();
        let speeches = cfg.resources.get(ResourceType::Speeches).unwrap();
        assert_eq!(members.batch_param, "antal");
        assert_eq!(speeches.batch_param, "sz");
        assert!(speeches
            .date_params
            .contains(&"anf_datum_from".to_string()));
    }

    #[test]
    fn priority_order_follows_configured_priorities() {
        let cfg = Config::default();
        assert_eq!(
            cfg.resources.in_priority_order(),
            vec![
                ResourceType::Members,
                ResourceType::Documents,
                ResourceType::Speeches,
                ResourceType::Votes,
            ]
        );

        let cfg = ConfigBuilder::new()
            .resource_priority(ResourceType::Votes, 0)
            .build();
        assert_eq!(cfg.resources.in_priority_order()[0], ResourceType::Votes);
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
api:
  base_url: http://localhost:9000
  request_timeout_secs: 5
  user_agent: test-agent
rate_limiting:
  requests_per_second: 2
retry:
  max_retries: 3
  base_delay_ms: 100
  max_delay_ms: 1000
  multiplier: 3.0
  jitter: false
  network_max_retries: 1
  network_base_delay_ms: 500
  max_attempts: 4
resources:
  votes:
    endpoint: /voteringlista/?utformat=json
    batch_param: sz
    page_param: p
    priority: 1
    default_batch_size: 10
    min_batch_size: 1
    max_batch_size: 20
logging:
  level: debug
  format: json
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.api.base_url, "http://localhost:9000");
        assert_eq!(cfg.api.request_timeout(), Duration::from_secs(5));
        assert_eq!(cfg.rate_limiting.requests_per_second, 2);
        assert_eq!(cfg.retry.max_attempts, 4);
        assert!(!cfg.retry.jitter);
        assert_eq!(cfg.retry.network_base_delay(), Duration::from_millis(500));
        assert_eq!(cfg.logging.format, "json");

        // The resources map is replaced wholesale by the file
        let votes = cfg.resources.get(ResourceType::Votes).unwrap();
        assert_eq!(votes.default_batch_size, 10);
        assert!(votes.date_params.is_empty());
        assert!(cfg.resources.get(ResourceType::Members).is_none());

        // Sections absent from the file keep their defaults
        assert_eq!(cfg.circuit_breaker.failure_threshold, 5);
        assert_eq!(cfg.daemon.interval_secs, 3_600);
    }

    #[test]
    fn yaml_roundtrip_preserves_resources() {
        let cfg = Config::default();
        let yaml = cfg.to_yaml().unwrap();
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.resources, cfg.resources);
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.rate_limiting.requests_per_second, 5);
    }

    #[test]
    fn load_returns_error_on_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"not: [valid: yaml: {{{").unwrap();
        tmp.flush().unwrap();

        assert!(Config::load(tmp.path()).is_err());
    }

    #[test]
    fn load_rejects_unknown_resource_type() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(
            b"resources:\n  committees:\n    endpoint: /x\n    batch_param: sz\n    page_param: p\n    priority: 1\n    default_batch_size: 1\n    min_batch_size: 1\n    max_batch_size: 1\n",
        )
        .unwrap();
        tmp.flush().unwrap();

        assert!(Config::load(tmp.path()).is_err());
    }

    // -- Validation --

    #[test]
    fn validate_catches_missing_resource() {
        let mut cfg = Config::default();
        cfg.resources.0.remove(&ResourceType::Documents);
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "resources.documents"));
    }

    #[test]
    fn validate_catches_inverted_batch_limits() {
        let cfg = ConfigBuilder::new()
            .resource_batch_sizes(ResourceType::Speeches, 50, 100, 10)
            .build();
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "resources.speeches.default_batch_size"));
    }

    #[test]
    fn validate_catches_zero_rate_limit() {
        let cfg = ConfigBuilder::new().requests_per_second(0).build();
        let errors = cfg.validate();
        assert!(errors
            .iter()
            .any(|e| e.field == "rate_limiting.requests_per_second"));
    }

    #[test]
    fn validate_catches_retry_delay_inversion() {
        let cfg = ConfigBuilder::new().retry_delays_ms(5_000, 100).build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "retry.base_delay_ms"));
    }

    #[test]
    fn validate_catches_bad_base_url() {
        let cfg = ConfigBuilder::new().api_base_url("ftp://example").build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "api.base_url"));
    }

    #[test]
    fn validate_skips_health_fields_when_disabled() {
        let mut cfg = Config::default();
        cfg.health_check.enabled = false;
        cfg.health_check.interval_secs = 0;
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn validate_catches_invalid_logging() {
        let cfg = ConfigBuilder::new()
            .logging_level("verbose")
            .logging_format("xml")
            .build();
        let fields: Vec<String> = cfg.validate().into_iter().map(|e| e.field).collect();
        assert!(fields.contains(&"logging.level".to_string()));
        assert!(fields.contains(&"logging.format".to_string()));
    }

    // -- Builder --

    #[test]
    fn builder_build_validated_reports_errors() {
        let result = ConfigBuilder::new().retry_max_attempts(0).build_validated();
        let errors = result.unwrap_err();
        assert!(errors.iter().any(|e| e.field == "retry.max_attempts"));
    }

    #[test]
    fn builder_overrides_values() {
        let cfg = ConfigBuilder::new()
            .api_base_url("http://127.0.0.1:1234")
            .retry_jitter(false)
            .circuit_recovery_timeout_ms(50)
            .inter_phase_delay_ms(0)
            .build_validated()
            .expect("valid config");
        assert_eq!(cfg.api.base_url, "http://127.0.0.1:1234");
        assert!(!cfg.retry.jitter);
        assert_eq!(
            cfg.circuit_breaker.recovery_timeout(),
            Duration::from_millis(50)
        );
        assert_eq!(cfg.plan.inter_phase_delay(), Duration::ZERO);
    }

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            field: "retry.max_attempts".into(),
            message: "must be greater than 0".into(),
        };
        assert_eq!(err.to_string(), "retry.max_attempts: must be greater than 0");
    }
}
