//! riksync Daemon - Scheduled synchronization service
//!
//! This binary runs as a long-lived service and:
//! - Runs the strategic plan once at startup and then every
//!   `daemon.interval_secs`
//! - Reports running attempts left behind by a crashed invocation
//! - Shuts down gracefully on SIGTERM/SIGINT
//!
//! # Architecture
//!
//! A single `CancellationToken` is cancelled by the signal handler. The
//! main loop passes it into the orchestrator, so an in-flight cycle is
//! cancelled cleanly (its attempt is closed as failed, its cursor is left
//! at the last committed state) before the loop exits.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use riksync_api::client::OpenDataClient;
use riksync_core::{
    config::Config,
    ports::{IOpenDataApi, IRecordStore, IStateRepository},
};
use riksync_store::{DatabasePool, SqliteStateRepository};
use riksync_sync::{PlanOptions, SyncOrchestrator};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Environment variable overriding the configuration file location
const CONFIG_ENV: &str = "RIKSYNC_CONFIG";

// ============================================================================
// DaemonService
// ============================================================================

/// Runs the strategic plan on a fixed schedule until shutdown
struct DaemonService {
    config: Config,
    orchestrator: SyncOrchestrator,
    /// Token for signalling graceful shutdown
    shutdown: CancellationToken,
}

impl DaemonService {
    /// Opens the database and wires the HTTP client into the orchestrator
    async fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let pool = DatabasePool::new(&config.database.path)
            .await
            .with_context(|| {
                format!("Failed to open database at {}", config.database.path.display())
            })?;
        let repo = Arc::new(SqliteStateRepository::new(pool.pool().clone()));
        let client = OpenDataClient::new(&config).context("Failed to create open-data client")?;

        let orchestrator = SyncOrchestrator::new(
            config.clone(),
            Arc::new(client) as Arc<dyn IOpenDataApi>,
            Arc::clone(&repo) as Arc<dyn IStateRepository>,
            repo as Arc<dyn IRecordStore>,
        )?;

        Ok(Self {
            config,
            orchestrator,
            shutdown,
        })
    }

    async fn run(&self) -> Result<()> {
        self.report_stale_attempts().await;
        self.sync_loop().await.map(|_| ())
    }

    async fn report_stale_attempts(&self) {
        match self
            .orchestrator
            .audit()
            .stale_running(self.config.audit.stale_after())
            .await
        {
            Ok(stale) if !stale.is_empty() => {
                for attempt in &stale {
                    warn!(
                        attempt_id = %attempt.id(),
                        resource = %attempt.resource_type(),
                        started_at = %attempt.started_at(),
                        "Attempt still marked running, previous invocation likely crashed"
                    );
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %format!("{e:#}"), "Failed to query stale attempts"),
        }
    }

    /// Main loop: one strategic plan per tick.
    ///
    /// The first tick fires immediately. Returns the number of plans run.
    async fn sync_loop(&self) -> Result<u64> {
        let period = self.config.daemon.interval();
        info!(interval_secs = period.as_secs(), "Starting sync loop");

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut runs = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                _ = interval.tick() => {}
            }

            let summary = self
                .orchestrator
                .run_strategic_plan(&PlanOptions::default(), &self.shutdown)
                .await;
            runs += 1;

            match summary.failure_message() {
                Some(failures) => error!(
                    total_processed = summary.total_processed,
                    failures = %failures,
                    "Strategic plan finished with failures"
                ),
                None => info!(
                    total_processed = summary.total_processed,
                    "Strategic plan finished"
                ),
            }

            if summary.cancelled {
                info!("Strategic plan cancelled by shutdown");
                break;
            }
        }

        info!(runs, "Sync loop terminated");
        Ok(runs)
    }
}

// ============================================================================
// Graceful shutdown signal handler
// ============================================================================

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C)");
        }
        _ = terminate => {
            info!("Received SIGTERM");
        }
    }

    token.cancel();
}

fn load_config() -> Result<(PathBuf, Config)> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => {
            let path = PathBuf::from(path);
            let config = Config::load(&path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
            Ok((path, config))
        }
        None => {
            let path = Config::default_path();
            let config = Config::load_or_default(&path);
            Ok((path, config))
        }
    }
}

fn init_tracing(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true);
    if config.logging.format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

// ============================================================================
// Main entry point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let (config_path, config) = load_config()?;
    init_tracing(&config);

    info!(config_path = %config_path.display(), "riksync daemon starting (riksyncd)");

    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            error!(field = %e.field, "{}", e.message);
        }
        anyhow::bail!("Invalid configuration ({} errors)", errors.len());
    }

    let shutdown_token = CancellationToken::new();
    let signal_token = shutdown_token.clone();
    tokio::spawn(async move {
        shutdown_signal(signal_token).await;
    });

    let service = DaemonService::new(config, shutdown_token).await?;
    let result = service.run().await;

    match &result {
        Ok(()) => info!("riksync daemon shut down gracefully"),
        Err(e) => error!(error = %format!("{e:#}"), "riksync daemon exiting with error"),
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
