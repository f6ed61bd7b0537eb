//! CLI subcommands and the adapter wiring they share

pub mod audit;
pub mod config;
pub mod reset;
pub mod status;
pub mod sync;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use riksync_api::client::OpenDataClient;
use riksync_core::config::Config;
use riksync_core::ports::{IOpenDataApi, IRecordStore, IStateRepository};
use riksync_store::{DatabasePool, SqliteStateRepository};
use riksync_sync::SyncOrchestrator;

/// Loaded configuration plus the path it came from
pub struct CliContext {
    pub config_path: PathBuf,
    pub config: Config,
}

impl CliContext {
    /// Loads the configuration.
    ///
    /// An explicit `--config` path must exist and parse; the default path
    /// falls back to built-in defaults when missing.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => {
                let config = Config::load(path)
                    .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
                Ok(Self {
                    config_path: path.to_path_buf(),
                    config,
                })
            }
            None => {
                let config_path = Config::default_path();
                let config = Config::load_or_default(&config_path);
                Ok(Self {
                    config_path,
                    config,
                })
            }
        }
    }

    /// Opens (and migrates) the configured database
    pub async fn open_repository(&self) -> Result<Arc<SqliteStateRepository>> {
        let db_path = &self.config.database.path;
        let pool = DatabasePool::new(db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
        Ok(Arc::new(SqliteStateRepository::new(pool.pool().clone())))
    }

    /// Wires the HTTP client and the store into an orchestrator
    pub fn orchestrator(&self, repo: Arc<SqliteStateRepository>) -> Result<SyncOrchestrator> {
        let client =
            OpenDataClient::new(&self.config).context("Failed to create open-data client")?;
        let orchestrator = SyncOrchestrator::new(
            self.config.clone(),
            Arc::new(client) as Arc<dyn IOpenDataApi>,
            Arc::clone(&repo) as Arc<dyn IStateRepository>,
            repo as Arc<dyn IRecordStore>,
        )?;
        Ok(orchestrator)
    }
}
