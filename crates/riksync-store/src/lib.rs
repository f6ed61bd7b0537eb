//! riksync Store - SQLite persistence
//!
//! SQLite-based storage for:
//! - Sync cursors (one row per resource type)
//! - The append-only sync attempt log
//! - Normalized members, speeches, documents and votes
//!
//! ## Architecture
//!
//! This crate implements the `IStateRepository` and `IRecordStore` ports
//! from `riksync-core` using SQLite as the storage backend. It is a driven
//! (secondary) adapter in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with the bundled migration
//! - [`SqliteStateRepository`] - Implementation of both storage ports
//! - [`StoreError`] - Error types for storage operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use riksync_store::{DatabasePool, SqliteStateRepository};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/var/lib/riksync/riksync.db")).await?;
//! let repo = SqliteStateRepository::new(pool.pool().clone());
//! // Use repo as IStateRepository and IRecordStore...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod repository;

pub use pool::DatabasePool;
pub use repository::SqliteStateRepository;

/// Errors that can occur during storage operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value could not be converted back into a domain type
    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    /// A cursor row that the migration should have seeded is missing
    #[error("No cursor stored for resource type: {0}")]
    MissingCursor(String),

    /// An attempt could not be finished because it is not stored as running
    #[error("Attempt {0} is not running")]
    AttemptNotRunning(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::QueryFailed(e.to_string())
    }
}
