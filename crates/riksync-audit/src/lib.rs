//! riksync Audit - append-only sync attempt log
//!
//! Provides:
//! - `AuditLogger`: records the lifecycle of every sync cycle (begin,
//!   complete, fail) through `IStateRepository`
//! - Queries over the log: recent attempts and stale running attempts

pub mod logger;

pub use logger::AuditLogger;
