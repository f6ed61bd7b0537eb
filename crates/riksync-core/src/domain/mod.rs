//! Domain entities and business logic
//!
//! This module contains the core domain types for riksync:
//! - Resource types of the open-data API and their natural keys
//! - The durable sync cursor kept per resource type
//! - Sync attempts recorded in the append-only audit log
//! - Normalized records produced from API payloads
//! - Domain-specific error types

pub mod attempt;
pub mod cursor;
pub mod errors;
pub mod newtypes;
pub mod records;
pub mod resource;

// Re-export commonly used types
pub use attempt::{AttemptStatus, SyncAttempt};
pub use cursor::SyncCursor;
pub use errors::DomainError;
pub use newtypes::AttemptId;
pub use records::{Document, Member, NormalizedRecord, Speech, VoteRecord};
pub use resource::ResourceType;
