//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! hexagonal architecture. Ports are interfaces that the domain core
//! depends on, but whose implementations live in adapter crates.
//!
//! ## Ports Overview
//!
//! - [`IOpenDataApi`] - Paged reads from the open-data API
//! - [`IStateRepository`] - Sync cursors and the attempt log
//! - [`IRecordStore`] - Idempotent upsert of normalized records

pub mod open_data;
pub mod state_repository;

pub use open_data::{FetchedPage, IOpenDataApi};
pub use state_repository::{AttemptFilter, IRecordStore, IStateRepository};
