//! riksync Core - Domain logic and port definitions
//!
//! This crate contains the hexagonal architecture core with:
//! - **Domain entities** - `SyncCursor`, `SyncAttempt`, `NormalizedRecord`
//! - **Port definitions** - Traits for adapters: `IOpenDataApi`, `IStateRepository`, `IRecordStore`
//! - **Configuration** - The immutable `Config` value handed to every component
//!
//! # Architecture
//!
//! The domain module contains pure business logic with no I/O.
//! Ports define trait interfaces that adapter crates implement: the HTTP
//! client in `riksync-api` and the SQLite store in `riksync-store`.

pub mod config;
pub mod domain;
pub mod ports;
