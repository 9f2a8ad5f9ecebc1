//! Offline-first synchronization engine for field-sales data.
//!
//! This crate holds the storage-agnostic part of the engine: domain models,
//! repository contracts, merge policy, interval gate, sync queue, queue drainer
//! and the full-resync orchestrator. Concrete persistence lives in
//! `fieldsync-storage-sqlite`, the HTTP client in `fieldsync-remote`.

pub mod config;
pub mod connectivity;
pub mod errors;
pub mod offline;
pub mod remote;
pub mod sync;
pub mod utils;

pub use config::{StepFailurePolicy, SyncConfig};
pub use errors::{Error, Result};
