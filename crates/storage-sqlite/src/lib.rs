//! SQLite persistence for the fieldsync engine.
//!
//! All writes go through a single writer thread ([`db::WriteHandle`]); reads
//! use the r2d2 pool directly.

pub mod db;
pub mod errors;
pub mod offline;
pub mod schema;
pub mod snapshot;
pub mod sync;

pub use db::{create_pool, get_connection, init, run_migrations, spawn_writer, DbPool, WriteHandle};
pub use errors::StorageError;
pub use offline::OfflineRecordRepository;
pub use snapshot::SnapshotCacheRepository;
pub use sync::{SyncMetadataRepository, SyncQueueRepository};
