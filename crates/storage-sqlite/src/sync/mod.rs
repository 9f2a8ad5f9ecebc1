//! SQLite storage for the sync queue and per-scope sync metadata.

pub mod metadata;
pub mod queue;

pub use metadata::{SyncMetadataDB, SyncMetadataRepository};
pub use queue::{NewSyncQueueItemDB, SyncQueueItemDB, SyncQueueRepository};
