use async_trait::async_trait;

use super::sync_model::{NewSyncQueueItem, SyncMetadata, SyncQueueFailure, SyncQueueItem};
use crate::errors::Result;

/// Persistence contract for the sync queue.
///
/// Pending items are always returned in `seq` (enqueue) order.
#[async_trait]
pub trait SyncQueueRepositoryTrait: Send + Sync {
    async fn add_to_sync_queue(&self, item: NewSyncQueueItem) -> Result<SyncQueueItem>;

    fn get_sync_queue(&self) -> Result<Vec<SyncQueueItem>>;

    /// Up to `limit` pending items with `seq > after_seq`.
    fn list_pending(&self, after_seq: i64, limit: i64) -> Result<Vec<SyncQueueItem>>;

    fn list_dead_letters(&self) -> Result<Vec<SyncQueueItem>>;

    fn pending_count(&self) -> Result<i64>;

    /// Remove pending items. Dead letters are kept.
    async fn clear_sync_queue(&self) -> Result<usize>;

    /// Move pending items enqueued before `cutoff_millis` to the dead-letter
    /// state with code `expired`.
    async fn delete_old_synced_items(&self, cutoff_millis: i64) -> Result<usize>;

    async fn remove(&self, seq: i64) -> Result<bool>;

    async fn schedule_retry(&self, seq: i64, failure: SyncQueueFailure) -> Result<()>;

    async fn mark_dead(&self, seq: i64, failure: SyncQueueFailure) -> Result<()>;

    /// Drop dead letters enqueued before `cutoff_millis`.
    async fn purge_dead_letters(&self, cutoff_millis: i64) -> Result<usize>;

    /// Remove every item regardless of status.
    async fn clear_all(&self) -> Result<usize>;
}

#[async_trait]
pub trait SyncMetadataRepositoryTrait: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<SyncMetadata>>;

    fn list(&self) -> Result<Vec<SyncMetadata>>;

    async fn upsert(&self, metadata: SyncMetadata) -> Result<SyncMetadata>;

    async fn clear_all(&self) -> Result<usize>;
}
