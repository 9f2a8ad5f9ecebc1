use async_trait::async_trait;
use serde_json::Value;

use super::merge::MergeReport;
use super::offline_model::{Record, SnapshotCacheEntry};
use crate::errors::Result;

/// Durable per-store record collections.
///
/// Implementations must serialize writes so that two concurrent writers to
/// the same store never lose each other's updates.
#[async_trait]
pub trait OfflineRecordRepositoryTrait: Send + Sync {
    fn get_by_id(&self, store: &str, id: &str) -> Result<Option<Record>>;

    fn get_all(&self, store: &str) -> Result<Vec<Record>>;

    fn count(&self, store: &str) -> Result<i64>;

    /// Upsert by id. A record without an id gets a generated one.
    async fn save(&self, store: &str, record: Record) -> Result<Record>;

    /// Returns whether a record was removed.
    async fn delete(&self, store: &str, id: &str) -> Result<bool>;

    async fn clear(&self, store: &str) -> Result<usize>;

    /// Wipe every store in `OFFLINE_STORES`.
    async fn clear_all(&self) -> Result<usize>;

    /// Apply a server delta atomically; see [`crate::offline::merge_into`].
    async fn merge_data(&self, store: &str, items: Vec<Record>) -> Result<MergeReport>;

    /// Set the store's authoritative flags on one record. Returns false when
    /// the record does not exist or the store has no such flags.
    async fn mark_locally_authoritative(&self, store: &str, id: &str) -> Result<bool>;
}

#[async_trait]
pub trait SnapshotCacheRepositoryTrait: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>>;

    async fn put(&self, entry: SnapshotCacheEntry) -> Result<()>;

    /// Remove entries matching every provided part of the scope. With no user
    /// and no date nothing is considered in scope.
    async fn invalidate_scope(
        &self,
        user_id: Option<String>,
        date: Option<String>,
    ) -> Result<usize>;

    async fn clear_all(&self) -> Result<usize>;
}
