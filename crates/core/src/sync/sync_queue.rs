//! Append-only queue of local mutations awaiting the remote service.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Notify;
use uuid::Uuid;

use super::sync_model::{NewSyncQueueItem, SyncAction, SyncQueueItem, SYNC_ACTION_PAYLOAD_VERSION};
use super::sync_traits::SyncQueueRepositoryTrait;
use crate::errors::{Result, ValidationError};
use crate::utils::clock::Clock;

/// Wake-up signal from enqueuers to the background drain task.
///
/// A notification sent while no one waits is kept, so the next wait returns
/// immediately.
#[derive(Debug, Clone, Default)]
pub struct QueueSignal {
    notify: Arc<Notify>,
}

impl QueueSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify(&self) {
        self.notify.notify_one();
    }

    pub async fn notified(&self) {
        self.notify.notified().await;
    }
}

pub struct SyncQueue {
    repository: Arc<dyn SyncQueueRepositoryTrait>,
    clock: Arc<dyn Clock>,
    signal: QueueSignal,
    max_age_ms: i64,
}

impl SyncQueue {
    pub fn new(
        repository: Arc<dyn SyncQueueRepositoryTrait>,
        clock: Arc<dyn Clock>,
        signal: QueueSignal,
        max_age_ms: i64,
    ) -> Self {
        Self {
            repository,
            clock,
            signal,
            max_age_ms,
        }
    }

    pub fn signal(&self) -> &QueueSignal {
        &self.signal
    }

    pub fn repository(&self) -> Arc<dyn SyncQueueRepositoryTrait> {
        Arc::clone(&self.repository)
    }

    /// Append an item stamped with the current time. The payload is stored
    /// as-is; it is decoded only when drained.
    pub async fn add_to_sync_queue(&self, action: &str, data: Value) -> Result<SyncQueueItem> {
        if action.trim().is_empty() {
            return Err(ValidationError::MissingField("action".to_string()).into());
        }

        let now = self.clock.now_millis();
        let item = self
            .repository
            .add_to_sync_queue(NewSyncQueueItem {
                event_id: Uuid::now_v7().to_string(),
                action: action.to_string(),
                data,
                payload_version: SYNC_ACTION_PAYLOAD_VERSION,
                timestamp: now,
                created_at: now,
            })
            .await?;

        log::debug!(
            "[SyncQueue] Enqueued {} seq={} event={}",
            item.action,
            item.seq,
            item.event_id
        );
        self.signal.notify();
        Ok(item)
    }

    pub async fn enqueue(&self, action: &SyncAction) -> Result<SyncQueueItem> {
        let (name, data) = action.to_parts()?;
        self.add_to_sync_queue(&name, data).await
    }

    pub fn get_sync_queue(&self) -> Result<Vec<SyncQueueItem>> {
        self.repository.get_sync_queue()
    }

    pub fn list_dead_letters(&self) -> Result<Vec<SyncQueueItem>> {
        self.repository.list_dead_letters()
    }

    pub fn pending_count(&self) -> Result<i64> {
        self.repository.pending_count()
    }

    pub async fn clear_sync_queue(&self) -> Result<usize> {
        let removed = self.repository.clear_sync_queue().await?;
        log::info!("[SyncQueue] Cleared {} pending item(s)", removed);
        Ok(removed)
    }

    /// Evict pending items older than `max_age_ms` (the configured maximum
    /// age when `None`) into the dead-letter state.
    pub async fn delete_old_synced_items(&self, max_age_ms: Option<i64>) -> Result<usize> {
        let max_age = max_age_ms.unwrap_or(self.max_age_ms);
        let cutoff = self.clock.now_millis() - max_age;
        let evicted = self.repository.delete_old_synced_items(cutoff).await?;
        if evicted > 0 {
            log::warn!(
                "[SyncQueue] Evicted {} item(s) older than {} ms to dead letters",
                evicted,
                max_age
            );
        }
        Ok(evicted)
    }

    pub async fn purge_dead_letters(&self, older_than_ms: i64) -> Result<usize> {
        let cutoff = self.clock.now_millis() - older_than_ms;
        self.repository.purge_dead_letters(cutoff).await
    }

    pub async fn clear_all(&self) -> Result<usize> {
        self.repository.clear_all().await
    }
}
