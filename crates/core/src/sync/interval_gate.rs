//! Courtesy gate suppressing refreshes of recently synced data.

use std::sync::Arc;

use super::sync_model::{sync_metadata_key, SyncMetadata};
use super::sync_traits::SyncMetadataRepositoryTrait;
use crate::errors::Result;
use crate::utils::clock::{millis_to_rfc3339, Clock};

/// True when no sync happened yet, the minimum interval has elapsed, or the
/// clock moved backwards past the last stamp.
pub fn is_sync_due(last_synced_at: Option<i64>, now_millis: i64, min_interval_ms: i64) -> bool {
    match last_synced_at {
        None => true,
        Some(last) => {
            let elapsed = now_millis - last;
            elapsed < 0 || elapsed >= min_interval_ms
        }
    }
}

pub struct SyncIntervalGate {
    repository: Arc<dyn SyncMetadataRepositoryTrait>,
    clock: Arc<dyn Clock>,
    min_interval_ms: i64,
}

impl SyncIntervalGate {
    pub fn new(
        repository: Arc<dyn SyncMetadataRepositoryTrait>,
        clock: Arc<dyn Clock>,
        min_interval_ms: i64,
    ) -> Self {
        Self {
            repository,
            clock,
            min_interval_ms,
        }
    }

    pub fn min_interval_ms(&self) -> i64 {
        self.min_interval_ms
    }

    pub fn get_sync_metadata(
        &self,
        data_type: &str,
        user_id: Option<&str>,
        date: Option<&str>,
    ) -> Result<Option<SyncMetadata>> {
        self.repository
            .get(&sync_metadata_key(data_type, user_id, date))
    }

    /// Stamp `last_synced_at = now` for the combination.
    pub async fn set_sync_metadata(
        &self,
        data_type: &str,
        user_id: Option<&str>,
        date: Option<&str>,
    ) -> Result<SyncMetadata> {
        self.set_sync_metadata_at(data_type, user_id, date, self.clock.now_millis())
            .await
    }

    /// Stamp an explicit `last_synced_at`. Delta fetches stamp the moment the
    /// fetch started so the next `since` covers changes made while it ran.
    pub async fn set_sync_metadata_at(
        &self,
        data_type: &str,
        user_id: Option<&str>,
        date: Option<&str>,
        synced_at_millis: i64,
    ) -> Result<SyncMetadata> {
        let metadata = SyncMetadata {
            id: sync_metadata_key(data_type, user_id, date),
            last_synced_at: synced_at_millis,
            data_type: data_type.to_string(),
            user_id: non_empty(user_id),
            date: non_empty(date),
        };
        let saved = self.repository.upsert(metadata).await?;
        log::debug!("[SyncGate] Stamped {} at {}", saved.id, saved.last_synced_at);
        Ok(saved)
    }

    pub fn should_sync(
        &self,
        data_type: &str,
        user_id: Option<&str>,
        date: Option<&str>,
    ) -> Result<bool> {
        let last = self
            .get_sync_metadata(data_type, user_id, date)?
            .map(|m| m.last_synced_at);
        let due = is_sync_due(last, self.clock.now_millis(), self.min_interval_ms);
        if !due {
            log::debug!(
                "[SyncGate] Skipping {}: synced less than {} ms ago",
                sync_metadata_key(data_type, user_id, date),
                self.min_interval_ms
            );
        }
        Ok(due)
    }

    /// Last sync as an RFC 3339 string.
    pub fn get_last_sync_timestamp(
        &self,
        data_type: &str,
        user_id: Option<&str>,
        date: Option<&str>,
    ) -> Result<Option<String>> {
        Ok(self
            .get_sync_metadata(data_type, user_id, date)?
            .map(|m| millis_to_rfc3339(m.last_synced_at)))
    }

    pub fn list(&self) -> Result<Vec<SyncMetadata>> {
        self.repository.list()
    }

    pub async fn clear_all(&self) -> Result<usize> {
        self.repository.clear_all().await
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value.filter(|v| !v.is_empty()).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn due_when_never_synced() {
        assert!(is_sync_due(None, 0, 300_000));
    }

    #[test]
    fn due_exactly_at_the_interval_boundary() {
        assert!(!is_sync_due(Some(1_000), 300_999, 300_000));
        assert!(is_sync_due(Some(1_000), 301_000, 300_000));
    }

    #[test]
    fn backwards_clock_counts_as_due() {
        assert!(is_sync_due(Some(10_000), 5_000, 300_000));
    }
}
