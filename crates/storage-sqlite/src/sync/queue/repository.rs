use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use std::sync::Arc;

use fieldsync_core::sync::{
    NewSyncQueueItem, SyncQueueFailure, SyncQueueItem, SyncQueueRepositoryTrait, SyncQueueStatus,
    EXPIRED_ERROR_CODE,
};
use fieldsync_core::Result;

use super::model::{enum_to_db, NewSyncQueueItemDB, SyncQueueItemDB};
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_queue;

const EXPIRED_ERROR_MESSAGE: &str = "Evicted after exceeding the maximum queue age";

pub struct SyncQueueRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SyncQueueRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }

    fn load_by_status(
        &self,
        status: SyncQueueStatus,
        after_seq: Option<i64>,
        limit: Option<i64>,
    ) -> Result<Vec<SyncQueueItem>> {
        let mut conn = get_connection(&self.pool)?;
        let mut query = sync_queue::table
            .filter(sync_queue::status.eq(enum_to_db(&status)?))
            .order(sync_queue::seq.asc())
            .select(SyncQueueItemDB::as_select())
            .into_boxed();
        if let Some(after_seq) = after_seq {
            query = query.filter(sync_queue::seq.gt(after_seq));
        }
        if let Some(limit) = limit {
            query = query.limit(limit);
        }
        let rows = query
            .load::<SyncQueueItemDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.into_iter().map(SyncQueueItemDB::into_domain).collect()
    }

    async fn record_failure(
        &self,
        seq: i64,
        status: SyncQueueStatus,
        failure: SyncQueueFailure,
    ) -> Result<()> {
        let status = enum_to_db(&status)?;
        self.writer
            .exec(move |conn| {
                diesel::update(sync_queue::table.find(seq))
                    .set((
                        sync_queue::status.eq(status),
                        sync_queue::retry_count.eq(failure.retry_count),
                        sync_queue::next_retry_at.eq(failure.next_retry_at),
                        sync_queue::last_error.eq(Some(failure.error)),
                        sync_queue::last_error_code.eq(Some(failure.code)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl SyncQueueRepositoryTrait for SyncQueueRepository {
    async fn add_to_sync_queue(&self, item: NewSyncQueueItem) -> Result<SyncQueueItem> {
        let row = NewSyncQueueItemDB::from_domain(&item)?;
        let inserted = self
            .writer
            .exec(move |conn| {
                Ok(diesel::insert_into(sync_queue::table)
                    .values(&row)
                    .returning(SyncQueueItemDB::as_returning())
                    .get_result::<SyncQueueItemDB>(conn)
                    .map_err(StorageError::from)?)
            })
            .await?;
        inserted.into_domain()
    }

    fn get_sync_queue(&self) -> Result<Vec<SyncQueueItem>> {
        self.load_by_status(SyncQueueStatus::Pending, None, None)
    }

    fn list_pending(&self, after_seq: i64, limit: i64) -> Result<Vec<SyncQueueItem>> {
        self.load_by_status(SyncQueueStatus::Pending, Some(after_seq), Some(limit))
    }

    fn list_dead_letters(&self) -> Result<Vec<SyncQueueItem>> {
        self.load_by_status(SyncQueueStatus::Dead, None, None)
    }

    fn pending_count(&self) -> Result<i64> {
        let mut conn = get_connection(&self.pool)?;
        let pending = enum_to_db(&SyncQueueStatus::Pending)?;
        Ok(sync_queue::table
            .filter(sync_queue::status.eq(pending))
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?)
    }

    async fn clear_sync_queue(&self) -> Result<usize> {
        let pending = enum_to_db(&SyncQueueStatus::Pending)?;
        self.writer
            .exec(move |conn| {
                Ok(
                    diesel::delete(sync_queue::table.filter(sync_queue::status.eq(pending)))
                        .execute(conn)
                        .map_err(StorageError::from)?,
                )
            })
            .await
    }

    async fn delete_old_synced_items(&self, cutoff_millis: i64) -> Result<usize> {
        let pending = enum_to_db(&SyncQueueStatus::Pending)?;
        let dead = enum_to_db(&SyncQueueStatus::Dead)?;
        self.writer
            .exec(move |conn| {
                let expired = sync_queue::table
                    .filter(sync_queue::status.eq(pending))
                    .filter(sync_queue::enqueued_at.lt(cutoff_millis));
                Ok(diesel::update(expired)
                    .set((
                        sync_queue::status.eq(dead),
                        sync_queue::next_retry_at.eq(None::<i64>),
                        sync_queue::last_error.eq(Some(EXPIRED_ERROR_MESSAGE)),
                        sync_queue::last_error_code.eq(Some(EXPIRED_ERROR_CODE)),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?)
            })
            .await
    }

    async fn remove(&self, seq: i64) -> Result<bool> {
        let removed = self
            .writer
            .exec(move |conn| {
                Ok(diesel::delete(sync_queue::table.find(seq))
                    .execute(conn)
                    .map_err(StorageError::from)?)
            })
            .await?;
        Ok(removed > 0)
    }

    async fn schedule_retry(&self, seq: i64, failure: SyncQueueFailure) -> Result<()> {
        self.record_failure(seq, SyncQueueStatus::Pending, failure)
            .await
    }

    async fn mark_dead(&self, seq: i64, failure: SyncQueueFailure) -> Result<()> {
        self.record_failure(seq, SyncQueueStatus::Dead, failure)
            .await
    }

    async fn purge_dead_letters(&self, cutoff_millis: i64) -> Result<usize> {
        let dead = enum_to_db(&SyncQueueStatus::Dead)?;
        self.writer
            .exec(move |conn| {
                let stale = sync_queue::table
                    .filter(sync_queue::status.eq(dead))
                    .filter(sync_queue::enqueued_at.lt(cutoff_millis));
                Ok(diesel::delete(stale)
                    .execute(conn)
                    .map_err(StorageError::from)?)
            })
            .await
    }

    async fn clear_all(&self) -> Result<usize> {
        self.writer
            .exec(|conn| {
                Ok(diesel::delete(sync_queue::table)
                    .execute(conn)
                    .map_err(StorageError::from)?)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_test_db;
    use fieldsync_core::sync::SYNC_ACTION_PAYLOAD_VERSION;
    use serde_json::json;

    const DAY_MS: i64 = 24 * 60 * 60 * 1000;
    const NOW: i64 = 1_760_000_000_000;

    fn repository() -> SyncQueueRepository {
        let (pool, writer) = setup_test_db();
        SyncQueueRepository::new(pool, writer)
    }

    fn new_item(event_id: &str, enqueued_at: i64) -> NewSyncQueueItem {
        NewSyncQueueItem {
            event_id: event_id.to_string(),
            action: "CREATE_VISIT".to_string(),
            data: json!({ "id": event_id, "retailerId": "r1" }),
            payload_version: SYNC_ACTION_PAYLOAD_VERSION,
            timestamp: enqueued_at,
            created_at: enqueued_at,
        }
    }

    fn failure(retry_count: i32, next_retry_at: Option<i64>, code: &str) -> SyncQueueFailure {
        SyncQueueFailure {
            retry_count,
            next_retry_at,
            error: format!("{code} failure"),
            code: code.to_string(),
        }
    }

    #[tokio::test]
    async fn items_come_back_in_enqueue_order() {
        let repo = repository();
        let first = repo.add_to_sync_queue(new_item("e1", NOW)).await.expect("add");
        let second = repo.add_to_sync_queue(new_item("e2", NOW)).await.expect("add");
        let third = repo.add_to_sync_queue(new_item("e3", NOW)).await.expect("add");

        assert!(first.seq < second.seq && second.seq < third.seq);
        assert_eq!(first.status, SyncQueueStatus::Pending);
        assert_eq!(first.data, json!({ "id": "e1", "retailerId": "r1" }));

        let events: Vec<String> = repo
            .get_sync_queue()
            .expect("queue")
            .into_iter()
            .map(|i| i.event_id)
            .collect();
        assert_eq!(events, vec!["e1", "e2", "e3"]);
        assert_eq!(repo.list_pending(0, 2).expect("pending").len(), 2);
        let after_first: Vec<i64> = repo
            .list_pending(first.seq, 10)
            .expect("pending")
            .into_iter()
            .map(|i| i.seq)
            .collect();
        assert_eq!(after_first, vec![second.seq, third.seq]);
        assert_eq!(repo.pending_count().expect("count"), 3);
    }

    #[tokio::test]
    async fn duplicate_event_id_is_rejected() {
        let repo = repository();
        repo.add_to_sync_queue(new_item("e1", NOW)).await.expect("add");
        assert!(repo.add_to_sync_queue(new_item("e1", NOW)).await.is_err());
        assert_eq!(repo.pending_count().expect("count"), 1);
    }

    #[tokio::test]
    async fn age_eviction_dead_letters_only_expired_pending_items() {
        let repo = repository();
        repo.add_to_sync_queue(new_item("old", NOW - 4 * DAY_MS)).await.expect("add");
        repo.add_to_sync_queue(new_item("recent", NOW - 2 * DAY_MS)).await.expect("add");
        repo.add_to_sync_queue(new_item("fresh", NOW - 60 * 60 * 1000)).await.expect("add");

        let evicted = repo
            .delete_old_synced_items(NOW - 3 * DAY_MS)
            .await
            .expect("evict");
        assert_eq!(evicted, 1);

        let dead = repo.list_dead_letters().expect("dead");
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].event_id, "old");
        assert_eq!(dead[0].last_error_code.as_deref(), Some(EXPIRED_ERROR_CODE));
        assert_eq!(repo.pending_count().expect("count"), 2);

        assert_eq!(
            repo.delete_old_synced_items(NOW - 3 * DAY_MS).await.expect("evict again"),
            0
        );
    }

    #[tokio::test]
    async fn retry_and_dead_letter_bookkeeping() {
        let repo = repository();
        let a = repo.add_to_sync_queue(new_item("a", NOW)).await.expect("add");
        let b = repo.add_to_sync_queue(new_item("b", NOW)).await.expect("add");

        repo.schedule_retry(a.seq, failure(1, Some(NOW + 10_000), "network"))
            .await
            .expect("retry");
        repo.mark_dead(b.seq, failure(1, None, "api")).await.expect("dead");

        let pending = repo.get_sync_queue().expect("queue");
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].retry_count, 1);
        assert_eq!(pending[0].next_retry_at, Some(NOW + 10_000));
        assert!(!pending[0].is_due(NOW));
        assert_eq!(pending[0].last_error_code.as_deref(), Some("network"));

        let dead = repo.list_dead_letters().expect("dead");
        assert_eq!(dead[0].event_id, "b");
        assert_eq!(dead[0].status, SyncQueueStatus::Dead);

        assert!(repo.remove(a.seq).await.expect("remove"));
        assert!(!repo.remove(a.seq).await.expect("remove again"));
    }

    #[tokio::test]
    async fn clear_keeps_dead_letters_until_purged() {
        let repo = repository();
        let a = repo.add_to_sync_queue(new_item("a", NOW - DAY_MS)).await.expect("add");
        repo.add_to_sync_queue(new_item("b", NOW)).await.expect("add");
        repo.mark_dead(a.seq, failure(5, None, "exhausted")).await.expect("dead");

        assert_eq!(repo.clear_sync_queue().await.expect("clear"), 1);
        assert_eq!(repo.list_dead_letters().expect("dead").len(), 1);

        assert_eq!(repo.purge_dead_letters(NOW - 2 * DAY_MS).await.expect("purge"), 0);
        assert_eq!(repo.purge_dead_letters(NOW).await.expect("purge"), 1);
        assert!(repo.list_dead_letters().expect("dead").is_empty());
    }

    #[tokio::test]
    async fn clear_all_removes_every_status() {
        let repo = repository();
        let a = repo.add_to_sync_queue(new_item("a", NOW)).await.expect("add");
        repo.add_to_sync_queue(new_item("b", NOW)).await.expect("add");
        repo.mark_dead(a.seq, failure(1, None, "api")).await.expect("dead");

        assert_eq!(repo.clear_all().await.expect("clear all"), 2);
        assert_eq!(repo.pending_count().expect("count"), 0);
        assert!(repo.list_dead_letters().expect("dead").is_empty());
    }
}
