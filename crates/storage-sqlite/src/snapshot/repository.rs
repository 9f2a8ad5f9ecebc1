use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::sqlite::Sqlite;
use diesel::SqliteConnection;
use serde_json::Value;
use std::sync::Arc;

use fieldsync_core::offline::{SnapshotCacheEntry, SnapshotCacheRepositoryTrait};
use fieldsync_core::utils::clock::{Clock, SystemClock};
use fieldsync_core::Result;

use super::model::SnapshotCacheDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::snapshot_cache;

pub struct SnapshotCacheRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
    clock: Arc<dyn Clock>,
}

impl SnapshotCacheRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self {
            pool,
            writer,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl SnapshotCacheRepositoryTrait for SnapshotCacheRepository {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut conn = get_connection(&self.pool)?;
        let row = snapshot_cache::table
            .find(key)
            .select(SnapshotCacheDB::as_select())
            .first::<SnapshotCacheDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(|r| r.parse_value()).transpose()
    }

    async fn put(&self, entry: SnapshotCacheEntry) -> Result<()> {
        let row = SnapshotCacheDB::from_entry(&entry, self.clock.now_millis())?;
        self.writer
            .exec(move |conn| {
                diesel::insert_into(snapshot_cache::table)
                    .values(&row)
                    .on_conflict(snapshot_cache::cache_key)
                    .do_update()
                    .set((
                        snapshot_cache::user_id.eq(&row.user_id),
                        snapshot_cache::scope_date.eq(&row.scope_date),
                        snapshot_cache::value.eq(&row.value),
                        snapshot_cache::updated_at.eq(row.updated_at),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await
    }

    async fn invalidate_scope(
        &self,
        user_id: Option<String>,
        date: Option<String>,
    ) -> Result<usize> {
        if user_id.is_none() && date.is_none() {
            return Ok(0);
        }
        let removed = self
            .writer
            .exec(move |conn| {
                let mut query = diesel::delete(snapshot_cache::table).into_boxed::<Sqlite>();
                if let Some(user) = user_id {
                    query = query.filter(snapshot_cache::user_id.eq(user));
                }
                if let Some(day) = date {
                    query = query.filter(snapshot_cache::scope_date.eq(day));
                }
                Ok(query.execute(conn).map_err(StorageError::from)?)
            })
            .await?;
        log::debug!("[OfflineStore] Invalidated {} snapshot(s)", removed);
        Ok(removed)
    }

    async fn clear_all(&self) -> Result<usize> {
        self.writer
            .exec(|conn| {
                Ok(diesel::delete(snapshot_cache::table)
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
    use fieldsync_core::offline::snapshot_cache_key;
    use serde_json::json;

    fn entry(kind: &str, user: Option<&str>, date: Option<&str>) -> SnapshotCacheEntry {
        SnapshotCacheEntry {
            key: snapshot_cache_key(kind, user, date),
            user_id: user.map(str::to_string),
            date: date.map(str::to_string),
            value: json!({ "kind": kind, "target": 12 }),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips_value() {
        let (pool, writer) = setup_test_db();
        let repo = SnapshotCacheRepository::new(pool, writer);
        let dashboard = entry("dashboard", Some("u1"), Some("2026-10-16"));

        repo.put(dashboard.clone()).await.expect("put");
        assert_eq!(repo.get(&dashboard.key).expect("get"), Some(dashboard.value));
        assert_eq!(repo.get("dashboard:u2").expect("get"), None);
    }

    #[tokio::test]
    async fn invalidate_scope_matches_every_given_part() {
        let (pool, writer) = setup_test_db();
        let repo = SnapshotCacheRepository::new(pool, writer);
        for e in [
            entry("dashboard", Some("u1"), Some("2026-10-16")),
            entry("targets", Some("u1"), Some("2026-10-15")),
            entry("dashboard", Some("u2"), Some("2026-10-16")),
            entry("catalog", None, None),
        ] {
            repo.put(e).await.expect("put");
        }

        assert_eq!(repo.invalidate_scope(None, None).await.expect("noop"), 0);
        assert_eq!(
            repo.invalidate_scope(Some("u1".into()), Some("2026-10-16".into()))
                .await
                .expect("invalidate"),
            1
        );
        assert!(repo.get("targets:u1:2026-10-15").expect("get").is_some());
        assert_eq!(
            repo.invalidate_scope(None, Some("2026-10-16".into()))
                .await
                .expect("invalidate"),
            1
        );
        assert!(repo.get("catalog").expect("get").is_some());
        assert_eq!(repo.clear_all().await.expect("clear"), 2);
    }
}
