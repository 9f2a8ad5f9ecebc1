use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use std::collections::HashMap;
use std::sync::Arc;

use fieldsync_core::offline::{
    authoritative_flags, merge_into, store_key, validate_store, MergeReport,
    OfflineRecordRepositoryTrait, Record, OFFLINE_STORES,
};
use fieldsync_core::utils::clock::{Clock, SystemClock};
use fieldsync_core::utils::ids::generate_record_id;
use fieldsync_core::Result;

use super::model::OfflineRecordDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::offline_records;

/// SQLite bound on host parameters per statement is generous, but keep
/// `IN (...)` lists short.
const ID_CHUNK_SIZE: usize = 500;

pub struct OfflineRecordRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
    clock: Arc<dyn Clock>,
}

impl OfflineRecordRepository {
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

fn upsert_row(conn: &mut SqliteConnection, row: &OfflineRecordDB) -> Result<()> {
    diesel::insert_into(offline_records::table)
        .values(row)
        .on_conflict((offline_records::store_key, offline_records::record_id))
        .do_update()
        .set((
            offline_records::data.eq(&row.data),
            offline_records::updated_at.eq(row.updated_at),
        ))
        .execute(conn)
        .map_err(StorageError::from)?;
    Ok(())
}

fn load_existing(
    conn: &mut SqliteConnection,
    key: &str,
    ids: &[String],
) -> Result<HashMap<String, Record>> {
    let mut current = HashMap::with_capacity(ids.len());
    for chunk in ids.chunks(ID_CHUNK_SIZE) {
        let rows = offline_records::table
            .filter(offline_records::store_key.eq(key))
            .filter(offline_records::record_id.eq_any(chunk))
            .select(OfflineRecordDB::as_select())
            .load::<OfflineRecordDB>(conn)
            .map_err(StorageError::from)?;
        for row in rows {
            current.insert(row.record_id.clone(), row.to_record()?);
        }
    }
    Ok(current)
}

#[async_trait]
impl OfflineRecordRepositoryTrait for OfflineRecordRepository {
    fn get_by_id(&self, store: &str, id: &str) -> Result<Option<Record>> {
        validate_store(store)?;
        let mut conn = get_connection(&self.pool)?;
        let row = offline_records::table
            .find((store_key(store), id))
            .select(OfflineRecordDB::as_select())
            .first::<OfflineRecordDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        row.map(|r| r.to_record()).transpose()
    }

    fn get_all(&self, store: &str) -> Result<Vec<Record>> {
        validate_store(store)?;
        let mut conn = get_connection(&self.pool)?;
        let rows = offline_records::table
            .filter(offline_records::store_key.eq(store_key(store)))
            .order(offline_records::record_id.asc())
            .select(OfflineRecordDB::as_select())
            .load::<OfflineRecordDB>(&mut conn)
            .map_err(StorageError::from)?;
        rows.iter().map(OfflineRecordDB::to_record).collect()
    }

    fn count(&self, store: &str) -> Result<i64> {
        validate_store(store)?;
        let mut conn = get_connection(&self.pool)?;
        let total = offline_records::table
            .filter(offline_records::store_key.eq(store_key(store)))
            .count()
            .get_result::<i64>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(total)
    }

    async fn save(&self, store: &str, mut record: Record) -> Result<Record> {
        validate_store(store)?;
        let now = self.clock.now_millis();
        let id_value = match record.id() {
            Some(existing) => existing,
            None => {
                let generated = generate_record_id(now);
                record.set_id(generated.clone());
                generated
            }
        };
        let row = OfflineRecordDB::from_record(&store_key(store), &id_value, &record, now)?;

        self.writer
            .exec(move |conn| {
                upsert_row(conn, &row)?;
                Ok(())
            })
            .await?;
        Ok(record)
    }

    async fn delete(&self, store: &str, id: &str) -> Result<bool> {
        validate_store(store)?;
        let key = store_key(store);
        let target = id.to_string();
        let removed = self
            .writer
            .exec(move |conn| {
                Ok(diesel::delete(offline_records::table.find((key, target)))
                    .execute(conn)
                    .map_err(StorageError::from)?)
            })
            .await?;
        Ok(removed > 0)
    }

    async fn clear(&self, store: &str) -> Result<usize> {
        validate_store(store)?;
        let key = store_key(store);
        self.writer
            .exec(move |conn| {
                let rows = offline_records::table.filter(offline_records::store_key.eq(key));
                Ok(diesel::delete(rows)
                    .execute(conn)
                    .map_err(StorageError::from)?)
            })
            .await
    }

    async fn clear_all(&self) -> Result<usize> {
        let keys: Vec<String> = OFFLINE_STORES.iter().map(|s| store_key(s)).collect();
        self.writer
            .exec(move |conn| {
                let rows = offline_records::table.filter(offline_records::store_key.eq_any(keys));
                Ok(diesel::delete(rows)
                    .execute(conn)
                    .map_err(StorageError::from)?)
            })
            .await
    }

    async fn merge_data(&self, store: &str, items: Vec<Record>) -> Result<MergeReport> {
        validate_store(store)?;
        if items.is_empty() {
            return Ok(MergeReport::default());
        }
        let store_name = store.to_string();
        let key = store_key(store);
        let now = self.clock.now_millis();

        let report = self
            .writer
            .exec(move |conn| {
                let ids: Vec<String> = items.iter().filter_map(Record::id).collect();
                let mut current = load_existing(conn, &key, &ids)?;
                let batch = merge_into(&store_name, &mut current, items)?;
                for changed_id in &batch.changed {
                    if let Some(record) = current.get(changed_id) {
                        let row = OfflineRecordDB::from_record(&key, changed_id, record, now)?;
                        upsert_row(conn, &row)?;
                    }
                }
                Ok(batch.report)
            })
            .await?;

        log::debug!(
            "[OfflineStore] Merged into {}: inserted={} updated={} unchanged={} preserved_flags={}",
            store,
            report.inserted,
            report.updated,
            report.unchanged,
            report.preserved_flags
        );
        Ok(report)
    }

    async fn mark_locally_authoritative(&self, store: &str, id: &str) -> Result<bool> {
        validate_store(store)?;
        let flags: Vec<&'static str> = authoritative_flags(store).collect();
        if flags.is_empty() {
            return Ok(false);
        }
        let key = store_key(store);
        let target = id.to_string();
        let now = self.clock.now_millis();

        self.writer
            .exec(move |conn| {
                let row = offline_records::table
                    .find((&key, &target))
                    .select(OfflineRecordDB::as_select())
                    .first::<OfflineRecordDB>(conn)
                    .optional()
                    .map_err(StorageError::from)?;
                let Some(row) = row else {
                    return Ok(false);
                };
                let mut record = row.to_record()?;
                if flags.iter().all(|flag| record.flag(flag)) {
                    return Ok(true);
                }
                for flag in &flags {
                    record.insert(*flag, serde_json::Value::Bool(true));
                }
                upsert_row(conn, &OfflineRecordDB::from_record(&key, &target, &record, now)?)?;
                Ok(true)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_test_db;
    use fieldsync_core::errors::{Error, ValidationError};
    use fieldsync_core::offline::{RETAILERS_STORE, VISITS_STORE};
    use fieldsync_core::utils::clock::ManualClock;
    use serde_json::{json, Value};

    const NOW: i64 = 1_760_000_000_000;

    fn repository() -> OfflineRecordRepository {
        let (pool, writer) = setup_test_db();
        OfflineRecordRepository::new(pool, writer).with_clock(Arc::new(ManualClock::new(NOW)))
    }

    fn record(value: Value) -> Record {
        Record::from_value(value).expect("record")
    }

    #[tokio::test]
    async fn saved_record_reads_back_equal() {
        let repo = repository();
        let visit = record(json!({
            "id": "v1",
            "retailerId": "r1",
            "lines": [{ "sku": "A", "qty": 3 }],
            "notes": null
        }));

        repo.save(VISITS_STORE, visit.clone()).await.expect("save");

        let loaded = repo.get_by_id(VISITS_STORE, "v1").expect("get").expect("present");
        assert_eq!(loaded, visit);
        assert!(repo.get_by_id(VISITS_STORE, "missing").expect("get").is_none());
    }

    #[tokio::test]
    async fn save_generates_missing_id() {
        let repo = repository();
        let saved = repo
            .save(RETAILERS_STORE, record(json!({ "name": "Acme" })))
            .await
            .expect("save");

        let id_value = saved.id().expect("generated id");
        assert!(id_value.starts_with(&NOW.to_string()));
        assert_eq!(repo.count(RETAILERS_STORE).expect("count"), 1);
    }

    #[tokio::test]
    async fn save_upserts_by_id() {
        let repo = repository();
        repo.save(VISITS_STORE, record(json!({ "id": "v1", "status": "planned" })))
            .await
            .expect("save");
        repo.save(VISITS_STORE, record(json!({ "id": "v1", "status": "done" })))
            .await
            .expect("save");

        let all = repo.get_all(VISITS_STORE).expect("all");
        assert_eq!(all, vec![record(json!({ "id": "v1", "status": "done" }))]);
    }

    #[tokio::test]
    async fn unknown_store_is_rejected_before_touching_storage() {
        let repo = repository();
        let err = repo
            .save("invoices", record(json!({ "id": "i1" })))
            .await
            .expect_err("unknown store");
        assert!(matches!(err, Error::Validation(ValidationError::UnknownStore(_))));
        assert!(repo.get_all("invoices").is_err());
    }

    #[tokio::test]
    async fn stores_are_isolated() {
        let repo = repository();
        repo.save(VISITS_STORE, record(json!({ "id": "x" }))).await.expect("save");
        repo.save(RETAILERS_STORE, record(json!({ "id": "x" }))).await.expect("save");

        assert_eq!(repo.clear(VISITS_STORE).await.expect("clear"), 1);
        assert_eq!(repo.count(VISITS_STORE).expect("count"), 0);
        assert_eq!(repo.count(RETAILERS_STORE).expect("count"), 1);

        assert!(!repo.delete(VISITS_STORE, "x").await.expect("delete absent"));
        assert!(repo.delete(RETAILERS_STORE, "x").await.expect("delete"));
    }

    #[tokio::test]
    async fn clear_all_wipes_every_store() {
        let repo = repository();
        for store in OFFLINE_STORES {
            repo.save(store, record(json!({ "id": "1" }))).await.expect("save");
        }
        assert_eq!(repo.clear_all().await.expect("clear all"), OFFLINE_STORES.len());
        for store in OFFLINE_STORES {
            assert_eq!(repo.count(store).expect("count"), 0);
        }
    }

    #[tokio::test]
    async fn merge_keeps_synced_flag_and_unlisted_records() {
        let repo = repository();
        repo.save(VISITS_STORE, record(json!({ "id": "v1", "_synced": true, "status": "planned" })))
            .await
            .expect("save");
        repo.save(VISITS_STORE, record(json!({ "id": "v2", "status": "planned" })))
            .await
            .expect("save");

        let report = repo
            .merge_data(
                VISITS_STORE,
                vec![
                    record(json!({ "id": "v1", "status": "completed" })),
                    record(json!({ "id": "v3", "status": "planned" })),
                ],
            )
            .await
            .expect("merge");

        assert_eq!(report.inserted, 1);
        assert_eq!(report.updated, 1);
        assert_eq!(report.preserved_flags, 1);
        assert_eq!(
            repo.get_by_id(VISITS_STORE, "v1").expect("get"),
            Some(record(json!({ "id": "v1", "_synced": true, "status": "completed" })))
        );
        assert_eq!(repo.count(VISITS_STORE).expect("count"), 3);
    }

    #[tokio::test]
    async fn repeated_merge_is_idempotent() {
        let repo = repository();
        let delta = vec![record(json!({ "id": "r1", "name": "Acme" }))];
        repo.merge_data(RETAILERS_STORE, delta.clone()).await.expect("merge");
        let second = repo.merge_data(RETAILERS_STORE, delta).await.expect("merge");

        assert_eq!(second.unchanged, 1);
        assert_eq!(second.written(), 0);
    }

    #[tokio::test]
    async fn merge_with_missing_id_applies_nothing() {
        let repo = repository();
        repo.save(RETAILERS_STORE, record(json!({ "id": "r1", "name": "Old" })))
            .await
            .expect("save");

        let result = repo
            .merge_data(
                RETAILERS_STORE,
                vec![
                    record(json!({ "id": "r1", "name": "New" })),
                    record(json!({ "name": "No id" })),
                ],
            )
            .await;

        assert!(matches!(
            result,
            Err(Error::Validation(ValidationError::MissingField(_)))
        ));
        assert_eq!(
            repo.get_by_id(RETAILERS_STORE, "r1").expect("get"),
            Some(record(json!({ "id": "r1", "name": "Old" })))
        );
    }

    #[tokio::test]
    async fn concurrent_saves_lose_no_updates() {
        let repo = Arc::new(repository());
        let writes = (0..40).map(|i| {
            let repo = repo.clone();
            tokio::spawn(async move {
                repo.save(VISITS_STORE, record(json!({ "id": format!("v{i}") })))
                    .await
            })
        });
        for result in futures::future::join_all(writes).await {
            result.expect("join").expect("save");
        }
        assert_eq!(repo.count(VISITS_STORE).expect("count"), 40);
    }

    #[tokio::test]
    async fn concurrent_merge_and_flagging_both_land() {
        let repo = Arc::new(repository());
        repo.save(VISITS_STORE, record(json!({ "id": "v1", "status": "planned" })))
            .await
            .expect("save");

        let merge = {
            let repo = repo.clone();
            tokio::spawn(async move {
                repo.merge_data(VISITS_STORE, vec![record(json!({ "id": "v1", "status": "done" }))])
                    .await
            })
        };
        let flag = {
            let repo = repo.clone();
            tokio::spawn(async move { repo.mark_locally_authoritative(VISITS_STORE, "v1").await })
        };
        merge.await.expect("join").expect("merge");
        assert!(flag.await.expect("join").expect("flag"));

        let stored = repo.get_by_id(VISITS_STORE, "v1").expect("get").expect("present");
        assert!(stored.flag("_synced"));
        assert_eq!(stored.get("status"), Some(&json!("done")));
    }

    #[tokio::test]
    async fn marking_requires_store_flags_and_existing_record() {
        let repo = repository();
        repo.save(RETAILERS_STORE, record(json!({ "id": "r1" }))).await.expect("save");

        assert!(!repo
            .mark_locally_authoritative(RETAILERS_STORE, "r1")
            .await
            .expect("mark"));
        assert!(!repo
            .mark_locally_authoritative(VISITS_STORE, "absent")
            .await
            .expect("mark"));
    }
}
