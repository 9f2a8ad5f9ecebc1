use async_trait::async_trait;
use diesel::prelude::*;
use diesel::r2d2::{self, Pool};
use diesel::SqliteConnection;
use std::sync::Arc;

use fieldsync_core::sync::{SyncMetadata, SyncMetadataRepositoryTrait};
use fieldsync_core::Result;

use super::model::SyncMetadataDB;
use crate::db::{get_connection, WriteHandle};
use crate::errors::StorageError;
use crate::schema::sync_metadata;

pub struct SyncMetadataRepository {
    pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
    writer: WriteHandle,
}

impl SyncMetadataRepository {
    pub fn new(
        pool: Arc<Pool<r2d2::ConnectionManager<SqliteConnection>>>,
        writer: WriteHandle,
    ) -> Self {
        Self { pool, writer }
    }
}

#[async_trait]
impl SyncMetadataRepositoryTrait for SyncMetadataRepository {
    fn get(&self, id: &str) -> Result<Option<SyncMetadata>> {
        let mut conn = get_connection(&self.pool)?;
        let row = sync_metadata::table
            .find(id)
            .select(SyncMetadataDB::as_select())
            .first::<SyncMetadataDB>(&mut conn)
            .optional()
            .map_err(StorageError::from)?;
        Ok(row.map(SyncMetadata::from))
    }

    fn list(&self) -> Result<Vec<SyncMetadata>> {
        let mut conn = get_connection(&self.pool)?;
        let rows = sync_metadata::table
            .order(sync_metadata::id.asc())
            .select(SyncMetadataDB::as_select())
            .load::<SyncMetadataDB>(&mut conn)
            .map_err(StorageError::from)?;
        Ok(rows.into_iter().map(SyncMetadata::from).collect())
    }

    async fn upsert(&self, metadata: SyncMetadata) -> Result<SyncMetadata> {
        let row = SyncMetadataDB::from(metadata.clone());
        self.writer
            .exec(move |conn| {
                diesel::insert_into(sync_metadata::table)
                    .values(&row)
                    .on_conflict(sync_metadata::id)
                    .do_update()
                    .set((
                        sync_metadata::last_synced_at.eq(row.last_synced_at),
                        sync_metadata::data_type.eq(&row.data_type),
                        sync_metadata::user_id.eq(&row.user_id),
                        sync_metadata::sync_date.eq(&row.sync_date),
                    ))
                    .execute(conn)
                    .map_err(StorageError::from)?;
                Ok(())
            })
            .await?;
        Ok(metadata)
    }

    async fn clear_all(&self) -> Result<usize> {
        self.writer
            .exec(|conn| {
                Ok(diesel::delete(sync_metadata::table)
                    .execute(conn)
                    .map_err(StorageError::from)?)
            })
            .await
    }
}
