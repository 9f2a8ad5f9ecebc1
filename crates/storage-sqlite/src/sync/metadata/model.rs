use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use fieldsync_core::sync::SyncMetadata;

#[derive(
    Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone, Serialize, Deserialize,
)]
#[diesel(table_name = crate::schema::sync_metadata)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncMetadataDB {
    pub id: String,
    pub last_synced_at: i64,
    pub data_type: String,
    pub user_id: Option<String>,
    pub sync_date: Option<String>,
}

impl From<SyncMetadataDB> for SyncMetadata {
    fn from(db: SyncMetadataDB) -> Self {
        Self {
            id: db.id,
            last_synced_at: db.last_synced_at,
            data_type: db.data_type,
            user_id: db.user_id,
            date: db.sync_date,
        }
    }
}

impl From<SyncMetadata> for SyncMetadataDB {
    fn from(domain: SyncMetadata) -> Self {
        Self {
            id: domain.id,
            last_synced_at: domain.last_synced_at,
            data_type: domain.data_type,
            user_id: domain.user_id,
            sync_date: domain.date,
        }
    }
}
