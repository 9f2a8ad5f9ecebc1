use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use fieldsync_core::offline::SnapshotCacheEntry;
use fieldsync_core::Result;

use crate::errors::StorageError;

#[derive(
    Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone, Serialize, Deserialize,
)]
#[diesel(table_name = crate::schema::snapshot_cache)]
#[diesel(primary_key(cache_key))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SnapshotCacheDB {
    pub cache_key: String,
    pub user_id: Option<String>,
    pub scope_date: Option<String>,
    pub value: String,
    pub updated_at: i64,
}

impl SnapshotCacheDB {
    pub fn from_entry(entry: &SnapshotCacheEntry, now: i64) -> Result<Self> {
        Ok(Self {
            cache_key: entry.key.clone(),
            user_id: entry.user_id.clone(),
            scope_date: entry.date.clone(),
            value: serde_json::to_string(&entry.value).map_err(StorageError::from)?,
            updated_at: now,
        })
    }

    pub fn parse_value(&self) -> Result<serde_json::Value> {
        Ok(serde_json::from_str(&self.value).map_err(StorageError::from)?)
    }
}
