//! Database model for offline records.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use fieldsync_core::offline::Record;
use fieldsync_core::Result;

use crate::errors::StorageError;

#[derive(
    Queryable, Identifiable, Insertable, AsChangeset, Selectable, Debug, Clone, Serialize, Deserialize,
)]
#[diesel(table_name = crate::schema::offline_records)]
#[diesel(primary_key(store_key, record_id))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct OfflineRecordDB {
    pub store_key: String,
    pub record_id: String,
    pub data: String,
    pub updated_at: i64,
}

impl OfflineRecordDB {
    pub fn from_record(store_key: &str, record_id: &str, record: &Record, now: i64) -> Result<Self> {
        Ok(Self {
            store_key: store_key.to_string(),
            record_id: record_id.to_string(),
            data: serde_json::to_string(record).map_err(StorageError::from)?,
            updated_at: now,
        })
    }

    pub fn to_record(&self) -> Result<Record> {
        let value: serde_json::Value =
            serde_json::from_str(&self.data).map_err(StorageError::from)?;
        Record::from_value(value)
    }
}
