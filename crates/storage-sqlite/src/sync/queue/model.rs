//! Database models for the sync queue.

use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use fieldsync_core::sync::{NewSyncQueueItem, SyncQueueItem, SyncQueueStatus};
use fieldsync_core::Result;

use crate::errors::StorageError;

pub(crate) fn enum_to_db<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)
        .map_err(StorageError::from)?
        .trim_matches('"')
        .to_string())
}

pub(crate) fn enum_from_db<T: serde::de::DeserializeOwned>(value: &str) -> Result<T> {
    Ok(serde_json::from_str(&format!("\"{}\"", value)).map_err(StorageError::from)?)
}

#[derive(Queryable, Identifiable, Selectable, Debug, Clone, Serialize, Deserialize)]
#[diesel(table_name = crate::schema::sync_queue)]
#[diesel(primary_key(seq))]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct SyncQueueItemDB {
    pub seq: i64,
    pub event_id: String,
    pub action: String,
    pub data: String,
    pub payload_version: i32,
    pub enqueued_at: i64,
    pub created_at: i64,
    pub retry_count: i32,
    pub status: String,
    pub next_retry_at: Option<i64>,
    pub last_error: Option<String>,
    pub last_error_code: Option<String>,
}

#[derive(Insertable, Debug, Clone)]
#[diesel(table_name = crate::schema::sync_queue)]
pub struct NewSyncQueueItemDB {
    pub event_id: String,
    pub action: String,
    pub data: String,
    pub payload_version: i32,
    pub enqueued_at: i64,
    pub created_at: i64,
    pub retry_count: i32,
    pub status: String,
}

impl NewSyncQueueItemDB {
    pub fn from_domain(item: &NewSyncQueueItem) -> Result<Self> {
        Ok(Self {
            event_id: item.event_id.clone(),
            action: item.action.clone(),
            data: serde_json::to_string(&item.data).map_err(StorageError::from)?,
            payload_version: item.payload_version,
            enqueued_at: item.timestamp,
            created_at: item.created_at,
            retry_count: 0,
            status: enum_to_db(&SyncQueueStatus::Pending)?,
        })
    }
}

impl SyncQueueItemDB {
    pub fn into_domain(self) -> Result<SyncQueueItem> {
        Ok(SyncQueueItem {
            seq: self.seq,
            event_id: self.event_id,
            action: self.action,
            data: serde_json::from_str(&self.data).map_err(StorageError::from)?,
            payload_version: self.payload_version,
            timestamp: self.enqueued_at,
            created_at: self.created_at,
            retry_count: self.retry_count,
            status: enum_from_db(&self.status)?,
            next_retry_at: self.next_retry_at,
            last_error: self.last_error,
            last_error_code: self.last_error_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_is_stored_without_quotes() {
        assert_eq!(enum_to_db(&SyncQueueStatus::Dead).expect("to db"), "dead");
        let status: SyncQueueStatus = enum_from_db("pending").expect("from db");
        assert_eq!(status, SyncQueueStatus::Pending);
        assert!(enum_from_db::<SyncQueueStatus>("archived").is_err());
    }
}
