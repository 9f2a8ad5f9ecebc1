//! Sync queue, mutation vocabulary and sync metadata models.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::errors::{Error, Result, ValidationError};
use crate::offline::{
    Beat, Order, Record, Retailer, Visit, BEATS_STORE, ORDERS_STORE, RETAILERS_STORE, VISITS_STORE,
};

/// Payload schema version written with every queued mutation.
pub const SYNC_ACTION_PAYLOAD_VERSION: i32 = 1;

/// Error code of items evicted by age.
pub const EXPIRED_ERROR_CODE: &str = "expired";
/// Error code of items whose action/payload could not be decoded.
pub const DECODE_ERROR_CODE: &str = "decode_error";
/// Error code of items that ran out of drain attempts.
pub const EXHAUSTED_ERROR_CODE: &str = "exhausted";

/// Queue item lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncQueueStatus {
    Pending,
    Dead,
}

/// One pending local mutation awaiting remote confirmation.
///
/// The queue stores `action`/`data` as given; decoding into [`SyncAction`]
/// happens at drain time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncQueueItem {
    /// Enqueue order.
    pub seq: i64,
    /// Idempotency key presented to the remote service.
    pub event_id: String,
    pub action: String,
    pub data: Value,
    pub payload_version: i32,
    pub timestamp: i64,
    pub created_at: i64,
    pub retry_count: i32,
    pub status: SyncQueueStatus,
    pub next_retry_at: Option<i64>,
    pub last_error: Option<String>,
    pub last_error_code: Option<String>,
}

impl SyncQueueItem {
    pub fn decode_action(&self) -> Result<SyncAction> {
        if self.payload_version != SYNC_ACTION_PAYLOAD_VERSION {
            return Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Unsupported payload version {} for {}",
                self.payload_version, self.action
            ))));
        }
        SyncAction::from_parts(&self.action, self.data.clone())
    }

    pub fn is_due(&self, now_millis: i64) -> bool {
        self.next_retry_at.map_or(true, |at| at <= now_millis)
    }
}

/// Insert model for the sync queue.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSyncQueueItem {
    pub event_id: String,
    pub action: String,
    pub data: Value,
    pub payload_version: i32,
    pub timestamp: i64,
    pub created_at: i64,
}

/// Failure details persisted on a queue item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncQueueFailure {
    pub retry_count: i32,
    pub next_retry_at: Option<i64>,
    pub error: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteRecordPayload {
    pub store: String,
    pub id: String,
}

/// Closed set of mutation kinds the field app queues.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncAction {
    CreateVisit(Visit),
    UpdateVisit(Visit),
    CreateOrder(Order),
    UpdateOrder(Order),
    CreateRetailer(Retailer),
    UpdateRetailer(Retailer),
    UpdateBeat(Beat),
    DeleteRecord(DeleteRecordPayload),
}

impl SyncAction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateVisit(_) => "CREATE_VISIT",
            Self::UpdateVisit(_) => "UPDATE_VISIT",
            Self::CreateOrder(_) => "CREATE_ORDER",
            Self::UpdateOrder(_) => "UPDATE_ORDER",
            Self::CreateRetailer(_) => "CREATE_RETAILER",
            Self::UpdateRetailer(_) => "UPDATE_RETAILER",
            Self::UpdateBeat(_) => "UPDATE_BEAT",
            Self::DeleteRecord(_) => "DELETE_RECORD",
        }
    }

    pub fn store(&self) -> &str {
        match self {
            Self::CreateVisit(_) | Self::UpdateVisit(_) => VISITS_STORE,
            Self::CreateOrder(_) | Self::UpdateOrder(_) => ORDERS_STORE,
            Self::CreateRetailer(_) | Self::UpdateRetailer(_) => RETAILERS_STORE,
            Self::UpdateBeat(_) => BEATS_STORE,
            Self::DeleteRecord(payload) => &payload.store,
        }
    }

    pub fn entity_id(&self) -> &str {
        match self {
            Self::CreateVisit(v) | Self::UpdateVisit(v) => &v.id,
            Self::CreateOrder(o) | Self::UpdateOrder(o) => &o.id,
            Self::CreateRetailer(r) | Self::UpdateRetailer(r) => &r.id,
            Self::UpdateBeat(b) => &b.id,
            Self::DeleteRecord(payload) => &payload.id,
        }
    }

    pub fn set_entity_id(&mut self, id: String) {
        match self {
            Self::CreateVisit(v) | Self::UpdateVisit(v) => v.id = id,
            Self::CreateOrder(o) | Self::UpdateOrder(o) => o.id = id,
            Self::CreateRetailer(r) | Self::UpdateRetailer(r) => r.id = id,
            Self::UpdateBeat(b) => b.id = id,
            Self::DeleteRecord(payload) => payload.id = id,
        }
    }

    /// Per-entity ordering key: mutations sharing it must apply in enqueue order.
    pub fn entity_key(&self) -> String {
        format!("{}/{}", self.store(), self.entity_id())
    }

    /// Record written locally and upserted remotely; `None` for deletes.
    pub fn to_record(&self) -> Result<Option<Record>> {
        let record = match self {
            Self::CreateVisit(v) | Self::UpdateVisit(v) => Record::from_typed(v)?,
            Self::CreateOrder(o) | Self::UpdateOrder(o) => Record::from_typed(o)?,
            Self::CreateRetailer(r) | Self::UpdateRetailer(r) => Record::from_typed(r)?,
            Self::UpdateBeat(b) => Record::from_typed(b)?,
            Self::DeleteRecord(_) => return Ok(None),
        };
        Ok(Some(record))
    }

    /// Split into the payload-agnostic `(action, data)` pair stored in the queue.
    pub fn to_parts(&self) -> Result<(String, Value)> {
        let data = match serde_json::to_value(self)? {
            Value::Object(mut tagged) => tagged.remove("data").unwrap_or(Value::Null),
            _ => Value::Null,
        };
        Ok((self.name().to_string(), data))
    }

    pub fn from_parts(action: &str, data: Value) -> Result<Self> {
        Ok(serde_json::from_value(json!({ "action": action, "data": data }))?)
    }
}

/// Last successful refresh of one (data type, user, date) combination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMetadata {
    pub id: String,
    pub last_synced_at: i64,
    pub data_type: String,
    pub user_id: Option<String>,
    pub date: Option<String>,
}

/// Composite metadata key: the non-empty parts joined with `_`.
pub fn sync_metadata_key(data_type: &str, user_id: Option<&str>, date: Option<&str>) -> String {
    [Some(data_type), user_id, date]
        .into_iter()
        .flatten()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("_")
}

/// Trigger source for drain passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncCycleTrigger {
    Startup,
    LocalMutation,
    Periodic,
    Manual,
}
