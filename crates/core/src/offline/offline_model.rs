//! Record and store models for the local durable store.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{Error, Result, ValidationError};

/// Prefix of every persisted store key (`offline_visits`, ...).
pub const OFFLINE_STORE_PREFIX: &str = "offline_";

pub const PRODUCTS_STORE: &str = "products";
pub const PRODUCT_VARIANTS_STORE: &str = "product_variants";
pub const SCHEMES_STORE: &str = "schemes";
pub const CATEGORIES_STORE: &str = "categories";
pub const BEATS_STORE: &str = "beats";
pub const RETAILERS_STORE: &str = "retailers";
pub const BEAT_PLANS_STORE: &str = "beat_plans";
pub const COMPETITION_DATA_STORE: &str = "competition_data";
pub const VISITS_STORE: &str = "visits";
pub const ORDERS_STORE: &str = "orders";

/// Canonical list of stores the engine persists.
///
/// Writes to any other store name are rejected, and sign-out wipes exactly this
/// list, so a new store must be added here to exist at all.
pub const OFFLINE_STORES: [&str; 10] = [
    PRODUCTS_STORE,
    PRODUCT_VARIANTS_STORE,
    SCHEMES_STORE,
    CATEGORIES_STORE,
    BEATS_STORE,
    RETAILERS_STORE,
    BEAT_PLANS_STORE,
    COMPETITION_DATA_STORE,
    VISITS_STORE,
    ORDERS_STORE,
];

pub fn validate_store(store: &str) -> Result<()> {
    if OFFLINE_STORES.contains(&store) {
        return Ok(());
    }
    Err(Error::Validation(ValidationError::UnknownStore(
        store.to_string(),
    )))
}

/// Persisted key for a store.
pub fn store_key(store: &str) -> String {
    format!("{}{}", OFFLINE_STORE_PREFIX, store)
}

/// A persisted entity: a JSON object with a mandatory `id`, unique per store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    pub fn new() -> Self {
        Self(Map::new())
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(fields) => Ok(Self(fields)),
            other => Err(Error::Validation(ValidationError::InvalidInput(format!(
                "Record must be a JSON object, got {}",
                json_kind(&other)
            )))),
        }
    }

    pub fn from_typed<T: Serialize>(value: &T) -> Result<Self> {
        Self::from_value(serde_json::to_value(value)?)
    }

    pub fn to_typed<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }

    /// Record id; numeric ids coming from the server are accepted as strings.
    pub fn id(&self) -> Option<String> {
        match self.0.get("id") {
            Some(Value::String(v)) if !v.trim().is_empty() => Some(v.clone()),
            Some(Value::Number(v)) => Some(v.to_string()),
            _ => None,
        }
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.0.insert("id".to_string(), Value::String(id.into()));
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(field.into(), value)
    }

    /// True only when the field holds the JSON boolean `true`.
    pub fn flag(&self, field: &str) -> bool {
        matches!(self.0.get(field), Some(Value::Bool(true)))
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Field visit to a retailer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    #[serde(default)]
    pub id: String,
    pub retailer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_date: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    #[serde(default)]
    pub id: String,
    pub retailer_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visit_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Retailer {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beat_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A beat: the route a field user walks on a given day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Beat {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Precomputed per-user/per-day state (dashboards, daily targets).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotCacheEntry {
    pub key: String,
    pub user_id: Option<String>,
    pub date: Option<String>,
    pub value: Value,
}

pub fn snapshot_cache_key(kind: &str, user_id: Option<&str>, date: Option<&str>) -> String {
    let mut key = kind.to_string();
    for part in [user_id, date].into_iter().flatten() {
        if !part.is_empty() {
            key.push(':');
            key.push_str(part);
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_store_is_rejected() {
        assert!(validate_store(VISITS_STORE).is_ok());
        let err = validate_store("offline_visits").unwrap_err();
        assert!(err.to_string().contains("offline_visits"));
    }

    #[test]
    fn store_key_uses_offline_prefix() {
        assert_eq!(store_key(VISITS_STORE), "offline_visits");
    }

    #[test]
    fn record_id_accepts_strings_and_numbers() {
        let text = Record::from_value(json!({ "id": "r1" })).expect("record");
        assert_eq!(text.id().as_deref(), Some("r1"));

        let numeric = Record::from_value(json!({ "id": 42 })).expect("record");
        assert_eq!(numeric.id().as_deref(), Some("42"));

        let blank = Record::from_value(json!({ "id": "  " })).expect("record");
        assert_eq!(blank.id(), None);
    }

    #[test]
    fn non_object_values_are_not_records() {
        assert!(Record::from_value(json!(["id", "r1"])).is_err());
    }

    #[test]
    fn flag_requires_literal_true() {
        let record =
            Record::from_value(json!({ "id": "v1", "_synced": "true", "done": true })).expect("record");
        assert!(!record.flag("_synced"));
        assert!(record.flag("done"));
    }

    #[test]
    fn typed_visit_keeps_unknown_fields() {
        let record = Record::from_value(json!({
            "id": "v1",
            "retailerId": "r1",
            "status": "planned",
            "_synced": true,
            "geo": { "lat": 1.5 }
        }))
        .expect("record");

        let visit: Visit = record.to_typed().expect("typed visit");
        assert_eq!(visit.retailer_id, "r1");
        assert_eq!(visit.extra.get("_synced"), Some(&json!(true)));

        let back = Record::from_typed(&visit).expect("back to record");
        assert_eq!(back, record);
    }

    #[test]
    fn snapshot_cache_key_skips_missing_parts() {
        assert_eq!(
            snapshot_cache_key("dashboard", Some("u1"), Some("2026-10-16")),
            "dashboard:u1:2026-10-16"
        );
        assert_eq!(snapshot_cache_key("dashboard", None, Some("2026-10-16")), "dashboard:2026-10-16");
    }
}
