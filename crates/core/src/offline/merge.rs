//! Reconciliation of server deltas into local stores.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use super::offline_model::{Record, VISITS_STORE};
use crate::errors::{Error, Result, ValidationError};

/// Marker fields a server delta may never clear.
///
/// `_synced` on a visit means its local write is confirmed applied remotely.
pub const LOCALLY_AUTHORITATIVE_FLAGS: &[(&str, &str)] = &[(VISITS_STORE, "_synced")];

pub fn authoritative_flags(store: &str) -> impl Iterator<Item = &'static str> + '_ {
    LOCALLY_AUTHORITATIVE_FLAGS
        .iter()
        .filter(move |(flag_store, _)| *flag_store == store)
        .map(|(_, flag)| *flag)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeChange {
    Inserted,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MergedRecord {
    pub record: Record,
    pub change: MergeChange,
    pub preserved_flags: usize,
}

/// Incoming record wins as a whole, except for authoritative flags that the
/// existing record already holds.
pub fn merge_record(store: &str, existing: Option<&Record>, incoming: Record) -> MergedRecord {
    let mut merged = incoming;
    let mut preserved_flags = 0;

    if let Some(existing) = existing {
        for flag in authoritative_flags(store) {
            if existing.flag(flag) && !merged.flag(flag) {
                merged.insert(flag, Value::Bool(true));
                preserved_flags += 1;
            }
        }
    }

    let change = match existing {
        None => MergeChange::Inserted,
        Some(current) if *current == merged => MergeChange::Unchanged,
        Some(_) => MergeChange::Updated,
    };

    MergedRecord {
        record: merged,
        change,
        preserved_flags,
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeReport {
    pub inserted: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub preserved_flags: usize,
}

impl MergeReport {
    pub fn record(&mut self, merged: &MergedRecord) {
        match merged.change {
            MergeChange::Inserted => self.inserted += 1,
            MergeChange::Updated => self.updated += 1,
            MergeChange::Unchanged => self.unchanged += 1,
        }
        self.preserved_flags += merged.preserved_flags;
    }

    pub fn total(&self) -> usize {
        self.inserted + self.updated + self.unchanged
    }

    pub fn written(&self) -> usize {
        self.inserted + self.updated
    }

    pub fn absorb(&mut self, other: &MergeReport) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.unchanged += other.unchanged;
        self.preserved_flags += other.preserved_flags;
    }
}

/// Result of merging a batch into an id-keyed collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergeBatch {
    pub report: MergeReport,
    /// Ids whose stored value changed, in first-seen order.
    pub changed: Vec<String>,
}

/// Merge `incoming` into `current` in place.
///
/// Every incoming item must carry an id; otherwise nothing is applied. Records
/// absent from `incoming` are left alone. A later duplicate id in the same batch
/// merges over the earlier one.
pub fn merge_into(
    store: &str,
    current: &mut HashMap<String, Record>,
    incoming: Vec<Record>,
) -> Result<MergeBatch> {
    let keyed = incoming
        .into_iter()
        .map(|record| {
            record
                .id()
                .map(|id| (id, record))
                .ok_or_else(|| Error::from(ValidationError::MissingField(format!("{}.id", store))))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut batch = MergeBatch::default();
    let mut seen = HashSet::new();

    for (id, record) in keyed {
        let merged = merge_record(store, current.get(&id), record);
        batch.report.record(&merged);
        if merged.change != MergeChange::Unchanged {
            if seen.insert(id.clone()) {
                batch.changed.push(id.clone());
            }
            current.insert(id, merged.record);
        }
    }

    Ok(batch)
}
