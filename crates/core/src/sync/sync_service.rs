//! Entry point for local mutations and on-demand refreshes.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::interval_gate::SyncIntervalGate;
use super::sync_model::{SyncAction, SyncMetadata};
use super::sync_queue::SyncQueue;
use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityProbe, NetworkStatus};
use crate::errors::{Error, RemoteError, Result, ValidationError};
use crate::offline::{
    validate_store, MergeReport, OfflineRecordRepositoryTrait, Record, Retailer,
    SnapshotCacheRepositoryTrait, Visit,
};
use crate::remote::{apply_action, DataCategory, FetchScope, RemoteDataService};
use crate::utils::clock::{millis_to_datetime, Clock};
use crate::utils::ids::generate_record_id;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationOutcome {
    /// Stored record after the write; `None` for deletes.
    pub record: Option<Record>,
    pub queued_seq: Option<i64>,
    pub applied_remotely: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "outcome")]
pub enum RefreshOutcome {
    /// Interval gate says the data is fresh enough.
    Skipped,
    Offline,
    Refreshed { fetched: usize, report: MergeReport },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WipeReport {
    pub records: usize,
    pub queue_items: usize,
    pub metadata: usize,
    pub snapshots: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub network: NetworkStatus,
    pub pending: i64,
    pub dead_letters: usize,
    pub last_synced: Vec<SyncMetadata>,
}

pub struct OfflineSyncService {
    records: Arc<dyn OfflineRecordRepositoryTrait>,
    snapshots: Arc<dyn SnapshotCacheRepositoryTrait>,
    queue: Arc<SyncQueue>,
    gate: Arc<SyncIntervalGate>,
    remote: Arc<dyn RemoteDataService>,
    connectivity: Arc<dyn ConnectivityProbe>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
}

impl OfflineSyncService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        records: Arc<dyn OfflineRecordRepositoryTrait>,
        snapshots: Arc<dyn SnapshotCacheRepositoryTrait>,
        queue: Arc<SyncQueue>,
        gate: Arc<SyncIntervalGate>,
        remote: Arc<dyn RemoteDataService>,
        connectivity: Arc<dyn ConnectivityProbe>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            records,
            snapshots,
            queue,
            gate,
            remote,
            connectivity,
            clock,
            config,
        }
    }

    /// Write a mutation through the local store, then apply it remotely when
    /// online or queue it otherwise.
    ///
    /// A mutation also goes to the queue when an earlier mutation of the same
    /// entity is still pending, or when the direct remote write fails.
    pub async fn record_mutation(&self, mut action: SyncAction) -> Result<MutationOutcome> {
        validate_store(action.store())?;
        if action.entity_id().trim().is_empty() {
            if matches!(action, SyncAction::DeleteRecord(_)) {
                return Err(ValidationError::MissingField("id".to_string()).into());
            }
            action.set_entity_id(generate_record_id(self.clock.now_millis()));
        }

        let store = action.store().to_string();
        let entity_id = action.entity_id().to_string();

        let mut record = match action.to_record()? {
            Some(record) => Some(self.records.save(&store, record).await?),
            None => {
                self.records.delete(&store, &entity_id).await?;
                None
            }
        };

        if self.connectivity.is_online() && !self.has_pending_for(&action.entity_key())? {
            match self.apply_directly(&action).await {
                Ok(()) => {
                    if record.is_some()
                        && self
                            .records
                            .mark_locally_authoritative(&store, &entity_id)
                            .await?
                    {
                        record = self.records.get_by_id(&store, &entity_id)?;
                    }
                    return Ok(MutationOutcome {
                        record,
                        queued_seq: None,
                        applied_remotely: true,
                    });
                }
                Err(err) => {
                    log::warn!(
                        "[SyncQueue] Direct {} for {}/{} failed, queueing: {}",
                        action.name(),
                        store,
                        entity_id,
                        err
                    );
                }
            }
        }

        let item = self.queue.enqueue(&action).await?;
        Ok(MutationOutcome {
            record,
            queued_seq: Some(item.seq),
            applied_remotely: false,
        })
    }

    pub async fn create_visit(&self, visit: Visit) -> Result<MutationOutcome> {
        self.record_mutation(SyncAction::CreateVisit(visit)).await
    }

    pub async fn update_retailer(&self, retailer: Retailer) -> Result<MutationOutcome> {
        self.record_mutation(SyncAction::UpdateRetailer(retailer))
            .await
    }

    /// Fetch the category's delta since its last sync and merge it locally.
    ///
    /// `force` bypasses the interval gate, never the connectivity check.
    pub async fn refresh(
        &self,
        category: DataCategory,
        scope: &FetchScope,
        force: bool,
    ) -> Result<RefreshOutcome> {
        let scope = scope.for_category(category);
        let user_id = scope.user_id.as_deref();
        let date = scope.date.as_deref();

        if !force && !self.gate.should_sync(category.as_str(), user_id, date)? {
            return Ok(RefreshOutcome::Skipped);
        }
        if !self.connectivity.is_online() {
            return Ok(RefreshOutcome::Offline);
        }

        let since = self
            .gate
            .get_sync_metadata(category.as_str(), user_id, date)?
            .map(|m| millis_to_datetime(m.last_synced_at));

        let fetch_started = self.clock.now_millis();
        let fetched = match tokio::time::timeout(
            self.config.fetch_timeout(),
            self.remote.fetch_changes(category, &scope, since),
        )
        .await
        {
            Ok(result) => result?,
            Err(_) => {
                return Err(Error::Remote(RemoteError::timeout(
                    format!("fetch {}", category.as_str()),
                    self.config.fetch_timeout_ms,
                )))
            }
        };

        let count = fetched.len();
        let report = self.records.merge_data(category.store(), fetched).await?;
        self.gate
            .set_sync_metadata_at(category.as_str(), user_id, date, fetch_started)
            .await?;

        log::info!(
            "[RemoteData] Refreshed {}: fetched={} inserted={} updated={}",
            category.as_str(),
            count,
            report.inserted,
            report.updated
        );
        Ok(RefreshOutcome::Refreshed {
            fetched: count,
            report,
        })
    }

    /// Refresh every category the gate considers due. Failures are logged
    /// and the remaining categories still run.
    pub async fn refresh_due(&self, scope: &FetchScope) -> Vec<(DataCategory, RefreshOutcome)> {
        let mut outcomes = Vec::new();
        for category in DataCategory::ALL {
            match self.refresh(category, scope, false).await {
                Ok(RefreshOutcome::Offline) => {
                    outcomes.push((category, RefreshOutcome::Offline));
                    break;
                }
                Ok(outcome) => outcomes.push((category, outcome)),
                Err(err) => {
                    log::warn!("[RemoteData] Refresh of {} failed: {}", category.as_str(), err)
                }
            }
        }
        outcomes
    }

    /// Sign-out wipe: every store, the whole queue, metadata and snapshots.
    pub async fn wipe_local_data(&self) -> Result<WipeReport> {
        let report = WipeReport {
            records: self.records.clear_all().await?,
            queue_items: self.queue.clear_all().await?,
            metadata: self.gate.clear_all().await?,
            snapshots: self.snapshots.clear_all().await?,
        };
        log::info!(
            "[OfflineStore] Wiped local data: records={} queue={} metadata={} snapshots={}",
            report.records,
            report.queue_items,
            report.metadata,
            report.snapshots
        );
        Ok(report)
    }

    pub fn status(&self) -> Result<SyncStatus> {
        Ok(SyncStatus {
            network: self.connectivity.status(),
            pending: self.queue.pending_count()?,
            dead_letters: self.queue.list_dead_letters()?.len(),
            last_synced: self.gate.list()?,
        })
    }

    fn has_pending_for(&self, entity_key: &str) -> Result<bool> {
        Ok(self.queue.get_sync_queue()?.iter().any(|item| {
            item.decode_action()
                .map(|queued| queued.entity_key() == entity_key)
                .unwrap_or(false)
        }))
    }

    async fn apply_directly(&self, action: &SyncAction) -> std::result::Result<(), RemoteError> {
        let idempotency_key = Uuid::now_v7().to_string();
        match tokio::time::timeout(
            self.config.fetch_timeout(),
            apply_action(self.remote.as_ref(), action, &idempotency_key),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(RemoteError::timeout(
                action.name(),
                self.config.fetch_timeout_ms,
            )),
        }
    }
}
