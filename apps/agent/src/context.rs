//! Wires storage, remote client and sync services into one context.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use fieldsync_core::connectivity::SharedConnectivity;
use fieldsync_core::errors::RemoteError;
use fieldsync_core::offline::{OfflineRecordRepositoryTrait, Record, SnapshotCacheRepositoryTrait};
use fieldsync_core::remote::{DataCategory, FetchScope, RemoteDataService};
use fieldsync_core::sync::{
    FullResyncOrchestrator, OfflineSyncService, QueueDrainer, QueueSignal, SyncIntervalGate,
    SyncQueue, SyncRuntime,
};
use fieldsync_core::utils::clock::{Clock, SystemClock};
use fieldsync_remote::FieldDataClient;
use fieldsync_storage_sqlite::{
    create_pool, init, run_migrations, spawn_writer, OfflineRecordRepository,
    SnapshotCacheRepository, SyncMetadataRepository, SyncQueueRepository,
};

use crate::config::AgentConfig;

/// Stand-in remote used when no API URL is configured.
struct UnconfiguredRemote;

#[async_trait]
impl RemoteDataService for UnconfiguredRemote {
    async fn fetch_changes(
        &self,
        _category: DataCategory,
        _scope: &FetchScope,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Record>, RemoteError> {
        Err(RemoteError::Offline)
    }

    async fn upsert_record(
        &self,
        _store: &str,
        _record: &Record,
        _idempotency_key: &str,
    ) -> Result<(), RemoteError> {
        Err(RemoteError::Offline)
    }

    async fn delete_record(
        &self,
        _store: &str,
        _id: &str,
        _idempotency_key: &str,
    ) -> Result<(), RemoteError> {
        Err(RemoteError::Offline)
    }
}

pub struct ServiceContext {
    pub config: AgentConfig,
    pub connectivity: SharedConnectivity,
    /// `None` when the agent runs without a remote.
    pub client: Option<Arc<FieldDataClient>>,
    pub queue: Arc<SyncQueue>,
    pub gate: Arc<SyncIntervalGate>,
    pub sync_service: Arc<OfflineSyncService>,
    pub resync: Arc<FullResyncOrchestrator>,
    pub runtime: Arc<SyncRuntime>,
}

impl ServiceContext {
    pub fn build(config: AgentConfig) -> anyhow::Result<Self> {
        let data_dir = config.data_dir.to_string_lossy().to_string();
        let db_path = init(&data_dir)?;
        run_migrations(&db_path)?;
        let pool = create_pool(&db_path)?;
        let writer = spawn_writer(pool.as_ref().clone());
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let records: Arc<dyn OfflineRecordRepositoryTrait> = Arc::new(
            OfflineRecordRepository::new(pool.clone(), writer.clone()).with_clock(clock.clone()),
        );
        let snapshots: Arc<dyn SnapshotCacheRepositoryTrait> = Arc::new(
            SnapshotCacheRepository::new(pool.clone(), writer.clone()).with_clock(clock.clone()),
        );
        let queue_repository = Arc::new(SyncQueueRepository::new(pool.clone(), writer.clone()));
        let metadata_repository = Arc::new(SyncMetadataRepository::new(pool, writer));

        let client = match &config.api_url {
            Some(url) => Some(Arc::new(
                FieldDataClient::new(url, config.sync.fetch_timeout_ms)?
                    .with_token(config.api_token.clone()),
            )),
            None => None,
        };
        let remote: Arc<dyn RemoteDataService> = match &client {
            Some(client) => client.clone(),
            None => Arc::new(UnconfiguredRemote),
        };

        // Offline until the monitor's first successful probe.
        let connectivity = SharedConnectivity::new(false);

        let queue = Arc::new(SyncQueue::new(
            queue_repository.clone(),
            clock.clone(),
            QueueSignal::new(),
            config.sync.queue_max_age_ms,
        ));
        let gate = Arc::new(SyncIntervalGate::new(
            metadata_repository,
            clock.clone(),
            config.sync.min_sync_interval_ms,
        ));
        let drainer = Arc::new(QueueDrainer::new(
            queue_repository,
            records.clone(),
            remote.clone(),
            Arc::new(connectivity.clone()),
            clock.clone(),
            config.sync.clone(),
        ));
        let runtime = Arc::new(SyncRuntime::new(drainer, queue.clone(), config.sync.clone()));
        let sync_service = Arc::new(OfflineSyncService::new(
            records.clone(),
            snapshots.clone(),
            queue.clone(),
            gate.clone(),
            remote.clone(),
            Arc::new(connectivity.clone()),
            clock.clone(),
            config.sync.clone(),
        ));
        let resync = Arc::new(FullResyncOrchestrator::new(
            records,
            snapshots,
            gate.clone(),
            remote,
            Arc::new(connectivity.clone()),
            clock,
            config.sync.clone(),
        ));

        tracing::info!(
            db = %db_path,
            remote = config.api_url.as_deref().unwrap_or("<none>"),
            "Service context ready"
        );

        Ok(Self {
            config,
            connectivity,
            client,
            queue,
            gate,
            sync_service,
            resync,
            runtime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::connectivity::ConnectivityProbe;
    use fieldsync_core::offline::Visit;
    use fieldsync_core::sync::SyncCycleTrigger;

    fn offline_context() -> ServiceContext {
        let dir = tempfile::tempdir().expect("tempdir").keep();
        ServiceContext::build(AgentConfig::offline(dir)).expect("context")
    }

    #[tokio::test]
    async fn offline_agent_queues_mutations_and_skips_drain() {
        let ctx = offline_context();
        assert!(ctx.client.is_none());
        assert!(!ctx.connectivity.is_online());

        let outcome = ctx
            .sync_service
            .create_visit(Visit {
                id: String::new(),
                retailer_id: "r1".to_string(),
                beat_id: None,
                status: Some("planned".to_string()),
                visit_date: Some("2026-10-16".to_string()),
                extra: Default::default(),
            })
            .await
            .expect("create visit");
        assert!(!outcome.applied_remotely);
        assert!(outcome.queued_seq.is_some());

        let report = ctx
            .runtime
            .run_cycle(SyncCycleTrigger::Manual)
            .await
            .expect("cycle");
        assert!(report.offline);
        assert_eq!(ctx.queue.pending_count().expect("count"), 1);
    }
}
