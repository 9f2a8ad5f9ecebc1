//! Connectivity monitor, periodic refresh loop and resync progress output.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use fieldsync_core::connectivity::SharedConnectivity;
use fieldsync_core::remote::FetchScope;
use fieldsync_core::sync::{
    OfflineSyncService, QueueSignal, ResyncProgressSink, ResyncStep, StepStatus,
};
use fieldsync_remote::FieldDataClient;

/// Probe the service health endpoint and flip the shared connectivity flag.
/// Coming back online wakes the drain loop.
pub fn spawn_connectivity_monitor(
    client: Arc<FieldDataClient>,
    connectivity: SharedConnectivity,
    signal: QueueSignal,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let online = match client.health().await {
                Ok(healthy) => healthy,
                Err(err) => {
                    tracing::debug!(error = %err, "Health probe failed");
                    false
                }
            };
            let was_online = connectivity.set_online(online);
            if online && !was_online {
                signal.notify();
            }
        }
    })
}

/// Refresh every due category for `scope` on a fixed cadence.
pub fn spawn_refresh_loop(
    service: Arc<OfflineSyncService>,
    scope: FetchScope,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let outcomes = service.refresh_due(&scope).await;
            tracing::debug!(categories = outcomes.len(), "Periodic refresh pass done");
        }
    })
}

/// Prints step progress of a full resync.
pub struct TracingProgressSink;

impl ResyncProgressSink for TracingProgressSink {
    fn on_step_status(&self, step: ResyncStep, status: StepStatus) {
        match status {
            StepStatus::Error => tracing::warn!(%step, "step failed"),
            _ => tracing::info!(%step, ?status, "step"),
        }
    }

    fn on_step_count(&self, step: ResyncStep, count: usize) {
        tracing::info!(%step, count, "step fetched");
    }
}
