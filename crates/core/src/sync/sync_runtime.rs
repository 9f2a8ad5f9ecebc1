//! Background drain loop.

use std::sync::Arc;
use tokio::task::JoinHandle;

use super::queue_drainer::{DrainReport, QueueDrainer};
use super::sync_model::SyncCycleTrigger;
use super::sync_queue::SyncQueue;
use super::sync_scheduler::next_drain_delay;
use crate::config::SyncConfig;
use crate::errors::Result;

pub struct SyncRuntime {
    drainer: Arc<QueueDrainer>,
    queue: Arc<SyncQueue>,
    config: SyncConfig,
    background_task: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl SyncRuntime {
    pub fn new(drainer: Arc<QueueDrainer>, queue: Arc<SyncQueue>, config: SyncConfig) -> Self {
        Self {
            drainer,
            queue,
            config,
            background_task: tokio::sync::Mutex::new(None),
        }
    }

    /// Evict expired items, then drain once.
    pub async fn run_cycle(&self, trigger: SyncCycleTrigger) -> Result<DrainReport> {
        self.queue.delete_old_synced_items(None).await?;
        let report = self.drainer.drain_once().await?;
        log::debug!(
            "[SyncDrain] Cycle trigger={:?} offline={} applied={} retried={} dead={} skipped={}",
            trigger,
            report.offline,
            report.applied,
            report.retried,
            report.dead_lettered,
            report.skipped
        );
        Ok(report)
    }

    pub async fn is_running(&self) -> bool {
        self.background_task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Spawn the loop unless one is already running.
    pub async fn ensure_background_drain_started(self: &Arc<Self>) {
        let mut guard = self.background_task.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
            guard.take();
        }

        let runtime = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let signal = runtime.queue.signal().clone();
            let mut trigger = SyncCycleTrigger::Startup;
            loop {
                let has_pending = match runtime.run_cycle(trigger).await {
                    Ok(report) if report.offline => false,
                    Ok(report) => {
                        if report.reauth_required {
                            log::warn!("[SyncDrain] Waiting for credentials before next pass");
                        }
                        runtime.queue.pending_count().map(|n| n > 0).unwrap_or(false)
                    }
                    Err(err) => {
                        log::warn!("[SyncDrain] Background cycle failed: {}", err);
                        false
                    }
                };

                let delay = next_drain_delay(
                    has_pending,
                    runtime.config.drain_poll_interval_secs,
                    runtime.config.drain_jitter_secs,
                );
                trigger = tokio::select! {
                    _ = signal.notified() => SyncCycleTrigger::LocalMutation,
                    _ = tokio::time::sleep(delay) => SyncCycleTrigger::Periodic,
                };
            }
        });
        log::info!("[SyncDrain] Background drain started");
        *guard = Some(handle);
    }

    pub async fn ensure_background_drain_stopped(&self) {
        let mut guard = self.background_task.lock().await;
        if let Some(handle) = guard.take() {
            handle.abort();
            log::info!("[SyncDrain] Background drain stopped");
        }
    }
}
