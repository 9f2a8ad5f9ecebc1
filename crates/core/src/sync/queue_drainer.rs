//! Submits queued mutations to the remote service.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use super::sync_model::{
    SyncQueueFailure, SyncQueueItem, DECODE_ERROR_CODE, EXHAUSTED_ERROR_CODE,
};
use super::sync_scheduler::backoff_seconds;
use super::sync_traits::SyncQueueRepositoryTrait;
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityProbe;
use crate::errors::{RemoteError, Result, SyncRetryClass};
use crate::offline::OfflineRecordRepositoryTrait;
use crate::remote::{apply_action, RemoteDataService};
use crate::utils::clock::Clock;

/// One queued mutation that failed remote application during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[error("{action} (seq {seq}) failed [{code}]: {message}")]
pub struct QueueDrainError {
    pub seq: i64,
    pub event_id: String,
    pub action: String,
    pub retry_class: SyncRetryClass,
    pub code: String,
    pub message: String,
}

impl QueueDrainError {
    fn new(item: &SyncQueueItem, retry_class: SyncRetryClass, code: &str, message: String) -> Self {
        Self {
            seq: item.seq,
            event_id: item.event_id.clone(),
            action: item.action.clone(),
            retry_class,
            code: code.to_string(),
            message,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub applied: usize,
    pub retried: usize,
    pub dead_lettered: usize,
    pub skipped: usize,
    pub errors: Vec<QueueDrainError>,
    /// Pass did not run because connectivity was down.
    pub offline: bool,
    /// Pass stopped on an authentication failure.
    pub reauth_required: bool,
}

impl DrainReport {
    pub fn attempted(&self) -> usize {
        self.applied + self.retried + self.dead_lettered
    }
}

pub struct QueueDrainer {
    queue: Arc<dyn SyncQueueRepositoryTrait>,
    records: Arc<dyn OfflineRecordRepositoryTrait>,
    remote: Arc<dyn RemoteDataService>,
    connectivity: Arc<dyn ConnectivityProbe>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    pass_lock: tokio::sync::Mutex<()>,
}

impl QueueDrainer {
    pub fn new(
        queue: Arc<dyn SyncQueueRepositoryTrait>,
        records: Arc<dyn OfflineRecordRepositoryTrait>,
        remote: Arc<dyn RemoteDataService>,
        connectivity: Arc<dyn ConnectivityProbe>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            queue,
            records,
            remote,
            connectivity,
            clock,
            config,
            pass_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Run one pass over the pending queue in enqueue order.
    ///
    /// Once an entity's mutation is blocked (backoff, failure or rejection),
    /// later mutations of the same entity wait for the next pass. Skipped
    /// items do not count against `drain_batch_size`, so a blocked entity
    /// never holds back the others. Only storage failures are returned as
    /// errors; remote failures land in the report.
    pub async fn drain_once(&self) -> Result<DrainReport> {
        let _pass = self.pass_lock.lock().await;
        let mut report = DrainReport::default();

        if !self.connectivity.is_online() {
            report.offline = true;
            return Ok(report);
        }

        let batch_size = self.config.drain_batch_size;
        let now = self.clock.now_millis();
        let mut blocked: HashSet<String> = HashSet::new();
        let mut cursor = 0;

        'pass: loop {
            let page = self.queue.list_pending(cursor, batch_size)?;
            let page_len = page.len() as i64;

            for item in page {
                if report.attempted() as i64 >= batch_size {
                    break 'pass;
                }
                cursor = item.seq;
                let action = match item.decode_action() {
                    Ok(action) => action,
                    Err(err) => {
                        log::warn!(
                            "[SyncDrain] Dead-lettering undecodable {} seq={}: {}",
                            item.action,
                            item.seq,
                            err
                        );
                        self.dead_letter(&item, item.retry_count, DECODE_ERROR_CODE, err.to_string())
                            .await?;
                        report.dead_lettered += 1;
                        report.errors.push(QueueDrainError::new(
                            &item,
                            SyncRetryClass::Permanent,
                            DECODE_ERROR_CODE,
                            err.to_string(),
                        ));
                        continue;
                    }
                };

                let entity_key = action.entity_key();
                if blocked.contains(&entity_key) || !item.is_due(now) {
                    blocked.insert(entity_key);
                    report.skipped += 1;
                    continue;
                }

                let outcome = match tokio::time::timeout(
                    self.config.fetch_timeout(),
                    apply_action(self.remote.as_ref(), &action, &item.event_id),
                )
                .await
                {
                    Ok(result) => result,
                    Err(_) => Err(RemoteError::timeout(
                        format!("{} seq={}", item.action, item.seq),
                        self.config.fetch_timeout_ms,
                    )),
                };

                let err = match outcome {
                    Ok(()) => {
                        self.queue.remove(item.seq).await?;
                        if let Some(record_id) = action.to_record()?.and_then(|r| r.id()) {
                            if let Err(mark_err) = self
                                .records
                                .mark_locally_authoritative(action.store(), &record_id)
                                .await
                            {
                                log::warn!(
                                    "[SyncDrain] Applied {} but could not flag {}: {}",
                                    item.action,
                                    entity_key,
                                    mark_err
                                );
                            }
                        }
                        report.applied += 1;
                        continue;
                    }
                    Err(err) => err,
                };

                let retry_class = err.retry_class();
                report.errors.push(QueueDrainError::new(
                    &item,
                    retry_class,
                    err.code(),
                    err.to_string(),
                ));

                match retry_class {
                    SyncRetryClass::Retryable => {
                        let attempts = item.retry_count + 1;
                        if attempts >= self.config.max_drain_attempts {
                            log::error!(
                                "[SyncDrain] {} seq={} exhausted {} attempts: {}",
                                item.action,
                                item.seq,
                                attempts,
                                err
                            );
                            self.dead_letter(&item, attempts, EXHAUSTED_ERROR_CODE, err.to_string())
                                .await?;
                            report.dead_lettered += 1;
                        } else {
                            let next_retry_at = now + backoff_seconds(attempts) * 1000;
                            self.queue
                                .schedule_retry(
                                    item.seq,
                                    SyncQueueFailure {
                                        retry_count: attempts,
                                        next_retry_at: Some(next_retry_at),
                                        error: err.to_string(),
                                        code: err.code().to_string(),
                                    },
                                )
                                .await?;
                            log::debug!(
                                "[SyncDrain] {} seq={} retry {} scheduled at {}",
                                item.action,
                                item.seq,
                                attempts,
                                next_retry_at
                            );
                            report.retried += 1;
                        }
                        blocked.insert(entity_key);
                    }
                    SyncRetryClass::Permanent => {
                        log::error!(
                            "[SyncDrain] {} seq={} rejected: {}",
                            item.action,
                            item.seq,
                            err
                        );
                        self.dead_letter(&item, item.retry_count + 1, err.code(), err.to_string())
                            .await?;
                        report.dead_lettered += 1;
                        blocked.insert(entity_key);
                    }
                    SyncRetryClass::ReauthRequired => {
                        log::warn!("[SyncDrain] Auth error during drain, token may need refresh");
                        self.queue
                            .schedule_retry(
                                item.seq,
                                SyncQueueFailure {
                                    retry_count: item.retry_count,
                                    next_retry_at: None,
                                    error: err.to_string(),
                                    code: SyncRetryClass::ReauthRequired.code().to_string(),
                                },
                            )
                            .await?;
                        report.reauth_required = true;
                        break 'pass;
                    }
                }
            }

            if page_len < batch_size {
                break;
            }
        }

        if report.attempted() > 0 {
            log::info!(
                "[SyncDrain] Pass done applied={} retried={} dead={} skipped={}",
                report.applied,
                report.retried,
                report.dead_lettered,
                report.skipped
            );
        }
        Ok(report)
    }

    async fn dead_letter(
        &self,
        item: &SyncQueueItem,
        retry_count: i32,
        code: &str,
        error: String,
    ) -> Result<()> {
        self.queue
            .mark_dead(
                item.seq,
                SyncQueueFailure {
                    retry_count,
                    next_retry_at: None,
                    error,
                    code: code.to_string(),
                },
            )
            .await
    }
}
