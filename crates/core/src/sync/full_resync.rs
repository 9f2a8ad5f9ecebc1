//! "Sync everything": sequenced bulk download of every data category.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use super::interval_gate::SyncIntervalGate;
use crate::config::{StepFailurePolicy, SyncConfig};
use crate::connectivity::ConnectivityProbe;
use crate::errors::{Error, RemoteError};
use crate::offline::{MergeReport, OfflineRecordRepositoryTrait, SnapshotCacheRepositoryTrait};
use crate::remote::{DataCategory, FetchScope, RemoteDataService};
use crate::utils::clock::Clock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResyncStep {
    ProductsAndVariants,
    SchemesAndCategories,
    BeatRoutes,
    Retailers,
    BeatPlans,
    CompetitionData,
    TodayVisits,
    TodayOrders,
}

impl ResyncStep {
    /// Execution order.
    pub const ORDERED: [ResyncStep; 8] = [
        Self::ProductsAndVariants,
        Self::SchemesAndCategories,
        Self::BeatRoutes,
        Self::Retailers,
        Self::BeatPlans,
        Self::CompetitionData,
        Self::TodayVisits,
        Self::TodayOrders,
    ];

    pub fn id(&self) -> &'static str {
        match self {
            Self::ProductsAndVariants => "products_and_variants",
            Self::SchemesAndCategories => "schemes_and_categories",
            Self::BeatRoutes => "beat_routes",
            Self::Retailers => "retailers",
            Self::BeatPlans => "beat_plans",
            Self::CompetitionData => "competition_data",
            Self::TodayVisits => "today_visits",
            Self::TodayOrders => "today_orders",
        }
    }

    pub fn categories(&self) -> &'static [DataCategory] {
        match self {
            Self::ProductsAndVariants => &[DataCategory::Products, DataCategory::ProductVariants],
            Self::SchemesAndCategories => &[DataCategory::Schemes, DataCategory::Categories],
            Self::BeatRoutes => &[DataCategory::Beats],
            Self::Retailers => &[DataCategory::Retailers],
            Self::BeatPlans => &[DataCategory::BeatPlans],
            Self::CompetitionData => &[DataCategory::CompetitionData],
            Self::TodayVisits => &[DataCategory::Visits],
            Self::TodayOrders => &[DataCategory::Orders],
        }
    }
}

impl fmt::Display for ResyncStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Loading,
    Done,
    Error,
}

/// Receives per-step progress while a full resync runs.
pub trait ResyncProgressSink: Send + Sync {
    fn on_step_status(&self, step: ResyncStep, status: StepStatus);
    fn on_step_count(&self, step: ResyncStep, count: usize);
}

pub struct NoOpResyncProgressSink;

impl ResyncProgressSink for NoOpResyncProgressSink {
    fn on_step_status(&self, _step: ResyncStep, _status: StepStatus) {}
    fn on_step_count(&self, _step: ResyncStep, _count: usize) {}
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResyncStepErrorKind {
    #[error("timed out after {after_ms} ms")]
    Timeout { after_ms: u64 },

    #[error("fetch failed: {0}")]
    Fetch(RemoteError),

    #[error("storage failed: {0}")]
    Storage(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("step '{step}' failed after {attempts} attempt(s): {kind}")]
pub struct ResyncStepError {
    pub step: ResyncStep,
    pub kind: ResyncStepErrorKind,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub step: ResyncStep,
    pub fetched: usize,
    pub merge: MergeReport,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FullResyncSummary {
    /// Items fetched across all successful steps.
    pub total: usize,
    pub steps: Vec<StepOutcome>,
    /// Steps that failed under [`StepFailurePolicy::Continue`].
    pub failed: Vec<ResyncStepError>,
}

#[derive(Debug, Error)]
pub enum FullResyncError {
    #[error("Full resync needs connectivity")]
    Offline,

    #[error("Full resync could not start: {0}")]
    Storage(#[from] Error),

    #[error("Full resync aborted: {failed}")]
    StepFailed {
        failed: ResyncStepError,
        completed: Vec<ResyncStep>,
        skipped: Vec<ResyncStep>,
        partial_total: usize,
    },
}

pub struct FullResyncOrchestrator {
    records: Arc<dyn OfflineRecordRepositoryTrait>,
    snapshots: Arc<dyn SnapshotCacheRepositoryTrait>,
    gate: Arc<SyncIntervalGate>,
    remote: Arc<dyn RemoteDataService>,
    connectivity: Arc<dyn ConnectivityProbe>,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    run_lock: tokio::sync::Mutex<()>,
}

impl FullResyncOrchestrator {
    pub fn new(
        records: Arc<dyn OfflineRecordRepositoryTrait>,
        snapshots: Arc<dyn SnapshotCacheRepositoryTrait>,
        gate: Arc<SyncIntervalGate>,
        remote: Arc<dyn RemoteDataService>,
        connectivity: Arc<dyn ConnectivityProbe>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        Self {
            records,
            snapshots,
            gate,
            remote,
            connectivity,
            clock,
            config,
            run_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Invalidate the scope's snapshot cache, then run every step in order.
    ///
    /// Concurrent calls run one after the other. Pending queue items are
    /// never touched.
    pub async fn full_offline_sync(
        &self,
        scope: &FetchScope,
        sink: &dyn ResyncProgressSink,
    ) -> Result<FullResyncSummary, FullResyncError> {
        let _run = self.run_lock.lock().await;

        if !self.connectivity.is_online() {
            return Err(FullResyncError::Offline);
        }

        let invalidated = self
            .snapshots
            .invalidate_scope(scope.user_id.clone(), scope.date.clone())
            .await?;
        log::info!(
            "[FullResync] Starting (user={:?}, date={:?}); invalidated {} snapshot(s)",
            scope.user_id,
            scope.date,
            invalidated
        );

        let mut summary = FullResyncSummary::default();

        for (index, step) in ResyncStep::ORDERED.iter().copied().enumerate() {
            sink.on_step_status(step, StepStatus::Loading);

            match self.run_step(step, scope).await {
                Ok(outcome) => {
                    sink.on_step_count(step, outcome.fetched);
                    sink.on_step_status(step, StepStatus::Done);
                    summary.total += outcome.fetched;
                    summary.steps.push(outcome);
                }
                Err(failed) => {
                    sink.on_step_status(step, StepStatus::Error);
                    log::error!("[FullResync] {}", failed);
                    match self.config.resync_failure_policy {
                        StepFailurePolicy::Abort => {
                            return Err(FullResyncError::StepFailed {
                                failed,
                                completed: summary.steps.iter().map(|s| s.step).collect(),
                                skipped: ResyncStep::ORDERED[index + 1..].to_vec(),
                                partial_total: summary.total,
                            });
                        }
                        StepFailurePolicy::Continue => summary.failed.push(failed),
                    }
                }
            }
        }

        log::info!(
            "[FullResync] Finished: {} item(s), {} failed step(s)",
            summary.total,
            summary.failed.len()
        );
        Ok(summary)
    }

    async fn run_step(
        &self,
        step: ResyncStep,
        scope: &FetchScope,
    ) -> Result<StepOutcome, ResyncStepError> {
        let max_attempts = self.config.resync_step_attempts.max(1);
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.try_step(step, scope).await {
                Ok(outcome) => return Ok(outcome),
                Err(kind) => {
                    let retryable = !matches!(kind, ResyncStepErrorKind::Storage(_));
                    if !retryable || attempts >= max_attempts {
                        return Err(ResyncStepError {
                            step,
                            kind,
                            attempts,
                        });
                    }
                    log::warn!(
                        "[FullResync] Step '{}' attempt {} failed: {}; retrying",
                        step,
                        attempts,
                        kind
                    );
                    tokio::time::sleep(self.config.resync_retry_delay()).await;
                }
            }
        }
    }

    async fn try_step(
        &self,
        step: ResyncStep,
        scope: &FetchScope,
    ) -> Result<StepOutcome, ResyncStepErrorKind> {
        let mut outcome = StepOutcome {
            step,
            fetched: 0,
            merge: MergeReport::default(),
        };

        let mut fetch_started = Vec::with_capacity(step.categories().len());
        for category in step.categories().iter().copied() {
            let category_scope = scope.for_category(category);
            fetch_started.push((category, self.clock.now_millis()));
            let fetched = match tokio::time::timeout(
                self.config.fetch_timeout(),
                self.remote.fetch_changes(category, &category_scope, None),
            )
            .await
            {
                Err(_) => {
                    return Err(ResyncStepErrorKind::Timeout {
                        after_ms: self.config.fetch_timeout_ms,
                    })
                }
                Ok(Err(RemoteError::Timeout { after_ms, .. })) => {
                    return Err(ResyncStepErrorKind::Timeout { after_ms })
                }
                Ok(Err(err)) => return Err(ResyncStepErrorKind::Fetch(err)),
                Ok(Ok(records)) => records,
            };

            outcome.fetched += fetched.len();
            let report = self
                .records
                .merge_data(category.store(), fetched)
                .await
                .map_err(|e| ResyncStepErrorKind::Storage(e.to_string()))?;
            outcome.merge.absorb(&report);
        }

        for (category, started_at) in fetch_started {
            let category_scope = scope.for_category(category);
            self.gate
                .set_sync_metadata_at(
                    category.as_str(),
                    category_scope.user_id.as_deref(),
                    category_scope.date.as_deref(),
                    started_at,
                )
                .await
                .map_err(|e| ResyncStepErrorKind::Storage(e.to_string()))?;
        }

        log::debug!(
            "[FullResync] Step '{}' fetched {} item(s)",
            step.id(),
            outcome.fetched
        );
        Ok(outcome)
    }
}
