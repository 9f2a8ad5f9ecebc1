//! Engine configuration.
//!
//! Every knob has a default matching the field app's historical behavior and can
//! be overridden through `FIELDSYNC_*` environment variables.

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{Error, Result};

/// Minimum interval between automatic refreshes of one data type.
pub const DEFAULT_MIN_SYNC_INTERVAL_MS: i64 = 5 * 60 * 1000;

/// Queue items older than this are evicted to the dead-letter state.
pub const DEFAULT_QUEUE_MAX_AGE_MS: i64 = 3 * 24 * 60 * 60 * 1000;

/// What the full-resync orchestrator does once a step exhausts its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepFailurePolicy {
    /// Stop at the failed step; later steps are reported as skipped.
    #[default]
    Abort,
    /// Record the failure and keep going with the remaining steps.
    Continue,
}

impl FromStr for StepFailurePolicy {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "abort" => Ok(Self::Abort),
            "continue" => Ok(Self::Continue),
            other => Err(Error::Config(format!(
                "Unknown resync failure policy '{}' (expected 'abort' or 'continue')",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SyncConfig {
    pub min_sync_interval_ms: i64,
    pub queue_max_age_ms: i64,
    /// Remote attempts before a queue item is dead-lettered.
    pub max_drain_attempts: i32,
    pub drain_batch_size: i64,
    pub drain_poll_interval_secs: u64,
    pub drain_jitter_secs: u64,
    /// Deadline applied to every individual remote call.
    pub fetch_timeout_ms: u64,
    pub resync_step_attempts: u32,
    pub resync_retry_delay_ms: u64,
    pub resync_failure_policy: StepFailurePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            min_sync_interval_ms: DEFAULT_MIN_SYNC_INTERVAL_MS,
            queue_max_age_ms: DEFAULT_QUEUE_MAX_AGE_MS,
            max_drain_attempts: 8,
            drain_batch_size: 100,
            drain_poll_interval_secs: 45,
            drain_jitter_secs: 5,
            fetch_timeout_ms: 30_000,
            resync_step_attempts: 2,
            resync_retry_delay_ms: 500,
            resync_failure_policy: StepFailurePolicy::Abort,
        }
    }
}

fn env_override<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        _ => Ok(None),
    }
}

impl SyncConfig {
    /// Build a config from defaults overridden by `FIELDSYNC_*` variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(v) = env_override("FIELDSYNC_MIN_SYNC_INTERVAL_MS")? {
            config.min_sync_interval_ms = v;
        }
        if let Some(v) = env_override("FIELDSYNC_QUEUE_MAX_AGE_MS")? {
            config.queue_max_age_ms = v;
        }
        if let Some(v) = env_override("FIELDSYNC_MAX_DRAIN_ATTEMPTS")? {
            config.max_drain_attempts = v;
        }
        if let Some(v) = env_override("FIELDSYNC_DRAIN_BATCH_SIZE")? {
            config.drain_batch_size = v;
        }
        if let Some(v) = env_override("FIELDSYNC_DRAIN_POLL_INTERVAL_SECS")? {
            config.drain_poll_interval_secs = v;
        }
        if let Some(v) = env_override("FIELDSYNC_DRAIN_JITTER_SECS")? {
            config.drain_jitter_secs = v;
        }
        if let Some(v) = env_override("FIELDSYNC_FETCH_TIMEOUT_MS")? {
            config.fetch_timeout_ms = v;
        }
        if let Some(v) = env_override("FIELDSYNC_RESYNC_STEP_ATTEMPTS")? {
            config.resync_step_attempts = v;
        }
        if let Some(v) = env_override("FIELDSYNC_RESYNC_RETRY_DELAY_MS")? {
            config.resync_retry_delay_ms = v;
        }
        if let Some(raw) = env_override::<String>("FIELDSYNC_RESYNC_FAILURE_POLICY")? {
            config.resync_failure_policy = raw.parse()?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_sync_interval_ms < 0 {
            return Err(Error::Config(
                "min_sync_interval_ms must not be negative".to_string(),
            ));
        }
        if self.queue_max_age_ms <= 0 {
            return Err(Error::Config(
                "queue_max_age_ms must be positive".to_string(),
            ));
        }
        if self.max_drain_attempts < 1 {
            return Err(Error::Config(
                "max_drain_attempts must be at least 1".to_string(),
            ));
        }
        if self.drain_batch_size < 1 {
            return Err(Error::Config(
                "drain_batch_size must be at least 1".to_string(),
            ));
        }
        if self.fetch_timeout_ms == 0 {
            return Err(Error::Config(
                "fetch_timeout_ms must be positive".to_string(),
            ));
        }
        if self.resync_step_attempts < 1 {
            return Err(Error::Config(
                "resync_step_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn resync_retry_delay(&self) -> Duration {
        Duration::from_millis(self.resync_retry_delay_ms)
    }
}
