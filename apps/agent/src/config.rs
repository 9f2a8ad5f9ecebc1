//! Agent configuration: remote endpoint, credentials and data directory on
//! top of the engine's [`SyncConfig`].

use std::path::PathBuf;

use fieldsync_core::SyncConfig;

pub const DEFAULT_DATA_DIR: &str = "./fieldsync-data";
pub const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// `None` keeps the agent offline: mutations queue, nothing drains.
    pub api_url: Option<String>,
    pub api_token: Option<String>,
    pub data_dir: PathBuf,
    pub probe_interval_secs: u64,
    pub refresh_interval_secs: u64,
    pub sync: SyncConfig,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_var(name: &str) -> Option<String> {
    non_empty(std::env::var(name).ok())
}

fn env_u64(name: &str, default: u64) -> anyhow::Result<u64> {
    match env_var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Invalid value for {}: {}", name, e)),
        None => Ok(default),
    }
}

impl AgentConfig {
    /// Read `FIELDSYNC_*` variables; an explicit `data_dir` wins over the env.
    pub fn from_env(data_dir: Option<PathBuf>) -> anyhow::Result<Self> {
        let sync = SyncConfig::from_env()?;
        let data_dir = data_dir
            .or_else(|| env_var("FIELDSYNC_DATA_DIR").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));

        Ok(Self {
            api_url: env_var("FIELDSYNC_API_URL"),
            api_token: env_var("FIELDSYNC_API_TOKEN"),
            data_dir,
            probe_interval_secs: env_u64("FIELDSYNC_PROBE_INTERVAL_SECS", DEFAULT_PROBE_INTERVAL_SECS)?,
            refresh_interval_secs: env_u64(
                "FIELDSYNC_REFRESH_INTERVAL_SECS",
                DEFAULT_REFRESH_INTERVAL_SECS,
            )?,
            sync,
        })
    }

    pub fn offline(data_dir: PathBuf) -> Self {
        Self {
            api_url: None,
            api_token: None,
            data_dir,
            probe_interval_secs: DEFAULT_PROBE_INTERVAL_SECS,
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            sync: SyncConfig::default(),
        }
    }

    pub fn is_remote_configured(&self) -> bool {
        self.api_url.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_values_count_as_missing() {
        assert_eq!(non_empty(Some("  ".to_string())), None);
        assert_eq!(
            non_empty(Some(" https://api.example.com ".to_string())),
            Some("https://api.example.com".to_string())
        );
    }

    #[test]
    fn offline_config_has_no_remote() {
        let config = AgentConfig::offline(PathBuf::from("/tmp/fs"));
        assert!(!config.is_remote_configured());
        assert_eq!(config.sync, SyncConfig::default());
    }
}
