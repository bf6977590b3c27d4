//! Scheduler configuration.
//!
//! Every section has defaults, so a config file only needs the knobs it
//! changes. Durations are plain milliseconds.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::app::retry::RetryPolicy;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeraldConfig {
    pub ready_groups: ReadyGroupsConfig,
    pub resource_resolver: ResourceResolverConfig,
    pub manager: ManagerConfig,
}

impl HeraldConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&raw)
    }
}

/// Ready-group poll-and-claim loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadyGroupsConfig {
    pub poll_interval_ms: u64,
    pub batch_size: usize,
}

impl ReadyGroupsConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for ReadyGroupsConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1_000,
            batch_size: 256,
        }
    }
}

/// Resource resolver polling.
///
/// `staleness_window_ms` skips bindings that were last updated longer ago
/// than the window. A binding that ages out is never polled again, so
/// deployments that cannot afford a stuck task set it to `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceResolverConfig {
    pub poll_interval_ms: u64,
    pub poll_limit: usize,
    pub staleness_window_ms: Option<u64>,
}

impl ResourceResolverConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn staleness_window(&self) -> Option<Duration> {
        self.staleness_window_ms.map(Duration::from_millis)
    }
}

impl Default for ResourceResolverConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 5_000,
            poll_limit: 1_024,
            staleness_window_ms: Some(5 * 60 * 1_000),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Capacity of the ready-task channel handed to the service.
    pub channel_capacity: usize,

    /// Max dependency ids handed to one `resolve` call.
    pub resolve_batch: usize,

    /// Backoff for a failed `resolve` call; the batch is retried until it
    /// succeeds or the manager is cancelled.
    pub resolve_retry_base_ms: u64,
    pub resolve_retry_max_ms: u64,
}

impl ManagerConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.resolve_retry_base_ms),
            multiplier: 2.0,
            max_delay: Duration::from_millis(self.resolve_retry_max_ms.max(self.resolve_retry_base_ms)),
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1_024,
            resolve_batch: 128,
            resolve_retry_base_ms: 100,
            resolve_retry_max_ms: 5_000,
        }
    }
}
