//! Agent configuration

use depwall_common::{DepwallError, DepwallResult};
use depwall_dataplane::EngineConfig;
use depwall_policy::TableLimits;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Agent configuration, loaded from JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Label for the attached interface, used in logs
    pub interface: String,
    /// Decision engine settings
    pub engine: EngineConfig,
    /// Policy table capacities
    pub tables: TableLimits,
    /// Policy document to load and watch
    pub policy_path: Option<PathBuf>,
    /// Policy reload period (seconds, 0 disables reloading)
    pub policy_reload_secs: u64,
    /// Upper bound on one reload attempt (milliseconds)
    pub policy_reload_timeout_ms: u64,
    /// Counter report period (seconds)
    pub stats_interval_secs: u64,
    /// Classification worker threads
    pub workers: usize,
    /// Frames buffered between the reader and the workers
    pub queue_depth: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            interface: "eth0".into(),
            engine: EngineConfig::default(),
            tables: TableLimits::default(),
            policy_path: None,
            policy_reload_secs: 5,
            policy_reload_timeout_ms: 1000,
            stats_interval_secs: 10,
            workers: num_cpus(),
            queue_depth: 4096,
        }
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl AgentConfig {
    /// Load from file
    pub fn load(path: impl AsRef<Path>) -> DepwallResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the runtime cannot honour
    pub fn validate(&self) -> DepwallResult<()> {
        if self.workers == 0 {
            return Err(DepwallError::Config("workers must be at least 1".into()));
        }
        if self.queue_depth == 0 {
            return Err(DepwallError::Config("queue_depth must be at least 1".into()));
        }
        if self.stats_interval_secs == 0 {
            return Err(DepwallError::Config("stats_interval_secs must be at least 1".into()));
        }
        if self.engine.session_capacity == 0 {
            return Err(DepwallError::Config("engine.session_capacity must be at least 1".into()));
        }
        Ok(())
    }

    /// Reload period, if reloading is enabled
    pub fn reload_interval(&self) -> Option<Duration> {
        (self.policy_reload_secs > 0).then(|| Duration::from_secs(self.policy_reload_secs))
    }

    /// Reload attempt timeout
    pub fn reload_timeout(&self) -> Duration {
        Duration::from_millis(self.policy_reload_timeout_ms)
    }

    /// Counter report period
    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }
}
