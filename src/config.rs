use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{FlowtrackError, Result};

/// Configuration for tracking workflow runs against the remote API.
///
/// Constructed once and passed explicitly to every component that needs it.
/// There is no process-wide singleton; `load()` is a convenience for the
/// binary, libraries should build the value directly.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
    /// Base URL of the remote workflow API (required)
    #[serde(default)]
    pub api_url: String,
    /// Static credential sent as a basic-auth header on every request
    pub api_key: Option<String>,
    /// Shared secret for verifying inbound webhook signatures
    pub webhook_secret: Option<String>,
    /// Default budget for synchronous waits, in seconds
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: u64,
    /// Default delay between status polls, in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub default_poll_interval_secs: u64,
    /// Upper bound on retained progress entries per record
    #[serde(default = "default_max_progress_entries")]
    pub max_progress_entries: usize,
    /// Task queue name sent with start requests, when set
    pub task_queue: Option<String>,
    /// Retry behavior for the scheduled polling loop
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Transient failures tolerated before a record is marked failed
    pub max_attempts: u32,
    /// Base delay for the linear backoff, in seconds
    pub base_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 10,
        }
    }
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_progress_entries() -> usize {
    100
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_key: None,
            webhook_secret: None,
            default_timeout_secs: default_timeout_secs(),
            default_poll_interval_secs: default_poll_interval_secs(),
            max_progress_entries: default_max_progress_entries(),
            task_queue: None,
            retry: RetryConfig::default(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration with precedence:
    /// 1. Default values
    /// 2. Configuration file (flowtrack.toml)
    /// 3. Environment variables (prefixed with FLOWTRACK_)
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if Path::new("flowtrack.toml").exists() {
            builder = builder.add_source(File::with_name("flowtrack"));
        }

        builder = builder.add_source(
            Environment::with_prefix("FLOWTRACK")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| FlowtrackError::Configuration(e.to_string()))?;

        let tracker_config: TrackerConfig = config
            .try_deserialize()
            .map_err(|e| FlowtrackError::Configuration(e.to_string()))?;

        tracker_config.validate()?;
        Ok(tracker_config)
    }

    /// Reject invalid configuration before any component is built.
    pub fn validate(&self) -> Result<()> {
        if self.api_url.trim().is_empty() {
            return Err(FlowtrackError::Configuration("api_url is required".into()));
        }
        if self.default_poll_interval_secs == 0 {
            return Err(FlowtrackError::Configuration(
                "default_poll_interval_secs must be positive".into(),
            ));
        }
        if self.default_timeout_secs == 0 {
            return Err(FlowtrackError::Configuration(
                "default_timeout_secs must be positive".into(),
            ));
        }
        if self.max_progress_entries == 0 {
            return Err(FlowtrackError::Configuration(
                "max_progress_entries must be positive".into(),
            ));
        }
        Ok(())
    }
}
