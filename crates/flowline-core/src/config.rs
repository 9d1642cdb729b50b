//! Configuration for the Flowline engine
//!
//! Defaults can be overridden through `FLOWLINE_*` environment variables.

use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::warn;

/// What `run` does when a workflow already has `max_concurrent_executions`
/// runs in flight
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdmissionPolicy {
    /// Fail immediately with `ConcurrencyLimitReached`
    #[default]
    Reject,
    /// Wait for a slot, optionally bounded by `queue_timeout_ms`
    Block,
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Behaviour at capacity
    #[serde(default)]
    pub admission_policy: AdmissionPolicy,

    /// Longest a blocked run waits for a slot
    #[serde(default)]
    pub queue_timeout_ms: Option<u64>,

    /// History page size used when the caller passes none
    #[serde(default = "default_history_page_size")]
    pub history_page_size: usize,

    /// Upper bound on the requested history page size
    #[serde(default = "default_max_history_page_size")]
    pub max_history_page_size: usize,

    /// Executions kept per workflow by the in-memory store
    #[serde(default)]
    pub history_retention: Option<usize>,

    /// Log filter directive
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Emit JSON logs
    #[serde(default)]
    pub json_logs: bool,
}

fn default_history_page_size() -> usize {
    20
}

fn default_max_history_page_size() -> usize {
    100
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            admission_policy: AdmissionPolicy::default(),
            queue_timeout_ms: None,
            history_page_size: default_history_page_size(),
            max_history_page_size: default_max_history_page_size(),
            history_retention: None,
            log_filter: default_log_filter(),
            json_logs: false,
        }
    }
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(policy) = lookup("FLOWLINE_ADMISSION_POLICY") {
            match policy.to_lowercase().as_str() {
                "reject" => config.admission_policy = AdmissionPolicy::Reject,
                "block" => config.admission_policy = AdmissionPolicy::Block,
                _ => warn!("Invalid FLOWLINE_ADMISSION_POLICY value: {}", policy),
            }
        }

        if let Some(timeout) = lookup("FLOWLINE_QUEUE_TIMEOUT_MS") {
            if let Ok(ms) = timeout.parse::<u64>() {
                config.queue_timeout_ms = Some(ms);
            } else {
                warn!("Invalid FLOWLINE_QUEUE_TIMEOUT_MS value: {}", timeout);
            }
        }

        if let Some(size) = lookup("FLOWLINE_HISTORY_PAGE_SIZE") {
            match size.parse::<usize>() {
                Ok(size) if size > 0 => config.history_page_size = size,
                _ => warn!("Invalid FLOWLINE_HISTORY_PAGE_SIZE value: {}", size),
            }
        }

        if let Some(size) = lookup("FLOWLINE_MAX_HISTORY_PAGE_SIZE") {
            match size.parse::<usize>() {
                Ok(size) if size > 0 => config.max_history_page_size = size,
                _ => warn!("Invalid FLOWLINE_MAX_HISTORY_PAGE_SIZE value: {}", size),
            }
        }

        if let Some(retention) = lookup("FLOWLINE_HISTORY_RETENTION") {
            match retention.parse::<usize>() {
                Ok(limit) if limit > 0 => config.history_retention = Some(limit),
                _ => warn!("Invalid FLOWLINE_HISTORY_RETENTION value: {}", retention),
            }
        }

        if let Some(filter) = lookup("FLOWLINE_LOG_FILTER") {
            config.log_filter = filter;
        }

        if let Some(json_logs) = lookup("FLOWLINE_JSON_LOGS") {
            config.json_logs = json_logs.to_lowercase() == "true" || json_logs == "1";
        }

        if config.history_page_size > config.max_history_page_size {
            warn!(
                "FLOWLINE_HISTORY_PAGE_SIZE {} exceeds the maximum {}, clamping",
                config.history_page_size, config.max_history_page_size
            );
            config.history_page_size = config.max_history_page_size;
        }

        config
    }

    /// Queue timeout as a duration
    pub fn queue_timeout(&self) -> Option<Duration> {
        self.queue_timeout_ms.map(Duration::from_millis)
    }
}
