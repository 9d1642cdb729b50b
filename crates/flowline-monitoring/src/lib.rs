//! Monitoring for Flowline: log subscriber setup and execution metrics.

use flowline_core::EngineConfig;
use std::env;

pub mod logging;
pub mod metrics;

pub use logging::{init_logging, LogExt};
pub use metrics::{ExecutionMetrics, MetricsSnapshot, WorkflowCounters};

/// Configuration for initializing the monitoring system
#[derive(Debug, Clone, PartialEq)]
pub struct MonitoringConfig {
    /// Service name attached to the startup log line
    pub service_name: String,
    /// Log level filter (e.g., "info,flowline_core=debug")
    pub log_filter: String,
    /// JSON output instead of the pretty format
    pub json_logs: bool,
    /// Environment (dev, staging, prod)
    pub environment: String,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            service_name: "flowline".to_string(),
            log_filter: "info".to_string(),
            json_logs: false,
            environment: "dev".to_string(),
        }
    }
}

impl MonitoringConfig {
    /// Take the log settings from the engine configuration and the service
    /// identity from `FLOWLINE_SERVICE_NAME` and `FLOWLINE_ENVIRONMENT`
    pub fn from_engine(engine: &EngineConfig) -> Self {
        Self::from_lookup(engine, |key| env::var(key).ok())
    }

    fn from_lookup(engine: &EngineConfig, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            service_name: lookup("FLOWLINE_SERVICE_NAME").unwrap_or(defaults.service_name),
            log_filter: engine.log_filter.clone(),
            json_logs: engine.json_logs,
            environment: lookup("FLOWLINE_ENVIRONMENT").unwrap_or(defaults.environment),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_defaults() {
        let config = MonitoringConfig::default();
        assert_eq!(config.service_name, "flowline");
        assert!(!config.json_logs);
    }

    #[test]
    fn test_from_engine_config() {
        let engine = EngineConfig {
            log_filter: "debug".to_string(),
            json_logs: true,
            ..EngineConfig::default()
        };
        let config = MonitoringConfig::from_lookup(&engine, |key| match key {
            "FLOWLINE_ENVIRONMENT" => Some("prod".to_string()),
            _ => None,
        });
        assert_eq!(
            config,
            MonitoringConfig {
                service_name: "flowline".to_string(),
                log_filter: "debug".to_string(),
                json_logs: true,
                environment: "prod".to_string(),
            }
        );
    }
}
