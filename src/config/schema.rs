//! Configuration schema definitions
//!
//! Defines the structure of configuration files using serde for serialization.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::pipeline::{self, PipelineSettings};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Plugin discovery directory (defaults to `<config dir>/plugins`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugins_dir: Option<PathBuf>,

    /// Declared consumers file (defaults to `<config dir>/consumers.yaml`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration_path: Option<PathBuf>,

    /// How often the declaration file is checked for changes
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Default log filter
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Delivery pipeline defaults
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Tracer configuration
    #[serde(default)]
    pub trace: TraceConfig,
}

/// Delivery pipeline defaults applied to every push consumer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    /// Concurrent sends per consumer
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Sends allowed to wait for a free slot
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Upper bound of one payload
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,

    /// Drain debounce delay in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
}

/// Tracer configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TraceConfig {
    /// Directory of `trace: true` trace files (defaults to the OS temp dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

// Default value functions
fn default_poll_interval() -> String {
    "5s".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_concurrency() -> usize {
    pipeline::settings::DEFAULT_CONCURRENCY
}

fn default_max_queue_size() -> usize {
    pipeline::settings::DEFAULT_MAX_QUEUE_SIZE
}

fn default_max_payload_bytes() -> usize {
    pipeline::settings::DEFAULT_MAX_PAYLOAD_BYTES
}

fn default_debounce_ms() -> u64 {
    pipeline::settings::DEFAULT_DEBOUNCE.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            plugins_dir: None,
            declaration_path: None,
            poll_interval: default_poll_interval(),
            log_level: default_log_level(),
            pipeline: PipelineConfig::default(),
            trace: TraceConfig::default(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            max_queue_size: default_max_queue_size(),
            max_payload_bytes: default_max_payload_bytes(),
            debounce_ms: default_debounce_ms(),
        }
    }
}

impl Config {
    /// Effective plugin discovery directory
    pub fn plugins_dir(&self) -> PathBuf {
        self.plugins_dir
            .clone()
            .unwrap_or_else(super::paths::plugins_dir)
    }

    /// Effective declaration file
    pub fn declaration_path(&self) -> PathBuf {
        self.declaration_path
            .clone()
            .unwrap_or_else(super::paths::declaration_path)
    }

    /// Effective trace directory
    pub fn trace_dir(&self) -> PathBuf {
        self.trace
            .directory
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("telemetry-relay"))
    }

    pub fn poll_interval(&self) -> anyhow::Result<Duration> {
        super::parse_duration(&self.poll_interval)
    }

    /// Base pipeline settings of every consumer
    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            concurrency: self.pipeline.concurrency.max(1),
            max_queue_size: self.pipeline.max_queue_size,
            max_payload_bytes: self.pipeline.max_payload_bytes.max(1),
            debounce: Duration::from_millis(self.pipeline.debounce_ms),
            ..PipelineSettings::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.poll_interval, "5s");
        assert_eq!(config.pipeline.concurrency, 5);
        assert_eq!(config.pipeline.max_payload_bytes, 99_000);
        assert_eq!(config.pipeline_settings(), PipelineSettings::default());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("pollInterval"));
        assert!(yaml.contains("maxQueueSize"));
        assert!(!yaml.contains("pluginsDir"));
    }

    #[test]
    fn test_config_deserialization() {
        let yaml = r#"
pluginsDir: /opt/relay/plugins
pipeline:
  concurrency: 2
  debounceMs: 50
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.plugins_dir(), PathBuf::from("/opt/relay/plugins"));
        assert_eq!(config.pipeline.concurrency, 2);
        assert_eq!(config.pipeline.max_queue_size, 1000);

        let settings = config.pipeline_settings();
        assert_eq!(settings.debounce, Duration::from_millis(50));
    }
}
