//! Delivery pipeline tuning
//!
//! Settings are resolved in layers: built-in defaults, the `pipeline` section of
//! the runtime config, the plugin manifest, then the consumer's own config.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Concurrent egress tasks per consumer
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Egress tasks allowed to wait for a concurrency slot
pub const DEFAULT_MAX_QUEUE_SIZE: usize = 1000;

/// Upper bound of one payload buffer
pub const DEFAULT_MAX_PAYLOAD_BYTES: usize = 99_000;

/// Delay coalescing drain requests
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(10);

/// Drain budget multiplier: `budget = factor * concurrency - egress depth`
pub const DEFAULT_BUDGET_FACTOR: usize = 2;

/// Effective settings of one pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineSettings {
    pub concurrency: usize,
    pub max_queue_size: usize,
    pub max_payload_bytes: usize,
    pub debounce: Duration,
    pub budget_factor: usize,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            debounce: DEFAULT_DEBOUNCE,
            budget_factor: DEFAULT_BUDGET_FACTOR,
        }
    }
}

impl PipelineSettings {
    /// Copy with the given overrides applied; zero values are ignored
    pub fn with_overrides(&self, overrides: &PipelineOverrides) -> Self {
        let pick = |value: Option<usize>, current: usize| match value {
            Some(v) if v > 0 => v,
            _ => current,
        };

        Self {
            concurrency: pick(overrides.concurrency, self.concurrency),
            max_queue_size: pick(overrides.max_queue_size, self.max_queue_size),
            max_payload_bytes: pick(overrides.max_payload_bytes, self.max_payload_bytes),
            debounce: self.debounce,
            budget_factor: self.budget_factor,
        }
    }

    /// Number of egress submissions a drain pass may make given the current
    /// egress depth (queued + in flight)
    pub fn drain_budget(&self, egress_depth: usize) -> usize {
        (self.budget_factor * self.concurrency).saturating_sub(egress_depth)
    }
}

/// Optional per-plugin or per-consumer pipeline settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,

    #[serde(default, alias = "max_queue_size", skip_serializing_if = "Option::is_none")]
    pub max_queue_size: Option<usize>,

    #[serde(default, alias = "max_payload_bytes", skip_serializing_if = "Option::is_none")]
    pub max_payload_bytes: Option<usize>,
}

impl PipelineOverrides {
    /// Overrides embedded in a consumer's declared config
    ///
    /// Unknown keys are the sink's business and are ignored here.
    pub fn from_consumer_config(config: &Value) -> Self {
        let read = |key: &str| {
            config
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|v| usize::try_from(v).ok())
        };

        Self {
            concurrency: read("concurrency"),
            max_queue_size: read("maxQueueSize"),
            max_payload_bytes: read("maxPayloadBytes"),
        }
    }
}
