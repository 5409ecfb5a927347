//! Telemetry data units handed to consumers
//!
//! A `DataContext` is immutable once it enters the runtime; it travels as
//! `Arc<DataContext>` and every consumer-specific transform works on a copy.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;

/// One unit of telemetry plus its metadata
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DataContext {
    /// Event category, e.g. "systemInfo", "LTM", "syslog"
    pub event_type: String,

    /// Decoded event or poller snapshot
    pub data: Value,

    /// Whether the data came from a schema-less ("custom") source
    #[serde(default)]
    pub is_custom: bool,

    /// Namespace the producing source belongs to (None = default namespace)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl DataContext {
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            is_custom: false,
            namespace: None,
        }
    }

    /// Mark the context as coming from a custom (schema-less) source
    pub fn custom(mut self) -> Self {
        self.is_custom = true;
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Freeze the context for hand-off to the runtime
    pub fn shared(self) -> Arc<DataContext> {
        Arc::new(self)
    }
}

/// Data handed to a consumer's `on_data`
///
/// Push consumers receive one context at a time; pull consumers receive the
/// recent contexts aggregated for one request (e.g. several poller cycles).
#[derive(Debug, Clone)]
pub enum DataPayload {
    Single(Arc<DataContext>),
    Batch(Vec<Arc<DataContext>>),
}

impl DataPayload {
    pub fn is_batch(&self) -> bool {
        matches!(self, DataPayload::Batch(_))
    }

    /// Iterate the contexts regardless of shape
    pub fn contexts(&self) -> Vec<&Arc<DataContext>> {
        match self {
            DataPayload::Single(ctx) => vec![ctx],
            DataPayload::Batch(ctxs) => ctxs.iter().collect(),
        }
    }

    /// JSON form, as handed to tracers
    pub fn to_value(&self) -> Value {
        match self {
            DataPayload::Single(ctx) => serde_json::to_value(ctx.as_ref()).unwrap_or(Value::Null),
            DataPayload::Batch(ctxs) => Value::Array(
                ctxs.iter()
                    .map(|ctx| serde_json::to_value(ctx.as_ref()).unwrap_or(Value::Null))
                    .collect(),
            ),
        }
    }
}

/// Restricts which top-level data keys a consumer receives
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataMask {
    allowed: Option<BTreeSet<String>>,
}

impl DataMask {
    /// Mask that lets everything through
    pub fn all() -> Self {
        Self { allowed: None }
    }

    /// Mask that keeps only the given top-level keys
    pub fn only<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: Some(keys.into_iter().map(Into::into).collect()),
        }
    }

    pub fn allows(&self, key: &str) -> bool {
        match &self.allowed {
            None => true,
            Some(keys) => keys.contains(key),
        }
    }

    /// Produce a masked copy of `ctx`; the original is never touched
    pub fn apply(&self, ctx: &DataContext) -> DataContext {
        let mut copy = ctx.clone();
        if self.allowed.is_some() {
            if let Value::Object(map) = &mut copy.data {
                map.retain(|key, _| self.allows(key));
            }
        }
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mask_all_keeps_everything() {
        let ctx = DataContext::new("systemInfo", json!({"cpu": 10, "memory": 20}));
        let masked = DataMask::all().apply(&ctx);
        assert_eq!(masked, ctx);
    }

    #[test]
    fn test_mask_only_copies() {
        let ctx = DataContext::new("systemInfo", json!({"cpu": 10, "memory": 20}));
        let masked = DataMask::only(["cpu"]).apply(&ctx);

        assert_eq!(masked.data, json!({"cpu": 10}));
        // Original stays intact
        assert_eq!(ctx.data, json!({"cpu": 10, "memory": 20}));
    }

    #[test]
    fn test_payload_contexts() {
        let a = DataContext::new("a", json!(1)).shared();
        let b = DataContext::new("b", json!(2)).shared();

        assert_eq!(DataPayload::Single(a.clone()).contexts().len(), 1);
        let batch = DataPayload::Batch(vec![a, b]);
        assert!(batch.is_batch());
        assert_eq!(batch.contexts().len(), 2);
    }

    #[test]
    fn test_context_builders() {
        let ctx = DataContext::new("event", json!({})).custom().with_namespace("finance");
        assert!(ctx.is_custom);
        assert_eq!(ctx.namespace.as_deref(), Some("finance"));
    }
}
