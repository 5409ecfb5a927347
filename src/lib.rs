//! telemetry-relay library
//!
//! Runtime for pluggable telemetry consumers: plugin discovery and adaptation,
//! reconciliation of live consumers against a declaration, the pull/push
//! capability gate and the bounded delivery pipeline used by push sinks.
//! The binary is a thin CLI over these modules.

pub mod capability;
pub mod cli;
pub mod config;
pub mod data;
pub mod pipeline;
pub mod plugins;
pub mod services;
pub mod sinks;
pub mod watcher;

// Re-export commonly used types for convenience
pub use capability::{CapabilityGate, GateError};
pub use config::declaration::{ConfigChange, Declaration, InstanceId};
pub use data::{DataContext, DataMask, DataPayload};
pub use pipeline::{DeliveryPipeline, PipelineSettings, Transport};
pub use plugins::{PluginCatalog, PluginError, PluginRegistry};
pub use services::{ConsumersHandle, ConsumersService, ConsumersSnapshot, ServiceSettings};
