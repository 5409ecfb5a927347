// Plugin runtime for telemetry-relay
//
// Discovers sink plugins, resolves their entry points, detects which API shape
// they export and normalizes both shapes behind one adapter contract.

pub mod adapter;
pub mod api;
pub mod catalog;
pub mod fault;
pub mod loader;
pub mod logger;
pub mod manifest;
pub mod registry;
pub mod tracer;
pub mod validator;

pub use adapter::{ApiVersion, LiveInstance, PluginDescriptor, SinkAdapter};
pub use api::{
    ConsumerCall, ConsumerContext, ConsumerFn, ConsumerInstance, ConsumerModule, InstanceMethod,
    ModuleContext, ModuleLoader, ModuleMethod,
};
pub use catalog::{PluginCatalog, PluginExport};
pub use loader::PluginLoader;
pub use logger::ConsumerLogger;
pub use manifest::PluginManifest;
pub use registry::PluginRegistry;
pub use tracer::{FileTracer, Tracer};
pub use validator::PluginValidator;

/// Plugin errors
///
/// Every failure that originates in plugin-provided code is converted into one
/// of these variants at the fault boundary; none of them abort the runtime.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PluginError {
    #[error("Invalid plugin manifest: {0}")]
    InvalidManifest(String),

    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Failed to load plugin '{plugin}': {message}")]
    LoadError { plugin: String, message: String },

    #[error("plugin '{0}' should export function (v1) or loader object (v2)")]
    InvalidExport(String),

    #[error("plugin '{plugin}' has no required method {method}")]
    MethodMissing {
        plugin: String,
        method: &'static str,
    },

    #[error("plugin '{plugin}' failed in {operation}: {message}")]
    Lifecycle {
        plugin: String,
        operation: &'static str,
        message: String,
    },

    #[error("consumer '{instance}' (plugin '{plugin}') failed to process data: {message}")]
    Delivery {
        plugin: String,
        instance: String,
        message: String,
    },

    #[error("consumer '{0}' is unloading")]
    Unloading(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl PluginError {
    pub(crate) fn load(plugin: &str, message: impl std::fmt::Display) -> Self {
        PluginError::LoadError {
            plugin: plugin.to_string(),
            message: message.to_string(),
        }
    }

    pub(crate) fn lifecycle(
        plugin: &str,
        operation: &'static str,
        message: impl std::fmt::Display,
    ) -> Self {
        PluginError::Lifecycle {
            plugin: plugin.to_string(),
            operation,
            message: message.to_string(),
        }
    }
}

/// Result type for plugin operations
pub type PluginResult<T> = Result<T, PluginError>;
