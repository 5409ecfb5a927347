//! Plugin entry points
//!
//! Sink implementations are compiled into the binary and registered here
//! under an entry name. A plugin manifest selects its implementation through
//! its `entry` field; resolving the entry is the "load" step of a plugin.

use std::collections::HashMap;
use std::sync::Arc;

use super::api::{ConsumerFn, ModuleLoader};
use super::fault::guard_sync;
use super::{PluginError, PluginResult};

/// What an entry point exports
#[derive(Clone)]
pub enum PluginExport {
    /// v1: directly callable
    Function(Arc<dyn ConsumerFn>),
    /// v2: object exposing `load`
    Loader(Arc<dyn ModuleLoader>),
    /// Anything else; never usable
    Opaque(&'static str),
}

impl PluginExport {
    pub fn kind(&self) -> &'static str {
        match self {
            PluginExport::Function(_) => "function",
            PluginExport::Loader(_) => "loader",
            PluginExport::Opaque(kind) => kind,
        }
    }
}

impl std::fmt::Debug for PluginExport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PluginExport({})", self.kind())
    }
}

type ExportFactory = Arc<dyn Fn() -> anyhow::Result<PluginExport> + Send + Sync>;

/// Table of entry points known to this binary
#[derive(Clone, Default)]
pub struct PluginCatalog {
    entries: HashMap<String, ExportFactory>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the sinks shipped with telemetry-relay
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        crate::sinks::register_entries(&mut catalog);
        catalog
    }

    /// Register an entry point whose export is built on every load
    pub fn register<F>(&mut self, entry: &str, factory: F)
    where
        F: Fn() -> anyhow::Result<PluginExport> + Send + Sync + 'static,
    {
        self.entries.insert(entry.to_string(), Arc::new(factory));
    }

    /// Register a v1 callable
    pub fn register_function(&mut self, entry: &str, function: Arc<dyn ConsumerFn>) {
        self.register(entry, move || Ok(PluginExport::Function(function.clone())));
    }

    /// Register a v2 loader
    pub fn register_loader(&mut self, entry: &str, loader: Arc<dyn ModuleLoader>) {
        self.register(entry, move || Ok(PluginExport::Loader(loader.clone())));
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.entries.contains_key(entry)
    }

    pub fn entries(&self) -> Vec<&str> {
        let mut entries: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        entries.sort_unstable();
        entries
    }

    /// Load the entry point of `plugin`
    ///
    /// An unknown entry, a failing factory and a panicking factory are all
    /// load errors for that plugin.
    pub fn resolve(&self, plugin: &str, entry: &str) -> PluginResult<PluginExport> {
        let factory = self.entries.get(entry).ok_or_else(|| {
            PluginError::load(plugin, format!("entry point '{}' not found", entry))
        })?;

        guard_sync(|| factory()).map_err(|fault| PluginError::load(plugin, fault))
    }
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("entries", &self.entries())
            .finish()
    }
}
