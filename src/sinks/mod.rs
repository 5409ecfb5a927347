//! Sinks shipped with telemetry-relay
//!
//! Each sink is registered twice: its entry point goes into the
//! [`PluginCatalog`] and a built-in manifest goes into the
//! [`PluginRegistry`], so the shipped sinks are usable without a plugin
//! directory. A plugin directory may still provide a manifest of the same name
//! and take precedence.

pub mod default_pull;
pub mod generic_http;
pub mod stdout;

use serde_json::json;
use std::sync::Arc;

use crate::data::DataContext;
use crate::plugins::{PluginCatalog, PluginDescriptor, PluginManifest, PluginRegistry};

/// Catalog entry of the `Default` sink
pub const DEFAULT_ENTRY: &str = "default";
/// Catalog entry of the `Stdout` sink
pub const STDOUT_ENTRY: &str = "stdout";
/// Catalog entry of the `Generic_HTTP` sink
pub const GENERIC_HTTP_ENTRY: &str = "generic-http";

/// Register the entry points of every shipped sink
pub fn register_entries(catalog: &mut PluginCatalog) {
    catalog.register_function(DEFAULT_ENTRY, Arc::new(default_pull::DefaultSink::new()));
    catalog.register_loader(STDOUT_ENTRY, Arc::new(stdout::StdoutLoader::stdout()));
    catalog.register_loader(GENERIC_HTTP_ENTRY, Arc::new(generic_http::HttpLoader));
}

/// Manifests of the shipped sinks
pub fn builtin_manifests() -> Vec<PluginManifest> {
    vec![
        PluginManifest::new("Default", env!("CARGO_PKG_VERSION"))
            .with_entry(DEFAULT_ENTRY)
            .with_description("Keeps the latest data for pull requests")
            .with_capabilities(true, true),
        PluginManifest::new("Stdout", env!("CARGO_PKG_VERSION"))
            .with_entry(STDOUT_ENTRY)
            .with_description("Writes newline-delimited JSON to standard output"),
        PluginManifest::new("Generic_HTTP", env!("CARGO_PKG_VERSION"))
            .with_entry(GENERIC_HTTP_ENTRY)
            .with_description("POSTs newline-delimited JSON batches to an HTTP endpoint"),
    ]
}

/// Add the shipped sinks to `registry`
pub fn register_builtins(registry: &mut PluginRegistry) {
    for manifest in builtin_manifests() {
        registry.register(PluginDescriptor::builtin(manifest));
    }
}

/// Registry holding only the shipped sinks
pub fn builtin_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    register_builtins(&mut registry);
    registry
}

/// One newline-terminated JSON record of a context
pub(crate) fn ndjson_line(context: &DataContext) -> anyhow::Result<Vec<u8>> {
    let mut record = json!({
        "type": context.event_type,
        "data": context.data,
    });
    if context.is_custom {
        record["custom"] = json!(true);
    }
    if let Some(namespace) = &context.namespace {
        record["namespace"] = json!(namespace);
    }

    let mut line = serde_json::to_vec(&record)?;
    line.push(b'\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ndjson_line() {
        let ctx = DataContext::new("syslog", json!({"msg": "up"})).with_namespace("finance");
        let line = ndjson_line(&ctx).unwrap();
        assert_eq!(
            String::from_utf8(line).unwrap(),
            "{\"data\":{\"msg\":\"up\"},\"namespace\":\"finance\",\"type\":\"syslog\"}\n"
        );
    }

    #[test]
    fn test_builtin_registry() {
        let registry = builtin_registry();
        assert_eq!(registry.names(), vec!["Default", "Generic_HTTP", "Stdout"]);
    }

    #[test]
    fn test_builtin_entries_resolve() {
        let catalog = PluginCatalog::with_builtins();
        for manifest in builtin_manifests() {
            assert!(catalog.resolve(&manifest.name, &manifest.entry).is_ok());
        }
    }
}
