//! Plugin discovery tests
//!
//! Plugin directories on disk, lazily resolved manifests and the consumers
//! service loading them through a catalog of entry points.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

use telemetry_relay::cli::build_registry;
use telemetry_relay::config::declaration::{ConfigChange, Declaration, InstanceId};
use telemetry_relay::data::{DataContext, DataMask};
use telemetry_relay::plugins::api::{ConsumerCall, ConsumerFn};
use telemetry_relay::plugins::manifest::MANIFEST_FILE;
use telemetry_relay::plugins::{PluginCatalog, PluginLoader};
use telemetry_relay::services::{ConsumersService, ServiceSettings};

/// Pull-capable sink answering with the number of contexts it was given
struct Counter;

#[async_trait]
impl ConsumerFn for Counter {
    async fn call(&self, call: ConsumerCall) -> anyhow::Result<Option<Value>> {
        Ok(Some(json!({ "count": call.payload.contexts().len() })))
    }
}

fn write_plugin(root: &Path, dir: &str, manifest: &str) {
    let plugin_dir = root.join(dir);
    std::fs::create_dir_all(&plugin_dir).unwrap();
    std::fs::write(plugin_dir.join(MANIFEST_FILE), manifest).unwrap();
}

fn plugins_dir() -> TempDir {
    let dir = TempDir::new().unwrap();
    write_plugin(
        dir.path(),
        "Counter",
        "name: Counter\nversion: 1.2.0\nentry: counter\nallows_pull: true\nallows_push: false\n",
    );
    write_plugin(dir.path(), "Unused", "name: Unused\nversion: 0.1.0\nentry: counter\n");
    write_plugin(dir.path(), "Mislabeled", "name: Other\nversion: 1.0.0\nentry: counter\n");
    write_plugin(dir.path(), "Garbled", "name: [unterminated\n");
    // stray files next to plugin directories are ignored
    std::fs::write(dir.path().join("README.md"), "plugins live here").unwrap();
    dir
}

fn catalog() -> PluginCatalog {
    let mut catalog = PluginCatalog::with_builtins();
    catalog.register_function("counter", Arc::new(Counter));
    catalog
}

fn change(yaml: &str) -> ConfigChange {
    ConfigChange::full(&Declaration::from_yaml(yaml).unwrap())
}

#[test]
fn test_registry_lists_directories_and_builtins() {
    let dir = plugins_dir();
    let registry = build_registry(dir.path()).unwrap();

    assert_eq!(
        registry.names(),
        vec![
            "Counter",
            "Default",
            "Garbled",
            "Generic_HTTP",
            "Mislabeled",
            "Stdout",
            "Unused"
        ]
    );
    // nothing on disk has been read yet
    assert!(!registry.is_resolved("Counter"));
    assert!(registry.is_resolved("Default"));
}

#[test]
fn test_missing_plugins_directory_is_fatal() {
    let dir = TempDir::new().unwrap();
    let err = build_registry(&dir.path().join("absent")).unwrap_err();
    assert!(format!("{:#}", err).contains("plugins directory does not exist"));
}

#[test]
fn test_plugin_directory_shadows_builtin() {
    let dir = TempDir::new().unwrap();
    write_plugin(dir.path(), "Stdout", "name: Stdout\nversion: 9.9.9\nentry: counter\n");

    let mut registry = build_registry(dir.path()).unwrap();
    let descriptor = registry.descriptor("Stdout").unwrap();
    assert_eq!(descriptor.manifest.version, "9.9.9");
    assert_eq!(descriptor.manifest.entry, "counter");
    assert_eq!(descriptor.path, dir.path().join("Stdout"));
}

#[tokio::test]
async fn test_consumers_resolve_only_referenced_plugins() {
    let dir = plugins_dir();
    let registry = build_registry(dir.path()).unwrap();
    let mut service = ConsumersService::new(catalog(), registry, ServiceSettings::default());

    let report = service
        .reconcile(&change(
            r#"
consumers:
  - {name: counter, type: Counter}
  - {name: mislabeled, type: Mislabeled}
  - {name: garbled, type: Garbled}
  - {name: fallback, type: Default}
"#,
        ))
        .await
        .unwrap();

    assert_eq!(
        report.loaded,
        vec![
            InstanceId::default_ns("counter"),
            InstanceId::default_ns("fallback")
        ]
    );
    assert_eq!(report.failed.len(), 2);
    let message = |name: &str| {
        report
            .failed
            .iter()
            .find(|(id, _)| id.name() == name)
            .map(|(_, message)| message.clone())
            .unwrap()
    };
    assert!(message("mislabeled").contains("manifest declares 'Other'"));
    assert!(message("garbled").contains("Failed to parse plugin YAML"));

    assert!(service.registry().is_resolved("Counter"));
    assert!(!service.registry().is_resolved("Unused"));
}

#[tokio::test]
async fn test_idle_plugin_manifest_is_read_again() {
    let dir = plugins_dir();
    let registry = build_registry(dir.path()).unwrap();
    let mut service = ConsumersService::new(catalog(), registry, ServiceSettings::default());
    let declared = r#"
consumers:
  - {name: counter, type: Counter}
  - {name: fallback, type: Default}
"#;

    let report = service.reconcile(&change(declared)).await.unwrap();
    assert_eq!(report.loaded.len(), 2);
    assert!(service.registry().is_resolved("Counter"));

    service.reconcile(&change("consumers: []\n")).await.unwrap();
    assert!(!service.registry().is_resolved("Counter"));
    assert!(service.registry().is_resolved("Default"));

    // the edited manifest is picked up by the next pass
    write_plugin(dir.path(), "Counter", "name: Renamed\nversion: 2.0.0\nentry: counter\n");
    let report = service.reconcile(&change(declared)).await.unwrap();
    assert_eq!(report.loaded, vec![InstanceId::default_ns("fallback")]);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].1.contains("manifest declares 'Renamed'"));
}

#[tokio::test]
async fn test_pull_through_discovered_plugin() {
    let dir = plugins_dir();
    let registry = build_registry(dir.path()).unwrap();
    let mut service = ConsumersService::new(catalog(), registry, ServiceSettings::default());
    service
        .reconcile(&change("consumers: [{name: counter, type: Counter}]"))
        .await
        .unwrap();

    let snapshot = service.snapshot();
    let targets: Vec<_> = snapshot.pull_targets().collect();
    assert_eq!(targets.len(), 1);
    assert!(!targets[0].allows_push());

    let contexts = (0..3)
        .map(|n| DataContext::new("poll", json!({ "n": n })).shared())
        .collect();
    let value = targets[0]
        .gate()
        .pull(contexts, &DataMask::all())
        .await
        .unwrap();
    assert_eq!(value, json!({"count": 3}));
}

#[test]
fn test_load_all_skips_broken_and_rejects_duplicates() {
    let dir = TempDir::new().unwrap();
    write_plugin(dir.path(), "Good", "name: Good\nversion: 1.0.0\nentry: good\n");
    write_plugin(dir.path(), "Broken", "version: 1.0.0\n");

    let descriptors = PluginLoader::with_dir(dir.path().to_path_buf())
        .load_all()
        .unwrap();
    let names: Vec<&str> = descriptors.iter().map(|d| d.name()).collect();
    assert_eq!(names, vec!["Good"]);

    write_plugin(dir.path(), "Copy", "name: Good\nversion: 2.0.0\nentry: good\n");
    let err = PluginLoader::with_dir(dir.path().to_path_buf())
        .load_all()
        .unwrap_err();
    assert!(err.to_string().contains("Duplicate plugin names found: Good"));
}
