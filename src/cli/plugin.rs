//! Plugin CLI commands
//!
//! Provides commands for inspecting and scaffolding sink plugins.

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::plugins::adapter::detect;
use crate::plugins::manifest::MANIFEST_FILE;
use crate::plugins::{PluginCatalog, PluginDescriptor, PluginLoader, PluginValidator};

/// Plugin subcommands
#[derive(Subcommand, Debug)]
pub enum PluginSubcommand {
    /// List built-in and discovered plugins
    List,

    /// Validate a plugin directory (or its plugin.yaml)
    Validate {
        /// Path to the plugin directory
        path: PathBuf,
    },

    /// Generate a plugin directory with a manifest template
    Init {
        /// Sink type the plugin provides
        name: String,

        /// Catalog entry point implementing the sink
        #[arg(long, default_value = crate::sinks::STDOUT_ENTRY)]
        entry: String,

        /// Parent directory (defaults to the plugins directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Handle plugin CLI commands
pub async fn handle_plugin_command(subcommand: PluginSubcommand, config: &Config) -> Result<()> {
    tracing::debug!("Handling plugin command: {:?}", subcommand);

    match subcommand {
        PluginSubcommand::List => list_plugins(config),
        PluginSubcommand::Validate { path } => validate_plugin(&path),
        PluginSubcommand::Init {
            name,
            entry,
            output,
        } => init_plugin(&name, &entry, output.unwrap_or_else(|| config.plugins_dir())),
    }
}

/// One line of `plugin list`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginRow {
    pub name: String,
    pub version: String,
    /// Detected API version, or why detection failed
    pub api: String,
    /// "built-in" or the plugin directory
    pub source: String,
}

impl PluginRow {
    pub fn from_descriptor(descriptor: PluginDescriptor, catalog: &PluginCatalog) -> Self {
        let name = descriptor.name().to_string();
        let version = descriptor.manifest.version.clone();
        let source = if descriptor.is_builtin() {
            "built-in".to_string()
        } else {
            descriptor.path.display().to_string()
        };
        let api = match catalog
            .resolve(&name, &descriptor.manifest.entry)
            .and_then(|export| detect(descriptor, export))
        {
            Ok(adapter) => adapter.api_version().to_string(),
            Err(_) => "-".to_string(),
        };

        Self {
            name,
            version,
            api,
            source,
        }
    }
}

/// Aligned `plugin list` output, one plugin per line
pub fn format_plugin_rows(rows: &[PluginRow]) -> String {
    let width = rows.iter().map(|r| r.name.len()).max().unwrap_or(0);
    rows.iter()
        .map(|row| {
            format!(
                "{:<width$}  v{:<8} {:<3} {}",
                row.name,
                row.version,
                row.api,
                row.source,
                width = width
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// List built-in and discovered plugins
fn list_plugins(config: &Config) -> Result<()> {
    let catalog = PluginCatalog::with_builtins();
    let loader = PluginLoader::with_dir(config.plugins_dir());

    let discovered = match loader.load_all() {
        Ok(plugins) => plugins,
        Err(e) => {
            println!("No plugins discovered ({:#})", e);
            Vec::new()
        }
    };

    let mut rows: Vec<PluginRow> = crate::sinks::builtin_manifests()
        .into_iter()
        .filter(|m| !discovered.iter().any(|d| d.name() == m.name))
        .map(|m| PluginRow::from_descriptor(PluginDescriptor::builtin(m), &catalog))
        .collect();
    rows.extend(
        discovered
            .into_iter()
            .map(|d| PluginRow::from_descriptor(d, &catalog)),
    );
    rows.sort_by(|a, b| a.name.cmp(&b.name));

    println!("Plugins ({}):\n", rows.len());
    println!("{}", format_plugin_rows(&rows));
    println!("\nPlugins directory: {}", loader.plugins_dir().display());

    Ok(())
}

/// Validate a plugin directory
fn validate_plugin(path: &Path) -> Result<()> {
    let dir = if path.is_file() {
        path.parent().unwrap_or(Path::new("."))
    } else {
        path
    };
    println!("Validating plugin: {:?}", dir);

    if !dir.join(MANIFEST_FILE).exists() {
        anyhow::bail!("Plugin manifest not found: {:?}", dir.join(MANIFEST_FILE));
    }

    let manifest = PluginLoader::load_plugin(dir).context("Plugin validation failed")?;
    PluginValidator::validate(&manifest)?;

    let catalog = PluginCatalog::with_builtins();
    let row = PluginRow::from_descriptor(
        PluginDescriptor::new(manifest.clone(), dir.to_path_buf()),
        &catalog,
    );

    println!("✓ Plugin is valid!");
    println!("\nPlugin details:");
    println!("  Name: {}", manifest.name);
    println!("  Version: {}", manifest.version);
    println!("  Entry: {}", manifest.entry);
    println!("  API: {}", row.api);
    if let Some(desc) = &manifest.description {
        println!("  Description: {}", desc);
    }
    if !catalog.contains(&manifest.entry) {
        println!(
            "\n⚠ Entry point '{}' is not compiled into this binary (available: {})",
            manifest.entry,
            catalog.entries().join(", ")
        );
    }

    Ok(())
}

/// Manifest template written by `plugin init`
pub fn plugin_template(name: &str, entry: &str) -> String {
    format!(
        r#"name: {name}
version: 1.0.0
entry: {entry}
description: "{name} sink"

# v1 entry points only: what consumers of this type can do.
# allows_pull: false
# allows_push: true

# Delivery pipeline defaults for consumers of this type. A consumer may still
# override them in its own config.
# pipeline:
#   concurrency: 5
#   maxQueueSize: 1000
#   maxPayloadBytes: 99000
"#
    )
}

/// Generate a plugin directory
fn init_plugin(name: &str, entry: &str, parent: PathBuf) -> Result<()> {
    let plugin_dir = parent.join(name);
    let manifest_path = plugin_dir.join(MANIFEST_FILE);

    if manifest_path.exists() {
        anyhow::bail!(
            "Plugin manifest already exists: {:?}\nUse a different name or specify --output",
            manifest_path
        );
    }

    std::fs::create_dir_all(&plugin_dir)
        .with_context(|| format!("Failed to create plugin directory: {:?}", plugin_dir))?;
    std::fs::write(&manifest_path, plugin_template(name, entry))
        .with_context(|| format!("Failed to write plugin manifest: {:?}", manifest_path))?;

    println!("✓ Plugin template created: {:?}", manifest_path);
    println!("\nNext steps:");
    println!("  1. Edit the manifest to pick the entry point and pipeline defaults");
    println!("  2. Validate: telemetry-relay plugin validate {:?}", plugin_dir);
    println!("  3. Declare a consumer with `type: {}`", name);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::PluginManifest;

    #[test]
    fn test_format_plugin_rows() {
        let catalog = PluginCatalog::with_builtins();
        let rows = vec![
            PluginRow::from_descriptor(
                PluginDescriptor::builtin(
                    PluginManifest::new("Default", "0.1.0")
                        .with_entry("default")
                        .with_capabilities(true, true),
                ),
                &catalog,
            ),
            PluginRow::from_descriptor(
                PluginDescriptor::new(
                    PluginManifest::new("Splunk", "2.3.1").with_entry("stdout"),
                    PathBuf::from("/plugins/Splunk"),
                ),
                &catalog,
            ),
            PluginRow::from_descriptor(
                PluginDescriptor::new(
                    PluginManifest::new("Kafka", "1.0.0"),
                    PathBuf::from("/plugins/Kafka"),
                ),
                &catalog,
            ),
        ];

        insta::assert_snapshot!(format_plugin_rows(&rows), @r"
        Default  v0.1.0    v1  built-in
        Splunk   v2.3.1    v2  /plugins/Splunk
        Kafka    v1.0.0    -   /plugins/Kafka
        ");
    }

    #[test]
    fn test_template_is_a_valid_manifest() {
        let manifest: PluginManifest =
            serde_yaml::from_str(&plugin_template("my-sink", "generic-http")).unwrap();
        assert_eq!(manifest.name, "my-sink");
        assert_eq!(manifest.entry, "generic-http");
        PluginValidator::validate(&manifest).unwrap();
    }

    #[test]
    fn test_init_then_validate() {
        let temp = tempfile::TempDir::new().unwrap();
        init_plugin("Splunk", "stdout", temp.path().to_path_buf()).unwrap();

        let manifest = PluginLoader::load_plugin(&temp.path().join("Splunk")).unwrap();
        assert_eq!(manifest.name, "Splunk");
        assert!(validate_plugin(&temp.path().join("Splunk")).is_ok());

        // refuses to overwrite
        assert!(init_plugin("Splunk", "stdout", temp.path().to_path_buf()).is_err());
    }
}
