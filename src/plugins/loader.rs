//! Plugin loader
//!
//! Scans the plugins directory for candidate plugins (one sub-directory per
//! sink type) and loads their manifests with validation and conflict detection.

use super::adapter::PluginDescriptor;
use super::manifest::{MANIFEST_FILE, PluginManifest};
use super::validator::PluginValidator;
use super::{PluginError, PluginResult};
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// A plugin directory found during discovery; its manifest is not read yet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginCandidate {
    /// Sink type, taken from the directory name
    pub name: String,
    pub path: PathBuf,
}

/// Plugin loader
pub struct PluginLoader {
    plugins_dir: PathBuf,
}

impl PluginLoader {
    /// Create a plugin loader for the given plugins directory
    pub fn with_dir(plugins_dir: PathBuf) -> Self {
        Self { plugins_dir }
    }

    pub fn plugins_dir(&self) -> &Path {
        &self.plugins_dir
    }

    /// List candidate plugin directories
    ///
    /// A missing or unreadable plugins directory is an error: the runtime
    /// cannot start without one.
    pub fn discover(&self) -> PluginResult<Vec<PluginCandidate>> {
        tracing::debug!("Discovering plugins in: {:?}", self.plugins_dir);

        if !self.plugins_dir.is_dir() {
            return Err(PluginError::load(
                "plugins",
                format!("plugins directory does not exist: {:?}", self.plugins_dir),
            ));
        }

        let entries = std::fs::read_dir(&self.plugins_dir).map_err(|e| {
            PluginError::load(
                "plugins",
                format!("failed to read plugins directory {:?}: {}", self.plugins_dir, e),
            )
        })?;

        let mut candidates = Vec::new();
        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!("Failed to read directory entry: {}", e);
                    continue;
                }
            };
            let path = entry.path();

            // Skip non-directories
            if !path.is_dir() {
                continue;
            }

            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                tracing::warn!("Skipping plugin directory with non UTF-8 name: {:?}", path);
                continue;
            };

            candidates.push(PluginCandidate {
                name: name.to_string(),
                path: path.clone(),
            });
        }

        candidates.sort_by(|a, b| a.name.cmp(&b.name));
        tracing::debug!("Found {} plugin candidate(s)", candidates.len());
        Ok(candidates)
    }

    /// Load all plugins eagerly
    ///
    /// Broken plugins are logged and skipped; duplicate plugin names fail the
    /// whole load.
    pub fn load_all(&self) -> Result<Vec<PluginDescriptor>> {
        let mut plugins = Vec::new();
        let mut load_errors = Vec::new();

        for candidate in self.discover()? {
            match Self::load_plugin(&candidate.path) {
                Ok(manifest) => {
                    tracing::info!("Loaded plugin: {}", manifest.name);
                    plugins.push(PluginDescriptor::new(manifest, candidate.path));
                }
                Err(e) => {
                    tracing::warn!("Failed to load plugin {:?}: {:#}", candidate.path, e);
                    load_errors.push((candidate.path, e));
                }
            }
        }

        if !plugins.is_empty() {
            tracing::debug!("Checking for conflicts across {} plugins", plugins.len());
            Self::check_name_conflicts(&plugins)?;
        }

        if !load_errors.is_empty() {
            tracing::warn!(
                "Loaded {} plugins with {} errors",
                plugins.len(),
                load_errors.len()
            );
        } else if !plugins.is_empty() {
            tracing::info!(
                "Successfully loaded {} plugin(s): {}",
                plugins.len(),
                plugins
                    .iter()
                    .map(|p| p.name())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        } else {
            tracing::debug!("No plugins found in {:?}", self.plugins_dir);
        }

        Ok(plugins)
    }

    /// Load and validate the manifest of one plugin directory
    pub fn load_plugin(plugin_dir: &Path) -> Result<PluginManifest> {
        let path = plugin_dir.join(MANIFEST_FILE);
        tracing::debug!("Loading plugin manifest from: {:?}", path);

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read plugin manifest: {:?}", path))?;

        let manifest: PluginManifest = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse plugin YAML: {:?}", path))?;

        tracing::debug!(
            "Parsed plugin '{}' v{} from {:?}",
            manifest.name,
            manifest.version,
            path
        );

        PluginValidator::validate(&manifest)
            .with_context(|| format!("Plugin validation failed: {:?}", path))?;

        Ok(manifest)
    }

    /// Check for duplicate plugin names
    fn check_name_conflicts(plugins: &[PluginDescriptor]) -> PluginResult<()> {
        let mut seen_names = HashSet::new();
        let mut duplicates = Vec::new();

        for plugin in plugins {
            if !seen_names.insert(plugin.name()) {
                duplicates.push(plugin.name().to_string());
            }
        }

        if !duplicates.is_empty() {
            return Err(PluginError::ValidationError(format!(
                "Duplicate plugin names found: {}. Each plugin must have a unique name.",
                duplicates.join(", ")
            )));
        }

        Ok(())
    }
}
