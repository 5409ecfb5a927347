//! Plugin registry
//!
//! Keeps the discovered plugin candidates and resolves their descriptors
//! lazily, the first time configuration references a sink type.

use super::adapter::PluginDescriptor;
use super::loader::{PluginCandidate, PluginLoader};
use super::{PluginError, PluginResult};
use std::collections::HashMap;
use std::path::PathBuf;

/// Plugin registry holds discovered candidates and loaded descriptors
#[derive(Debug, Default)]
pub struct PluginRegistry {
    candidates: HashMap<String, PathBuf>,
    descriptors: HashMap<String, PluginDescriptor>,
}

impl PluginRegistry {
    /// Create a new empty plugin registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a plugin registry from discovered candidates
    pub fn from_candidates(candidates: Vec<PluginCandidate>) -> Self {
        let mut registry = Self::new();
        for candidate in candidates {
            registry.candidates.insert(candidate.name, candidate.path);
        }
        registry
    }

    /// Register an already-resolved plugin (e.g. a built-in sink)
    ///
    /// A discovered plugin directory of the same name takes precedence.
    pub fn register(&mut self, descriptor: PluginDescriptor) {
        if self.candidates.contains_key(descriptor.name()) {
            tracing::debug!(
                "Plugin '{}' provided by plugins directory, skipping built-in",
                descriptor.name()
            );
            return;
        }
        self.descriptors
            .insert(descriptor.name().to_string(), descriptor);
    }

    /// Resolve a plugin by sink type, reading its manifest on first use
    pub fn descriptor(&mut self, name: &str) -> PluginResult<&PluginDescriptor> {
        if !self.descriptors.contains_key(name) {
            let path = self
                .candidates
                .get(name)
                .ok_or_else(|| PluginError::NotFound(name.to_string()))?
                .clone();

            let manifest =
                PluginLoader::load_plugin(&path).map_err(|e| PluginError::load(name, format!("{:#}", e)))?;
            if manifest.name != name {
                return Err(PluginError::load(
                    name,
                    format!(
                        "manifest declares '{}' but lives in plugin directory '{}'",
                        manifest.name, name
                    ),
                ));
            }

            tracing::debug!("Resolved plugin '{}' from {:?}", name, path);
            self.descriptors
                .insert(name.to_string(), PluginDescriptor::new(manifest, path));
        }

        self.descriptors
            .get(name)
            .ok_or_else(|| PluginError::NotFound(name.to_string()))
    }

    /// Drop the resolved manifest of a plugin directory so the next reference
    /// reads `plugin.yaml` again; built-in descriptors are kept
    pub fn forget(&mut self, name: &str) -> bool {
        if !self.candidates.contains_key(name) {
            return false;
        }
        self.descriptors.remove(name).is_some()
    }

    /// Names of every known plugin, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .candidates
            .keys()
            .chain(self.descriptors.keys())
            .cloned()
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// Check if a plugin is known
    pub fn contains(&self, name: &str) -> bool {
        self.candidates.contains_key(name) || self.descriptors.contains_key(name)
    }

    /// Whether the plugin's manifest has been read already
    pub fn is_resolved(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    /// Get the number of known plugins
    pub fn len(&self) -> usize {
        self.names().len()
    }

    /// Check if the registry is empty
    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty() && self.descriptors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::manifest::{MANIFEST_FILE, PluginManifest};
    use tempfile::TempDir;

    fn candidate(root: &std::path::Path, dir: &str, yaml: &str) -> PluginCandidate {
        let path = root.join(dir);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join(MANIFEST_FILE), yaml).unwrap();
        PluginCandidate {
            name: dir.to_string(),
            path,
        }
    }

    #[test]
    fn test_empty_registry() {
        let registry = PluginRegistry::new();
        assert!(registry.is_empty());
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn test_lazy_resolution() {
        let temp_dir = TempDir::new().unwrap();
        let stdout = candidate(temp_dir.path(), "Stdout", "name: Stdout\nversion: 1.0.0\nentry: stdout\n");

        let mut registry = PluginRegistry::from_candidates(vec![stdout]);
        assert!(registry.contains("Stdout"));
        assert!(!registry.is_resolved("Stdout"));

        let descriptor = registry.descriptor("Stdout").unwrap();
        assert_eq!(descriptor.manifest.entry, "stdout");
        assert!(registry.is_resolved("Stdout"));
    }

    #[test]
    fn test_unknown_plugin() {
        let mut registry = PluginRegistry::new();
        assert!(matches!(
            registry.descriptor("Splunk"),
            Err(PluginError::NotFound(_))
        ));
    }

    #[test]
    fn test_manifest_name_mismatch() {
        let temp_dir = TempDir::new().unwrap();
        let wrong = candidate(temp_dir.path(), "Splunk", "name: Other\nversion: 1.0.0\nentry: x\n");

        let mut registry = PluginRegistry::from_candidates(vec![wrong]);
        let err = registry.descriptor("Splunk").unwrap_err();
        assert!(err.to_string().contains("plugin directory 'Splunk'"));
    }

    #[test]
    fn test_forget_rereads_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let splunk = candidate(temp_dir.path(), "Splunk", "name: Splunk\nversion: 1.0.0\nentry: splunk\n");
        let mut registry = PluginRegistry::from_candidates(vec![splunk]);
        registry.register(PluginDescriptor::builtin(PluginManifest::new("Default", "1.0.0")));

        assert_eq!(registry.descriptor("Splunk").unwrap().manifest.version, "1.0.0");
        candidate(temp_dir.path(), "Splunk", "name: Splunk\nversion: 1.1.0\nentry: splunk\n");
        // still cached until forgotten
        assert_eq!(registry.descriptor("Splunk").unwrap().manifest.version, "1.0.0");

        assert!(registry.forget("Splunk"));
        assert!(!registry.is_resolved("Splunk"));
        assert_eq!(registry.descriptor("Splunk").unwrap().manifest.version, "1.1.0");

        assert!(!registry.forget("Default"));
        assert!(registry.is_resolved("Default"));
        assert!(!registry.forget("Unknown"));
    }

    #[test]
    fn test_directory_overrides_builtin() {
        let temp_dir = TempDir::new().unwrap();
        let stdout = candidate(temp_dir.path(), "Stdout", "name: Stdout\nversion: 9.0.0\nentry: custom\n");

        let mut registry = PluginRegistry::from_candidates(vec![stdout]);
        registry.register(PluginDescriptor::builtin(PluginManifest::new("Stdout", "1.0.0")));
        registry.register(PluginDescriptor::builtin(PluginManifest::new("Default", "1.0.0")));

        assert_eq!(registry.names(), vec!["Default", "Stdout"]);
        assert_eq!(registry.descriptor("Stdout").unwrap().manifest.version, "9.0.0");
        assert_eq!(registry.descriptor("Default").unwrap().manifest.version, "1.0.0");
    }
}
