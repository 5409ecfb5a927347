//! Plugin manifest schema
//!
//! Every plugin directory carries a `plugin.yaml` describing the sink type it
//! provides and the entry point that implements it.

use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineOverrides;

/// File name of the manifest inside a plugin directory
pub const MANIFEST_FILE: &str = "plugin.yaml";

/// Plugin manifest - root structure of a `plugin.yaml`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PluginManifest {
    /// Sink type this plugin provides (e.g. "Splunk"); must be unique
    pub name: String,

    /// Plugin version (semver recommended)
    pub version: String,

    /// Entry point registered in the plugin catalog
    pub entry: String,

    /// Optional description
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// v1 only: whether consumers of this type answer pull requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allows_pull: Option<bool>,

    /// v1 only: whether consumers of this type accept pushed data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allows_push: Option<bool>,

    /// Default delivery pipeline settings for consumers of this type
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<PipelineOverrides>,
}

impl PluginManifest {
    /// Manifest for a plugin whose type and entry share a name
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            entry: name.to_string(),
            description: None,
            allows_pull: None,
            allows_push: None,
            pipeline: None,
        }
    }

    pub fn with_entry(mut self, entry: &str) -> Self {
        self.entry = entry.to_string();
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    pub fn with_capabilities(mut self, allows_pull: bool, allows_push: bool) -> Self {
        self.allows_pull = Some(allows_pull);
        self.allows_push = Some(allows_push);
        self
    }

    pub fn with_pipeline(mut self, pipeline: PipelineOverrides) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    /// Capabilities of v1 consumers; push-only unless stated otherwise
    pub fn v1_capabilities(&self) -> (bool, bool) {
        (
            self.allows_pull.unwrap_or(false),
            self.allows_push.unwrap_or(true),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_manifest() {
        let yaml = r#"
name: Splunk
version: 1.2.0
entry: splunk-hec
"#;
        let manifest: PluginManifest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(manifest.name, "Splunk");
        assert_eq!(manifest.entry, "splunk-hec");
        assert!(manifest.pipeline.is_none());
        assert_eq!(manifest.v1_capabilities(), (false, true));
    }

    #[test]
    fn test_parse_full_manifest() {
        let yaml = r#"
name: Prometheus
version: 0.3.0
entry: prometheus
description: Scrape endpoint
allows_pull: true
allows_push: false
pipeline:
  concurrency: 2
  maxPayloadBytes: 4096
"#;
        let manifest: PluginManifest = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(manifest.v1_capabilities(), (true, false));

        let pipeline = manifest.pipeline.unwrap();
        assert_eq!(pipeline.concurrency, Some(2));
        assert_eq!(pipeline.max_payload_bytes, Some(4096));
        assert_eq!(pipeline.max_queue_size, None);
    }

    #[test]
    fn test_missing_entry_is_rejected() {
        let yaml = "name: Splunk\nversion: 1.0.0\n";
        assert!(serde_yaml::from_str::<PluginManifest>(yaml).is_err());
    }
}
