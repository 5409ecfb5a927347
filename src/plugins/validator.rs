//! Plugin manifest validation
//!
//! Validates plugin manifests and provides helpful error messages for common issues.

use super::manifest::PluginManifest;
use super::{PluginError, PluginResult};
use crate::pipeline::PipelineOverrides;

/// Plugin manifest validator
pub struct PluginValidator;

impl PluginValidator {
    /// Validate a plugin manifest
    pub fn validate(manifest: &PluginManifest) -> PluginResult<()> {
        Self::validate_name(&manifest.name)?;
        Self::validate_version(&manifest.version)?;
        Self::validate_entry(&manifest.entry)?;
        Self::validate_capabilities(manifest)?;
        if let Some(pipeline) = &manifest.pipeline {
            Self::validate_pipeline(pipeline)?;
        }
        Ok(())
    }

    /// Validate plugin name
    fn validate_name(name: &str) -> PluginResult<()> {
        if name.is_empty() {
            return Err(PluginError::ValidationError(
                "Plugin name cannot be empty".to_string(),
            ));
        }

        // Name should be alphanumeric with hyphens/underscores
        if !name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(PluginError::ValidationError(format!(
                "Plugin name '{}' contains invalid characters. Use only alphanumeric, hyphens, and underscores",
                name
            )));
        }

        Ok(())
    }

    /// Validate version string
    fn validate_version(version: &str) -> PluginResult<()> {
        if version.is_empty() {
            return Err(PluginError::ValidationError(
                "Plugin version cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    fn validate_entry(entry: &str) -> PluginResult<()> {
        if entry.trim().is_empty() {
            return Err(PluginError::ValidationError(
                "Plugin entry cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// A v1 consumer must be pull-capable, push-capable or both
    fn validate_capabilities(manifest: &PluginManifest) -> PluginResult<()> {
        if manifest.v1_capabilities() == (false, false) {
            return Err(PluginError::ValidationError(format!(
                "Plugin '{}' disables both allows_pull and allows_push",
                manifest.name
            )));
        }
        Ok(())
    }

    /// Validate pipeline overrides
    fn validate_pipeline(pipeline: &PipelineOverrides) -> PluginResult<()> {
        let fields = [
            ("pipeline.concurrency", pipeline.concurrency),
            ("pipeline.maxQueueSize", pipeline.max_queue_size),
            ("pipeline.maxPayloadBytes", pipeline.max_payload_bytes),
        ];

        for (field_name, value) in fields {
            if value == Some(0) {
                return Err(PluginError::ValidationError(format!(
                    "Invalid {}: must be greater than 0",
                    field_name
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_manifest() -> PluginManifest {
        PluginManifest::new("Splunk", "1.0.0").with_entry("splunk")
    }

    #[test]
    fn test_valid_manifest() {
        let manifest = create_valid_manifest();
        assert!(PluginValidator::validate(&manifest).is_ok());
    }

    #[test]
    fn test_sink_type_names() {
        for name in ["Splunk", "Generic_HTTP", "azure-log-analytics"] {
            let mut manifest = create_valid_manifest();
            manifest.name = name.to_string();
            assert!(PluginValidator::validate(&manifest).is_ok(), "{}", name);
        }

        let cases = [
            ("", "name cannot be empty"),
            ("Splunk HEC", "invalid characters"),
            ("Azure/Logs", "invalid characters"),
        ];
        for (name, expected) in cases {
            let mut manifest = create_valid_manifest();
            manifest.name = name.to_string();
            let err = PluginValidator::validate(&manifest).unwrap_err();
            assert!(err.to_string().contains(expected), "{}: {}", name, err);
        }
    }

    #[test]
    fn test_empty_entry() {
        let mut manifest = create_valid_manifest();
        manifest.entry = "  ".to_string();
        let result = PluginValidator::validate(&manifest);
        assert!(result.unwrap_err().to_string().contains("entry cannot be empty"));
    }

    #[test]
    fn test_no_capability() {
        let manifest = create_valid_manifest().with_capabilities(false, false);
        let result = PluginValidator::validate(&manifest);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("disables both allows_pull and allows_push")
        );
    }

    #[test]
    fn test_zero_concurrency() {
        let manifest = create_valid_manifest().with_pipeline(PipelineOverrides {
            concurrency: Some(0),
            ..Default::default()
        });
        let result = PluginValidator::validate(&manifest);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("pipeline.concurrency")
        );
    }
}
