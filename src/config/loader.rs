//! Configuration loading and merging logic
//!
//! Handles loading configuration from multiple sources and merging them
//! according to precedence rules.

use super::{paths, schema::Config};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with all layers merged
    ///
    /// Precedence order (highest to lowest):
    /// 1. Environment variable overrides
    /// 2. Explicit config file (`--config`)
    /// 3. Root config
    /// 4. Built-in defaults
    pub fn load(explicit: Option<&Path>) -> Result<Config> {
        let mut config = Self::load_defaults();

        if let Ok(root_config) = Self::load_file(&paths::root_config_path()) {
            config = Self::merge_config(config, root_config);
        }

        // an explicit file must exist and parse
        if let Some(path) = explicit {
            let explicit_config = Self::load_file(path)?;
            config = Self::merge_config(config, explicit_config);
        }

        config = Self::apply_env_overrides(config);

        Ok(config)
    }

    /// Load configuration from a file
    pub fn load_file(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration by loading and checking for errors
    ///
    /// Fails on invalid YAML, invalid value types, an unparsable poll
    /// interval and zero pipeline limits.
    pub fn validate(explicit: Option<&Path>) -> Result<()> {
        let config = Self::load(explicit).context("Failed to load merged configuration")?;
        Self::check(&config)
    }

    /// Semantic checks on an already parsed configuration
    pub fn check(config: &Config) -> Result<()> {
        config
            .poll_interval()
            .with_context(|| format!("Invalid pollInterval '{}'", config.poll_interval))?;

        if config.pipeline.concurrency == 0 {
            return Err(anyhow::anyhow!("pipeline.concurrency must be at least 1"));
        }
        if config.pipeline.max_payload_bytes == 0 {
            return Err(anyhow::anyhow!("pipeline.maxPayloadBytes must be at least 1"));
        }

        Ok(())
    }

    /// Load default configuration
    pub fn load_defaults() -> Config {
        Config::default()
    }

    /// Merge two configurations, with `other` taking precedence
    ///
    /// Optional paths only override when `other` sets them.
    fn merge_config(base: Config, other: Config) -> Config {
        Config {
            plugins_dir: other.plugins_dir.or(base.plugins_dir),
            declaration_path: other.declaration_path.or(base.declaration_path),
            poll_interval: other.poll_interval,
            log_level: other.log_level,
            pipeline: other.pipeline,
            trace: super::schema::TraceConfig {
                directory: other.trace.directory.or(base.trace.directory),
            },
        }
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(mut config: Config) -> Config {
        if let Ok(dir) = std::env::var("TELEMETRY_RELAY_PLUGINS_DIR") {
            config.plugins_dir = Some(PathBuf::from(dir));
        }

        if let Ok(path) = std::env::var("TELEMETRY_RELAY_DECLARATION") {
            config.declaration_path = Some(PathBuf::from(path));
        }

        if let Ok(level) = std::env::var("TELEMETRY_RELAY_LOG_LEVEL") {
            config.log_level = level;
        }

        config
    }

    /// Save configuration to a file
    pub fn save(config: &Config, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            paths::ensure_dir(parent)?;
        }

        let yaml =
            serde_yaml::to_string(config).context("Failed to serialize configuration to YAML")?;

        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Save root configuration
    pub fn save_root(config: &Config) -> Result<()> {
        Self::save(config, &paths::root_config_path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_defaults() {
        let config = ConfigLoader::load_defaults();
        assert_eq!(config.poll_interval, "5s");
        assert_eq!(config.log_level, "info");
        assert!(config.plugins_dir.is_none());
    }

    #[test]
    fn test_merge_config() {
        let base = Config {
            plugins_dir: Some(PathBuf::from("/base/plugins")),
            ..Default::default()
        };
        let other = Config {
            poll_interval: "30s".to_string(),
            ..Default::default()
        };

        let merged = ConfigLoader::merge_config(base, other);
        assert_eq!(merged.poll_interval, "30s");
        assert_eq!(merged.plugins_dir, Some(PathBuf::from("/base/plugins")));
    }

    #[test]
    fn test_save_and_load_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("nested").join("config.yaml");

        let mut config = Config::default();
        config.pipeline.concurrency = 3;
        ConfigLoader::save(&config, &path).unwrap();

        let loaded = ConfigLoader::load_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_check_rejects_bad_values() {
        let mut config = Config::default();
        config.poll_interval = "soon".to_string();
        assert!(ConfigLoader::check(&config).is_err());

        let mut config = Config::default();
        config.pipeline.concurrency = 0;
        let err = ConfigLoader::check(&config).unwrap_err();
        assert!(err.to_string().contains("pipeline.concurrency"));
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let err = ConfigLoader::load(Some(Path::new("/nonexistent/relay.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_env_overrides() {
        // SAFETY: set_var is unsafe in Rust 2024 due to potential data races.
        // No other test reads these variables.
        unsafe {
            std::env::set_var("TELEMETRY_RELAY_PLUGINS_DIR", "/env/plugins");
            std::env::set_var("TELEMETRY_RELAY_LOG_LEVEL", "debug");
        }

        let config = ConfigLoader::apply_env_overrides(Config::default());

        assert_eq!(config.plugins_dir, Some(PathBuf::from("/env/plugins")));
        assert_eq!(config.log_level, "debug");

        // SAFETY: same as above.
        unsafe {
            std::env::remove_var("TELEMETRY_RELAY_PLUGINS_DIR");
            std::env::remove_var("TELEMETRY_RELAY_LOG_LEVEL");
        }
    }
}
