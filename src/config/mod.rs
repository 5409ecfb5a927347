//! Configuration system for telemetry-relay
//!
//! Two kinds of configuration live here: the runtime config of the relay
//! itself (plugin directory, pipeline defaults, poll interval), loaded in
//! layers, and the declared consumers file that the reconciler follows.

pub mod declaration;
pub mod loader;
pub mod paths;
pub mod schema;

pub use declaration::{
    ChangeScope, ConfigChange, DeclaredConsumer, Declaration, InstanceId, NormalizedConsumer,
    TraceSetting,
};
pub use loader::ConfigLoader;
pub use schema::Config;

use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;

/// Keys accepted by [`get_config_value`] and [`set_config_value`]
pub const CONFIG_KEYS: &[&str] = &[
    "pluginsDir",
    "declarationPath",
    "pollInterval",
    "logLevel",
    "pipeline.concurrency",
    "pipeline.maxQueueSize",
    "pipeline.maxPayloadBytes",
    "pipeline.debounceMs",
    "trace.directory",
];

fn display_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

fn optional_path(value: &str) -> Option<PathBuf> {
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

/// Get a configuration value by key (dot notation)
pub fn get_config_value(config: &schema::Config, key: &str) -> anyhow::Result<String> {
    match key {
        "pluginsDir" => Ok(display_path(&config.plugins_dir)),
        "declarationPath" => Ok(display_path(&config.declaration_path)),
        "pollInterval" => Ok(config.poll_interval.clone()),
        "logLevel" => Ok(config.log_level.clone()),
        "pipeline.concurrency" => Ok(config.pipeline.concurrency.to_string()),
        "pipeline.maxQueueSize" => Ok(config.pipeline.max_queue_size.to_string()),
        "pipeline.maxPayloadBytes" => Ok(config.pipeline.max_payload_bytes.to_string()),
        "pipeline.debounceMs" => Ok(config.pipeline.debounce_ms.to_string()),
        "trace.directory" => Ok(display_path(&config.trace.directory)),
        _ => Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }
}

/// Set a configuration value by key (dot notation)
///
/// An empty value clears the optional path keys.
pub fn set_config_value(config: &mut schema::Config, key: &str, value: &str) -> anyhow::Result<()> {
    match key {
        "pluginsDir" => config.plugins_dir = optional_path(value),
        "declarationPath" => config.declaration_path = optional_path(value),
        "pollInterval" => {
            parse_duration(value).context("pollInterval must be a duration like '5s'")?;
            config.poll_interval = value.to_string();
        }
        "logLevel" => config.log_level = value.to_string(),
        "pipeline.concurrency" => {
            config.pipeline.concurrency = value
                .parse()
                .context("pipeline.concurrency must be a number")?;
        }
        "pipeline.maxQueueSize" => {
            config.pipeline.max_queue_size = value
                .parse()
                .context("pipeline.maxQueueSize must be a number")?;
        }
        "pipeline.maxPayloadBytes" => {
            config.pipeline.max_payload_bytes = value
                .parse()
                .context("pipeline.maxPayloadBytes must be a number")?;
        }
        "pipeline.debounceMs" => {
            config.pipeline.debounce_ms = value
                .parse()
                .context("pipeline.debounceMs must be a number")?;
        }
        "trace.directory" => config.trace.directory = optional_path(value),
        _ => return Err(anyhow::anyhow!("Unknown configuration key: {}", key)),
    }

    Ok(())
}

/// Parse duration string like "30s", "1m", "500ms"
pub fn parse_duration(s: &str) -> anyhow::Result<Duration> {
    let s = s.trim();

    if let Some(ms) = s.strip_suffix("ms") {
        let value: u64 = ms.parse().context("Invalid milliseconds value")?;
        return Ok(Duration::from_millis(value));
    }

    if let Some(secs) = s.strip_suffix('s') {
        let value: u64 = secs.parse().context("Invalid seconds value")?;
        return Ok(Duration::from_secs(value));
    }

    if let Some(mins) = s.strip_suffix('m') {
        let value: u64 = mins.parse().context("Invalid minutes value")?;
        return Ok(Duration::from_secs(value * 60));
    }

    if let Some(hours) = s.strip_suffix('h') {
        let value: u64 = hours.parse().context("Invalid hours value")?;
        return Ok(Duration::from_secs(value * 3600));
    }

    // bare number = seconds
    let value: u64 = s.parse().context("Invalid duration format")?;
    Ok(Duration::from_secs(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse_duration("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse_duration("60").unwrap(), Duration::from_secs(60));
        assert!(parse_duration("invalid").is_err());
    }

    #[test]
    fn test_get_set_roundtrip_for_every_key() {
        let mut config = Config::default();
        for key in CONFIG_KEYS {
            let value = get_config_value(&config, key).unwrap();
            set_config_value(&mut config, key, &value).unwrap();
        }
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_set_config_value() {
        let mut config = Config::default();
        set_config_value(&mut config, "pipeline.concurrency", "8").unwrap();
        set_config_value(&mut config, "pluginsDir", "/srv/plugins").unwrap();
        assert_eq!(config.pipeline.concurrency, 8);
        assert_eq!(get_config_value(&config, "pluginsDir").unwrap(), "/srv/plugins");

        assert!(set_config_value(&mut config, "pollInterval", "later").is_err());
        assert!(set_config_value(&mut config, "pipeline.concurrency", "many").is_err());
        assert!(set_config_value(&mut config, "ui.skin", "x").is_err());
    }
}
