//! Config command handlers

use anyhow::{Context, Result};
use clap::Subcommand;
use std::path::Path;

use crate::config::{CONFIG_KEYS, ConfigLoader, get_config_value, paths, set_config_value};

/// Configuration management subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigSubcommand {
    /// Get configuration value
    Get {
        /// Configuration key (e.g., "pluginsDir", "pipeline.concurrency")
        key: Option<String>,
    },
    /// Set configuration value in the root config file
    Set {
        /// Configuration key (e.g., "pluginsDir", "pipeline.concurrency")
        key: String,
        /// Configuration value
        value: String,
    },
    /// List all configuration
    List,
    /// Show configuration file path
    Path,
    /// Validate configuration
    Validate,
}

/// Handle configuration subcommands
pub async fn handle_config_command(cmd: ConfigSubcommand, explicit: Option<&Path>) -> Result<()> {
    match cmd {
        ConfigSubcommand::Get { key } => {
            let config = ConfigLoader::load(explicit).context("Failed to load configuration")?;

            if let Some(key) = key {
                let value = get_config_value(&config, &key)?;
                println!("{}", value);
            } else {
                let yaml =
                    serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
                print!("{}", yaml);
            }
        }
        ConfigSubcommand::Set { key, value } => {
            // Only the root file is rewritten; env overrides must not leak into it
            let root = paths::root_config_path();
            let mut config = ConfigLoader::load_file(&root)
                .unwrap_or_else(|_| ConfigLoader::load_defaults());

            set_config_value(&mut config, &key, &value)
                .with_context(|| format!("Failed to set {} = {}", key, value))?;

            ConfigLoader::save_root(&config).context("Failed to save configuration")?;
            println!("Configuration saved");
        }
        ConfigSubcommand::List => {
            let config = ConfigLoader::load(explicit).context("Failed to load configuration")?;
            for key in CONFIG_KEYS {
                println!("{} = {}", key, get_config_value(&config, key)?);
            }
        }
        ConfigSubcommand::Path => {
            println!("{}", paths::root_config_path().display());
        }
        ConfigSubcommand::Validate => match ConfigLoader::validate(explicit) {
            Ok(()) => {
                println!("Configuration is valid");
            }
            Err(e) => {
                eprintln!("Configuration validation failed: {:#}", e);
                std::process::exit(1);
            }
        },
    }

    Ok(())
}
