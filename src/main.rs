//! telemetry-relay - forwards telemetry to pluggable consumers
//!
//! Loads sink plugins, keeps the declared consumers running and delivers data
//! to them until interrupted.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use telemetry_relay::cli::{self, ConfigSubcommand, LogTarget, PluginSubcommand, RunArgs};
use telemetry_relay::config::ConfigLoader;

/// telemetry-relay - forwards telemetry to pluggable consumers
#[derive(Parser, Debug)]
#[command(name = "telemetry-relay")]
#[command(about = "Forwards telemetry to pluggable consumers", long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(long, short = 'd', global = true)]
    debug: bool,

    /// Write logs to a file (a temporary file when no path is given)
    #[arg(long, global = true)]
    log_file: Option<Option<PathBuf>>,

    /// Configuration file layered over the root config
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

/// Main commands
#[derive(Subcommand, Debug)]
enum Command {
    /// Run the relay until ctrl-c
    Run(RunArgs),
    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
    /// Plugin management
    Plugin {
        #[command(subcommand)]
        subcommand: PluginSubcommand,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    match args.command {
        Command::Config { subcommand } => {
            cli::handle_config_command(subcommand, args.config.as_deref()).await
        }
        Command::Version => {
            cli::display_version();
            Ok(())
        }
        Command::Plugin { subcommand } => {
            let config = ConfigLoader::load(args.config.as_deref())?;
            cli::init_logging(
                &config.log_level,
                args.debug,
                LogTarget::from_option(args.log_file),
            )?;
            cli::handle_plugin_command(subcommand, &config).await
        }
        Command::Run(run_args) => {
            let config = ConfigLoader::load(args.config.as_deref())?;
            ConfigLoader::check(&config)?;

            let log_file = cli::init_logging(
                &config.log_level,
                args.debug,
                LogTarget::from_option(args.log_file),
            )?;
            if let Some(ref log_path) = log_file {
                eprintln!("Logs written to: {}", log_path.display());
            }
            tracing::debug!("Configuration loaded: {:?}", config);

            cli::run(config, run_args).await
        }
    }
}
