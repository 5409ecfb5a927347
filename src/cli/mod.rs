//! CLI command handling module
//!
//! Handles all CLI subcommands and argument parsing.

mod config;
mod logging;
mod plugin;
mod run;
mod version;

pub use config::{ConfigSubcommand, handle_config_command};
pub use logging::{LogTarget, init_logging};
pub use plugin::{PluginRow, PluginSubcommand, format_plugin_rows, handle_plugin_command};
pub use run::{RunArgs, build_registry, context_from_line, run};
pub use version::display_version;
