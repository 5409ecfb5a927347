//! Logging initialization

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Where log lines go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    /// A fresh temporary file
    TempFile,
    File(PathBuf),
}

impl LogTarget {
    /// Target of a `--log-file [PATH]` option
    pub fn from_option(log_file: Option<Option<PathBuf>>) -> Self {
        match log_file {
            None => LogTarget::Stderr,
            Some(None) => LogTarget::TempFile,
            Some(Some(path)) => LogTarget::File(path),
        }
    }
}

/// Filter used when `RUST_LOG` is not set
pub fn default_filter(level: &str, debug: bool) -> String {
    if debug {
        "debug".to_string()
    } else {
        level.to_string()
    }
}

/// Initialize logging
///
/// Standard output is left to the sinks, so logs go to stderr or a file.
/// Returns the log file path when logging to a file.
pub fn init_logging(level: &str, debug: bool, target: LogTarget) -> Result<Option<PathBuf>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(level, debug)));

    let path = match target {
        LogTarget::Stderr => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .with_target(debug)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;
            return Ok(None);
        }
        LogTarget::TempFile => {
            // Keep the file after exit; the path is printed for the user
            let temp_file = tempfile::Builder::new()
                .prefix("telemetry-relay-")
                .suffix(".log")
                .tempfile()
                .context("Failed to create log file")?;
            let (_, path) = temp_file.keep().context("Failed to keep log file")?;
            path
        }
        LogTarget::File(path) => path,
    };

    let file = open_log_file(&path)?;
    tracing_subscriber::fmt()
        .with_writer(file)
        .with_env_filter(filter)
        .with_ansi(false) // No ANSI codes in log file
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(Some(path))
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        crate::config::paths::ensure_dir(parent)?;
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_target_from_option() {
        assert_eq!(LogTarget::from_option(None), LogTarget::Stderr);
        assert_eq!(LogTarget::from_option(Some(None)), LogTarget::TempFile);
        assert_eq!(
            LogTarget::from_option(Some(Some(PathBuf::from("relay.log")))),
            LogTarget::File(PathBuf::from("relay.log"))
        );
    }

    #[test]
    fn test_default_filter() {
        assert_eq!(default_filter("warn", false), "warn");
        assert_eq!(default_filter("warn", true), "debug");
    }
}
