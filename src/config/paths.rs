//! Cross-platform directory path resolution
//!
//! Provides functions to resolve platform-appropriate paths for configuration
//! and plugins.
//! - Linux/macOS: XDG Base Directory specification (~/.config)
//! - Windows: Known Folder API (AppData\Roaming)

use std::path::{Path, PathBuf};

const APP_DIR: &str = "telemetry-relay";

/// Get the configuration directory path
///
/// `TELEMETRY_RELAY_CONFIG_DIR` wins when set and non-empty. Otherwise:
/// - Unix (Linux/macOS): $XDG_CONFIG_HOME/telemetry-relay when it is absolute,
///   else ~/.config/telemetry-relay
/// - Windows: %APPDATA%\telemetry-relay\config
///
/// A host without a home directory (service accounts, scratch containers)
/// gets `<tmp>/telemetry-relay` rather than a path relative to the cwd.
pub fn config_dir() -> PathBuf {
    let env = |key: &str| std::env::var_os(key).map(PathBuf::from);
    resolve_config_dir(env("TELEMETRY_RELAY_CONFIG_DIR"), env("XDG_CONFIG_HOME"), platform_config_base())
}

#[cfg(windows)]
fn platform_config_base() -> Option<PathBuf> {
    use directories::BaseDirs;
    BaseDirs::new().map(|dirs| dirs.config_dir().to_path_buf())
}

#[cfg(not(windows))]
fn platform_config_base() -> Option<PathBuf> {
    use directories::BaseDirs;
    BaseDirs::new().map(|dirs| dirs.home_dir().join(".config"))
}

fn resolve_config_dir(
    override_dir: Option<PathBuf>,
    xdg_config_home: Option<PathBuf>,
    platform_base: Option<PathBuf>,
) -> PathBuf {
    if let Some(dir) = override_dir.filter(|dir| !dir.as_os_str().is_empty()) {
        return dir;
    }
    // relative XDG values are invalid and must be ignored
    let base = xdg_config_home
        .filter(|dir| !cfg!(windows) && dir.is_absolute())
        .or(platform_base)
        .unwrap_or_else(std::env::temp_dir);
    let dir = base.join(APP_DIR);
    if cfg!(windows) { dir.join("config") } else { dir }
}

/// Get the root configuration file path
pub fn root_config_path() -> PathBuf {
    config_dir().join("config.yaml")
}

/// Default plugin discovery directory
pub fn plugins_dir() -> PathBuf {
    config_dir().join("plugins")
}

/// Default declared consumers file
pub fn declaration_path() -> PathBuf {
    config_dir().join("consumers.yaml")
}

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_share_config_dir() {
        let dir = config_dir();
        assert_eq!(plugins_dir(), dir.join("plugins"));
        assert_eq!(root_config_path(), dir.join("config.yaml"));
        assert_eq!(declaration_path(), dir.join("consumers.yaml"));
    }

    fn app_dir(base: &str) -> PathBuf {
        let dir = PathBuf::from(base).join(APP_DIR);
        if cfg!(windows) { dir.join("config") } else { dir }
    }

    #[test]
    #[cfg(not(windows))]
    fn test_resolve_config_dir() {
        let cases = [
            // (override, xdg, platform base, expected)
            (Some("/etc/relay"), Some("/xdg"), Some("/home/op/.config"), PathBuf::from("/etc/relay")),
            (Some(""), Some("/xdg"), Some("/home/op/.config"), app_dir("/xdg")),
            (None, Some("/xdg"), Some("/home/op/.config"), app_dir("/xdg")),
            (None, Some("relative/xdg"), Some("/home/op/.config"), app_dir("/home/op/.config")),
            (None, None, Some("/home/op/.config"), app_dir("/home/op/.config")),
        ];

        for (override_dir, xdg, base, expected) in cases {
            let resolved = resolve_config_dir(
                override_dir.map(PathBuf::from),
                xdg.map(PathBuf::from),
                base.map(PathBuf::from),
            );
            assert_eq!(resolved, expected, "override={:?} xdg={:?} base={:?}", override_dir, xdg, base);
        }
    }

    #[test]
    fn test_homeless_host_falls_back_to_temp() {
        let resolved = resolve_config_dir(None, None, None);
        assert!(resolved.starts_with(std::env::temp_dir()));
        assert!(resolved.is_absolute());
    }

    #[test]
    fn test_ensure_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let nested = temp.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
