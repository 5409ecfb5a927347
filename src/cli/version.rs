//! Version command handler

/// Display version information
pub fn display_version() {
    println!("telemetry-relay {}", env!("CARGO_PKG_VERSION"));
    println!("  {}", env!("CARGO_PKG_DESCRIPTION"));
    println!("  License: {}", env!("CARGO_PKG_LICENSE"));
    println!(
        "  Built-in sinks: {}",
        crate::sinks::builtin_manifests()
            .iter()
            .map(|m| m.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );
}
