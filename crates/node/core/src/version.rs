//! Version information for the ember node.

/// The version string from Cargo.toml.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Client name and version, e.g. for logs and peer-facing strings.
pub const CLIENT_VERSION: &str = concat!("ember/v", env!("CARGO_PKG_VERSION"));
