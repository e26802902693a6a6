//! Information about the build.

/// Client ID used when none is configured.
pub const DEFAULT_CLIENT_ID: &str = env!("CARGO_PKG_NAME");
