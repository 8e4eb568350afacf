// SPDX-License-Identifier: MIT

//! Centralized environment variable access for the daemon crate.

use std::path::PathBuf;

/// Daemon version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve the state directory: `WARDEN_STATE_DIR` > `/var/lib/warden`.
pub fn state_dir() -> PathBuf {
    std::env::var("WARDEN_STATE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/warden"))
}

/// Configuration file override.
pub fn config_path() -> Option<PathBuf> {
    std::env::var("WARDEN_CONFIG").ok().map(PathBuf::from)
}

/// HTTP port override (takes precedence over the config file).
pub fn http_port() -> Option<u16> {
    std::env::var("WARDEN_HTTP_PORT").ok().and_then(|s| s.parse::<u16>().ok())
}
