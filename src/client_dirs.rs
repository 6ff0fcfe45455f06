//! Application directory paths for the chat client.
//!
//! Uses the [`dirs`] crate for platform-appropriate directory resolution.
//!
//! | Purpose | macOS | Linux |
//! |---------|-------|-------|
//! | App data | `~/Library/Application Support/misato/` | `~/.local/share/misato/` |
//! | Config | `~/Library/Application Support/misato/` | `~/.config/misato/` |
//!
//! # Environment Overrides
//!
//! - `MISATO_DATA_DIR` overrides [`data_dir`]
//! - `MISATO_CONFIG_DIR` overrides [`config_dir`]

use std::path::PathBuf;

/// Application data root directory.
///
/// Holds the durable session identity. Resolves to `dirs::data_dir()/misato/`
/// unless `MISATO_DATA_DIR` is set.
#[must_use]
pub fn data_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("MISATO_DATA_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::data_dir()
        .map(|d| d.join("misato"))
        .unwrap_or_else(|| PathBuf::from("/tmp/misato-data"))
}

/// Application config directory.
///
/// Resolves to `dirs::config_dir()/misato/` unless `MISATO_CONFIG_DIR` is set.
#[must_use]
pub fn config_dir() -> PathBuf {
    if let Some(override_dir) = std::env::var_os("MISATO_CONFIG_DIR") {
        return PathBuf::from(override_dir);
    }
    dirs::config_dir()
        .map(|d| d.join("misato"))
        .unwrap_or_else(|| PathBuf::from("/tmp/misato-config"))
}

/// Main config file path (`config_dir()/config.toml`).
#[must_use]
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// Durable identity file path (`data_dir()/identity.json`).
#[must_use]
pub fn identity_file() -> PathBuf {
    data_dir().join("identity.json")
}
