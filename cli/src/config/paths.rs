//! Platform-specific path utilities for keyward.

use std::path::{Path, PathBuf};

use crate::config::settings::env;
use crate::error::{KeywardError, Result};

const APP_DIR: &str = "keyward";

/// Get the configuration directory for keyward.
///
/// - Linux: `~/.config/keyward`
/// - macOS: `~/Library/Application Support/keyward`
/// - Windows: `%APPDATA%\keyward`
pub fn config_dir() -> Result<PathBuf> {
    let base = dirs::config_dir()
        .ok_or_else(|| KeywardError::Config("Cannot determine config directory".to_string()))?;
    Ok(base.join(APP_DIR))
}

/// Get the credential directory for keyward.
///
/// `KEYWARD_HOME` wins when set; otherwise:
/// - Linux: `~/.local/share/keyward`
/// - macOS: `~/Library/Application Support/keyward`
/// - Windows: `%APPDATA%\keyward`
pub fn data_dir() -> Result<PathBuf> {
    if let Some(home) = std::env::var_os(env::HOME).filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(home));
    }
    let base = dirs::data_dir()
        .ok_or_else(|| KeywardError::Config("Cannot determine data directory".to_string()))?;
    Ok(base.join(APP_DIR))
}

/// Get the main configuration file path.
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Locations of every file the credential store touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorePaths {
    /// Plaintext store and provider index (`auth.json`).
    pub auth_file: PathBuf,
    /// Encrypted-file keychain (`auth.enc.json`).
    pub encrypted_file: PathBuf,
    /// Random encryption key (`.key`).
    pub key_file: PathBuf,
}

impl StorePaths {
    /// Paths inside the platform credential directory.
    ///
    /// # Errors
    ///
    /// Returns [`KeywardError::Config`] if no data directory can be determined.
    pub fn from_env() -> Result<Self> {
        Ok(Self::in_dir(data_dir()?))
    }

    /// Paths inside `dir`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            auth_file: dir.join("auth.json"),
            encrypted_file: dir.join("auth.enc.json"),
            key_file: dir.join(".key"),
        }
    }
}
