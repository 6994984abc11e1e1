//! Configuration management for keyward.

pub mod paths;
pub mod settings;

pub use paths::{config_file, StorePaths};
pub use settings::{KeywardConfig, OAuthConfig, ProviderSettings, SecureStoreConfig};

use std::path::Path;

use crate::error::{KeywardError, Result};
use crate::store::atomic::write_atomic;

/// Load configuration from the default config file.
///
/// If the config file doesn't exist, returns default configuration.
pub fn load_config() -> Result<KeywardConfig> {
    let path = config_file()?;
    load_config_from(&path)
}

/// Load configuration from a specific path.
///
/// If the file doesn't exist, returns default configuration.
pub fn load_config_from(path: &Path) -> Result<KeywardConfig> {
    if !path.exists() {
        return Ok(KeywardConfig::default().with_env_overrides());
    }

    let contents = std::fs::read_to_string(path)?;
    let config: KeywardConfig =
        toml::from_str(&contents).map_err(|e| KeywardError::ConfigRead(e.to_string()))?;

    Ok(config.with_env_overrides())
}

/// Save configuration to a specific path.
pub fn save_config_to(config: &KeywardConfig, path: &Path) -> Result<()> {
    let contents =
        toml::to_string_pretty(config).map_err(|e| KeywardError::ConfigWrite(e.to_string()))?;
    write_atomic(path, contents.as_bytes())
}
