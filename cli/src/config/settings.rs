//! Application configuration settings.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::store::encryption::Algorithm;

/// Main configuration for keyward.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeywardConfig {
    /// Credential storage settings.
    pub security: SecureStoreConfig,
    /// OAuth client settings.
    pub oauth: OAuthConfig,
}

/// Where and how credentials are stored.
///
/// | `enabled` | `use_keychain` | backend |
/// |---|---|---|
/// | false | any | plain JSON file |
/// | true | false | encrypted file |
/// | true | true | OS keychain, falling back to the encrypted file |
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecureStoreConfig {
    /// Encrypt credentials at rest.
    pub enabled: bool,
    /// Try the OS keychain before the encrypted file.
    pub use_keychain: bool,
    /// AEAD scheme tag: `chacha20-poly1305` or `aes-256-gcm`.
    pub algorithm: String,
}

impl Default for SecureStoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            use_keychain: false,
            algorithm: Algorithm::default().as_str().to_string(),
        }
    }
}

/// OAuth client configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    /// HTTP request timeout in seconds.
    pub timeout_secs: u64,
    /// Qwen portal overrides.
    pub qwen: ProviderSettings,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 15,
            qwen: ProviderSettings::default(),
        }
    }
}

/// Per-provider overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderSettings {
    /// Custom OAuth client ID.
    pub client_id: Option<String>,
    /// Custom portal base URL (self-hosted or test servers).
    pub base_url: Option<Url>,
}

/// Environment variables that can override configuration.
pub mod env {
    /// Turns encryption on or off.
    pub const ENCRYPTION: &str = "KEYWARD_ENCRYPTION";
    /// Turns the OS keychain on or off.
    pub const USE_KEYCHAIN: &str = "KEYWARD_USE_KEYCHAIN";
    /// Selects the AEAD scheme.
    pub const ALGORITHM: &str = "KEYWARD_ALGORITHM";
    /// Log filter directive.
    pub const LOG_LEVEL: &str = "KEYWARD_LOG";
    /// Credential directory override.
    pub const HOME: &str = "KEYWARD_HOME";
}

impl KeywardConfig {
    /// Apply environment variable overrides to the configuration.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source.
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(enabled) = lookup(env::ENCRYPTION).and_then(|v| parse_flag(&v)) {
            self.security.enabled = enabled;
        }

        if let Some(use_keychain) = lookup(env::USE_KEYCHAIN).and_then(|v| parse_flag(&v)) {
            self.security.use_keychain = use_keychain;
        }

        if let Some(algorithm) = lookup(env::ALGORITHM) {
            let algorithm = algorithm.trim().to_lowercase();
            if !algorithm.is_empty() {
                self.security.algorithm = algorithm;
            }
        }

        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
