//! OAuth provider configurations.

pub mod qwen;

use std::fmt;
use std::str::FromStr;

use oauth2::{ClientId, DeviceAuthorizationUrl, Scope, TokenUrl};

use crate::config::OAuthConfig;
use crate::error::{KeywardError, Result};

/// Configuration for a device-code OAuth provider.
#[derive(Debug, Clone)]
pub struct OAuthProviderConfig {
    /// Provider key used for storage and error messages.
    pub name: String,
    /// OAuth client ID (public client, no secret).
    pub client_id: ClientId,
    /// Device authorization URL.
    pub device_auth_url: DeviceAuthorizationUrl,
    /// Token URL, used for polling and refresh.
    pub token_url: TokenUrl,
    /// Requested scopes.
    pub scopes: Vec<Scope>,
}

impl OAuthProviderConfig {
    /// Scopes as a single space-separated form value.
    #[must_use]
    pub fn scope_param(&self) -> String {
        self.scopes
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Providers with a device-code login.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OAuthProvider {
    /// Qwen portal (chat.qwen.ai).
    Qwen,
}

impl OAuthProvider {
    /// Storage key for this provider.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Qwen => qwen::PROVIDER_NAME,
        }
    }
}

impl fmt::Display for OAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OAuthProvider {
    type Err = KeywardError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "qwen" => Ok(Self::Qwen),
            other => Err(KeywardError::Config(format!(
                "No OAuth device flow for provider '{other}'"
            ))),
        }
    }
}

/// Get the OAuth configuration for a provider.
///
/// # Errors
///
/// Returns an error if the provider configuration is invalid.
pub fn get_provider_config(provider: OAuthProvider, config: &OAuthConfig) -> Result<OAuthProviderConfig> {
    match provider {
        OAuthProvider::Qwen => qwen::get_config(&config.qwen),
    }
}
