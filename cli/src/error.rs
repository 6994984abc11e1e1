//! Error types and result aliases for keyward.
//!
//! This module provides the error taxonomy shared by the credential store and
//! the OAuth flows:
//! - Cryptographic failures (algorithm, encryption, decryption, ciphertext shape)
//! - Storage and keychain failures
//! - OAuth device-flow and refresh failures with re-login guidance
//!
//! No variant ever carries key material or token values.

use thiserror::Error;

/// Main error type for keyward operations.
///
/// Each user-facing variant includes the action that resolves it.
/// Use [`requires_reauth`](Self::requires_reauth) and [`is_retriable`](Self::is_retriable)
/// to pick a handling strategy.
#[derive(Error, Debug)]
pub enum KeywardError {
    /// The requested or recorded AEAD algorithm is not one we support.
    #[error("Unsupported encryption algorithm '{0}'. Supported: chacha20-poly1305, aes-256-gcm.")]
    UnsupportedAlgorithm(String),

    /// Sealing a secret failed; nothing was written.
    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    /// The integrity check failed (wrong key or tampered data).
    #[error("Decryption failed: {0}. The encryption key may have changed or the data was modified.")]
    DecryptionFailed(String),

    /// The stored record is malformed (bad base64, wrong nonce length).
    #[error("Invalid ciphertext: {0}")]
    InvalidCiphertext(String),

    /// The local encryption key could not be found or read.
    #[error("Encryption key not found at {0}. Run 'keyward auth login' to store credentials again.")]
    KeyNotFound(String),

    /// No OS keychain is reachable.
    #[error("OS keychain is not available. Enable file encryption instead or unlock your keyring.")]
    KeychainNotAvailable,

    /// The OS keychain refused the request (locked, denied, cancelled).
    #[error("Access to the OS keychain was denied. Unlock your keyring and try again.")]
    KeychainAccessDenied,

    /// Any other platform keychain failure.
    #[error("Keychain error: {0}")]
    Keychain(String),

    /// No usable credential is stored for the provider.
    #[error("Not authenticated with {provider}. Run 'keyward auth login --provider {provider}'.")]
    NotAuthenticated {
        /// Provider name.
        provider: String,
    },

    /// The device-authorization endpoint rejected or garbled the request.
    #[error("Device code request failed: {0}. Check your network connection and try again.")]
    DeviceCodeRequestFailed(String),

    /// The user declined the authorization request.
    #[error("Authorization was denied. If this was unintentional, run 'keyward auth login --provider {provider}' again.")]
    AuthorizationDenied {
        /// Provider name.
        provider: String,
    },

    /// The device code expired before the user finished.
    #[error("Device code expired. Run 'keyward auth login --provider {provider}' again and complete authorization within the time limit.")]
    AuthorizationExpired {
        /// Provider name.
        provider: String,
    },

    /// The refresh token is no longer accepted.
    #[error("{provider} refresh token expired. Run 'keyward auth login --provider {provider}'.")]
    RefreshTokenExpired {
        /// Provider name.
        provider: String,
    },

    /// The stored credential has no refresh token.
    #[error("No refresh token available for {provider}. Run 'keyward auth login --provider {provider}'.")]
    MissingRefreshToken {
        /// Provider name.
        provider: String,
    },

    /// Refresh failed for a reason other than an expired refresh token.
    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    /// The provider returned an OAuth error we do not handle specially.
    #[error("OAuth error from {provider}: {description}")]
    OAuthProvider {
        /// Provider name.
        provider: String,
        /// Provider-supplied description (or the raw error code).
        description: String,
    },

    /// The token endpoint answered without an error and without a token.
    #[error("Malformed token response: {0}")]
    MalformedTokenResponse(String),

    /// A pasted token failed validation.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Request or authorization wait timed out.
    #[error("Timed out: {0}. Check your network connection and try again.")]
    Timeout(String),

    /// Network error during an HTTP request.
    #[error("Network error: {0}. Check your internet connection.")]
    Network(String),

    /// General configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failed to read configuration file.
    #[error("Failed to read configuration file: {0}. Check file permissions and format.")]
    ConfigRead(String),

    /// Failed to write configuration file.
    #[error("Failed to write configuration file: {0}. Check directory permissions.")]
    ConfigWrite(String),

    /// IO operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON or TOML serialization/deserialization failed.
    #[error("Data serialization error: {0}. This may indicate corrupted data.")]
    Serialization(String),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl KeywardError {
    /// Checks if this error can be resolved by logging in again.
    #[must_use]
    pub const fn requires_reauth(&self) -> bool {
        matches!(
            self,
            Self::NotAuthenticated { .. }
                | Self::AuthorizationDenied { .. }
                | Self::AuthorizationExpired { .. }
                | Self::RefreshTokenExpired { .. }
                | Self::MissingRefreshToken { .. }
        )
    }

    /// Checks if this error is transient and the operation might succeed on retry.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::KeychainNotAvailable
        )
    }
}

/// Result type alias using [`KeywardError`].
pub type Result<T> = std::result::Result<T, KeywardError>;

impl From<serde_json::Error> for KeywardError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(format!("JSON error: {err}"))
    }
}

impl From<toml::de::Error> for KeywardError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigRead(format!("TOML parse error: {err}"))
    }
}

impl From<toml::ser::Error> for KeywardError {
    fn from(err: toml::ser::Error) -> Self {
        Self::ConfigWrite(format!("TOML serialize error: {err}"))
    }
}

impl From<keyring::Error> for KeywardError {
    fn from(err: keyring::Error) -> Self {
        crate::store::keychain::classify_keychain_error(&err)
    }
}

impl From<reqwest::Error> for KeywardError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

impl From<reqwest_middleware::Error> for KeywardError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(e) => e.into(),
            reqwest_middleware::Error::Middleware(e) => match e.downcast::<Self>() {
                Ok(inner) => inner,
                Err(other) => Self::Network(other.to_string()),
            },
        }
    }
}
