//! Credential types for authentication.

use std::fmt;

use chrono::{DateTime, Datelike, Duration, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// How long before expiry a credential is considered due for refresh.
pub const REFRESH_WINDOW_MINUTES: i64 = 5;

/// How a credential was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum AuthMethod {
    /// OAuth device-code or browser flow.
    #[default]
    Oauth,
    /// API key or pasted bearer token.
    Token,
    /// Anthropic `setup-token` output.
    SetupToken,
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Oauth => write!(f, "oauth"),
            Self::Token => write!(f, "token"),
            Self::SetupToken => write!(f, "setup-token"),
        }
    }
}

/// A stored credential for one provider identity.
///
/// `access_token` and `refresh_token` are secrets; the remaining fields are
/// metadata. A credential whose `access_token` is empty means "not
/// authenticated".
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthCredential {
    /// Bearer token sent to the provider.
    pub access_token: String,
    /// Token used to obtain a new access token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Provider-side account identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_id: Option<String>,
    /// When the access token expires; `None` means never.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_expiry"
    )]
    pub expires_at: Option<DateTime<Utc>>,
    /// Provider key, e.g. `qwen` or `anthropic`.
    pub provider: String,
    /// How the credential was obtained.
    pub auth_method: AuthMethod,
    /// Account email, when the provider reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Cloud project, when the provider needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
}

impl AuthCredential {
    /// Creates a credential with only the required fields set.
    #[must_use]
    pub fn new(provider: impl Into<String>, access_token: impl Into<String>, method: AuthMethod) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            account_id: None,
            expires_at: None,
            provider: provider.into(),
            auth_method: method,
            email: None,
            project_id: None,
        }
    }

    /// Whether the access token has already expired.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    /// Whether the access token expires within the refresh window (or already has).
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.needs_refresh_at(Utc::now())
    }

    /// [`is_expired`](Self::is_expired) evaluated at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| now > exp)
    }

    /// [`needs_refresh`](Self::needs_refresh) evaluated at `now`.
    #[must_use]
    pub fn needs_refresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|exp| now + Duration::minutes(REFRESH_WINDOW_MINUTES) >= exp)
    }

    /// Whether the credential carries a usable access token.
    #[must_use]
    pub fn has_access_token(&self) -> bool {
        !self.access_token.is_empty()
    }

    /// Whether the credential can be refreshed.
    #[must_use]
    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Copy with every secret removed, used as a name-only index entry.
    #[must_use]
    pub fn redacted(&self) -> Self {
        Self {
            access_token: String::new(),
            refresh_token: None,
            ..self.clone()
        }
    }
}

impl fmt::Debug for AuthCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthCredential")
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &self.refresh_token.as_deref().map(redact))
            .field("account_id", &self.account_id)
            .field("expires_at", &self.expires_at)
            .field("provider", &self.provider)
            .field("auth_method", &self.auth_method)
            .field("email", &self.email)
            .field("project_id", &self.project_id)
            .finish()
    }
}

/// Absolute expiry for a token that lives `secs` seconds from `now`.
///
/// `None` for a non-positive lifetime or one past the representable range.
#[must_use]
pub fn expiry_after(now: DateTime<Utc>, secs: i64) -> Option<DateTime<Utc>> {
    if secs <= 0 {
        return None;
    }
    Duration::try_seconds(secs).and_then(|lifetime| now.checked_add_signed(lifetime))
}

fn redact(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "[REDACTED]"
    }
}

/// Older writers serialize "no expiry" as the zero time `0001-01-01T00:00:00Z`.
fn deserialize_expiry<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<DateTime<Utc>>::deserialize(deserializer)?;
    Ok(value.filter(|dt| dt.year() > 1))
}
