//! Qwen portal OAuth provider configuration.

use oauth2::{ClientId, DeviceAuthorizationUrl, Scope, TokenUrl};

use super::OAuthProviderConfig;
use crate::config::ProviderSettings;
use crate::error::Result;

/// Provider key under which Qwen credentials are stored.
pub const PROVIDER_NAME: &str = "qwen";

/// Public client ID of the Qwen portal CLI application.
const DEFAULT_CLIENT_ID: &str = "f0304373b74a44d2b584a3fb70ca9e56";

/// Qwen portal endpoints.
const BASE_URL: &str = "https://chat.qwen.ai";
const DEVICE_CODE_PATH: &str = "/api/v1/oauth2/device/code";
const TOKEN_PATH: &str = "/api/v1/oauth2/token";

const SCOPES: &[&str] = &["openid", "profile", "email", "model.completion"];

/// Model id prefix routed through the Qwen OAuth token.
const OAUTH_MODEL: &str = "qwen-oauth";

/// Get the Qwen OAuth provider configuration.
///
/// # Errors
///
/// Returns an error if the endpoint URLs cannot be parsed.
pub fn get_config(settings: &ProviderSettings) -> Result<OAuthProviderConfig> {
    let client_id = settings.client_id.as_deref().unwrap_or(DEFAULT_CLIENT_ID);
    let base = settings
        .base_url
        .as_ref()
        .map_or(BASE_URL, |url| url.as_str())
        .trim_end_matches('/');

    Ok(OAuthProviderConfig {
        name: PROVIDER_NAME.to_string(),
        client_id: ClientId::new(client_id.to_string()),
        device_auth_url: DeviceAuthorizationUrl::new(format!("{base}{DEVICE_CODE_PATH}"))?,
        token_url: TokenUrl::new(format!("{base}{TOKEN_PATH}"))?,
        scopes: SCOPES.iter().map(|s| Scope::new((*s).to_string())).collect(),
    })
}

/// Whether `model` is served with the Qwen OAuth token.
#[must_use]
pub fn is_qwen_oauth_model(model: &str) -> bool {
    model == OAUTH_MODEL
        || model
            .strip_prefix(OAUTH_MODEL)
            .is_some_and(|rest| rest.starts_with('/'))
}
