//! Refresh-token grant.

use chrono::Utc;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, info};

use crate::auth::credential::{expiry_after, AuthCredential};
use crate::auth::device_flow::DeviceCodeClient;
use crate::error::{KeywardError, Result};

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    #[serde(default)]
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

impl DeviceCodeClient {
    /// Exchanges the credential's refresh token for a new access token.
    ///
    /// The returned credential is a copy of `cred` with the access token
    /// replaced. The refresh token is replaced only when the provider rotates
    /// it, and the expiry only when the provider sends a positive lifetime.
    /// Nothing is persisted here.
    ///
    /// # Errors
    ///
    /// - [`KeywardError::MissingRefreshToken`] if `cred` has no refresh token
    /// - [`KeywardError::RefreshTokenExpired`] if the provider rejects it (400/401/403)
    /// - [`KeywardError::TokenRefreshFailed`] on any other non-success status
    /// - [`KeywardError::MalformedTokenResponse`] if the body lacks an access token
    pub async fn refresh(&self, cred: &AuthCredential) -> Result<AuthCredential> {
        let refresh_token = cred
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| KeywardError::MissingRefreshToken {
                provider: self.provider().to_string(),
            })?;

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.config.client_id.as_str()),
        ];
        debug!(provider = self.provider(), "Refreshing access token");

        let response = self
            .http
            .post(self.config.token_url.url().clone())
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        match status {
            s if s.is_success() => {},
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(KeywardError::RefreshTokenExpired {
                    provider: self.provider().to_string(),
                });
            },
            _ => {
                return Err(KeywardError::TokenRefreshFailed(format!("HTTP {status}")));
            },
        }

        let body = response.bytes().await?;
        let parsed: RefreshResponse = serde_json::from_slice(&body)
            .map_err(|e| KeywardError::MalformedTokenResponse(e.to_string()))?;
        if parsed.access_token.is_empty() {
            return Err(KeywardError::MalformedTokenResponse(
                "refresh response missing access_token".to_string(),
            ));
        }

        let mut refreshed = cred.clone();
        refreshed.access_token = parsed.access_token;
        if let Some(rotated) = parsed.refresh_token.filter(|t| !t.is_empty()) {
            refreshed.refresh_token = Some(rotated);
        }
        if let Some(expires_at) = parsed.expires_in.and_then(|secs| expiry_after(Utc::now(), secs)) {
            refreshed.expires_at = Some(expires_at);
        }

        info!(provider = self.provider(), "Access token refreshed");
        Ok(refreshed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential::AuthMethod;
    use crate::auth::providers::qwen;
    use crate::client::{build_http_client, DEFAULT_TIMEOUT};
    use crate::config::ProviderSettings;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_PATH: &str = "/api/v1/oauth2/token";

    fn client_for(server: &MockServer) -> DeviceCodeClient {
        let settings = ProviderSettings {
            client_id: None,
            base_url: Some(server.uri().parse().unwrap()),
        };
        let config = qwen::get_config(&settings).unwrap();
        DeviceCodeClient::new(config, build_http_client(DEFAULT_TIMEOUT).unwrap())
    }

    fn stale_credential() -> AuthCredential {
        let mut cred = AuthCredential::new("qwen", "old-access", AuthMethod::Oauth);
        cred.refresh_token = Some("old-refresh".to_string());
        cred.email = Some("dev@example.com".to_string());
        cred.expires_at = Some(Utc::now() - chrono::Duration::minutes(1));
        cred
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_makes_no_request() {
        let server = MockServer::start().await;
        let cred = AuthCredential::new("qwen", "access", AuthMethod::Oauth);

        let err = client_for(&server).refresh(&cred).await.unwrap_err();
        assert!(matches!(err, KeywardError::MissingRefreshToken { .. }));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_replaces_tokens_and_keeps_metadata() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=old-refresh"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "refresh_token": "new-refresh",
                "expires_in": 3600
            })))
            .expect(1)
            .mount(&server)
            .await;

        let refreshed = client_for(&server).refresh(&stale_credential()).await.unwrap();
        assert_eq!(refreshed.access_token, "new-access");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("new-refresh"));
        assert_eq!(refreshed.email.as_deref(), Some("dev@example.com"));
        assert!(!refreshed.needs_refresh());
    }

    #[tokio::test]
    async fn refresh_keeps_refresh_token_and_expiry_when_omitted() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "refresh_token": "",
                "expires_in": 0
            })))
            .mount(&server)
            .await;

        let stale = stale_credential();
        let refreshed = client_for(&server).refresh(&stale).await.unwrap();
        assert_eq!(refreshed.refresh_token.as_deref(), Some("old-refresh"));
        assert_eq!(refreshed.expires_at, stale.expires_at);
    }

    #[tokio::test]
    async fn oversized_lifetime_keeps_previous_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-access",
                "expires_in": i64::MAX
            })))
            .mount(&server)
            .await;

        let stale = stale_credential();
        let refreshed = client_for(&server).refresh(&stale).await.unwrap();
        assert_eq!(refreshed.access_token, "new-access");
        assert_eq!(refreshed.expires_at, stale.expires_at);
    }

    #[tokio::test]
    async fn rejected_refresh_token_requires_login() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })))
            .mount(&server)
            .await;

        let err = client_for(&server).refresh(&stale_credential()).await.unwrap_err();
        assert!(matches!(err, KeywardError::RefreshTokenExpired { .. }));
        assert!(err.requires_reauth());
    }

    #[tokio::test]
    async fn server_error_is_a_refresh_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let err = client_for(&server).refresh(&stale_credential()).await.unwrap_err();
        assert!(matches!(err, KeywardError::TokenRefreshFailed(msg) if msg.contains("503")));
    }

    #[tokio::test]
    async fn empty_access_token_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "" })))
            .mount(&server)
            .await;

        let err = client_for(&server).refresh(&stale_credential()).await.unwrap_err();
        assert!(matches!(err, KeywardError::MalformedTokenResponse(_)));
    }
}
