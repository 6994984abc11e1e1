//! OAuth device authorization flow (RFC 8628) with PKCE.
//!
//! The flow runs `Init → DeviceCodeRequested → AwaitingAuthorization` and ends
//! in `Granted`, `Denied`, `Expired` or `Error`. Every transition lives in
//! [`DevicePoller`], which does no I/O. [`DeviceCodeClient::start_device_flow`]
//! drives it through the device-code request and hands it to the returned
//! [`DeviceAuthorization`]; [`DeviceCodeClient::poll_for_token`] feeds it
//! token responses.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use reqwest_middleware::ClientWithMiddleware;
use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::auth::credential::{expiry_after, AuthCredential, AuthMethod};
use crate::auth::pkce::Pkce;
use crate::auth::providers::{get_provider_config, OAuthProvider, OAuthProviderConfig};
use crate::client::build_http_client;
use crate::config::OAuthConfig;
use crate::error::{KeywardError, Result};

/// Grant type for device-code token requests.
pub const DEVICE_CODE_GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:device_code";

/// Poll interval used when the provider does not send one.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Device code lifetime used when the provider does not send one.
pub const DEFAULT_EXPIRES_IN: Duration = Duration::from_secs(300);

/// Longest device code lifetime honoured.
pub const MAX_EXPIRES_IN: Duration = Duration::from_secs(60 * 60);

/// Longest poll interval honoured.
pub const MAX_INTERVAL: Duration = Duration::from_secs(60);

/// Polling knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    /// Floor for the wait between token requests.
    pub min_poll_interval: Duration,
    /// Added to the interval on every `slow_down`.
    pub slow_down_step: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            min_poll_interval: Duration::from_secs(3),
            slow_down_step: Duration::from_secs(5),
        }
    }
}

/// Where a device flow currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFlowState {
    /// Nothing requested yet.
    Init,
    /// Device code request sent.
    DeviceCodeRequested,
    /// Waiting for the user to approve.
    AwaitingAuthorization,
    /// Token issued.
    Granted,
    /// User declined.
    Denied,
    /// Device code expired or the wait timed out.
    Expired,
    /// Provider error or malformed response.
    Error,
}

#[derive(Debug, Deserialize)]
struct DeviceCodeResponse {
    #[serde(default)]
    device_code: String,
    #[serde(default)]
    user_code: String,
    #[serde(default)]
    verification_uri: String,
    #[serde(default)]
    verification_uri_complete: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
    #[serde(default)]
    interval: Option<u64>,
}

/// Device authorization issued to the user.
pub struct DeviceAuthorization {
    /// URL for the user to visit.
    pub verification_uri: String,
    /// URL with the user code pre-filled, when the provider sends one.
    pub verification_uri_complete: Option<String>,
    /// Code for the user to enter.
    pub user_code: String,
    /// How long until the device code expires.
    pub expires_in: Duration,
    /// Interval the provider asked for between polls.
    pub interval: Duration,
    device_code: String,
    pkce: Pkce,
    poller: DevicePoller,
}

impl DeviceAuthorization {
    /// The URL to show: the pre-filled one when available.
    #[must_use]
    pub fn prompt_url(&self) -> &str {
        self.verification_uri_complete
            .as_deref()
            .filter(|url| !url.is_empty())
            .unwrap_or(&self.verification_uri)
    }

    /// The user code to show, only needed without a pre-filled URL.
    #[must_use]
    pub fn display_user_code(&self) -> Option<&str> {
        let prefilled = self
            .verification_uri_complete
            .as_deref()
            .is_some_and(|url| !url.is_empty());
        (!prefilled && !self.user_code.is_empty()).then_some(self.user_code.as_str())
    }

    /// Open the verification URL in the default browser.
    ///
    /// Returns `true` if the browser was opened successfully, `false` otherwise.
    pub fn open_browser(&self) -> bool {
        open::that(self.prompt_url()).is_ok()
    }

    /// Where this flow currently is.
    #[must_use]
    pub const fn state(&self) -> DeviceFlowState {
        self.poller.state()
    }
}

impl fmt::Debug for DeviceAuthorization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceAuthorization")
            .field("verification_uri", &self.verification_uri)
            .field("verification_uri_complete", &self.verification_uri_complete)
            .field("user_code", &self.user_code)
            .field("expires_in", &self.expires_in)
            .field("interval", &self.interval)
            .field("state", &self.poller.state())
            .finish_non_exhaustive()
    }
}

/// Body of a token endpoint response, success or error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct TokenPollResponse {
    /// Issued access token.
    #[serde(default)]
    pub access_token: String,
    /// Issued refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Access token lifetime in seconds.
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Usually `Bearer`.
    #[serde(default)]
    pub token_type: Option<String>,
    /// OAuth error code.
    #[serde(default)]
    pub error: Option<String>,
    /// Human-readable error description.
    #[serde(default)]
    pub error_description: Option<String>,
    /// Base URL for API calls, sent by some providers.
    #[serde(default)]
    pub resource_url: Option<String>,
}

/// Outcome of one non-terminal poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    /// Not yet authorized; wait [`DevicePoller::interval`] and poll again.
    Pending,
    /// Authorization granted.
    Granted(TokenPollResponse),
}

/// Pure state machine for the polling phase.
#[derive(Debug, Clone)]
pub struct DevicePoller {
    provider: String,
    state: DeviceFlowState,
    interval: Duration,
    timing: PollTiming,
}

impl DevicePoller {
    /// A flow that has not requested anything yet.
    #[must_use]
    pub fn new(provider: impl Into<String>, timing: PollTiming) -> Self {
        Self {
            provider: provider.into(),
            state: DeviceFlowState::Init,
            interval: DEFAULT_INTERVAL,
            timing,
        }
    }

    /// Records that the device code request went out.
    pub fn device_code_requested(&mut self) {
        self.state = DeviceFlowState::DeviceCodeRequested;
    }

    /// Records that the request failed.
    pub fn request_failed(&mut self) {
        self.state = DeviceFlowState::Error;
    }

    /// Starts awaiting authorization.
    ///
    /// The interval is held between `timing.min_poll_interval` and
    /// [`MAX_INTERVAL`].
    pub fn await_authorization(&mut self, interval: Duration) {
        self.state = DeviceFlowState::AwaitingAuthorization;
        self.interval = interval
            .min(MAX_INTERVAL)
            .max(self.timing.min_poll_interval);
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> DeviceFlowState {
        self.state
    }

    /// Wait before the next poll.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Applies one token endpoint response.
    ///
    /// # Errors
    ///
    /// - [`KeywardError::AuthorizationExpired`] for `expired_token`
    /// - [`KeywardError::AuthorizationDenied`] for `access_denied`
    /// - [`KeywardError::OAuthProvider`] for any other error code
    /// - [`KeywardError::MalformedTokenResponse`] when neither error nor token is present
    pub fn handle(&mut self, response: TokenPollResponse) -> Result<PollStep> {
        let error = response.error.clone().unwrap_or_default();
        match error.as_str() {
            "" if !response.access_token.is_empty() => {
                self.state = DeviceFlowState::Granted;
                Ok(PollStep::Granted(response))
            },
            "" => {
                self.state = DeviceFlowState::Error;
                Err(KeywardError::MalformedTokenResponse(
                    "token response missing access_token".to_string(),
                ))
            },
            "authorization_pending" => Ok(PollStep::Pending),
            "slow_down" => {
                self.interval = self.interval.saturating_add(self.timing.slow_down_step);
                debug!(interval_secs = self.interval.as_secs_f64(), "Provider asked to slow down");
                Ok(PollStep::Pending)
            },
            "expired_token" => {
                self.state = DeviceFlowState::Expired;
                Err(KeywardError::AuthorizationExpired {
                    provider: self.provider.clone(),
                })
            },
            "access_denied" => {
                self.state = DeviceFlowState::Denied;
                Err(KeywardError::AuthorizationDenied {
                    provider: self.provider.clone(),
                })
            },
            code => {
                self.state = DeviceFlowState::Error;
                let description = response
                    .error_description
                    .filter(|d| !d.is_empty())
                    .unwrap_or_else(|| code.to_string());
                Err(KeywardError::OAuthProvider {
                    provider: self.provider.clone(),
                    description,
                })
            },
        }
    }

    /// Marks the wait as timed out.
    pub fn expire(&mut self) -> KeywardError {
        self.state = DeviceFlowState::Expired;
        KeywardError::Timeout(format!("waiting for {} authorization", self.provider))
    }
}

/// Builds the stored credential from a granted token.
#[must_use]
pub fn credential_from_token(provider: &str, token: TokenPollResponse) -> AuthCredential {
    let mut cred = AuthCredential::new(provider, token.access_token, AuthMethod::Oauth);
    cred.refresh_token = token.refresh_token.filter(|t| !t.is_empty());
    cred.expires_at = token.expires_in.and_then(|secs| expiry_after(Utc::now(), secs));
    cred
}

/// Device-code client for one provider.
#[derive(Debug, Clone)]
pub struct DeviceCodeClient {
    pub(crate) http: ClientWithMiddleware,
    pub(crate) config: OAuthProviderConfig,
    timing: PollTiming,
}

impl DeviceCodeClient {
    /// Create a client over an existing HTTP stack.
    #[must_use]
    pub fn new(config: OAuthProviderConfig, http: ClientWithMiddleware) -> Self {
        Self {
            http,
            config,
            timing: PollTiming::default(),
        }
    }

    /// Create a client for `provider` from application settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider configuration or HTTP client is invalid.
    pub fn for_provider(provider: OAuthProvider, settings: &OAuthConfig) -> Result<Self> {
        let config = get_provider_config(provider, settings)?;
        let http = build_http_client(Duration::from_secs(settings.timeout_secs))?;
        Ok(Self::new(config, http))
    }

    /// Replace the polling knobs.
    #[must_use]
    pub const fn with_timing(mut self, timing: PollTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Provider key.
    #[must_use]
    pub fn provider(&self) -> &str {
        &self.config.name
    }

    /// Start the device authorization flow.
    ///
    /// Generates a PKCE pair and requests a device code. Not retried.
    /// The provider's lifetime is capped at [`MAX_EXPIRES_IN`] and its interval
    /// at [`MAX_INTERVAL`].
    ///
    /// # Errors
    ///
    /// Returns [`KeywardError::DeviceCodeRequestFailed`] on transport errors,
    /// non-success status, or a response without `device_code`/`user_code`.
    pub async fn start_device_flow(&self) -> Result<DeviceAuthorization> {
        let mut poller = DevicePoller::new(self.provider(), self.timing);
        let pkce = Pkce::generate();
        poller.device_code_requested();
        debug!(provider = self.provider(), state = ?poller.state(), "Requesting device code");

        let parsed = match self.request_device_code(&pkce).await {
            Ok(parsed) => parsed,
            Err(e) => {
                poller.request_failed();
                warn!(provider = self.provider(), state = ?poller.state(), error = %e, "Device code request failed");
                return Err(e);
            },
        };

        let expires_in = parsed
            .expires_in
            .filter(|s| *s > 0)
            .map_or(DEFAULT_EXPIRES_IN, Duration::from_secs)
            .min(MAX_EXPIRES_IN);
        let interval = parsed
            .interval
            .filter(|s| *s > 0)
            .map_or(DEFAULT_INTERVAL, Duration::from_secs)
            .min(MAX_INTERVAL);
        poller.await_authorization(interval);

        Ok(DeviceAuthorization {
            verification_uri: parsed.verification_uri,
            verification_uri_complete: parsed.verification_uri_complete,
            user_code: parsed.user_code,
            expires_in,
            interval,
            device_code: parsed.device_code,
            pkce,
            poller,
        })
    }

    async fn request_device_code(&self, pkce: &Pkce) -> Result<DeviceCodeResponse> {
        let scope = self.config.scope_param();
        let form = [
            ("client_id", self.config.client_id.as_str()),
            ("scope", scope.as_str()),
            ("code_challenge", pkce.challenge()),
            ("code_challenge_method", pkce.method()),
        ];

        let response = self
            .http
            .post(self.config.device_auth_url.url().clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| KeywardError::DeviceCodeRequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| KeywardError::DeviceCodeRequestFailed(e.to_string()))?;
        if !status.is_success() {
            return Err(KeywardError::DeviceCodeRequestFailed(format!(
                "HTTP {status}: {}",
                String::from_utf8_lossy(&body).chars().take(200).collect::<String>()
            )));
        }

        let parsed: DeviceCodeResponse = serde_json::from_slice(&body).map_err(|e| {
            KeywardError::DeviceCodeRequestFailed(format!("parsing device code response: {e}"))
        })?;
        if parsed.device_code.is_empty() || parsed.user_code.is_empty() {
            return Err(KeywardError::DeviceCodeRequestFailed(
                "invalid device code response: missing device_code or user_code".to_string(),
            ));
        }

        Ok(parsed)
    }

    /// Poll for token completion.
    ///
    /// Sleeps between attempts and keeps going through network errors and
    /// unparseable bodies until the device code's lifetime, capped at
    /// [`MAX_EXPIRES_IN`], runs out. The outcome is recorded on `auth`.
    ///
    /// # Errors
    ///
    /// Returns the terminal error from [`DevicePoller::handle`], or
    /// [`KeywardError::Timeout`] once the deadline passes.
    pub async fn poll_for_token(&self, auth: &mut DeviceAuthorization) -> Result<TokenPollResponse> {
        let deadline = Instant::now() + auth.expires_in.min(MAX_EXPIRES_IN);
        let poller = &mut auth.poller;
        let form = [
            ("grant_type", DEVICE_CODE_GRANT_TYPE),
            ("client_id", self.config.client_id.as_str()),
            ("device_code", auth.device_code.as_str()),
            ("code_verifier", auth.pkce.verifier()),
        ];

        while Instant::now() < deadline {
            tokio::time::sleep(poller.interval()).await;

            let response = match self
                .http
                .post(self.config.token_url.url().clone())
                .form(&form)
                .send()
                .await
            {
                Ok(response) => response,
                Err(e) => {
                    warn!(error = %e, "Token poll failed, retrying");
                    continue;
                },
            };
            let body = match response.bytes().await {
                Ok(body) => body,
                Err(e) => {
                    warn!(error = %e, "Token poll body unreadable, retrying");
                    continue;
                },
            };
            let parsed: TokenPollResponse = match serde_json::from_slice(&body) {
                Ok(parsed) => parsed,
                Err(e) => {
                    warn!(error = %e, "Token poll response unparseable, retrying");
                    continue;
                },
            };

            match poller.handle(parsed)? {
                PollStep::Pending => {},
                PollStep::Granted(token) => return Ok(token),
            }
        }

        Err(poller.expire())
    }

    /// Runs the whole login: device code, prompt, poll, credential.
    ///
    /// `prompt` is called once with the authorization to show the user.
    ///
    /// # Errors
    ///
    /// Returns any error from [`start_device_flow`](Self::start_device_flow)
    /// or [`poll_for_token`](Self::poll_for_token).
    pub async fn login<F>(&self, prompt: F) -> Result<AuthCredential>
    where
        F: FnOnce(&DeviceAuthorization),
    {
        let mut auth = self.start_device_flow().await?;
        prompt(&auth);

        let token = self.poll_for_token(&mut auth).await?;
        info!(provider = self.provider(), "Device authorization granted");
        Ok(credential_from_token(self.provider(), token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::providers::qwen;
    use crate::client::DEFAULT_TIMEOUT;
    use crate::config::ProviderSettings;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TOKEN_PATH: &str = "/api/v1/oauth2/token";
    const DEVICE_PATH: &str = "/api/v1/oauth2/device/code";

    fn fast_timing() -> PollTiming {
        PollTiming {
            min_poll_interval: Duration::from_millis(10),
            slow_down_step: Duration::from_millis(40),
        }
    }

    fn client_for(server: &MockServer) -> DeviceCodeClient {
        let settings = ProviderSettings {
            client_id: None,
            base_url: Some(server.uri().parse().unwrap()),
        };
        let config = qwen::get_config(&settings).unwrap();
        DeviceCodeClient::new(config, build_http_client(DEFAULT_TIMEOUT).unwrap())
            .with_timing(fast_timing())
    }

    fn authorization(expires_in: Duration) -> DeviceAuthorization {
        let mut poller = DevicePoller::new("qwen", fast_timing());
        poller.device_code_requested();
        poller.await_authorization(Duration::ZERO);
        DeviceAuthorization {
            verification_uri: "https://chat.qwen.ai/authorize".to_string(),
            verification_uri_complete: None,
            user_code: "ABCD-1234".to_string(),
            expires_in,
            interval: Duration::ZERO,
            device_code: "dev-code".to_string(),
            pkce: Pkce::generate(),
            poller,
        }
    }

    fn awaiting(interval: Duration, timing: PollTiming) -> DevicePoller {
        let mut poller = DevicePoller::new("qwen", timing);
        poller.device_code_requested();
        poller.await_authorization(interval);
        poller
    }

    fn poll_body(error: &str) -> serde_json::Value {
        json!({ "error": error })
    }

    #[test]
    fn poller_pending_keeps_interval() {
        let mut poller = awaiting(Duration::from_secs(5), PollTiming::default());
        let step = poller
            .handle(TokenPollResponse {
                error: Some("authorization_pending".to_string()),
                ..TokenPollResponse::default()
            })
            .unwrap();
        assert_eq!(step, PollStep::Pending);
        assert_eq!(poller.interval(), Duration::from_secs(5));
        assert_eq!(poller.state(), DeviceFlowState::AwaitingAuthorization);
    }

    #[test]
    fn poller_walks_request_states() {
        let mut poller = DevicePoller::new("qwen", PollTiming::default());
        assert_eq!(poller.state(), DeviceFlowState::Init);
        poller.device_code_requested();
        assert_eq!(poller.state(), DeviceFlowState::DeviceCodeRequested);
        poller.await_authorization(Duration::from_secs(5));
        assert_eq!(poller.state(), DeviceFlowState::AwaitingAuthorization);

        let mut failed = DevicePoller::new("qwen", PollTiming::default());
        failed.device_code_requested();
        failed.request_failed();
        assert_eq!(failed.state(), DeviceFlowState::Error);
    }

    #[test]
    fn poller_enforces_minimum_interval() {
        let poller = awaiting(Duration::from_secs(1), PollTiming::default());
        assert_eq!(poller.interval(), Duration::from_secs(3));
    }

    #[test]
    fn poller_caps_interval() {
        let poller = awaiting(Duration::from_secs(u64::MAX), PollTiming::default());
        assert_eq!(poller.interval(), MAX_INTERVAL);
    }

    #[test]
    fn poller_slow_down_adds_step() {
        let mut poller = awaiting(Duration::from_secs(5), PollTiming::default());
        poller
            .handle(TokenPollResponse {
                error: Some("slow_down".to_string()),
                ..TokenPollResponse::default()
            })
            .unwrap();
        assert_eq!(poller.interval(), Duration::from_secs(10));
    }

    #[test]
    fn poller_terminal_errors() {
        let cases = [
            ("expired_token", DeviceFlowState::Expired),
            ("access_denied", DeviceFlowState::Denied),
            ("invalid_grant", DeviceFlowState::Error),
        ];
        for (code, state) in cases {
            let mut poller = awaiting(Duration::ZERO, PollTiming::default());
            let err = poller
                .handle(TokenPollResponse {
                    error: Some(code.to_string()),
                    ..TokenPollResponse::default()
                })
                .unwrap_err();
            assert_eq!(poller.state(), state, "{code}");
            match code {
                "expired_token" => {
                    assert!(matches!(err, KeywardError::AuthorizationExpired { .. }));
                    assert!(err.to_string().contains("keyward auth login --provider qwen"));
                },
                "access_denied" => assert!(matches!(err, KeywardError::AuthorizationDenied { .. })),
                _ => assert!(
                    matches!(err, KeywardError::OAuthProvider { description, .. } if description == "invalid_grant")
                ),
            }
        }
    }

    #[test]
    fn poller_prefers_provider_description() {
        let mut poller = awaiting(Duration::ZERO, PollTiming::default());
        let err = poller
            .handle(TokenPollResponse {
                error: Some("server_error".to_string()),
                error_description: Some("try again later".to_string()),
                ..TokenPollResponse::default()
            })
            .unwrap_err();
        assert!(err.to_string().contains("try again later"));
    }

    #[test]
    fn poller_rejects_empty_success() {
        let mut poller = awaiting(Duration::ZERO, PollTiming::default());
        let err = poller.handle(TokenPollResponse::default()).unwrap_err();
        assert!(matches!(err, KeywardError::MalformedTokenResponse(_)));
        assert_eq!(poller.state(), DeviceFlowState::Error);
    }

    #[test]
    fn prompt_prefers_complete_url_and_hides_code() {
        let mut auth = authorization(Duration::from_secs(60));
        assert_eq!(auth.prompt_url(), "https://chat.qwen.ai/authorize");
        assert_eq!(auth.display_user_code(), Some("ABCD-1234"));

        auth.verification_uri_complete =
            Some("https://chat.qwen.ai/authorize?user_code=ABCD-1234".to_string());
        assert_eq!(
            auth.prompt_url(),
            "https://chat.qwen.ai/authorize?user_code=ABCD-1234"
        );
        assert_eq!(auth.display_user_code(), None);
    }

    #[test]
    fn credential_carries_expiry_and_refresh_token() {
        let before = Utc::now();
        let cred = credential_from_token(
            "qwen",
            TokenPollResponse {
                access_token: "at".to_string(),
                refresh_token: Some("rt".to_string()),
                expires_in: Some(3600),
                ..TokenPollResponse::default()
            },
        );
        assert_eq!(cred.auth_method, AuthMethod::Oauth);
        assert_eq!(cred.refresh_token.as_deref(), Some("rt"));
        let expires_at = cred.expires_at.unwrap();
        assert!(expires_at >= before + chrono::Duration::seconds(3600));
        assert!(!cred.needs_refresh());
    }

    #[test]
    fn oversized_lifetime_leaves_credential_without_expiry() {
        for expires_in in [i64::MAX, i64::MAX / 1000] {
            let cred = credential_from_token(
                "qwen",
                TokenPollResponse {
                    access_token: "at".to_string(),
                    expires_in: Some(expires_in),
                    ..TokenPollResponse::default()
                },
            );
            assert_eq!(cred.access_token, "at");
            assert!(cred.expires_at.is_none(), "{expires_in}");
        }
    }

    #[tokio::test]
    async fn device_code_request_sends_pkce_and_scope() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEVICE_PATH))
            .and(body_string_contains("code_challenge_method=S256"))
            .and(body_string_contains("scope=openid+profile+email+model.completion"))
            .and(header_exists("x-request-id"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "device_code": "dev-123",
                "user_code": "USER-1",
                "verification_uri": "https://chat.qwen.ai/authorize",
                "verification_uri_complete": "https://chat.qwen.ai/authorize?user_code=USER-1",
                "expires_in": 600,
                "interval": 2
            })))
            .expect(1)
            .mount(&server)
            .await;

        let auth = client_for(&server).start_device_flow().await.unwrap();
        assert_eq!(auth.user_code, "USER-1");
        assert_eq!(auth.expires_in, Duration::from_secs(600));
        assert_eq!(auth.interval, Duration::from_secs(2));
        assert_eq!(auth.device_code, "dev-123");
        assert_eq!(auth.state(), DeviceFlowState::AwaitingAuthorization);
    }

    #[tokio::test]
    async fn device_code_caps_oversized_timing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEVICE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "device_code": "dev-123",
                "user_code": "USER-1",
                "verification_uri": "https://chat.qwen.ai/authorize",
                "expires_in": u64::MAX,
                "interval": u64::MAX
            })))
            .mount(&server)
            .await;

        let auth = client_for(&server).start_device_flow().await.unwrap();
        assert_eq!(auth.expires_in, MAX_EXPIRES_IN);
        assert_eq!(auth.interval, MAX_INTERVAL);
    }

    #[tokio::test]
    async fn poll_deadline_survives_huge_lifetime() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "at-big" })))
            .mount(&server)
            .await;

        let mut auth = authorization(Duration::MAX);
        let token = client_for(&server).poll_for_token(&mut auth).await.unwrap();
        assert_eq!(token.access_token, "at-big");
        assert_eq!(auth.state(), DeviceFlowState::Granted);
    }

    #[tokio::test]
    async fn device_code_defaults_missing_timing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEVICE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "device_code": "dev-123",
                "user_code": "USER-1",
                "verification_uri": "https://chat.qwen.ai/authorize"
            })))
            .mount(&server)
            .await;

        let auth = client_for(&server).start_device_flow().await.unwrap();
        assert_eq!(auth.expires_in, DEFAULT_EXPIRES_IN);
        assert_eq!(auth.interval, DEFAULT_INTERVAL);
    }

    #[tokio::test]
    async fn device_code_without_user_code_fails_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEVICE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "device_code": "dev-123"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let err = client_for(&server).start_device_flow().await.unwrap_err();
        assert!(
            matches!(err, KeywardError::DeviceCodeRequestFailed(msg) if msg.contains("missing device_code or user_code"))
        );
    }

    #[tokio::test]
    async fn device_code_http_error_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEVICE_PATH))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client_for(&server).start_device_flow().await.unwrap_err();
        assert!(matches!(err, KeywardError::DeviceCodeRequestFailed(msg) if msg.contains("500")));
    }

    #[tokio::test]
    async fn poll_succeeds_after_two_pending_responses() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(poll_body("authorization_pending")))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_string_contains("device_code=dev-code"))
            .and(body_string_contains("code_verifier="))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-1",
                "refresh_token": "rt-1",
                "expires_in": 3600,
                "token_type": "Bearer"
            })))
            .mount(&server)
            .await;

        let token = client_for(&server)
            .poll_for_token(&mut authorization(Duration::from_secs(30)))
            .await
            .unwrap();
        assert_eq!(token.access_token, "at-1");
        assert_eq!(server.received_requests().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn poll_stops_on_access_denied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(poll_body("access_denied")))
            .mount(&server)
            .await;

        let mut auth = authorization(Duration::from_secs(30));
        let err = client_for(&server).poll_for_token(&mut auth).await.unwrap_err();
        assert!(matches!(err, KeywardError::AuthorizationDenied { .. }));
        assert_eq!(auth.state(), DeviceFlowState::Denied);
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn poll_stops_on_expired_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(poll_body("expired_token")))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .poll_for_token(&mut authorization(Duration::from_secs(30)))
            .await
            .unwrap_err();
        assert!(matches!(err, KeywardError::AuthorizationExpired { .. }));
    }

    #[tokio::test]
    async fn poll_backs_off_on_slow_down() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(poll_body("slow_down")))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "at-2" })))
            .mount(&server)
            .await;

        let timing = fast_timing();
        let started = std::time::Instant::now();
        let token = client_for(&server)
            .poll_for_token(&mut authorization(Duration::from_secs(30)))
            .await
            .unwrap();

        assert_eq!(token.access_token, "at-2");
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
        // First wait at the floor, second one step longer.
        assert!(started.elapsed() >= timing.min_poll_interval * 2 + timing.slow_down_step);
    }

    #[tokio::test]
    async fn poll_skips_unparseable_bodies() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(502).set_body_string("<html>bad gateway</html>"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "at-3" })))
            .mount(&server)
            .await;

        let token = client_for(&server)
            .poll_for_token(&mut authorization(Duration::from_secs(30)))
            .await
            .unwrap();
        assert_eq!(token.access_token, "at-3");
    }

    #[tokio::test]
    async fn poll_times_out_at_deadline() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(400).set_body_json(poll_body("authorization_pending")))
            .mount(&server)
            .await;

        let err = client_for(&server)
            .poll_for_token(&mut authorization(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert!(matches!(err, KeywardError::Timeout(_)));
    }

    #[tokio::test]
    async fn login_prompts_then_builds_credential() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(DEVICE_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "device_code": "dev-code",
                "user_code": "USER-9",
                "verification_uri": "https://chat.qwen.ai/authorize",
                "expires_in": 30,
                "interval": 1
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "at-login",
                "refresh_token": "rt-login",
                "expires_in": 7200
            })))
            .mount(&server)
            .await;

        let mut prompted = None;
        let cred = client_for(&server)
            .login(|auth| prompted = auth.display_user_code().map(str::to_string))
            .await
            .unwrap();

        assert_eq!(prompted.as_deref(), Some("USER-9"));
        assert_eq!(cred.provider, "qwen");
        assert_eq!(cred.access_token, "at-login");
        assert_eq!(cred.refresh_token.as_deref(), Some("rt-login"));
        assert!(cred.expires_at.is_some());
    }
}
