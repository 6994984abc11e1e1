//! Access token providers for HTTP clients.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::auth::credential::AuthCredential;
use crate::auth::device_flow::DeviceCodeClient;
use crate::error::{KeywardError, Result};
use crate::store::SecureStore;

/// Something that can hand out a currently usable access token.
#[async_trait]
pub trait AccessTokenSource: Send + Sync {
    /// Returns the token to send as `Authorization: Bearer`.
    ///
    /// # Errors
    ///
    /// Returns [`KeywardError::NotAuthenticated`] when no token is stored,
    /// or the error from reading the store.
    async fn access_token(&self) -> Result<String>;
}

/// Fixed token, for API keys and tests.
#[derive(Clone)]
pub struct StaticTokenSource {
    provider: String,
    token: String,
}

impl StaticTokenSource {
    /// An empty `token` reports "not authenticated" on use.
    #[must_use]
    pub fn new(provider: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl AccessTokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String> {
        if self.token.is_empty() {
            return Err(KeywardError::NotAuthenticated {
                provider: self.provider.clone(),
            });
        }
        Ok(self.token.clone())
    }
}

/// Token source over the credential store.
///
/// Reads the provider's credential on every call. When the token is inside
/// the refresh window and a refresher is configured, it refreshes and saves
/// the result first. A failed refresh falls back to the stored token; a
/// failed save is returned as an error.
///
/// Refreshes are serialized per source. Callers that queued behind a
/// refresh re-read the store and use the token it saved.
pub struct TokenSource {
    store: Arc<SecureStore>,
    provider: String,
    refresher: Option<DeviceCodeClient>,
    refresh_lock: Mutex<()>,
}

impl TokenSource {
    /// A source that never refreshes.
    #[must_use]
    pub fn new(store: Arc<SecureStore>, provider: impl Into<String>) -> Self {
        Self {
            store,
            provider: provider.into(),
            refresher: None,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Refresh near-expiry tokens through `client`.
    #[must_use]
    pub fn with_refresher(mut self, client: DeviceCodeClient) -> Self {
        self.refresher = Some(client);
        self
    }

    fn stored_credential(&self) -> Result<AuthCredential> {
        self.store
            .get_credential(&self.provider)?
            .filter(AuthCredential::has_access_token)
            .ok_or_else(|| KeywardError::NotAuthenticated {
                provider: self.provider.clone(),
            })
    }
}

#[async_trait]
impl AccessTokenSource for TokenSource {
    async fn access_token(&self) -> Result<String> {
        let cred = self.stored_credential()?;
        let Some(refresher) = self.refresher.as_ref().filter(|_| cred.needs_refresh()) else {
            return Ok(cred.access_token);
        };

        let _refreshing = self.refresh_lock.lock().await;
        let cred = self.stored_credential()?;
        if !cred.needs_refresh() {
            debug!(provider = %self.provider, "Token already refreshed by another caller");
            return Ok(cred.access_token);
        }

        match refresher.refresh(&cred).await {
            Ok(refreshed) => {
                self.store.set_credential(&self.provider, &refreshed)?;
                debug!(provider = %self.provider, "Saved refreshed credential");
                Ok(refreshed.access_token)
            },
            Err(e) => {
                warn!(provider = %self.provider, error = %e, "Refresh failed, using stored token");
                Ok(cred.access_token)
            },
        }
    }
}
