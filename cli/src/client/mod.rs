//! HTTP client construction.
//!
//! OAuth endpoints and token consumers share one stack: a `reqwest` client
//! with a fixed timeout and user agent, wrapped in middleware that adds the
//! standard headers (and, for consumers, a live Bearer token).

pub mod middleware;

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};

use crate::auth::token_source::AccessTokenSource;
use crate::client::middleware::{BearerAuthMiddleware, RequestHeadersMiddleware};
use crate::error::Result;

/// Default HTTP timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

fn base_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(format!("keyward/{}", env!("CARGO_PKG_VERSION")))
        .timeout(timeout)
        .build()?)
}

/// Builds the client used for OAuth endpoints.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn build_http_client(timeout: Duration) -> Result<ClientWithMiddleware> {
    Ok(ClientBuilder::new(base_client(timeout)?)
        .with(RequestHeadersMiddleware)
        .build())
}

/// Builds a client that authenticates every request through `source`.
///
/// # Errors
///
/// Returns an error if the HTTP client cannot be built.
pub fn build_authenticated_client(
    timeout: Duration,
    source: Arc<dyn AccessTokenSource>,
) -> Result<ClientWithMiddleware> {
    Ok(ClientBuilder::new(base_client(timeout)?)
        .with(RequestHeadersMiddleware)
        .with(BearerAuthMiddleware::new(source))
        .build())
}
