//! Authentication middleware for injecting Bearer tokens.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::AUTHORIZATION;
use http::{Extensions, HeaderValue};
use reqwest::{Request, Response};
use reqwest_middleware::{Error, Middleware, Next, Result};

use crate::auth::token_source::AccessTokenSource;
use crate::error::KeywardError;

/// Middleware that asks a token source for a live token on every request.
///
/// Refresh happens inside the source, so a long-lived client keeps working
/// across token expiry.
pub struct BearerAuthMiddleware {
    source: Arc<dyn AccessTokenSource>,
}

impl BearerAuthMiddleware {
    /// Create a new authentication middleware.
    #[must_use]
    pub fn new(source: Arc<dyn AccessTokenSource>) -> Self {
        Self { source }
    }
}

#[async_trait]
impl Middleware for BearerAuthMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let token = self.source.access_token().await.map_err(Error::middleware)?;
        let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            Error::middleware(KeywardError::InvalidToken(
                "token contains characters not allowed in a header".to_string(),
            ))
        })?;
        value.set_sensitive(true);
        req.headers_mut().insert(AUTHORIZATION, value);

        next.run(req, extensions).await
    }
}
