//! Standard headers for outgoing OAuth requests.

use async_trait::async_trait;
use http::header::{HeaderName, HeaderValue, ACCEPT};
use http::Extensions;
use reqwest::{Request, Response};
use reqwest_middleware::{Middleware, Next, Result};
use uuid::Uuid;

/// Correlation header sent with every request.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Middleware that stamps `Accept: application/json` and a fresh request id.
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestHeadersMiddleware;

#[async_trait]
impl Middleware for RequestHeadersMiddleware {
    async fn handle(
        &self,
        mut req: Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> Result<Response> {
        let headers = req.headers_mut();
        headers
            .entry(ACCEPT)
            .or_insert(HeaderValue::from_static("application/json"));
        if let Ok(value) = HeaderValue::from_str(&Uuid::new_v4().to_string()) {
            headers.insert(REQUEST_ID_HEADER, value);
        }

        next.run(req, extensions).await
    }
}
