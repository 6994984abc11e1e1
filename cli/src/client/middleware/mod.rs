//! HTTP client middleware.

pub mod auth;
pub mod headers;

pub use auth::BearerAuthMiddleware;
pub use headers::{RequestHeadersMiddleware, REQUEST_ID_HEADER};
