//! Authentication for keyward.
//!
//! This module provides OAuth device-code login with PKCE (Qwen portal),
//! refresh-token handling, paste-token login for key-based providers, and the
//! [`AccessTokenSource`] seam HTTP clients use to get a live token.

pub mod credential;
pub mod device_flow;
pub mod paste_token;
pub mod pkce;
pub mod providers;
pub mod refresh;
pub mod token_source;

pub use credential::{AuthCredential, AuthMethod};
pub use device_flow::{DeviceAuthorization, DeviceCodeClient, DeviceFlowState, PollTiming};
pub use paste_token::login_paste_token;
pub use providers::{OAuthProvider, OAuthProviderConfig};
pub use token_source::{AccessTokenSource, StaticTokenSource, TokenSource};
