//! keyward - credential security for assistant CLIs and daemons.
//!
//! Stores provider credentials in the OS keychain or an AEAD-encrypted file,
//! migrates legacy plaintext stores, and runs OAuth device-code logins with
//! automatic token refresh.

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod store;

pub use error::{KeywardError, Result};
