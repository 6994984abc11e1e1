//! Credential storage.
//!
//! This module provides encrypted and plaintext credential storage:
//! - [`Encryptor`]: AEAD sealing under a file-backed random key
//! - [`KeychainBackend`] implementations: OS keychain, encrypted file,
//!   plaintext file and an in-memory mock
//! - [`FallbackKeychain`]: OS keychain with an encrypted-file safety net
//! - [`SecureStore`]: one CRUD surface over whichever backend is configured,
//!   plus a process-wide instance in [`global`]

pub mod atomic;
pub mod encryption;
pub mod fallback;
pub mod field_crypto;
pub mod file_keychain;
pub mod global;
pub mod keychain;
pub mod plain;
pub mod secure_store;

pub use encryption::{delete_encryption_key, Algorithm, EncryptedData, Encryptor};
pub use fallback::FallbackKeychain;
pub use field_crypto::MasterKey;
pub use file_keychain::FileKeychain;
pub use global::{init_secure_store, reset_secure_store, secure_store};
pub use keychain::{KeychainBackend, MockKeychain, OsKeychain};
pub use plain::{AuthStore, PlainFileKeychain};
pub use secure_store::{SecureStore, StorageMode};
