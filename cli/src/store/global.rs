//! Process-wide credential store.
//!
//! The binary calls [`init_secure_store`] once at startup. Anything that runs
//! before that (or without it) gets a lazily built plain-file store. Library
//! components should take an `Arc<SecureStore>` instead of reaching for this.

use std::sync::{Arc, PoisonError, RwLock};

use tracing::debug;

use crate::auth::credential::AuthCredential;
use crate::config::{SecureStoreConfig, StorePaths};
use crate::error::Result;
use crate::store::field_crypto::MasterKey;
use crate::store::secure_store::SecureStore;

static SECURE_STORE: RwLock<Option<Arc<SecureStore>>> = RwLock::new(None);

/// Installs the process-wide store.
///
/// The first successful call wins; later calls return the existing store
/// unchanged.
///
/// # Errors
///
/// Returns an error if the store cannot be built. Nothing is installed in
/// that case.
pub fn init_secure_store(
    config: SecureStoreConfig,
    paths: StorePaths,
    master: Option<MasterKey>,
) -> Result<Arc<SecureStore>> {
    let mut slot = SECURE_STORE.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = slot.as_ref() {
        debug!("Credential store already initialized");
        return Ok(Arc::clone(existing));
    }

    let store = Arc::new(SecureStore::new(config, paths, master)?);
    *slot = Some(Arc::clone(&store));
    Ok(store)
}

/// Returns the process-wide store, building a plain-file default on first use.
///
/// # Errors
///
/// Returns an error if the default store cannot be built.
pub fn secure_store() -> Result<Arc<SecureStore>> {
    if let Some(store) = SECURE_STORE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .as_ref()
    {
        return Ok(Arc::clone(store));
    }
    init_secure_store(SecureStoreConfig::default(), StorePaths::from_env()?, None)
}

/// Drops the process-wide store so the next access rebuilds it. Tests only.
pub fn reset_secure_store() {
    *SECURE_STORE.write().unwrap_or_else(PoisonError::into_inner) = None;
}

/// [`SecureStore::get_credential`] on the process-wide store.
///
/// # Errors
///
/// Returns an error if the store cannot be built or read.
pub fn get_credential(provider: &str) -> Result<Option<AuthCredential>> {
    secure_store()?.get_credential(provider)
}

/// [`SecureStore::set_credential`] on the process-wide store.
///
/// # Errors
///
/// Returns an error if the store cannot be built or written.
pub fn set_credential(provider: &str, cred: &AuthCredential) -> Result<()> {
    secure_store()?.set_credential(provider, cred)
}

/// [`SecureStore::delete_credential`] on the process-wide store.
///
/// # Errors
///
/// Returns an error if the store cannot be built or written.
pub fn delete_credential(provider: &str) -> Result<()> {
    secure_store()?.delete_credential(provider)
}

/// [`SecureStore::delete_all_credentials`] on the process-wide store.
///
/// # Errors
///
/// Returns an error if the store cannot be built or wiped.
pub fn delete_all_credentials() -> Result<()> {
    secure_store()?.delete_all_credentials()
}

/// [`SecureStore::migrate_from_plain_storage`] on the process-wide store.
///
/// # Errors
///
/// Returns an error if the store cannot be built or a credential cannot be moved.
pub fn migrate_credentials() -> Result<usize> {
    secure_store()?.migrate_from_plain_storage()
}

/// [`SecureStore::list_providers`] on the process-wide store.
///
/// # Errors
///
/// Returns an error if the store cannot be built or the index read.
pub fn list_providers() -> Result<Vec<String>> {
    secure_store()?.list_providers()
}
