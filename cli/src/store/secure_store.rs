//! Credential store that hides which backend is in effect.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info};

use crate::auth::credential::AuthCredential;
use crate::config::{SecureStoreConfig, StorePaths};
use crate::error::{KeywardError, Result};
use crate::store::encryption::{delete_encryption_key, Encryptor};
use crate::store::fallback::FallbackKeychain;
use crate::store::field_crypto::{has_encrypted_fields, MasterKey, MASTER_KEY_ENV};
use crate::store::file_keychain::FileKeychain;
use crate::store::keychain::{KeychainBackend, OsKeychain};
use crate::store::plain::{AuthStore, PlainFileKeychain};

/// A backend the store can own and share across threads.
pub type DynBackend = Box<dyn KeychainBackend + Send + Sync>;

/// Backend selected by a [`SecureStoreConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// Plain JSON file, optionally with field encryption.
    Plain,
    /// Encrypted file only.
    EncryptedFile,
    /// OS keychain with encrypted-file fallback.
    Keychain,
}

impl StorageMode {
    /// Resolves the mode for `config`.
    #[must_use]
    pub const fn for_config(config: &SecureStoreConfig) -> Self {
        match (config.enabled, config.use_keychain) {
            (false, _) => Self::Plain,
            (true, false) => Self::EncryptedFile,
            (true, true) => Self::Keychain,
        }
    }

    /// Whether payloads live somewhere other than the plaintext file.
    #[must_use]
    pub const fn is_secure(self) -> bool {
        !matches!(self, Self::Plain)
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain file"),
            Self::EncryptedFile => write!(f, "encrypted file"),
            Self::Keychain => write!(f, "OS keychain"),
        }
    }
}

/// Single entry point for credential CRUD.
///
/// Reads share a lock; writes hold it exclusively across the whole
/// load-modify-persist sequence. In the secure modes `auth.json` is kept as
/// a provider index of redacted markers, so listing never decrypts anything.
pub struct SecureStore {
    config: SecureStoreConfig,
    mode: StorageMode,
    paths: StorePaths,
    index: PlainFileKeychain,
    backend: RwLock<Option<DynBackend>>,
}

impl SecureStore {
    /// Builds the store and its backend from `config`.
    ///
    /// `master` enables field encryption in the plaintext file.
    ///
    /// # Errors
    ///
    /// Returns [`KeywardError::UnsupportedAlgorithm`](crate::error::KeywardError::UnsupportedAlgorithm)
    /// for an unknown algorithm, or an I/O error if the key cannot be loaded
    /// or created.
    pub fn new(config: SecureStoreConfig, paths: StorePaths, master: Option<MasterKey>) -> Result<Self> {
        let backend = build_backend(&config, &paths, master.clone())?;
        Ok(Self::assemble(config, paths, master, backend))
    }

    /// Builds a store around an explicit backend.
    #[must_use]
    pub fn with_backend(
        config: SecureStoreConfig,
        paths: StorePaths,
        master: Option<MasterKey>,
        backend: DynBackend,
    ) -> Self {
        Self::assemble(config, paths, master, backend)
    }

    fn assemble(
        config: SecureStoreConfig,
        paths: StorePaths,
        master: Option<MasterKey>,
        backend: DynBackend,
    ) -> Self {
        let mode = StorageMode::for_config(&config);
        debug!(%mode, algorithm = %config.algorithm, "Credential store ready");
        Self {
            index: PlainFileKeychain::new(&paths.auth_file, master),
            config,
            mode,
            paths,
            backend: RwLock::new(Some(backend)),
        }
    }

    /// The resolved storage mode.
    #[must_use]
    pub const fn mode(&self) -> StorageMode {
        self.mode
    }

    /// The configuration this store was built from.
    #[must_use]
    pub const fn config(&self) -> &SecureStoreConfig {
        &self.config
    }

    /// File locations used by this store.
    #[must_use]
    pub const fn paths(&self) -> &StorePaths {
        &self.paths
    }

    /// Loads the credential for `provider`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to read or decrypt.
    pub fn get_credential(&self, provider: &str) -> Result<Option<AuthCredential>> {
        let guard = self.read();
        match guard.as_ref() {
            Some(backend) => backend.retrieve(provider),
            // Backend is rebuilt on the next write after a full wipe.
            None => Ok(None),
        }
    }

    /// Stores `cred` for `provider`, durable on return.
    ///
    /// # Errors
    ///
    /// Returns an error if the credential cannot be encrypted or persisted.
    pub fn set_credential(&self, provider: &str, cred: &AuthCredential) -> Result<()> {
        let mut guard = self.write();
        self.backend_mut(&mut guard)?.store(provider, cred)?;
        if self.mode.is_secure() {
            self.index.store(provider, &cred.redacted())?;
        }
        debug!(provider, mode = %self.mode, "Credential saved");
        Ok(())
    }

    /// Removes the credential for `provider`. Absent is success.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails to delete.
    pub fn delete_credential(&self, provider: &str) -> Result<()> {
        let mut guard = self.write();
        self.backend_mut(&mut guard)?.delete(provider)?;
        if self.mode.is_secure() {
            self.index.delete(provider)?;
        }
        debug!(provider, "Credential deleted");
        Ok(())
    }

    /// Provider names recorded in the plaintext index, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the index cannot be read.
    pub fn list_providers(&self) -> Result<Vec<String>> {
        let _guard = self.read();
        self.index.list_providers()
    }

    /// Deletes every credential, the local key (file-encryption mode only)
    /// and the plaintext index.
    ///
    /// # Errors
    ///
    /// Stops at the first backend failure; the index is left in place so
    /// the wipe can be retried.
    pub fn delete_all_credentials(&self) -> Result<()> {
        let mut guard = self.write();

        let backend = self.backend_mut(&mut guard)?;
        let mut providers: BTreeSet<String> = self.index.list_providers()?.into_iter().collect();
        providers.extend(backend.list_providers()?);

        for provider in &providers {
            backend.delete(provider)?;
        }

        if self.config.enabled && !self.config.use_keychain {
            delete_encryption_key(&self.paths.key_file)?;
            // The in-memory key must not outlive its file.
            *guard = None;
        }

        self.index.remove_file()?;
        info!(count = providers.len(), "Deleted all credentials");
        Ok(())
    }

    /// Moves plaintext credentials into the configured secure backend.
    ///
    /// Every credential is re-stored before the plaintext secrets are
    /// replaced by a redacted index in one atomic write. Redacted markers
    /// are skipped, so a second run is a no-op. Returns the number of
    /// credentials moved.
    ///
    /// # Errors
    ///
    /// Returns [`KeywardError::Config`] without touching anything when the
    /// file holds encrypted fields and no master key is set. Otherwise
    /// returns the first store failure; the plaintext file is untouched in
    /// that case.
    pub fn migrate_from_plain_storage(&self) -> Result<usize> {
        if !self.mode.is_secure() {
            debug!("Plain storage configured, nothing to migrate");
            return Ok(0);
        }

        let mut guard = self.write();
        let legacy = self.index.load()?;
        let pending: Vec<(&String, &AuthCredential)> = legacy
            .credentials
            .iter()
            .filter(|(_, cred)| cred.has_access_token())
            .collect();
        if pending.is_empty() {
            return Ok(0);
        }
        if self.index.master().is_none() && pending.iter().any(|(_, cred)| has_encrypted_fields(cred)) {
            return Err(KeywardError::Config(format!(
                "{} has encrypted fields; set {MASTER_KEY_ENV} to the secret that wrote them and run 'keyward auth migrate' again",
                self.paths.auth_file.display()
            )));
        }

        let backend = self.backend_mut(&mut guard)?;
        for (provider, cred) in &pending {
            backend.store(provider, cred)?;
            debug!(provider = provider.as_str(), "Migrated credential");
        }

        let markers = AuthStore {
            credentials: legacy
                .credentials
                .iter()
                .map(|(name, cred)| (name.clone(), cred.redacted()))
                .collect(),
        };
        self.index.save(&markers)?;

        info!(count = pending.len(), mode = %self.mode, "Migrated plaintext credentials");
        Ok(pending.len())
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<DynBackend>> {
        self.backend.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<DynBackend>> {
        self.backend.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn backend_mut<'a>(&self, slot: &'a mut Option<DynBackend>) -> Result<&'a DynBackend> {
        if slot.is_none() {
            *slot = Some(build_backend(&self.config, &self.paths, self.index.master().cloned())?);
        }
        slot.as_ref()
            .ok_or_else(|| KeywardError::Config("credential backend unavailable".to_string()))
    }
}

impl fmt::Debug for SecureStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureStore")
            .field("mode", &self.mode)
            .field("config", &self.config)
            .field("paths", &self.paths)
            .finish_non_exhaustive()
    }
}

fn build_backend(
    config: &SecureStoreConfig,
    paths: &StorePaths,
    master: Option<MasterKey>,
) -> Result<DynBackend> {
    let mode = StorageMode::for_config(config);
    if mode == StorageMode::Plain {
        return Ok(Box::new(PlainFileKeychain::new(&paths.auth_file, master)));
    }

    let file = FileKeychain::new(
        Encryptor::from_tag(&config.algorithm, &paths.key_file)?,
        &paths.encrypted_file,
    );
    debug!(%mode, algorithm = %config.algorithm, "Selected credential backend");

    let backend: DynBackend = match mode {
        StorageMode::Keychain => Box::new(FallbackKeychain::new(OsKeychain::new(), file)),
        _ => Box::new(file),
    };
    Ok(backend)
}
