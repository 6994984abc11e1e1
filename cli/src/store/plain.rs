//! Legacy plaintext credential file.
//!
//! `auth.json` holds every credential in one document:
//!
//! ```json
//! {"credentials": {"anthropic": {"access_token": "...", "provider": "anthropic", ...}}}
//! ```
//!
//! With a [`MasterKey`] the token fields are encrypted individually on write
//! and decrypted on read. Without one, values are stored and returned as-is.
//! In the secure modes the same file doubles as the provider index.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::credential::AuthCredential;
use crate::error::Result;
use crate::store::atomic::{read_if_exists, remove_if_exists, write_atomic};
use crate::store::field_crypto::MasterKey;
use crate::store::keychain::KeychainBackend;

/// Provider name to credential map, as serialized in `auth.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthStore {
    /// Credentials keyed by provider.
    #[serde(default)]
    pub credentials: BTreeMap<String, AuthCredential>,
}

/// Backend over the plaintext credential file.
#[derive(Debug, Clone)]
pub struct PlainFileKeychain {
    path: PathBuf,
    master: Option<MasterKey>,
}

impl PlainFileKeychain {
    /// Creates a backend over `path`. `master` enables field encryption.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, master: Option<MasterKey>) -> Self {
        Self {
            path: path.into(),
            master,
        }
    }

    /// Location of the plaintext file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Field key, when one is configured.
    #[must_use]
    pub const fn master(&self) -> Option<&MasterKey> {
        self.master.as_ref()
    }

    /// Whether the file exists on disk.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Loads the whole store, empty when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable, malformed, or an
    /// encrypted field fails to decrypt.
    pub fn load(&self) -> Result<AuthStore> {
        let Some(bytes) = read_if_exists(&self.path)? else {
            return Ok(AuthStore::default());
        };
        let mut store: AuthStore = serde_json::from_slice(&bytes)?;

        if let Some(master) = &self.master {
            for cred in store.credentials.values_mut() {
                *cred = master.open(cred)?;
            }
        }
        Ok(store)
    }

    /// Persists the whole store atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be encrypted or the file cannot be written.
    pub fn save(&self, store: &AuthStore) -> Result<()> {
        let on_disk = match &self.master {
            Some(master) => AuthStore {
                credentials: store
                    .credentials
                    .iter()
                    .map(|(name, cred)| Ok((name.clone(), master.seal(cred)?)))
                    .collect::<Result<_>>()?,
            },
            None => store.clone(),
        };

        let json = serde_json::to_vec_pretty(&on_disk)?;
        write_atomic(&self.path, &json)
    }

    /// Deletes the file. Absent is success.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove_file(&self) -> Result<()> {
        remove_if_exists(&self.path)
    }
}

impl KeychainBackend for PlainFileKeychain {
    fn store(&self, provider: &str, cred: &AuthCredential) -> Result<()> {
        let mut store = self.load()?;
        store.credentials.insert(provider.to_string(), cred.clone());
        self.save(&store)?;
        debug!(provider, encrypted_fields = self.master.is_some(), "Stored credential in auth file");
        Ok(())
    }

    fn retrieve(&self, provider: &str) -> Result<Option<AuthCredential>> {
        Ok(self.load()?.credentials.remove(provider))
    }

    fn delete(&self, provider: &str) -> Result<()> {
        let mut store = self.load()?;
        if store.credentials.remove(provider).is_none() {
            return Ok(());
        }
        self.save(&store)?;
        debug!(provider, "Deleted credential from auth file");
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn list_providers(&self) -> Result<Vec<String>> {
        Ok(self.load()?.credentials.into_keys().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential::AuthMethod;
    use crate::store::field_crypto::is_encrypted;
    use tempfile::TempDir;

    #[test]
    fn missing_file_loads_empty() {
        let dir = TempDir::new().unwrap();
        let plain = PlainFileKeychain::new(dir.path().join("auth.json"), None);
        assert!(plain.load().unwrap().credentials.is_empty());
        assert!(!plain.exists());
    }

    #[test]
    fn plaintext_roundtrip_uses_credentials_wrapper() {
        let dir = TempDir::new().unwrap();
        let plain = PlainFileKeychain::new(dir.path().join("auth.json"), None);
        let cred = AuthCredential::new("anthropic", "sk-ant-api", AuthMethod::Token);

        plain.store("anthropic", &cred).unwrap();

        let raw: serde_json::Value =
            serde_json::from_slice(&std::fs::read(plain.path()).unwrap()).unwrap();
        assert_eq!(raw["credentials"]["anthropic"]["access_token"], "sk-ant-api");
        assert_eq!(plain.retrieve("anthropic").unwrap(), Some(cred));
    }

    #[test]
    fn master_key_encrypts_token_fields_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("auth.json");
        let plain = PlainFileKeychain::new(&path, MasterKey::from_secret("test-master"));
        let mut cred = AuthCredential::new("qwen", "tok-123", AuthMethod::Oauth);
        cred.refresh_token = Some("ref-456".to_string());

        plain.store("qwen", &cred).unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("tok-123"));
        assert!(!raw.contains("ref-456"));
        assert_eq!(plain.retrieve("qwen").unwrap(), Some(cred));

        let without_key = PlainFileKeychain::new(&path, None);
        let passthrough = without_key.retrieve("qwen").unwrap().unwrap();
        assert!(is_encrypted(&passthrough.access_token));
    }

    #[test]
    fn existing_plaintext_reads_with_master_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("auth.json");
        let cred = AuthCredential::new("openai", "sk-plain", AuthMethod::Token);
        PlainFileKeychain::new(&path, None).store("openai", &cred).unwrap();

        let keyed = PlainFileKeychain::new(&path, MasterKey::from_secret("late-key"));
        assert_eq!(keyed.retrieve("openai").unwrap(), Some(cred));
    }

    #[test]
    fn delete_keeps_other_entries() {
        let dir = TempDir::new().unwrap();
        let plain = PlainFileKeychain::new(dir.path().join("auth.json"), None);
        plain
            .store("a", &AuthCredential::new("a", "1", AuthMethod::Token))
            .unwrap();
        plain
            .store("b", &AuthCredential::new("b", "2", AuthMethod::Token))
            .unwrap();

        plain.delete("a").unwrap();
        plain.delete("missing").unwrap();
        assert_eq!(plain.list_providers().unwrap(), vec!["b".to_string()]);
    }
}
