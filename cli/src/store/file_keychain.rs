//! Encrypted-file keychain.
//!
//! All providers share one JSON document, each entry sealed separately:
//!
//! ```json
//! {"credentials": {"qwen": {"algorithm": "...", "nonce": "...", "ciphertext": "..."}}}
//! ```
//!
//! Callers serialize writers; the store holds its lock across the whole
//! load-modify-persist sequence.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::credential::AuthCredential;
use crate::error::Result;
use crate::store::atomic::{read_if_exists, remove_if_exists, write_atomic};
use crate::store::encryption::{EncryptedData, Encryptor};
use crate::store::keychain::KeychainBackend;

#[derive(Debug, Default, Serialize, Deserialize)]
struct EncryptedFile {
    #[serde(default)]
    credentials: BTreeMap<String, EncryptedData>,
}

/// Keychain backed by an encrypted JSON file.
#[derive(Debug)]
pub struct FileKeychain {
    encryptor: Encryptor,
    path: PathBuf,
}

impl FileKeychain {
    /// Creates a file keychain writing to `path`.
    #[must_use]
    pub fn new(encryptor: Encryptor, path: impl Into<PathBuf>) -> Self {
        Self {
            encryptor,
            path: path.into(),
        }
    }

    /// Location of the encrypted document.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<EncryptedFile> {
        match read_if_exists(&self.path)? {
            Some(bytes) => Ok(serde_json::from_slice(&bytes)?),
            None => Ok(EncryptedFile::default()),
        }
    }

    fn save(&self, file: &EncryptedFile) -> Result<()> {
        if file.credentials.is_empty() {
            return remove_if_exists(&self.path);
        }
        let json = serde_json::to_vec_pretty(file)?;
        write_atomic(&self.path, &json)
    }
}

impl KeychainBackend for FileKeychain {
    fn store(&self, provider: &str, cred: &AuthCredential) -> Result<()> {
        let sealed = self.encryptor.encrypt_credential(cred)?;
        let mut file = self.load()?;
        file.credentials.insert(provider.to_string(), sealed);
        self.save(&file)?;
        debug!(provider, path = %self.path.display(), "Stored encrypted credential");
        Ok(())
    }

    fn retrieve(&self, provider: &str) -> Result<Option<AuthCredential>> {
        let file = self.load()?;
        file.credentials
            .get(provider)
            .map(|sealed| self.encryptor.decrypt_credential(sealed))
            .transpose()
    }

    fn delete(&self, provider: &str) -> Result<()> {
        let mut file = self.load()?;
        if file.credentials.remove(provider).is_none() {
            return Ok(());
        }
        self.save(&file)?;
        debug!(provider, "Deleted encrypted credential");
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn list_providers(&self) -> Result<Vec<String>> {
        Ok(self.load()?.credentials.into_keys().collect())
    }
}
