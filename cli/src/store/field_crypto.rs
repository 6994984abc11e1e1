//! Field-level encryption for the legacy plaintext store.
//!
//! Token fields are wrapped individually as `enc:v1:` + base64(nonce ‖ ciphertext),
//! AES-256-GCM under SHA-256 of an operator-supplied master secret. The same
//! secret always yields the same key, so no local state is needed.

use std::fmt;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::auth::credential::AuthCredential;
use crate::error::{KeywardError, Result};

/// Marker prepended to every encrypted field.
pub const ENCRYPTED_PREFIX: &str = "enc:v1:";

/// Environment variable holding the master secret. Read once by the binary.
pub const MASTER_KEY_ENV: &str = "KEYWARD_MASTER_KEY";

const NONCE_SIZE: usize = 12;

/// Derives the 32-byte field key from a master secret.
#[must_use]
pub fn derive_key(secret: &str) -> Zeroizing<[u8; 32]> {
    let digest = Sha256::digest(secret.as_bytes());
    let mut key = Zeroizing::new([0u8; 32]);
    key.copy_from_slice(&digest);
    key
}

/// Whether `value` carries the encrypted-field prefix.
#[must_use]
pub fn is_encrypted(value: &str) -> bool {
    value.starts_with(ENCRYPTED_PREFIX)
}

/// Whether any token field of `cred` is still encrypted.
#[must_use]
pub fn has_encrypted_fields(cred: &AuthCredential) -> bool {
    is_encrypted(&cred.access_token) || cred.refresh_token.as_deref().is_some_and(is_encrypted)
}

/// Encrypts one field value.
///
/// # Errors
///
/// Returns [`KeywardError::EncryptionFailed`] if the cipher rejects the input.
pub fn encrypt_field(plaintext: &str, key: &[u8; 32]) -> Result<String> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| KeywardError::EncryptionFailed("invalid field key".to_string()))?;
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext.as_bytes())
        .map_err(|_| KeywardError::EncryptionFailed("cipher rejected field".to_string()))?;

    let mut blob = nonce.to_vec();
    blob.extend_from_slice(&ciphertext);
    Ok(format!("{ENCRYPTED_PREFIX}{}", BASE64.encode(blob)))
}

/// Decrypts one field value. Values without the prefix are returned as-is.
///
/// # Errors
///
/// - [`KeywardError::InvalidCiphertext`] for bad base64, a blob shorter than
///   a nonce, or non-UTF-8 plaintext
/// - [`KeywardError::DecryptionFailed`] if authentication fails
pub fn decrypt_field(value: &str, key: &[u8; 32]) -> Result<String> {
    let Some(encoded) = value.strip_prefix(ENCRYPTED_PREFIX) else {
        return Ok(value.to_string());
    };

    let blob = BASE64
        .decode(encoded)
        .map_err(|e| KeywardError::InvalidCiphertext(format!("decoding field: {e}")))?;
    if blob.len() < NONCE_SIZE {
        return Err(KeywardError::InvalidCiphertext(format!(
            "field is {} bytes, shorter than a {NONCE_SIZE}-byte nonce",
            blob.len()
        )));
    }
    let (nonce, ciphertext) = blob.split_at(NONCE_SIZE);

    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| KeywardError::DecryptionFailed("invalid field key".to_string()))?;
    let plaintext = Zeroizing::new(
        cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| KeywardError::DecryptionFailed("field authentication failed".to_string()))?,
    );

    String::from_utf8(plaintext.to_vec())
        .map_err(|_| KeywardError::InvalidCiphertext("field is not UTF-8".to_string()))
}

/// Field key derived from the operator's master secret.
#[derive(Clone)]
pub struct MasterKey(Zeroizing<[u8; 32]>);

impl MasterKey {
    /// Derives a key, `None` for an empty secret.
    #[must_use]
    pub fn from_secret(secret: &str) -> Option<Self> {
        if secret.is_empty() {
            None
        } else {
            Some(Self(derive_key(secret)))
        }
    }

    /// Reads [`MASTER_KEY_ENV`].
    #[must_use]
    pub fn from_env() -> Option<Self> {
        std::env::var(MASTER_KEY_ENV)
            .ok()
            .and_then(|secret| Self::from_secret(&secret))
    }

    /// Encrypts the token fields of `cred`. Empty or already-encrypted
    /// values are left alone.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be encrypted.
    pub fn seal(&self, cred: &AuthCredential) -> Result<AuthCredential> {
        let mut sealed = cred.clone();
        sealed.access_token = self.seal_value(&cred.access_token)?;
        sealed.refresh_token = cred
            .refresh_token
            .as_deref()
            .map(|token| self.seal_value(token))
            .transpose()?;
        Ok(sealed)
    }

    /// Decrypts the token fields of `cred`.
    ///
    /// # Errors
    ///
    /// Returns an error if an encrypted field fails to decrypt.
    pub fn open(&self, cred: &AuthCredential) -> Result<AuthCredential> {
        let mut opened = cred.clone();
        opened.access_token = decrypt_field(&cred.access_token, &self.0)?;
        opened.refresh_token = cred
            .refresh_token
            .as_deref()
            .map(|token| decrypt_field(token, &self.0))
            .transpose()?;
        Ok(opened)
    }

    fn seal_value(&self, value: &str) -> Result<String> {
        if value.is_empty() || is_encrypted(value) {
            Ok(value.to_string())
        } else {
            encrypt_field(value, &self.0)
        }
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("MasterKey([REDACTED])")
    }
}
