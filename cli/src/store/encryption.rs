//! Symmetric AEAD encryption for stored credentials.
//!
//! Two schemes are supported, selected by a tag recorded next to every
//! ciphertext:
//! - `chacha20-poly1305`: XChaCha20-Poly1305, 256-bit key, 192-bit nonce
//! - `aes-256-gcm`: AES-256-GCM, 256-bit key, 96-bit nonce
//!
//! The key is a random 32-byte file generated on first use and reused
//! thereafter. Each call to [`Encryptor::encrypt`] draws a fresh nonce.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use aes_gcm::aead::generic_array::typenum::Unsigned;
use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::Aes256Gcm;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chacha20poly1305::XChaCha20Poly1305;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::auth::credential::AuthCredential;
use crate::error::{KeywardError, Result};
use crate::store::atomic::{read_if_exists, remove_if_exists, write_atomic};

/// Size of the encryption key in bytes (256 bits), shared by both schemes.
pub const KEY_SIZE: usize = 32;

/// Supported AEAD schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Algorithm {
    /// XChaCha20-Poly1305. The tag predates the extended-nonce switch and is
    /// kept so existing files stay readable.
    #[default]
    #[serde(rename = "chacha20-poly1305")]
    XChaCha20Poly1305,
    /// AES-256-GCM.
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
}

impl Algorithm {
    /// Tag written next to each ciphertext.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::XChaCha20Poly1305 => "chacha20-poly1305",
            Self::Aes256Gcm => "aes-256-gcm",
        }
    }

    /// Nonce length in bytes.
    #[must_use]
    pub const fn nonce_size(self) -> usize {
        match self {
            Self::XChaCha20Poly1305 => <XChaCha20Poly1305 as AeadCore>::NonceSize::USIZE,
            Self::Aes256Gcm => <Aes256Gcm as AeadCore>::NonceSize::USIZE,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = KeywardError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "chacha20-poly1305" => Ok(Self::XChaCha20Poly1305),
            "aes-256-gcm" => Ok(Self::Aes256Gcm),
            other => Err(KeywardError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// One encrypted blob at rest: algorithm tag, nonce and ciphertext (base64).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedData {
    /// Algorithm tag, see [`Algorithm::as_str`].
    pub algorithm: String,
    /// Base64-encoded nonce.
    pub nonce: String,
    /// Base64-encoded ciphertext including the authentication tag.
    pub ciphertext: String,
}

/// Encrypts and decrypts byte blobs under a file-backed key.
pub struct Encryptor {
    algorithm: Algorithm,
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl Encryptor {
    /// Creates an encryptor, generating and persisting a key at `key_path`
    /// when none (or one of the wrong length) exists yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the key file cannot be read or written.
    pub fn new(algorithm: Algorithm, key_path: &Path) -> Result<Self> {
        let key = load_or_create_key(key_path)?;
        Ok(Self { algorithm, key })
    }

    /// Creates an encryptor from an algorithm tag such as `"aes-256-gcm"`.
    ///
    /// # Errors
    ///
    /// Returns [`KeywardError::UnsupportedAlgorithm`] for unknown tags.
    pub fn from_tag(algorithm: &str, key_path: &Path) -> Result<Self> {
        Self::new(algorithm.parse()?, key_path)
    }

    /// Opens an encryptor over an existing key without generating one.
    ///
    /// # Errors
    ///
    /// Returns [`KeywardError::KeyNotFound`] if the key file is absent or malformed.
    pub fn open_existing(algorithm: Algorithm, key_path: &Path) -> Result<Self> {
        let key = read_key(key_path)?
            .ok_or_else(|| KeywardError::KeyNotFound(key_path.display().to_string()))?;
        Ok(Self { algorithm, key })
    }

    /// Creates an encryptor over an in-memory key.
    #[must_use]
    pub fn with_key(algorithm: Algorithm, key: [u8; KEY_SIZE]) -> Self {
        Self {
            algorithm,
            key: Zeroizing::new(key),
        }
    }

    /// Configured algorithm.
    #[must_use]
    pub const fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Encrypts `plaintext` under a fresh random nonce.
    ///
    /// # Errors
    ///
    /// Returns [`KeywardError::EncryptionFailed`] if the cipher rejects the input.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<EncryptedData> {
        let (nonce, ciphertext) = match self.algorithm {
            Algorithm::XChaCha20Poly1305 => seal::<XChaCha20Poly1305>(&self.key[..], plaintext)?,
            Algorithm::Aes256Gcm => seal::<Aes256Gcm>(&self.key[..], plaintext)?,
        };

        Ok(EncryptedData {
            algorithm: self.algorithm.as_str().to_string(),
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    /// Decrypts `data`, verifying its integrity.
    ///
    /// # Errors
    ///
    /// - [`KeywardError::UnsupportedAlgorithm`] if the tag is unknown or differs
    ///   from this encryptor's algorithm
    /// - [`KeywardError::InvalidCiphertext`] for bad base64 or a wrong nonce length
    /// - [`KeywardError::DecryptionFailed`] if authentication fails
    pub fn decrypt(&self, data: &EncryptedData) -> Result<Vec<u8>> {
        let algorithm: Algorithm = data.algorithm.parse()?;
        if algorithm != self.algorithm {
            return Err(KeywardError::UnsupportedAlgorithm(format!(
                "{} (this store uses {})",
                data.algorithm, self.algorithm
            )));
        }

        let nonce = BASE64
            .decode(&data.nonce)
            .map_err(|e| KeywardError::InvalidCiphertext(format!("decoding nonce: {e}")))?;
        let ciphertext = BASE64
            .decode(&data.ciphertext)
            .map_err(|e| KeywardError::InvalidCiphertext(format!("decoding ciphertext: {e}")))?;

        if nonce.len() != algorithm.nonce_size() {
            return Err(KeywardError::InvalidCiphertext(format!(
                "nonce is {} bytes, {algorithm} requires {}",
                nonce.len(),
                algorithm.nonce_size()
            )));
        }

        match algorithm {
            Algorithm::XChaCha20Poly1305 => open::<XChaCha20Poly1305>(&self.key[..], &nonce, &ciphertext),
            Algorithm::Aes256Gcm => open::<Aes256Gcm>(&self.key[..], &nonce, &ciphertext),
        }
    }

    /// Serializes and encrypts a credential.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or encryption fails.
    pub fn encrypt_credential(&self, cred: &AuthCredential) -> Result<EncryptedData> {
        let json = Zeroizing::new(serde_json::to_vec(cred)?);
        self.encrypt(&json)
    }

    /// Decrypts and deserializes a credential.
    ///
    /// # Errors
    ///
    /// Returns an error if decryption or deserialization fails.
    pub fn decrypt_credential(&self, data: &EncryptedData) -> Result<AuthCredential> {
        let plaintext = Zeroizing::new(self.decrypt(data)?);
        Ok(serde_json::from_slice(&plaintext)?)
    }
}

impl fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encryptor")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

fn seal<C>(key: &[u8], plaintext: &[u8]) -> Result<(Vec<u8>, Vec<u8>)>
where
    C: Aead + AeadCore + KeyInit,
{
    let cipher = C::new_from_slice(key)
        .map_err(|_| KeywardError::EncryptionFailed("invalid key length".to_string()))?;
    let nonce = C::generate_nonce(&mut OsRng);
    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|_| KeywardError::EncryptionFailed("cipher rejected input".to_string()))?;
    Ok((nonce.to_vec(), ciphertext))
}

fn open<C>(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>>
where
    C: Aead + AeadCore + KeyInit,
{
    let cipher = C::new_from_slice(key)
        .map_err(|_| KeywardError::DecryptionFailed("invalid key length".to_string()))?;
    cipher
        .decrypt(aes_gcm::aead::Nonce::<C>::from_slice(nonce), ciphertext)
        .map_err(|_| KeywardError::DecryptionFailed("authentication tag mismatch".to_string()))
}

fn read_key(path: &Path) -> Result<Option<Zeroizing<[u8; KEY_SIZE]>>> {
    let Some(bytes) = read_if_exists(path)? else {
        return Ok(None);
    };
    let bytes = Zeroizing::new(bytes);
    if bytes.len() != KEY_SIZE {
        return Ok(None);
    }
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    key.copy_from_slice(&bytes);
    Ok(Some(key))
}

fn load_or_create_key(path: &Path) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    if let Some(key) = read_key(path)? {
        return Ok(key);
    }

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    rand::rngs::OsRng.fill_bytes(&mut key[..]);
    write_atomic(path, &key[..])?;
    debug!(path = %path.display(), "Generated new encryption key");
    Ok(key)
}

/// Overwrites the key file with zeros and removes it. Absent is success.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be overwritten or removed.
pub fn delete_encryption_key(path: &Path) -> Result<()> {
    if let Some(existing) = read_if_exists(path)? {
        let zeros = vec![0u8; existing.len().max(KEY_SIZE)];
        drop(Zeroizing::new(existing));
        std::fs::write(path, &zeros)?;
        std::fs::File::open(path)?.sync_all()?;
    }
    remove_if_exists(path)
}
