//! Primary-then-file keychain chaining.

use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::auth::credential::AuthCredential;
use crate::error::Result;
use crate::store::keychain::KeychainBackend;

/// How long an answer from the primary's `is_available` is reused.
pub const AVAILABILITY_TTL: Duration = Duration::from_secs(30);

/// Tries a primary backend first and lands on a file backend whenever the
/// primary is unavailable or fails.
///
/// Primary failures are logged and swallowed; fallback failures are
/// returned. The chain itself always reports available.
///
/// The primary's availability is cached for [`AVAILABILITY_TTL`] and
/// forgotten after any primary failure.
#[derive(Debug)]
pub struct FallbackKeychain<P, F> {
    primary: P,
    fallback: F,
    availability: Mutex<Option<(Instant, bool)>>,
    availability_ttl: Duration,
}

impl<P, F> FallbackKeychain<P, F>
where
    P: KeychainBackend,
    F: KeychainBackend,
{
    /// Chains `primary` in front of `fallback`.
    pub const fn new(primary: P, fallback: F) -> Self {
        Self {
            primary,
            fallback,
            availability: Mutex::new(None),
            availability_ttl: AVAILABILITY_TTL,
        }
    }

    /// Replaces [`AVAILABILITY_TTL`].
    #[must_use]
    pub fn with_availability_ttl(mut self, ttl: Duration) -> Self {
        self.availability_ttl = ttl;
        self
    }

    /// The primary backend.
    pub const fn primary(&self) -> &P {
        &self.primary
    }

    /// The fallback backend.
    pub const fn fallback(&self) -> &F {
        &self.fallback
    }

    fn primary_available(&self) -> bool {
        let mut cached = self.availability.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((checked_at, available)) = *cached {
            if checked_at.elapsed() < self.availability_ttl {
                return available;
            }
        }
        let available = self.primary.is_available();
        *cached = Some((Instant::now(), available));
        available
    }

    fn forget_availability(&self) {
        *self.availability.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl<P, F> KeychainBackend for FallbackKeychain<P, F>
where
    P: KeychainBackend,
    F: KeychainBackend,
{
    fn store(&self, provider: &str, cred: &AuthCredential) -> Result<()> {
        if self.primary_available() {
            match self.primary.store(provider, cred) {
                Ok(()) => return Ok(()),
                Err(e) => {
                    warn!(provider, error = %e, "Primary keychain store failed, using file fallback");
                    self.forget_availability();
                },
            }
        } else {
            debug!(provider, "Primary keychain unavailable, using file fallback");
        }
        self.fallback.store(provider, cred)
    }

    fn retrieve(&self, provider: &str) -> Result<Option<AuthCredential>> {
        if self.primary_available() {
            match self.primary.retrieve(provider) {
                Ok(Some(cred)) => return Ok(Some(cred)),
                Ok(None) => {},
                Err(e) => {
                    warn!(provider, error = %e, "Primary keychain read failed, trying file fallback");
                    self.forget_availability();
                },
            }
        }
        self.fallback.retrieve(provider)
    }

    fn delete(&self, provider: &str) -> Result<()> {
        if self.primary_available() {
            if let Err(e) = self.primary.delete(provider) {
                warn!(provider, error = %e, "Primary keychain delete failed");
                self.forget_availability();
            }
        }
        self.fallback.delete(provider)
    }

    fn is_available(&self) -> bool {
        true
    }

    fn list_providers(&self) -> Result<Vec<String>> {
        let mut names = self.primary.list_providers().unwrap_or_default();
        names.extend(self.fallback.list_providers()?);
        names.sort();
        names.dedup();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::credential::AuthMethod;
    use crate::error::KeywardError;
    use crate::store::encryption::{Algorithm, Encryptor, KEY_SIZE};
    use crate::store::file_keychain::FileKeychain;
    use crate::store::keychain::{MockKeychain, MockKeychainBackend};
    use tempfile::TempDir;

    fn file_keychain(dir: &TempDir) -> FileKeychain {
        FileKeychain::new(
            Encryptor::with_key(Algorithm::Aes256Gcm, [8u8; KEY_SIZE]),
            dir.path().join("auth.enc.json"),
        )
    }

    fn broken_primary() -> MockKeychainBackend {
        let mut primary = MockKeychainBackend::new();
        primary.expect_is_available().return_const(true);
        primary
            .expect_store()
            .returning(|_, _| Err(KeywardError::KeychainAccessDenied));
        primary
            .expect_retrieve()
            .returning(|_| Err(KeywardError::KeychainAccessDenied));
        primary
            .expect_delete()
            .returning(|_| Err(KeywardError::KeychainAccessDenied));
        primary.expect_list_providers().returning(|| Ok(Vec::new()));
        primary
    }

    #[test]
    fn failing_primary_falls_back_to_file_end_to_end() {
        let dir = TempDir::new().unwrap();
        let chain = FallbackKeychain::new(broken_primary(), file_keychain(&dir));
        let cred = AuthCredential::new("qwen", "tok-123", AuthMethod::Oauth);

        chain.store("qwen", &cred).unwrap();
        assert!(chain.fallback().path().exists());
        assert_eq!(chain.retrieve("qwen").unwrap(), Some(cred));

        chain.delete("qwen").unwrap();
        assert!(chain.retrieve("qwen").unwrap().is_none());
        assert!(!chain.fallback().path().exists());
    }

    #[test]
    fn unavailable_primary_is_never_called() {
        let dir = TempDir::new().unwrap();
        let mut primary = MockKeychainBackend::new();
        primary.expect_is_available().return_const(false);
        primary.expect_store().never();
        primary.expect_retrieve().never();
        primary.expect_delete().never();

        let chain = FallbackKeychain::new(primary, file_keychain(&dir));
        let cred = AuthCredential::new("anthropic", "sk-x", AuthMethod::Token);

        chain.store("anthropic", &cred).unwrap();
        assert_eq!(chain.retrieve("anthropic").unwrap(), Some(cred));
        chain.delete("anthropic").unwrap();
    }

    #[test]
    fn working_primary_keeps_file_untouched() {
        let dir = TempDir::new().unwrap();
        let chain = FallbackKeychain::new(MockKeychain::new(), file_keychain(&dir));
        let cred = AuthCredential::new("qwen", "tok", AuthMethod::Oauth);

        chain.store("qwen", &cred).unwrap();
        assert!(!chain.fallback().path().exists());
        assert_eq!(chain.retrieve("qwen").unwrap(), Some(cred));
    }

    #[test]
    fn primary_miss_falls_through_to_file() {
        let dir = TempDir::new().unwrap();
        let file = file_keychain(&dir);
        let cred = AuthCredential::new("qwen", "from-file", AuthMethod::Oauth);
        file.store("qwen", &cred).unwrap();

        let chain = FallbackKeychain::new(MockKeychain::new(), file);
        assert_eq!(chain.retrieve("qwen").unwrap(), Some(cred));
    }

    #[test]
    fn availability_is_checked_once_within_ttl() {
        let dir = TempDir::new().unwrap();
        let mut primary = MockKeychainBackend::new();
        primary.expect_is_available().times(1).return_const(true);
        primary.expect_retrieve().times(3).returning(|_| Ok(None));
        primary.expect_store().times(1).returning(|_, _| Ok(()));

        let chain = FallbackKeychain::new(primary, file_keychain(&dir));
        for _ in 0..3 {
            assert!(chain.retrieve("qwen").unwrap().is_none());
        }
        chain
            .store("qwen", &AuthCredential::new("qwen", "tok", AuthMethod::Oauth))
            .unwrap();
        assert!(!chain.fallback().path().exists());
    }

    #[test]
    fn availability_is_rechecked_after_ttl() {
        let dir = TempDir::new().unwrap();
        let mut primary = MockKeychainBackend::new();
        primary.expect_is_available().times(2).return_const(false);
        primary.expect_retrieve().never();

        let chain = FallbackKeychain::new(primary, file_keychain(&dir))
            .with_availability_ttl(Duration::ZERO);
        assert!(chain.retrieve("qwen").unwrap().is_none());
        assert!(chain.retrieve("qwen").unwrap().is_none());
    }

    #[test]
    fn primary_failure_forces_a_fresh_check() {
        let dir = TempDir::new().unwrap();
        let mut primary = MockKeychainBackend::new();
        primary.expect_is_available().times(2).return_const(true);
        primary
            .expect_retrieve()
            .times(2)
            .returning(|_| Err(KeywardError::KeychainAccessDenied));

        let chain = FallbackKeychain::new(primary, file_keychain(&dir));
        assert!(chain.retrieve("qwen").unwrap().is_none());
        assert!(chain.retrieve("qwen").unwrap().is_none());
    }

    #[test]
    fn fallback_errors_are_surfaced() {
        let mut fallback = MockKeychainBackend::new();
        fallback
            .expect_store()
            .returning(|_, _| Err(KeywardError::EncryptionFailed("disk full".to_string())));

        let chain = FallbackKeychain::new(broken_primary(), fallback);
        let err = chain
            .store("qwen", &AuthCredential::new("qwen", "t", AuthMethod::Oauth))
            .unwrap_err();
        assert!(matches!(err, KeywardError::EncryptionFailed(_)));
        assert!(chain.is_available());
    }
}
