//! Keychain backends.
//!
//! Every credential backend implements [`KeychainBackend`]:
//! - [`OsKeychain`]: platform secret storage via `keyring` (macOS Keychain,
//!   Secret Service / keyutils on Linux, Windows Credential Manager)
//! - [`MockKeychain`]: in-memory map for tests
//! - [`FileKeychain`](crate::store::file_keychain::FileKeychain): encrypted JSON file
//! - [`PlainFileKeychain`](crate::store::plain::PlainFileKeychain): legacy plaintext file
//!
//! [`FallbackKeychain`](crate::store::fallback::FallbackKeychain) decorates two
//! of these.

use std::collections::HashMap;
use std::sync::{mpsc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use keyring::Entry;
use tracing::{debug, warn};

use crate::auth::credential::AuthCredential;
use crate::error::{KeywardError, Result};

/// Service namespace for OS keychain entries.
pub const SERVICE_NAME: &str = "keyward";

const PROBE_KEY: &str = "__keyward_probe__";
const PROBE_VALUE: &str = "probe";
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lower-cased fragments of platform messages that mean the user or the OS
/// refused access. Not exhaustive; unmatched failures stay generic.
const DENIAL_MARKERS: &[&str] = &[
    "access denied",
    "user canceled",
    "user cancelled",
    "authorization failed",
    "locked collection",
    "is locked",
];

/// Storage capability shared by all credential backends.
#[cfg_attr(test, mockall::automock)]
pub trait KeychainBackend {
    /// Stores (or replaces) the credential for `provider`.
    fn store(&self, provider: &str, cred: &AuthCredential) -> Result<()>;

    /// Loads the credential for `provider`, `None` when nothing is stored.
    fn retrieve(&self, provider: &str) -> Result<Option<AuthCredential>>;

    /// Removes the credential for `provider`. Absent is success.
    fn delete(&self, provider: &str) -> Result<()>;

    /// Whether the backend can currently accept writes.
    fn is_available(&self) -> bool;

    /// Providers this backend can enumerate on its own.
    ///
    /// OS keychains cannot list entries by service, so the default is empty.
    fn list_providers(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Maps a platform keychain failure onto the crate's error kinds.
///
/// Native error types differ per platform, so denial is detected by
/// substring. Everything unrecognised becomes [`KeywardError::Keychain`].
#[must_use]
pub fn classify_keychain_error(err: &keyring::Error) -> KeywardError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    if DENIAL_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return KeywardError::KeychainAccessDenied;
    }

    match err {
        keyring::Error::NoStorageAccess(_) => KeywardError::KeychainNotAvailable,
        _ => KeywardError::Keychain(message),
    }
}

/// Keychain entry name for a provider.
#[must_use]
pub fn entry_name(provider: &str) -> String {
    format!("provider_{provider}")
}

/// Credentials stored in the platform secret store, one entry per provider.
///
/// Each entry holds the JSON encoding of the whole credential.
#[derive(Debug, Clone)]
pub struct OsKeychain {
    service: String,
    probe_timeout: Duration,
}

impl Default for OsKeychain {
    fn default() -> Self {
        Self::new()
    }
}

impl OsKeychain {
    /// Creates a keychain under the default service namespace.
    #[must_use]
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    /// Creates a keychain under a custom service namespace.
    #[must_use]
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    fn entry(&self, provider: &str) -> Result<Entry> {
        Ok(Entry::new(&self.service, &entry_name(provider))?)
    }
}

impl KeychainBackend for OsKeychain {
    fn store(&self, provider: &str, cred: &AuthCredential) -> Result<()> {
        let json = serde_json::to_string(cred)?;
        self.entry(provider)?.set_password(&json)?;
        debug!(provider, "Stored credential in OS keychain");
        Ok(())
    }

    fn retrieve(&self, provider: &str) -> Result<Option<AuthCredential>> {
        match self.entry(provider)?.get_password() {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn delete(&self, provider: &str) -> Result<()> {
        match self.entry(provider)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes and deletes a probe entry on a helper thread. A probe that
    /// outlives the timeout counts as unavailable.
    fn is_available(&self) -> bool {
        let (tx, rx) = mpsc::channel();
        let service = self.service.clone();
        thread::spawn(move || {
            let _ = tx.send(probe(&service));
        });

        match rx.recv_timeout(self.probe_timeout) {
            Ok(available) => available,
            Err(_) => {
                warn!(
                    timeout_secs = self.probe_timeout.as_secs(),
                    "OS keychain probe timed out"
                );
                false
            },
        }
    }
}

fn probe(service: &str) -> bool {
    let entry = match Entry::new(service, PROBE_KEY) {
        Ok(entry) => entry,
        Err(e) => {
            debug!(error = %e, "OS keychain unavailable");
            return false;
        },
    };
    if let Err(e) = entry.set_password(PROBE_VALUE) {
        debug!(error = %e, "OS keychain probe write failed");
        return false;
    }
    if let Err(e) = entry.delete_credential() {
        debug!(error = %e, "OS keychain probe cleanup failed");
    }
    true
}

/// In-memory backend, always available.
#[derive(Debug, Default)]
pub struct MockKeychain {
    entries: Mutex<HashMap<String, AuthCredential>>,
}

impl MockKeychain {
    /// Creates an empty mock keychain.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, AuthCredential>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl KeychainBackend for MockKeychain {
    fn store(&self, provider: &str, cred: &AuthCredential) -> Result<()> {
        self.entries().insert(provider.to_string(), cred.clone());
        Ok(())
    }

    fn retrieve(&self, provider: &str) -> Result<Option<AuthCredential>> {
        Ok(self.entries().get(provider).cloned())
    }

    fn delete(&self, provider: &str) -> Result<()> {
        self.entries().remove(provider);
        Ok(())
    }

    fn is_available(&self) -> bool {
        true
    }

    fn list_providers(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.entries().keys().cloned().collect();
        names.sort();
        Ok(names)
    }
}
