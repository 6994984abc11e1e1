//! PKCE (RFC 7636) verifier and S256 challenge.

use std::fmt;

use oauth2::{PkceCodeChallenge, PkceCodeVerifier};

use crate::error::{KeywardError, Result};

/// Verifier lengths allowed by RFC 7636 section 4.1.
const VERIFIER_LEN: std::ops::RangeInclusive<usize> = 43..=128;

/// A verifier/challenge pair for one login attempt.
///
/// The verifier never leaves memory and is not printed by `Debug`.
pub struct Pkce {
    challenge: PkceCodeChallenge,
    verifier: PkceCodeVerifier,
}

impl Pkce {
    /// Generates a fresh pair from 32 random bytes.
    #[must_use]
    pub fn generate() -> Self {
        let (challenge, verifier) = PkceCodeChallenge::new_random_sha256();
        Self { challenge, verifier }
    }

    /// Rebuilds the pair for a known verifier.
    ///
    /// # Errors
    ///
    /// Returns [`KeywardError::InvalidToken`] when the verifier is not 43 to
    /// 128 characters long.
    pub fn from_verifier(verifier: impl Into<String>) -> Result<Self> {
        let verifier = verifier.into();
        if !VERIFIER_LEN.contains(&verifier.len()) {
            return Err(KeywardError::InvalidToken(format!(
                "PKCE verifier must be 43-128 characters, got {}",
                verifier.len()
            )));
        }
        let verifier = PkceCodeVerifier::new(verifier);
        let challenge = PkceCodeChallenge::from_code_verifier_sha256(&verifier);
        Ok(Self { challenge, verifier })
    }

    /// base64url(SHA-256(verifier)), unpadded.
    #[must_use]
    pub fn challenge(&self) -> &str {
        self.challenge.as_str()
    }

    /// Always `S256`.
    #[must_use]
    pub fn method(&self) -> &str {
        self.challenge.method().as_str()
    }

    /// The verifier sent with each token request.
    #[must_use]
    pub fn verifier(&self) -> &str {
        self.verifier.secret()
    }
}

impl fmt::Debug for Pkce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pkce")
            .field("challenge", &self.challenge.as_str())
            .finish_non_exhaustive()
    }
}
