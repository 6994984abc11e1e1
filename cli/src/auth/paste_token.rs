//! Manual token entry for providers without a device flow.

use std::io::BufRead;

use tracing::debug;

use crate::auth::credential::{AuthCredential, AuthMethod};
use crate::error::{KeywardError, Result};

/// Prefix of tokens printed by `claude setup-token`.
pub const SETUP_TOKEN_PREFIX: &str = "sk-ant-oat01-";

/// Shortest setup token we accept.
pub const SETUP_TOKEN_MIN_LEN: usize = 80;

/// Checks the shape of a setup token.
///
/// # Errors
///
/// Returns [`KeywardError::InvalidToken`] naming the expected prefix and
/// length when either is wrong.
pub fn validate_setup_token(token: &str) -> Result<()> {
    if !token.starts_with(SETUP_TOKEN_PREFIX) {
        return Err(KeywardError::InvalidToken(format!(
            "setup token must start with '{SETUP_TOKEN_PREFIX}'. Run 'claude setup-token' and paste the full output"
        )));
    }
    if token.len() < SETUP_TOKEN_MIN_LEN {
        return Err(KeywardError::InvalidToken(format!(
            "setup token looks truncated ({} characters, expected at least {SETUP_TOKEN_MIN_LEN})",
            token.len()
        )));
    }
    Ok(())
}

/// Reads one pasted token from `reader` and wraps it in a credential.
///
/// Surrounding whitespace is trimmed. Nothing is stored.
///
/// # Errors
///
/// Returns [`KeywardError::InvalidToken`] for empty input or a malformed
/// setup token, or an IO error if the line cannot be read.
pub fn login_paste_token<R: BufRead>(
    provider: &str,
    method: AuthMethod,
    mut reader: R,
) -> Result<AuthCredential> {
    let mut line = String::new();
    reader.read_line(&mut line)?;
    let token = line.trim();

    if token.is_empty() {
        return Err(KeywardError::InvalidToken(format!(
            "no token entered for {provider}"
        )));
    }
    if method == AuthMethod::SetupToken {
        validate_setup_token(token)?;
    }

    debug!(provider, method = %method, "Accepted pasted token");
    Ok(AuthCredential::new(provider, token, method))
}
