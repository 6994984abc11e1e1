//! Authentication command handlers.

use std::io;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::auth::{
    login_paste_token, AccessTokenSource, AuthCredential, AuthMethod, DeviceAuthorization,
    DeviceCodeClient, OAuthProvider, TokenSource,
};
use crate::cli::args::ProviderArg;
use crate::config::KeywardConfig;
use crate::error::{KeywardError, Result};
use crate::store::SecureStore;

/// Handle the `keyward auth login` command.
pub async fn handle_login(
    store: &SecureStore,
    config: &KeywardConfig,
    provider: ProviderArg,
    setup_token: bool,
    no_browser: bool,
) -> Result<()> {
    if setup_token && provider != ProviderArg::Anthropic {
        return Err(KeywardError::Config(
            "--setup-token is only supported for anthropic".to_string(),
        ));
    }

    let cred = match provider {
        ProviderArg::Qwen => {
            println!("Logging in with {}...", provider.as_str());
            println!();
            let client = DeviceCodeClient::for_provider(OAuthProvider::Qwen, &config.oauth)?;
            let cred = client.login(|auth| show_device_prompt(auth, no_browser)).await?;
            println!("Authorization received!");
            cred
        },
        ProviderArg::Anthropic | ProviderArg::OpenAi => {
            let method = if setup_token {
                println!("Run 'claude setup-token' and paste the token below:");
                AuthMethod::SetupToken
            } else {
                println!("Paste your {} API key:", provider.as_str());
                AuthMethod::Token
            };
            login_paste_token(provider.as_str(), method, io::stdin().lock())?
        },
    };

    store.set_credential(provider.as_str(), &cred)?;

    println!();
    println!("Credentials saved for {} ({} storage).", provider.as_str(), store.mode());
    Ok(())
}

fn show_device_prompt(auth: &DeviceAuthorization, no_browser: bool) {
    println!("To authenticate, please visit:");
    println!();
    println!("  {}", auth.prompt_url());
    println!();
    if let Some(code) = auth.display_user_code() {
        println!("And enter code: {code}");
        println!();
    }

    if !no_browser {
        if auth.open_browser() {
            println!("Browser opened automatically.");
        } else {
            println!("Could not open browser. Please visit the URL manually.");
        }
        println!();
    }

    println!("Waiting for authorization...");
}

/// Handle the `keyward auth logout` command.
pub fn handle_logout(store: &SecureStore, provider: Option<String>) -> Result<()> {
    match provider {
        Some(provider) => {
            store.delete_credential(&provider)?;
            println!("Removed credentials for {provider}.");
        },
        None => {
            store.delete_all_credentials()?;
            println!("Removed all stored credentials.");
        },
    }
    Ok(())
}

/// Handle the `keyward auth status` command.
pub fn handle_status(store: &SecureStore) -> Result<()> {
    println!("Storage: {}", store.mode());
    println!();

    let providers = store.list_providers()?;
    if providers.is_empty() {
        println!("No stored credentials.");
        println!();
        println!("Run 'keyward auth login --provider <name>' to authenticate.");
        return Ok(());
    }

    let now = Utc::now();
    for provider in providers {
        match store.get_credential(&provider)? {
            Some(cred) if cred.has_access_token() => {
                println!("  {provider:<12} {:<12} {}", cred.auth_method, describe_expiry(&cred, now));
            },
            _ => println!("  {provider:<12} missing      run 'keyward auth login --provider {provider}'"),
        }
    }
    Ok(())
}

/// One-line expiry summary for `status`.
fn describe_expiry(cred: &AuthCredential, now: DateTime<Utc>) -> String {
    match cred.expires_at {
        None => "no expiry".to_string(),
        Some(at) if cred.is_expired_at(now) => format!("expired at {}", at.format("%Y-%m-%d %H:%M UTC")),
        Some(at) if cred.needs_refresh_at(now) => {
            format!("refresh due (expires {})", at.format("%H:%M UTC"))
        },
        Some(at) => format!("valid until {}", at.format("%Y-%m-%d %H:%M UTC")),
    }
}

/// Builds the token source for `provider`, refreshing when it has a device flow.
fn token_source_for(
    store: Arc<SecureStore>,
    config: &KeywardConfig,
    provider: &str,
) -> Result<TokenSource> {
    let source = TokenSource::new(store, provider);
    match provider.parse::<OAuthProvider>() {
        Ok(oauth) => Ok(source.with_refresher(DeviceCodeClient::for_provider(oauth, &config.oauth)?)),
        Err(_) => Ok(source),
    }
}

/// Handle the `keyward auth token` command.
pub async fn handle_token(
    store: Arc<SecureStore>,
    config: &KeywardConfig,
    provider: String,
) -> Result<()> {
    let source = token_source_for(store, config, &provider)?;
    println!("{}", source.access_token().await?);
    Ok(())
}

/// Handle the `keyward auth migrate` command.
pub fn handle_migrate(store: &SecureStore) -> Result<()> {
    if !store.mode().is_secure() {
        println!("Secure storage is disabled; nothing to migrate.");
        println!("Set KEYWARD_ENCRYPTION=1 or [security] enabled = true to enable it.");
        return Ok(());
    }

    let moved = store.migrate_from_plain_storage()?;
    if moved == 0 {
        println!("No plaintext credentials found.");
    } else {
        println!("Moved {moved} credential(s) into {} storage.", store.mode());
    }
    Ok(())
}
