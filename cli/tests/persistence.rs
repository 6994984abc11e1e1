//! Credentials written by one store instance are readable by a fresh one.

use keyward::auth::{AuthCredential, AuthMethod};
use keyward::config::{SecureStoreConfig, StorePaths};
use keyward::store::{Algorithm, Encryptor, FileKeychain, KeychainBackend, SecureStore};
use tempfile::TempDir;

#[test]
fn file_keychain_survives_restart() {
    let dir = TempDir::new().unwrap();
    let paths = StorePaths::in_dir(dir.path());

    for algorithm in [Algorithm::XChaCha20Poly1305, Algorithm::Aes256Gcm] {
        let first = FileKeychain::new(
            Encryptor::new(algorithm, &paths.key_file).unwrap(),
            &paths.encrypted_file,
        );
        first
            .store("anthropic", &AuthCredential::new("anthropic", "tok-123", AuthMethod::Token))
            .unwrap();
        drop(first);

        let second = FileKeychain::new(
            Encryptor::open_existing(algorithm, &paths.key_file).unwrap(),
            &paths.encrypted_file,
        );
        let cred = second.retrieve("anthropic").unwrap().unwrap();
        assert_eq!(cred.access_token, "tok-123");
        second.delete("anthropic").unwrap();
    }
}

#[test]
fn secure_store_survives_restart_and_hides_secrets() {
    let dir = TempDir::new().unwrap();
    let config = SecureStoreConfig {
        enabled: true,
        ..SecureStoreConfig::default()
    };

    let mut cred = AuthCredential::new("qwen", "tok-123", AuthMethod::Oauth);
    cred.refresh_token = Some("ref-456".to_string());
    SecureStore::new(config.clone(), StorePaths::in_dir(dir.path()), None)
        .unwrap()
        .set_credential("qwen", &cred)
        .unwrap();

    let paths = StorePaths::in_dir(dir.path());
    for file in [&paths.auth_file, &paths.encrypted_file] {
        let raw = std::fs::read_to_string(file).unwrap();
        assert!(!raw.contains("tok-123"), "{}", file.display());
        assert!(!raw.contains("ref-456"), "{}", file.display());
    }

    let reopened = SecureStore::new(config, paths, None).unwrap();
    assert_eq!(reopened.list_providers().unwrap(), vec!["qwen".to_string()]);
    assert_eq!(reopened.get_credential("qwen").unwrap(), Some(cred));
}
