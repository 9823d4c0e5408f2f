use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use threads_cli::auth::backend::{
    EncryptedFileBackend, MemoryBackend, PassphraseSource, SecretBackend,
};
use threads_cli::auth::{expiry, AuthError, CredentialRecord, SecretStore};

fn memory_store() -> SecretStore {
    SecretStore::new(Arc::new(MemoryBackend::new()))
}

fn file_store(dir: &TempDir) -> SecretStore {
    SecretStore::new(Arc::new(EncryptedFileBackend::new(
        dir.path().to_path_buf(),
        PassphraseSource::Value("correct horse".to_string()),
    )))
}

fn sample(name: &str, token: &str) -> CredentialRecord {
    CredentialRecord::new(name, token)
        .with_identity("u1", "alice")
        .with_app_credentials("c1", "s1")
        .with_redirect_uri("http://127.0.0.1:8585/callback")
}

fn check_lifecycle(store: &SecretStore) {
    store.set("n1", sample("n1", "first")).unwrap();
    store.set("n1", sample("n1", "second")).unwrap();
    let names = store.list().unwrap();
    assert_eq!(names, vec!["n1".to_string()]);
    assert_eq!(store.get("n1").unwrap().access_token, "second");

    store.set("n2", sample("n2", "other")).unwrap();
    store.delete("n1").unwrap();
    assert_eq!(store.list().unwrap(), vec!["n2".to_string()]);
    assert!(matches!(
        store.get("n1"),
        Err(AuthError::NotFound { account }) if account == "n1"
    ));
    assert!(matches!(store.delete("n1"), Err(AuthError::NotFound { .. })));
}

#[test]
fn memory_store_lifecycle() {
    check_lifecycle(&memory_store());
}

#[test]
fn file_store_lifecycle() {
    let dir = TempDir::new().unwrap();
    check_lifecycle(&file_store(&dir));
}

#[test]
fn names_are_case_insensitive_and_expiry_survives_storage() {
    let store = memory_store();
    let now = Utc::now();
    let record = CredentialRecord::new("Work", "t").with_expires_at(Some(now - Duration::hours(1)));
    store.set("Work", record).unwrap();

    let loaded = store.get("work").unwrap();
    assert_eq!(loaded.name, "work");
    assert_eq!(loaded.access_token, "t");
    assert!(expiry::is_expired(&loaded, now));
}

#[test]
fn secrets_round_trip_through_the_file_backend() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir);
    let mut record = sample("work", "THAAlong-lived-token");
    record.created_at = Some(Utc::now());
    store.set("work", record.clone()).unwrap();

    assert_eq!(store.get("work").unwrap(), record);

    // Nothing secret is readable on disk.
    for entry in std::fs::read_dir(dir.path()).unwrap() {
        let raw = std::fs::read_to_string(entry.unwrap().path()).unwrap();
        assert!(!raw.contains("THAAlong-lived-token"));
        assert!(!raw.contains("\"s1\""));
    }
}

#[test]
fn file_store_with_wrong_passphrase_fails_without_leaking() {
    let dir = TempDir::new().unwrap();
    file_store(&dir).set("work", sample("work", "token")).unwrap();

    let other = SecretStore::new(Arc::new(EncryptedFileBackend::new(
        dir.path().to_path_buf(),
        PassphraseSource::Value("wrong".to_string()),
    )));
    match other.get("work") {
        Err(AuthError::Backend(message)) => assert!(!message.contains("token")),
        other => panic!("expected Backend error, got {other:?}"),
    }
}

#[test]
fn store_only_lists_its_own_namespace() {
    let backend = Arc::new(MemoryBackend::new());
    backend.set("some-other-tool:work", b"{}").unwrap();
    let store = SecretStore::new(backend);
    store.set("home", sample("home", "t")).unwrap();
    assert_eq!(store.list().unwrap(), vec!["home".to_string()]);
}

#[test]
fn mistyped_passphrase_cannot_write_alongside_existing_records() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir);
    store.set("work", sample("work", "token")).unwrap();

    let typo = SecretStore::new(Arc::new(EncryptedFileBackend::new(
        dir.path().to_path_buf(),
        PassphraseSource::Value("correct hrose".to_string()),
    )));
    assert!(matches!(
        typo.set("home", sample("home", "other")),
        Err(AuthError::Backend(message)) if message.contains("wrong passphrase")
    ));

    assert_eq!(store.list().unwrap(), vec!["work".to_string()]);
    let reopened = file_store(&dir);
    reopened.set("home", sample("home", "other")).unwrap();
    assert_eq!(reopened.get("work").unwrap().access_token, "token");
    assert_eq!(reopened.get("home").unwrap().access_token, "other");
}

#[test]
fn any_passphrase_starts_an_empty_file_store() {
    let dir = TempDir::new().unwrap();
    let store = SecretStore::new(Arc::new(EncryptedFileBackend::new(
        dir.path().join("fresh"),
        PassphraseSource::Value("first choice".to_string()),
    )));
    store.set("work", sample("work", "token")).unwrap();
    assert_eq!(store.get("work").unwrap().access_token, "token");
}

#[test]
fn longest_account_name_fits_the_file_backend() {
    let dir = TempDir::new().unwrap();
    let store = file_store(&dir);
    let name = "x".repeat(threads_cli::auth::store::MAX_NAME_BYTES);
    store.set(&name, sample(&name, "token")).unwrap();
    assert_eq!(store.list().unwrap(), vec![name.clone()]);

    let too_long = format!("{name}x");
    assert!(matches!(
        store.set(&too_long, sample(&too_long, "token")),
        Err(AuthError::InvalidInput(_))
    ));
}
