//! Encrypted-file fallback backend.
//!
//! Every key lives in its own JSON envelope under the backend directory. The
//! value is sealed with AES-256-GCM using a key derived from the user's
//! passphrase with Argon2 and a per-file salt, so a fresh nonce and salt are
//! drawn on every write.

use std::fs;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Mutex;

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use base64::engine::general_purpose::{STANDARD as BASE64, URL_SAFE_NO_PAD};
use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{BackendKind, SecretBackend};
use crate::auth::error::AuthError;
use crate::util::fs::write_private;

const ENVELOPE_VERSION: u32 = 1;
const ENVELOPE_EXTENSION: &str = "secret";
const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const SALT_SIZE: usize = 16;

/// Where the file backend gets its passphrase from.
#[derive(Clone)]
pub enum PassphraseSource {
    /// Supplied up front (configuration or `THREADS_FILE_PASSPHRASE`).
    Value(String),
    /// Ask on the terminal the first time a secret is read or written.
    Prompt,
}

impl std::fmt::Debug for PassphraseSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Value(_) => f.write_str("Value(<redacted>)"),
            Self::Prompt => f.write_str("Prompt"),
        }
    }
}

/// Secret backend storing AES-GCM sealed envelopes on disk.
pub struct EncryptedFileBackend {
    dir: PathBuf,
    source: PassphraseSource,
    passphrase: Mutex<Option<String>>,
}

impl EncryptedFileBackend {
    pub fn new(dir: PathBuf, source: PassphraseSource) -> Self {
        Self {
            dir,
            source,
            passphrase: Mutex::new(None),
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let encoded = URL_SAFE_NO_PAD.encode(key.as_bytes());
        self.dir.join(format!("{encoded}.{ENVELOPE_EXTENSION}"))
    }

    /// Resolve the passphrase once per process. When envelopes already exist
    /// the passphrase must open one of them before anything is written with it.
    fn passphrase(&self) -> Result<String, AuthError> {
        let mut cached = self
            .passphrase
            .lock()
            .map_err(|_| AuthError::Backend("passphrase lock poisoned".to_string()))?;
        if let Some(passphrase) = cached.as_ref() {
            return Ok(passphrase.clone());
        }

        let existing = self.first_envelope()?;
        let passphrase = match &self.source {
            PassphraseSource::Value(value) => value.clone(),
            PassphraseSource::Prompt => prompt_passphrase(existing.is_none())?,
        };
        if passphrase.is_empty() {
            return Err(AuthError::unavailable(
                BackendKind::File,
                "the credential file passphrase is empty",
            ));
        }
        if let Some(envelope) = existing {
            decrypt(&passphrase, &envelope).map_err(|_| {
                AuthError::Backend(
                    "wrong passphrase: could not decrypt the existing credential files".to_string(),
                )
            })?;
        }
        *cached = Some(passphrase.clone());
        Ok(passphrase)
    }

    /// Any readable envelope already in the directory.
    fn first_envelope(&self) -> Result<Option<Envelope>, AuthError> {
        for path in self.envelope_paths()? {
            let Ok(raw) = fs::read(&path) else {
                continue;
            };
            if let Ok(envelope) = serde_json::from_slice::<Envelope>(&raw) {
                return Ok(Some(envelope));
            }
        }
        Ok(None)
    }

    fn envelope_paths(&self) -> Result<Vec<PathBuf>, AuthError> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|ext| ext.to_str()) == Some(ENVELOPE_EXTENSION) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    fn seal(&self, key: &str, value: &[u8]) -> Result<Envelope, AuthError> {
        let mut salt = [0u8; SALT_SIZE];
        OsRng.fill_bytes(&mut salt);
        let cipher = cipher_for(&self.passphrase()?, &salt)?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, value)
            .map_err(|e| AuthError::Backend(format!("encryption failed: {e}")))?;

        Ok(Envelope {
            version: ENVELOPE_VERSION,
            key: key.to_string(),
            salt: BASE64.encode(salt),
            nonce: BASE64.encode(nonce),
            ciphertext: BASE64.encode(ciphertext),
        })
    }

    fn open(&self, envelope: &Envelope) -> Result<Vec<u8>, AuthError> {
        decrypt(&self.passphrase()?, envelope)
    }
}

impl SecretBackend for EncryptedFileBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::File
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), AuthError> {
        let envelope = self.seal(key, value)?;
        let path = self.path_for(key);
        debug!(path = %path.display(), "writing encrypted secret");
        write_private(&path, &serde_json::to_vec_pretty(&envelope)?)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AuthError> {
        let path = self.path_for(key);
        let raw = match fs::read(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(AuthError::Io(err.to_string())),
        };
        let envelope: Envelope = serde_json::from_slice(&raw)?;
        self.open(&envelope).map(Some)
    }

    fn remove(&self, key: &str) -> Result<bool, AuthError> {
        match fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(err) => Err(AuthError::Io(err.to_string())),
        }
    }

    fn keys(&self) -> Result<Vec<String>, AuthError> {
        let mut keys = Vec::new();
        for path in self.envelope_paths()? {
            let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
                continue;
            };
            // Foreign files in the directory are skipped rather than failing the listing.
            if let Some(key) = URL_SAFE_NO_PAD
                .decode(stem)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
            {
                keys.push(key);
            }
        }
        Ok(keys)
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    version: u32,
    key: String,
    salt: String,
    nonce: String,
    ciphertext: String,
}

fn cipher_for(passphrase: &str, salt: &[u8]) -> Result<Aes256Gcm, AuthError> {
    let mut key = [0u8; KEY_SIZE];
    Argon2::default()
        .hash_password_into(passphrase.as_bytes(), salt, &mut key)
        .map_err(|e| AuthError::Backend(format!("key derivation failed: {e}")))?;
    Aes256Gcm::new_from_slice(&key)
        .map_err(|e| AuthError::Backend(format!("failed to create cipher: {e}")))
}

fn decrypt(passphrase: &str, envelope: &Envelope) -> Result<Vec<u8>, AuthError> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(AuthError::Backend(format!(
            "unsupported credential file version {}",
            envelope.version
        )));
    }
    let salt = decode_field(&envelope.salt, "salt")?;
    let nonce = decode_field(&envelope.nonce, "nonce")?;
    let ciphertext = decode_field(&envelope.ciphertext, "ciphertext")?;
    if nonce.len() != NONCE_SIZE {
        return Err(AuthError::Backend(format!(
            "invalid nonce size: expected {NONCE_SIZE}, got {}",
            nonce.len()
        )));
    }

    let cipher = cipher_for(passphrase, &salt)?;
    cipher
        .decrypt(Nonce::from_slice(&nonce), ciphertext.as_ref())
        .map_err(|_| {
            AuthError::Backend(
                "could not decrypt credential file (wrong passphrase or corrupted data)"
                    .to_string(),
            )
        })
}

fn decode_field(value: &str, field: &str) -> Result<Vec<u8>, AuthError> {
    BASE64
        .decode(value)
        .map_err(|e| AuthError::Backend(format!("credential file has invalid {field}: {e}")))
}

/// `confirm` asks twice; used when no credential file exists yet to check against.
fn prompt_passphrase(confirm: bool) -> Result<String, AuthError> {
    if !std::io::stdin().is_terminal() {
        return Err(AuthError::unavailable(
            BackendKind::File,
            "no terminal available to prompt for the credential file passphrase; set THREADS_FILE_PASSPHRASE",
        ));
    }
    let mut prompt =
        dialoguer::Password::new().with_prompt("Passphrase for the threads-cli credential file");
    if confirm {
        prompt = prompt.with_confirmation("Confirm passphrase", "Passphrases do not match");
    }
    prompt
        .interact()
        .map_err(|e| AuthError::unavailable(BackendKind::File, format!("passphrase prompt failed: {e}")))
}
