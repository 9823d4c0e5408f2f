//! Secure storage backends for credential records.
//!
//! Each backend is a flat key/value vault. Keys are namespaced by the
//! [`SecretStore`](super::store::SecretStore); backends never interpret them.

pub mod file;
pub mod native;
pub mod memory;

use std::path::PathBuf;
use std::sync::Arc;

use strum::{Display, EnumString};
use tracing::{debug, warn};

use super::error::AuthError;

pub use file::{EncryptedFileBackend, PassphraseSource};
pub use native::KeyringBackend;
pub use memory::MemoryBackend;

/// Default service name used to label entries in OS vaults.
pub const DEFAULT_SERVICE: &str = "threads-cli";

/// Capability interface over a platform credential vault.
pub trait SecretBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Create or overwrite `key` with `value` in a single write.
    fn set(&self, key: &str, value: &[u8]) -> Result<(), AuthError>;

    /// `Ok(None)` when the key does not exist.
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AuthError>;

    /// Returns `false` when there was nothing to remove.
    fn remove(&self, key: &str) -> Result<bool, AuthError>;

    /// All keys currently held, in no particular order.
    fn keys(&self) -> Result<Vec<String>, AuthError>;
}

/// Available storage backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
pub enum BackendKind {
    /// macOS Keychain.
    Keychain,
    /// freedesktop Secret Service (GNOME Keyring, KWallet).
    SecretService,
    /// Windows Credential Manager.
    #[strum(to_string = "credential-manager", serialize = "wincred")]
    CredentialManager,
    /// AES-GCM encrypted files protected by a passphrase.
    File,
    /// Process-local map; nothing survives the process.
    Memory,
}

impl BackendKind {
    /// The OS vault this build talks to natively.
    pub fn native() -> Self {
        if cfg!(target_os = "macos") {
            Self::Keychain
        } else if cfg!(target_os = "windows") {
            Self::CredentialManager
        } else {
            Self::SecretService
        }
    }

    /// OS package or service the user should install when this backend is missing.
    pub fn install_hint(self) -> &'static str {
        match self {
            Self::SecretService => {
                "install and start a Secret Service provider (e.g. gnome-keyring or kwallet), or use --backend file"
            }
            Self::Keychain => "unlock the login keychain, or use --backend file",
            Self::CredentialManager => "check Windows Credential Manager access, or use --backend file",
            Self::File => "set THREADS_FILE_PASSPHRASE or run from an interactive terminal",
            Self::Memory => "the memory backend is always available",
        }
    }
}

/// Inputs needed to construct any backend.
#[derive(Debug, Clone)]
pub struct BackendOptions {
    pub service: String,
    pub file_dir: PathBuf,
    pub passphrase: PassphraseSource,
}

impl BackendOptions {
    pub fn new(file_dir: PathBuf) -> Self {
        Self {
            service: DEFAULT_SERVICE.to_string(),
            file_dir,
            passphrase: PassphraseSource::Prompt,
        }
    }

    pub fn with_passphrase(mut self, passphrase: PassphraseSource) -> Self {
        self.passphrase = passphrase;
        self
    }
}

/// Pick the backend once at startup.
///
/// `None` means automatic: the platform's native vault when it responds,
/// otherwise the encrypted file fallback. An explicit choice is honoured
/// as-is and its unavailability is reported rather than papered over.
pub fn select_backend(
    preference: Option<BackendKind>,
    options: &BackendOptions,
) -> Result<Arc<dyn SecretBackend>, AuthError> {
    match preference {
        Some(BackendKind::Memory) => Ok(Arc::new(MemoryBackend::new())),
        Some(BackendKind::File) => Ok(Arc::new(file_backend(options))),
        Some(kind) => {
            if kind != BackendKind::native() {
                return Err(AuthError::Configuration(format!(
                    "backend {kind} is not supported on this platform (native backend is {})",
                    BackendKind::native()
                )));
            }
            let backend = KeyringBackend::new(kind, &options.service);
            backend.probe()?;
            Ok(Arc::new(backend))
        }
        None => {
            let native = KeyringBackend::new(BackendKind::native(), &options.service);
            match native.probe() {
                Ok(()) => {
                    debug!(backend = %native.kind(), "using native secret backend");
                    Ok(Arc::new(native))
                }
                Err(err @ AuthError::BackendUnavailable { .. }) => {
                    warn!(
                        error = %err,
                        "native secret backend unavailable, falling back to encrypted file"
                    );
                    Ok(Arc::new(file_backend(options)))
                }
                Err(err) => Err(err),
            }
        }
    }
}

fn file_backend(options: &BackendOptions) -> EncryptedFileBackend {
    EncryptedFileBackend::new(options.file_dir.clone(), options.passphrase.clone())
}
