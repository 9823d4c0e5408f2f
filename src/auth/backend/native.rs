//! OS vault backend (macOS Keychain, Secret Service, Windows Credential Manager)
//! through the `keyring` crate.
//!
//! OS vaults cannot enumerate entries, so the set of stored keys is kept in a
//! separate index entry under `<service>.index`.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::{BackendKind, SecretBackend};
use crate::auth::error::AuthError;

const INDEX_ACCOUNT: &str = "keys";

/// Secret backend using the platform-native credential vault.
#[derive(Debug, Clone)]
pub struct KeyringBackend {
    kind: BackendKind,
    service: String,
    index_service: String,
}

impl KeyringBackend {
    pub fn new(kind: BackendKind, service: &str) -> Self {
        Self {
            kind,
            service: service.to_string(),
            index_service: format!("{service}.index"),
        }
    }

    /// Touch the vault once so an unreachable backend is detected at startup
    /// rather than on first use.
    pub fn probe(&self) -> Result<(), AuthError> {
        self.read_index().map(|_| ())
    }

    fn entry(&self, service: &str, account: &str) -> Result<keyring::Entry, AuthError> {
        keyring::Entry::new(service, account).map_err(|err| self.map_error(err))
    }

    fn map_error(&self, err: keyring::Error) -> AuthError {
        match err {
            keyring::Error::PlatformFailure(inner) | keyring::Error::NoStorageAccess(inner) => {
                AuthError::unavailable(self.kind, inner.to_string())
            }
            other => AuthError::Backend(format!("{}: {other}", self.kind)),
        }
    }

    fn read_index(&self) -> Result<BTreeSet<String>, AuthError> {
        let entry = self.entry(&self.index_service, INDEX_ACCOUNT)?;
        match entry.get_secret() {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(keyring::Error::NoEntry) => Ok(BTreeSet::new()),
            Err(err) => Err(self.map_error(err)),
        }
    }

    fn write_index(&self, keys: &BTreeSet<String>) -> Result<(), AuthError> {
        let entry = self.entry(&self.index_service, INDEX_ACCOUNT)?;
        if keys.is_empty() {
            return match entry.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                Err(err) => Err(self.map_error(err)),
            };
        }
        let raw = serde_json::to_vec(keys)?;
        entry.set_secret(&raw).map_err(|err| self.map_error(err))
    }

    fn delete_record(&self, key: &str) -> Result<(), AuthError> {
        match self.entry(&self.service, key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(err) => Err(self.map_error(err)),
        }
    }
}

/// Write a record that is not yet indexed, then index it. A failed index
/// write deletes the record again so it cannot become unlisted.
fn write_indexed(
    key: &str,
    write_record: impl FnOnce() -> Result<(), AuthError>,
    write_index: impl FnOnce() -> Result<(), AuthError>,
    rollback: impl FnOnce() -> Result<(), AuthError>,
) -> Result<(), AuthError> {
    write_record()?;
    if let Err(err) = write_index() {
        if let Err(rollback_err) = rollback() {
            warn!(key, error = %rollback_err, "record stored but missing from the vault index");
        }
        return Err(err);
    }
    Ok(())
}

impl SecretBackend for KeyringBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), AuthError> {
        debug!(backend = %self.kind, key, "writing secret");
        let mut index = self.read_index()?;
        let write_record = || {
            self.entry(&self.service, key)?
                .set_secret(value)
                .map_err(|err| self.map_error(err))
        };
        if !index.insert(key.to_string()) {
            return write_record();
        }
        write_indexed(
            key,
            write_record,
            || self.write_index(&index),
            || self.delete_record(key),
        )
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AuthError> {
        debug!(backend = %self.kind, key, "reading secret");
        match self.entry(&self.service, key)?.get_secret() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(err) => Err(self.map_error(err)),
        }
    }

    fn remove(&self, key: &str) -> Result<bool, AuthError> {
        debug!(backend = %self.kind, key, "removing secret");
        let existed = match self.entry(&self.service, key)?.delete_credential() {
            Ok(()) => true,
            Err(keyring::Error::NoEntry) => false,
            Err(err) => return Err(self.map_error(err)),
        };

        // The record is already gone; a stale index entry only lists a name
        // whose lookup reports not found.
        let pruned = self.read_index().and_then(|mut index| {
            if index.remove(key) {
                self.write_index(&index)
            } else {
                Ok(())
            }
        });
        if let Err(err) = pruned {
            warn!(key, error = %err, "could not prune the vault index");
        }
        Ok(existed)
    }

    fn keys(&self) -> Result<Vec<String>, AuthError> {
        Ok(self.read_index()?.into_iter().collect())
    }
}
