use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::backend::{BackendKind, SecretBackend};
use super::error::AuthError;
use super::expiry;
use super::record::{normalize_name, CredentialRecord};

/// Prefix separating this tool's entries from anything else in a shared vault.
pub const KEY_PREFIX: &str = "threads-cli";

/// Longest accepted account name, in bytes. Keeps file-backend names within
/// common filesystem limits.
pub const MAX_NAME_BYTES: usize = 128;

/// Named-account credential store over a [`SecretBackend`].
///
/// Every operation is a single logical backend call. Nothing is cached except
/// the set of accounts already warned about impending expiry during this run.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use threads_cli::auth::backend::MemoryBackend;
/// use threads_cli::auth::{CredentialRecord, SecretStore};
///
/// let store = SecretStore::new(Arc::new(MemoryBackend::new()));
/// store.set("Work", CredentialRecord::new("work", "token"))?;
/// let record = store.get("work")?;
/// assert_eq!(record.access_token, "token");
/// # Ok::<(), threads_cli::auth::AuthError>(())
/// ```
pub struct SecretStore {
    backend: Arc<dyn SecretBackend>,
    warned: Mutex<HashSet<String>>,
}

impl SecretStore {
    pub fn new(backend: Arc<dyn SecretBackend>) -> Self {
        Self {
            backend,
            warned: Mutex::new(HashSet::new()),
        }
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// Store `record` under `name`, replacing any previous record.
    ///
    /// The record's `name` is rewritten to the normalized alias and
    /// `created_at` is defaulted to now when unset.
    pub fn set(&self, name: &str, mut record: CredentialRecord) -> Result<(), AuthError> {
        let name = validated_name(name)?;
        if record.access_token.trim().is_empty() {
            return Err(AuthError::InvalidInput(
                "refusing to store an empty access token".to_string(),
            ));
        }
        record.name = name.clone();
        if record.created_at.is_none() {
            record.created_at = Some(Utc::now());
        }

        let payload = serde_json::to_vec(&record)?;
        debug!(account = %name, backend = %self.backend.kind(), "storing credentials");
        self.backend.set(&storage_key(&name), &payload)
    }

    pub fn get(&self, name: &str) -> Result<CredentialRecord, AuthError> {
        let name = validated_name(name)?;
        let raw = self
            .backend
            .get(&storage_key(&name))?
            .ok_or_else(|| AuthError::not_found(&name))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    pub fn delete(&self, name: &str) -> Result<(), AuthError> {
        let name = validated_name(name)?;
        if self.backend.remove(&storage_key(&name))? {
            debug!(account = %name, "removed credentials");
            if let Ok(mut warned) = self.warned.lock() {
                warned.remove(&name);
            }
            Ok(())
        } else {
            Err(AuthError::not_found(name))
        }
    }

    /// Account names held in the backend. Order is backend-defined.
    pub fn list(&self) -> Result<Vec<String>, AuthError> {
        let prefix = format!("{KEY_PREFIX}:");
        Ok(self
            .backend
            .keys()?
            .into_iter()
            .filter_map(|key| key.strip_prefix(&prefix).map(str::to_string))
            .filter(|name| !name.is_empty())
            .collect())
    }

    /// `true` the first time `record` is seen expiring within `within` during
    /// this process; later calls for the same account return `false`.
    ///
    /// Surfacing the notice is the caller's job; this only logs at debug.
    pub fn warn_if_expiring(
        &self,
        record: &CredentialRecord,
        now: DateTime<Utc>,
        within: Duration,
    ) -> bool {
        if !expiry::is_expiring_soon(record, now, within) || expiry::is_expired(record, now) {
            return false;
        }
        let first = match self.warned.lock() {
            Ok(mut warned) => warned.insert(normalize_name(&record.name)),
            Err(_) => false,
        };
        if first {
            debug!(
                account = %record.name,
                days_left = expiry::days_until_expiry(record, now),
                "access token expires soon"
            );
        }
        first
    }
}

fn validated_name(name: &str) -> Result<String, AuthError> {
    let name = normalize_name(name);
    if name.is_empty() {
        return Err(AuthError::InvalidInput(
            "account name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_NAME_BYTES {
        return Err(AuthError::InvalidInput(format!(
            "account name is too long ({} bytes, at most {MAX_NAME_BYTES})",
            name.len()
        )));
    }
    Ok(name)
}

fn storage_key(name: &str) -> String {
    format!("{KEY_PREFIX}:{name}")
}
