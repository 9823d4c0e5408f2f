use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use super::{BackendKind, SecretBackend};
use crate::auth::error::AuthError;

/// Process-local backend. Used by tests and `--backend memory`.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<String, Vec<u8>>>, AuthError> {
        self.entries
            .lock()
            .map_err(|_| AuthError::Backend("memory backend lock poisoned".to_string()))
    }
}

impl SecretBackend for MemoryBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), AuthError> {
        self.entries()?.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, AuthError> {
        Ok(self.entries()?.get(key).cloned())
    }

    fn remove(&self, key: &str) -> Result<bool, AuthError> {
        Ok(self.entries()?.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>, AuthError> {
        Ok(self.entries()?.keys().cloned().collect())
    }
}
