//! Error classification and recovery hints.

use serde::Serialize;
use strum::Display;

/// Broad error category for routing recovery logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Authentication,
    Security,
    NotFound,
    Expired,
    RateLimit,
    Network,
    Timeout,
    Server,
    Api,
    Storage,
    Configuration,
    Cancelled,
    InvalidInput,
    Serialization,
    Unknown,
}

/// Suggested recovery action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum RecoverySuggestion {
    /// Run `threads auth login` again.
    Login,
    RetryWithBackoff,
    CheckCredentials,
    CheckConfiguration,
    /// Free the callback port or pick another redirect URI.
    FreePort,
    /// Install or unlock an OS vault, or switch to the file backend.
    InstallSecretBackend,
    IncreaseTimeout,
    None,
}
