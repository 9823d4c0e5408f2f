use std::time::Duration;

use strum::Display;
use thiserror::Error;

/// Classification of [`AuthError`] values, used by callers to pick a message
/// or decide whether a fresh attempt makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum AuthErrorKind {
    Configuration,
    StateMismatch,
    ProviderDenied,
    Network,
    Api,
    NotFound,
    Expired,
    BackendUnavailable,
    Backend,
    Cancelled,
    InvalidInput,
    Serialization,
    Io,
}

/// Errors raised by the OAuth flow engine and the secret store.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Callback listener could not bind {addr}: {reason}")]
    ListenerBind { addr: String, reason: String },
    #[error("OAuth state mismatch on callback; the login attempt was aborted")]
    StateMismatch,
    #[error("Authorization denied by provider: {}", describe_denial(.error, .description.as_deref()))]
    ProviderDenied {
        error: String,
        description: Option<String>,
    },
    #[error("Network error: {0}")]
    Network(String),
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
    #[error("No stored credentials for account '{account}'")]
    NotFound { account: String },
    #[error("Token for account '{account}' has expired")]
    Expired { account: String },
    #[error("Secret backend {backend} is unavailable: {reason}")]
    BackendUnavailable { backend: String, reason: String },
    #[error("Secret backend error: {0}")]
    Backend(String),
    #[error("Login cancelled")]
    Cancelled,
    #[error("Timed out after {}s waiting for the OAuth callback", .0.as_secs())]
    TimedOut(Duration),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            Self::Configuration(_) | Self::ListenerBind { .. } => AuthErrorKind::Configuration,
            Self::StateMismatch => AuthErrorKind::StateMismatch,
            Self::ProviderDenied { .. } => AuthErrorKind::ProviderDenied,
            Self::Network(_) => AuthErrorKind::Network,
            Self::Api { .. } | Self::InvalidResponse(_) => AuthErrorKind::Api,
            Self::NotFound { .. } => AuthErrorKind::NotFound,
            Self::Expired { .. } => AuthErrorKind::Expired,
            Self::BackendUnavailable { .. } => AuthErrorKind::BackendUnavailable,
            Self::Backend(_) => AuthErrorKind::Backend,
            Self::Cancelled | Self::TimedOut(_) => AuthErrorKind::Cancelled,
            Self::InvalidInput(_) => AuthErrorKind::InvalidInput,
            Self::Serialization(_) => AuthErrorKind::Serialization,
            Self::Io(_) => AuthErrorKind::Io,
        }
    }

    /// Whether a fresh attempt could plausibly succeed without user changes.
    ///
    /// Nothing in this crate retries on its own; this only informs the caller.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status == 429 || (500..=599).contains(status),
            _ => false,
        }
    }

    pub(crate) fn not_found(account: impl Into<String>) -> Self {
        Self::NotFound {
            account: account.into(),
        }
    }

    pub(crate) fn unavailable(backend: impl ToString, reason: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.to_string(),
            reason: reason.into(),
        }
    }
}

fn describe_denial(error: &str, description: Option<&str>) -> String {
    match description {
        Some(description) if !description.is_empty() => format!("{error} ({description})"),
        _ => error.to_string(),
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Self::InvalidResponse(error.to_string());
        }
        Self::Network(error.to_string())
    }
}

impl From<std::io::Error> for AuthError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
