//! Error types for threads-cli.

pub mod unified;

pub use unified::{ErrorCategory, RecoverySuggestion};

use thiserror::Error;

use crate::auth::{AuthError, AuthErrorKind};

/// Primary error type for all threads-cli operations.
#[derive(Error, Debug)]
pub enum ThreadsError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid config file {path}: {message}")]
    ConfigFile { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl ThreadsError {
    /// Classify this error into a category.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Auth(err) => match err {
                AuthError::TimedOut(_) => ErrorCategory::Timeout,
                AuthError::Api { status, .. } => match status {
                    401 | 403 => ErrorCategory::Authentication,
                    429 => ErrorCategory::RateLimit,
                    500..=599 => ErrorCategory::Server,
                    _ => ErrorCategory::Api,
                },
                other => match other.kind() {
                    AuthErrorKind::Configuration => ErrorCategory::Configuration,
                    AuthErrorKind::StateMismatch => ErrorCategory::Security,
                    AuthErrorKind::ProviderDenied => ErrorCategory::Authentication,
                    AuthErrorKind::Network => ErrorCategory::Network,
                    AuthErrorKind::Api => ErrorCategory::Api,
                    AuthErrorKind::NotFound => ErrorCategory::NotFound,
                    AuthErrorKind::Expired => ErrorCategory::Expired,
                    AuthErrorKind::BackendUnavailable | AuthErrorKind::Backend => {
                        ErrorCategory::Storage
                    }
                    AuthErrorKind::Cancelled => ErrorCategory::Cancelled,
                    AuthErrorKind::InvalidInput => ErrorCategory::InvalidInput,
                    AuthErrorKind::Serialization => ErrorCategory::Serialization,
                    AuthErrorKind::Io => ErrorCategory::Unknown,
                },
            },
            Self::Configuration(_) | Self::ConfigFile { .. } => ErrorCategory::Configuration,
            Self::Serialization(_) => ErrorCategory::Serialization,
            Self::InvalidArgument(_) => ErrorCategory::InvalidInput,
            Self::Io(_) => ErrorCategory::Unknown,
        }
    }

    /// Whether this error is potentially retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::RateLimit
                | ErrorCategory::Network
                | ErrorCategory::Timeout
                | ErrorCategory::Server
        )
    }

    /// Suggest recovery actions.
    pub fn recovery_suggestion(&self) -> RecoverySuggestion {
        if let Self::Auth(AuthError::ListenerBind { .. }) = self {
            return RecoverySuggestion::FreePort;
        }
        match self.category() {
            ErrorCategory::Authentication
            | ErrorCategory::Security
            | ErrorCategory::NotFound
            | ErrorCategory::Expired => RecoverySuggestion::Login,
            ErrorCategory::RateLimit | ErrorCategory::Network | ErrorCategory::Server => {
                RecoverySuggestion::RetryWithBackoff
            }
            ErrorCategory::Timeout => RecoverySuggestion::IncreaseTimeout,
            ErrorCategory::Storage => RecoverySuggestion::InstallSecretBackend,
            ErrorCategory::Configuration => RecoverySuggestion::CheckConfiguration,
            ErrorCategory::Api | ErrorCategory::InvalidInput => {
                RecoverySuggestion::CheckCredentials
            }
            _ => RecoverySuggestion::None,
        }
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, ThreadsError>;
