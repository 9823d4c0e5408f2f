//! CLI-specific error formatting for user-facing messages.

use std::str::FromStr;

use crate::auth::{AuthError, BackendKind};
use crate::error::{RecoverySuggestion, ThreadsError};

/// Map a [`ThreadsError`] to a user-facing help string with actionable guidance.
pub fn format_error_help(err: &ThreadsError) -> String {
    match err {
        ThreadsError::Auth(AuthError::NotFound { account }) if account == "default" => {
            "No account is stored yet. Run: threads auth login".to_string()
        }
        ThreadsError::Auth(AuthError::NotFound { account }) => {
            format!("No credentials for account '{account}'. Run: threads auth login --account {account}")
        }
        ThreadsError::Auth(AuthError::Expired { account }) => format!(
            "The token for '{account}' has expired and can no longer be refreshed. Run: threads auth login --account {account}"
        ),
        ThreadsError::Auth(AuthError::BackendUnavailable { backend, reason }) => {
            let hint = BackendKind::from_str(backend)
                .map(BackendKind::install_hint)
                .unwrap_or("use --backend file");
            format!("Secure storage ({backend}) is unavailable: {reason}. Hint: {hint}")
        }
        ThreadsError::Auth(AuthError::ListenerBind { addr, reason }) => format!(
            "Could not listen for the OAuth callback on {addr}: {reason}. Free the port or set a different --redirect-uri (it must match the app settings)"
        ),
        ThreadsError::Auth(AuthError::StateMismatch) => {
            "The OAuth callback did not match this login attempt and was rejected. Nothing was stored; run: threads auth login".to_string()
        }
        other => match other.recovery_suggestion() {
            RecoverySuggestion::Login => format!("{other}. Run: threads auth login"),
            RecoverySuggestion::RetryWithBackoff => format!("{other}. Try again in a moment"),
            RecoverySuggestion::IncreaseTimeout => {
                format!("{other}. Retry with a larger --timeout")
            }
            RecoverySuggestion::CheckConfiguration => format!(
                "{other}. Check your config.toml, .env or THREADS_* environment variables"
            ),
            _ => format!("{other}"),
        },
    }
}
