use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::expiry::{self, ExpiryStatus};

/// One authenticated account as persisted in the secret store.
///
/// The serialized form carries every secret and must only ever be written
/// to a [`SecretBackend`](super::backend::SecretBackend). Use
/// [`CredentialRecord::summary`] for anything user-facing.
///
/// # Example
/// ```no_run
/// use threads_cli::auth::CredentialRecord;
///
/// let record = CredentialRecord::new("work", "long-lived-token")
///     .with_identity("1789", "alice")
///     .with_app_credentials("client-id", "client-secret");
/// assert_eq!(record.username, "alice");
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub name: String,
    pub access_token: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub username: String,
    /// `None` means the expiry is unknown and the token is treated as non-expiring.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
}

impl CredentialRecord {
    pub fn new(name: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            access_token: access_token.into(),
            user_id: String::new(),
            username: String::new(),
            expires_at: None,
            created_at: None,
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: String::new(),
        }
    }

    pub fn with_identity(mut self, user_id: impl Into<String>, username: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self.username = username.into();
        self
    }

    pub fn with_expires_at(mut self, expires_at: Option<DateTime<Utc>>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn with_app_credentials(
        mut self,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        self.client_id = client_id.into();
        self.client_secret = client_secret.into();
        self
    }

    pub fn with_redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uri = redirect_uri.into();
        self
    }

    /// Replace the token material after a refresh. Identity and app
    /// credentials are left as they are.
    pub fn apply_refresh(&mut self, access_token: String, expires_at: Option<DateTime<Utc>>) {
        self.access_token = access_token;
        self.expires_at = expires_at;
    }

    /// Non-secret view of this record, evaluated against `now`.
    /// `within` is the warning window used to flag tokens expiring soon.
    pub fn summary(&self, now: DateTime<Utc>, within: Duration) -> CredentialSummary {
        CredentialSummary {
            name: self.name.clone(),
            user_id: self.user_id.clone(),
            username: self.username.clone(),
            token: mask_token(&self.access_token),
            expires_at: self.expires_at,
            created_at: self.created_at,
            days_until_expiry: expiry::days_until_expiry(self, now),
            expired: expiry::is_expired(self, now),
            status: expiry::classify(self, now, within),
            has_app_credentials: !self.client_id.is_empty() && !self.client_secret.is_empty(),
        }
    }
}

impl fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("name", &self.name)
            .field("access_token", &mask_token(&self.access_token))
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("expires_at", &self.expires_at)
            .field("created_at", &self.created_at)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .finish()
    }
}

/// Display-safe projection of a [`CredentialRecord`]. Never carries secrets.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CredentialSummary {
    pub name: String,
    pub user_id: String,
    pub username: String,
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub days_until_expiry: f64,
    pub expired: bool,
    pub status: ExpiryStatus,
    pub has_app_credentials: bool,
}

/// Canonical form of an account alias: trimmed and lower-cased.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

const TOKEN_MASK_PREFIX_LEN: usize = 6;
const TOKEN_MASK_SUFFIX_LEN: usize = 4;

/// Shorten a token to its first and last few characters for display.
pub fn mask_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= TOKEN_MASK_PREFIX_LEN + TOKEN_MASK_SUFFIX_LEN {
        return "*".repeat(chars.len().min(8));
    }

    let prefix: String = chars[..TOKEN_MASK_PREFIX_LEN].iter().collect();
    let suffix: String = chars[chars.len() - TOKEN_MASK_SUFFIX_LEN..].iter().collect();
    format!("{prefix}...{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_name_trims_and_lowercases() {
        assert_eq!(normalize_name("  Work "), "work");
        assert_eq!(normalize_name("PERSONAL"), "personal");
    }

    #[test]
    fn mask_token_keeps_prefix_and_suffix() {
        assert_eq!(mask_token("abcdef1234567890"), "abcdef...7890");
    }

    #[test]
    fn mask_token_short_values_redacts_fully() {
        assert_eq!(mask_token("short"), "*****");
        assert_eq!(mask_token(""), "");
    }

    #[test]
    fn debug_output_hides_secrets() {
        let record = CredentialRecord::new("work", "THAAsupersecrettokenvalue")
            .with_app_credentials("cid", "very-secret-client-secret");
        let rendered = format!("{record:?}");
        assert!(!rendered.contains("supersecret"));
        assert!(!rendered.contains("very-secret-client-secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn summary_serialization_excludes_secrets() {
        let record = CredentialRecord::new("work", "THAAsupersecrettokenvalue")
            .with_identity("42", "alice")
            .with_app_credentials("cid", "very-secret-client-secret");
        let json = serde_json::to_string(&record.summary(Utc::now(), Duration::days(7))).unwrap();
        assert!(!json.contains("supersecret"));
        assert!(!json.contains("very-secret-client-secret"));
        assert!(json.contains("alice"));
    }

    #[test]
    fn apply_refresh_keeps_identity_and_app_credentials() {
        let mut record = CredentialRecord::new("work", "old")
            .with_identity("42", "alice")
            .with_app_credentials("cid", "secret");
        let expires = Utc::now() + Duration::days(60);
        record.apply_refresh("new".to_string(), Some(expires));
        assert_eq!(record.access_token, "new");
        assert_eq!(record.expires_at, Some(expires));
        assert_eq!(record.username, "alice");
        assert_eq!(record.client_secret, "secret");
    }

    #[test]
    fn record_deserializes_with_missing_optional_fields() {
        let record: CredentialRecord =
            serde_json::from_str(r#"{"name":"work","access_token":"t"}"#).unwrap();
        assert_eq!(record.name, "work");
        assert!(record.expires_at.is_none());
        assert!(record.user_id.is_empty());
    }
}
