use std::sync::Arc;

use chrono::{Duration, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::error::AuthError;
use super::expiry;
use super::oauth::{AuthorizationRequest, OAuthFlow};
use super::record::{normalize_name, CredentialRecord, CredentialSummary};
use super::store::SecretStore;

pub const DEFAULT_EXPIRY_WINDOW_DAYS: i64 = 7;

/// OAuth application credentials supplied alongside a pasted token.
#[derive(Clone)]
pub struct AppCredentials {
    pub client_id: String,
    pub client_secret: String,
}

impl std::fmt::Debug for AppCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// A usable token for an API call, with what happened while resolving it.
#[derive(Debug, Clone)]
pub struct ActiveToken {
    pub record: CredentialRecord,
    /// The token was refreshed and stored before being handed out.
    pub refreshed: bool,
    /// First sighting this run of a token inside the warning window.
    pub expiring_soon: bool,
}

/// Account-level operations on top of the flow engine and the secret store.
///
/// All I/O decisions (printing, prompting, exit codes) belong to the caller.
/// `AuthService` only returns typed results and errors.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use threads_cli::auth::backend::MemoryBackend;
/// use threads_cli::auth::oauth::OAuthFlow;
/// use threads_cli::auth::{AuthService, SecretStore};
///
/// let store = Arc::new(SecretStore::new(Arc::new(MemoryBackend::new())));
/// let svc = AuthService::new(store, OAuthFlow::new(reqwest::Client::new()));
/// ```
pub struct AuthService {
    store: Arc<SecretStore>,
    flow: OAuthFlow,
    expiry_window: Duration,
    auto_refresh: bool,
}

impl AuthService {
    pub fn new(store: Arc<SecretStore>, flow: OAuthFlow) -> Self {
        Self {
            store,
            flow,
            expiry_window: Duration::days(DEFAULT_EXPIRY_WINDOW_DAYS),
            auto_refresh: false,
        }
    }

    pub fn with_expiry_window(mut self, window: Duration) -> Self {
        self.expiry_window = window;
        self
    }

    /// Refresh tokens inside the warning window when they are requested.
    pub fn with_auto_refresh(mut self, enabled: bool) -> Self {
        self.auto_refresh = enabled;
        self
    }

    pub fn store(&self) -> &SecretStore {
        &self.store
    }

    pub fn flow(&self) -> &OAuthFlow {
        &self.flow
    }

    /// Run the browser login and store the result under `name`.
    ///
    /// Nothing is written unless the whole flow succeeded.
    pub async fn login(
        &self,
        name: &str,
        request: &AuthorizationRequest,
        cancel: &CancellationToken,
    ) -> Result<CredentialRecord, AuthError> {
        let name = require_name(name)?;
        let result = self.flow.start(request, cancel).await?;
        let record = CredentialRecord::new(&name, result.access_token)
            .with_identity(result.user_id, result.username)
            .with_expires_at(result.expires_at)
            .with_app_credentials(&request.client_id, &request.client_secret)
            .with_redirect_uri(&request.redirect_uri);
        self.store.set(&name, record)?;
        info!(account = %name, "logged in");
        self.store.get(&name)
    }

    /// Store a token obtained outside the browser flow.
    ///
    /// The token is validated against `/me` before anything is written. With
    /// app credentials it is first upgraded to a long-lived token; without
    /// them its expiry is unknown.
    pub async fn ingest_token(
        &self,
        name: &str,
        access_token: &str,
        app: Option<AppCredentials>,
        cancel: &CancellationToken,
    ) -> Result<CredentialRecord, AuthError> {
        let name = require_name(name)?;
        let access_token = access_token.trim();
        if access_token.is_empty() {
            return Err(AuthError::InvalidInput(
                "access token must not be empty".to_string(),
            ));
        }

        let (token, expires_at) = match &app {
            Some(app) => {
                let grant = self
                    .flow
                    .bounded(
                        cancel,
                        self.flow.exchange_long_lived(&app.client_secret, access_token),
                    )
                    .await?;
                let expires_at = grant.expires_at(Utc::now());
                (grant.access_token, expires_at)
            }
            None => (access_token.to_string(), None),
        };
        let identity = self
            .flow
            .bounded(cancel, self.flow.fetch_identity(&token))
            .await?;

        let mut record = CredentialRecord::new(&name, token)
            .with_identity(identity.id, identity.username)
            .with_expires_at(expires_at);
        if let Some(app) = app {
            record = record.with_app_credentials(app.client_id, app.client_secret);
        }
        self.store.set(&name, record)?;
        debug!(account = %name, "stored ingested token");
        self.store.get(&name)
    }

    /// Extend the stored token in place. Identity and app credentials are kept.
    pub async fn refresh(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<CredentialRecord, AuthError> {
        let mut record = self.store.get(name)?;
        if expiry::is_expired(&record, Utc::now()) {
            return Err(AuthError::Expired {
                account: record.name,
            });
        }
        let grant = self
            .flow
            .bounded(cancel, self.flow.refresh(&record.access_token))
            .await?;
        let expires_at = grant.expires_at(Utc::now());
        record.apply_refresh(grant.access_token, expires_at);
        let account = record.name.clone();
        self.store.set(&account, record)?;
        info!(account = %account, "token refreshed");
        self.store.get(&account)
    }

    /// Load the token for `name` for use in an API call.
    ///
    /// Expired tokens are rejected. Tokens inside the warning window are
    /// refreshed when auto-refresh is on, otherwise flagged once per run.
    pub async fn access_token(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<ActiveToken, AuthError> {
        let record = self.store.get(name)?;
        let now = Utc::now();
        if expiry::is_expired(&record, now) {
            return Err(AuthError::Expired {
                account: record.name,
            });
        }
        if self.auto_refresh && expiry::is_expiring_soon(&record, now, self.expiry_window) {
            let record = self.refresh(&record.name, cancel).await?;
            return Ok(ActiveToken {
                record,
                refreshed: true,
                expiring_soon: false,
            });
        }
        let expiring_soon = self.store.warn_if_expiring(&record, now, self.expiry_window);
        Ok(ActiveToken {
            record,
            refreshed: false,
            expiring_soon,
        })
    }

    /// Pick the account a command acts on: the explicit choice, then the
    /// configured default, then the only stored account.
    pub fn resolve_account_name(
        &self,
        explicit: Option<&str>,
        configured_default: Option<&str>,
    ) -> Result<String, AuthError> {
        let chosen = [explicit, configured_default]
            .into_iter()
            .flatten()
            .map(normalize_name)
            .find(|name| !name.is_empty());
        if let Some(name) = chosen {
            return Ok(name);
        }

        let mut accounts = self.store.list()?;
        match accounts.len() {
            0 => Err(AuthError::not_found("default")),
            1 => Ok(accounts.remove(0)),
            _ => {
                accounts.sort();
                Err(AuthError::InvalidInput(format!(
                    "several accounts are stored ({}); pass --account or run `threads auth switch`",
                    accounts.join(", ")
                )))
            }
        }
    }

    /// Account names, sorted.
    pub fn list(&self) -> Result<Vec<String>, AuthError> {
        let mut names = self.store.list()?;
        names.sort();
        Ok(names)
    }

    pub fn summary(&self, name: &str) -> Result<CredentialSummary, AuthError> {
        Ok(self.store.get(name)?.summary(Utc::now(), self.expiry_window))
    }

    /// Summaries of every stored account, sorted by name.
    pub fn status(&self) -> Result<Vec<CredentialSummary>, AuthError> {
        let now = Utc::now();
        self.list()?
            .iter()
            .map(|name| Ok(self.store.get(name)?.summary(now, self.expiry_window)))
            .collect()
    }

    pub fn remove(&self, name: &str) -> Result<(), AuthError> {
        self.store.delete(name)?;
        info!(account = %normalize_name(name), "credentials removed");
        Ok(())
    }
}

fn require_name(name: &str) -> Result<String, AuthError> {
    let name = normalize_name(name);
    if name.is_empty() {
        return Err(AuthError::InvalidInput(
            "account name must not be empty".to_string(),
        ));
    }
    Ok(name)
}
