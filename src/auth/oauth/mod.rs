//! Loopback OAuth2 authorization-code flow against the Threads Graph API.
//!
//! [`OAuthFlow::start`] runs one complete login: it binds the callback
//! listener, hands the authorize URL to the browser, waits for exactly one
//! callback, then performs the code exchange, the long-lived upgrade and the
//! identity lookup in sequence. Nothing is persisted here.

pub mod browser;
pub mod callback;
pub mod endpoints;
pub mod state;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bon::Builder;
use chrono::{DateTime, Utc};
use reqwest::Response;
use serde::Deserialize;
use strum::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::error::AuthError;
use super::record::mask_token;
use browser::{BrowserLauncher, SystemBrowser};
use callback::{loopback_redirect, CallbackListener};
use endpoints::ProviderEndpoints;
use state::AuthorizationState;

pub const DEFAULT_CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(30);

/// Parameters for one login attempt.
#[derive(Clone, Builder)]
pub struct AuthorizationRequest {
    #[builder(into)]
    pub client_id: String,
    #[builder(into)]
    pub client_secret: String,
    #[builder(into)]
    pub redirect_uri: String,
    pub scopes: Vec<String>,
}

impl std::fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("redirect_uri", &self.redirect_uri)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl AuthorizationRequest {
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.client_id.trim().is_empty() {
            return Err(AuthError::Configuration("client id is required".to_string()));
        }
        if self.client_secret.trim().is_empty() {
            return Err(AuthError::Configuration(
                "client secret is required".to_string(),
            ));
        }
        if self.scopes.iter().all(|scope| scope.trim().is_empty()) {
            return Err(AuthError::Configuration(
                "at least one scope is required".to_string(),
            ));
        }
        loopback_redirect(&self.redirect_uri).map(|_| ())
    }
}

/// Stages a login moves through. `Done`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "kebab-case")]
pub enum FlowPhase {
    Idle,
    AwaitingCallback,
    Validating,
    Exchanging,
    FetchingIdentity,
    Done,
    Failed,
    Cancelled,
}

impl FlowPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }
}

/// Progress notifications for the caller's UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEvent {
    /// The authorize URL, always reported so it can be opened by hand.
    AuthorizeUrl { url: String, browser_opened: bool },
    Phase(FlowPhase),
}

pub type EventSink = Arc<dyn Fn(&FlowEvent) + Send + Sync>;

/// Outcome of a successful login.
#[derive(Clone, PartialEq, Eq)]
pub struct FlowResult {
    pub access_token: String,
    pub user_id: String,
    pub username: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for FlowResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlowResult")
            .field("access_token", &mask_token(&self.access_token))
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token returned by the code exchange, the long-lived upgrade or a refresh.
#[derive(Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default, deserialize_with = "lenient_id")]
    pub user_id: Option<String>,
}

impl TokenGrant {
    /// Absolute expiry, or `None` when the provider did not declare one.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.expires_in
            .filter(|secs| *secs > 0)
            .map(|secs| now + chrono::Duration::seconds(secs))
    }
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenGrant")
            .field("access_token", &mask_token(&self.access_token))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// Authenticated user as reported by `/me`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Identity {
    pub id: String,
    #[serde(default)]
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct GraphErrorEnvelope {
    error: GraphError,
}

#[derive(Debug, Deserialize)]
struct GraphError {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

/// Orchestrates the loopback login and the server-to-server token calls.
#[derive(Clone)]
pub struct OAuthFlow {
    client: reqwest::Client,
    endpoints: ProviderEndpoints,
    browser: Arc<dyn BrowserLauncher>,
    callback_timeout: Duration,
    step_timeout: Duration,
    events: Option<EventSink>,
}

impl OAuthFlow {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            endpoints: ProviderEndpoints::default(),
            browser: Arc::new(SystemBrowser),
            callback_timeout: DEFAULT_CALLBACK_TIMEOUT,
            step_timeout: DEFAULT_STEP_TIMEOUT,
            events: None,
        }
    }

    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_browser(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }

    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = timeout;
        self
    }

    pub fn with_event_sink(mut self, sink: EventSink) -> Self {
        self.events = Some(sink);
        self
    }

    /// Run one full login. Cancelling `cancel` aborts whichever step is in
    /// progress; the callback port is released before this returns.
    pub async fn start(
        &self,
        request: &AuthorizationRequest,
        cancel: &CancellationToken,
    ) -> Result<FlowResult, AuthError> {
        self.emit(FlowEvent::Phase(FlowPhase::Idle));
        let outcome = self.run(request, cancel).await;
        let terminal = match &outcome {
            Ok(_) => FlowPhase::Done,
            Err(AuthError::Cancelled | AuthError::TimedOut(_)) => FlowPhase::Cancelled,
            Err(_) => FlowPhase::Failed,
        };
        debug!(phase = %terminal, "login finished");
        self.emit(FlowEvent::Phase(terminal));
        outcome
    }

    async fn run(
        &self,
        request: &AuthorizationRequest,
        cancel: &CancellationToken,
    ) -> Result<FlowResult, AuthError> {
        request.validate()?;
        let state = AuthorizationState::generate();
        let scopes: Vec<String> = request
            .scopes
            .iter()
            .map(|scope| scope.trim().to_string())
            .filter(|scope| !scope.is_empty())
            .collect();
        let url = self.endpoints.authorization_url(
            &request.client_id,
            &request.redirect_uri,
            &scopes,
            state.as_str(),
        )?;

        // Bind first so a fast redirect cannot beat the listener.
        let listener = CallbackListener::bind(&request.redirect_uri).await?;

        let browser_opened = match self.browser.open(&url) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "could not open browser; open the URL manually");
                false
            }
        };
        self.emit(FlowEvent::AuthorizeUrl {
            url: url.to_string(),
            browser_opened,
        });

        self.emit(FlowEvent::Phase(FlowPhase::AwaitingCallback));
        let code = listener
            .wait(&state, self.callback_timeout, cancel)
            .await?;
        self.emit(FlowEvent::Phase(FlowPhase::Validating));

        self.emit(FlowEvent::Phase(FlowPhase::Exchanging));
        let short = self
            .bounded(cancel, self.exchange_code(request, &code))
            .await?;
        let long = self
            .bounded(
                cancel,
                self.exchange_long_lived(&request.client_secret, &short.access_token),
            )
            .await?;
        let expires_at = long.expires_at(Utc::now());

        self.emit(FlowEvent::Phase(FlowPhase::FetchingIdentity));
        let identity = self
            .bounded(cancel, self.fetch_identity(&long.access_token))
            .await?;

        Ok(FlowResult {
            access_token: long.access_token,
            user_id: identity.id,
            username: identity.username,
            expires_at,
        })
    }

    /// Trade an authorization code for a short-lived token.
    pub async fn exchange_code(
        &self,
        request: &AuthorizationRequest,
        code: &str,
    ) -> Result<TokenGrant, AuthError> {
        debug!(url = %self.endpoints.token_url(), "exchanging authorization code");
        let resp = self
            .client
            .post(self.endpoints.token_url())
            .header("Accept", "application/json")
            .form(&[
                ("client_id", request.client_id.as_str()),
                ("client_secret", request.client_secret.as_str()),
                ("grant_type", "authorization_code"),
                ("redirect_uri", request.redirect_uri.as_str()),
                ("code", code),
            ])
            .send()
            .await?;
        parse_grant(resp, "authorization code exchange").await
    }

    /// Upgrade a short-lived token to a long-lived one (about 60 days).
    pub async fn exchange_long_lived(
        &self,
        client_secret: &str,
        short_lived_token: &str,
    ) -> Result<TokenGrant, AuthError> {
        debug!(token = %mask_token(short_lived_token), "requesting long-lived token");
        let resp = self
            .client
            .get(self.endpoints.long_lived_url())
            .query(&[
                ("grant_type", "th_exchange_token"),
                ("client_secret", client_secret),
                ("access_token", short_lived_token),
            ])
            .send()
            .await?;
        parse_grant(resp, "long-lived token exchange").await
    }

    /// Extend a long-lived token that has not yet expired.
    pub async fn refresh(&self, access_token: &str) -> Result<TokenGrant, AuthError> {
        debug!(token = %mask_token(access_token), "refreshing long-lived token");
        let resp = self
            .client
            .get(self.endpoints.refresh_url())
            .query(&[
                ("grant_type", "th_refresh_token"),
                ("access_token", access_token),
            ])
            .send()
            .await?;
        parse_grant(resp, "token refresh").await
    }

    pub async fn fetch_identity(&self, access_token: &str) -> Result<Identity, AuthError> {
        let resp = self
            .client
            .get(self.endpoints.me_url())
            .query(&[("fields", "id,username"), ("access_token", access_token)])
            .send()
            .await?;
        let resp = check_status(resp, "identity lookup").await?;
        let identity: Identity = resp.json().await?;
        if identity.id.trim().is_empty() {
            return Err(AuthError::InvalidResponse(
                "identity lookup returned an empty user id".to_string(),
            ));
        }
        Ok(identity)
    }

    /// Run one outbound step under the per-step timeout and the caller's
    /// cancellation token.
    pub(crate) async fn bounded<T>(
        &self,
        cancel: &CancellationToken,
        step: impl Future<Output = Result<T, AuthError>>,
    ) -> Result<T, AuthError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
            result = tokio::time::timeout(self.step_timeout, step) => match result {
                Ok(inner) => inner,
                Err(_) => Err(AuthError::Network(format!(
                    "request timed out after {}s",
                    self.step_timeout.as_secs()
                ))),
            },
        }
    }

    fn emit(&self, event: FlowEvent) {
        if let Some(sink) = &self.events {
            sink(&event);
        }
    }
}

async fn parse_grant(resp: Response, what: &str) -> Result<TokenGrant, AuthError> {
    let resp = check_status(resp, what).await?;
    let grant: TokenGrant = resp.json().await?;
    if grant.access_token.trim().is_empty() {
        return Err(AuthError::InvalidResponse(format!(
            "{what} returned an empty access token"
        )));
    }
    Ok(grant)
}

async fn check_status(resp: Response, what: &str) -> Result<Response, AuthError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<GraphErrorEnvelope>(&body) {
        Ok(envelope) => match envelope.error.kind {
            Some(kind) => format!("{what} failed: {} ({kind})", envelope.error.message),
            None => format!("{what} failed: {}", envelope.error.message),
        },
        Err(_) if body.trim().is_empty() => format!("{what} failed"),
        Err(_) => format!("{what} failed: {}", truncate(body.trim(), 200)),
    };
    Err(AuthError::Api {
        status: status.as_u16(),
        message,
    })
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Graph responses carry ids as either strings or numbers.
fn lenient_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::String(id)) => Some(id),
        Some(serde_json::Value::Number(id)) => Some(id.to_string()),
        _ => None,
    })
}
