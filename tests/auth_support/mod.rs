#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;
use threads_cli::auth::oauth::browser::BrowserLauncher;
use threads_cli::auth::oauth::endpoints::ProviderEndpoints;
use threads_cli::auth::oauth::{AuthorizationRequest, FlowEvent, OAuthFlow};
use tokio::task::JoinHandle;
use url::Url;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// What the scripted "user" does once the authorize URL is opened.
#[derive(Debug, Clone)]
pub enum CallbackScript {
    /// Approve: redirect with `code` and the state from the authorize URL.
    Approve { code: String },
    /// Redirect with a state that was never issued.
    ForgedState { code: String },
    /// Provider-side denial with the genuine state.
    Deny { error: String, description: String },
    /// Hit an unrelated path first, then approve.
    StrayThenApprove { code: String },
    /// Never come back.
    Abandon,
}

/// Browser stand-in that performs the redirect itself with reqwest.
pub struct ScriptedBrowser {
    script: CallbackScript,
    opened: Mutex<Vec<Url>>,
    callback: Mutex<Option<JoinHandle<Option<u16>>>>,
}

impl ScriptedBrowser {
    pub fn new(script: CallbackScript) -> Arc<Self> {
        Arc::new(Self {
            script,
            opened: Mutex::new(Vec::new()),
            callback: Mutex::new(None),
        })
    }

    pub fn opened(&self) -> Vec<Url> {
        self.opened.lock().expect("opened lock").clone()
    }

    /// Status the loopback listener answered the callback with.
    pub async fn callback_status(&self) -> Option<u16> {
        let handle = self.callback.lock().expect("callback lock").take()?;
        handle.await.expect("callback task panicked")
    }
}

impl BrowserLauncher for ScriptedBrowser {
    fn open(&self, url: &Url) -> std::io::Result<()> {
        self.opened.lock().expect("opened lock").push(url.clone());
        let param = |name: &str| {
            url.query_pairs()
                .find(|(key, _)| key == name)
                .map(|(_, value)| value.into_owned())
                .unwrap_or_default()
        };
        let state = param("state");
        let redirect = param("redirect_uri");

        let (stray, query): (bool, Option<Vec<(&str, String)>>) = match &self.script {
            CallbackScript::Approve { code } => {
                (false, Some(vec![("code", code.clone()), ("state", state)]))
            }
            CallbackScript::StrayThenApprove { code } => {
                (true, Some(vec![("code", code.clone()), ("state", state)]))
            }
            CallbackScript::ForgedState { code } => (
                false,
                Some(vec![("code", code.clone()), ("state", "wrong".to_string())]),
            ),
            CallbackScript::Deny { error, description } => (
                false,
                Some(vec![
                    ("error", error.clone()),
                    ("error_description", description.clone()),
                    ("state", state),
                ]),
            ),
            CallbackScript::Abandon => (false, None),
        };
        let Some(query) = query else {
            return Ok(());
        };
        let query: Vec<(String, String)> = query
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();

        let handle = tokio::spawn(async move {
            let client = reqwest::Client::new();
            if stray {
                let origin = Url::parse(&redirect).ok()?.join("/favicon.ico").ok()?;
                let status = client.get(origin).send().await.ok()?.status();
                assert_eq!(status.as_u16(), 404);
            }
            let resp = client.get(&redirect).query(&query).send().await.ok()?;
            Some(resp.status().as_u16())
        });
        *self.callback.lock().expect("callback lock") = Some(handle);
        Ok(())
    }
}

/// A loopback port that was free a moment ago.
pub fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral port");
    listener.local_addr().expect("local addr").port()
}

/// Whether the port can be bound right now.
pub fn port_is_free(port: u16) -> bool {
    std::net::TcpListener::bind(("127.0.0.1", port)).is_ok()
}

pub fn redirect_uri(port: u16) -> String {
    format!("http://127.0.0.1:{port}/callback")
}

pub fn login_request(port: u16) -> AuthorizationRequest {
    AuthorizationRequest::builder()
        .client_id("c1")
        .client_secret("s1")
        .redirect_uri(redirect_uri(port))
        .scopes(vec!["basic".to_string()])
        .build()
}

pub fn flow_for(server: &MockServer, browser: Arc<dyn BrowserLauncher>) -> OAuthFlow {
    OAuthFlow::new(reqwest::Client::new())
        .with_endpoints(
            ProviderEndpoints::default()
                .with_authorize_url("https://threads.test/oauth/authorize")
                .with_graph_url(server.uri()),
        )
        .with_browser(browser)
        .with_callback_timeout(Duration::from_secs(10))
        .with_step_timeout(Duration::from_secs(5))
}

/// Event sink that records everything it is given.
pub fn recording_sink() -> (Arc<Mutex<Vec<FlowEvent>>>, Arc<dyn Fn(&FlowEvent) + Send + Sync>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink_events = events.clone();
    let sink = Arc::new(move |event: &FlowEvent| {
        sink_events.lock().expect("events lock").push(event.clone());
    });
    (events, sink)
}

/// Code exchange answering `short`, expected `times` times.
pub async fn mount_code_exchange(server: &MockServer, code: &str, short: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path("/oauth/access_token"))
        .and(body_string_contains(format!("code={code}")))
        .and(body_string_contains("client_id=c1"))
        .and(body_string_contains("client_secret=s1"))
        .and(body_string_contains("grant_type=authorization_code"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": short,
            "user_id": 17841400000000000u64
        })))
        .expect(times)
        .mount(server)
        .await;
}

/// Long-lived exchange for `short`, answering `long` valid for `expires_in` seconds.
pub async fn mount_long_lived(
    server: &MockServer,
    short: &str,
    long: &str,
    expires_in: i64,
    times: u64,
) {
    Mock::given(method("GET"))
        .and(path("/access_token"))
        .and(query_param("grant_type", "th_exchange_token"))
        .and(query_param("client_secret", "s1"))
        .and(query_param("access_token", short))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": long,
            "token_type": "bearer",
            "expires_in": expires_in
        })))
        .expect(times)
        .mount(server)
        .await;
}

pub async fn mount_identity(server: &MockServer, token: &str, id: &str, username: &str, times: u64) {
    Mock::given(method("GET"))
        .and(path("/v1.0/me"))
        .and(query_param("access_token", token))
        .and(query_param("fields", "id,username"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": id,
            "username": username
        })))
        .expect(times)
        .mount(server)
        .await;
}

pub async fn mount_refresh(server: &MockServer, current: &str, next: &str, expires_in: i64) {
    Mock::given(method("GET"))
        .and(path("/refresh_access_token"))
        .and(query_param("grant_type", "th_refresh_token"))
        .and(query_param("access_token", current))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": next,
            "token_type": "bearer",
            "expires_in": expires_in
        })))
        .expect(1)
        .mount(server)
        .await;
}

/// All three exchange mocks for the standard happy path, each expected `times` times.
pub async fn mount_happy_path(server: &MockServer, times: u64) {
    mount_code_exchange(server, "abc", "short1", times).await;
    mount_long_lived(server, "short1", "long1", 5_184_000, times).await;
    mount_identity(server, "long1", "u1", "alice", times).await;
}
