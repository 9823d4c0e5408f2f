mod auth_support;

use std::sync::Arc;

use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use threads_cli::auth::backend::MemoryBackend;
use threads_cli::auth::oauth::browser::ManualBrowser;
use threads_cli::auth::{AppCredentials, AuthError, AuthService, CredentialRecord, SecretStore};
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

use auth_support::{
    flow_for, free_port, login_request, mount_happy_path, mount_identity, mount_long_lived,
    mount_refresh, CallbackScript, ScriptedBrowser,
};

fn service(server: &MockServer, browser: Arc<dyn threads_cli::auth::oauth::browser::BrowserLauncher>) -> AuthService {
    let store = Arc::new(SecretStore::new(Arc::new(MemoryBackend::new())));
    AuthService::new(store, flow_for(server, browser))
}

#[tokio::test]
async fn login_persists_the_full_record() {
    let server = MockServer::start().await;
    mount_happy_path(&server, 1).await;
    let port = free_port();
    let svc = service(
        &server,
        ScriptedBrowser::new(CallbackScript::Approve {
            code: "abc".to_string(),
        }),
    );

    let record = svc
        .login("Work", &login_request(port), &CancellationToken::new())
        .await
        .expect("login succeeds");

    assert_eq!(record.name, "work");
    assert_eq!(record.access_token, "long1");
    assert_eq!(record.user_id, "u1");
    assert_eq!(record.username, "alice");
    assert_eq!(record.client_id, "c1");
    assert_eq!(record.client_secret, "s1");
    assert_eq!(record.redirect_uri, format!("http://127.0.0.1:{port}/callback"));
    assert!(record.created_at.is_some());
    assert!(record.expires_at.is_some());
    assert_eq!(svc.list().unwrap(), vec!["work".to_string()]);
}

#[tokio::test]
async fn failed_login_writes_nothing() {
    let server = MockServer::start().await;
    mount_happy_path(&server, 0).await;
    let svc = service(
        &server,
        ScriptedBrowser::new(CallbackScript::ForgedState {
            code: "abc".to_string(),
        }),
    );

    let result = svc
        .login("work", &login_request(free_port()), &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(AuthError::StateMismatch)));
    assert!(svc.list().unwrap().is_empty());
}

#[tokio::test]
async fn refresh_replaces_token_and_keeps_identity() {
    let server = MockServer::start().await;
    mount_refresh(&server, "long1", "long2", 5_184_000).await;
    let svc = service(&server, Arc::new(ManualBrowser));

    let original = CredentialRecord::new("work", "long1")
        .with_identity("u1", "alice")
        .with_app_credentials("c1", "s1")
        .with_expires_at(Some(Utc::now() + Duration::days(3)));
    svc.store().set("work", original.clone()).unwrap();
    let created_at = svc.store().get("work").unwrap().created_at;

    let refreshed = svc.refresh("WORK", &CancellationToken::new()).await.expect("refresh succeeds");

    assert_eq!(refreshed.access_token, "long2");
    assert_eq!(refreshed.user_id, "u1");
    assert_eq!(refreshed.username, "alice");
    assert_eq!(refreshed.client_secret, "s1");
    assert_eq!(refreshed.created_at, created_at);
    assert!(refreshed.expires_at > original.expires_at);
}

#[tokio::test]
async fn access_token_auto_refreshes_inside_the_window() {
    let server = MockServer::start().await;
    mount_refresh(&server, "long1", "long2", 5_184_000).await;
    let svc = service(&server, Arc::new(ManualBrowser)).with_auto_refresh(true);
    svc.store()
        .set(
            "work",
            CredentialRecord::new("work", "long1")
                .with_expires_at(Some(Utc::now() + Duration::days(1))),
        )
        .unwrap();

    let active = svc.access_token("work", &CancellationToken::new()).await.expect("token available");

    assert!(active.refreshed);
    assert_eq!(active.record.access_token, "long2");
    assert_eq!(svc.store().get("work").unwrap().access_token, "long2");
}

#[tokio::test]
async fn ingest_without_app_credentials_keeps_unknown_expiry() {
    let server = MockServer::start().await;
    mount_identity(&server, "pasted", "u9", "bob", 1).await;
    let svc = service(&server, Arc::new(ManualBrowser));

    let record = svc
        .ingest_token("home", " pasted ", None, &CancellationToken::new())
        .await
        .expect("token stored");

    assert_eq!(record.access_token, "pasted");
    assert_eq!(record.username, "bob");
    assert_eq!(record.expires_at, None);
    assert!(record.client_id.is_empty());
}

#[tokio::test]
async fn ingest_with_app_credentials_upgrades_to_long_lived() {
    let server = MockServer::start().await;
    mount_long_lived(&server, "short1", "long1", 5_184_000, 1).await;
    mount_identity(&server, "long1", "u1", "alice", 1).await;
    let svc = service(&server, Arc::new(ManualBrowser));

    let record = svc
        .ingest_token(
            "work",
            "short1",
            Some(AppCredentials {
                client_id: "c1".to_string(),
                client_secret: "s1".to_string(),
            }),
            &CancellationToken::new(),
        )
        .await
        .expect("token stored");

    assert_eq!(record.access_token, "long1");
    assert_eq!(record.client_id, "c1");
    assert!(record.expires_at.is_some());
}

#[tokio::test]
async fn ingest_of_rejected_token_stores_nothing() {
    let server = MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::path("/v1.0/me"))
        .respond_with(wiremock::ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "error": {"message": "Invalid OAuth access token.", "type": "OAuthException"}
        })))
        .mount(&server)
        .await;
    let svc = service(&server, Arc::new(ManualBrowser));

    let result = svc
        .ingest_token("work", "garbage", None, &CancellationToken::new())
        .await;

    assert!(matches!(result, Err(AuthError::Api { status: 400, .. })));
    assert!(svc.list().unwrap().is_empty());
}

#[tokio::test]
async fn cancelled_refresh_leaves_the_record_untouched() {
    let server = MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::path("/refresh_access_token"))
        .respond_with(
            wiremock::ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({
                    "access_token": "long2",
                    "expires_in": 5_184_000
                }))
                .set_delay(std::time::Duration::from_secs(10)),
        )
        .mount(&server)
        .await;
    let svc = service(&server, Arc::new(ManualBrowser));
    svc.store()
        .set(
            "work",
            CredentialRecord::new("work", "long1")
                .with_expires_at(Some(Utc::now() + Duration::days(3))),
        )
        .unwrap();

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let result = tokio::time::timeout(
        std::time::Duration::from_secs(3),
        svc.refresh("work", &cancel),
    )
    .await
    .expect("refresh returns promptly once cancelled");

    assert!(matches!(result, Err(AuthError::Cancelled)));
    assert_eq!(svc.store().get("work").unwrap().access_token, "long1");
}
