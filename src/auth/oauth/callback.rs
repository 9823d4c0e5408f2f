//! One-shot loopback listener that receives the provider's redirect.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use super::state::AuthorizationState;
use crate::auth::error::AuthError;

const SUCCESS_HTML: &str = "<!doctype html><html><head><title>threads-cli</title></head>\
<body><h1>Login complete</h1><p>You can close this window and return to the terminal.</p></body></html>";
const FAILURE_HTML: &str = "<!doctype html><html><head><title>threads-cli</title></head>\
<body><h1>Login failed</h1><p>Return to the terminal for details.</p></body></html>";
const NOT_FOUND_HTML: &str = "<!doctype html><html><body><h1>Not found</h1></body></html>";

const MAX_REQUEST_BYTES: usize = 8192;
/// How long a connection may stay silent before it is dropped.
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Query parameters carried by the redirect.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

/// Check that `redirect_uri` points at this machine with an explicit port and
/// return the parsed URL together with the socket addresses to bind.
///
/// `localhost` yields both loopback families since browsers may resolve it to
/// either one.
pub fn loopback_redirect(redirect_uri: &str) -> Result<(Url, Vec<SocketAddr>), AuthError> {
    let url = Url::parse(redirect_uri).map_err(|e| {
        AuthError::Configuration(format!("invalid redirect URI '{redirect_uri}': {e}"))
    })?;
    if url.scheme() != "http" {
        return Err(AuthError::Configuration(format!(
            "redirect URI must use http on the loopback interface, got '{redirect_uri}'"
        )));
    }
    let dual_stack = match url.host_str() {
        Some("127.0.0.1") => false,
        Some("localhost") => true,
        _ => {
            return Err(AuthError::Configuration(format!(
                "redirect URI host must be 127.0.0.1 or localhost, got '{redirect_uri}'"
            )))
        }
    };
    let port = url.port().ok_or_else(|| {
        AuthError::Configuration(format!(
            "redirect URI must include an explicit port, got '{redirect_uri}'"
        ))
    })?;
    let mut addrs = vec![SocketAddr::from((Ipv4Addr::LOCALHOST, port))];
    if dual_stack {
        addrs.push(SocketAddr::from((Ipv6Addr::LOCALHOST, port)));
    }
    Ok((url, addrs))
}

/// Bound listener for a single authorization attempt.
///
/// Dropping it closes the socket, so the port is released on every exit path.
#[derive(Debug)]
pub struct CallbackListener {
    listeners: Vec<TcpListener>,
    path: String,
}

impl CallbackListener {
    /// Bind every address the redirect resolves to. Succeeds when at least
    /// one of them could be bound.
    pub async fn bind(redirect_uri: &str) -> Result<Self, AuthError> {
        let (url, addrs) = loopback_redirect(redirect_uri)?;
        let mut listeners = Vec::with_capacity(addrs.len());
        let mut bind_errors = Vec::new();
        for addr in &addrs {
            match TcpListener::bind(addr).await {
                Ok(listener) => {
                    debug!(%addr, path = url.path(), "callback listener bound");
                    listeners.push(listener);
                }
                Err(err) => bind_errors.push(format!("{addr} ({err})")),
            }
        }
        if listeners.is_empty() {
            let addr = addrs
                .first()
                .map(ToString::to_string)
                .unwrap_or_default();
            return Err(AuthError::ListenerBind {
                addr,
                reason: bind_errors.join("; "),
            });
        }
        Ok(Self {
            listeners,
            path: url.path().to_string(),
        })
    }

    async fn accept(&self) -> io::Result<(TcpStream, SocketAddr)> {
        match self.listeners.as_slice() {
            [v4, v6] => tokio::select! {
                accepted = v4.accept() => accepted,
                accepted = v6.accept() => accepted,
            },
            [only] => only.accept().await,
            _ => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "callback listener has no bound socket",
            )),
        }
    }

    /// Wait for the redirect and return the authorization code.
    ///
    /// Requests for any other path get a 404 and waiting continues. The
    /// first request on the callback path settles the attempt: the state is
    /// checked before a code or provider error is looked at, and the browser
    /// gets the page matching the outcome.
    pub async fn wait(
        self,
        expected: &AuthorizationState,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<String, AuthError> {
        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);

        loop {
            let (mut socket, peer) = tokio::select! {
                _ = cancel.cancelled() => return Err(AuthError::Cancelled),
                _ = &mut deadline => return Err(AuthError::TimedOut(timeout)),
                accepted = self.accept() => accepted?,
            };

            // A connection that never sends anything must not hold up
            // cancellation or the deadline.
            let target = tokio::select! {
                _ = cancel.cancelled() => return Err(AuthError::Cancelled),
                _ = &mut deadline => return Err(AuthError::TimedOut(timeout)),
                read = tokio::time::timeout(REQUEST_READ_TIMEOUT, read_request_target(&mut socket)) => {
                    match read {
                        Ok(Ok(target)) => target,
                        Ok(Err(err)) => {
                            debug!(%peer, error = %err, "ignoring malformed callback request");
                            continue;
                        }
                        Err(_) => {
                            debug!(%peer, "dropping idle connection");
                            continue;
                        }
                    }
                }
            };
            let Some((path, params)) = parse_callback_target(&target) else {
                respond(&mut socket, "400 Bad Request", FAILURE_HTML).await;
                continue;
            };
            if path != self.path {
                debug!(%peer, path, "request outside callback path");
                respond(&mut socket, "404 Not Found", NOT_FOUND_HTML).await;
                continue;
            }

            let outcome = settle(&params, expected);
            match &outcome {
                Ok(_) => respond(&mut socket, "200 OK", SUCCESS_HTML).await,
                Err(err) => {
                    warn!(error = %err, "OAuth callback rejected");
                    respond(&mut socket, "400 Bad Request", FAILURE_HTML).await;
                }
            }
            return outcome;
        }
    }
}

fn settle(params: &CallbackParams, expected: &AuthorizationState) -> Result<String, AuthError> {
    let state_ok = params
        .state
        .as_deref()
        .is_some_and(|state| expected.matches(state));
    if !state_ok {
        return Err(AuthError::StateMismatch);
    }
    if let Some(error) = &params.error {
        return Err(AuthError::ProviderDenied {
            error: error.clone(),
            description: params.error_description.clone(),
        });
    }
    match params.code.as_deref().map(str::trim) {
        Some(code) if !code.is_empty() => Ok(code.to_string()),
        _ => Err(AuthError::InvalidResponse(
            "callback carried neither a code nor an error".to_string(),
        )),
    }
}

async fn read_request_target(socket: &mut TcpStream) -> Result<String, AuthError> {
    let mut buffer = vec![0u8; MAX_REQUEST_BYTES];
    let mut filled = 0;
    // The request line is all we need; stop at the end of the headers.
    loop {
        let read = socket.read(&mut buffer[filled..]).await?;
        if read == 0 {
            break;
        }
        filled += read;
        if buffer[..filled].windows(4).any(|w| w == b"\r\n\r\n") || filled == buffer.len() {
            break;
        }
    }
    let request = String::from_utf8_lossy(&buffer[..filled]);
    let line = request
        .lines()
        .next()
        .ok_or_else(|| AuthError::InvalidInput("empty callback request".to_string()))?;
    let mut parts = line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some("GET"), Some(target)) => Ok(target.to_string()),
        _ => Err(AuthError::InvalidInput(format!(
            "unexpected callback request line '{line}'"
        ))),
    }
}

/// Split a request target such as `/callback?code=..&state=..` into its path
/// and callback parameters.
pub fn parse_callback_target(target: &str) -> Option<(String, CallbackParams)> {
    let url = Url::parse("http://127.0.0.1").ok()?.join(target).ok()?;
    let mut params = CallbackParams::default();
    for (key, value) in url.query_pairs() {
        let slot = match key.as_ref() {
            "code" => &mut params.code,
            "state" => &mut params.state,
            "error" => &mut params.error,
            "error_description" => &mut params.error_description,
            _ => continue,
        };
        *slot = Some(value.into_owned());
    }
    Some((url.path().to_string(), params))
}

async fn respond(socket: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_code_and_state() {
        let (path, params) = parse_callback_target("/callback?code=abc&state=xyz").unwrap();
        assert_eq!(path, "/callback");
        assert_eq!(
            params,
            CallbackParams {
                code: Some("abc".to_string()),
                state: Some("xyz".to_string()),
                ..CallbackParams::default()
            }
        );
    }

    #[test]
    fn parses_provider_error_with_encoded_description() {
        let (_, params) = parse_callback_target(
            "/callback?error=access_denied&error_description=User+said+no&state=s",
        )
        .unwrap();
        assert_eq!(params.error.as_deref(), Some("access_denied"));
        assert_eq!(params.error_description.as_deref(), Some("User said no"));
        assert_eq!(params.code, None);
    }

    #[test]
    fn redirect_must_be_loopback_with_port() {
        let (_, addrs) = loopback_redirect("http://127.0.0.1:8585/callback").unwrap();
        assert_eq!(addrs, vec![SocketAddr::from((Ipv4Addr::LOCALHOST, 8585))]);

        let (_, addrs) = loopback_redirect("http://localhost:8585/callback").unwrap();
        assert_eq!(
            addrs,
            vec![
                SocketAddr::from((Ipv4Addr::LOCALHOST, 8585)),
                SocketAddr::from((Ipv6Addr::LOCALHOST, 8585)),
            ]
        );

        for bad in [
            "http://example.com:8585/callback",
            "https://127.0.0.1:8585/callback",
            "http://127.0.0.1/callback",
            "not a url",
        ] {
            assert!(
                matches!(loopback_redirect(bad), Err(AuthError::Configuration(_))),
                "{bad} should be rejected"
            );
        }
    }

    #[test]
    fn state_is_checked_before_anything_else() {
        let expected = AuthorizationState::from_value("good");
        let forged = CallbackParams {
            code: Some("c".to_string()),
            state: Some("bad".to_string()),
            ..CallbackParams::default()
        };
        assert!(matches!(settle(&forged, &expected), Err(AuthError::StateMismatch)));

        let missing = CallbackParams {
            error: Some("access_denied".to_string()),
            ..CallbackParams::default()
        };
        assert!(matches!(settle(&missing, &expected), Err(AuthError::StateMismatch)));

        let denied = CallbackParams {
            error: Some("access_denied".to_string()),
            state: Some("good".to_string()),
            ..CallbackParams::default()
        };
        assert!(matches!(
            settle(&denied, &expected),
            Err(AuthError::ProviderDenied { ref error, .. }) if error == "access_denied"
        ));

        let empty = CallbackParams {
            state: Some("good".to_string()),
            ..CallbackParams::default()
        };
        assert!(matches!(settle(&empty, &expected), Err(AuthError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn wait_honours_cancellation_and_timeout() {
        let state = AuthorizationState::generate();

        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);
        let redirect = format!("http://127.0.0.1:{port}/callback");

        let listener = CallbackListener::bind(&redirect).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = listener.wait(&state, Duration::from_secs(30), &cancel).await;
        assert!(matches!(result, Err(AuthError::Cancelled)));

        let listener = CallbackListener::bind(&redirect).await.unwrap();
        let result = listener
            .wait(&state, Duration::from_millis(50), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AuthError::TimedOut(_))));

        // Port is free again once wait returns.
        CallbackListener::bind(&redirect).await.unwrap();
    }

    #[tokio::test]
    async fn silent_connection_does_not_hold_up_the_deadline() {
        let state = AuthorizationState::generate();
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);
        let redirect = format!("http://127.0.0.1:{port}/callback");

        let listener = CallbackListener::bind(&redirect).await.unwrap();
        let _idle = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let started = std::time::Instant::now();
        let result = listener
            .wait(&state, Duration::from_millis(200), &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(AuthError::TimedOut(_))));
        assert!(started.elapsed() < REQUEST_READ_TIMEOUT);
    }

    #[tokio::test]
    async fn localhost_redirect_binds_the_loopback_port() {
        let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let listener = CallbackListener::bind(&format!("http://localhost:{port}/callback"))
            .await
            .unwrap();
        assert!(!listener.listeners.is_empty());
        assert!(std::net::TcpListener::bind(("127.0.0.1", port)).is_err());
    }
}
