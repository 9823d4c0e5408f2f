//! threads-cli: credential handling for a Threads command-line client.
//!
//! The library side carries the loopback OAuth2 login against the Threads
//! Graph API, a secret store over the OS credential vaults (with an
//! encrypted-file fallback) and the token expiry policy. The `threads`
//! binary behind the `cli` feature wires them to a command line.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use threads_cli::auth::backend::{select_backend, BackendOptions};
//! use threads_cli::auth::oauth::{AuthorizationRequest, OAuthFlow};
//! use threads_cli::auth::{AuthService, SecretStore};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), threads_cli::auth::AuthError> {
//! let backend = select_backend(None, &BackendOptions::new("/tmp/threads".into()))?;
//! let service = AuthService::new(
//!     Arc::new(SecretStore::new(backend)),
//!     OAuthFlow::new(reqwest::Client::new()),
//! );
//! let request = AuthorizationRequest::builder()
//!     .client_id("app-id")
//!     .client_secret("app-secret")
//!     .redirect_uri("http://127.0.0.1:8585/callback")
//!     .scopes(vec!["threads_basic".to_string()])
//!     .build();
//! let record = service.login("work", &request, &CancellationToken::new()).await?;
//! println!("logged in as {}", record.username);
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod error;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
