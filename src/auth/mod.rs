//! Credential acquisition and lifecycle: the loopback OAuth flow, the secret
//! store over OS vaults, and the token expiry policy.

pub mod backend;
pub mod error;
pub mod expiry;
pub mod oauth;
pub mod record;
pub mod service;
pub mod store;

pub use backend::{select_backend, BackendKind, BackendOptions, SecretBackend};
pub use error::{AuthError, AuthErrorKind};
pub use oauth::{AuthorizationRequest, FlowEvent, FlowPhase, FlowResult, OAuthFlow};
pub use record::{mask_token, normalize_name, CredentialRecord, CredentialSummary};
pub use service::{ActiveToken, AppCredentials, AuthService};
pub use store::SecretStore;
