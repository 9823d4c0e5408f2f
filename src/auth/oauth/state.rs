//! CSRF state tokens for a single authorization attempt.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use subtle::ConstantTimeEq;

/// 256 bits of entropy, comfortably above the 128-bit floor.
const STATE_BYTES: usize = 32;

/// Per-flow random token tying the outgoing authorize request to its callback.
///
/// Lives only as long as one `OAuthFlow::start` call and is never persisted.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthorizationState(String);

impl AuthorizationState {
    pub fn generate() -> Self {
        let mut bytes = [0u8; STATE_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    #[cfg(test)]
    pub(crate) fn from_value(value: &str) -> Self {
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against the value echoed back by the provider.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

impl std::fmt::Debug for AuthorizationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AuthorizationState(<redacted>)")
    }
}
