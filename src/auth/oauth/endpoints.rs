use url::Url;

use crate::auth::error::AuthError;

pub const DEFAULT_AUTHORIZE_URL: &str = "https://threads.net/oauth/authorize";
pub const DEFAULT_GRAPH_URL: &str = "https://graph.threads.net";
pub const DEFAULT_API_VERSION: &str = "v1.0";

/// Provider URLs used by the flow. Overridable so tests and staging setups
/// can point the flow at a different host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorize_url: String,
    pub graph_url: String,
    pub api_version: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            graph_url: DEFAULT_GRAPH_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        }
    }
}

impl ProviderEndpoints {
    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn with_graph_url(mut self, url: impl Into<String>) -> Self {
        self.graph_url = url.into();
        self
    }

    /// Form-encoded POST target for the authorization-code exchange.
    pub fn token_url(&self) -> String {
        format!("{}/oauth/access_token", self.graph_base())
    }

    /// Short-lived to long-lived exchange.
    pub fn long_lived_url(&self) -> String {
        format!("{}/access_token", self.graph_base())
    }

    pub fn refresh_url(&self) -> String {
        format!("{}/refresh_access_token", self.graph_base())
    }

    pub fn me_url(&self) -> String {
        format!("{}/{}/me", self.graph_base(), self.api_version)
    }

    /// Authorize URL with the query the provider expects. Scopes are
    /// comma-joined per Threads convention.
    pub fn authorization_url(
        &self,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
        state: &str,
    ) -> Result<Url, AuthError> {
        let mut url = Url::parse(&self.authorize_url).map_err(|e| {
            AuthError::Configuration(format!(
                "invalid authorize URL '{}': {e}",
                self.authorize_url
            ))
        })?;
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", &scopes.join(","))
            .append_pair("response_type", "code")
            .append_pair("state", state);
        Ok(url)
    }

    fn graph_base(&self) -> &str {
        self.graph_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_urls_tolerate_trailing_slash() {
        let endpoints = ProviderEndpoints::default().with_graph_url("http://127.0.0.1:9999/");
        assert_eq!(endpoints.token_url(), "http://127.0.0.1:9999/oauth/access_token");
        assert_eq!(endpoints.long_lived_url(), "http://127.0.0.1:9999/access_token");
        assert_eq!(endpoints.refresh_url(), "http://127.0.0.1:9999/refresh_access_token");
        assert_eq!(endpoints.me_url(), "http://127.0.0.1:9999/v1.0/me");
    }

    #[test]
    fn authorization_url_carries_all_parameters() {
        let url = ProviderEndpoints::default()
            .authorization_url(
                "c1",
                "http://127.0.0.1:8585/callback",
                &["threads_basic".to_string(), "threads_content_publish".to_string()],
                "xyz",
            )
            .unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("client_id".to_string(), "c1".to_string()),
                (
                    "redirect_uri".to_string(),
                    "http://127.0.0.1:8585/callback".to_string()
                ),
                (
                    "scope".to_string(),
                    "threads_basic,threads_content_publish".to_string()
                ),
                ("response_type".to_string(), "code".to_string()),
                ("state".to_string(), "xyz".to_string()),
            ]
        );
        assert!(url.as_str().starts_with(DEFAULT_AUTHORIZE_URL));
    }

    #[test]
    fn invalid_authorize_url_is_configuration_error() {
        let result = ProviderEndpoints::default()
            .with_authorize_url("not a url")
            .authorization_url("c1", "http://127.0.0.1:1/cb", &[], "s");
        assert!(matches!(result, Err(AuthError::Configuration(_))));
    }
}
