//! Provider and application configuration
//!
//! [`OAuthConfig`] carries the compiled-in Twitch application registration.
//! [`AppLocation`] describes where the app is served from, which together
//! with the callback route yields the `redirect_uri` the provider must have
//! on file.

use typed_builder::TypedBuilder;

use crate::error::{Result, SessionError};

/// Twitch application client id
pub const DEFAULT_CLIENT_ID: &str = "ea4ht2mler9y438e2o706g2rsd7jxz";
/// Twitch authorization endpoint
pub const DEFAULT_AUTH_URL: &str = "https://id.twitch.tv/oauth2/authorize";
/// Twitch Helix API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.twitch.tv/helix";
/// Space-separated scopes requested at sign-in
pub const DEFAULT_SCOPES: &str = "chat:read chat:edit";
/// In-app route that receives the provider redirect
pub const DEFAULT_CALLBACK_ROUTE: &str = "#/twitch-oauth";
/// Storage key for the bearer token
pub const DEFAULT_TOKEN_KEY: &str = "auth.twitch";
/// Storage key for the pending CSRF state
pub const DEFAULT_STATE_KEY: &str = "auth.twitch.state";

/// OAuth provider configuration
#[derive(Debug, Clone, PartialEq, Eq, TypedBuilder)]
#[builder(
    builder_method(doc = "Create a new builder for OAuthConfig"),
    builder_type(doc = "Builder for OAuthConfig", vis = "pub"),
    build_method(doc = "Build the OAuthConfig")
)]
pub struct OAuthConfig {
    /// OAuth client ID, also sent as the `Client-ID` header to the API
    #[builder(default = DEFAULT_CLIENT_ID.to_string(), setter(into))]
    pub client_id: String,

    /// Authorization endpoint URL
    #[builder(default = DEFAULT_AUTH_URL.to_string(), setter(into))]
    pub auth_url: String,

    /// Identity API base URL (no trailing slash)
    #[builder(default = DEFAULT_API_BASE_URL.to_string(), setter(into))]
    pub api_base_url: String,

    /// Space-separated scopes to request
    #[builder(default = DEFAULT_SCOPES.to_string(), setter(into))]
    pub scopes: String,

    /// Callback route appended to the app location to form the redirect URI
    #[builder(default = DEFAULT_CALLBACK_ROUTE.to_string(), setter(into))]
    pub callback_route: String,

    /// Persistent cell key holding the token
    #[builder(default = DEFAULT_TOKEN_KEY.to_string(), setter(into))]
    pub token_key: String,

    /// Persistent cell key holding the pending sign-in state
    #[builder(default = DEFAULT_STATE_KEY.to_string(), setter(into))]
    pub state_key: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl OAuthConfig {
    /// Check that the configuration can produce a usable sign-in URL
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidConfig` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(SessionError::invalid_config("client_id must not be empty"));
        }
        if self.scopes.trim().is_empty() {
            return Err(SessionError::invalid_config("scopes must not be empty"));
        }
        for (name, url) in [("auth_url", &self.auth_url), ("api_base_url", &self.api_base_url)] {
            if !is_http_url(url) {
                return Err(SessionError::invalid_config(format!(
                    "{name} must be an http(s) URL, got '{url}'"
                )));
            }
        }
        if self.token_key == self.state_key {
            return Err(SessionError::invalid_config(
                "token_key and state_key must differ",
            ));
        }
        Ok(())
    }
}

fn is_http_url(url: &str) -> bool {
    url.strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .is_some_and(|rest| !rest.is_empty())
}

/// Where the application is served from
///
/// In a browser this is `location.origin` and `location.pathname` captured
/// when the session is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppLocation {
    /// Scheme, host and port, e.g. `https://example.com`
    pub origin: String,
    /// Base path of the app, e.g. `/overlay/`
    pub path: String,
}

impl Default for AppLocation {
    fn default() -> Self {
        Self::new("http://localhost:8080", "/")
    }
}

impl AppLocation {
    /// Create a new location
    pub fn new(origin: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            path: path.into(),
        }
    }

    /// Redirect URI for the given callback route
    ///
    /// Plain concatenation: the result must byte-match the URI registered
    /// with the provider, so no normalisation is applied.
    #[must_use]
    pub fn redirect_uri(&self, callback_route: &str) -> String {
        format!("{}{}{callback_route}", self.origin, self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oauth_config_default() {
        let config = OAuthConfig::default();
        assert_eq!(config.client_id, DEFAULT_CLIENT_ID);
        assert_eq!(config.auth_url, DEFAULT_AUTH_URL);
        assert_eq!(config.scopes, "chat:read chat:edit");
        assert_eq!(config.token_key, "auth.twitch");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_oauth_config_builder_overrides() {
        let config = OAuthConfig::builder()
            .client_id("abc")
            .callback_route("/callback")
            .build();
        assert_eq!(config.client_id, "abc");
        assert_eq!(config.callback_route, "/callback");
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn test_validate_rejects_empty_client_id() {
        let config = OAuthConfig::builder().client_id("  ").build();
        assert!(matches!(
            config.validate(),
            Err(SessionError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_validate_rejects_non_http_auth_url() {
        let config = OAuthConfig::builder().auth_url("id.twitch.tv/authorize").build();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("auth_url"));
    }

    #[test]
    fn test_validate_rejects_shared_storage_key() {
        let config = OAuthConfig::builder()
            .token_key("auth")
            .state_key("auth")
            .build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redirect_uri_is_plain_concatenation() {
        let location = AppLocation::new("https://example.com", "/overlay/");
        assert_eq!(
            location.redirect_uri("#/twitch-oauth"),
            "https://example.com/overlay/#/twitch-oauth"
        );
    }
}
