//! Identity API client
//!
//! The session only needs one call: "who does this bearer token belong to".
//! [`IdentityApi`] is the seam; [`HelixClient`] talks to Twitch Helix
//! (`GET /users` with `Authorization` and `Client-ID` headers).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::DEFAULT_API_BASE_URL;
use crate::error::{Result, SessionError};

/// Authenticated user profile as returned by `GET /users`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Stable numeric user id (as a string)
    pub id: String,
    /// Lowercase login name
    pub login: String,
    /// Display name, may differ in case or script from `login`
    pub display_name: String,
    /// Staff type: `admin`, `global_mod`, `staff` or empty
    #[serde(default, rename = "type")]
    pub user_type: String,
    /// `affiliate`, `partner` or empty
    #[serde(default)]
    pub broadcaster_type: String,
    /// Channel description
    #[serde(default)]
    pub description: String,
    /// Avatar URL
    #[serde(default)]
    pub profile_image_url: String,
    /// Offline banner URL
    #[serde(default)]
    pub offline_image_url: String,
    /// Only present with the `user:read:email` scope
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// RFC 3339 account creation time
    #[serde(default)]
    pub created_at: String,
}

/// Helix response envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelixResponse<T> {
    /// Payload
    pub data: T,
}

/// Helix error body
#[derive(Debug, Deserialize)]
struct HelixError {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Read-only identity lookup
#[async_trait]
pub trait IdentityApi: Send + Sync {
    /// Fetch the users the bearer token belongs to
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, non-success status or an
    /// unparseable body.
    async fn get_users(
        &self,
        bearer_token: &str,
        client_id: &str,
    ) -> Result<HelixResponse<Vec<User>>>;
}

/// reqwest-backed Helix client
#[derive(Debug, Clone)]
pub struct HelixClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl Default for HelixClient {
    fn default() -> Self {
        Self::new(DEFAULT_API_BASE_URL)
    }
}

impl HelixClient {
    /// Create a client for the given base URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, reqwest::Client::new())
    }

    /// Create a client reusing an existing `reqwest::Client`
    pub fn with_client(base_url: impl Into<String>, http_client: reqwest::Client) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            http_client,
        }
    }

    /// Get the base URL
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// `Authorization` header value for a bearer token
#[must_use]
pub fn bearer_header(token: &str) -> String {
    format!("Bearer {token}")
}

#[async_trait]
impl IdentityApi for HelixClient {
    async fn get_users(
        &self,
        bearer_token: &str,
        client_id: &str,
    ) -> Result<HelixResponse<Vec<User>>> {
        let response = self
            .http_client
            .get(format!("{}/users", self.base_url))
            .header("Authorization", bearer_header(bearer_token))
            .header("Client-ID", client_id)
            .send()
            .await?;

        let status = response.status();
        let response_text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<HelixError>(&response_text)
                .ok()
                .and_then(|e| e.message.or(e.error))
                .unwrap_or_else(|| {
                    status
                        .canonical_reason()
                        .unwrap_or("request failed")
                        .to_string()
                });
            return Err(SessionError::api(status.as_u16(), message));
        }

        serde_json::from_str(&response_text).map_err(|e| {
            SessionError::invalid_response(format!("Failed to parse users response: {e}"))
        })
    }
}
