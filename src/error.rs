//! Error types for the Twitch session manager

use thiserror::Error;

/// Main error type for session operations
///
/// A rejected (forged or stale) sign-in callback is deliberately *not* an
/// error: it resolves to a signed-out session. Callers detect it by checking
/// [`SessionManager::is_signed_in`](crate::SessionManager::is_signed_in).
#[derive(Error, Debug)]
pub enum SessionError {
    /// Transport-level HTTP failure (DNS, TLS, connection reset, ...)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The identity API answered with a non-success status
    #[error("API error (status {status}): {message}")]
    Api {
        /// HTTP status code
        status: u16,
        /// Message from the error body, or the status reason
        message: String,
    },

    /// The identity API answered with a body we could not use
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// A persistent cell could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type alias for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

impl SessionError {
    /// Create an API status error
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: message.into(),
        }
    }

    /// Create an invalid response error
    pub fn invalid_response(msg: impl Into<String>) -> Self {
        Self::InvalidResponse(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Whether this error came from talking to the identity API
    /// (as opposed to local storage or configuration)
    #[must_use]
    pub fn is_remote(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Api { .. } | Self::InvalidResponse(_)
        )
    }
}
