//! Environment overrides for the demo

use std::path::PathBuf;
use twitch_session::{AppLocation, OAuthConfig};

/// Origin the redirect URI is built from (must be registered with Twitch)
pub fn app_location() -> AppLocation {
    let origin = std::env::var("TWITCH_SESSION_ORIGIN")
        .unwrap_or_else(|_| "http://localhost:8080".to_string());
    AppLocation::new(origin.trim_end_matches('/'), "/")
}

/// OAuth configuration, with `TWITCH_CLIENT_ID` replacing the built-in id
pub fn oauth_config() -> OAuthConfig {
    match std::env::var("TWITCH_CLIENT_ID") {
        Ok(client_id) if !client_id.trim().is_empty() => {
            OAuthConfig::builder().client_id(client_id.trim()).build()
        }
        _ => OAuthConfig::default(),
    }
}

/// Directory holding the token and state files
pub fn storage_dir() -> PathBuf {
    std::env::var_os("TWITCH_SESSION_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(twitch_session::cell::default_storage_dir)
}
