//! # Twitch sign-in session
//!
//! Client-side session management for Twitch's OAuth 2.0 implicit grant:
//! CSRF-safe sign-in URLs, validation of the provider's redirect, a bearer
//! token persisted across restarts and windows, and a current-user profile
//! that follows the token.
//!
//! ## Quick Start
//!
//! ```no_run
//! use twitch_session::{AppLocation, SessionManager};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = SessionManager::builder()
//!         .location(AppLocation::new("http://localhost:8080", "/"))
//!         .file_storage(twitch_session::cell::default_storage_dir())
//!         .build()?;
//!
//!     // Loads the user for a token persisted by an earlier run
//!     session.start().await?;
//!
//!     if !session.is_signed_in() {
//!         println!("Sign in at: {}", session.signin_url()?);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Flow
//!
//! 1. [`SessionManager::signin_url`] stores a fresh state and returns the
//!    authorization URL
//! 2. The provider redirects to the callback route with
//!    `#access_token=...&state=...`
//! 3. The callback route passes that string to
//!    [`SessionManager::complete_sign_in`], which accepts the token only if
//!    the state matches
//! 4. The token observer started by [`SessionManager::start`] fetches the
//!    user from `GET /users`
//!
//! A callback whose state does not match signs the session out. It is not an
//! error; check [`SessionManager::is_signed_in`] afterwards.
//!
//! ## Storage
//!
//! State lives in [`cell::PersistentCell`]s. [`cell::MemoryCell`] clones share
//! one slot (like windows on one storage origin); [`cell::FileCell`] keeps a
//! JSON file per key and can poll it for writes made by other processes. A
//! started session built with `file_storage` polls its files automatically.
//!
//! ## Logging
//!
//! This crate uses [`tracing`](https://crates.io/crates/tracing). Token and
//! state values are never logged. Failures inside the background token
//! observer are reported at `error` level. To see logs, attach a subscriber:
//!
//! ```rust,ignore
//! tracing_subscriber::fmt::init();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod api;
pub mod callback;
pub mod cell;
pub mod config;
pub mod error;
pub mod session;

pub use api::{HelixClient, HelixResponse, IdentityApi, User};
pub use callback::CallbackParams;
pub use cell::{FileCell, MemoryCell, PersistentCell};
pub use config::{AppLocation, OAuthConfig};
pub use error::{Result, SessionError};
pub use session::{SessionManager, SessionManagerBuilder};

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
