//! Sign-in session manager
//!
//! [`SessionManager`] owns the three pieces of session state:
//!
//! | State | Where it lives |
//! |---|---|
//! | bearer token | token [`PersistentCell`] |
//! | pending CSRF state | state [`PersistentCell`] |
//! | current user | memory only |
//!
//! and drives the implicit-grant round trip:
//!
//! ```text
//!  signin_url() ──► provider login ──► redirect to callback route
//!                                           │
//!                                           ▼
//!                                 complete_sign_in(raw)
//!                                           │ writes token cell
//!                                           ▼
//!            token observer ──► refresh_current_user() ──► GET /users
//! ```
//!
//! The refresh hangs off a token observer rather than the end of
//! `complete_sign_in` because the callback page may run in another window
//! (or process) that writes the shared token cell directly.
//!
//! # Example
//!
//! ```no_run
//! use twitch_session::{AppLocation, SessionManager};
//!
//! # async fn example() -> twitch_session::Result<()> {
//! let session = SessionManager::builder()
//!     .location(AppLocation::new("https://example.com", "/"))
//!     .file_storage(twitch_session::cell::default_storage_dir())
//!     .build()?;
//! session.start().await?;
//!
//! let url = session.signin_url()?;
//! // send the user agent to `url`; the callback route later calls:
//! session.complete_sign_in("#access_token=...&state=...").await?;
//! # Ok(())
//! # }
//! ```

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::api::{HelixClient, IdentityApi, User};
use crate::callback::{CallbackParams, build_query};
use crate::cell::{FileCell, MemoryCell, PersistentCell};
use crate::config::{AppLocation, OAuthConfig};
use crate::error::{Result, SessionError};

/// Shared handle to a string-valued cell
pub type SharedCell = Arc<dyn PersistentCell<String>>;

/// How often file-backed cells are re-read for writes from other processes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Generate a fresh CSRF state (24 random bytes, base64url, 32 chars)
fn generate_state() -> String {
    let bytes: [u8; 24] = rand::rng().random();
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Builder for [`SessionManager`]
#[derive(Default)]
pub struct SessionManagerBuilder {
    config: Option<OAuthConfig>,
    location: Option<AppLocation>,
    token_cell: Option<SharedCell>,
    state_cell: Option<SharedCell>,
    storage_dir: Option<PathBuf>,
    poll_interval: Option<Duration>,
    api: Option<Arc<dyn IdentityApi>>,
}

impl SessionManagerBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set custom OAuth configuration
    #[must_use]
    pub fn config(mut self, config: OAuthConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set where the app is served from (used for the redirect URI)
    #[must_use]
    pub fn location(mut self, location: AppLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Use this cell for the bearer token
    #[must_use]
    pub fn token_cell(mut self, cell: impl PersistentCell<String> + 'static) -> Self {
        self.token_cell = Some(Arc::new(cell));
        self
    }

    /// Use this cell for the pending sign-in state
    #[must_use]
    pub fn state_cell(mut self, cell: impl PersistentCell<String> + 'static) -> Self {
        self.state_cell = Some(Arc::new(cell));
        self
    }

    /// Back any cell not set explicitly with a JSON file in `dir`
    ///
    /// Once started, the session polls these files so a sign-in completed
    /// by another process is picked up.
    #[must_use]
    pub fn file_storage(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Set how often [`file_storage`](Self::file_storage) files are re-read
    /// (default: [`DEFAULT_POLL_INTERVAL`])
    #[must_use]
    pub fn poll_interval(mut self, period: Duration) -> Self {
        self.poll_interval = Some(period);
        self
    }

    /// Set a custom identity API client
    #[must_use]
    pub fn api(mut self, api: impl IdentityApi + 'static) -> Self {
        self.api = Some(Arc::new(api));
        self
    }

    /// Build the session manager
    ///
    /// Cells default to in-memory ones unless [`file_storage`](Self::file_storage)
    /// was given; the API defaults to [`HelixClient`] on the configured base URL.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidConfig` if the configuration is invalid.
    pub fn build(self) -> Result<SessionManager> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let location = self.location.unwrap_or_default();
        let redirect_uri = location.redirect_uri(&config.callback_route);

        let storage_dir = self.storage_dir;
        let mut polled_cells = Vec::new();
        let mut open_cell = |key: &str| -> SharedCell {
            match &storage_dir {
                Some(dir) => {
                    let cell = FileCell::<String>::in_dir(dir, key);
                    polled_cells.push(cell.clone());
                    Arc::new(cell)
                }
                None => Arc::new(MemoryCell::<String>::default()),
            }
        };
        let token = match self.token_cell {
            Some(cell) => cell,
            None => open_cell(&config.token_key),
        };
        let pending_state = match self.state_cell {
            Some(cell) => cell,
            None => open_cell(&config.state_key),
        };

        let api = self
            .api
            .unwrap_or_else(|| Arc::new(HelixClient::new(config.api_base_url.as_str())));

        let (current_user, _) = watch::channel(None);

        Ok(SessionManager {
            inner: Arc::new(Inner {
                config,
                redirect_uri,
                token,
                pending_state,
                current_user,
                api,
                polled_cells,
                poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
                observer: Mutex::new(None),
            }),
        })
    }
}

struct Inner {
    config: OAuthConfig,
    redirect_uri: String,
    token: SharedCell,
    pending_state: SharedCell,
    current_user: watch::Sender<Option<User>>,
    api: Arc<dyn IdentityApi>,
    /// File cells opened by the builder, re-read while the session runs
    polled_cells: Vec<FileCell<String>>,
    poll_interval: Duration,
    /// Cancels the token observer and file pollers, if running
    observer: Mutex<Option<CancellationToken>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Ok(observer) = self.observer.get_mut() {
            if let Some(cancel) = observer.take() {
                cancel.cancel();
            }
        }
    }
}

/// Sign-in session for one application instance
///
/// Cheap to clone; clones share state. Construct one at startup and hand it
/// to whatever needs it.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("config", &self.inner.config)
            .field("redirect_uri", &self.inner.redirect_uri)
            .field("is_signed_in", &self.is_signed_in())
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a builder for custom configuration
    #[must_use]
    pub fn builder() -> SessionManagerBuilder {
        SessionManagerBuilder::new()
    }

    /// Get the OAuth configuration
    #[must_use]
    pub fn config(&self) -> &OAuthConfig {
        &self.inner.config
    }

    /// Redirect URI sent to the provider
    #[must_use]
    pub fn redirect_uri(&self) -> &str {
        &self.inner.redirect_uri
    }

    // ------------------------------------------------------------------
    // Reactive surface
    // ------------------------------------------------------------------

    /// Current bearer token
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.inner.token.read()
    }

    /// Whether a token is present
    #[must_use]
    pub fn is_signed_in(&self) -> bool {
        self.inner.token.read().is_some()
    }

    /// Cached profile of the signed-in user
    #[must_use]
    pub fn current_user(&self) -> Option<User> {
        self.inner.current_user.borrow().clone()
    }

    /// CSRF state of the sign-in attempt in flight, if any
    #[must_use]
    pub fn pending_state(&self) -> Option<String> {
        self.inner.pending_state.read()
    }

    /// Observe token changes (sign-in state follows from `is_some()`)
    #[must_use]
    pub fn watch_token(&self) -> watch::Receiver<Option<String>> {
        self.inner.token.subscribe()
    }

    /// Observe current user changes
    #[must_use]
    pub fn watch_current_user(&self) -> watch::Receiver<Option<User>> {
        self.inner.current_user.subscribe()
    }

    fn set_current_user(&self, user: Option<User>) {
        self.inner.current_user.send_if_modified(|current| {
            if *current == user {
                false
            } else {
                *current = user;
                true
            }
        });
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Start the session: watch the token and load the current user
    ///
    /// The token observer is spawned once; later calls only refresh. Must be
    /// called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns the startup refresh error, if any. The observer keeps running.
    pub async fn start(&self) -> Result<()> {
        self.spawn_observer();
        self.refresh_current_user().await
    }

    /// Stop reacting to token changes
    pub fn shutdown(&self) {
        if let Ok(mut observer) = self.inner.observer.lock() {
            if let Some(cancel) = observer.take() {
                tracing::debug!("Stopping token observer");
                cancel.cancel();
            }
        }
    }

    fn spawn_observer(&self) {
        let Ok(mut observer) = self.inner.observer.lock() else {
            return;
        };
        if observer.is_some() {
            return;
        }

        let cancel = CancellationToken::new();
        let rx = self.inner.token.subscribe();
        let weak = Arc::downgrade(&self.inner);
        tokio::spawn(Self::observe_token(weak, rx, cancel.clone()));
        for cell in &self.inner.polled_cells {
            drop(cell.spawn_poller(self.inner.poll_interval, cancel.child_token()));
        }
        *observer = Some(cancel);
        tracing::debug!(
            polled_files = self.inner.polled_cells.len(),
            "Token observer started"
        );
    }

    /// Refresh the current user once per token change
    async fn observe_token(
        inner: Weak<Inner>,
        mut rx: watch::Receiver<Option<String>>,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }

            let Some(inner) = inner.upgrade() else {
                break;
            };
            let session = SessionManager { inner };
            if let Err(e) = session.refresh_current_user().await {
                // Nobody awaits this task; the log is where the failure surfaces
                tracing::error!("Refreshing current user after token change failed: {e}");
            }
        }
        tracing::debug!("Token observer stopped");
    }

    // ------------------------------------------------------------------
    // Operations
    // ------------------------------------------------------------------

    /// Begin a sign-in attempt and return the provider authorization URL
    ///
    /// Stores a fresh CSRF state, replacing any earlier attempt's. Does not
    /// navigate; the caller sends the user agent to the returned URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the state cell cannot be written.
    pub fn signin_url(&self) -> Result<String> {
        let config = &self.inner.config;
        let state = generate_state();
        self.inner.pending_state.write(Some(state.clone()))?;

        let query = build_query(&[
            ("client_id", config.client_id.as_str()),
            ("response_type", "token"),
            ("redirect_uri", self.inner.redirect_uri.as_str()),
            ("scope", config.scopes.as_str()),
            ("state", state.as_str()),
        ]);

        tracing::debug!(redirect_uri = %self.inner.redirect_uri, "Generated sign-in URL");
        Ok(format!("{}?{query}", config.auth_url))
    }

    /// Finish a sign-in attempt from the provider's redirect string
    ///
    /// - state matches the pending state and a token is present: the token
    ///   is stored
    /// - state matches but no token: nothing changes
    /// - anything else (including no pending state): the session is cleared
    ///
    /// The pending state is consumed in every case.
    ///
    /// # Errors
    ///
    /// Only storage failures are errors; a rejected callback is not.
    pub async fn complete_sign_in(&self, callback: &str) -> Result<()> {
        let params = CallbackParams::parse(callback);
        if let Some(error) = &params.error {
            tracing::warn!(
                error = %error,
                description = params.error_description.as_deref().unwrap_or(""),
                "Provider reported an error on the sign-in callback"
            );
        }

        let pending = self.inner.pending_state.read();
        let state_matches = matches!(
            (&params.state, &pending),
            (Some(received), Some(expected)) if received == expected
        );

        let outcome = if state_matches {
            match params.token() {
                Some(token) => {
                    tracing::debug!("Sign-in callback accepted");
                    self.inner.token.write(Some(token.to_string()))
                }
                None => {
                    tracing::debug!("Sign-in callback carried no access token; session unchanged");
                    Ok(())
                }
            }
        } else {
            tracing::warn!(
                had_pending_state = pending.is_some(),
                "Rejected sign-in callback: state mismatch"
            );
            let cleared = self.inner.token.write(None);
            if cleared.is_ok() {
                self.set_current_user(None);
            }
            cleared
        };

        let consumed = self.inner.pending_state.write(None);
        outcome.and(consumed)
    }

    /// Reload the current user for the current token
    ///
    /// No-op without a token. A response for a token that has since been
    /// replaced or cleared is discarded.
    ///
    /// # Errors
    ///
    /// Returns API errors as-is, and `InvalidResponse` if the user list is empty.
    pub async fn refresh_current_user(&self) -> Result<()> {
        let Some(token) = self.inner.token.read() else {
            return Ok(());
        };

        let response = self
            .inner
            .api
            .get_users(&token, &self.inner.config.client_id)
            .await?;

        if self.inner.token.read().as_deref() != Some(token.as_str()) {
            tracing::warn!("Discarding user profile fetched for a token that is no longer current");
            return Ok(());
        }

        let user = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| SessionError::invalid_response("users response contained no users"))?;

        tracing::debug!(login = %user.login, "Current user refreshed");
        self.set_current_user(Some(user));
        Ok(())
    }

    /// Sign out: clear token, pending state and current user
    ///
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Returns the first storage failure; every field is still attempted.
    pub fn logout(&self) -> Result<()> {
        let token = self.inner.token.write(None);
        let state = self.inner.pending_state.write(None);
        self.set_current_user(None);
        tracing::debug!("Signed out");
        token.and(state)
    }
}
