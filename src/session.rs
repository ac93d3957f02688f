//! Authenticated session lifecycle
//!
//! [`SessionManager`] owns the current identity and the bearer token. It is
//! constructed explicitly with the API and storage it depends on and exposes
//! a narrow lifecycle: `init` (construct + restore), `login`, `signup`,
//! Google sign-in, and `logout`.
//!
//! A stored token without a cached profile is resolved from the token's own
//! claims (the backend issues JWTs whose `sub` is the account email). When
//! the claims are unusable the orphaned token is discarded and the caller is
//! told to sign in again; no placeholder identity is fabricated.

use crate::api::RagApi;
use crate::error::{user_message, Result};
use crate::storage::{KeyValueStore, TOKEN_KEY, USER_KEY};
use crate::types::User;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use regex::Regex;
use std::sync::{Arc, OnceLock, RwLock};
use thiserror::Error;

/// Minimum accepted password length
pub const MIN_PASSWORD_LEN: usize = 6;

/// A failed session operation, already phrased for the user
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct AuthError {
    /// Display text
    pub message: String,
}

impl AuthError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    fn from_error(err: &anyhow::Error) -> Self {
        Self::new(user_message(err))
    }
}

/// Where the session stands
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// No token stored
    Anonymous,
    /// Signed in
    Authenticated(User),
    /// A token was stored but no identity could be resolved for it
    ReauthenticationRequired,
}

/// Session store backed by durable storage
pub struct SessionManager {
    api: Arc<dyn RagApi>,
    storage: Arc<dyn KeyValueStore>,
    state: RwLock<SessionState>,
}

impl SessionManager {
    /// Create a manager and restore any persisted session
    ///
    /// # Errors
    ///
    /// Returns error only when durable storage itself fails
    pub fn init(api: Arc<dyn RagApi>, storage: Arc<dyn KeyValueStore>) -> Result<Self> {
        let manager = Self {
            api,
            storage,
            state: RwLock::new(SessionState::Anonymous),
        };
        manager.restore()?;
        Ok(manager)
    }

    /// Re-read the persisted session from storage
    pub fn restore(&self) -> Result<SessionState> {
        let state = match self.storage.get(TOKEN_KEY)? {
            None => SessionState::Anonymous,
            Some(token) => match self.cached_user()? {
                Some(user) => SessionState::Authenticated(user),
                None => match profile_from_token(&token) {
                    Some(user) => {
                        tracing::debug!("Resolved session profile from token claims");
                        self.storage.set(USER_KEY, &serde_json::to_string(&user)?)?;
                        SessionState::Authenticated(user)
                    }
                    None => {
                        tracing::warn!("Stored token carries no identity; sign-in required");
                        self.storage.remove(TOKEN_KEY)?;
                        SessionState::ReauthenticationRequired
                    }
                },
            },
        };

        self.set_state(state.clone());
        Ok(state)
    }

    fn cached_user(&self) -> Result<Option<User>> {
        let Some(raw) = self.storage.get(USER_KEY)? else {
            return Ok(None);
        };
        match serde_json::from_str::<User>(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(e) => {
                tracing::warn!("Discarding unreadable cached user: {}", e);
                self.storage.remove(USER_KEY)?;
                Ok(None)
            }
        }
    }

    fn set_state(&self, state: SessionState) {
        if let Ok(mut guard) = self.state.write() {
            *guard = state;
        }
    }

    /// Current session state
    pub fn state(&self) -> SessionState {
        self.state
            .read()
            .map(|s| s.clone())
            .unwrap_or(SessionState::Anonymous)
    }

    /// Signed-in user, if any
    pub fn user(&self) -> Option<User> {
        match self.state() {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    /// Whether a user is signed in
    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    /// Stored bearer token, read fresh from storage
    pub fn token(&self) -> Option<String> {
        self.storage.get(TOKEN_KEY).ok().flatten()
    }

    /// Sign in with email and password
    ///
    /// Credentials are validated before any network call. On success the
    /// token and the user profile are persisted.
    pub async fn login(&self, email: &str, password: &str) -> std::result::Result<User, AuthError> {
        validate_credentials(email, password)?;

        tracing::info!("Logging in");
        let token = self
            .api
            .login(email, password)
            .await
            .map_err(|e| AuthError::from_error(&e))?;

        let user = user_from_email(email);
        self.persist(&token.access_token, &user)
            .map_err(|e| AuthError::from_error(&e))?;

        tracing::info!("Logged in as {}", user.email);
        Ok(user)
    }

    /// Create an account, then sign in with it
    ///
    /// Succeeds only if the follow-up login succeeds.
    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        name: &str,
    ) -> std::result::Result<User, AuthError> {
        validate_credentials(email, password)?;
        if name.trim().is_empty() {
            return Err(AuthError::new("Please enter your name."));
        }

        tracing::info!("Creating account");
        self.api
            .signup(email, password, name.trim())
            .await
            .map_err(|e| AuthError::from_error(&e))?;

        self.login(email, password).await
    }

    /// Start the Google sign-in flow
    ///
    /// Returns the authorization URL after attempting to open it in the
    /// system browser. The session is completed later by
    /// [`complete_google_login`](Self::complete_google_login) with the code
    /// the backend hands to the callback page.
    pub fn login_with_google(&self) -> std::result::Result<String, AuthError> {
        let url = self.api.google_login_url();
        tracing::info!("Opening Google sign-in at {}", url);
        try_open_browser(&url);
        Ok(url)
    }

    /// Exchange the callback code for a token and establish the session
    pub async fn complete_google_login(&self, code: &str) -> std::result::Result<User, AuthError> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AuthError::new("Missing authorization code"));
        }

        let token = self
            .api
            .exchange_google_code(code)
            .await
            .map_err(|e| AuthError::from_error(&e))?;

        let user = profile_from_token(&token.access_token).ok_or_else(|| {
            AuthError::new("Google sign-in returned a token without an account; please sign in again")
        })?;

        self.persist(&token.access_token, &user)
            .map_err(|e| AuthError::from_error(&e))?;

        tracing::info!("Logged in with Google as {}", user.email);
        Ok(user)
    }

    /// Clear the session locally; no backend call
    pub fn logout(&self) {
        for key in [USER_KEY, TOKEN_KEY] {
            if let Err(e) = self.storage.remove(key) {
                tracing::warn!("Failed to remove {} during logout: {}", key, e);
            }
        }
        self.set_state(SessionState::Anonymous);
        tracing::info!("Logged out");
    }

    fn persist(&self, token: &str, user: &User) -> Result<()> {
        self.storage.set(TOKEN_KEY, token)?;
        self.storage.set(USER_KEY, &serde_json::to_string(user)?)?;
        self.set_state(SessionState::Authenticated(user.clone()));
        Ok(())
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"))
}

/// Check email shape and password length before contacting the backend
///
/// # Examples
///
/// ```
/// use ragchat::session::validate_credentials;
///
/// assert!(validate_credentials("user@example.com", "secret1").is_ok());
/// assert!(validate_credentials("user@example", "secret1").is_err());
/// assert!(validate_credentials("user@example.com", "short").is_err());
/// ```
pub fn validate_credentials(email: &str, password: &str) -> std::result::Result<(), AuthError> {
    if !email_regex().is_match(email) {
        return Err(AuthError::new("Please enter a valid email address."));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::new(format!(
            "Password must be at least {} characters.",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Profile for an email-identified account
///
/// The id is the base64 of the email as typed; the email is stored
/// lowercase and the name defaults to the local part.
pub fn user_from_email(email: &str) -> User {
    let name = email.split('@').next().unwrap_or(email).to_string();
    User {
        id: STANDARD.encode(email.as_bytes()),
        email: email.to_lowercase(),
        name,
        avatar: None,
    }
}

/// Resolve the account behind a JWT bearer token from its claims
///
/// The signature is not checked; the backend does that on every request.
/// Returns `None` when the token is not a JWT or its `sub` is not an email.
pub fn profile_from_token(token: &str) -> Option<User> {
    let payload = token.split('.').nth(1)?;
    let decoded = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&decoded).ok()?;

    let sub = claims.get("sub")?.as_str()?;
    if !email_regex().is_match(sub) {
        return None;
    }

    let mut user = user_from_email(sub);
    if let Some(name) = claims.get("name").and_then(|n| n.as_str()) {
        if !name.trim().is_empty() {
            user.name = name.to_string();
        }
    }
    if let Some(picture) = claims.get("picture").and_then(|p| p.as_str()) {
        user.avatar = Some(picture.to_string());
    }
    Some(user)
}

/// Best-effort attempt to open `url` in the user's browser
fn try_open_browser(url: &str) {
    #[cfg(target_os = "macos")]
    {
        let _ = std::process::Command::new("open").arg(url).spawn();
    }
    #[cfg(target_os = "linux")]
    {
        let _ = std::process::Command::new("xdg-open").arg(url).spawn();
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        let _ = url;
    }
}
