//! Error types for ragchat
//!
//! This module defines the error taxonomy used by the client: validation
//! errors caught before any network call, transport errors, and protocol
//! errors carrying the server's `detail` text. Everything is converted to a
//! user-displayable string at the orchestrator boundary via [`user_message`].

use thiserror::Error;

/// Main error type for ragchat operations
#[derive(Error, Debug)]
pub enum RagChatError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Input rejected before any network I/O (file type, size, credentials)
    #[error("{0}")]
    Validation(String),

    /// The backend could not be reached
    #[error("Connection error: {0}")]
    Transport(String),

    /// The backend answered with a non-2xx status
    ///
    /// `detail` is the server-provided `detail` field when the body was
    /// parseable, otherwise the per-operation fallback text.
    #[error("{detail}")]
    Api {
        /// HTTP status code returned by the backend
        status: u16,
        /// Server detail or fallback message
        detail: String,
    },

    /// A request is already outstanding on this orchestrator
    #[error("{0} already in progress")]
    Busy(&'static str),

    /// Durable storage errors (session database)
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client errors not attributable to the transport
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for ragchat operations
///
/// Uses `anyhow::Error` so callers can attach context while the typed
/// [`RagChatError`] stays recoverable through `downcast_ref`.
pub type Result<T> = anyhow::Result<T>;

/// Generic text shown when the backend cannot be reached
pub const CONNECTION_ERROR: &str = "Connection error";

/// Convert any error into the string shown to the user
///
/// Transport failures collapse to [`CONNECTION_ERROR`]; protocol errors
/// surface the server detail; validation and busy errors show their own
/// text. Anything else falls back to its display form.
///
/// # Examples
///
/// ```
/// use ragchat::error::{user_message, RagChatError};
///
/// let err: anyhow::Error = RagChatError::Api {
///     status: 401,
///     detail: "Incorrect email or password".to_string(),
/// }
/// .into();
/// assert_eq!(user_message(&err), "Incorrect email or password");
/// ```
pub fn user_message(err: &anyhow::Error) -> String {
    match err.downcast_ref::<RagChatError>() {
        Some(RagChatError::Transport(_)) => CONNECTION_ERROR.to_string(),
        Some(RagChatError::Http(e)) if e.is_connect() || e.is_timeout() => {
            CONNECTION_ERROR.to_string()
        }
        Some(e) => e.to_string(),
        None => err.to_string(),
    }
}
