//! ragchat - terminal client for a RAG document Q&A backend
//!
//! Sign in, upload a PDF, TXT, or MD document, and ask questions about it.
//! Retrieval and generation happen on the backend; this crate handles the
//! client side: session lifecycle, upload and chat orchestration, and the
//! HTTP gateway.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `storage`: durable key/value storage for the session
//! - `session`: sign-in, sign-up, Google sign-in, restore, and sign-out
//! - `api`: authenticated HTTP calls to the backend
//! - `upload`: validation, upload progress, and the active document
//! - `chat`: the message log and question/answer flow
//! - `config`: configuration management and validation
//! - `error`: error types and result aliases
//! - `cli` and `commands`: the command-line front end
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use ragchat::api::ApiClient;
//! use ragchat::chat::ChatOrchestrator;
//! use ragchat::session::SessionManager;
//! use ragchat::storage::SqliteStorage;
//! use ragchat::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml", &Default::default())?;
//!     config.validate()?;
//!
//!     let storage = Arc::new(SqliteStorage::new()?);
//!     let api = Arc::new(ApiClient::new(&config.api, storage.clone())?);
//!     let session = SessionManager::init(api.clone(), storage)?;
//!     session.login("user@example.com", "secret1").await?;
//!
//!     let chat = ChatOrchestrator::new(api, &config.chat);
//!     chat.send_message("What is this document about?", None).await;
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod chat;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod session;
pub mod slot;
pub mod storage;
pub mod types;
pub mod upload;

// Re-export commonly used types
pub use api::{ApiClient, RagApi};
pub use chat::{ChatOrchestrator, ChatState, SendOutcome};
pub use config::Config;
pub use error::{Result, RagChatError};
pub use session::{SessionManager, SessionState};
pub use types::{Document, DocumentKind, Message, Role, User};
pub use upload::{UploadOrchestrator, UploadOutcome, UploadState};

#[cfg(test)]
pub mod test_utils;
