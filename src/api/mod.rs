//! Backend API gateway
//!
//! Stateless request builders against a fixed base origin. Every call reads
//! the bearer token fresh from durable storage and attaches it when present;
//! a missing token is not an error here, the server decides.
//!
//! Non-2xx responses are normalized to [`RagChatError::Api`] carrying the
//! server's `detail` field when the body is parseable, else a per-operation
//! fallback message. Unreachable backends surface as
//! [`RagChatError::Transport`].

pub mod progress;

pub use progress::ProgressFn;

use crate::config::ApiConfig;
use crate::error::{Result, RagChatError};
use crate::storage::{KeyValueStore, TOKEN_KEY};
use crate::types::{ChatResponse, DocumentRecord};

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

/// Raw answer bytes of a streamed chat reply
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Reply of the chat endpoint
///
/// Callers discriminate on the variant: a parsed answer, or the raw body
/// when streaming was requested.
pub enum ChatReply {
    /// Structured, non-streaming answer
    Complete(ChatResponse),
    /// Raw text stream
    Stream(ByteStream),
}

impl std::fmt::Debug for ChatReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChatReply::Complete(resp) => f.debug_tuple("Complete").field(resp).finish(),
            ChatReply::Stream(_) => f.write_str("Stream(..)"),
        }
    }
}

/// Body of `POST /chat/`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    /// Question text
    pub message: String,
    /// Documents to search
    pub document_ids: Vec<i64>,
    /// Ask for a streamed answer
    pub stream: bool,
}

/// Token returned by the login and token-exchange endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// Bearer token
    pub access_token: String,
    /// Usually `"bearer"`
    #[serde(default)]
    pub token_type: Option<String>,
}

/// A file ready to be sent as the `file` multipart field
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// File name as sent to the backend
    pub name: String,
    /// MIME type of the part
    pub mime: &'static str,
    /// Raw file bytes
    pub data: Bytes,
}

/// Operations the backend offers
///
/// The orchestrators depend on this trait rather than on [`ApiClient`]
/// so their state handling can be exercised without a server.
#[async_trait]
pub trait RagApi: Send + Sync {
    /// `POST /auth/login`
    async fn login(&self, email: &str, password: &str) -> Result<TokenResponse>;

    /// `POST /auth/signup`
    async fn signup(&self, email: &str, password: &str, full_name: &str) -> Result<()>;

    /// `POST /auth/google/token-exchange?code=...`
    async fn exchange_google_code(&self, code: &str) -> Result<TokenResponse>;

    /// Browser entry point of the Google sign-in flow
    fn google_login_url(&self) -> String;

    /// `POST /documents/upload`
    async fn upload_document(
        &self,
        file: UploadFile,
        progress: Option<ProgressFn>,
    ) -> Result<DocumentRecord>;

    /// `GET /documents/`
    async fn list_documents(&self) -> Result<Vec<DocumentRecord>>;

    /// `DELETE /documents/{id}`
    async fn delete_document(&self, id: i64) -> Result<()>;

    /// `POST /chat/`
    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    detail: Option<serde_json::Value>,
}

/// reqwest-backed implementation of [`RagApi`]
pub struct ApiClient {
    http: Client,
    base_url: String,
    storage: Arc<dyn KeyValueStore>,
}

impl ApiClient {
    /// Create a client for the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if HTTP client initialization fails
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use ragchat::api::ApiClient;
    /// use ragchat::config::ApiConfig;
    /// use ragchat::storage::MemoryStorage;
    ///
    /// let client = ApiClient::new(&ApiConfig::default(), Arc::new(MemoryStorage::new())).unwrap();
    /// assert_eq!(client.base_url(), "http://localhost:8000");
    /// ```
    pub fn new(config: &ApiConfig, storage: Arc<dyn KeyValueStore>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(concat!("ragchat/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| RagChatError::Config(format!("Failed to create HTTP client: {}", e)))?;

        tracing::debug!("Initialized API client: base_url={}", config.base_url);

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            storage,
        })
    }

    /// Configured base origin without a trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Attach the stored bearer token, if any
    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.storage.get(TOKEN_KEY) {
            Ok(Some(token)) => request.bearer_auth(token),
            Ok(None) => request,
            Err(e) => {
                tracing::warn!("Could not read stored token: {}", e);
                request
            }
        }
    }

    async fn send(&self, request: RequestBuilder, fallback: &str) -> Result<Response> {
        let response = request
            .send()
            .await
            .map_err(|e| RagChatError::Transport(e.to_string()))?;
        check_status(response, fallback).await
    }
}

/// Turn a non-2xx response into [`RagChatError::Api`]
async fn check_status(response: Response, fallback: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let detail = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.detail)
        .and_then(|detail| match detail {
            serde_json::Value::String(s) if !s.is_empty() => Some(s),
            _ => None,
        })
        .unwrap_or_else(|| fallback.to_string());

    tracing::debug!(status = status.as_u16(), detail = %detail, "Backend returned an error");

    Err(RagChatError::Api {
        status: status.as_u16(),
        detail,
    }
    .into())
}

/// Parse a 2xx body; a malformed body reports the per-operation fallback
async fn decode<T: DeserializeOwned>(response: Response, fallback: &str) -> Result<T> {
    let status = response.status().as_u16();
    response.json::<T>().await.map_err(|e| {
        if !e.is_decode() {
            return anyhow::Error::from(RagChatError::Transport(e.to_string()));
        }
        tracing::warn!(status, "Could not decode response body: {}", e);
        anyhow::Error::from(RagChatError::Api {
            status,
            detail: fallback.to_string(),
        })
    })
}

#[async_trait]
impl RagApi for ApiClient {
    async fn login(&self, email: &str, password: &str) -> Result<TokenResponse> {
        tracing::debug!("POST /auth/login");
        let request = self
            .http
            .post(self.url("/auth/login"))
            .form(&[("username", email), ("password", password)]);
        let response = self.send(request, "Login failed").await?;
        decode(response, "Login failed").await
    }

    async fn signup(&self, email: &str, password: &str, full_name: &str) -> Result<()> {
        tracing::debug!("POST /auth/signup");
        let request = self.http.post(self.url("/auth/signup")).json(&serde_json::json!({
            "email": email,
            "password": password,
            "full_name": full_name,
        }));
        self.send(request, "Signup failed").await?;
        Ok(())
    }

    async fn exchange_google_code(&self, code: &str) -> Result<TokenResponse> {
        tracing::debug!("POST /auth/google/token-exchange");
        let request = self
            .http
            .post(self.url("/auth/google/token-exchange"))
            .query(&[("code", code)]);
        let response = self.send(request, "Google sign-in failed").await?;
        decode(response, "Google sign-in failed").await
    }

    fn google_login_url(&self) -> String {
        self.url("/auth/google/login")
    }

    async fn upload_document(
        &self,
        file: UploadFile,
        progress: Option<ProgressFn>,
    ) -> Result<DocumentRecord> {
        tracing::debug!(name = %file.name, bytes = file.data.len(), "POST /documents/upload");

        let total = file.data.len() as u64;
        let part = match progress {
            Some(progress) => reqwest::multipart::Part::stream_with_length(
                progress::counting_body(file.data, progress),
                total,
            ),
            None => reqwest::multipart::Part::bytes(file.data.to_vec()),
        };
        let part = part
            .file_name(file.name)
            .mime_str(file.mime)
            .map_err(RagChatError::Http)?;
        let form = reqwest::multipart::Form::new().part("file", part);

        let request = self
            .authorize(self.http.post(self.url("/documents/upload")))
            .multipart(form);
        let response = self.send(request, "Failed to upload document").await?;
        decode(response, "Failed to upload document").await
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        tracing::debug!("GET /documents/");
        let request = self.authorize(self.http.get(self.url("/documents/")));
        let response = self.send(request, "Failed to load documents").await?;
        decode(response, "Failed to load documents").await
    }

    async fn delete_document(&self, id: i64) -> Result<()> {
        tracing::debug!(id, "DELETE /documents/{{id}}");
        let request = self.authorize(self.http.delete(self.url(&format!("/documents/{}", id))));
        self.send(request, "Failed to delete document").await?;
        Ok(())
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        tracing::debug!(
            document_ids = ?request.document_ids,
            stream = request.stream,
            "POST /chat/"
        );
        let builder = self
            .authorize(self.http.post(self.url("/chat/")))
            .json(request);
        let response = self.send(builder, "Failed to send message").await?;

        if request.stream {
            let stream = response
                .bytes_stream()
                .map(|chunk| {
                    chunk.map_err(|e| anyhow::Error::from(RagChatError::Transport(e.to_string())))
                });
            return Ok(ChatReply::Stream(Box::pin(stream)));
        }

        let parsed: ChatResponse = decode(response, "Failed to send message").await?;
        Ok(ChatReply::Complete(parsed))
    }
}
