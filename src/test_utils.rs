//! Test utilities for ragchat
//!
//! Temporary files, a scriptable in-memory [`RagApi`], and token builders
//! shared by the unit tests.

use crate::api::{ChatReply, ChatRequest, ProgressFn, RagApi, TokenResponse, UploadFile};
use crate::error::{RagChatError, Result};
use crate::types::{ChatResponse, Document, DocumentKind, DocumentRecord};

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// Create a temporary directory for testing
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Create a test file with the given content
///
/// # Panics
///
/// Panics if file creation or writing fails
pub fn create_test_file(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, content).expect("Failed to write test file");
    path
}

/// Unsigned JWT carrying `claims` as its payload
pub fn jwt_with_claims(claims: serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.signature", header, payload)
}

/// A small text document with the given id
pub fn sample_document(id: i64) -> Document {
    Document {
        id,
        name: format!("doc-{}.txt", id),
        size: 11,
        kind: DocumentKind::Txt,
        content: "hello world".to_string(),
        uploaded_at: chrono::Utc::now(),
    }
}

#[derive(Clone)]
enum ChatScript {
    Answer(String),
    Chunks(Vec<Vec<u8>>),
    Fail(u16, String),
}

/// Scriptable [`RagApi`] that records the operations it receives
#[derive(Clone)]
pub struct FakeApi {
    calls: Arc<Mutex<Vec<&'static str>>>,
    last_chat: Arc<Mutex<Option<ChatRequest>>>,
    token: String,
    chat: ChatScript,
    upload_failure: Option<(u16, String)>,
    delay: Option<Duration>,
    next_id: Arc<AtomicI64>,
}

impl Default for FakeApi {
    fn default() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            last_chat: Arc::new(Mutex::new(None)),
            token: "test-token".to_string(),
            chat: ChatScript::Answer("Test answer".to_string()),
            upload_failure: None,
            delay: None,
            next_id: Arc::new(AtomicI64::new(1)),
        }
    }
}

impl FakeApi {
    /// Token returned by login and token exchange
    pub fn with_token(mut self, token: &str) -> Self {
        self.token = token.to_string();
        self
    }

    /// Non-streaming chat answer
    pub fn with_answer(mut self, answer: &str) -> Self {
        self.chat = ChatScript::Answer(answer.to_string());
        self
    }

    /// Streamed chat answer, one item per chunk
    pub fn with_chunks(mut self, chunks: Vec<Vec<u8>>) -> Self {
        self.chat = ChatScript::Chunks(chunks);
        self
    }

    /// Chat calls fail with the given status and detail
    pub fn failing_chat(mut self, status: u16, detail: &str) -> Self {
        self.chat = ChatScript::Fail(status, detail.to_string());
        self
    }

    /// Upload calls fail with the given status and detail
    pub fn failing_upload(mut self, status: u16, detail: &str) -> Self {
        self.upload_failure = Some((status, detail.to_string()));
        self
    }

    /// Delay chat and upload responses
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Names of the operations called so far
    pub fn calls(&self) -> Arc<Mutex<Vec<&'static str>>> {
        Arc::clone(&self.calls)
    }

    /// Most recent chat request
    pub fn last_chat_request(&self) -> Arc<Mutex<Option<ChatRequest>>> {
        Arc::clone(&self.last_chat)
    }

    fn record(&self, name: &'static str) {
        self.calls.lock().unwrap().push(name);
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn token_response(&self) -> TokenResponse {
        TokenResponse {
            access_token: self.token.clone(),
            token_type: Some("bearer".to_string()),
        }
    }
}

#[async_trait]
impl RagApi for FakeApi {
    async fn login(&self, _email: &str, _password: &str) -> Result<TokenResponse> {
        self.record("login");
        Ok(self.token_response())
    }

    async fn signup(&self, _email: &str, _password: &str, _full_name: &str) -> Result<()> {
        self.record("signup");
        Ok(())
    }

    async fn exchange_google_code(&self, _code: &str) -> Result<TokenResponse> {
        self.record("exchange_google_code");
        Ok(self.token_response())
    }

    fn google_login_url(&self) -> String {
        "http://fake/auth/google/login".to_string()
    }

    async fn upload_document(
        &self,
        file: UploadFile,
        progress: Option<ProgressFn>,
    ) -> Result<DocumentRecord> {
        self.record("upload_document");
        let total = file.data.len() as u64;
        if let Some(progress) = &progress {
            progress(total / 2, total);
        }
        self.pause().await;
        if let Some((status, detail)) = &self.upload_failure {
            return Err(RagChatError::Api {
                status: *status,
                detail: detail.clone(),
            }
            .into());
        }
        if let Some(progress) = &progress {
            progress(total, total);
        }
        Ok(DocumentRecord {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            filename: file.name,
            content: None,
            created_at: chrono::Utc::now(),
            file_hash: None,
        })
    }

    async fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        self.record("list_documents");
        Ok(Vec::new())
    }

    async fn delete_document(&self, _id: i64) -> Result<()> {
        self.record("delete_document");
        Ok(())
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatReply> {
        self.record("chat");
        *self.last_chat.lock().unwrap() = Some(request.clone());
        self.pause().await;
        match &self.chat {
            ChatScript::Answer(text) => Ok(ChatReply::Complete(ChatResponse {
                response: text.clone(),
                sources: Vec::new(),
            })),
            ChatScript::Chunks(chunks) => {
                let items: Vec<Result<Bytes>> = chunks
                    .iter()
                    .map(|c| Ok(Bytes::from(c.clone())))
                    .collect();
                Ok(ChatReply::Stream(Box::pin(futures::stream::iter(items))))
            }
            ChatScript::Fail(status, detail) => Err(RagChatError::Api {
                status: *status,
                detail: detail.clone(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_payload_decodes() {
        let token = jwt_with_claims(serde_json::json!({"sub": "a@b.co"}));
        let payload = token.split('.').nth(1).unwrap();
        let decoded = URL_SAFE_NO_PAD.decode(payload).unwrap();
        let claims: serde_json::Value = serde_json::from_slice(&decoded).unwrap();
        assert_eq!(claims["sub"], "a@b.co");
    }

    #[test]
    fn test_create_test_file() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "a.txt", "x");
        assert_eq!(std::fs::read_to_string(path).unwrap(), "x");
    }
}
