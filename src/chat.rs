//! Chat orchestration
//!
//! Holds the ordered message log and the loading flag, sends questions
//! scoped to the active document, and always leaves exactly one assistant
//! message per accepted question: the answer, or a fixed fallback.

use crate::api::{ChatReply, ChatRequest, RagApi};
use crate::config::ChatConfig;
use crate::error::{user_message, Result};
use crate::slot::RequestSlot;
use crate::types::{Document, Message, Source};

use futures::StreamExt;
use std::sync::Arc;
use tokio::sync::watch;

/// Assistant reply used whenever a question could not be answered
pub const FALLBACK_MESSAGE: &str =
    "Sorry, I encountered an error processing your request. Please try again.";

/// Observable chat state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChatState {
    /// Append-only message log
    pub messages: Vec<Message>,
    /// A question is awaiting its answer
    pub is_loading: bool,
    /// Document the current log is about
    pub scope: Option<i64>,
}

/// Result of one `send_message` call
#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Blank input; nothing happened
    Ignored,
    /// The backend answered
    Answered {
        /// Appended assistant message
        message: Message,
        /// Retrieved chunks the answer is based on
        sources: Vec<Source>,
    },
    /// The request failed and the fallback reply was appended
    Fallback(Message),
    /// Another question is outstanding; nothing was changed
    Busy,
}

impl SendOutcome {
    /// The appended assistant message, if any
    pub fn message(&self) -> Option<&Message> {
        match self {
            SendOutcome::Answered { message, .. } | SendOutcome::Fallback(message) => Some(message),
            SendOutcome::Ignored | SendOutcome::Busy => None,
        }
    }
}

/// Incremental UTF-8 decoder for streamed bytes
///
/// Chunk boundaries may split a multi-byte character; the incomplete tail
/// is held back until the next chunk arrives.
#[derive(Debug, Default)]
pub struct Utf8Accumulator {
    pending: Vec<u8>,
}

impl Utf8Accumulator {
    /// Feed bytes, returning the text that is now complete
    pub fn push(&mut self, bytes: &[u8]) -> String {
        self.pending.extend_from_slice(bytes);

        let mut text = String::new();
        let mut start = 0;
        loop {
            match std::str::from_utf8(&self.pending[start..]) {
                Ok(valid) => {
                    text.push_str(valid);
                    start = self.pending.len();
                    break;
                }
                Err(e) => {
                    let valid_up_to = start + e.valid_up_to();
                    text.push_str(&String::from_utf8_lossy(&self.pending[start..valid_up_to]));
                    match e.error_len() {
                        Some(bad) => {
                            text.push(char::REPLACEMENT_CHARACTER);
                            start = valid_up_to + bad;
                        }
                        None => {
                            start = valid_up_to;
                            break;
                        }
                    }
                }
            }
        }

        self.pending.drain(..start);
        text
    }

    /// Flush whatever is left, replacing invalid bytes
    pub fn finish(&mut self) -> String {
        let text = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        text
    }
}

/// Coordinates the message log and backend chat calls
pub struct ChatOrchestrator {
    api: Arc<dyn RagApi>,
    state: watch::Sender<ChatState>,
    slot: RequestSlot,
    stream: bool,
}

impl ChatOrchestrator {
    /// Create an orchestrator with an empty log
    pub fn new(api: Arc<dyn RagApi>, config: &ChatConfig) -> Self {
        let (state, _) = watch::channel(ChatState::default());
        Self {
            api,
            state,
            slot: RequestSlot::new(),
            stream: config.stream,
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> ChatState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<ChatState> {
        self.state.subscribe()
    }

    /// Copy of the message log
    pub fn messages(&self) -> Vec<Message> {
        self.state.borrow().messages.clone()
    }

    /// Whether answers are requested as a stream
    pub fn is_streaming(&self) -> bool {
        self.stream
    }

    /// Empty the message log
    pub fn clear_messages(&self) {
        self.state.send_modify(|s| {
            s.messages.clear();
            s.scope = None;
        });
    }

    /// Ask a question about `document`
    ///
    /// See [`ChatOrchestrator::send_message_with`].
    pub async fn send_message(&self, content: &str, document: Option<&Document>) -> SendOutcome {
        self.send_message_with(content, document, |_| {}).await
    }

    /// Ask a question, forwarding streamed text to `on_chunk` as it arrives
    ///
    /// Blank input is ignored. The trimmed question is appended before the
    /// request is issued; when it is answered the reply is appended,
    /// otherwise [`FALLBACK_MESSAGE`] is. When the log belongs to another
    /// document it is cleared first.
    ///
    /// # Arguments
    ///
    /// * `content` - Question text
    /// * `document` - Active document, if any
    /// * `on_chunk` - Observer for streamed text; not called for
    ///   non-streaming replies
    pub async fn send_message_with<F>(
        &self,
        content: &str,
        document: Option<&Document>,
        on_chunk: F,
    ) -> SendOutcome
    where
        F: FnMut(&str) + Send,
    {
        self.send_scoped(content, document.map(|d| d.id), on_chunk).await
    }

    /// Ask a question about the document with id `scope`
    ///
    /// Used when only the server-side id of a document is known.
    pub async fn send_scoped<F>(
        &self,
        content: &str,
        scope: Option<i64>,
        mut on_chunk: F,
    ) -> SendOutcome
    where
        F: FnMut(&str) + Send,
    {
        let question = content.trim();
        if question.is_empty() {
            return SendOutcome::Ignored;
        }

        let Some(_guard) = self.slot.try_acquire() else {
            tracing::warn!("Message rejected: a reply is still pending");
            return SendOutcome::Busy;
        };

        self.state.send_modify(|s| {
            if s.scope != scope {
                if !s.messages.is_empty() {
                    tracing::debug!(old = ?s.scope, new = ?scope, "Document changed, clearing chat");
                }
                s.messages.clear();
                s.scope = scope;
            }
            s.messages.push(Message::user(question));
            s.is_loading = true;
        });

        let request = ChatRequest {
            message: question.to_string(),
            document_ids: scope.into_iter().collect(),
            stream: self.stream,
        };

        let outcome = match self.exchange(&request, &mut on_chunk).await {
            Ok((text, sources)) if !text.trim().is_empty() => {
                tracing::info!(
                    chars = text.len(),
                    sources = sources.len(),
                    "Received answer"
                );
                SendOutcome::Answered {
                    message: Message::assistant(text),
                    sources,
                }
            }
            Ok(_) => {
                tracing::warn!("Backend returned an empty answer");
                SendOutcome::Fallback(Message::assistant(FALLBACK_MESSAGE))
            }
            Err(err) => {
                tracing::warn!("Chat request failed: {}", user_message(&err));
                SendOutcome::Fallback(Message::assistant(FALLBACK_MESSAGE))
            }
        };

        self.state.send_modify(|s| {
            if let Some(message) = outcome.message() {
                s.messages.push(message.clone());
            }
            s.is_loading = false;
        });

        outcome
    }

    async fn exchange<F>(
        &self,
        request: &ChatRequest,
        on_chunk: &mut F,
    ) -> Result<(String, Vec<Source>)>
    where
        F: FnMut(&str) + Send,
    {
        match self.api.chat(request).await? {
            ChatReply::Complete(reply) => Ok((reply.response, reply.sources)),
            ChatReply::Stream(mut stream) => {
                let mut decoder = Utf8Accumulator::default();
                let mut answer = String::new();
                while let Some(chunk) = stream.next().await {
                    let text = decoder.push(&chunk?);
                    if !text.is_empty() {
                        on_chunk(&text);
                        answer.push_str(&text);
                    }
                }
                let tail = decoder.finish();
                if !tail.is_empty() {
                    on_chunk(&tail);
                    answer.push_str(&tail);
                }
                Ok((answer, Vec::new()))
            }
        }
    }
}
