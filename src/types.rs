//! Core data model shared by the session store, orchestrators, and API client
//!
//! Client-side records (`Document`, `Message`, `User`) are kept separate from
//! the backend wire shapes (`DocumentRecord`, `ChatResponse`) so that the
//! orchestrators decide how server data is materialized.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Supported document kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    /// Portable Document Format; text is extracted server-side
    Pdf,
    /// Plain text
    Txt,
    /// Markdown
    Md,
}

impl DocumentKind {
    /// Kind for a lowercase file extension, if supported
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "pdf" => Some(Self::Pdf),
            "txt" => Some(Self::Txt),
            "md" => Some(Self::Md),
            _ => None,
        }
    }

    /// Kind for a MIME type, if supported
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/pdf" => Some(Self::Pdf),
            "text/plain" => Some(Self::Txt),
            "text/markdown" => Some(Self::Md),
            _ => None,
        }
    }

    /// MIME type sent with the multipart upload
    pub fn mime(&self) -> &'static str {
        match self {
            Self::Pdf => "application/pdf",
            Self::Txt => "text/plain",
            Self::Md => "text/markdown",
        }
    }

    /// Whether content can be read locally as text
    pub fn is_text(&self) -> bool {
        !matches!(self, Self::Pdf)
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pdf => "pdf",
            Self::Txt => "txt",
            Self::Md => "md",
        };
        write!(f, "{}", s)
    }
}

/// The active document a chat session refers to
///
/// A `Document` only exists once its content is fully materialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Server-assigned identifier
    pub id: i64,
    /// Display name (original file name)
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Document kind
    pub kind: DocumentKind,
    /// Full textual content
    pub content: String,
    /// When the upload completed
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    /// First `max_chars` characters of the content, with an ellipsis when cut
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.content.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{}...", head)
        } else {
            head
        }
    }
}

/// Who authored a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The person at the keyboard
    User,
    /// The backend's answer
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// A single immutable chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Unique identifier
    pub id: Uuid,
    /// Author role
    pub role: Role,
    /// Message text
    pub content: String,
    /// Creation time
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a user message stamped now
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Create an assistant message stamped now
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Authenticated identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Opaque identifier
    pub id: String,
    /// Email address (lowercase)
    pub email: String,
    /// Display name
    pub name: String,
    /// Optional avatar URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
}

/// Document record as returned by the backend
///
/// The list endpoint omits `content` and `file_hash`, so both are optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    /// Server-assigned identifier
    pub id: i64,
    /// Stored file name
    pub filename: String,
    /// Extracted text
    #[serde(default)]
    pub content: Option<String>,
    /// Upload timestamp
    #[serde(deserialize_with = "deserialize_server_time")]
    pub created_at: DateTime<Utc>,
    /// Content hash used by the backend for duplicate detection
    #[serde(default)]
    pub file_hash: Option<String>,
}

/// Accept RFC 3339 timestamps as well as the naive ISO form the backend
/// emits for timezone-less columns (interpreted as UTC).
fn deserialize_server_time<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(serde::de::Error::custom)
}

/// A retrieved chunk backing an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    /// Document the chunk belongs to
    pub document_id: i64,
    /// Chunk text
    pub content: String,
    /// Position of the chunk within the document
    pub chunk_index: i64,
}

/// Non-streaming chat answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    /// Generated answer text
    pub response: String,
    /// Supporting chunks
    #[serde(default)]
    pub sources: Vec<Source>,
}

/// Human-readable file size: bytes, then KB and MB with one decimal
///
/// # Examples
///
/// ```
/// use ragchat::types::format_file_size;
///
/// assert_eq!(format_file_size(512), "512 B");
/// assert_eq!(format_file_size(1536), "1.5 KB");
/// assert_eq!(format_file_size(3 * 1024 * 1024), "3.0 MB");
/// ```
pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}
