//! Document upload orchestration
//!
//! Validates a local file, uploads it, reports progress, and materializes the
//! single active [`Document`]. State is observable through a
//! [`tokio::sync::watch`] channel so a front end can render progress while
//! the upload runs.
//!
//! Progress comes from the transport by default (bytes written to the
//! request body). The simulated timer is only used when
//! [`ProgressMode::Simulated`] is configured. In both modes progress stops
//! at [`PROGRESS_CEILING`] until the upload has actually completed.

use crate::api::{ProgressFn, RagApi, UploadFile};
use crate::config::{ProgressMode, UploadConfig};
use crate::error::user_message;
use crate::slot::RequestSlot;
use crate::types::{Document, DocumentKind, DocumentRecord};

use bytes::Bytes;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Highest value progress reaches before completion
pub const PROGRESS_CEILING: u8 = 90;

/// Largest accepted file: 10 MiB
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Increment of the simulated progress timer
pub const SIMULATED_STEP: u8 = 10;

/// Message for files of an unsupported type
pub const UNSUPPORTED_TYPE: &str = "Unsupported file type. Please upload PDF, TXT, or MD files.";

/// Message for files above [`MAX_FILE_SIZE`]
pub const FILE_TOO_LARGE: &str = "File size exceeds 10MB limit.";

/// Message when an upload is attempted while a document is active
pub const DOCUMENT_ACTIVE: &str = "A document is already loaded. Clear it before uploading another.";

/// Observable upload state
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UploadState {
    /// The active document
    pub document: Option<Document>,
    /// An upload is running
    pub is_uploading: bool,
    /// Progress, 0..=100
    pub progress: u8,
    /// Last user-facing error
    pub error: Option<String>,
}

/// Result of one `upload_document` call
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// The document is now active
    Completed(Document),
    /// Validation or upload failed; the message is also in [`UploadState::error`]
    Failed(String),
    /// Another upload was outstanding; nothing was changed
    Busy,
}

/// Facts about a candidate file needed for validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// File name including extension
    pub name: String,
    /// MIME type, when known
    pub mime: Option<String>,
    /// Size in bytes
    pub size: u64,
}

impl FileInfo {
    /// Lowercase extension of the file name
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
    }
}

/// MIME type implied by a file name's extension
pub fn mime_for_name(name: &str) -> Option<&'static str> {
    let ext = Path::new(name).extension()?.to_string_lossy().to_lowercase();
    DocumentKind::from_extension(&ext).map(|kind| kind.mime())
}

/// Reject unsupported or oversized files before any network I/O
///
/// A file is accepted when either its MIME type or its extension is
/// supported. The type check runs before the size check.
///
/// # Examples
///
/// ```
/// use ragchat::upload::{validate_file, FileInfo, FILE_TOO_LARGE, MAX_FILE_SIZE, UNSUPPORTED_TYPE};
///
/// let ok = FileInfo { name: "notes.md".into(), mime: None, size: 12 };
/// assert!(validate_file(&ok).is_ok());
///
/// let exe = FileInfo { name: "tool.exe".into(), mime: None, size: 12 };
/// assert_eq!(validate_file(&exe).unwrap_err(), UNSUPPORTED_TYPE);
///
/// let big = FileInfo { name: "big.txt".into(), mime: None, size: MAX_FILE_SIZE + 1 };
/// assert_eq!(validate_file(&big).unwrap_err(), FILE_TOO_LARGE);
/// ```
pub fn validate_file(file: &FileInfo) -> Result<DocumentKind, &'static str> {
    let by_mime = file.mime.as_deref().and_then(DocumentKind::from_mime);
    let by_ext = file
        .extension()
        .as_deref()
        .and_then(DocumentKind::from_extension);

    if by_mime.is_none() && by_ext.is_none() {
        return Err(UNSUPPORTED_TYPE);
    }

    if file.size > MAX_FILE_SIZE {
        return Err(FILE_TOO_LARGE);
    }

    Ok(file_kind(file))
}

/// Kind of a file: extension wins, then MIME type, then plain text
pub fn file_kind(file: &FileInfo) -> DocumentKind {
    match file.extension().as_deref() {
        Some("md") => DocumentKind::Md,
        Some("txt") => DocumentKind::Txt,
        Some("pdf") => DocumentKind::Pdf,
        _ => file
            .mime
            .as_deref()
            .and_then(DocumentKind::from_mime)
            .unwrap_or(DocumentKind::Txt),
    }
}

/// Text content of an uploaded file
///
/// Text-like files are decoded locally, so their content equals the file's
/// text exactly. PDFs rely on the server's extraction; a placeholder is used
/// when the server returned none.
pub fn document_content(
    kind: DocumentKind,
    name: &str,
    data: &[u8],
    record: &DocumentRecord,
) -> String {
    if kind.is_text() {
        return String::from_utf8_lossy(data).into_owned();
    }

    match record.content.as_deref() {
        Some(text) if !text.trim().is_empty() => text.to_string(),
        _ => format!(
            "[PDF Document: {}]\n\nThe server did not return extracted text for this PDF.\n\nUpload TXT or MD files for full text analysis.",
            name
        ),
    }
}

/// Coordinates a single active document and its upload
pub struct UploadOrchestrator {
    api: Arc<dyn RagApi>,
    config: UploadConfig,
    state: Arc<watch::Sender<UploadState>>,
    slot: RequestSlot,
    // Bumped when an upload starts or the document is cleared; a pending
    // progress reset only applies to the generation it was scheduled for.
    generation: Arc<AtomicU64>,
}

impl UploadOrchestrator {
    /// Create an orchestrator with no active document
    pub fn new(api: Arc<dyn RagApi>, config: UploadConfig) -> Self {
        let (state, _) = watch::channel(UploadState::default());
        Self {
            api,
            config,
            state: Arc::new(state),
            slot: RequestSlot::new(),
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Snapshot of the current state
    pub fn state(&self) -> UploadState {
        self.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn subscribe(&self) -> watch::Receiver<UploadState> {
        self.state.subscribe()
    }

    /// The active document, if any
    pub fn document(&self) -> Option<Document> {
        self.state.borrow().document.clone()
    }

    /// Drop the active document and reset error and progress
    pub fn clear_document(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.state.send_modify(|s| {
            s.document = None;
            s.error = None;
            s.progress = 0;
        });
        tracing::debug!("Cleared active document");
    }

    /// Validate, upload, and activate the file at `path`
    pub async fn upload_document(&self, path: &Path) -> UploadOutcome {
        let Some(_guard) = self.slot.try_acquire() else {
            tracing::warn!("Upload rejected: another upload is in progress");
            return UploadOutcome::Busy;
        };

        self.state.send_modify(|s| s.error = None);

        if self.state.borrow().document.is_some() {
            return self.fail(DOCUMENT_ACTIVE.to_string());
        }

        let info = match file_info(path).await {
            Ok(info) => info,
            Err(message) => return self.fail(message),
        };

        let kind = match validate_file(&info) {
            Ok(kind) => kind,
            Err(message) => {
                tracing::info!(name = %info.name, size = info.size, "Rejected file: {}", message);
                return self.fail(message.to_string());
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
        self.state.send_modify(|s| {
            s.is_uploading = true;
            s.progress = 0;
        });

        let (progress_fn, timer) = self.start_progress();
        let result = self.transfer(path, &info, kind, progress_fn).await;
        if let Some(timer) = timer {
            timer.abort();
        }

        match result {
            Ok(document) => {
                tracing::info!(
                    id = document.id,
                    name = %document.name,
                    kind = %document.kind,
                    "Document uploaded"
                );
                self.state.send_modify(|s| {
                    s.document = Some(document.clone());
                    s.is_uploading = false;
                    s.progress = 100;
                });
                self.schedule_progress_reset(generation);
                UploadOutcome::Completed(document)
            }
            Err(err) => {
                let message = user_message(&err);
                tracing::warn!("Upload failed: {}", message);
                self.state.send_modify(|s| {
                    s.is_uploading = false;
                    s.progress = 0;
                    s.error = Some(message.clone());
                });
                UploadOutcome::Failed(message)
            }
        }
    }

    async fn transfer(
        &self,
        path: &Path,
        info: &FileInfo,
        kind: DocumentKind,
        progress: Option<ProgressFn>,
    ) -> crate::error::Result<Document> {
        let data = Bytes::from(tokio::fs::read(path).await?);

        let file = UploadFile {
            name: info.name.clone(),
            mime: kind.mime(),
            data: data.clone(),
        };
        let record = self.api.upload_document(file, progress).await?;
        let content = document_content(kind, &info.name, &data, &record);

        Ok(Document {
            id: record.id,
            name: info.name.clone(),
            size: info.size,
            kind,
            content,
            uploaded_at: record.created_at,
        })
    }

    /// Set up progress reporting for the configured mode
    fn start_progress(&self) -> (Option<ProgressFn>, Option<JoinHandle<()>>) {
        match self.config.progress_mode {
            ProgressMode::Transport => {
                let state = Arc::clone(&self.state);
                let report: ProgressFn = Arc::new(move |sent, total| {
                    let pct = transport_progress(sent, total);
                    state.send_if_modified(|s| {
                        if s.is_uploading && pct > s.progress {
                            s.progress = pct;
                            true
                        } else {
                            false
                        }
                    });
                });
                (Some(report), None)
            }
            ProgressMode::Simulated => {
                let state = Arc::clone(&self.state);
                let period = Duration::from_millis(self.config.progress_interval_ms);
                let timer = tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(period);
                    ticker.tick().await;
                    loop {
                        ticker.tick().await;
                        let still_running = state.send_if_modified(|s| {
                            if !s.is_uploading {
                                return false;
                            }
                            s.progress = s.progress.saturating_add(SIMULATED_STEP).min(PROGRESS_CEILING);
                            true
                        });
                        if !still_running && !state.borrow().is_uploading {
                            break;
                        }
                    }
                });
                (None, Some(timer))
            }
        }
    }

    fn schedule_progress_reset(&self, generation: u64) {
        let state = Arc::clone(&self.state);
        let current = Arc::clone(&self.generation);
        let delay = Duration::from_millis(self.config.progress_reset_ms);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            state.send_if_modified(|s| {
                let same_upload = current.load(Ordering::Acquire) == generation;
                if same_upload && !s.is_uploading && s.progress == 100 {
                    s.progress = 0;
                    true
                } else {
                    false
                }
            });
        });
    }

    fn fail(&self, message: String) -> UploadOutcome {
        self.state.send_modify(|s| s.error = Some(message.clone()));
        UploadOutcome::Failed(message)
    }
}

/// Map transport bytes to a percentage capped at [`PROGRESS_CEILING`]
pub fn transport_progress(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return PROGRESS_CEILING;
    }
    let pct = sent.min(total) * u64::from(PROGRESS_CEILING) / total;
    pct as u8
}

async fn file_info(path: &Path) -> Result<FileInfo, String> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;

    if !metadata.is_file() {
        return Err(format!("{} is not a file", path.display()));
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(FileInfo {
        mime: mime_for_name(&name).map(str::to_string),
        name,
        size: metadata.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_file, temp_dir, FakeApi};
    use proptest::prelude::*;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn orchestrator(api: FakeApi, mode: ProgressMode) -> UploadOrchestrator {
        let config = UploadConfig {
            progress_mode: mode,
            progress_interval_ms: 5,
            progress_reset_ms: 20,
            ..Default::default()
        };
        UploadOrchestrator::new(Arc::new(api), config)
    }

    #[test]
    fn test_validate_accepts_by_mime_without_extension() {
        let info = FileInfo {
            name: "README".to_string(),
            mime: Some("text/markdown".to_string()),
            size: 10,
        };
        assert_eq!(validate_file(&info), Ok(DocumentKind::Md));
    }

    #[test]
    fn test_validate_extension_is_case_insensitive() {
        let info = FileInfo {
            name: "Report.PDF".to_string(),
            mime: None,
            size: 10,
        };
        assert_eq!(validate_file(&info), Ok(DocumentKind::Pdf));
    }

    #[test]
    fn test_validate_type_checked_before_size() {
        let info = FileInfo {
            name: "huge.exe".to_string(),
            mime: None,
            size: u64::MAX,
        };
        assert_eq!(validate_file(&info), Err(UNSUPPORTED_TYPE));
    }

    #[test]
    fn test_size_at_limit_is_accepted() {
        let info = FileInfo {
            name: "a.txt".to_string(),
            mime: None,
            size: MAX_FILE_SIZE,
        };
        assert!(validate_file(&info).is_ok());
    }

    #[test]
    fn test_size_error_names_the_ceiling() {
        assert_eq!(MAX_FILE_SIZE, 10 * 1024 * 1024);
        assert!(FILE_TOO_LARGE.contains("10MB"));
    }

    #[test]
    fn test_transport_progress_capped() {
        assert_eq!(transport_progress(0, 100), 0);
        assert_eq!(transport_progress(50, 100), 45);
        assert_eq!(transport_progress(100, 100), PROGRESS_CEILING);
        assert_eq!(transport_progress(500, 100), PROGRESS_CEILING);
        assert_eq!(transport_progress(0, 0), PROGRESS_CEILING);
    }

    #[test]
    fn test_pdf_placeholder_when_server_has_no_text() {
        let record = DocumentRecord {
            id: 1,
            filename: "x.pdf".to_string(),
            content: Some("   ".to_string()),
            created_at: chrono::Utc::now(),
            file_hash: None,
        };
        let content = document_content(DocumentKind::Pdf, "x.pdf", b"%PDF-1.4", &record);
        assert!(content.starts_with("[PDF Document: x.pdf]"));
    }

    #[tokio::test]
    async fn test_unsupported_file_sets_error_without_network() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "image.png", "not really");
        let api = FakeApi::default();
        let calls = api.calls();
        let uploads = orchestrator(api, ProgressMode::Transport);

        let outcome = uploads.upload_document(&path).await;

        assert_eq!(outcome, UploadOutcome::Failed(UNSUPPORTED_TYPE.to_string()));
        assert_eq!(uploads.state().error.as_deref(), Some(UNSUPPORTED_TYPE));
        assert!(!uploads.state().is_uploading);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_text_upload_round_trips_content() {
        let dir = temp_dir();
        let text = "# Title\n\nSome *markdown* with ünïcode.\n";
        let path = create_test_file(&dir, "notes.md", text);
        let uploads = orchestrator(FakeApi::default(), ProgressMode::Transport);

        let outcome = uploads.upload_document(&path).await;

        let UploadOutcome::Completed(doc) = outcome else {
            panic!("expected completed upload, got {:?}", outcome);
        };
        assert_eq!(doc.content, text);
        assert_eq!(doc.kind, DocumentKind::Md);
        assert_eq!(doc.size, text.len() as u64);

        let state = uploads.state();
        assert_eq!(state.document, Some(doc));
        assert_eq!(state.progress, 100);
        assert!(!state.is_uploading);
    }

    #[tokio::test]
    async fn test_progress_resets_after_completion() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "a.txt", "hello");
        let uploads = orchestrator(FakeApi::default(), ProgressMode::Transport);

        uploads.upload_document(&path).await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(uploads.state().progress, 0);
        assert!(uploads.document().is_some());
    }

    #[tokio::test]
    async fn test_stale_reset_does_not_clear_next_upload() {
        let dir = temp_dir();
        let first = create_test_file(&dir, "a.txt", "one");
        let second = create_test_file(&dir, "b.txt", "two");
        let config = UploadConfig {
            progress_reset_ms: 200,
            ..Default::default()
        };
        let uploads = UploadOrchestrator::new(Arc::new(FakeApi::default()), config);

        uploads.upload_document(&first).await;
        tokio::time::sleep(Duration::from_millis(150)).await;
        uploads.clear_document();
        assert!(matches!(
            uploads.upload_document(&second).await,
            UploadOutcome::Completed(_)
        ));
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(uploads.state().progress, 100);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(uploads.state().progress, 0);
    }

    #[tokio::test]
    async fn test_rejected_upload_keeps_pending_reset() {
        let dir = temp_dir();
        let first = create_test_file(&dir, "a.txt", "one");
        let second = create_test_file(&dir, "b.txt", "two");
        let uploads = orchestrator(FakeApi::default(), ProgressMode::Transport);

        uploads.upload_document(&first).await;
        assert_eq!(
            uploads.upload_document(&second).await,
            UploadOutcome::Failed(DOCUMENT_ACTIVE.to_string())
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(uploads.state().progress, 0);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn test_text_content_equals_file_text(
            text in any::<String>(),
            markdown in any::<bool>(),
        ) {
            let dir = temp_dir();
            let name = if markdown { "doc.md" } else { "doc.txt" };
            let path = create_test_file(&dir, name, &text);
            let uploads = orchestrator(FakeApi::default(), ProgressMode::Transport);

            let outcome = block_on(uploads.upload_document(&path));

            let UploadOutcome::Completed(doc) = outcome else {
                return Err(TestCaseError::fail(format!("upload failed: {:?}", outcome)));
            };
            prop_assert_eq!(doc.content, text);
        }

        #[test]
        fn test_unsupported_extension_is_rejected_without_request(
            ext in "[a-z0-9]{1,6}".prop_filter("supported", |e| {
                DocumentKind::from_extension(e).is_none()
            }),
        ) {
            let dir = temp_dir();
            let path = create_test_file(&dir, &format!("file.{}", ext), "data");
            let api = FakeApi::default();
            let calls = api.calls();
            let uploads = orchestrator(api, ProgressMode::Transport);

            let outcome = block_on(uploads.upload_document(&path));

            prop_assert_eq!(outcome, UploadOutcome::Failed(UNSUPPORTED_TYPE.to_string()));
            prop_assert!(calls.lock().unwrap().is_empty());
        }

        #[test]
        fn test_any_size_above_ceiling_is_rejected(
            excess in 1..=u64::MAX - MAX_FILE_SIZE,
            ext in prop::sample::select(vec!["pdf", "txt", "md"]),
        ) {
            let info = FileInfo {
                name: format!("big.{}", ext),
                mime: None,
                size: MAX_FILE_SIZE + excess,
            };
            prop_assert_eq!(validate_file(&info), Err(FILE_TOO_LARGE));
        }

        #[test]
        fn test_oversize_file_is_rejected_without_request(
            excess in 1u64..=4 * 1024 * 1024,
            ext in prop::sample::select(vec!["pdf", "txt", "md"]),
        ) {
            let dir = temp_dir();
            let path = dir.path().join(format!("big.{}", ext));
            std::fs::File::create(&path)
                .and_then(|f| f.set_len(MAX_FILE_SIZE + excess))
                .unwrap();
            let api = FakeApi::default();
            let calls = api.calls();
            let uploads = orchestrator(api, ProgressMode::Transport);

            let outcome = block_on(uploads.upload_document(&path));

            prop_assert_eq!(outcome, UploadOutcome::Failed(FILE_TOO_LARGE.to_string()));
            prop_assert!(calls.lock().unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn test_simulated_progress_never_exceeds_ceiling_while_uploading() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "a.txt", "hello");
        let api = FakeApi::default().with_delay(Duration::from_millis(150));
        let uploads = Arc::new(orchestrator(api, ProgressMode::Simulated));
        let mut rx = uploads.subscribe();

        let task = {
            let uploads = Arc::clone(&uploads);
            let path = path.clone();
            tokio::spawn(async move { uploads.upload_document(&path).await })
        };

        let mut max_while_uploading = 0;
        while rx.changed().await.is_ok() {
            let s = rx.borrow().clone();
            if s.is_uploading {
                max_while_uploading = max_while_uploading.max(s.progress);
            } else if s.document.is_some() {
                break;
            }
        }

        assert!(matches!(task.await.unwrap(), UploadOutcome::Completed(_)));
        assert!(max_while_uploading > 0);
        assert!(max_while_uploading <= PROGRESS_CEILING);
    }

    #[tokio::test]
    async fn test_second_upload_requires_clear() {
        let dir = temp_dir();
        let first = create_test_file(&dir, "a.txt", "one");
        let second = create_test_file(&dir, "b.txt", "two");
        let api = FakeApi::default();
        let calls = api.calls();
        let uploads = orchestrator(api, ProgressMode::Transport);

        uploads.upload_document(&first).await;
        let outcome = uploads.upload_document(&second).await;
        assert_eq!(outcome, UploadOutcome::Failed(DOCUMENT_ACTIVE.to_string()));
        assert_eq!(calls.lock().unwrap().len(), 1);

        uploads.clear_document();
        let state = uploads.state();
        assert!(state.document.is_none());
        assert!(state.error.is_none());
        assert_eq!(state.progress, 0);

        assert!(matches!(
            uploads.upload_document(&second).await,
            UploadOutcome::Completed(_)
        ));
    }

    #[tokio::test]
    async fn test_concurrent_upload_is_rejected() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "a.txt", "hello");
        let api = FakeApi::default().with_delay(Duration::from_millis(50));
        let calls = api.calls();
        let uploads = orchestrator(api, ProgressMode::Transport);

        let (a, b) = tokio::join!(uploads.upload_document(&path), uploads.upload_document(&path));

        let outcomes = [a, b];
        assert_eq!(
            outcomes.iter().filter(|o| **o == UploadOutcome::Busy).count(),
            1
        );
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_server_failure_surfaces_detail() {
        let dir = temp_dir();
        let path = create_test_file(&dir, "a.txt", "hello");
        let api = FakeApi::default().failing_upload(409, "Document already exists");
        let uploads = orchestrator(api, ProgressMode::Transport);

        let outcome = uploads.upload_document(&path).await;

        assert_eq!(
            outcome,
            UploadOutcome::Failed("Document already exists".to_string())
        );
        let state = uploads.state();
        assert!(!state.is_uploading);
        assert!(state.document.is_none());
        assert_eq!(state.progress, 0);
    }
}
