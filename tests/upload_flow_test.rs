//! Upload orchestration end to end against a mock backend

mod common;

use common::{client_for, create_temp_storage, write_file};
use ragchat::config::{ProgressMode, UploadConfig};
use ragchat::storage::{KeyValueStore, TOKEN_KEY};
use ragchat::types::DocumentKind;
use ragchat::upload::{UploadOrchestrator, UploadOutcome, FILE_TOO_LARGE, UNSUPPORTED_TYPE};
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn upload_record(id: i64, filename: &str, content: Option<&str>) -> serde_json::Value {
    json!({
        "id": id,
        "filename": filename,
        "content": content,
        "created_at": "2024-05-01T12:00:00",
        "file_hash": "abc123"
    })
}

async fn orchestrator(server: &MockServer, mode: ProgressMode) -> (UploadOrchestrator, TempDir) {
    let (storage, dir) = create_temp_storage();
    storage.set(TOKEN_KEY, "abc").unwrap();
    let api = Arc::new(client_for(&server.uri(), storage));
    let config = UploadConfig {
        progress_mode: mode,
        progress_interval_ms: 10,
        progress_reset_ms: 50,
        ..Default::default()
    };
    (UploadOrchestrator::new(api, config), dir)
}

async fn mount_rejecting_upload(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/documents/upload"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_text_file_content_matches_exactly() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/documents/upload"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upload_record(
            11,
            "story.txt",
            Some("server side text that must not replace local text"),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let (uploads, dir) = orchestrator(&server, ProgressMode::Transport).await;
    let text = "Line one\r\nLine two\n\ttabbed ✓\n";
    let path = write_file(&dir, "story.txt", text.as_bytes());

    let outcome = uploads.upload_document(&path).await;

    let UploadOutcome::Completed(doc) = outcome else {
        panic!("expected completed upload, got {:?}", outcome);
    };
    assert_eq!(doc.id, 11);
    assert_eq!(doc.kind, DocumentKind::Txt);
    assert_eq!(doc.content, text);
    assert_eq!(doc.size, text.len() as u64);
    assert_eq!(uploads.state().progress, 100);
    assert!(uploads.state().error.is_none());
}

#[tokio::test]
async fn test_pdf_uses_server_extracted_text() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/documents/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upload_record(
            12,
            "paper.pdf",
            Some("Extracted abstract"),
        )))
        .mount(&server)
        .await;

    let (uploads, dir) = orchestrator(&server, ProgressMode::Transport).await;
    let path = write_file(&dir, "paper.pdf", b"%PDF-1.4 binary");

    let UploadOutcome::Completed(doc) = uploads.upload_document(&path).await else {
        panic!("expected completed upload");
    };
    assert_eq!(doc.kind, DocumentKind::Pdf);
    assert_eq!(doc.content, "Extracted abstract");
}

#[tokio::test]
async fn test_unsupported_type_makes_no_request() {
    let server = MockServer::start().await;
    mount_rejecting_upload(&server).await;

    let (uploads, dir) = orchestrator(&server, ProgressMode::Transport).await;

    for name in ["photo.jpg", "README", "archive.tar.gz", "slides.PPTX", "notes.md.bak", ".txt"] {
        let path = write_file(&dir, name, b"\xff\xd8\xff");

        let outcome = uploads.upload_document(&path).await;

        assert_eq!(
            outcome,
            UploadOutcome::Failed(UNSUPPORTED_TYPE.to_string()),
            "{}",
            name
        );
        assert_eq!(uploads.state().error.as_deref(), Some(UNSUPPORTED_TYPE));
        assert!(uploads.document().is_none());
    }
}

#[tokio::test]
async fn test_oversize_file_makes_no_request() {
    let server = MockServer::start().await;
    mount_rejecting_upload(&server).await;

    let (uploads, dir) = orchestrator(&server, ProgressMode::Transport).await;
    let path = dir.path().join("big.txt");
    let file = std::fs::File::create(&path).unwrap();
    file.set_len(10 * 1024 * 1024 + 1).unwrap();

    let outcome = uploads.upload_document(&path).await;

    assert_eq!(outcome, UploadOutcome::Failed(FILE_TOO_LARGE.to_string()));
    assert!(!uploads.state().is_uploading);
}

#[tokio::test]
async fn test_server_rejection_clears_uploading() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/documents/upload"))
        .respond_with(ResponseTemplate::new(413).set_body_json(json!({"detail": "Too large"})))
        .mount(&server)
        .await;

    let (uploads, dir) = orchestrator(&server, ProgressMode::Simulated).await;
    let path = write_file(&dir, "a.md", b"# hi");

    let outcome = uploads.upload_document(&path).await;

    assert_eq!(outcome, UploadOutcome::Failed("Too large".to_string()));
    let state = uploads.state();
    assert!(!state.is_uploading);
    assert_eq!(state.progress, 0);
    assert!(state.document.is_none());
}

#[tokio::test]
async fn test_progress_stays_below_completion_until_done() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/documents/upload"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(upload_record(3, "big.txt", None))
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .mount(&server)
        .await;

    let (uploads, dir) = orchestrator(&server, ProgressMode::Transport).await;
    let body = "x".repeat(300 * 1024);
    let path = write_file(&dir, "big.txt", body.as_bytes());
    let mut rx = uploads.subscribe();

    let watcher = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            let state = rx.borrow().clone();
            seen.push((state.is_uploading, state.progress));
            if state.document.is_some() && state.progress == 0 {
                break;
            }
        }
        seen
    });

    assert!(matches!(
        uploads.upload_document(&path).await,
        UploadOutcome::Completed(_)
    ));
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;
    let seen = tokio::time::timeout(std::time::Duration::from_secs(2), watcher)
        .await
        .unwrap()
        .unwrap();

    assert!(seen
        .iter()
        .filter(|(uploading, _)| *uploading)
        .all(|(_, p)| *p <= 90));
    assert!(seen.iter().any(|(uploading, p)| !*uploading && *p == 100));
    assert_eq!(uploads.state().progress, 0);
}
