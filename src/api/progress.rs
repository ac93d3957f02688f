//! Request bodies that report how many bytes the transport has consumed

use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::sync::Arc;

/// Callback invoked with `(bytes_sent, bytes_total)` as the body is written
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Size of each body chunk handed to the transport
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Wrap `data` in a streaming body that reports progress per chunk
///
/// The transport pulls one chunk at a time, so the callback advances as
/// bytes are actually written rather than on a timer.
pub fn counting_body(data: Bytes, progress: ProgressFn) -> reqwest::Body {
    let total = data.len() as u64;
    let chunks = split(data);
    let mut sent = 0u64;

    let body = stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        progress(sent, total);
        Ok::<Bytes, std::io::Error>(chunk)
    });

    reqwest::Body::wrap_stream(body)
}

fn split(data: Bytes) -> Vec<Bytes> {
    let mut chunks = Vec::with_capacity(data.len() / CHUNK_SIZE + 1);
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + CHUNK_SIZE).min(data.len());
        chunks.push(data.slice(offset..end));
        offset = end;
    }
    chunks
}
