//! Chunked upload to a one-time upload URL.
//!
//! Chunks for a single file are strictly sequential: each chunk's starting
//! offset comes from the server's echoed range for the previous chunk, so
//! there is no parallel sub-chunking. Distinct files upload concurrently
//! via [`crate::transfer::queue::Uploader`].

use std::path::PathBuf;
use std::sync::Arc;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde_json::Value;
use tokio::io::{AsyncReadExt as _, AsyncSeekExt as _};
use tracing::{debug, warn};

use crate::error::{DriveError, Result};
use crate::fs::Node;
use crate::http::HttpClient;
use crate::progress::{ProgressCallback, TransferProgress};
use crate::transfer::state::{TransferSession, TransferState};

/// Cap for the very first chunk of an upload. The server used to crash on
/// larger probe chunks; compatibility shim, revisit against the current
/// server before changing.
pub const FIRST_CHUNK_MAX: u64 = 1024;

/// Cap for every chunk after the first.
pub const CHUNK_MAX: u64 = 1024 * 1024;

/// Everything needed to push one file's bytes.
#[derive(Debug, Clone)]
pub struct UploadTarget {
    /// Local file to read from.
    pub local_path: PathBuf,
    /// Destination node name (clear; encoded for the header here).
    pub destination_name: String,
    /// One-time upload URL from the node-creation API.
    pub upload_url: String,
    /// Chunk-correlation id, `{user_id}-{sha1}`. Stable across retries so
    /// a fresh uploader resumes the same logical upload server-side.
    pub session_id: String,
    /// Total file size in bytes.
    pub total_bytes: u64,
}

/// Parsed `start-end/total` range echo from the upload endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeEcho {
    /// First byte offset the server holds for this session.
    pub start: u64,
    /// Last byte offset (inclusive) the server holds.
    pub end: u64,
    /// Total size the server expects.
    pub total: u64,
}

impl RangeEcho {
    /// A reset signal tells the client to restart from position 0; the
    /// server lost or rejected the partial state it was holding.
    pub fn is_reset(&self) -> bool {
        self.start > 0 && self.end > self.start
    }

    /// Offset of the next chunk after this echo, validated against the
    /// file size the upload was opened with.
    ///
    /// # Errors
    /// `Protocol` when the echoed total disagrees with the file size or
    /// the echoed end lies at or past it; such an echo cannot be continued
    /// from and continuing blindly could read past the file.
    pub fn next_offset(&self, expected_total: u64) -> Result<u64> {
        if self.total != expected_total || self.end >= expected_total {
            return Err(DriveError::Protocol(format!(
                "upload range echo out of bounds: {}-{}/{} (file is {} bytes)",
                self.start, self.end, self.total, expected_total
            )));
        }
        Ok(self.end + 1)
    }
}

/// Parse the plain-text `start-end/total` body the upload endpoint echoes
/// after a non-final chunk.
pub fn parse_range_echo(body: &str) -> Option<RangeEcho> {
    let body = body.trim();
    let (range, total) = body.split_once('/')?;
    let (start, end) = range.split_once('-')?;
    Some(RangeEcho {
        start: start.trim().parse().ok()?,
        end: end.trim().parse().ok()?,
        total: total.trim().parse().ok()?,
    })
}

/// Interpret an upload response body: either the range echo to continue
/// from, or the JSON node array marking completion.
fn parse_upload_response(body: &str) -> Result<UploadResponse> {
    let trimmed = body.trim_start();
    if trimmed.starts_with('[') || trimmed.starts_with('{') {
        let value: Value = serde_json::from_str(body)?;
        let mut nodes: Vec<Node> = match &value {
            Value::Array(items) => items.iter().map(Node::from_json).collect::<Result<_>>()?,
            Value::Object(_) => vec![Node::from_json(&value)?],
            _ => {
                return Err(DriveError::Protocol(
                    "unexpected upload response payload".to_string(),
                ))
            }
        };
        let count = nodes.len();
        return match nodes.pop() {
            Some(node) if nodes.is_empty() => Ok(UploadResponse::Complete(Box::new(node))),
            _ => Err(DriveError::Protocol(format!(
                "incorrect number of nodes: {}",
                count
            ))),
        };
    }

    parse_range_echo(body)
        .map(UploadResponse::Echo)
        .ok_or_else(|| DriveError::Protocol(format!("unparseable upload response: {:?}", body)))
}

#[derive(Debug)]
enum UploadResponse {
    Echo(RangeEcho),
    Complete(Box<Node>),
}

/// Uploads one file in bounded chunks, honoring server-directed resume.
pub struct ChunkedUploader {
    http: HttpClient,
    session: Arc<TransferSession>,
    progress: Option<ProgressCallback>,
}

impl ChunkedUploader {
    /// Create an uploader bound to a transfer session.
    pub fn new(http: HttpClient, session: Arc<TransferSession>) -> Self {
        Self {
            http,
            session,
            progress: None,
        }
    }

    /// Attach a progress callback invoked after every chunk.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn report(&mut self, done: u64, total: u64, name: &str) {
        if let Some(cb) = self.progress.as_mut() {
            cb(&TransferProgress::new(done, total, name));
        }
    }

    /// Push the file's bytes until the server acknowledges completion.
    ///
    /// Returns `Ok(None)` when the session was canceled; partial progress
    /// survives server-side under the target's `Session-Id`, so the caller
    /// can resume with a fresh uploader against a re-fetched upload URL.
    ///
    /// # Errors
    /// `Http` for any status >= 300 (the chunk is abandoned, not the
    /// logical upload), `Protocol` for malformed bodies or a completion
    /// payload that does not contain exactly one node.
    pub async fn upload(&mut self, target: &UploadTarget) -> Result<Option<Node>> {
        if self.session.state() == TransferState::Pending {
            self.session.start()?;
        }

        let total = target.total_bytes;
        let encoded_name =
            utf8_percent_encode(&target.destination_name, NON_ALPHANUMERIC).to_string();

        let mut file = tokio::fs::File::open(&target.local_path).await?;
        let mut offset: u64 = 0;
        let mut sent_chunks: u64 = 0;

        while offset < total {
            if self.session.checkpoint().await {
                debug!(session_id = %target.session_id, "upload canceled at chunk boundary");
                return Ok(None);
            }

            let cap = if sent_chunks == 0 {
                FIRST_CHUNK_MAX
            } else {
                CHUNK_MAX
            };
            let len = cap.min(total - offset);

            file.seek(std::io::SeekFrom::Start(offset)).await?;
            let mut buffer = vec![0u8; len as usize];
            file.read_exact(&mut buffer).await?;

            self.session.throttle(len).await;

            let range = format!("bytes {}-{}/{}", offset, offset + len - 1, total);
            let response = self
                .http
                .post_chunk(
                    &target.upload_url,
                    &encoded_name,
                    &target.session_id,
                    &range,
                    buffer,
                )
                .await?;

            let status = response.status().as_u16();
            if status >= 300 {
                return Err(DriveError::http(status));
            }

            let body = response.text().await?;
            sent_chunks += 1;

            match parse_upload_response(&body)? {
                UploadResponse::Complete(node) => {
                    self.session.reset_bytes(total);
                    self.session.finish();
                    self.report(total, total, &target.destination_name);
                    return Ok(Some(*node));
                }
                UploadResponse::Echo(echo) => {
                    if echo.is_reset() {
                        warn!(
                            session_id = %target.session_id,
                            start = echo.start,
                            end = echo.end,
                            "server requested upload restart"
                        );
                        offset = 0;
                        self.session.reset_bytes(0);
                    } else {
                        offset = echo.next_offset(total)?;
                        self.session.reset_bytes(offset);
                    }
                    self.report(offset, total, &target.destination_name);
                }
            }
        }

        // All bytes sent but the server never returned the node payload.
        Err(DriveError::Protocol(
            "upload completed without node response".to_string(),
        ))
    }
}
