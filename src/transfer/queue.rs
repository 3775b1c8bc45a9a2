//! Transfer orchestration: hashing, node registration and bounded
//! concurrency.
//!
//! Batch helpers run at most [`MAX_CONCURRENT_TRANSFERS`] files at a time
//! through `buffered`, which also keeps result order aligned with the input
//! order. Chunks inside one file stay strictly sequential.

use std::path::PathBuf;
use std::sync::Arc;

use futures::{stream, StreamExt as _};
use tracing::{debug, info};

use crate::api::{ApiClient, CreateNodeRequest, NodeOutcome, TokenProvider};
use crate::crypto::hash::sha1_file_session;
use crate::crypto::identity::ContentIdentity;
use crate::crypto::kdf::ContentKey;
use crate::error::{DriveError, Result};
use crate::fs::Node;
use crate::http::HttpClient;
use crate::transfer::download::{
    DownloadOutcome, DownloadTarget, OverwritePolicy, ResumableDownloader,
};
use crate::transfer::state::{TransferSession, TransferState};
use crate::transfer::upload::{ChunkedUploader, UploadTarget};

/// How many files transfer concurrently in a batch.
pub const MAX_CONCURRENT_TRANSFERS: usize = 4;

/// One file to upload.
#[derive(Debug, Clone)]
pub struct UploadJob {
    /// Local file to read.
    pub local_path: PathBuf,
    /// Name for the remote node.
    pub destination_name: String,
    /// Remote parent folder id.
    pub parent_id: String,
}

/// How an upload settled. All four are successes from the caller's point of
/// view; they differ in how many bytes had to move.
#[derive(Debug, Clone)]
pub enum UploadOutcome {
    /// Server already knew the content; node registered with zero bytes
    /// transferred.
    Registered(Node),
    /// Duplicate content lives under an existing node; reusing it.
    Deduplicated(Node),
    /// Bytes were pushed and the node came back from the final chunk.
    Uploaded(Node),
    /// Session canceled before completion.
    Canceled,
}

/// Upload orchestrator: hash, register by content identity, push bytes only
/// when the server asks for them.
pub struct Uploader<A> {
    api: Arc<A>,
    http: HttpClient,
    content_key: ContentKey,
    user_id: String,
    workers: usize,
}

impl<A: ApiClient> Uploader<A> {
    /// Create an uploader for one authenticated user.
    pub fn new(api: Arc<A>, content_key: ContentKey, user_id: impl Into<String>) -> Self {
        Self {
            api,
            http: HttpClient::new(),
            content_key,
            user_id: user_id.into(),
            workers: MAX_CONCURRENT_TRANSFERS,
        }
    }

    /// Override the HTTP client (proxy setups).
    pub fn with_http(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    /// Override the batch concurrency width.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Upload one file under the given session.
    ///
    /// The session covers the whole pipeline: hashing advances its progress
    /// counters first, then the counter restarts for the byte push when the
    /// server requests one. Cancel settles as `Ok(Canceled)` at the next
    /// block or chunk boundary.
    pub async fn upload_file(
        &self,
        job: &UploadJob,
        session: Arc<TransferSession>,
    ) -> Result<UploadOutcome> {
        let total = tokio::fs::metadata(&job.local_path).await?.len();
        session.set_total_bytes(total);
        if session.state() == TransferState::Pending {
            session.start()?;
        }

        // Hashing is CPU plus blocking reads; keep it off the async workers.
        let sha1 = {
            let path = job.local_path.clone();
            let session = session.clone();
            tokio::task::spawn_blocking(move || sha1_file_session(&path, &session))
                .await
                .map_err(|e| DriveError::Custom(format!("hash task failed: {}", e)))??
        };
        let Some(sha1) = sha1 else {
            return Ok(UploadOutcome::Canceled);
        };

        let identity = ContentIdentity::from_sha1(sha1)?;
        let request = CreateNodeRequest {
            name: job.destination_name.clone(),
            parent_id: job.parent_id.clone(),
            fid: identity.fid.clone(),
            fkey_encrypted: identity.encrypted_fkey(&self.content_key)?,
        };

        match self.api.create_or_find_node(&request).await? {
            NodeOutcome::Created(node) => {
                info!(name = %job.destination_name, "content known, node registered without transfer");
                session.finish();
                Ok(UploadOutcome::Registered(node))
            }
            NodeOutcome::Locked { existing } => {
                info!(name = %job.destination_name, existing = %existing.id, "duplicate content, reusing node");
                session.finish();
                Ok(UploadOutcome::Deduplicated(existing))
            }
            NodeOutcome::UploadRequired { upload_url } => {
                debug!(name = %job.destination_name, "content unknown, pushing bytes");
                session.reset_bytes(0);
                let target = UploadTarget {
                    local_path: job.local_path.clone(),
                    destination_name: job.destination_name.clone(),
                    upload_url,
                    session_id: format!("{}-{}", self.user_id, identity.sha1),
                    total_bytes: total,
                };
                let mut uploader = ChunkedUploader::new(self.http.clone(), session);
                match uploader.upload(&target).await? {
                    Some(node) => Ok(UploadOutcome::Uploaded(node)),
                    None => Ok(UploadOutcome::Canceled),
                }
            }
        }
    }

    /// Upload a batch with bounded concurrency.
    ///
    /// Results come back in input order; one file's failure does not abort
    /// the others. The returned sessions (one per job, same order) let the
    /// caller pause or cancel individual files mid-batch.
    pub async fn upload_all(
        &self,
        jobs: &[UploadJob],
    ) -> (Vec<Arc<TransferSession>>, Vec<Result<UploadOutcome>>) {
        let sessions: Vec<Arc<TransferSession>> = jobs
            .iter()
            .map(|_| Arc::new(TransferSession::new(0)))
            .collect();

        let results = stream::iter(jobs.iter().zip(sessions.iter().cloned()))
            .map(|(job, session)| self.upload_file(job, session))
            .buffered(self.workers)
            .collect()
            .await;

        (sessions, results)
    }
}

/// One file to download.
#[derive(Debug, Clone)]
pub struct DownloadJob {
    /// Remote file node (must be a file, not a folder).
    pub node: Node,
    /// Local destination path.
    pub destination: PathBuf,
    /// Collision policy.
    pub policy: OverwritePolicy,
}

/// Download orchestrator.
pub struct Downloader<T> {
    tokens: Arc<T>,
    http: HttpClient,
    workers: usize,
}

impl<T: TokenProvider + 'static> Downloader<T> {
    /// Create a downloader over a token source.
    pub fn new(tokens: Arc<T>) -> Self {
        Self {
            tokens,
            http: HttpClient::new(),
            workers: MAX_CONCURRENT_TRANSFERS,
        }
    }

    /// Override the HTTP client (proxy setups).
    pub fn with_http(mut self, http: HttpClient) -> Self {
        self.http = http;
        self
    }

    /// Override the batch concurrency width.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Download one file node under the given session.
    ///
    /// # Errors
    /// `UnsupportedOperation` for folder nodes, `Protocol` when the node
    /// carries no download URL.
    pub async fn download_node(
        &self,
        job: &DownloadJob,
        session: Arc<TransferSession>,
    ) -> Result<DownloadOutcome> {
        let file = job.node.as_file("download")?;
        let source_url = file
            .download_url
            .clone()
            .ok_or_else(|| DriveError::Protocol("node has no download url".to_string()))?;

        let target = DownloadTarget {
            source_url,
            destination: job.destination.clone(),
            fid: file.fid.clone().unwrap_or_else(|| job.node.id.clone()),
            expected_size: file.size,
            expected_last_update: file.last_update,
            policy: job.policy,
        };

        let mut downloader =
            ResumableDownloader::new(self.http.clone(), self.tokens.clone(), session);
        downloader.download(&target).await
    }

    /// Download a batch with bounded concurrency.
    ///
    /// Same contract as [`Uploader::upload_all`]: input-ordered results,
    /// per-file sessions, no batch-wide abort on individual failure.
    pub async fn download_all(
        &self,
        jobs: &[DownloadJob],
    ) -> (Vec<Arc<TransferSession>>, Vec<Result<DownloadOutcome>>) {
        let sessions: Vec<Arc<TransferSession>> = jobs
            .iter()
            .map(|_| Arc::new(TransferSession::new(0)))
            .collect();

        let results = stream::iter(jobs.iter().zip(sessions.iter().cloned()))
            .map(|(job, session)| self.download_node(job, session))
            .buffered(self.workers)
            .collect()
            .await;

        (sessions, results)
    }
}
