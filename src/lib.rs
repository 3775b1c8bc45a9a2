//! # drivelib
//!
//! Client library for a cloud file-sharing service: content-addressed
//! uploads with server-side deduplication, resumable downloads, and the
//! client-side key derivation chain protecting per-file key material.
//!
//! ## Features
//!
//! - Chunked uploads with server-directed resume (1 MiB chunks after a
//!   small probe chunk)
//! - Zero-byte "uploads" when the server already knows the content, keyed
//!   by a deterministic content identity (`fid`)
//! - Resumable downloads with retry, atomic publication and four overwrite
//!   policies
//! - Per-transfer pause/resume/cancel and optional bandwidth throttling
//! - PBKDF2 password derivation, AES-128-CBC, RSA key unwrap and streaming
//!   SHA-1, all on the RustCrypto stack
//! - Batches of up to four concurrent transfers
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use drivelib::crypto::ContentKey;
//! use drivelib::transfer::{TransferSession, UploadJob, Uploader};
//! # use drivelib::api::{ApiClient, CreateNodeRequest, NodeOutcome};
//! # use async_trait::async_trait;
//! # struct MyApi;
//! # #[async_trait]
//! # impl ApiClient for MyApi {
//! #     async fn create_or_find_node(
//! #         &self,
//! #         _request: &CreateNodeRequest,
//! #     ) -> drivelib::Result<NodeOutcome> {
//! #         unimplemented!()
//! #     }
//! # }
//!
//! # async fn run(api: Arc<MyApi>, content_key: ContentKey) -> drivelib::Result<()> {
//! let uploader = Uploader::new(api, content_key, "user-id");
//! let session = Arc::new(TransferSession::new(0));
//!
//! let job = UploadJob {
//!     local_path: "report.pdf".into(),
//!     destination_name: "report.pdf".into(),
//!     parent_id: "root".into(),
//! };
//! let outcome = uploader.upload_file(&job, session.clone()).await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod crypto;
pub mod error;
pub mod fs;
pub mod http;
pub mod progress;
pub mod transfer;

pub use api::{ApiClient, CreateNodeRequest, NodeOutcome, TokenProvider};
pub use crypto::{
    calculate_login_password, calculate_master_password, decrypt_private_key, unwrap_content_key,
    ContentIdentity, ContentKey, ContentKeyCache,
};
pub use error::{DriveError, HttpStatusKind, Result};
pub use fs::{Node, NodeKind};
pub use http::HttpClient;
pub use progress::{ProgressCallback, TransferProgress};
pub use transfer::{
    DownloadJob, DownloadOutcome, Downloader, OverwritePolicy, TransferSession, TransferState,
    UploadJob, UploadOutcome, Uploader,
};
