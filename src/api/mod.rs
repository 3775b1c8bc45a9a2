//! Collaborator interfaces consumed by the transfer engine.
//!
//! The REST binding itself is out of scope; the engine only needs the
//! three-way node-creation outcome and a bearer token source. Both are
//! traits so tests can drive the engine against scripted servers.

pub mod token;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::Result;
use crate::fs::Node;

pub use token::{BearerToken, SingleFlightTokenProvider, TokenProvider, TokenRefresher};

/// Parameters of a node-creation (or dedup lookup) call. Serializes to
/// the JSON body the REST binding posts.
#[derive(Debug, Clone, Serialize)]
pub struct CreateNodeRequest {
    /// Destination node name.
    pub name: String,
    /// Parent folder id.
    pub parent_id: String,
    /// Content-derived dedup identifier.
    pub fid: String,
    /// fkey, AES-encrypted under the session content key, base64.
    pub fkey_encrypted: String,
}

/// Three-way outcome of `create_or_find_node`, driving the fast-path /
/// dedup / byte-transfer branch of every upload.
///
/// `UploadRequired` and `Locked` map to HTTP 404/423 on the wire but are
/// expected control flow here, not failures.
#[derive(Debug, Clone)]
pub enum NodeOutcome {
    /// The server already knew the content; the node was registered
    /// without a byte transfer (fast path).
    Created(Node),
    /// Unknown content; the caller must push bytes to `upload_url`.
    UploadRequired {
        /// One-time dynamic upload URL.
        upload_url: String,
    },
    /// Duplicate content exists under another node; reuse it.
    Locked {
        /// The existing remote node.
        existing: Node,
    },
}

/// REST API collaborator. Genuine HTTP failures (anything that is not one
/// of the three [`NodeOutcome`] signals) come back as
/// [`crate::DriveError::Http`].
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Register a file by content identity, or learn where to upload it.
    async fn create_or_find_node(&self, request: &CreateNodeRequest) -> Result<NodeOutcome>;
}
