//! Remote filesystem node types.
//!
//! Files and folders are one sum type; picking the wrong variant for an
//! operation is an explicit [`DriveError::UnsupportedOperation`] rather
//! than a runtime "illegal action" surprise, and call sites that match on
//! [`NodeKind`] get exhaustiveness for free.

use serde_json::Value;

use crate::error::{DriveError, Result};

/// File-specific node data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileData {
    /// Content size in bytes.
    pub size: u64,
    /// Remote last-update time (Unix epoch seconds).
    pub last_update: i64,
    /// Content-derived dedup identifier, when the server returned one.
    pub fid: Option<String>,
    /// Signed content URL, when the server returned one.
    pub download_url: Option<String>,
}

/// Folder-specific node data.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderData {
    /// Number of direct children, when reported.
    pub child_count: Option<u64>,
}

/// Variant payload of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    /// Regular file.
    File(FileData),
    /// Folder/directory.
    Folder(FolderData),
}

/// A node in the remote filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Server-assigned node id.
    pub id: String,
    /// Node name.
    pub name: String,
    /// Parent folder id (`None` for the root).
    pub parent_id: Option<String>,
    /// File or folder payload.
    pub kind: NodeKind,
}

impl Node {
    /// Whether this node is a file.
    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File(_))
    }

    /// Whether this node is a folder.
    pub fn is_folder(&self) -> bool {
        matches!(self.kind, NodeKind::Folder(_))
    }

    /// Borrow the file payload, or fail with `UnsupportedOperation`.
    pub fn as_file(&self, op: &'static str) -> Result<&FileData> {
        match &self.kind {
            NodeKind::File(data) => Ok(data),
            NodeKind::Folder(_) => Err(DriveError::UnsupportedOperation {
                kind: "folder",
                op,
            }),
        }
    }

    /// Borrow the folder payload, or fail with `UnsupportedOperation`.
    pub fn as_folder(&self, op: &'static str) -> Result<&FolderData> {
        match &self.kind {
            NodeKind::Folder(data) => Ok(data),
            NodeKind::File(_) => Err(DriveError::UnsupportedOperation { kind: "file", op }),
        }
    }

    /// Parse a node from a server JSON object.
    ///
    /// # Errors
    /// `Protocol` when required fields are missing or the type tag is
    /// unknown.
    pub fn from_json(value: &Value) -> Result<Node> {
        let obj = value
            .as_object()
            .ok_or_else(|| DriveError::Protocol("node payload is not an object".to_string()))?;

        let id = obj
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| DriveError::Protocol("node missing id".to_string()))?
            .to_string();
        let name = obj
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| DriveError::Protocol("node missing name".to_string()))?
            .to_string();
        let parent_id = obj
            .get("parent_id")
            .and_then(Value::as_str)
            .map(str::to_string);

        let node_type = obj.get("type").and_then(Value::as_str).unwrap_or("file");
        let kind = match node_type {
            "file" => NodeKind::File(FileData {
                size: obj.get("size").and_then(Value::as_u64).unwrap_or(0),
                last_update: obj.get("last_update").and_then(Value::as_i64).unwrap_or(0),
                fid: obj.get("fid").and_then(Value::as_str).map(str::to_string),
                download_url: obj
                    .get("download_url")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            "dir" | "folder" => NodeKind::Folder(FolderData {
                child_count: obj.get("nb_children").and_then(Value::as_u64),
            }),
            other => {
                return Err(DriveError::Protocol(format!(
                    "unknown node type: {}",
                    other
                )))
            }
        };

        Ok(Node {
            id,
            name,
            parent_id,
            kind,
        })
    }
}
