//! Remote filesystem model.

pub mod node;

pub use node::{FileData, FolderData, Node, NodeKind};
