//! Error types for the drivelib library.

use thiserror::Error;

use crate::transfer::state::TransferState;

/// Category of an HTTP failure status, in the shape the transfer engine
/// cares about. `NotFound` and `Locked` are *expected* control-flow signals
/// when they come out of node creation (dedup / first-upload branch) and are
/// surfaced through [`crate::api::NodeOutcome`] instead of this error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpStatusKind {
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 422
    Unprocessable,
    /// 423
    Locked,
    /// 500
    Internal,
    /// 501
    NotImplemented,
    /// Anything else >= 300
    Other,
}

impl From<u16> for HttpStatusKind {
    fn from(status: u16) -> Self {
        match status {
            400 => HttpStatusKind::BadRequest,
            401 => HttpStatusKind::Unauthorized,
            403 => HttpStatusKind::Forbidden,
            404 => HttpStatusKind::NotFound,
            422 => HttpStatusKind::Unprocessable,
            423 => HttpStatusKind::Locked,
            500 => HttpStatusKind::Internal,
            501 => HttpStatusKind::NotImplemented,
            _ => HttpStatusKind::Other,
        }
    }
}

impl HttpStatusKind {
    /// Get a human-readable description of the status category.
    pub fn description(&self) -> &'static str {
        match self {
            HttpStatusKind::BadRequest => "Bad request",
            HttpStatusKind::Unauthorized => "Unauthorized",
            HttpStatusKind::Forbidden => "Forbidden",
            HttpStatusKind::NotFound => "Not found",
            HttpStatusKind::Unprocessable => "Unprocessable entity",
            HttpStatusKind::Locked => "Locked",
            HttpStatusKind::Internal => "Internal server error",
            HttpStatusKind::NotImplemented => "Not implemented",
            HttpStatusKind::Other => "HTTP error",
        }
    }
}

/// Main error type for drivelib operations.
#[derive(Error, Debug)]
pub enum DriveError {
    /// HTTP request failed with a status code.
    #[error("HTTP error {status}: {}", HttpStatusKind::from(*.status).description())]
    Http {
        /// Raw status code.
        status: u16,
    },

    /// Network request error.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Local filesystem failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Key derivation or (de)cipher failure. Never retried.
    #[error("Crypto error: {0}")]
    Crypto(String),

    /// Unexpected shape or count in a server response.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Transfer state-machine contract violation. A programming error,
    /// always surfaced, never retried.
    #[error("invalid transfer state: cannot {op} while {state:?}")]
    InvalidState {
        /// Operation attempted.
        op: &'static str,
        /// State the session was in.
        state: TransferState,
    },

    /// The download destination appeared between policy resolution and
    /// publication; the temp file is left untouched.
    #[error("destination already exists: {0}")]
    DestinationExists(std::path::PathBuf),

    /// An operation was attempted on the wrong node variant
    /// (e.g. downloading a folder).
    #[error("unsupported operation on {kind} node: {op}")]
    UnsupportedOperation {
        /// Node kind the operation was attempted on.
        kind: &'static str,
        /// Operation attempted.
        op: &'static str,
    },

    /// Base64 decoding error.
    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),

    /// Custom error message.
    #[error("{0}")]
    Custom(String),
}

impl DriveError {
    /// Build an HTTP error from a raw status code.
    pub fn http(status: u16) -> Self {
        DriveError::Http { status }
    }

    /// Category of this error if it is an HTTP status failure.
    pub fn http_kind(&self) -> Option<HttpStatusKind> {
        match self {
            DriveError::Http { status } => Some(HttpStatusKind::from(*status)),
            _ => None,
        }
    }
}

/// Result type alias for drivelib operations.
pub type Result<T> = std::result::Result<T, DriveError>;
