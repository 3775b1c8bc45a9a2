//! Progress reporting for file transfers.

use serde::Serialize;

/// Progress information for uploads, downloads and hashing.
#[derive(Debug, Clone, Serialize)]
pub struct TransferProgress {
    /// Bytes transferred so far
    pub done: u64,
    /// Total bytes to transfer
    pub total: u64,
    /// Name of the file being transferred
    pub filename: String,
}

impl TransferProgress {
    /// Create a new progress report.
    pub fn new(done: u64, total: u64, filename: impl Into<String>) -> Self {
        Self {
            done,
            total,
            filename: filename.into(),
        }
    }

    /// Get progress as a percentage (0.0 to 100.0).
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.done as f64 / self.total as f64) * 100.0
    }

    /// Check if transfer is complete.
    pub fn is_complete(&self) -> bool {
        self.done >= self.total
    }
}

/// Type alias for progress callback function.
///
/// The callback receives progress information after every chunk. Unlike the
/// session cancel flag this is purely informational; use
/// [`crate::transfer::TransferSession::cancel`] to abort a transfer.
pub type ProgressCallback = Box<dyn FnMut(&TransferProgress) + Send>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent() {
        let p = TransferProgress::new(250, 1000, "a.bin");
        assert_eq!(p.percent(), 25.0);
        assert!(!p.is_complete());

        let done = TransferProgress::new(1000, 1000, "a.bin");
        assert!(done.is_complete());
    }

    #[test]
    fn test_zero_total() {
        let p = TransferProgress::new(0, 0, "empty");
        assert_eq!(p.percent(), 0.0);
    }
}
