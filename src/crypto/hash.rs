//! Streaming SHA-1 hashing.
//!
//! Hashing a file is the first step of every upload and can take as long as
//! the transfer itself for large files, so it participates in the transfer
//! lifecycle: the session-aware variant feeds progress counters and honors
//! pause/cancel at block boundaries.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use sha1::{Digest, Sha1};

use crate::error::Result;
use crate::transfer::state::TransferSession;

/// Read buffer for streaming hashes.
const HASH_BLOCK_SIZE: usize = 64 * 1024;

/// Hex-encode the SHA-1 of a byte slice.
pub fn sha1_hex(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Streaming SHA-1 over a file's bytes, hex-encoded (40 chars).
///
/// Synchronous; callers on the async side go through
/// `tokio::task::spawn_blocking` (see `transfer::queue`).
pub fn sha1_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut file = File::open(path.as_ref())?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; HASH_BLOCK_SIZE];

    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Like [`sha1_file`], but wired into a transfer session.
///
/// Progress counters advance per block and the cancel flag is checked at
/// every block boundary; returns `Ok(None)` when the session was canceled
/// mid-hash. Pause is not observed here because the blocking worker cannot
/// sleep on the async pause loop; the owning task pauses before or after.
pub fn sha1_file_session<P: AsRef<Path>>(
    path: P,
    session: &Arc<TransferSession>,
) -> Result<Option<String>> {
    let mut file = File::open(path.as_ref())?;
    let mut hasher = Sha1::new();
    let mut buffer = vec![0u8; HASH_BLOCK_SIZE];

    loop {
        if session.is_canceled() {
            return Ok(None);
        }
        let n = file.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        session.add_bytes(n as u64);
    }

    Ok(Some(hex::encode(hasher.finalize())))
}
