//! Content-addressed identity: `fid` and `fkey` derivation.
//!
//! The server deduplicates uploads by `fid`, a deterministic identifier
//! derived from a file's SHA-1 via PBKDF2 with a fixed salt. `fkey` is
//! derived the same way with a different salt and travels AES-encrypted
//! under the session content key, so only the owner can reproduce it.

use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::crypto::aes::aes_cbc_encrypt;
use crate::crypto::hash::sha1_file;
use crate::crypto::kdf::{derive_bytes_with, ContentKey};
use crate::error::Result;

/// Fixed salt for `fid` derivation.
const FID_SALT: &[u8] = b"21c32eaf3dde4337b8c55ba6";
/// Fixed salt for `fkey` derivation.
const FKEY_SALT: &[u8] = b"7e0a1d58c4af9b63d2e69f04";

/// PBKDF2 iterations for identity derivation. Deliberately low: these are
/// identifiers, not password hashes, and uploads derive one per file.
const IDENTITY_ITERATIONS: u32 = 32;

/// Derived output width; 18 bytes encode to exactly 24 base64 chars.
const IDENTITY_LEN: usize = 18;

/// Content-addressed identity of a file.
///
/// Identical file bytes always yield an identical `(fid, fkey)` pair, which
/// is what makes the server-side dedup fast path work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentIdentity {
    /// Hex-encoded SHA-1 of the file content (40 chars).
    pub sha1: String,
    /// Deduplication identifier, base64 (24 chars).
    pub fid: String,
    /// Clear per-file key material, base64 (24 chars). Never sent as-is;
    /// see [`ContentIdentity::encrypted_fkey`].
    pub fkey: String,
}

fn derive_component(sha1_hex: &str, salt: &[u8]) -> Result<String> {
    let raw: [u8; IDENTITY_LEN] =
        derive_bytes_with(sha1_hex.as_bytes(), salt, IDENTITY_ITERATIONS)?;
    Ok(BASE64.encode(raw))
}

impl ContentIdentity {
    /// Derive the identity from an already-computed SHA-1 hex digest.
    pub fn from_sha1(sha1_hex: impl Into<String>) -> Result<Self> {
        let sha1 = sha1_hex.into();
        let fid = derive_component(&sha1, FID_SALT)?;
        let fkey = derive_component(&sha1, FKEY_SALT)?;
        Ok(Self { sha1, fid, fkey })
    }

    /// Hash a file and derive its identity in one step.
    pub fn for_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let sha1 = sha1_file(path)?;
        Self::from_sha1(sha1)
    }

    /// The wire form of `fkey`: AES-CBC encrypted under the first 32 bytes
    /// of the content key (16-byte key slice, 16-byte IV slice), base64.
    pub fn encrypted_fkey(&self, content_key: &ContentKey) -> Result<String> {
        let (key, iv) = content_key.key_iv()?;
        let ciphertext = aes_cbc_encrypt(&key, &iv, self.fkey.as_bytes());
        Ok(BASE64.encode(ciphertext))
    }
}
