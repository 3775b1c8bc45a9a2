//! Per-session content-key cache.
//!
//! The content key is derived lazily on first need (the derivation chain
//! costs one RSA decrypt plus PBKDF2 rounds) and is then read-only shared
//! state for every concurrent transfer of the session. One mutex guards the
//! slot; it is held across the deriving future so concurrent first callers
//! collapse into a single derivation.

use std::future::Future;

use tokio::sync::Mutex;

use crate::crypto::kdf::ContentKey;
use crate::error::Result;

/// Get-or-populate cache for the session [`ContentKey`].
#[derive(Debug, Default)]
pub struct ContentKeyCache {
    slot: Mutex<Option<ContentKey>>,
}

impl ContentKeyCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached key, deriving it via `derive` on first use.
    ///
    /// A failed derivation leaves the cache empty so the next caller can
    /// retry with (say) corrected credentials.
    pub async fn get_or_derive<F, Fut>(&self, derive: F) -> Result<ContentKey>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ContentKey>>,
    {
        let mut slot = self.slot.lock().await;
        if let Some(key) = slot.as_ref() {
            return Ok(key.clone());
        }

        let key = derive().await?;
        *slot = Some(key.clone());
        Ok(key)
    }

    /// Drop the cached key (logout, relation removal).
    pub async fn invalidate(&self) {
        *self.slot.lock().await = None;
    }

    /// Whether a key is currently cached.
    pub async fn is_populated(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DriveError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn key(tag: u8) -> ContentKey {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine;
        ContentKey::from_base64(BASE64.encode([tag; 32]))
    }

    #[tokio::test]
    async fn test_derives_once() {
        let cache = ContentKeyCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let got = cache
                .get_or_derive(|| async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(key(1))
                })
                .await
                .unwrap();
            assert_eq!(got, key(1));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_rederive() {
        let cache = ContentKeyCache::new();
        cache.get_or_derive(|| async { Ok(key(1)) }).await.unwrap();
        assert!(cache.is_populated().await);

        cache.invalidate().await;
        assert!(!cache.is_populated().await);

        let got = cache.get_or_derive(|| async { Ok(key(2)) }).await.unwrap();
        assert_eq!(got, key(2));
    }

    #[tokio::test]
    async fn test_failed_derivation_not_cached() {
        let cache = ContentKeyCache::new();
        let res = cache
            .get_or_derive(|| async { Err(DriveError::Crypto("bad password".into())) })
            .await;
        assert!(res.is_err());
        assert!(!cache.is_populated().await);

        assert!(cache.get_or_derive(|| async { Ok(key(3)) }).await.is_ok());
    }
}
