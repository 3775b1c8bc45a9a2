//! OAuth bearer token access with single-flight refresh.
//!
//! The token refresh has a 300-second safety margin before expiry, so a
//! caller that loses the refresh race can safely proceed on the
//! possibly-soon-to-be-stale token instead of blocking. At most one refresh
//! is in flight system-wide.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::Result;

/// Refresh is triggered this long before the token actually expires.
pub const REFRESH_MARGIN: Duration = Duration::from_secs(300);

/// An access token with its expiry instant.
#[derive(Debug, Clone)]
pub struct BearerToken {
    /// The bearer token value.
    pub access_token: String,
    /// When the token stops being accepted.
    pub expires_at: Instant,
}

impl BearerToken {
    /// Build a token valid for `lifetime` from now.
    pub fn with_lifetime(access_token: impl Into<String>, lifetime: Duration) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at: Instant::now() + lifetime,
        }
    }

    /// Whether the token is inside the refresh margin.
    pub fn needs_refresh(&self) -> bool {
        Instant::now() + REFRESH_MARGIN >= self.expires_at
    }
}

/// Source of bearer tokens for authenticated transfer requests.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// The current access token; may be close to expiry.
    async fn current_access_token(&self) -> Result<String>;

    /// Kick off a refresh if the token is inside the margin. Returns once
    /// this caller's obligation is settled, which may be immediately if
    /// another refresh is already in flight.
    async fn refresh_if_needed(&self) -> Result<()>;
}

/// Performs the actual OAuth2 refresh round-trip. Out of scope here; the
/// application supplies it.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    /// Obtain a fresh token.
    async fn refresh(&self) -> Result<BearerToken>;
}

/// [`TokenProvider`] that collapses concurrent refreshes into one.
///
/// Losers of the refresh race proceed with the current token; the margin
/// guarantees it is still accepted while the winner's refresh lands.
pub struct SingleFlightTokenProvider<R> {
    refresher: R,
    token: RwLock<BearerToken>,
    refreshing: AtomicBool,
}

impl<R: TokenRefresher> SingleFlightTokenProvider<R> {
    /// Create a provider seeded with an initial token.
    pub fn new(refresher: R, initial: BearerToken) -> Self {
        Self {
            refresher,
            token: RwLock::new(initial),
            refreshing: AtomicBool::new(false),
        }
    }

    fn read_token(&self) -> BearerToken {
        self.token
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl<R: TokenRefresher> TokenProvider for SingleFlightTokenProvider<R> {
    async fn current_access_token(&self) -> Result<String> {
        Ok(self.read_token().access_token)
    }

    async fn refresh_if_needed(&self) -> Result<()> {
        if !self.read_token().needs_refresh() {
            return Ok(());
        }

        // Single flight: only the winner of this flag performs the refresh.
        if self
            .refreshing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("token refresh already in flight, proceeding with current token");
            return Ok(());
        }

        let result = self.refresher.refresh().await;
        match &result {
            Ok(fresh) => {
                *self.token.write().unwrap_or_else(|e| e.into_inner()) = fresh.clone();
                debug!("access token refreshed");
            }
            Err(e) => warn!("token refresh failed: {}", e),
        }
        self.refreshing.store(false, Ordering::SeqCst);

        result.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct CountingRefresher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TokenRefresher for &CountingRefresher {
        async fn refresh(&self) -> Result<BearerToken> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(BearerToken::with_lifetime(
                "fresh",
                Duration::from_secs(3600),
            ))
        }
    }

    #[tokio::test]
    async fn test_no_refresh_outside_margin() {
        let refresher = CountingRefresher {
            calls: AtomicUsize::new(0),
        };
        let provider = SingleFlightTokenProvider::new(
            &refresher,
            BearerToken::with_lifetime("initial", Duration::from_secs(3600)),
        );

        provider.refresh_if_needed().await.unwrap();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
        assert_eq!(provider.current_access_token().await.unwrap(), "initial");
    }

    #[tokio::test]
    async fn test_refresh_inside_margin() {
        let refresher = CountingRefresher {
            calls: AtomicUsize::new(0),
        };
        let provider = SingleFlightTokenProvider::new(
            &refresher,
            // 60s left: inside the 300s margin.
            BearerToken::with_lifetime("stale", Duration::from_secs(60)),
        );

        provider.refresh_if_needed().await.unwrap();
        assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(provider.current_access_token().await.unwrap(), "fresh");
    }

    #[tokio::test]
    async fn test_needs_refresh_margin() {
        let soon = BearerToken::with_lifetime("t", Duration::from_secs(10));
        assert!(soon.needs_refresh());

        let later = BearerToken::with_lifetime("t", Duration::from_secs(3600));
        assert!(!later.needs_refresh());
    }
}
