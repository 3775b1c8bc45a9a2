//! Transfer lifecycle shared by uploads, downloads and hashing.
//!
//! One [`TransferSession`] exists per transfer. The caller keeps a clone of
//! the `Arc` to drive `pause`/`resume`/`cancel`/`progress`; the transfer
//! loop polls the same session cooperatively at chunk boundaries. The
//! internal mutex guards only the small state block and is never held
//! across a network call or a sleep.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::sleep;

use crate::error::{DriveError, Result};
use crate::transfer::limit::RateLimiter;

/// How often a paused transfer loop re-checks the pause flag. Also bounds
/// cancellation latency while paused.
pub const PAUSE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle states. `Pending` is initial; `Canceled` and `Finished` are
/// terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Created, not yet started.
    Pending,
    /// Transfer loop running.
    Started,
    /// Cooperatively suspended; the loop blocks at the next chunk boundary.
    Paused,
    /// Canceled by the caller; terminal.
    Canceled,
    /// Completed successfully; terminal.
    Finished,
}

#[derive(Debug)]
struct Inner {
    state: TransferState,
    bytes_transferred: u64,
    total_bytes: u64,
}

/// Shared control block of one transfer.
#[derive(Debug)]
pub struct TransferSession {
    inner: Mutex<Inner>,
    // Mirrors of the state for lock-free polling from hot loops.
    paused: AtomicBool,
    canceled: AtomicBool,
    limiter: Option<RateLimiter>,
}

impl TransferSession {
    /// Create a session in `Pending` with a known total byte count.
    pub fn new(total_bytes: u64) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: TransferState::Pending,
                bytes_transferred: 0,
                total_bytes,
            }),
            paused: AtomicBool::new(false),
            canceled: AtomicBool::new(false),
            limiter: None,
        }
    }

    /// Create a session with a bytes/sec throttle.
    pub fn with_rate_limit(total_bytes: u64, bytes_per_sec: u64) -> Self {
        let mut session = Self::new(total_bytes);
        session.limiter = Some(RateLimiter::new(bytes_per_sec));
        session
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // Poisoning only happens if a panic occurred mid-update; the state
        // block has no invariants spanning fields that a reader could
        // observe broken, so recover the guard.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Current state.
    pub fn state(&self) -> TransferState {
        self.lock().state
    }

    /// Move `Pending -> Started`.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.state {
            TransferState::Pending => {
                inner.state = TransferState::Started;
                Ok(())
            }
            state => Err(DriveError::InvalidState { op: "start", state }),
        }
    }

    /// Move `Started -> Paused`. The in-flight loop blocks at the next
    /// chunk boundary; it does not abort.
    pub fn pause(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.state {
            TransferState::Started => {
                inner.state = TransferState::Paused;
                self.paused.store(true, Ordering::SeqCst);
                Ok(())
            }
            state => Err(DriveError::InvalidState { op: "pause", state }),
        }
    }

    /// Move `Paused -> Started`.
    pub fn resume(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.state {
            TransferState::Paused => {
                inner.state = TransferState::Started;
                self.paused.store(false, Ordering::SeqCst);
                Ok(())
            }
            state => Err(DriveError::InvalidState { op: "resume", state }),
        }
    }

    /// Move `Started|Paused -> Canceled`.
    ///
    /// Cancellation is cooperative: the loop observes the flag within one
    /// chunk boundary and unwinds, settling its task with an empty outcome.
    /// Callers must await the task to observe final settlement.
    pub fn cancel(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.state {
            TransferState::Started | TransferState::Paused => {
                inner.state = TransferState::Canceled;
                self.canceled.store(true, Ordering::SeqCst);
                self.paused.store(false, Ordering::SeqCst);
                Ok(())
            }
            state => Err(DriveError::InvalidState { op: "cancel", state }),
        }
    }

    /// Mark the transfer complete. Internal to the transfer loops.
    pub(crate) fn finish(&self) {
        let mut inner = self.lock();
        if matches!(inner.state, TransferState::Canceled) {
            return;
        }
        inner.state = TransferState::Finished;
    }

    /// `(bytes_transferred, total_bytes)`, non-blocking.
    ///
    /// A finished transfer reports `(total, total)` even if the internal
    /// counter lagged the last progress callback.
    pub fn progress(&self) -> (u64, u64) {
        let inner = self.lock();
        if inner.state == TransferState::Finished {
            (inner.total_bytes, inner.total_bytes)
        } else {
            (inner.bytes_transferred, inner.total_bytes)
        }
    }

    /// Total byte count this session was created with.
    pub fn total_bytes(&self) -> u64 {
        self.lock().total_bytes
    }

    /// Replace the total (downloads learn the real size from the response).
    pub(crate) fn set_total_bytes(&self, total: u64) {
        self.lock().total_bytes = total;
    }

    /// Advance the progress counter.
    pub(crate) fn add_bytes(&self, n: u64) {
        self.lock().bytes_transferred += n;
    }

    /// Reset the progress counter (server-directed upload restart).
    pub(crate) fn reset_bytes(&self, to: u64) {
        self.lock().bytes_transferred = to;
    }

    /// Lock-free cancel check for hot loops.
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::SeqCst)
    }

    /// Park while paused; returns `true` if the session was canceled either
    /// before or during the pause. Called at every chunk boundary.
    pub(crate) async fn checkpoint(&self) -> bool {
        loop {
            if self.canceled.load(Ordering::SeqCst) {
                return true;
            }
            if !self.paused.load(Ordering::SeqCst) {
                return false;
            }
            sleep(PAUSE_POLL_INTERVAL).await;
        }
    }

    /// Throttle `n` bytes through the optional rate limiter.
    pub(crate) async fn throttle(&self, n: u64) {
        if let Some(limiter) = &self.limiter {
            limiter.acquire(n).await;
        }
    }
}
