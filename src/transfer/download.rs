//! Resumable download with overwrite policies.
//!
//! Bytes stream into a hidden `.{fid}.part` temp file next to the
//! destination; the visible path only ever holds complete content because
//! publication is a single atomic rename. An interrupted attempt leaves the
//! temp file behind and the next attempt resumes from its length via a
//! `Range` request.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use futures::StreamExt as _;
use tokio::io::{AsyncSeekExt as _, AsyncWriteExt as _};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::api::TokenProvider;
use crate::error::{DriveError, Result};
use crate::http::HttpClient;
use crate::progress::{ProgressCallback, TransferProgress};
use crate::transfer::state::{TransferSession, TransferState};

/// Total attempts per download before giving up.
pub const DOWNLOAD_RETRY_LIMIT: u32 = 5;

/// Fixed delay between download attempts.
pub const DOWNLOAD_RETRY_DELAY: Duration = Duration::from_secs(3);

/// What to do when the destination path already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Always replace the existing file.
    Override,
    /// Replace unless the local copy already has the expected size and a
    /// modification time at or after the remote one.
    OverrideNewerSize,
    /// Leave the existing file alone and skip the download.
    Ignore,
    /// Keep both: download to `name-1.ext`, `name-2.ext`, ...
    Rename,
}

/// One download request.
#[derive(Debug, Clone)]
pub struct DownloadTarget {
    /// Signed content URL.
    pub source_url: String,
    /// Destination file path.
    pub destination: PathBuf,
    /// Content identifier; names the temp file so an interrupted download
    /// of the same content resumes regardless of destination renames.
    pub fid: String,
    /// Expected content size in bytes.
    pub expected_size: u64,
    /// Remote last-update time (Unix epoch seconds).
    pub expected_last_update: i64,
    /// Collision policy for the destination path.
    pub policy: OverwritePolicy,
}

/// How a download settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// Content written and published at this path.
    Completed(PathBuf),
    /// Policy decided the existing file at this path already satisfies the
    /// request; nothing was transferred.
    SkippedExisting(PathBuf),
    /// Session canceled; the partial temp file is kept for a later resume.
    Canceled,
}

/// Temp file name for a content id, safe for the local filesystem.
pub fn temp_file_name(fid: &str) -> String {
    format!(".{}.part", fid.replace('/', "_"))
}

/// Resolve where (and whether) to write, per the overwrite policy.
///
/// Returns `None` when the policy says to skip. The `Rename` probe takes
/// the first free `stem-N.ext` slot.
fn resolve_destination(target: &DownloadTarget) -> Result<Option<PathBuf>> {
    let dest = &target.destination;
    if !dest.exists() {
        return Ok(Some(dest.clone()));
    }
    if dest.is_dir() {
        // A directory squatting on the destination is never resolvable by
        // renaming the download.
        return Err(DriveError::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("destination is a directory: {}", dest.display()),
        )));
    }

    match target.policy {
        OverwritePolicy::Override => Ok(Some(dest.clone())),
        OverwritePolicy::OverrideNewerSize => {
            let meta = std::fs::metadata(dest)?;
            let expected_mtime = if target.expected_last_update >= 0 {
                UNIX_EPOCH + Duration::from_secs(target.expected_last_update as u64)
            } else {
                UNIX_EPOCH
            };
            let local_mtime = meta.modified().unwrap_or(UNIX_EPOCH);
            if meta.len() == target.expected_size && local_mtime >= expected_mtime {
                Ok(None)
            } else {
                Ok(Some(dest.clone()))
            }
        }
        OverwritePolicy::Ignore => Ok(None),
        OverwritePolicy::Rename => Ok(Some(next_free_name(dest))),
    }
}

fn next_free_name(dest: &Path) -> PathBuf {
    let stem = dest
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("download");
    let ext = dest.extension().and_then(|s| s.to_str());
    let parent = dest.parent().unwrap_or_else(|| Path::new("."));

    let mut n = 1u32;
    loop {
        let name = match ext {
            Some(ext) => format!("{}-{}.{}", stem, n, ext),
            None => format!("{}-{}", stem, n),
        };
        let candidate = parent.join(name);
        if !candidate.exists() {
            return candidate;
        }
        n += 1;
    }
}

enum Attempt {
    Done,
    Canceled,
}

/// Downloads one file with retry, resume and atomic publication.
pub struct ResumableDownloader {
    http: HttpClient,
    tokens: Arc<dyn TokenProvider>,
    session: Arc<TransferSession>,
    progress: Option<ProgressCallback>,
}

impl ResumableDownloader {
    /// Create a downloader bound to a transfer session.
    pub fn new(
        http: HttpClient,
        tokens: Arc<dyn TokenProvider>,
        session: Arc<TransferSession>,
    ) -> Self {
        Self {
            http,
            tokens,
            session,
            progress: None,
        }
    }

    /// Attach a progress callback invoked as chunks land.
    pub fn with_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    fn report(&mut self, done: u64, total: u64, name: &str) {
        if let Some(cb) = self.progress.as_mut() {
            cb(&TransferProgress::new(done, total, name));
        }
    }

    /// Fetch the content and publish it at the policy-resolved destination.
    ///
    /// Transient failures are retried up to [`DOWNLOAD_RETRY_LIMIT`] times
    /// with a fixed [`DOWNLOAD_RETRY_DELAY`]. On exhaustion the temp file is
    /// deleted and the last error propagates; cancellation keeps the temp
    /// file so the next run can resume.
    pub async fn download(&mut self, target: &DownloadTarget) -> Result<DownloadOutcome> {
        if self.session.state() == TransferState::Pending {
            self.session.start()?;
        }
        self.session.set_total_bytes(target.expected_size);

        let Some(final_dest) = resolve_destination(target)? else {
            debug!(destination = %target.destination.display(), "download skipped by policy");
            self.session.finish();
            return Ok(DownloadOutcome::SkippedExisting(target.destination.clone()));
        };

        let parent = final_dest.parent().unwrap_or_else(|| Path::new("."));
        let temp_path = parent.join(temp_file_name(&target.fid));
        let name = final_dest
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&target.fid)
            .to_string();

        let mut attempts = 0u32;
        loop {
            if self.session.checkpoint().await {
                return Ok(DownloadOutcome::Canceled);
            }

            match self.attempt(target, &temp_path, &name).await {
                Ok(Attempt::Done) => break,
                Ok(Attempt::Canceled) => return Ok(DownloadOutcome::Canceled),
                Err(e) => {
                    // Only transport failures get another attempt; local
                    // I/O and crypto failures propagate at once, partial
                    // temp intact.
                    if !matches!(e, DriveError::Http { .. } | DriveError::Request(_)) {
                        return Err(e);
                    }
                    attempts += 1;
                    if attempts >= DOWNLOAD_RETRY_LIMIT {
                        // Give up; a stale partial would poison the next
                        // request's resume offset.
                        let _ = tokio::fs::remove_file(&temp_path).await;
                        return Err(e);
                    }
                    warn!(
                        attempt = attempts,
                        error = %e,
                        "download attempt failed, retrying"
                    );
                    sleep(DOWNLOAD_RETRY_DELAY).await;
                }
            }
        }

        let written = tokio::fs::metadata(&temp_path).await?.len();
        if target.expected_size > 0 && written != target.expected_size {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(DriveError::Protocol(format!(
                "downloaded {} bytes, expected {}",
                written, target.expected_size
            )));
        }

        // The Rename/Ignore contract is that no existing file is replaced,
        // even one that appeared while we were transferring.
        if matches!(
            target.policy,
            OverwritePolicy::Ignore | OverwritePolicy::Rename
        ) && final_dest.exists()
        {
            return Err(DriveError::DestinationExists(final_dest));
        }

        tokio::fs::rename(&temp_path, &final_dest).await?;
        self.session.finish();
        self.report(written, written, &name);
        Ok(DownloadOutcome::Completed(final_dest))
    }

    async fn attempt(
        &mut self,
        target: &DownloadTarget,
        temp_path: &Path,
        name: &str,
    ) -> Result<Attempt> {
        self.tokens.refresh_if_needed().await?;
        let token = self.tokens.current_access_token().await?;

        let resume_from = match tokio::fs::metadata(temp_path).await {
            Ok(meta) if meta.len() > 0 => {
                if target.expected_size > 0 && meta.len() > target.expected_size {
                    // Oversized partial cannot belong to this content.
                    tokio::fs::remove_file(temp_path).await?;
                    None
                } else {
                    debug!(offset = meta.len(), "resuming partial download");
                    Some(meta.len())
                }
            }
            _ => None,
        };

        let response = self
            .http
            .get_content(&target.source_url, &token, resume_from)
            .await?;

        // A server that ignores Range answers 200 with the whole body.
        let mut offset = if response.status() == reqwest::StatusCode::PARTIAL_CONTENT {
            resume_from.unwrap_or(0)
        } else {
            0
        };

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(temp_path)
            .await?;
        file.set_len(offset).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;
        self.session.reset_bytes(offset);

        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            if self.session.checkpoint().await {
                file.flush().await?;
                return Ok(Attempt::Canceled);
            }
            let chunk = chunk?;
            let len = chunk.len() as u64;
            self.session.throttle(len).await;
            file.write_all(&chunk).await?;
            offset += len;
            self.session.add_bytes(len);
            self.report(offset, target.expected_size, name);
        }

        file.flush().await?;
        Ok(Attempt::Done)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(dest: PathBuf, policy: OverwritePolicy) -> DownloadTarget {
        DownloadTarget {
            source_url: "https://content.example/abc".to_string(),
            destination: dest,
            fid: "MUr243SzLSVf11/c7T0SZqyf".to_string(),
            expected_size: 4096,
            expected_last_update: 1_700_000_000,
            policy,
        }
    }

    #[test]
    fn test_temp_file_name_sanitizes_slashes() {
        assert_eq!(
            temp_file_name("MUr243SzLSVf11/c7T0SZqyf"),
            ".MUr243SzLSVf11_c7T0SZqyf.part"
        );
        assert_eq!(temp_file_name("plain"), ".plain.part");
    }

    #[test]
    fn test_resolve_no_collision() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report.pdf");
        for policy in [
            OverwritePolicy::Override,
            OverwritePolicy::OverrideNewerSize,
            OverwritePolicy::Ignore,
            OverwritePolicy::Rename,
        ] {
            let resolved = resolve_destination(&target(dest.clone(), policy)).unwrap();
            assert_eq!(resolved, Some(dest.clone()));
        }
    }

    #[test]
    fn test_resolve_override_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report.pdf");
        std::fs::write(&dest, b"old").unwrap();

        let resolved =
            resolve_destination(&target(dest.clone(), OverwritePolicy::Override)).unwrap();
        assert_eq!(resolved, Some(dest));
    }

    #[test]
    fn test_resolve_ignore_skips() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report.pdf");
        std::fs::write(&dest, b"old").unwrap();

        let resolved = resolve_destination(&target(dest, OverwritePolicy::Ignore)).unwrap();
        assert_eq!(resolved, None);
    }

    #[test]
    fn test_resolve_rename_probes_free_slot() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report.pdf");
        std::fs::write(&dest, b"old").unwrap();
        std::fs::write(dir.path().join("report-1.pdf"), b"old").unwrap();

        let resolved = resolve_destination(&target(dest, OverwritePolicy::Rename))
            .unwrap()
            .unwrap();
        assert_eq!(resolved, dir.path().join("report-2.pdf"));
    }

    #[test]
    fn test_resolve_rename_without_extension() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("README");
        std::fs::write(&dest, b"old").unwrap();

        let resolved = resolve_destination(&target(dest, OverwritePolicy::Rename))
            .unwrap()
            .unwrap();
        assert_eq!(resolved, dir.path().join("README-1"));
    }

    #[test]
    fn test_resolve_newer_size_skips_up_to_date_copy() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report.pdf");
        std::fs::write(&dest, vec![0u8; 4096]).unwrap();

        // Local file has the expected size and was written just now, long
        // after the remote last_update.
        let resolved =
            resolve_destination(&target(dest, OverwritePolicy::OverrideNewerSize)).unwrap();
        assert_eq!(resolved, None);
    }

    #[test]
    fn test_resolve_newer_size_replaces_size_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report.pdf");
        std::fs::write(&dest, b"truncated").unwrap();

        let resolved =
            resolve_destination(&target(dest.clone(), OverwritePolicy::OverrideNewerSize))
                .unwrap();
        assert_eq!(resolved, Some(dest));
    }

    #[test]
    fn test_resolve_directory_collision_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("report.pdf");
        std::fs::create_dir(&dest).unwrap();

        let err = resolve_destination(&target(dest, OverwritePolicy::Override)).unwrap_err();
        assert!(matches!(err, DriveError::Io(_)));
    }

    #[test]
    fn test_retry_constants() {
        assert_eq!(DOWNLOAD_RETRY_LIMIT, 5);
        assert_eq!(DOWNLOAD_RETRY_DELAY, Duration::from_secs(3));
    }

    mod loop_tests {
        use super::target;
        use crate::api::TokenProvider;
        use crate::error::{DriveError, Result};
        use crate::transfer::download::{
            temp_file_name, DownloadOutcome, OverwritePolicy, ResumableDownloader,
            DOWNLOAD_RETRY_DELAY,
        };
        use crate::transfer::state::{TransferSession, TransferState};
        use crate::transfer::testserver::{self, Script};
        use crate::HttpClient;
        use async_trait::async_trait;
        use std::sync::Arc;

        struct StaticTokens;

        #[async_trait]
        impl TokenProvider for StaticTokens {
            async fn current_access_token(&self) -> Result<String> {
                Ok("t".to_string())
            }
            async fn refresh_if_needed(&self) -> Result<()> {
                Ok(())
            }
        }

        fn downloader(session: Arc<TransferSession>) -> ResumableDownloader {
            ResumableDownloader::new(HttpClient::new(), Arc::new(StaticTokens), session)
        }

        fn content(len: usize) -> Vec<u8> {
            (0..len).map(|i| (i % 256) as u8).collect()
        }

        #[tokio::test]
        async fn test_full_fetch_writes_destination() {
            let dir = tempfile::tempdir().unwrap();
            let dest = dir.path().join("report.pdf");
            let data = content(4096);
            let (url, server) = testserver::spawn(vec![Script::ok(data.clone())]).await;

            let mut t = target(dest.clone(), OverwritePolicy::Override);
            t.source_url = url;
            let session = Arc::new(TransferSession::new(0));
            let outcome = downloader(session.clone()).download(&t).await.unwrap();

            assert_eq!(outcome, DownloadOutcome::Completed(dest.clone()));
            assert_eq!(std::fs::read(&dest).unwrap(), data);
            assert!(!dir.path().join(temp_file_name(&t.fid)).exists());
            assert_eq!(session.state(), TransferState::Finished);

            let requests = server.finish().await;
            assert_eq!(requests.len(), 1);
            // No partial on disk, so no Range header; token rides the query.
            assert_eq!(requests[0].header("range"), None);
            assert!(requests[0].head.contains("access_token=t"));
        }

        #[tokio::test]
        async fn test_resumes_from_partial_temp() {
            let dir = tempfile::tempdir().unwrap();
            let dest = dir.path().join("report.pdf");
            let data = content(4096);

            let mut t = target(dest.clone(), OverwritePolicy::Override);
            // Prior interrupted run left the first 1000 bytes behind.
            std::fs::write(dir.path().join(temp_file_name(&t.fid)), &data[..1000]).unwrap();

            let (url, server) = testserver::spawn(vec![Script::with_status(
                "206 Partial Content",
                data[1000..].to_vec(),
            )])
            .await;
            t.source_url = url;

            let session = Arc::new(TransferSession::new(0));
            let outcome = downloader(session).download(&t).await.unwrap();
            assert_eq!(outcome, DownloadOutcome::Completed(dest.clone()));
            // The published file is the full content, not just the tail.
            assert_eq!(std::fs::read(&dest).unwrap(), data);

            let requests = server.finish().await;
            assert_eq!(requests.len(), 1);
            assert_eq!(requests[0].header("range").as_deref(), Some("bytes=1000-"));
        }

        #[tokio::test]
        async fn test_local_io_error_propagates_without_retry() {
            let dir = tempfile::tempdir().unwrap();
            let dest = dir.path().join("report.pdf");
            let mut t = target(dest, OverwritePolicy::Override);
            // A directory squatting on the temp path makes every write
            // attempt fail locally; that is not worth a retry.
            std::fs::create_dir(dir.path().join(temp_file_name(&t.fid))).unwrap();

            let (url, server) = testserver::spawn(vec![
                Script::with_status("206 Partial Content", vec![0u8; 8]),
                Script::with_status("206 Partial Content", vec![0u8; 8]),
                Script::with_status("206 Partial Content", vec![0u8; 8]),
                Script::with_status("206 Partial Content", vec![0u8; 8]),
                Script::with_status("206 Partial Content", vec![0u8; 8]),
            ])
            .await;
            t.source_url = url;

            let session = Arc::new(TransferSession::new(0));
            let err = downloader(session).download(&t).await.unwrap_err();
            assert!(matches!(err, DriveError::Io(_)));
            // First failure surfaced; no second attempt reached the server.
            assert!(server.hit_count() <= 1);
            server.abort();
        }

        #[tokio::test(start_paused = true)]
        async fn test_token_failure_propagates_without_retry() {
            struct FailingTokens;

            #[async_trait]
            impl TokenProvider for FailingTokens {
                async fn current_access_token(&self) -> Result<String> {
                    Err(DriveError::Crypto("key material unavailable".to_string()))
                }
                async fn refresh_if_needed(&self) -> Result<()> {
                    Err(DriveError::Crypto("key material unavailable".to_string()))
                }
            }

            let dir = tempfile::tempdir().unwrap();
            let t = target(dir.path().join("report.pdf"), OverwritePolicy::Override);

            let session = Arc::new(TransferSession::new(0));
            let mut dl =
                ResumableDownloader::new(HttpClient::new(), Arc::new(FailingTokens), session);

            let start = tokio::time::Instant::now();
            let err = dl.download(&t).await.unwrap_err();
            assert!(matches!(err, DriveError::Crypto(_)));
            // Paused clock: any retry sleep would have advanced it.
            assert!(start.elapsed() < DOWNLOAD_RETRY_DELAY);
        }
    }
}
