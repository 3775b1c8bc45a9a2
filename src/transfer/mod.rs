//! Transfer engine: sessions, throttling, chunked upload, resumable
//! download and batch orchestration.

pub mod download;
pub mod limit;
pub mod queue;
pub mod state;
pub mod upload;

#[cfg(test)]
pub(crate) mod testserver;

pub use download::{
    DownloadOutcome, DownloadTarget, OverwritePolicy, ResumableDownloader, DOWNLOAD_RETRY_DELAY,
    DOWNLOAD_RETRY_LIMIT,
};
pub use limit::RateLimiter;
pub use queue::{
    DownloadJob, Downloader, UploadJob, UploadOutcome, Uploader, MAX_CONCURRENT_TRANSFERS,
};
pub use state::{TransferSession, TransferState, PAUSE_POLL_INTERVAL};
pub use upload::{ChunkedUploader, UploadTarget, CHUNK_MAX, FIRST_CHUNK_MAX};
