//! HTTP client wrapper shared by the transfer engine.
//!
//! Transfer loops never build ad-hoc `reqwest::Client`s per chunk; they all
//! go through one pooled client held here.

use reqwest::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION, CONTENT_RANGE, RANGE};
use reqwest::{Client, Response, StatusCode};

use crate::error::{DriveError, Result};

/// HTTP client for upload/download requests against transfer URLs.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client.
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }

    /// Create a new HTTP client routed through a proxy.
    pub fn with_proxy(proxy: &str) -> Result<Self> {
        let proxy = reqwest::Proxy::all(proxy)
            .map_err(|e| DriveError::Custom(format!("Invalid proxy: {}", e)))?;

        let client = Client::builder()
            .proxy(proxy)
            .build()
            .map_err(|e| DriveError::Custom(format!("Failed to build client: {}", e)))?;

        Ok(Self { client })
    }

    /// POST one upload chunk to a transfer URL.
    ///
    /// # Arguments
    /// * `url` - One-time upload URL issued by the node-creation API
    /// * `filename` - Destination filename, already percent-encoded
    /// * `session_id` - Stable chunk-correlation id (`{user_id}-{sha1}`)
    /// * `range` - `Content-Range` value (`bytes {start}-{end}/{total}`)
    /// * `body` - Raw chunk bytes
    ///
    /// # Returns
    /// The raw response; status handling is the caller's business because
    /// the upload protocol distinguishes range echoes from node payloads.
    pub async fn post_chunk(
        &self,
        url: &str,
        filename: &str,
        session_id: &str,
        range: &str,
        body: Vec<u8>,
    ) -> Result<Response> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_DISPOSITION,
            HeaderValue::from_str(&format!("attachment; filename=\"{}\"", filename))
                .map_err(|e| DriveError::Custom(format!("Invalid filename header: {}", e)))?,
        );
        headers.insert(
            "Session-Id",
            HeaderValue::from_str(session_id)
                .map_err(|e| DriveError::Custom(format!("Invalid session id: {}", e)))?,
        );
        headers.insert(
            CONTENT_RANGE,
            HeaderValue::from_str(range)
                .map_err(|e| DriveError::Custom(format!("Invalid content range: {}", e)))?,
        );

        let response = self
            .client
            .post(url)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        Ok(response)
    }

    /// GET file content, optionally resuming from a byte offset.
    ///
    /// The access token travels as a query parameter on the signed URL, per
    /// the download wire contract. Success is 200 or 206 (resumed).
    pub async fn get_content(
        &self,
        url: &str,
        access_token: &str,
        resume_from: Option<u64>,
    ) -> Result<Response> {
        let mut request = self
            .client
            .get(url)
            .query(&[("access_token", access_token)]);

        if let Some(offset) = resume_from {
            request = request.header(RANGE, format!("bytes={}-", offset));
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() && status != StatusCode::PARTIAL_CONTENT {
            return Err(DriveError::http(status.as_u16()));
        }

        Ok(response)
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}
