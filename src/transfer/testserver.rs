//! Scripted local HTTP server for exercising the transfer loops against a
//! real socket. Each scripted response answers one request, in order, with
//! keep-alive framing so pooled clients can reuse the connection.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// One captured request: raw head (request line + headers) and body bytes.
pub(crate) struct Received {
    pub head: String,
    pub body: Vec<u8>,
}

impl Received {
    /// Header value by case-insensitive name, if present.
    pub fn header(&self, name: &str) -> Option<String> {
        let prefix = format!("{}:", name.to_ascii_lowercase());
        self.head.lines().find_map(|line| {
            line.to_ascii_lowercase()
                .strip_prefix(&prefix)
                .map(|_| line[prefix.len()..].trim().to_string())
        })
    }
}

/// One scripted response.
pub(crate) struct Script {
    status: &'static str,
    body: Vec<u8>,
}

impl Script {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::with_status("200 OK", body)
    }

    pub fn with_status(status: &'static str, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Running server handle.
pub(crate) struct ServerHandle {
    hits: Arc<AtomicUsize>,
    task: JoinHandle<Vec<Received>>,
}

impl ServerHandle {
    /// Requests answered so far.
    pub fn hit_count(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Wait for the whole script to be consumed and return the captured
    /// requests, in arrival order.
    pub async fn finish(self) -> Vec<Received> {
        self.task.await.expect("test server task")
    }

    /// Stop a server whose script was deliberately not exhausted.
    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Bind on an ephemeral local port and serve the script.
pub(crate) async fn spawn(responses: Vec<Script>) -> (String, ServerHandle) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind test server");
    let url = format!("http://{}", listener.local_addr().expect("local addr"));
    let hits = Arc::new(AtomicUsize::new(0));
    let task = tokio::spawn(run(listener, responses, hits.clone()));
    (url, ServerHandle { hits, task })
}

async fn run(
    listener: TcpListener,
    mut responses: Vec<Script>,
    hits: Arc<AtomicUsize>,
) -> Vec<Received> {
    let mut captured = Vec::new();
    'accept: while !responses.is_empty() {
        let Ok((mut stream, _)) = listener.accept().await else {
            break;
        };
        // Serve sequential requests on the same connection until the peer
        // hangs up or the script runs out.
        while !responses.is_empty() {
            let Some(request) = read_request(&mut stream).await else {
                continue 'accept;
            };
            captured.push(request);
            hits.fetch_add(1, Ordering::SeqCst);

            let script = responses.remove(0);
            let head = format!(
                "HTTP/1.1 {}\r\ncontent-length: {}\r\nconnection: keep-alive\r\n\r\n",
                script.status,
                script.body.len()
            );
            if stream.write_all(head.as_bytes()).await.is_err()
                || stream.write_all(&script.body).await.is_err()
            {
                continue 'accept;
            }
        }
    }
    captured
}

async fn read_request(stream: &mut TcpStream) -> Option<Received> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .find_map(|line| {
            line.to_ascii_lowercase()
                .strip_prefix("content-length:")
                .and_then(|v| v.trim().parse::<usize>().ok())
        })
        .unwrap_or(0);

    let mut body = buf[header_end + 4..].to_vec();
    while body.len() < content_length {
        let n = stream.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    body.truncate(content_length);

    Some(Received { head, body })
}
