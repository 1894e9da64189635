//! HTTP transport abstraction for testability.
//!
//! The [`Transport`] trait is the only seam between the downloader and the
//! network. [`ReqwestTransport`] is the production implementation;
//! [`MemoryTransport`] serves bytes from memory for tests and offline use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use parking_lot::Mutex;
use reqwest::header::RANGE;
use reqwest::StatusCode;
use tracing::{debug, trace, warn};

use super::error::{DownloadError, DownloadResult};

/// Default User-Agent string for HTTP requests.
const DEFAULT_USER_AGENT: &str = concat!("depot/", env!("CARGO_PKG_VERSION"));

/// How the server answered a (possibly ranged) request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    /// Whole resource, starting at byte 0.
    Full,
    /// Partial content starting at the requested offset.
    Partial,
    /// The requested offset is at or beyond the end of the resource.
    RangeNotSatisfiable,
}

/// A response whose body is streamed in chunks.
pub struct TransportResponse {
    /// How the request was answered.
    pub kind: ResponseKind,
    /// Length of the body, if the server reported it.
    pub content_length: Option<u64>,
    /// Body chunks.
    pub body: BoxStream<'static, DownloadResult<Bytes>>,
}

impl std::fmt::Debug for TransportResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportResponse")
            .field("kind", &self.kind)
            .field("content_length", &self.content_length)
            .finish()
    }
}

/// Trait for issuing GET requests.
pub trait Transport: Send + Sync {
    /// Performs a GET request.
    ///
    /// When `offset` is non-zero the request asks for the bytes from `offset`
    /// to the end of the resource (`Range: bytes=<offset>-`). Servers may
    /// ignore the range and answer with the full body.
    fn get(&self, url: &str, offset: u64) -> BoxFuture<'_, DownloadResult<TransportResponse>>;
}

/// Production transport using reqwest.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Duration,
}

impl std::fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ReqwestTransport {
    /// Creates a transport with the given request timeout.
    pub fn new(timeout: Duration) -> DownloadResult<Self> {
        Self::with_user_agent(timeout, DEFAULT_USER_AGENT)
    }

    /// Creates a transport that identifies itself with `user_agent`.
    pub fn with_user_agent(timeout: Duration, user_agent: &str) -> DownloadResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(user_agent)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(30))
            .build()
            .map_err(|e| DownloadError::Transport {
                url: String::new(),
                reason: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self { client, timeout })
    }

    fn map_error(url: &str, timeout: Duration, e: reqwest::Error) -> DownloadError {
        if e.is_timeout() {
            DownloadError::Timeout {
                url: url.to_string(),
                timeout_secs: timeout.as_secs(),
            }
        } else {
            DownloadError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            }
        }
    }
}

impl Transport for ReqwestTransport {
    fn get(&self, url: &str, offset: u64) -> BoxFuture<'_, DownloadResult<TransportResponse>> {
        let url = url.to_string();
        Box::pin(async move {
            trace!(url = %url, offset, "HTTP GET request starting");

            let mut request = self.client.get(&url);
            if offset > 0 {
                request = request.header(RANGE, format!("bytes={}-", offset));
            }

            let response = match request.send().await {
                Ok(resp) => resp,
                Err(e) => {
                    warn!(
                        url = %url,
                        error = %e,
                        is_connect = e.is_connect(),
                        is_timeout = e.is_timeout(),
                        "HTTP request failed"
                    );
                    return Err(Self::map_error(&url, self.timeout, e));
                }
            };

            let status = response.status();
            debug!(url = %url, status = status.as_u16(), "HTTP response received");

            let kind = if status == StatusCode::PARTIAL_CONTENT {
                ResponseKind::Partial
            } else if status == StatusCode::RANGE_NOT_SATISFIABLE && offset > 0 {
                ResponseKind::RangeNotSatisfiable
            } else if status.is_success() {
                ResponseKind::Full
            } else {
                warn!(url = %url, status = status.as_u16(), "HTTP error status");
                return Err(DownloadError::HttpStatus {
                    url,
                    status: status.as_u16(),
                });
            };

            let content_length = match kind {
                ResponseKind::RangeNotSatisfiable => Some(0),
                _ => response.content_length(),
            };

            let timeout = self.timeout;
            let stream_url = url.clone();
            let body = match kind {
                ResponseKind::RangeNotSatisfiable => stream::empty().boxed(),
                _ => response
                    .bytes_stream()
                    .map(move |chunk| chunk.map_err(|e| Self::map_error(&stream_url, timeout, e)))
                    .boxed(),
            };

            Ok(TransportResponse {
                kind,
                content_length,
                body,
            })
        })
    }
}

/// Chunk size used when streaming from memory.
const MEMORY_CHUNK_SIZE: usize = 16 * 1024;

#[derive(Default)]
struct MemoryState {
    resources: HashMap<String, Bytes>,
    /// One-shot interruptions: url -> bytes delivered before the stream fails
    interruptions: HashMap<String, u64>,
    /// One-shot request failures
    failures: HashMap<String, u32>,
    /// Offsets requested, in order
    requests: Vec<(String, u64)>,
    ignore_ranges: bool,
    delay: Option<Duration>,
}

/// In-process transport serving resources from memory.
///
/// Supports ranged requests, one-shot interruptions and request failures,
/// and records every request so callers can assert on the traffic.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
    in_flight: Arc<AtomicUsize>,
}

impl MemoryTransport {
    /// Creates an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `data` at `url`.
    pub fn insert(&self, url: impl Into<String>, data: impl Into<Bytes>) {
        self.state.lock().resources.insert(url.into(), data.into());
    }

    /// Stop serving `url`.
    pub fn remove(&self, url: &str) {
        self.state.lock().resources.remove(url);
    }

    /// Interrupt the next transfer of `url` after `after_bytes` bytes of body.
    pub fn interrupt_next(&self, url: impl Into<String>, after_bytes: u64) {
        self.state.lock().interruptions.insert(url.into(), after_bytes);
    }

    /// Fail the next `times` requests for `url` with a transport error.
    pub fn fail_next(&self, url: impl Into<String>, times: u32) {
        self.state.lock().failures.insert(url.into(), times);
    }

    /// Answer ranged requests with the full body, like servers without range support.
    pub fn ignore_ranges(&self, ignore: bool) {
        self.state.lock().ignore_ranges = ignore;
    }

    /// Delay every response by `delay`.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = Some(delay);
    }

    /// Number of requests issued for `url`.
    pub fn request_count(&self, url: &str) -> usize {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|(u, _)| u == url)
            .count()
    }

    /// Offsets requested for `url`, in order.
    pub fn requested_offsets(&self, url: &str) -> Vec<u64> {
        self.state
            .lock()
            .requests
            .iter()
            .filter(|(u, _)| u == url)
            .map(|(_, offset)| *offset)
            .collect()
    }

    /// Number of requests currently being answered.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

impl Transport for MemoryTransport {
    fn get(&self, url: &str, offset: u64) -> BoxFuture<'_, DownloadResult<TransportResponse>> {
        let url = url.to_string();
        Box::pin(async move {
            let delay = {
                let mut state = self.state.lock();
                state.requests.push((url.clone(), offset));
                state.delay
            };

            if let Some(delay) = delay {
                self.in_flight.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(delay).await;
                self.in_flight.fetch_sub(1, Ordering::SeqCst);
            }

            let mut state = self.state.lock();

            if let Some(remaining) = state.failures.get_mut(&url) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(DownloadError::Transport {
                        url,
                        reason: "injected failure".to_string(),
                    });
                }
            }

            let data = state
                .resources
                .get(&url)
                .cloned()
                .ok_or_else(|| DownloadError::HttpStatus {
                    url: url.clone(),
                    status: 404,
                })?;

            let (kind, body) = if offset == 0 || state.ignore_ranges {
                (ResponseKind::Full, data)
            } else if offset >= data.len() as u64 {
                (ResponseKind::RangeNotSatisfiable, Bytes::new())
            } else {
                (ResponseKind::Partial, data.slice(offset as usize..))
            };

            let interrupt_at = state.interruptions.remove(&url);
            drop(state);

            let content_length = Some(body.len() as u64);
            let mut chunks: Vec<DownloadResult<Bytes>> = Vec::new();
            let deliver = interrupt_at
                .map(|n| (n as usize).min(body.len()))
                .unwrap_or(body.len());
            let mut pos = 0;
            while pos < deliver {
                let end = (pos + MEMORY_CHUNK_SIZE).min(deliver);
                chunks.push(Ok(body.slice(pos..end)));
                pos = end;
            }
            if interrupt_at.is_some() {
                chunks.push(Err(DownloadError::Transport {
                    url: url.clone(),
                    reason: "connection reset".to_string(),
                }));
            }

            Ok(TransportResponse {
                kind,
                content_length,
                body: stream::iter(chunks).boxed(),
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn collect(response: TransportResponse) -> DownloadResult<Vec<u8>> {
        let mut body = response.body;
        let mut out = Vec::new();
        while let Some(chunk) = body.next().await {
            out.extend_from_slice(&chunk?);
        }
        Ok(out)
    }

    #[test]
    fn test_reqwest_transport_creation() {
        let transport = ReqwestTransport::new(Duration::from_secs(5)).unwrap();
        assert_eq!(transport.timeout, Duration::from_secs(5));

        let custom = ReqwestTransport::with_user_agent(Duration::from_secs(1), "game/1.0");
        assert!(custom.is_ok());
    }

    #[tokio::test]
    async fn test_memory_full_response() {
        let transport = MemoryTransport::new();
        transport.insert("mem://a", vec![1u8, 2, 3]);

        let response = transport.get("mem://a", 0).await.unwrap();
        assert_eq!(response.kind, ResponseKind::Full);
        assert_eq!(collect(response).await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_memory_ranged_response() {
        let transport = MemoryTransport::new();
        transport.insert("mem://a", vec![1u8, 2, 3, 4]);

        let response = transport.get("mem://a", 2).await.unwrap();
        assert_eq!(response.kind, ResponseKind::Partial);
        assert_eq!(collect(response).await.unwrap(), vec![3, 4]);
        assert_eq!(transport.requested_offsets("mem://a"), vec![2]);
    }

    #[tokio::test]
    async fn test_memory_range_past_end() {
        let transport = MemoryTransport::new();
        transport.insert("mem://a", vec![1u8, 2]);

        let response = transport.get("mem://a", 2).await.unwrap();
        assert_eq!(response.kind, ResponseKind::RangeNotSatisfiable);
    }

    #[tokio::test]
    async fn test_memory_missing_is_404() {
        let transport = MemoryTransport::new();
        let err = transport.get("mem://missing", 0).await.unwrap_err();
        assert!(matches!(err, DownloadError::HttpStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_memory_interruption_is_one_shot() {
        let transport = MemoryTransport::new();
        transport.insert("mem://a", vec![7u8; 100]);
        transport.interrupt_next("mem://a", 40);

        let first = transport.get("mem://a", 0).await.unwrap();
        assert!(collect(first).await.is_err());

        let second = transport.get("mem://a", 0).await.unwrap();
        assert_eq!(collect(second).await.unwrap().len(), 100);
    }

    #[tokio::test]
    async fn test_memory_fail_next() {
        let transport = MemoryTransport::new();
        transport.insert("mem://a", vec![1u8]);
        transport.fail_next("mem://a", 1);

        assert!(transport.get("mem://a", 0).await.is_err());
        assert!(transport.get("mem://a", 0).await.is_ok());
        assert_eq!(transport.request_count("mem://a"), 2);
    }
}
