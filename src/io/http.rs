use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, warn};

use super::{CACHE_SIZE, MIN_CACHE_SIZE, SignatureStream, scan_chunks};
use crate::error::{Result, StreamError};

/// Stream backend over a remote resource fetched with HTTP Range requests.
///
/// The position is tracked locally. Requests are driven by a private
/// single-threaded runtime, so a handle must not be used from inside another
/// async runtime.
pub struct HttpRangeStream {
    runtime: Runtime,
    client: Client,
    url: String,
    size: u64,
    position: u64,
    cache_size: usize,
    transferred_bytes: AtomicU64,
    max_retry: u32,
    last_error: String,
}

impl HttpRangeStream {
    /// Connect to `url`.
    ///
    /// Sends a HEAD request to verify Range support and learn the size.
    pub fn connect(url: String) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| StreamError::Http(e.to_string()))?;
        Self::connect_with_client(url, client)
    }

    /// Like [`connect`](Self::connect) with a caller-configured client.
    pub fn connect_with_client(url: String, client: Client) -> Result<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| StreamError::Http(format!("failed to start runtime: {e}")))?;

        let resp = runtime
            .block_on(client.head(&url).send())
            .map_err(|e| StreamError::Http(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(StreamError::Http(format!(
                "request failed with status: {}",
                resp.status()
            )));
        }

        let accept_ranges = resp
            .headers()
            .get("accept-ranges")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("none");

        if !accept_ranges.contains("bytes") {
            return Err(StreamError::Http(
                "remote server does not support Range requests".to_string(),
            ));
        }

        let size = resp
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| {
                StreamError::Http("remote server did not return Content-Length".to_string())
            })?;

        debug!(%url, size, "connected");

        Ok(Self {
            runtime,
            client,
            url,
            size,
            position: 0,
            cache_size: CACHE_SIZE,
            transferred_bytes: AtomicU64::new(0),
            max_retry: 1,
            last_error: String::new(),
        })
    }

    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size.max(MIN_CACHE_SIZE);
        self
    }

    /// Allow `read_at` and scans to retry timeouts and connect errors, up to
    /// `max_retry` attempts in total. The default is a single attempt.
    pub fn with_max_retry(mut self, max_retry: u32) -> Self {
        self.max_retry = max_retry.max(1);
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Position the next operation would continue from.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }

    fn record(&mut self, err: StreamError) -> StreamError {
        warn!("{err}");
        self.last_error = err.to_string();
        err
    }

    /// Fetch `buf.len()` bytes at `offset`, clamped to the resource end.
    fn fetch(&self, offset: u64, buf: &mut [u8]) -> io::Result<usize> {
        let Some(end) = range_end(offset, buf.len(), self.size) else {
            return Ok(0);
        };
        let expected = (end - offset + 1) as usize;

        self.runtime.block_on(async {
            let mut received = 0;
            let mut retry_count = 0;

            while received < expected {
                let range = format!("bytes={}-{}", offset + received as u64, end);

                match self.client.get(&self.url).header("Range", &range).send().await {
                    Ok(resp) => {
                        if resp.status() != StatusCode::PARTIAL_CONTENT {
                            return Err(io::Error::other(format!(
                                "range request failed with status: {}",
                                resp.status()
                            )));
                        }

                        let bytes = resp.bytes().await.map_err(io::Error::other)?;
                        let chunk_len = bytes.len().min(expected - received);
                        if chunk_len == 0 {
                            return Err(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                format!("empty response for {range}"),
                            ));
                        }
                        buf[received..received + chunk_len].copy_from_slice(&bytes[..chunk_len]);
                        received += chunk_len;

                        self.transferred_bytes
                            .fetch_add(chunk_len as u64, Ordering::Relaxed);
                    }
                    Err(e) if e.is_timeout() || e.is_connect() => {
                        retry_count += 1;
                        if retry_count >= self.max_retry {
                            if retry_count > 1 {
                                warn!(retry_count, "giving up: {e}");
                            }
                            return Err(io::Error::other(e));
                        }
                        warn!(retry_count, max_retry = self.max_retry, "connection error: {e}");
                        tokio::time::sleep(Duration::from_millis(500 * retry_count as u64)).await;
                    }
                    Err(e) => return Err(io::Error::other(e)),
                }
            }

            Ok(received)
        })
    }
}

/// Inclusive last byte of a Range request, or `None` when nothing is left.
fn range_end(offset: u64, len: usize, size: u64) -> Option<u64> {
    if len == 0 || offset >= size {
        return None;
    }
    Some(offset.saturating_add(len as u64 - 1).min(size - 1))
}

impl SignatureStream for HttpRangeStream {
    fn read_at(&mut self, position: u64, buf: &mut [u8]) -> Result<usize> {
        self.position = position;
        match self.fetch(position, buf) {
            Ok(n) => {
                debug!(position, requested = buf.len(), read = n, "read_at");
                self.position += n as u64;
                Ok(n)
            }
            Err(source) => Err(self.record(StreamError::Read { position, source })),
        }
    }

    fn scan_for_signature(&mut self, start: u64, signature: u32) -> Result<Option<u64>> {
        self.position = start;

        let found = scan_chunks(start, signature, self.cache_size, |position, chunk| {
            self.fetch(position, chunk)
                .map_err(|source| StreamError::Read { position, source })
        });

        match found {
            Ok(Some(hit)) => {
                debug!(start, hit, "signature {signature:#010x} found");
                self.position = hit + 4;
                Ok(Some(hit))
            }
            Ok(None) => {
                debug!(start, "signature {signature:#010x} not found");
                self.position = start.max(self.size);
                Ok(None)
            }
            Err(err) => Err(self.record(err)),
        }
    }

    fn cache_size_hint(&self) -> usize {
        self.cache_size
    }

    fn last_error(&self) -> &str {
        &self.last_error
    }

    fn file_size(&mut self) -> Result<u64> {
        Ok(self.size)
    }
}
