mod cancel;
mod http;
mod local;

pub use cancel::{CancelToken, CancellableStream};
pub use http::HttpRangeStream;
pub use local::{LocalFileStream, MemoryStream, SeekableStream};

use crate::error::Result;

/// Default read-ahead advice returned by [`SignatureStream::cache_size_hint`].
pub const CACHE_SIZE: usize = 65536;

/// Smallest chunk the signature scanner will work with.
pub const MIN_CACHE_SIZE: usize = 4;

/// Answer to a [`SignatureStream::report_progress`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Continue,
    Abort,
}

/// Random-access byte source consumed by container probing code.
///
/// Every operation is synchronous. `read_at` and `scan_for_signature` move the
/// resource position, so a handle must not be shared between callers without
/// external locking.
pub trait SignatureStream {
    /// Seek to `position` and read up to `buf.len()` bytes.
    ///
    /// Returns the number of bytes read. A short count only happens at
    /// end-of-stream, and `Ok(0)` means nothing is left at `position`.
    fn read_at(&mut self, position: u64, buf: &mut [u8]) -> Result<usize>;

    /// Scan forward from `start` for the big-endian 4-byte `signature`.
    ///
    /// Returns the offset of the signature's first byte, or `None` once the
    /// stream is exhausted. On a hit the position is left just past the
    /// signature.
    fn scan_for_signature(&mut self, start: u64, signature: u32) -> Result<Option<u64>>;

    /// Advisory read-ahead size for a caller-owned cache.
    fn cache_size_hint(&self) -> usize {
        CACHE_SIZE
    }

    /// Description of the most recent failure, or `""` if none was recorded.
    fn last_error(&self) -> &str;

    /// Total length of the resource. The read position is left untouched.
    fn file_size(&mut self) -> Result<u64>;

    /// Polled by long-running callers; `Abort` asks them to stop.
    fn report_progress(&mut self, _current: u64, _total: u64) -> Progress {
        Progress::Continue
    }

    /// Zeroed buffer of `size` bytes, or `None` if the allocation fails.
    fn allocate(&self, size: usize) -> Option<Vec<u8>> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(size).ok()?;
        buf.resize(size, 0);
        Some(buf)
    }

    /// Resize `buf` to `size` bytes, keeping its prefix. `None` behaves like
    /// [`allocate`](Self::allocate).
    fn reallocate(&self, buf: Option<Vec<u8>>, size: usize) -> Option<Vec<u8>> {
        let Some(mut buf) = buf else {
            return self.allocate(size);
        };
        if size > buf.len() {
            buf.try_reserve_exact(size - buf.len()).ok()?;
        }
        buf.resize(size, 0);
        Some(buf)
    }

    fn release(&self, buf: Option<Vec<u8>>) {
        drop(buf);
    }
}

impl<S: SignatureStream + ?Sized> SignatureStream for Box<S> {
    fn read_at(&mut self, position: u64, buf: &mut [u8]) -> Result<usize> {
        (**self).read_at(position, buf)
    }

    fn scan_for_signature(&mut self, start: u64, signature: u32) -> Result<Option<u64>> {
        (**self).scan_for_signature(start, signature)
    }

    fn cache_size_hint(&self) -> usize {
        (**self).cache_size_hint()
    }

    fn last_error(&self) -> &str {
        (**self).last_error()
    }

    fn file_size(&mut self) -> Result<u64> {
        (**self).file_size()
    }

    fn report_progress(&mut self, current: u64, total: u64) -> Progress {
        (**self).report_progress(current, total)
    }

    fn allocate(&self, size: usize) -> Option<Vec<u8>> {
        (**self).allocate(size)
    }

    fn reallocate(&self, buf: Option<Vec<u8>>, size: usize) -> Option<Vec<u8>> {
        (**self).reallocate(buf, size)
    }

    fn release(&self, buf: Option<Vec<u8>>) {
        (**self).release(buf)
    }
}

/// Rolling 32-bit comparison window used by signature scans.
///
/// Holds O(1) state: the last four bytes seen and how many bytes were fed.
#[derive(Debug, Clone)]
pub struct SignatureWindow {
    signature: u32,
    window: u32,
    consumed: u64,
}

impl SignatureWindow {
    pub fn new(signature: u32) -> Self {
        Self {
            signature,
            window: 0,
            consumed: 0,
        }
    }

    /// Feed one byte. Returns true when the last four bytes equal the signature.
    pub fn push(&mut self, byte: u8) -> bool {
        self.window = (self.window << 8) | u32::from(byte);
        self.consumed += 1;
        // a zero signature must not match the initial empty window
        self.consumed >= 4 && self.window == self.signature
    }

    pub fn consumed(&self) -> u64 {
        self.consumed
    }
}

/// Single forward pass over chunks handed out by `fill`.
///
/// `fill(offset, chunk)` reads the bytes starting at `offset` and returns how
/// many it produced, `0` meaning end-of-stream. Returns the absolute offset of
/// the first match.
pub(crate) fn scan_chunks<F>(
    start: u64,
    signature: u32,
    chunk_size: usize,
    mut fill: F,
) -> Result<Option<u64>>
where
    F: FnMut(u64, &mut [u8]) -> Result<usize>,
{
    let mut window = SignatureWindow::new(signature);
    let mut chunk = vec![0u8; chunk_size.max(MIN_CACHE_SIZE)];
    let mut offset = start;

    loop {
        let n = fill(offset, &mut chunk)?;
        if n == 0 {
            return Ok(None);
        }
        for (i, &byte) in chunk[..n].iter().enumerate() {
            if window.push(byte) {
                return Ok(Some(offset + i as u64 + 1 - 4));
            }
        }
        offset += n as u64;
    }
}
