use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use super::{Progress, SignatureStream};
use crate::error::Result;

/// Shared flag that flips a [`CancellableStream`] into aborting.
///
/// Clones observe the same flag, so one can be handed to another thread.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Wraps a stream so that [`report_progress`](SignatureStream::report_progress)
/// answers `Abort` once its token is cancelled. Everything else is delegated.
pub struct CancellableStream<S> {
    inner: S,
    token: CancelToken,
}

impl<S> CancellableStream<S> {
    pub fn new(inner: S, token: CancelToken) -> Self {
        Self { inner, token }
    }

    pub fn token(&self) -> &CancelToken {
        &self.token
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: SignatureStream> SignatureStream for CancellableStream<S> {
    fn read_at(&mut self, position: u64, buf: &mut [u8]) -> Result<usize> {
        self.inner.read_at(position, buf)
    }

    fn scan_for_signature(&mut self, start: u64, signature: u32) -> Result<Option<u64>> {
        self.inner.scan_for_signature(start, signature)
    }

    fn cache_size_hint(&self) -> usize {
        self.inner.cache_size_hint()
    }

    fn last_error(&self) -> &str {
        self.inner.last_error()
    }

    fn file_size(&mut self) -> Result<u64> {
        self.inner.file_size()
    }

    fn report_progress(&mut self, current: u64, total: u64) -> Progress {
        if self.token.is_cancelled() {
            debug!(current, total, "cancelled");
            return Progress::Abort;
        }
        self.inner.report_progress(current, total)
    }

    fn allocate(&self, size: usize) -> Option<Vec<u8>> {
        self.inner.allocate(size)
    }

    fn reallocate(&self, buf: Option<Vec<u8>>, size: usize) -> Option<Vec<u8>> {
        self.inner.reallocate(buf, size)
    }

    fn release(&self, buf: Option<Vec<u8>>) {
        self.inner.release(buf)
    }
}
