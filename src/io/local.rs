use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{debug, warn};

use super::{CACHE_SIZE, MIN_CACHE_SIZE, SignatureStream, scan_chunks};
use crate::error::{Result, StreamError};

/// Stream backend over any seekable resource it exclusively owns.
pub struct SeekableStream<R> {
    inner: R,
    cache_size: usize,
    last_error: String,
}

/// Backend over a local file.
pub type LocalFileStream = SeekableStream<File>;

/// Backend over an owned byte buffer.
pub type MemoryStream = SeekableStream<Cursor<Vec<u8>>>;

impl LocalFileStream {
    /// Open `path` read-only.
    pub fn open(path: &Path) -> io::Result<Self> {
        Ok(Self::new(File::open(path)?))
    }
}

impl MemoryStream {
    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(Cursor::new(bytes.into()))
    }
}

impl<R> SeekableStream<R> {
    /// Bind an already opened resource. Its current position is kept.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            cache_size: CACHE_SIZE,
            last_error: String::new(),
        }
    }

    /// Override the advisory cache size, which is also the scan chunk size.
    pub fn with_cache_size(mut self, cache_size: usize) -> Self {
        self.cache_size = cache_size.max(MIN_CACHE_SIZE);
        self
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Give the resource back to the caller.
    pub fn into_inner(self) -> R {
        self.inner
    }

    fn record(&mut self, err: StreamError) -> StreamError {
        warn!("{err}");
        self.last_error = err.to_string();
        err
    }
}

impl<R: Read + Seek> SeekableStream<R> {
    fn seek_to(&mut self, position: u64) -> Result<()> {
        match self.inner.seek(SeekFrom::Start(position)) {
            Ok(_) => Ok(()),
            Err(source) => Err(self.record(StreamError::Seek { position, source })),
        }
    }
}

impl<R: Read + Seek> SignatureStream for SeekableStream<R> {
    fn read_at(&mut self, position: u64, buf: &mut [u8]) -> Result<usize> {
        self.seek_to(position)?;
        match read_full(&mut self.inner, buf) {
            Ok(n) => {
                debug!(position, requested = buf.len(), read = n, "read_at");
                Ok(n)
            }
            Err(source) => Err(self.record(StreamError::Read { position, source })),
        }
    }

    fn scan_for_signature(&mut self, start: u64, signature: u32) -> Result<Option<u64>> {
        self.seek_to(start)?;

        let inner = &mut self.inner;
        let found = scan_chunks(start, signature, self.cache_size, |position, chunk| {
            read_full(&mut *inner, chunk).map_err(|source| StreamError::Read { position, source })
        });

        match found {
            Ok(Some(hit)) => {
                debug!(start, hit, "signature {signature:#010x} found");
                // chunked reads overshoot; leave the position just past the match
                self.seek_to(hit + 4)?;
                Ok(Some(hit))
            }
            Ok(None) => {
                debug!(start, "signature {signature:#010x} not found");
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
        match measure(&mut self.inner) {
            Ok(size) => Ok(size),
            Err(source) => Err(self.record(StreamError::Size { source })),
        }
    }
}

/// Read until `buf` is full or the reader reports end-of-stream.
///
/// An error after some bytes arrived ends the read early with the partial
/// count; the next call sees the error again.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if filled > 0 => {
                debug!(filled, "partial read ended by: {e}");
                break;
            }
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

fn measure<R: Seek>(inner: &mut R) -> io::Result<u64> {
    let saved = inner.stream_position()?;
    let end = inner.seek(SeekFrom::End(0));
    // restore even when the end could not be reached
    inner.seek(SeekFrom::Start(saved))?;
    end
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    /// Reader that hands out `good` bytes and then fails every read.
    struct Flaky {
        data: Cursor<Vec<u8>>,
        good: u64,
        chunk: usize,
    }

    impl Read for Flaky {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.data.position() >= self.good {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device went away"));
            }
            let limit = buf.len().min(self.chunk);
            self.data.read(&mut buf[..limit])
        }
    }

    impl Seek for Flaky {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.data.seek(pos)
        }
    }

    /// Seekable buffer whose resource end cannot be reached.
    struct Endless(Cursor<Vec<u8>>);

    impl Read for Endless {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            self.0.read(buf)
        }
    }

    impl Seek for Endless {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            match pos {
                SeekFrom::End(_) => Err(io::Error::new(io::ErrorKind::Unsupported, "no end")),
                pos => self.0.seek(pos),
            }
        }
    }

    fn flaky(len: usize, good: u64) -> SeekableStream<Flaky> {
        SeekableStream::new(Flaky {
            data: Cursor::new((0..len as u8).collect()),
            good,
            chunk: 3,
        })
    }

    #[test]
    fn short_read_at_tail_then_eof() {
        let mut stream = MemoryStream::from_bytes(vec![0, 1, 2, 3, 4, 5, 6, 7]);
        let mut buf = [0xEEu8; 10];
        assert_eq!(stream.read_at(5, &mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[5, 6, 7]);
        assert!(buf[3..].iter().all(|&b| b == 0xEE));
        assert_eq!(stream.read_at(8, &mut buf).unwrap(), 0);
        assert_eq!(stream.read_at(1000, &mut buf).unwrap(), 0);
        assert_eq!(stream.last_error(), "");
    }

    #[test]
    fn empty_buffer_reads_nothing() {
        let mut stream = MemoryStream::from_bytes(vec![1, 2, 3]);
        assert_eq!(stream.read_at(1, &mut []).unwrap(), 0);
    }

    #[test]
    fn short_underlying_reads_are_stitched_together() {
        let mut stream = flaky(32, 32);
        let mut buf = [0u8; 10];
        assert_eq!(stream.read_at(4, &mut buf).unwrap(), 10);
        assert_eq!(buf, [4, 5, 6, 7, 8, 9, 10, 11, 12, 13]);
    }

    #[test]
    fn read_failure_is_recorded() {
        let mut stream = flaky(16, 0);
        let mut buf = [0u8; 4];
        let err = stream.read_at(2, &mut buf).unwrap_err();
        assert!(matches!(err, StreamError::Read { position: 2, .. }));
        assert!(stream.last_error().contains("device went away"));
    }

    #[test]
    fn partial_read_before_failure_succeeds() {
        let mut stream = flaky(16, 6);
        let mut buf = [0u8; 8];
        assert_eq!(stream.read_at(0, &mut buf).unwrap(), 6);
        assert_eq!(stream.last_error(), "");
        assert!(stream.read_at(6, &mut buf).is_err());
        assert!(!stream.last_error().is_empty());
    }

    #[test]
    fn error_text_survives_later_success() {
        let mut stream = flaky(16, 6);
        let mut buf = [0u8; 2];
        stream.read_at(10, &mut buf).unwrap_err();
        let recorded = stream.last_error().to_owned();
        assert_eq!(stream.read_at(0, &mut buf).unwrap(), 2);
        assert_eq!(stream.last_error(), recorded);
    }

    #[test]
    fn seek_failure_on_file() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(b"abcdef").unwrap();
        let mut stream = LocalFileStream::new(file);
        let mut buf = [0u8; 4];

        let err = stream.read_at(u64::MAX, &mut buf).unwrap_err();
        assert!(matches!(err, StreamError::Seek { position: u64::MAX, .. }));
        assert!(!stream.last_error().is_empty());

        let err = stream.scan_for_signature(u64::MAX, 1).unwrap_err();
        assert!(matches!(err, StreamError::Seek { .. }));
    }

    #[test]
    fn file_size_restores_position() {
        let mut stream = MemoryStream::from_bytes(b"0123456789".to_vec());
        let mut buf = [0u8; 3];
        stream.read_at(2, &mut buf).unwrap();
        let before = stream.get_mut().stream_position().unwrap();

        assert_eq!(stream.file_size().unwrap(), 10);
        assert_eq!(stream.get_mut().stream_position().unwrap(), before);
        assert_eq!(before, 5);
    }

    #[test]
    fn file_size_failure_is_recorded_and_keeps_position() {
        let mut stream = SeekableStream::new(Endless(Cursor::new(vec![1u8; 20])));
        let mut buf = [0u8; 6];
        assert_eq!(stream.read_at(3, &mut buf).unwrap(), 6);

        let err = stream.file_size().unwrap_err();
        assert!(matches!(err, StreamError::Size { .. }));
        assert!(stream.last_error().contains("no end"));
        assert_eq!(stream.get_ref().0.position(), 9);
    }

    #[test]
    fn new_keeps_existing_position() {
        let mut cursor = Cursor::new(vec![0u8; 12]);
        cursor.set_position(7);
        let mut stream = SeekableStream::new(cursor);
        assert_eq!(stream.file_size().unwrap(), 12);
        assert_eq!(stream.get_ref().position(), 7);
    }

    #[test]
    fn scan_leaves_position_after_signature() {
        let mut data = vec![0u8; 100];
        data[40..44].copy_from_slice(&[0x1F, 0x43, 0xB6, 0x75]);
        let mut stream = MemoryStream::from_bytes(data).with_cache_size(16);

        assert_eq!(stream.scan_for_signature(3, 0x1F43_B675).unwrap(), Some(40));
        assert_eq!(stream.get_ref().position(), 44);
    }

    #[test]
    fn scan_miss_consumes_the_rest() {
        let mut stream = MemoryStream::from_bytes(vec![7u8; 50]).with_cache_size(8);
        assert_eq!(stream.scan_for_signature(10, 0x1A45_DFA3).unwrap(), None);
        assert_eq!(stream.get_ref().position(), 50);
        assert_eq!(stream.last_error(), "");
    }

    #[test]
    fn scan_read_failure_is_an_error() {
        let mut stream = flaky(64, 0).with_cache_size(8);
        let err = stream.scan_for_signature(0, 0x1A45_DFA3).unwrap_err();
        assert!(matches!(err, StreamError::Read { .. }));
        assert!(stream.last_error().contains("device went away"));
    }

    #[test]
    fn cache_size_hint_is_fixed_with_a_floor() {
        let stream = MemoryStream::from_bytes(Vec::new());
        assert_eq!(stream.cache_size_hint(), CACHE_SIZE);
        let stream = stream.with_cache_size(1);
        assert_eq!(stream.cache_size_hint(), MIN_CACHE_SIZE);
    }

    #[test]
    fn into_inner_returns_resource() {
        let stream = MemoryStream::from_bytes(vec![9u8, 8]);
        assert_eq!(stream.into_inner().into_inner(), vec![9, 8]);
    }
}
