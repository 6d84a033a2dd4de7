//! # sigstream
//!
//! Pluggable random-access byte streams for media container probing.
//!
//! A container parser only needs a handful of operations from the resource it
//! reads: positioned reads, a forward scan for a 4-byte signature, the total
//! size, a read-ahead hint and a progress/cancellation seam. The
//! [`SignatureStream`] trait captures exactly that, so the parser never needs to
//! know whether it is reading a local file, an in-memory buffer or a remote
//! HTTP resource.
//!
//! ## Backends
//!
//! - [`LocalFileStream`] over a local seekable file
//! - [`MemoryStream`] over an owned byte buffer
//! - [`HttpRangeStream`] over an HTTP/HTTPS URL using Range requests
//! - [`CancellableStream`] wrapping any of the above with a [`CancelToken`]
//!
//! ## Contract
//!
//! - `read_at` returns `Ok(0)` at end-of-stream and a short count only when the
//!   stream ends inside the requested range.
//! - `scan_for_signature` returns `Ok(None)` when the signature is absent.
//! - Failures are returned as [`StreamError`] and their description is also
//!   kept on the handle, queryable through `last_error`.
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use sigstream::{LocalFileStream, SignatureStream};
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut stream = LocalFileStream::open(Path::new("movie.mkv"))?;
//!
//!     // EBML header magic
//!     if let Some(offset) = stream.scan_for_signature(0, 0x1A45_DFA3)? {
//!         let mut header = [0u8; 16];
//!         let n = stream.read_at(offset, &mut header)?;
//!         println!("EBML header at {offset}: {:02x?}", &header[..n]);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod error;
pub mod io;

pub use cli::Cli;
pub use error::{Result, StreamError};
pub use io::{
    CACHE_SIZE, CancelToken, CancellableStream, HttpRangeStream, LocalFileStream, MemoryStream,
    Progress, SeekableStream, SignatureStream, SignatureWindow,
};
