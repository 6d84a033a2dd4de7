use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StreamError>;

/// Failures surfaced by [`SignatureStream`](crate::SignatureStream) operations.
///
/// End-of-stream and a missing signature are not errors; they are reported as
/// `Ok(0)` and `Ok(None)` respectively.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("seek to offset {position} failed: {source}")]
    Seek {
        position: u64,
        #[source]
        source: io::Error,
    },

    #[error("read at offset {position} failed: {source}")]
    Read {
        position: u64,
        #[source]
        source: io::Error,
    },

    #[error("size query failed: {source}")]
    Size {
        #[source]
        source: io::Error,
    },

    #[error("http: {0}")]
    Http(String),

    #[error("aborted at {current}/{total}")]
    Aborted { current: u64, total: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_position_and_cause() {
        let err = StreamError::Seek {
            position: 42,
            source: io::Error::new(io::ErrorKind::InvalidInput, "bad offset"),
        };
        assert_eq!(err.to_string(), "seek to offset 42 failed: bad offset");
        assert!(std::error::Error::source(&err).is_some());

        let err = StreamError::Aborted { current: 3, total: 9 };
        assert_eq!(err.to_string(), "aborted at 3/9");
    }
}
