use serde::Serialize;
use std::io;
use thiserror::Error;

/// Failures raised by [`DocumentStream`](super::DocumentStream).
///
/// Reaching the end of the stream through `read_byte`/`read_buffer` is not
/// an error; those return `Ok(None)`.  Every variant here is final for the
/// stream instance that raised it.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StreamError {
    #[error("cannot perform requested operation on a closed stream")]
    Closed,
    #[error("range {start}..{start}+{length} does not fit a buffer of {capacity} bytes")]
    InvalidArgument { start: usize, length: usize, capacity: usize },
    /// A fully-validating read asked for more than the declared remainder.
    #[error("buffer underrun: requested {requested} bytes but {available} available")]
    BufferUnderrun { requested: u64, available: u64 },
    /// No block backs an offset that lies inside the declared size, or a
    /// typed read ran out of bytes.
    #[error("reached end of document stream unexpectedly at offset {offset} of {size}")]
    UnexpectedEndOfStream { offset: u64, size: u64 },
}

impl From<StreamError> for io::Error {
    fn from(e: StreamError) -> Self {
        let kind = match e {
            StreamError::Closed                       => io::ErrorKind::Other,
            StreamError::InvalidArgument { .. }       => io::ErrorKind::InvalidInput,
            StreamError::BufferUnderrun { .. }        => io::ErrorKind::UnexpectedEof,
            StreamError::UnexpectedEndOfStream { .. } => io::ErrorKind::InvalidData,
        };
        io::Error::new(kind, e)
    }
}
