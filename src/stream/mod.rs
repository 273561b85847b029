//! Sequential/random-access byte stream over one directory entry.
//!
//! # Model
//! A [`DocumentStream`] presents an entry whose content is a chain of
//! fixed-capacity blocks as a flat stream of `size` bytes.  It owns the
//! current offset, a mark, the closed flag, and the block view covering
//! the current offset; blocks are located through a [`BlockResolver`].
//!
//! # End of stream
//! `read_byte` and `read_buffer` report the end with `Ok(None)`.  Typed
//! reads and `read_fully` never do: callers of those know from the
//! surrounding record structure that the bytes exist, so running short is
//! an error.  A resolver that has no block for an offset inside the declared
//! size always yields [`StreamError::UnexpectedEndOfStream`].
//!
//! # Lifecycle
//! `close` is idempotent and also runs on drop.  After closing, every
//! operation except `close`, `is_closed`, `position` and `size` fails with
//! [`StreamError::Closed`] and leaves the stream untouched.

mod copy;
mod cursor;
mod error;
mod typed;

pub use error::StreamError;

use byteorder::{ByteOrder, LittleEndian};
use log::trace;
use std::io::{self, Read};

use crate::block::BlockView;
use crate::chain::BlockResolver;
use cursor::BlockCursor;

pub const SIZE_SHORT: usize = 2;
pub const SIZE_INT:   usize = 4;
pub const SIZE_LONG:  usize = 8;

pub struct DocumentStream<'a, R: BlockResolver<'a>> {
    cursor:        BlockCursor<'a, R>,
    marked_offset: u64,
    closed:        bool,
}

impl<'a, R: BlockResolver<'a>> DocumentStream<'a, R> {
    /// Open a stream of `size` bytes backed by `resolver`.
    pub fn open(resolver: R, size: u64) -> Self {
        Self {
            cursor:        BlockCursor::new(resolver, size),
            marked_offset: 0,
            closed:        false,
        }
    }

    fn ensure_open(&self) -> Result<(), StreamError> {
        if self.closed {
            return Err(StreamError::Closed);
        }
        Ok(())
    }

    // ── State ────────────────────────────────────────────────────────────────

    /// Bytes between the current offset and the end of the stream.
    pub fn available(&self) -> Result<u64, StreamError> {
        self.ensure_open()?;
        Ok(self.cursor.remaining())
    }

    pub fn position(&self) -> u64 {
        self.cursor.offset
    }

    pub fn size(&self) -> u64 {
        self.cursor.size
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn close(&mut self) {
        if !self.closed {
            trace!("closing stream at offset {} of {}", self.cursor.offset, self.cursor.size);
            self.closed = true;
        }
    }

    /// Remember the current offset for [`reset`](Self::reset).
    ///
    /// There is no read limit: the whole stream stays addressable.
    pub fn mark(&mut self) -> Result<(), StreamError> {
        self.ensure_open()?;
        self.marked_offset = self.cursor.offset;
        Ok(())
    }

    /// Rewind to the last mark, or to the start if `mark` was never called.
    pub fn reset(&mut self) -> Result<(), StreamError> {
        self.ensure_open()?;
        self.cursor.seek_to(self.marked_offset);
        Ok(())
    }

    /// Advance by up to `n` bytes, never past the end.
    ///
    /// Returns the number of bytes actually skipped; a negative `n` skips
    /// nothing.
    pub fn skip(&mut self, n: i64) -> Result<u64, StreamError> {
        self.ensure_open()?;
        if n < 0 {
            return Ok(0);
        }
        let before = self.cursor.offset;
        let target = before.saturating_add(n as u64).min(self.cursor.size);
        self.cursor.seek_to(target);
        Ok(target - before)
    }

    // ── Byte and bulk reads ──────────────────────────────────────────────────

    /// Next byte, or `None` at the end of the stream.
    pub fn read_byte(&mut self) -> Result<Option<u8>, StreamError> {
        self.ensure_open()?;
        if self.cursor.at_end() {
            return Ok(None);
        }
        let byte = self.cursor.view()?.read_u8();
        self.cursor.advance(1);
        Ok(Some(byte))
    }

    /// Read up to `len` bytes into `dest[start..start + len]`.
    ///
    /// Returns `Some(0)` for `len == 0`, `None` at the end of the stream, and
    /// otherwise the number of bytes copied (the request clamped to what is
    /// left).
    pub fn read_buffer(&mut self, dest: &mut [u8], start: usize, len: usize) -> Result<Option<usize>, StreamError> {
        self.ensure_open()?;
        check_range(dest, start, len)?;
        if len == 0 {
            return Ok(Some(0));
        }
        if self.cursor.at_end() {
            return Ok(None);
        }
        let limit = len.min(usize::try_from(self.cursor.remaining()).unwrap_or(usize::MAX));
        self.cursor.copy_into(&mut dest[start..start + limit])?;
        Ok(Some(limit))
    }

    /// Fill `dest[start..start + len]` or fail.
    ///
    /// Requesting more than [`available`](Self::available) is a
    /// [`StreamError::BufferUnderrun`].
    pub fn read_fully(&mut self, dest: &mut [u8], start: usize, len: usize) -> Result<(), StreamError> {
        self.ensure_open()?;
        check_range(dest, start, len)?;
        self.cursor.copy_into(&mut dest[start..start + len])
    }

    // ── Typed little-endian reads ────────────────────────────────────────────

    pub fn read_u8(&mut self) -> Result<u8, StreamError> {
        self.ensure_open()?;
        self.cursor.decode(1, BlockView::read_u8, |b| b[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, StreamError> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_u16(&mut self) -> Result<u16, StreamError> {
        self.ensure_open()?;
        self.cursor.decode(SIZE_SHORT, BlockView::read_u16_le, LittleEndian::read_u16)
    }

    pub fn read_i16(&mut self) -> Result<i16, StreamError> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32, StreamError> {
        self.ensure_open()?;
        self.cursor.decode(SIZE_INT, BlockView::read_u32_le, LittleEndian::read_u32)
    }

    pub fn read_i32(&mut self) -> Result<i32, StreamError> {
        Ok(self.read_u32()? as i32)
    }

    pub fn read_u64(&mut self) -> Result<u64, StreamError> {
        self.ensure_open()?;
        self.cursor.decode(SIZE_LONG, BlockView::read_u64_le, LittleEndian::read_u64)
    }

    pub fn read_i64(&mut self) -> Result<i64, StreamError> {
        Ok(self.read_u64()? as i64)
    }

    /// IEEE-754 double stored as the bits of a little-endian u64.
    pub fn read_f64(&mut self) -> Result<f64, StreamError> {
        Ok(f64::from_bits(self.read_u64()?))
    }
}

fn check_range(dest: &[u8], start: usize, len: usize) -> Result<(), StreamError> {
    match start.checked_add(len) {
        Some(end) if end <= dest.len() => Ok(()),
        _ => Err(StreamError::InvalidArgument { start, length: len, capacity: dest.len() }),
    }
}

impl<'a, R: BlockResolver<'a>> Read for DocumentStream<'a, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len();
        Ok(self.read_buffer(buf, 0, len)?.unwrap_or(0))
    }
}

impl<'a, R: BlockResolver<'a>> Drop for DocumentStream<'a, R> {
    fn drop(&mut self) {
        self.close();
    }
}
