//! Little-endian primitive decoding over block-chained storage.
//!
//! When the current view holds the whole value it is decoded in place.
//! Otherwise the value straddles a block boundary: its low-order bytes are
//! the tail of the current block and the high-order bytes are taken from the
//! front of the following block(s), assembled into a stack buffer and decoded
//! as if they were contiguous.

use log::trace;

use crate::block::BlockView;
use crate::chain::BlockResolver;

use super::cursor::BlockCursor;
use super::StreamError;

/// Widest primitive the decoder handles (u64 / f64).
pub(crate) const MAX_WIDTH: usize = 8;

impl<'a, R: BlockResolver<'a>> BlockCursor<'a, R> {
    pub(crate) fn decode<T>(
        &mut self,
        width:    usize,
        in_block: fn(&mut BlockView<'a>) -> T,
        spanning: fn(&[u8]) -> T,
    ) -> Result<T, StreamError> {
        debug_assert!(width <= MAX_WIDTH);
        if width as u64 > self.remaining() {
            return Err(StreamError::UnexpectedEndOfStream { offset: self.offset, size: self.size });
        }

        let view = self.view()?;
        if view.available() >= width {
            let value = in_block(view);
            self.advance(width);
            return Ok(value);
        }

        trace!("{width}-byte value at offset {} spans a block boundary", self.offset);
        let mut buf = [0u8; MAX_WIDTH];
        let mut filled = 0usize;
        while filled < width {
            let view = self.view()?;
            let n = view.available().min(width - filled);
            view.read_into(&mut buf[filled..filled + n]);
            filled += n;
            self.advance(n);
        }
        Ok(spanning(&buf[..width]))
    }
}
