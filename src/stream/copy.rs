//! Bulk copy engine.
//!
//! Drains the current block view into the destination, re-resolving the
//! next block each time a view runs dry, until the request is satisfied.

use crate::chain::BlockResolver;

use super::cursor::BlockCursor;
use super::StreamError;

impl<'a, R: BlockResolver<'a>> BlockCursor<'a, R> {
    /// Fill `dest` completely from the current offset.
    ///
    /// Asking for more than the declared remainder is a
    /// [`StreamError::BufferUnderrun`].  Running out of blocks before the
    /// declared size is storage corruption and yields
    /// [`StreamError::UnexpectedEndOfStream`]; in that case the offset has
    /// already advanced past the bytes that were copied.
    pub(crate) fn copy_into(&mut self, dest: &mut [u8]) -> Result<(), StreamError> {
        let requested = dest.len() as u64;
        if requested > self.remaining() {
            return Err(StreamError::BufferUnderrun { requested, available: self.remaining() });
        }

        let mut written = 0usize;
        while written < dest.len() {
            let view = self.view()?;
            let n = view.available().min(dest.len() - written);
            view.read_into(&mut dest[written..written + n]);
            written += n;
            self.advance(n);
        }
        Ok(())
    }
}
