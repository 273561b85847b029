use log::trace;

use crate::block::BlockView;
use crate::chain::BlockResolver;

use super::StreamError;

/// Position state shared by the bulk copy engine and the typed decoder.
///
/// `view` covers `offset` whenever it is `Some` and non-empty.  It is
/// refreshed eagerly when a read drains it, and lazily by [`view`] if the
/// eager refresh came back empty.
///
/// [`view`]: BlockCursor::view
#[derive(Debug)]
pub(crate) struct BlockCursor<'a, R> {
    pub(crate) resolver: R,
    pub(crate) size:     u64,
    pub(crate) offset:   u64,
    pub(crate) view:     Option<BlockView<'a>>,
}

impl<'a, R: BlockResolver<'a>> BlockCursor<'a, R> {
    pub(crate) fn new(resolver: R, size: u64) -> Self {
        let view = if size > 0 { resolver.resolve(0) } else { None };
        Self { resolver, size, offset: 0, view }
    }

    /// The resolver is only consulted for offsets inside the stream.
    fn locate(&self, offset: u64) -> Option<BlockView<'a>> {
        if offset < self.size {
            self.resolver.resolve(offset)
        } else {
            None
        }
    }

    #[inline]
    pub(crate) fn remaining(&self) -> u64 {
        self.size - self.offset
    }

    #[inline]
    pub(crate) fn at_end(&self) -> bool {
        self.offset == self.size
    }

    /// Move to `offset` (already clamped to `size`) and resolve its block.
    pub(crate) fn seek_to(&mut self, offset: u64) {
        debug_assert!(offset <= self.size);
        self.offset = offset;
        self.view = self.locate(offset);
    }

    /// The non-empty view covering `offset`.
    ///
    /// Fails when the resolver has no block for an offset below `size`.
    pub(crate) fn view(&mut self) -> Result<&mut BlockView<'a>, StreamError> {
        if self.view.as_ref().map_or(true, BlockView::is_exhausted) {
            self.view = self.locate(self.offset);
        }
        match self.view.as_mut() {
            Some(v) if !v.is_exhausted() => Ok(v),
            _ => {
                trace!("no block for offset {} of {}", self.offset, self.size);
                Err(StreamError::UnexpectedEndOfStream { offset: self.offset, size: self.size })
            }
        }
    }

    /// Account for `n` bytes consumed from the current view.
    #[inline]
    pub(crate) fn advance(&mut self, n: usize) {
        self.offset += n as u64;
        if self.view.as_ref().map_or(true, BlockView::is_exhausted) {
            self.view = self.locate(self.offset);
        }
    }
}
