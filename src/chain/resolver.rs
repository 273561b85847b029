//! Offset → block view resolution.

use log::trace;

use crate::block::BlockView;

/// Maps a logical offset within one entry to the view of the physical block
/// covering it.
///
/// Offsets are always produced by the stream cursor and satisfy
/// `0 <= offset <= size`.  `None` is the expected answer at `offset == size`;
/// `None` for any smaller offset means the storage is corrupt.
pub trait BlockResolver<'a> {
    fn resolve(&self, offset: u64) -> Option<BlockView<'a>>;
}

impl<'a, R: BlockResolver<'a> + ?Sized> BlockResolver<'a> for &R {
    fn resolve(&self, offset: u64) -> Option<BlockView<'a>> {
        (**self).resolve(offset)
    }
}

/// Resolver over an ordered block list laid out in fixed-size slots.
///
/// Block `b` occupies `storage[base + b * block_size ..][..block_size]`.
/// Views are clipped to the declared entry size and to the end of
/// `storage`, so slack bytes after an entry's last byte are never exposed.
#[derive(Debug, Clone)]
pub struct ChainResolver<'a> {
    storage:    &'a [u8],
    base:       u64,
    block_size: u64,
    blocks:     Vec<u32>,
    size:       u64,
}

impl<'a> ChainResolver<'a> {
    /// A zero `block_size` yields a resolver that never produces a view.
    pub fn new(storage: &'a [u8], base: u64, block_size: usize, blocks: Vec<u32>, size: u64) -> Self {
        Self { storage, base, block_size: block_size as u64, blocks, size }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn blocks(&self) -> &[u32] {
        &self.blocks
    }

    /// Bytes the chain can hold, regardless of the declared size.
    pub fn capacity(&self) -> u64 {
        self.blocks.len() as u64 * self.block_size
    }
}

impl<'a> BlockResolver<'a> for ChainResolver<'a> {
    fn resolve(&self, offset: u64) -> Option<BlockView<'a>> {
        if offset >= self.size {
            return None;
        }
        let index  = usize::try_from(offset.checked_div(self.block_size)?).ok()?;
        let within = offset % self.block_size;
        let block  = match self.blocks.get(index) {
            Some(&b) => b as u64,
            None => {
                trace!("offset {offset} maps past the chain ({} blocks)", self.blocks.len());
                return None;
            }
        };

        // The declared size comes from the file and may be anywhere up to
        // u64::MAX.
        let block_start = self.base.checked_add(block * self.block_size)?;
        let start = block_start.checked_add(within)?;
        let end = block_start.saturating_add(self.block_size)
            .min(start.saturating_add(self.size - offset))
            .min(self.storage.len() as u64);
        if start >= end {
            trace!("block {block} lies beyond the storage end");
            return None;
        }
        trace!("offset {offset} -> block {block} [{start}..{end})");
        Some(BlockView::new(&self.storage[start as usize..end as usize]))
    }
}
