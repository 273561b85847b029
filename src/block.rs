//! Read-only window over one physical block.
//!
//! A [`BlockView`] covers the bytes from a logical stream offset up to the
//! end of the physical block holding that offset.  Every decoder consumes
//! from the front of the window, so `available()` shrinks as the stream
//! advances.  Views never own storage; they borrow the container image (or
//! the materialized mini stream) for `'a`.
//!
//! # Endianness
//! All multi-byte values are little-endian, decoded with
//! [`byteorder::LittleEndian`].  Callers must check `available()` before
//! decoding; the stream cursor does this for every typed read.

use byteorder::{ByteOrder, LittleEndian};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockView<'a> {
    data: &'a [u8],
}

impl<'a> BlockView<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// Bytes left between the read position and the end of the block.
    #[inline]
    pub fn available(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.data.is_empty()
    }

    /// Consume `n` bytes from the front of the window.
    ///
    /// # Panics
    /// If `n > available()`.
    #[inline]
    pub fn take(&mut self, n: usize) -> &'a [u8] {
        let (head, tail) = self.data.split_at(n);
        self.data = tail;
        head
    }

    #[inline]
    pub fn read_u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    #[inline]
    pub fn read_u16_le(&mut self) -> u16 {
        LittleEndian::read_u16(self.take(2))
    }

    #[inline]
    pub fn read_u32_le(&mut self) -> u32 {
        LittleEndian::read_u32(self.take(4))
    }

    #[inline]
    pub fn read_u64_le(&mut self) -> u64 {
        LittleEndian::read_u64(self.take(8))
    }

    /// Copy `dest.len()` bytes from the front of the window into `dest`.
    #[inline]
    pub fn read_into(&mut self, dest: &mut [u8]) {
        dest.copy_from_slice(self.take(dest.len()));
    }
}
