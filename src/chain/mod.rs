//! Allocation tables and block chains.
//!
//! A [`ChainTable`] is the FAT (or MiniFAT) flattened into a `Vec<u32>` of
//! next-block indices: `next[i]` is the block following `i` in its chain.
//! Chains are walked once, when a stream is opened, into an ordered block
//! list; the [`ChainResolver`] then maps logical offsets to block views as a
//! pure function of that list.
//!
//! # Markers
//! | Value        | Meaning                          |
//! |--------------|----------------------------------|
//! | `0xFFFFFFFF` | free block                       |
//! | `0xFFFFFFFE` | end of chain                     |
//! | `0xFFFFFFFD` | block holds FAT entries          |
//! | `0xFFFFFFFC` | block holds DIFAT entries        |

pub mod resolver;

pub use resolver::{BlockResolver, ChainResolver};

use byteorder::{ByteOrder, LittleEndian};
use log::debug;
use serde::Serialize;
use thiserror::Error;

use crate::header::{Header, INLINE_DIFAT_ENTRIES};

pub const FREE_SECT:    u32 = 0xFFFF_FFFF;
pub const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
pub const FAT_SECT:     u32 = 0xFFFF_FFFD;
pub const DIF_SECT:     u32 = 0xFFFF_FFFC;
/// Largest value that is an ordinary block index.
pub const MAX_REG_SECT: u32 = 0xFFFF_FFFA;

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChainError {
    #[error("Chain revisits block {block}")]
    Cycle { block: u32 },
    #[error("Block {block} is outside the allocation table ({table_len} entries)")]
    OutOfRange { block: u32, table_len: usize },
    #[error("Unexpected marker {marker:#010x} inside a chain")]
    UnexpectedMarker { marker: u32 },
    #[error("Sector {sector} lies beyond the end of the file")]
    SectorOutOfFile { sector: u32 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainTable {
    next: Vec<u32>,
}

impl ChainTable {
    pub fn new(next: Vec<u32>) -> Self {
        Self { next }
    }

    pub fn len(&self) -> usize {
        self.next.len()
    }

    pub fn is_empty(&self) -> bool {
        self.next.is_empty()
    }

    pub fn next(&self, block: u32) -> Option<u32> {
        self.next.get(block as usize).copied()
    }

    /// Walk the chain starting at `start` into an ordered block list.
    ///
    /// `start == END_OF_CHAIN` is the empty chain.
    pub fn chain(&self, start: u32) -> Result<Vec<u32>, ChainError> {
        let mut blocks = Vec::new();
        let mut seen = vec![false; self.next.len()];
        let mut current = start;
        while current != END_OF_CHAIN {
            if current > MAX_REG_SECT {
                return Err(ChainError::UnexpectedMarker { marker: current });
            }
            let idx = current as usize;
            if idx >= self.next.len() {
                return Err(ChainError::OutOfRange { block: current, table_len: self.next.len() });
            }
            if seen[idx] {
                return Err(ChainError::Cycle { block: current });
            }
            seen[idx] = true;
            blocks.push(current);
            current = self.next[idx];
        }
        Ok(blocks)
    }
}

/// Borrow the bytes of sector `id` from the file image.
pub fn sector<'a>(image: &'a [u8], header: &Header, id: u32) -> Result<&'a [u8], ChainError> {
    let size  = header.sector_size();
    let start = header.sector_offset(id);
    let end   = start + size as u64;
    if end > image.len() as u64 {
        return Err(ChainError::SectorOutOfFile { sector: id });
    }
    Ok(&image[start as usize..end as usize])
}

fn append_entries(table: &mut Vec<u32>, bytes: &[u8]) {
    table.extend(bytes.chunks_exact(4).map(LittleEndian::read_u32));
}

/// Build the FAT from the inline DIFAT entries and the DIFAT sector chain.
pub fn load_fat(image: &[u8], header: &Header) -> Result<ChainTable, ChainError> {
    let wanted = header.num_fat_sectors as usize;
    let mut fat_sectors: Vec<u32> = header.difat.iter()
        .copied()
        .take(wanted.min(INLINE_DIFAT_ENTRIES))
        .filter(|&s| s <= MAX_REG_SECT)
        .collect();

    // Each DIFAT sector holds (sector_size / 4 - 1) entries plus a link to
    // the next DIFAT sector in its last slot.  The walk is bounded by the
    // sectors actually visited, not by the header's DIFAT sector count.
    let per_difat = header.sector_size() / 4 - 1;
    let mut seen = vec![false; image.len() / header.sector_size()];
    let mut difat_sector = header.first_difat_sector;
    while difat_sector <= MAX_REG_SECT && fat_sectors.len() < wanted {
        let bytes = sector(image, header, difat_sector)?;
        let slot = &mut seen[difat_sector as usize];
        if *slot {
            return Err(ChainError::Cycle { block: difat_sector });
        }
        *slot = true;
        for entry in bytes.chunks_exact(4).take(per_difat).map(LittleEndian::read_u32) {
            if entry <= MAX_REG_SECT && fat_sectors.len() < wanted {
                fat_sectors.push(entry);
            }
        }
        difat_sector = LittleEndian::read_u32(&bytes[per_difat * 4..]);
    }

    let mut next = Vec::with_capacity(fat_sectors.len() * header.sector_size() / 4);
    for &id in &fat_sectors {
        append_entries(&mut next, sector(image, header, id)?);
    }
    debug!("FAT loaded: {} sector(s), {} entries", fat_sectors.len(), next.len());
    Ok(ChainTable::new(next))
}

/// Build the MiniFAT by concatenating the sectors of its FAT chain.
pub fn load_minifat(image: &[u8], header: &Header, fat: &ChainTable) -> Result<ChainTable, ChainError> {
    if header.num_minifat_sectors == 0 || header.first_minifat_sector == END_OF_CHAIN {
        return Ok(ChainTable::default());
    }
    let sectors = fat.chain(header.first_minifat_sector)?;
    let mut next = Vec::with_capacity(sectors.len() * header.sector_size() / 4);
    for &id in &sectors {
        append_entries(&mut next, sector(image, header, id)?);
    }
    debug!("MiniFAT loaded: {} sector(s), {} entries", sectors.len(), next.len());
    Ok(ChainTable::new(next))
}
