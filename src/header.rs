//! Compound File header — the fixed 512-byte structure at offset 0.
//!
//! # Layout (little-endian)
//!
//! | Offset | Size | Field                     |
//! |--------|------|---------------------------|
//! | 0      | 8    | signature                 |
//! | 8      | 16   | CLSID (must be zero)      |
//! | 24     | 2    | minor version             |
//! | 26     | 2    | major version (3 or 4)    |
//! | 28     | 2    | byte-order mark `0xFFFE`  |
//! | 30     | 2    | sector shift (9 or 12)    |
//! | 32     | 2    | mini sector shift (6)     |
//! | 34     | 6    | reserved                  |
//! | 40     | 4    | directory sector count    |
//! | 44     | 4    | FAT sector count          |
//! | 48     | 4    | first directory sector    |
//! | 52     | 4    | transaction signature     |
//! | 56     | 4    | mini stream cutoff        |
//! | 60     | 4    | first MiniFAT sector      |
//! | 64     | 4    | MiniFAT sector count      |
//! | 68     | 4    | first DIFAT sector        |
//! | 72     | 4    | DIFAT sector count        |
//! | 76     | 436  | first 109 DIFAT entries   |
//!
//! The header occupies the slot of sector `-1`: sector `n` starts at byte
//! `(n + 1) * sector_size`.  For version 4 files the remainder of the first
//! 4096-byte sector is padding.

use byteorder::{LittleEndian, ReadBytesExt};
use std::io::{self, Read};
use thiserror::Error;

pub const SIGNATURE: [u8; 8] = [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1];
pub const HEADER_SIZE: usize = 512;
pub const BYTE_ORDER_MARK: u16 = 0xFFFE;
pub const INLINE_DIFAT_ENTRIES: usize = 109;
pub const DEFAULT_MINI_STREAM_CUTOFF: u32 = 4096;
pub const MINI_SECTOR_SHIFT: u16 = 6;

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("Unsupported major version: {0}")]
    UnsupportedVersion(u16),
    #[error("Invalid byte-order mark: {0:#06x}")]
    InvalidByteOrder(u16),
    #[error("Sector shift {shift} is not valid for version {version}")]
    InvalidSectorShift { version: u16, shift: u16 },
    #[error("Unsupported mini sector shift: {0}")]
    InvalidMiniSectorShift(u16),
    /// Only raised in strict mode.
    #[error("Non-conforming header field: {0}")]
    NonConforming(&'static str),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Clone)]
pub struct Header {
    pub clsid:                 [u8; 16],
    pub minor_version:         u16,
    pub major_version:         u16,
    pub sector_shift:          u16,
    pub mini_sector_shift:     u16,
    pub reserved:              [u8; 6],
    pub num_dir_sectors:       u32,
    pub num_fat_sectors:       u32,
    pub first_dir_sector:      u32,
    pub transaction_signature: u32,
    pub mini_stream_cutoff:    u32,
    pub first_minifat_sector:  u32,
    pub num_minifat_sectors:   u32,
    pub first_difat_sector:    u32,
    pub num_difat_sectors:     u32,
    pub difat:                 [u32; INLINE_DIFAT_ENTRIES],
}

impl Header {
    /// Parse the header without the strict conformance checks.
    pub fn read<R: Read>(reader: R) -> Result<Self, HeaderError> {
        Self::read_with(reader, false)
    }

    pub fn read_with<R: Read>(mut reader: R, strict: bool) -> Result<Self, HeaderError> {
        let mut signature = [0u8; 8];
        reader.read_exact(&mut signature)?;
        if signature != SIGNATURE {
            return Err(HeaderError::InvalidSignature);
        }

        let mut clsid = [0u8; 16];
        reader.read_exact(&mut clsid)?;
        let minor_version = reader.read_u16::<LittleEndian>()?;
        let major_version = reader.read_u16::<LittleEndian>()?;
        if major_version != 3 && major_version != 4 {
            return Err(HeaderError::UnsupportedVersion(major_version));
        }

        let byte_order = reader.read_u16::<LittleEndian>()?;
        if byte_order != BYTE_ORDER_MARK {
            return Err(HeaderError::InvalidByteOrder(byte_order));
        }

        let sector_shift = reader.read_u16::<LittleEndian>()?;
        let expected_shift = if major_version == 3 { 9 } else { 12 };
        if sector_shift != expected_shift {
            return Err(HeaderError::InvalidSectorShift { version: major_version, shift: sector_shift });
        }
        let mini_sector_shift = reader.read_u16::<LittleEndian>()?;
        if mini_sector_shift != MINI_SECTOR_SHIFT {
            return Err(HeaderError::InvalidMiniSectorShift(mini_sector_shift));
        }

        let mut reserved = [0u8; 6];
        reader.read_exact(&mut reserved)?;

        let num_dir_sectors       = reader.read_u32::<LittleEndian>()?;
        let num_fat_sectors       = reader.read_u32::<LittleEndian>()?;
        let first_dir_sector      = reader.read_u32::<LittleEndian>()?;
        let transaction_signature = reader.read_u32::<LittleEndian>()?;
        let mini_stream_cutoff    = reader.read_u32::<LittleEndian>()?;
        let first_minifat_sector  = reader.read_u32::<LittleEndian>()?;
        let num_minifat_sectors   = reader.read_u32::<LittleEndian>()?;
        let first_difat_sector    = reader.read_u32::<LittleEndian>()?;
        let num_difat_sectors     = reader.read_u32::<LittleEndian>()?;

        let mut difat = [0u32; INLINE_DIFAT_ENTRIES];
        reader.read_u32_into::<LittleEndian>(&mut difat)?;

        let header = Self {
            clsid,
            minor_version,
            major_version,
            sector_shift,
            mini_sector_shift,
            reserved,
            num_dir_sectors,
            num_fat_sectors,
            first_dir_sector,
            transaction_signature,
            mini_stream_cutoff,
            first_minifat_sector,
            num_minifat_sectors,
            first_difat_sector,
            num_difat_sectors,
            difat,
        };
        if strict {
            header.check_conformance()?;
        }
        Ok(header)
    }

    fn check_conformance(&self) -> Result<(), HeaderError> {
        if self.clsid != [0u8; 16] {
            return Err(HeaderError::NonConforming("header CLSID must be zero"));
        }
        if self.reserved != [0u8; 6] {
            return Err(HeaderError::NonConforming("reserved bytes must be zero"));
        }
        if self.mini_stream_cutoff != DEFAULT_MINI_STREAM_CUTOFF {
            return Err(HeaderError::NonConforming("mini stream cutoff must be 4096"));
        }
        if self.major_version == 3 && self.num_dir_sectors != 0 {
            return Err(HeaderError::NonConforming("version 3 directory sector count must be zero"));
        }
        Ok(())
    }

    #[inline]
    pub fn sector_size(&self) -> usize {
        1usize << self.sector_shift
    }

    #[inline]
    pub fn mini_sector_size(&self) -> usize {
        1usize << self.mini_sector_shift
    }

    /// Physical byte offset of sector `id` in the file image.
    #[inline]
    pub fn sector_offset(&self, id: u32) -> u64 {
        (id as u64 + 1) * self.sector_size() as u64
    }
}
