//! Directory: the table of 128-byte entries naming every storage and stream.
//!
//! Entries are addressed by index.  Each storage's children form a binary
//! search tree through the `left`/`right` sibling links, rooted at the
//! storage's `child`.  The tree is walked in order; colours are kept for
//! diagnostics but never needed for reading.
//!
//! # Entry layout (little-endian)
//! | Offset | Size | Field                               |
//! |--------|------|-------------------------------------|
//! | 0      | 64   | name, UTF-16LE, NUL-terminated      |
//! | 64     | 2    | name length in bytes incl. NUL      |
//! | 66     | 1    | object type                         |
//! | 67     | 1    | colour                              |
//! | 68     | 12   | left sibling, right sibling, child  |
//! | 80     | 16   | CLSID                               |
//! | 96     | 4    | state bits                          |
//! | 100    | 16   | created, modified (FILETIME)        |
//! | 116    | 4    | starting sector                     |
//! | 120    | 8    | stream size                         |

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::chain::BlockResolver;
use crate::stream::{DocumentStream, StreamError};

pub const DIR_ENTRY_SIZE: u64 = 128;
/// Absent sibling/child link.
pub const NO_STREAM: u32 = 0xFFFF_FFFF;
pub const ROOT_ID: u32 = 0;
const NAME_FIELD_SIZE: usize = 64;
/// Seconds between 1601-01-01 and 1970-01-01.
const FILETIME_UNIX_OFFSET: i64 = 11_644_473_600;

#[derive(Error, Debug)]
pub enum DirectoryError {
    #[error("Unknown object type {value} in directory entry {id}")]
    UnknownEntryType { id: u32, value: u8 },
    #[error("Directory entry 0 is not the root entry")]
    MissingRoot,
    #[error("Directory tree revisits entry {id}")]
    Cycle { id: u32 },
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Empty,
    Storage,
    Stream,
    Root,
}

impl EntryKind {
    fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(EntryKind::Empty),
            1 => Some(EntryKind::Storage),
            2 => Some(EntryKind::Stream),
            5 => Some(EntryKind::Root),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    Red,
    Black,
}

#[derive(Debug, Clone)]
pub struct DirEntry {
    pub id:           u32,
    pub name:         String,
    pub kind:         EntryKind,
    pub color:        Color,
    pub left:         u32,
    pub right:        u32,
    pub child:        u32,
    pub clsid:        Uuid,
    pub state_bits:   u32,
    pub created:      Option<DateTime<Utc>>,
    pub modified:     Option<DateTime<Utc>>,
    pub start_sector: u32,
    pub size:         u64,
}

impl DirEntry {
    fn read<'a, R: BlockResolver<'a>>(
        stream:        &mut DocumentStream<'a, R>,
        id:            u32,
        major_version: u16,
    ) -> Result<Self, DirectoryError> {
        let mut raw_name = [0u8; NAME_FIELD_SIZE];
        stream.read_fully(&mut raw_name, 0, NAME_FIELD_SIZE)?;
        let name_len = stream.read_u16()? as usize;
        let type_byte = stream.read_u8()?;
        let color = if stream.read_u8()? == 0 { Color::Red } else { Color::Black };
        let left  = stream.read_u32()?;
        let right = stream.read_u32()?;
        let child = stream.read_u32()?;
        let mut clsid = [0u8; 16];
        stream.read_fully(&mut clsid, 0, 16)?;
        let state_bits   = stream.read_u32()?;
        let created      = stream.read_u64()?;
        let modified     = stream.read_u64()?;
        let start_sector = stream.read_u32()?;
        let size_low     = stream.read_u32()?;
        let size_high    = stream.read_u32()?;

        let kind = EntryKind::from_byte(type_byte)
            .ok_or(DirectoryError::UnknownEntryType { id, value: type_byte })?;

        // Version 3 writers may leave garbage in the high half.
        let size = if major_version == 3 {
            if size_high != 0 && kind != EntryKind::Empty {
                warn!("entry {id}: ignoring high size bits {size_high:#x} in a version 3 file");
            }
            size_low as u64
        } else {
            ((size_high as u64) << 32) | size_low as u64
        };

        Ok(Self {
            id,
            name: decode_name(&raw_name, name_len),
            kind,
            color,
            left,
            right,
            child,
            clsid: Uuid::from_bytes_le(clsid),
            state_bits,
            created: filetime_to_datetime(created),
            modified: filetime_to_datetime(modified),
            start_sector,
            size,
        })
    }

    pub fn is_stream(&self) -> bool {
        self.kind == EntryKind::Stream
    }

    pub fn is_storage(&self) -> bool {
        matches!(self.kind, EntryKind::Storage | EntryKind::Root)
    }
}

fn decode_name(raw: &[u8; NAME_FIELD_SIZE], name_len: usize) -> String {
    let bytes = name_len.min(NAME_FIELD_SIZE);
    let units: Vec<u16> = raw[..bytes]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .take_while(|&u| u != 0)
        .collect();
    String::from_utf16_lossy(&units)
}

/// Convert a FILETIME (100 ns ticks since 1601-01-01 UTC); zero means unset.
pub fn filetime_to_datetime(ticks: u64) -> Option<DateTime<Utc>> {
    if ticks == 0 {
        return None;
    }
    let secs  = (ticks / 10_000_000) as i64 - FILETIME_UNIX_OFFSET;
    let nanos = ((ticks % 10_000_000) * 100) as u32;
    DateTime::from_timestamp(secs, nanos)
}

#[derive(Debug, Clone)]
pub struct Directory {
    entries: Vec<DirEntry>,
}

impl Directory {
    /// Decode every entry in `stream`.  A trailing partial entry is ignored.
    pub fn read<'a, R: BlockResolver<'a>>(
        stream:        &mut DocumentStream<'a, R>,
        major_version: u16,
    ) -> Result<Self, DirectoryError> {
        let count = stream.size() / DIR_ENTRY_SIZE;
        let mut entries = Vec::with_capacity(count as usize);
        for id in 0..count as u32 {
            entries.push(DirEntry::read(stream, id, major_version)?);
        }
        stream.close();

        match entries.first() {
            Some(root) if root.kind == EntryKind::Root => {}
            _ => return Err(DirectoryError::MissingRoot),
        }
        debug!("directory loaded: {} entries", entries.len());
        Ok(Self { entries })
    }

    pub fn root(&self) -> &DirEntry {
        &self.entries[ROOT_ID as usize]
    }

    pub fn get(&self, id: u32) -> Option<&DirEntry> {
        self.entries.get(id as usize)
    }

    pub fn entries(&self) -> &[DirEntry] {
        &self.entries
    }

    /// Children of storage `id`, in sibling-tree order.
    pub fn children(&self, id: u32) -> Result<Vec<u32>, DirectoryError> {
        let mut out = Vec::new();
        let start = match self.get(id) {
            Some(e) => e.child,
            None => return Ok(out),
        };

        let mut visited = vec![false; self.entries.len()];
        let mut stack: Vec<u32> = Vec::new();
        let mut node = start;
        loop {
            while let Some(entry) = self.link(node) {
                if visited[entry.id as usize] {
                    return Err(DirectoryError::Cycle { id: entry.id });
                }
                visited[entry.id as usize] = true;
                stack.push(entry.id);
                node = entry.left;
            }
            match stack.pop() {
                Some(id) => {
                    out.push(id);
                    node = self.entries[id as usize].right;
                }
                None => break,
            }
        }
        Ok(out)
    }

    fn link(&self, id: u32) -> Option<&DirEntry> {
        if id == NO_STREAM {
            return None;
        }
        let entry = self.get(id);
        if entry.is_none() {
            warn!("directory link {id} is out of range ({} entries)", self.entries.len());
        }
        entry
    }

    /// Look up a `/`-separated path below the root, ignoring case.
    pub fn find(&self, path: &str) -> Result<Option<&DirEntry>, DirectoryError> {
        let mut current = ROOT_ID;
        for component in path.split('/').filter(|c| !c.is_empty()) {
            let wanted = component.to_uppercase();
            let next = self.children(current)?
                .into_iter()
                .find(|&c| self.entries[c as usize].name.to_uppercase() == wanted);
            match next {
                Some(id) => current = id,
                None => return Ok(None),
            }
        }
        Ok(self.get(current))
    }

    /// Every storage and stream below the root as `(path, id)`, depth-first.
    pub fn walk(&self) -> Result<Vec<(String, u32)>, DirectoryError> {
        let mut out = Vec::new();
        let mut seen = vec![false; self.entries.len()];
        seen[ROOT_ID as usize] = true;
        self.walk_into(ROOT_ID, "", &mut seen, &mut out)?;
        Ok(out)
    }

    fn walk_into(
        &self,
        id:     u32,
        prefix: &str,
        seen:   &mut [bool],
        out:    &mut Vec<(String, u32)>,
    ) -> Result<(), DirectoryError> {
        for child in self.children(id)? {
            if seen[child as usize] {
                return Err(DirectoryError::Cycle { id: child });
            }
            seen[child as usize] = true;
            let entry = &self.entries[child as usize];
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };
            match entry.kind {
                EntryKind::Storage => {
                    out.push((path.clone(), child));
                    self.walk_into(child, &path, seen, out)?;
                }
                EntryKind::Stream => out.push((path, child)),
                EntryKind::Empty | EntryKind::Root => {}
            }
        }
        Ok(())
    }
}
