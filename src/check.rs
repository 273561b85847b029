//! Integrity scan — walk every stream's chain and read it end to end.
//!
//! # How it works
//!
//! For each stream entry reachable from the root the scanner resolves its
//! block chain (FAT or MiniFAT), compares the chain's capacity with the
//! declared size, and then reads the whole stream through a
//! [`DocumentStream`], hashing it with CRC-32.  Nothing is cached; a
//! damaged entry never prevents the others from being scanned.
//!
//! ## Stream health
//!
//! - `Healthy` — chain walks cleanly and every declared byte was read
//! - `Broken` — the chain itself is invalid (cycle, bad index, marker)
//! - `TooShort` — the chain holds fewer bytes than the declared size
//! - `Unreadable` — the chain is valid but a block is missing from storage
//!
//! A storage tree that cannot be walked at all fails the whole scan.

use crc32fast::Hasher;
use log::{info, warn};
use serde::Serialize;

use crate::chain::{BlockResolver, ChainError};
use crate::container::{Container, ContainerError};
use crate::directory::DirEntry;
use crate::stream::{DocumentStream, StreamError};

const SCAN_CHUNK: usize = 64 * 1024;

// ── Types ─────────────────────────────────────────────────────────────────────

/// The health verdict for one stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ChainHealth {
    Healthy,
    Broken { error: ChainError },
    TooShort { declared: u64, capacity: u64 },
    Unreadable { error: StreamError },
}

impl ChainHealth {
    pub fn is_usable(&self) -> bool {
        matches!(self, ChainHealth::Healthy)
    }
}

/// Diagnostic record for one stream entry.
#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub id:             u32,
    pub path:           String,
    pub size:           u64,
    pub in_mini_stream: bool,
    pub blocks:         usize,
    pub health:         ChainHealth,
    /// CRC-32 of the content; only present for healthy streams.
    pub crc32:          Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "verdict", rename_all = "snake_case")]
pub enum Verdict {
    Clean,
    Damaged { bad: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub entries: Vec<EntryReport>,
    pub verdict: Verdict,
}

impl CheckReport {
    pub fn damaged(&self) -> impl Iterator<Item = &EntryReport> {
        self.entries.iter().filter(|e| !e.health.is_usable())
    }
}

// ── Scanner ──────────────────────────────────────────────────────────────────

pub fn check(container: &Container) -> Result<CheckReport, ContainerError> {
    let directory = container.directory();
    let mut entries = Vec::new();
    for (path, id) in directory.walk()? {
        match directory.get(id) {
            Some(entry) if entry.is_stream() => entries.push(scan_entry(container, path, entry)),
            _ => {}
        }
    }

    let bad = entries.iter().filter(|e| !e.health.is_usable()).count();
    let verdict = if bad == 0 { Verdict::Clean } else { Verdict::Damaged { bad } };
    info!("checked {} stream(s): {:?}", entries.len(), verdict);
    Ok(CheckReport { entries, verdict })
}

fn scan_entry(container: &Container, path: String, entry: &DirEntry) -> EntryReport {
    let mut report = EntryReport {
        id:             entry.id,
        path,
        size:           entry.size,
        in_mini_stream: container.uses_mini_stream(entry),
        blocks:         0,
        health:         ChainHealth::Healthy,
        crc32:          None,
    };

    let resolver = match container.resolver(entry) {
        Ok(r) => r,
        Err(error) => {
            warn!("{}: {error}", report.path);
            report.health = ChainHealth::Broken { error };
            return report;
        }
    };
    report.blocks = resolver.blocks().len();

    if resolver.capacity() < entry.size {
        warn!("{}: chain holds {} of {} bytes", report.path, resolver.capacity(), entry.size);
        report.health = ChainHealth::TooShort { declared: entry.size, capacity: resolver.capacity() };
        return report;
    }

    let mut stream = DocumentStream::open(resolver, entry.size);
    match crc_of(&mut stream) {
        Ok(crc) => report.crc32 = Some(crc),
        Err(error) => {
            warn!("{}: {error}", report.path);
            report.health = ChainHealth::Unreadable { error };
        }
    }
    report
}

fn crc_of<'a, R: BlockResolver<'a>>(stream: &mut DocumentStream<'a, R>) -> Result<u32, StreamError> {
    let mut hasher = Hasher::new();
    let mut buf = vec![0u8; SCAN_CHUNK];
    while let Some(n) = stream.read_buffer(&mut buf, 0, SCAN_CHUNK)? {
        hasher.update(&buf[..n]);
    }
    stream.close();
    Ok(hasher.finalize())
}
