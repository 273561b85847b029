//! High-level [`Container`] API — the primary embedding surface.
//!
//! ```no_run
//! use cfbstream::container::Container;
//!
//! let container = Container::open("report.doc")?;
//! for info in container.list()? {
//!     println!("{} ({} bytes)", info.path, info.size);
//! }
//!
//! let mut stream = container.open_stream("WordDocument")?;
//! let ident = stream.read_u16()?;
//! stream.skip(8)?;
//! let flags = stream.read_u16()?;
//! # let _ = (ident, flags);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! Opening parses the header, both allocation tables and the directory, and
//! materializes the mini stream once.  Every stream opened afterwards
//! borrows the container image; streams are independent of each other.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::Serialize;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

use crate::chain::{load_fat, load_minifat, ChainError, ChainResolver, ChainTable, END_OF_CHAIN};
use crate::check::{check, Verdict};
use crate::directory::{DirEntry, Directory, DirectoryError, EntryKind};
use crate::header::{Header, HeaderError};
use crate::stream::{DocumentStream, StreamError};

// ── Errors ────────────────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("Header error: {0}")]
    Header(#[from] HeaderError),
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),
    #[error("Stream error: {0}")]
    Stream(#[from] StreamError),
    #[error("Entry not found: {0}")]
    NotFound(String),
    #[error("Entry is not a stream: {0}")]
    NotAStream(String),
    #[error("Entry too large for this platform: {0} bytes")]
    TooLarge(u64),
    #[error("Verification failed: {bad} damaged stream(s)")]
    Verification { bad: usize },
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

// ── ContainerOptions ─────────────────────────────────────────────────────────

/// Configuration for [`Container::open_with`].
#[derive(Debug, Clone, Default)]
pub struct ContainerOptions {
    /// Reject headers that parse but do not conform (non-zero reserved
    /// fields, non-standard mini stream cutoff, ...).
    pub strict:         bool,
    /// Run [`check`] while opening and fail on any damaged stream.
    pub verify_on_open: bool,
}

// ── EntryInfo ────────────────────────────────────────────────────────────────

/// Lightweight descriptor returned by [`Container::list`].
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub id:             u32,
    pub path:           String,
    pub kind:           EntryKind,
    pub size:           u64,
    pub clsid:          Uuid,
    pub created:        Option<DateTime<Utc>>,
    pub modified:       Option<DateTime<Utc>>,
    pub in_mini_stream: bool,
}

// ── Container ────────────────────────────────────────────────────────────────

pub struct Container {
    path:        Option<PathBuf>,
    image:       Vec<u8>,
    header:      Header,
    fat:         ChainTable,
    minifat:     ChainTable,
    directory:   Directory,
    mini_stream: Vec<u8>,
}

impl Container {
    // ── Constructors ─────────────────────────────────────────────────────────

    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, ContainerError> {
        Self::open_with(path, ContainerOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(path: P, options: ContainerOptions) -> Result<Self, ContainerError> {
        let path = path.as_ref().to_owned();
        let mut image = Vec::new();
        File::open(&path)?.read_to_end(&mut image)?;
        debug!("opening {} ({} bytes)", path.display(), image.len());
        let mut container = Self::from_bytes(image, options)?;
        container.path = Some(path);
        Ok(container)
    }

    pub fn from_bytes(image: Vec<u8>, options: ContainerOptions) -> Result<Self, ContainerError> {
        let header  = Header::read_with(&image[..], options.strict)?;
        let fat     = load_fat(&image, &header)?;
        let minifat = load_minifat(&image, &header, &fat)?;

        let sector_size = header.sector_size();
        let dir_blocks  = fat.chain(header.first_dir_sector)?;
        let dir_size    = dir_blocks.len() as u64 * sector_size as u64;
        let directory = {
            let resolver = ChainResolver::new(&image, sector_size as u64, sector_size, dir_blocks, dir_size);
            let mut stream = DocumentStream::open(resolver, dir_size);
            Directory::read(&mut stream, header.major_version)?
        };

        let mini_stream = load_mini_stream(&image, &header, &fat, directory.root())?;
        debug!(
            "container v{}.{}: {}-byte sectors, {} FAT entries, {} MiniFAT entries, {}-byte mini stream",
            header.major_version, header.minor_version, sector_size,
            fat.len(), minifat.len(), mini_stream.len()
        );

        let container = Self { path: None, image, header, fat, minifat, directory, mini_stream };
        if options.verify_on_open {
            if let Verdict::Damaged { bad } = check(&container)?.verdict {
                return Err(ContainerError::Verification { bad });
            }
        }
        Ok(container)
    }

    // ── Lookup ───────────────────────────────────────────────────────────────

    fn entry(&self, path: &str) -> Result<&DirEntry, ContainerError> {
        self.directory.find(path)?
            .ok_or_else(|| ContainerError::NotFound(path.to_owned()))
    }

    fn info(&self, path: String, entry: &DirEntry) -> EntryInfo {
        EntryInfo {
            id:             entry.id,
            path,
            kind:           entry.kind,
            size:           if entry.is_stream() { entry.size } else { 0 },
            clsid:          entry.clsid,
            created:        entry.created,
            modified:       entry.modified,
            in_mini_stream: self.uses_mini_stream(entry),
        }
    }

    pub fn list(&self) -> Result<Vec<EntryInfo>, ContainerError> {
        let mut out = Vec::new();
        for (path, id) in self.directory.walk()? {
            if let Some(entry) = self.directory.get(id) {
                out.push(self.info(path, entry));
            }
        }
        Ok(out)
    }

    pub fn stat(&self, path: &str) -> Result<Option<EntryInfo>, ContainerError> {
        Ok(self.directory.find(path)?.map(|e| self.info(path.to_owned(), e)))
    }

    // ── Streams ──────────────────────────────────────────────────────────────

    /// Streams below the mini stream cutoff live in the mini stream.
    pub fn uses_mini_stream(&self, entry: &DirEntry) -> bool {
        entry.is_stream() && entry.size < self.header.mini_stream_cutoff as u64
    }

    /// Build the block resolver for a stream entry.
    pub fn resolver(&self, entry: &DirEntry) -> Result<ChainResolver<'_>, ChainError> {
        let mini = self.uses_mini_stream(entry);
        let blocks = if entry.size == 0 {
            Vec::new()
        } else if mini {
            self.minifat.chain(entry.start_sector)?
        } else {
            self.fat.chain(entry.start_sector)?
        };

        Ok(if mini {
            ChainResolver::new(&self.mini_stream, 0, self.header.mini_sector_size(), blocks, entry.size)
        } else {
            let sector_size = self.header.sector_size();
            ChainResolver::new(&self.image, sector_size as u64, sector_size, blocks, entry.size)
        })
    }

    pub fn open_stream(&self, path: &str) -> Result<DocumentStream<'_, ChainResolver<'_>>, ContainerError> {
        let entry = self.entry(path)?;
        if !entry.is_stream() {
            return Err(ContainerError::NotAStream(path.to_owned()));
        }
        Ok(DocumentStream::open(self.resolver(entry)?, entry.size))
    }

    pub fn read_entry(&self, path: &str) -> Result<Vec<u8>, ContainerError> {
        let entry = self.entry(path)?;
        if !entry.is_stream() {
            return Err(ContainerError::NotAStream(path.to_owned()));
        }
        self.read_stream(entry)
    }

    pub(crate) fn read_stream(&self, entry: &DirEntry) -> Result<Vec<u8>, ContainerError> {
        let resolver = self.resolver(entry)?;
        // Refuse to allocate for a size the chain cannot back.
        if entry.size > resolver.capacity() {
            return Err(StreamError::UnexpectedEndOfStream {
                offset: resolver.capacity(),
                size:   entry.size,
            }.into());
        }
        let len = usize::try_from(entry.size).map_err(|_| ContainerError::TooLarge(entry.size))?;
        let mut out = vec![0u8; len];
        let mut stream = DocumentStream::open(resolver, entry.size);
        stream.read_fully(&mut out, 0, len)?;
        Ok(out)
    }

    /// Extract every storage (as a directory) and stream (as a file) into
    /// `dest`, creating it if necessary.
    pub fn extract_all<P: AsRef<Path>>(&self, dest: P) -> Result<usize, ContainerError> {
        let dest = dest.as_ref();
        fs::create_dir_all(dest)?;
        let mut written = 0;
        for (path, id) in self.directory.walk()? {
            let entry = match self.directory.get(id) {
                Some(e) => e,
                None => continue,
            };
            let target: PathBuf = path.split('/').map(sanitize).fold(dest.to_owned(), |p, c| p.join(c));
            match entry.kind {
                EntryKind::Storage => fs::create_dir_all(&target)?,
                EntryKind::Stream => {
                    let data = self.read_stream(entry)?;
                    File::create(&target)?.write_all(&data)?;
                    written += 1;
                }
                EntryKind::Empty | EntryKind::Root => {}
            }
        }
        Ok(written)
    }

    // ── Metadata ─────────────────────────────────────────────────────────────

    pub fn path(&self) -> Option<&Path> { self.path.as_deref() }

    pub fn header(&self) -> &Header { &self.header }

    pub fn directory(&self) -> &Directory { &self.directory }

    pub fn image_len(&self) -> usize { self.image.len() }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("path", &self.path)
            .field("image_len", &self.image.len())
            .field("version", &self.header.major_version)
            .field("entries", &self.directory.entries().len())
            .field("mini_stream_len", &self.mini_stream.len())
            .finish_non_exhaustive()
    }
}

fn load_mini_stream(
    image:  &[u8],
    header: &Header,
    fat:    &ChainTable,
    root:   &DirEntry,
) -> Result<Vec<u8>, ContainerError> {
    if root.size == 0 || root.start_sector == END_OF_CHAIN {
        return Ok(Vec::new());
    }
    let sector_size = header.sector_size();
    let blocks = fat.chain(root.start_sector)?;
    let capacity = blocks.len() as u64 * sector_size as u64;
    let size = if root.size > capacity {
        warn!("mini stream declares {} bytes but its chain holds {capacity}", root.size);
        capacity
    } else {
        root.size
    };
    let len = usize::try_from(size).map_err(|_| ContainerError::TooLarge(size))?;

    let resolver = ChainResolver::new(image, sector_size as u64, sector_size, blocks, size);
    let mut stream = DocumentStream::open(resolver, size);
    let mut out = vec![0u8; len];
    stream.read_fully(&mut out, 0, len)?;
    Ok(out)
}

/// Entry names may contain control characters (`\u{5}SummaryInformation`)
/// and path separators; neither belongs in a file name.
fn sanitize(name: &str) -> String {
    let cleaned: String = name.chars()
        .map(|c| if c.is_control() || c == '/' || c == '\\' { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_owned(),
        _ => cleaned,
    }
}
