//! Minimal Compound File writer used to produce fixtures for the reader.
//!
//! Sector layout: FAT sectors, optional DIFAT sector, directory, MiniFAT,
//! mini stream, then regular streams in insertion order.  Sibling trees are
//! degenerate (each child's `right` points at the next), which is a valid
//! tree for in-order traversal.

#![allow(dead_code)]

pub const END_OF_CHAIN: u32 = 0xFFFF_FFFE;
pub const FREE_SECT:    u32 = 0xFFFF_FFFF;
pub const FAT_SECT:     u32 = 0xFFFF_FFFD;
pub const DIF_SECT:     u32 = 0xFFFF_FFFC;
pub const NO_STREAM:    u32 = 0xFFFF_FFFF;
pub const MINI_CUTOFF:  usize = 4096;
const MINI_SECTOR:      usize = 64;

struct Node {
    name:     String,
    kind:     u8,
    data:     Vec<u8>,
    children: Vec<usize>,
}

pub struct CfbBuilder {
    version:    u16,
    nodes:      Vec<Node>,
    difat_only: bool,
}

/// Where the builder placed things, for tests that patch the image.
pub struct Layout {
    pub sector_size: usize,
    pub fat_sectors: Vec<u32>,
    pub start:       Vec<u32>,
}

impl Layout {
    /// Byte offset of FAT entry `sector` in the image.
    pub fn fat_entry_offset(&self, sector: u32) -> usize {
        let per = self.sector_size / 4;
        let fat_sector = self.fat_sectors[sector as usize / per];
        (fat_sector as usize + 1) * self.sector_size + (sector as usize % per) * 4
    }

    pub fn sector_offset(&self, sector: u32) -> usize {
        (sector as usize + 1) * self.sector_size
    }
}

impl CfbBuilder {
    pub fn new(version: u16) -> Self {
        let root = Node { name: "Root Entry".into(), kind: 5, data: Vec::new(), children: Vec::new() };
        Self { version, nodes: vec![root], difat_only: false }
    }

    /// List every FAT sector in a DIFAT sector instead of the header.
    pub fn difat_only(&mut self) -> &mut Self {
        self.difat_only = true;
        self
    }

    fn parent_of(&mut self, path: &str) -> (usize, String) {
        let mut parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
        let leaf = parts.pop().expect("empty path").to_string();
        let mut current = 0usize;
        for part in parts {
            let existing = self.nodes[current].children.iter()
                .copied()
                .find(|&c| self.nodes[c].name == part);
            current = match existing {
                Some(c) => c,
                None => self.add(current, part.to_string(), 1, Vec::new()),
            };
        }
        (current, leaf)
    }

    fn add(&mut self, parent: usize, name: String, kind: u8, data: Vec<u8>) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node { name, kind, data, children: Vec::new() });
        self.nodes[parent].children.push(id);
        id
    }

    pub fn storage(&mut self, path: &str) -> &mut Self {
        let (parent, name) = self.parent_of(path);
        self.add(parent, name, 1, Vec::new());
        self
    }

    pub fn stream(&mut self, path: &str, data: &[u8]) -> &mut Self {
        let (parent, name) = self.parent_of(path);
        self.add(parent, name, 2, data.to_vec());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        self.build_with_layout().0
    }

    pub fn build_with_layout(&self) -> (Vec<u8>, Layout) {
        let ss: usize = if self.version == 3 { 512 } else { 4096 };
        let per = ss / 4;
        let n = self.nodes.len();

        // Mini stream and MiniFAT.
        let mut start = vec![END_OF_CHAIN; n];
        let mut size = vec![0u64; n];
        let mut mini: Vec<u8> = Vec::new();
        let mut minifat: Vec<u32> = Vec::new();
        let mut regular: Vec<usize> = Vec::new();
        for (i, node) in self.nodes.iter().enumerate().skip(1) {
            if node.kind != 2 {
                continue;
            }
            size[i] = node.data.len() as u64;
            if node.data.is_empty() {
                continue;
            }
            if node.data.len() < MINI_CUTOFF {
                let first = minifat.len() as u32;
                let count = node.data.len().div_ceil(MINI_SECTOR);
                for k in 0..count as u32 {
                    minifat.push(if k + 1 < count as u32 { first + k + 1 } else { END_OF_CHAIN });
                }
                start[i] = first;
                mini.extend_from_slice(&node.data);
                mini.resize(mini.len().div_ceil(MINI_SECTOR) * MINI_SECTOR, 0);
            } else {
                regular.push(i);
            }
        }

        let dir_sectors     = (n * 128).div_ceil(ss);
        let minifat_sectors = (minifat.len() * 4).div_ceil(ss);
        let mini_sectors    = mini.len().div_ceil(ss);
        let regular_sectors: usize = regular.iter().map(|&i| self.nodes[i].data.len().div_ceil(ss)).sum();
        let difat_sectors   = usize::from(self.difat_only);

        let mut fat_count = 1;
        loop {
            let total = fat_count + difat_sectors + dir_sectors + minifat_sectors + mini_sectors + regular_sectors;
            if fat_count * per >= total {
                break;
            }
            fat_count += 1;
        }
        assert!(fat_count <= 109, "fixture too large");

        let mut fat = vec![FREE_SECT; fat_count * per];
        let mut next_id = 0u32;
        let fat_sectors: Vec<u32> = (0..fat_count as u32).collect();
        for &s in &fat_sectors {
            fat[s as usize] = FAT_SECT;
        }
        next_id += fat_count as u32;
        let difat_sector = if self.difat_only {
            fat[next_id as usize] = DIF_SECT;
            next_id += 1;
            next_id - 1
        } else {
            END_OF_CHAIN
        };

        let mut alloc = |count: usize| -> u32 {
            if count == 0 {
                return END_OF_CHAIN;
            }
            let first = next_id;
            for k in 0..count as u32 {
                fat[(first + k) as usize] = if k + 1 < count as u32 { first + k + 1 } else { END_OF_CHAIN };
            }
            next_id += count as u32;
            first
        };

        let dir_start     = alloc(dir_sectors);
        let minifat_start = alloc(minifat_sectors);
        let mini_start    = alloc(mini_sectors);
        start[0] = mini_start;
        size[0] = mini.len() as u64;
        for &i in &regular {
            start[i] = alloc(self.nodes[i].data.len().div_ceil(ss));
        }
        let total_sectors = next_id as usize;

        let mut image = vec![0u8; ss * (1 + total_sectors)];

        // Header
        let mut h = Vec::with_capacity(512);
        h.extend_from_slice(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]);
        h.extend_from_slice(&[0u8; 16]);
        h.extend_from_slice(&0x3Eu16.to_le_bytes());
        h.extend_from_slice(&self.version.to_le_bytes());
        h.extend_from_slice(&0xFFFEu16.to_le_bytes());
        h.extend_from_slice(&(if self.version == 3 { 9u16 } else { 12u16 }).to_le_bytes());
        h.extend_from_slice(&6u16.to_le_bytes());
        h.extend_from_slice(&[0u8; 6]);
        let num_dir = if self.version == 3 { 0 } else { dir_sectors as u32 };
        for v in [
            num_dir,
            fat_count as u32,
            dir_start,
            0,
            MINI_CUTOFF as u32,
            minifat_start,
            minifat_sectors as u32,
            difat_sector,
            difat_sectors as u32,
        ] {
            h.extend_from_slice(&v.to_le_bytes());
        }
        for i in 0..109 {
            let v = if !self.difat_only && i < fat_count { fat_sectors[i] } else { FREE_SECT };
            h.extend_from_slice(&v.to_le_bytes());
        }
        assert_eq!(h.len(), 512);
        image[..512].copy_from_slice(&h);

        let sector_at = |id: u32| (id as usize + 1) * ss;

        // FAT
        for (k, &s) in fat_sectors.iter().enumerate() {
            let off = sector_at(s);
            for j in 0..per {
                image[off + j * 4..off + j * 4 + 4].copy_from_slice(&fat[k * per + j].to_le_bytes());
            }
        }

        // DIFAT
        if self.difat_only {
            let off = sector_at(difat_sector);
            for j in 0..per {
                let v = if j == per - 1 {
                    END_OF_CHAIN
                } else if j < fat_count {
                    fat_sectors[j]
                } else {
                    FREE_SECT
                };
                image[off + j * 4..off + j * 4 + 4].copy_from_slice(&v.to_le_bytes());
            }
        }

        // Directory
        let mut dir = Vec::with_capacity(dir_sectors * ss);
        for (i, node) in self.nodes.iter().enumerate() {
            let right = self.nodes.iter()
                .find_map(|p| {
                    let pos = p.children.iter().position(|&c| c == i)?;
                    Some(p.children.get(pos + 1).map(|&c| c as u32).unwrap_or(NO_STREAM))
                })
                .unwrap_or(NO_STREAM);
            let child = node.children.first().map(|&c| c as u32).unwrap_or(NO_STREAM);
            write_entry(&mut dir, &node.name, node.kind, NO_STREAM, right, child, start[i], size[i]);
        }
        while dir.len() < dir_sectors * ss {
            write_entry(&mut dir, "", 0, NO_STREAM, NO_STREAM, NO_STREAM, 0, 0);
        }
        write_chain(&mut image, ss, dir_start, &dir);

        // MiniFAT
        let mut mf = Vec::new();
        for v in &minifat {
            mf.extend_from_slice(&v.to_le_bytes());
        }
        while mf.len() < minifat_sectors * ss {
            mf.extend_from_slice(&FREE_SECT.to_le_bytes());
        }
        write_chain(&mut image, ss, minifat_start, &mf);

        write_chain(&mut image, ss, mini_start, &mini);
        for &i in &regular {
            write_chain(&mut image, ss, start[i], &self.nodes[i].data);
        }

        (image, Layout { sector_size: ss, fat_sectors, start })
    }
}

/// Sectors allocated by the builder are consecutive.
fn write_chain(image: &mut [u8], ss: usize, first: u32, data: &[u8]) {
    if first == END_OF_CHAIN {
        return;
    }
    let off = (first as usize + 1) * ss;
    image[off..off + data.len()].copy_from_slice(data);
}

#[allow(clippy::too_many_arguments)]
fn write_entry(out: &mut Vec<u8>, name: &str, kind: u8, left: u32, right: u32, child: u32, start: u32, size: u64) {
    let mut raw = [0u8; 64];
    let units: Vec<u16> = name.encode_utf16().collect();
    assert!(units.len() <= 31, "entry name too long");
    for (i, u) in units.iter().enumerate() {
        raw[i * 2..i * 2 + 2].copy_from_slice(&u.to_le_bytes());
    }
    out.extend_from_slice(&raw);
    let name_len = if name.is_empty() { 0 } else { (units.len() as u16 + 1) * 2 };
    out.extend_from_slice(&name_len.to_le_bytes());
    out.push(kind);
    out.push(1);
    out.extend_from_slice(&left.to_le_bytes());
    out.extend_from_slice(&right.to_le_bytes());
    out.extend_from_slice(&child.to_le_bytes());
    out.extend_from_slice(&[0u8; 16]);
    out.extend_from_slice(&0u32.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(&0u64.to_le_bytes());
    out.extend_from_slice(&start.to_le_bytes());
    out.extend_from_slice(&size.to_le_bytes());
}

/// Deterministic, non-repeating-looking test content.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| ((i * 31 + seed as usize * 17) % 251) as u8).collect()
}
