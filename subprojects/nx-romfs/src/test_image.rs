//! In-memory RomFS images and FS sections for unit tests.

use std::{
    string::String,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    vec::Vec,
};

use zerocopy::{
    FromZeros,
    little_endian::{U32, U64},
};

use crate::{
    raw::{
        nca::{HashRegion, HierarchicalSha256Data, IVFC_MAGIC, IntegrityMetaInfo},
        romfs::{ROMFS_VOID_ENTRY, RomFsDirEntry, RomFsFileEntry},
    },
    read::{HashInfo, HeaderLayout, SectionReader},
};

const BODY_OFFSET: u64 = 0x200;

/// Bytes in front of the RomFS inside the mounted section.
pub const SECTION_PREFIX: u64 = 0x1000;
const SECTION_SUFFIX: usize = 0x100;

/// Byte offsets of link fields inside entry records.
pub mod field {
    pub const NEXT: usize = 0x4;
    pub const DIR_CHILD_DIR: usize = 0x8;
    pub const FILE_SIZE: usize = 0x10;
    pub const FILE_NAME_LEN: usize = 0x1C;
}

struct DirNode {
    name: String,
    parent: usize,
    children: Vec<usize>,
    files: Vec<usize>,
    entry_offset: u32,
}

struct FileNode {
    name: String,
    data: Vec<u8>,
    parent: usize,
    entry_offset: u32,
    data_offset: u64,
}

/// Assembles RomFS images. Children keep insertion order.
pub struct ImageBuilder {
    dirs: Vec<DirNode>,
    files: Vec<FileNode>,
}

impl ImageBuilder {
    pub const ROOT: usize = 0;

    pub fn new() -> Self {
        Self {
            dirs: vec![DirNode {
                name: String::new(),
                parent: Self::ROOT,
                children: Vec::new(),
                files: Vec::new(),
                entry_offset: 0,
            }],
            files: Vec::new(),
        }
    }

    /// Add a directory under `parent`, returning its index.
    pub fn dir(&mut self, parent: usize, name: &str) -> usize {
        let idx = self.dirs.len();
        self.dirs.push(DirNode {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            files: Vec::new(),
            entry_offset: 0,
        });
        self.dirs[parent].children.push(idx);
        idx
    }

    /// Add a file under `parent`, returning its index.
    pub fn file(&mut self, parent: usize, name: &str, data: impl Into<Vec<u8>>) -> usize {
        let idx = self.files.len();
        self.files.push(FileNode {
            name: name.to_string(),
            data: data.into(),
            parent,
            entry_offset: 0,
            data_offset: 0,
        });
        self.dirs[parent].files.push(idx);
        idx
    }

    pub fn build(mut self, layout: HeaderLayout) -> Image {
        let mut data_offset = 0u64;
        for file in &mut self.files {
            data_offset = align(data_offset, 0x10);
            file.data_offset = data_offset;
            data_offset += file.data.len() as u64;
        }
        let body_size = data_offset;

        let mut entry_offset = 0u32;
        for dir in &mut self.dirs {
            dir.entry_offset = entry_offset;
            entry_offset += record_len(size_of::<RomFsDirEntry>(), &dir.name);
        }
        let mut entry_offset = 0u32;
        for file in &mut self.files {
            file.entry_offset = entry_offset;
            entry_offset += record_len(size_of::<RomFsFileEntry>(), &file.name);
        }

        let (dir_buckets, dir_chain) = buckets(
            self.dirs
                .iter()
                .map(|d| (d.entry_offset, self.dirs[d.parent].entry_offset, d.name.as_str())),
        );
        let (file_buckets, file_chain) = buckets(
            self.files
                .iter()
                .map(|f| (f.entry_offset, self.dirs[f.parent].entry_offset, f.name.as_str())),
        );

        let mut dir_table = Vec::new();
        for (idx, dir) in self.dirs.iter().enumerate() {
            let next = next_sibling(&self.dirs[dir.parent].children, idx, |i| {
                self.dirs[i].entry_offset
            });
            let first_dir = dir
                .children
                .first()
                .map_or(ROMFS_VOID_ENTRY, |&i| self.dirs[i].entry_offset);
            let first_file = dir
                .files
                .first()
                .map_or(ROMFS_VOID_ENTRY, |&i| self.files[i].entry_offset);

            for value in [
                self.dirs[dir.parent].entry_offset,
                next,
                first_dir,
                first_file,
                dir_chain[idx],
                dir.name.len() as u32,
            ] {
                dir_table.extend_from_slice(&value.to_le_bytes());
            }
            push_name(&mut dir_table, &dir.name);
        }

        let mut file_table = Vec::new();
        for (idx, file) in self.files.iter().enumerate() {
            let next = next_sibling(&self.dirs[file.parent].files, idx, |i| {
                self.files[i].entry_offset
            });

            file_table.extend_from_slice(&self.dirs[file.parent].entry_offset.to_le_bytes());
            file_table.extend_from_slice(&next.to_le_bytes());
            file_table.extend_from_slice(&file.data_offset.to_le_bytes());
            file_table.extend_from_slice(&(file.data.len() as u64).to_le_bytes());
            file_table.extend_from_slice(&file_chain[idx].to_le_bytes());
            file_table.extend_from_slice(&(file.name.len() as u32).to_le_bytes());
            push_name(&mut file_table, &file.name);
        }

        let dir_bucket_offset = align(BODY_OFFSET + body_size, 4);
        let dir_bucket_size = (dir_buckets.len() * 4) as u64;
        let dir_entry_offset = dir_bucket_offset + dir_bucket_size;
        let dir_entry_size = dir_table.len() as u64;
        let file_bucket_offset = dir_entry_offset + dir_entry_size;
        let file_bucket_size = (file_buckets.len() * 4) as u64;
        let file_entry_offset = file_bucket_offset + file_bucket_size;
        let file_entry_size = file_table.len() as u64;

        let fields = [
            layout.header_size(),
            dir_bucket_offset,
            dir_bucket_size,
            dir_entry_offset,
            dir_entry_size,
            file_bucket_offset,
            file_bucket_size,
            file_entry_offset,
            file_entry_size,
            BODY_OFFSET,
        ];

        let mut bytes = Vec::new();
        for value in fields {
            match layout {
                HeaderLayout::Old => bytes.extend_from_slice(&(value as u32).to_le_bytes()),
                HeaderLayout::Current => bytes.extend_from_slice(&value.to_le_bytes()),
            }
        }
        bytes.resize(BODY_OFFSET as usize, 0);

        for file in &self.files {
            bytes.resize((BODY_OFFSET + file.data_offset) as usize, 0);
            bytes.extend_from_slice(&file.data);
        }
        bytes.resize(dir_bucket_offset as usize, 0);

        for head in dir_buckets {
            bytes.extend_from_slice(&head.to_le_bytes());
        }
        bytes.extend_from_slice(&dir_table);
        for head in file_buckets {
            bytes.extend_from_slice(&head.to_le_bytes());
        }
        bytes.extend_from_slice(&file_table);

        Image {
            bytes,
            layout,
            dir_offsets: self.dirs.iter().map(|d| d.entry_offset).collect(),
            file_offsets: self.files.iter().map(|f| f.entry_offset).collect(),
            dir_entry_offset: dir_entry_offset as usize,
            dir_entry_size: dir_entry_size as usize,
            file_entry_offset: file_entry_offset as usize,
            file_entry_size: file_entry_size as usize,
        }
    }
}

/// Serialized RomFS image plus the table offset of every entry, by insertion index.
pub struct Image {
    pub bytes: Vec<u8>,
    pub layout: HeaderLayout,
    pub dir_offsets: Vec<u32>,
    pub file_offsets: Vec<u32>,
    dir_entry_offset: usize,
    dir_entry_size: usize,
    file_entry_offset: usize,
    file_entry_size: usize,
}

impl Image {
    pub fn dir_table(&self) -> &[u8] {
        &self.bytes[self.dir_entry_offset..self.dir_entry_offset + self.dir_entry_size]
    }

    pub fn file_table(&self) -> &[u8] {
        &self.bytes[self.file_entry_offset..self.file_entry_offset + self.file_entry_size]
    }

    pub fn patch_header_size(&mut self, value: u32) {
        self.bytes[..4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn patch_dir_u32(&mut self, entry_offset: u32, field: usize, value: u32) {
        let at = self.dir_entry_offset + entry_offset as usize + field;
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn patch_file_u32(&mut self, entry_offset: u32, field: usize, value: u32) {
        let at = self.file_entry_offset + entry_offset as usize + field;
        self.bytes[at..at + 4].copy_from_slice(&value.to_le_bytes());
    }

    pub fn patch_file_u64(&mut self, entry_offset: u32, field: usize, value: u64) {
        let at = self.file_entry_offset + entry_offset as usize + field;
        self.bytes[at..at + 8].copy_from_slice(&value.to_le_bytes());
    }
}

/// Root holding `a.txt` ("hello"), an empty `empty/` and `sub/nested.bin` (33 bytes).
pub fn sample_image(layout: HeaderLayout) -> Image {
    let mut builder = ImageBuilder::new();
    builder.file(ImageBuilder::ROOT, "a.txt", *b"hello");
    let sub = builder.dir(ImageBuilder::ROOT, "sub");
    builder.dir(ImageBuilder::ROOT, "empty");
    builder.file(sub, "nested.bin", vec![7u8; 33]);
    builder.build(layout)
}

/// Owned hash descriptor placing the RomFS at a region of the section.
pub enum Descriptor {
    Sha256(HierarchicalSha256Data),
    Integrity(IntegrityMetaInfo),
}

impl Descriptor {
    pub fn for_region(layout: HeaderLayout, offset: u64, size: u64) -> Self {
        match layout {
            HeaderLayout::Old => {
                let mut info = HierarchicalSha256Data::new_zeroed();
                info.hash_block_size = U32::new(0x1000);
                info.layer_count = U32::new(2);
                info.layer_regions[0] = HashRegion {
                    offset: U64::new(0),
                    size: U64::new(0x20),
                };
                info.layer_regions[1] = HashRegion {
                    offset: U64::new(offset),
                    size: U64::new(size),
                };
                Self::Sha256(info)
            }
            HeaderLayout::Current => {
                let mut info = IntegrityMetaInfo::new_zeroed();
                info.magic = U32::new(IVFC_MAGIC);
                info.version = U32::new(0x2_0000);
                info.master_hash_size = U32::new(0x20);
                info.max_level_count = U32::new(7);
                for level in &mut info.levels[..5] {
                    level.size = U64::new(0x20);
                    level.block_order = U32::new(14);
                }
                info.levels[5].offset = U64::new(offset);
                info.levels[5].size = U64::new(size);
                info.levels[5].block_order = U32::new(14);
                Self::Integrity(info)
            }
        }
    }

    pub fn hash_info(&self) -> HashInfo<'_> {
        match self {
            Self::Sha256(info) => HashInfo::HierarchicalSha256(info),
            Self::Integrity(info) => HashInfo::HierarchicalIntegrity(info),
        }
    }
}

/// FS section held in memory, recording every read.
pub struct MemSection {
    data: Vec<u8>,
    reads: AtomicUsize,
    fail_after: Option<usize>,
    log: Mutex<Vec<(HeaderLayout, u64, usize)>>,
}

impl MemSection {
    /// Section with `SECTION_PREFIX` filler bytes, the image, then trailing filler.
    pub fn with_image(image: &Image) -> Self {
        let mut data = vec![0xEE; SECTION_PREFIX as usize];
        data.extend_from_slice(&image.bytes);
        data.resize(data.len() + SECTION_SUFFIX, 0xEE);
        Self {
            data,
            reads: AtomicUsize::new(0),
            fail_after: None,
            log: Mutex::new(Vec::new()),
        }
    }

    /// Fail every read after the first `reads` ones.
    pub fn failing_after(mut self, reads: usize) -> Self {
        self.fail_after = Some(reads);
        self
    }

    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    /// Scheme, offset and length of every read so far.
    pub fn read_log(&self) -> Vec<(HeaderLayout, u64, usize)> {
        self.log.lock().unwrap().clone()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MemError {
    #[error("read past end of section: offset {offset:#x}, length {len:#x}")]
    OutOfRange { offset: u64, len: usize },
    #[error("injected read failure")]
    Injected,
}

impl SectionReader for MemSection {
    type Error = MemError;

    fn read_verified(
        &self,
        hash_info: &HashInfo<'_>,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<(), MemError> {
        let n = self.reads.fetch_add(1, Ordering::SeqCst);
        self.log
            .lock()
            .unwrap()
            .push((hash_info.header_layout(), offset, buf.len()));
        if self.fail_after.is_some_and(|limit| n >= limit) {
            return Err(MemError::Injected);
        }

        let out_of_range = || MemError::OutOfRange {
            offset,
            len: buf.len(),
        };
        let start = usize::try_from(offset).map_err(|_| out_of_range())?;
        let src = start
            .checked_add(buf.len())
            .and_then(|end| self.data.get(start..end))
            .ok_or_else(out_of_range)?;
        buf.copy_from_slice(src);
        Ok(())
    }
}

/// Image mounted in a section behind the descriptor matching its layout.
pub struct Mounted {
    pub image: Image,
    pub section: MemSection,
    pub descriptor: Descriptor,
    pub region_offset: u64,
}

pub fn mount(image: Image) -> Mounted {
    let layout = image.layout;
    let section = MemSection::with_image(&image);
    let descriptor = Descriptor::for_region(layout, SECTION_PREFIX, image.bytes.len() as u64);
    Mounted {
        image,
        section,
        descriptor,
        region_offset: SECTION_PREFIX,
    }
}

/// Bucket heads plus, per entry, the next entry in its bucket.
fn buckets<'n>(entries: impl ExactSizeIterator<Item = (u32, u32, &'n str)>) -> (Vec<u32>, Vec<u32>) {
    let count = hash_table_count(entries.len());
    let mut heads = vec![ROMFS_VOID_ENTRY; count];
    let mut chain = Vec::with_capacity(entries.len());

    for (entry_offset, parent_offset, name) in entries {
        let bucket = path_hash(parent_offset, name) as usize % count;
        chain.push(heads[bucket]);
        heads[bucket] = entry_offset;
    }

    (heads, chain)
}

fn next_sibling(siblings: &[usize], idx: usize, offset: impl Fn(usize) -> u32) -> u32 {
    siblings
        .windows(2)
        .find(|w| w[0] == idx)
        .map_or(ROMFS_VOID_ENTRY, |w| offset(w[1]))
}

fn record_len(prefix: usize, name: &str) -> u32 {
    (prefix as u64 + align(name.len() as u64, 4)) as u32
}

fn push_name(table: &mut Vec<u8>, name: &str) {
    table.extend_from_slice(name.as_bytes());
    let padded = align(table.len() as u64, 4) as usize;
    table.resize(padded, 0);
}

/// Hash table size using the pseudo-prime rule RomFS writers use.
fn hash_table_count(num_entries: usize) -> usize {
    if num_entries < 3 {
        3
    } else if num_entries < 19 {
        num_entries | 1
    } else {
        let mut n = num_entries;
        while [2, 3, 5, 7, 11, 13, 17].iter().any(|p| n % p == 0) {
            n += 1;
        }
        n
    }
}

fn path_hash(parent_offset: u32, name: &str) -> u32 {
    let mut hash = parent_offset ^ 123_456_789;
    for c in name.bytes() {
        hash = hash.rotate_right(5) ^ u32::from(c);
    }
    hash
}

fn align(value: u64, alignment: u64) -> u64 {
    let mask = alignment - 1;
    (value + mask) & !mask
}
