use alloc::vec::Vec;

use tracing::{debug, trace};

use crate::{
    raw::romfs::ROMFS_HEADER_SIZE,
    read::source::{HashInfo, HashInfoError, Region, SectionReader},
};

mod entry;
mod header;
#[cfg(feature = "std")]
mod io;
mod size;

pub use self::{
    entry::{
        ChildDirs, ChildFiles, DirEntry, Entries, EntryTables, FileEntry, LinkError, RomFsEntry,
        TableKind,
    },
    header::{Header, HeaderError},
    size::{DirStats, LinkageFault, SizeError},
};
#[cfg(feature = "std")]
pub use self::io::FileReader;

/// Default upper bound for a single metadata table allocation (256 MiB).
pub const DEFAULT_MAX_TABLE_SIZE: u64 = 0x1000_0000;

/// Default directory nesting limit for size accumulation: unlimited.
///
/// Revisited entries already end a walk over looping links, so nesting alone
/// never needs to stop a well-formed tree.
pub const DEFAULT_MAX_DEPTH: usize = usize::MAX;

/// Limits applied when opening a RomFS image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenOptions {
    max_table_size: u64,
    max_depth: usize,
}

impl OpenOptions {
    /// Create options with the default limits.
    pub const fn new() -> Self {
        Self {
            max_table_size: DEFAULT_MAX_TABLE_SIZE,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Reject images whose directory or file table is larger than `size` bytes.
    pub const fn max_table_size(mut self, size: u64) -> Self {
        self.max_table_size = size;
        self
    }

    /// Fail size accumulation below `depth` levels of nested directories.
    pub const fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self::new()
    }
}

/// Loaded entry tables. Dropped on release.
struct Tables {
    dir: Vec<u8>,
    file: Vec<u8>,
}

/// Opened RomFS image inside an integrity-verified FS section.
///
/// The header and both entry tables are read once by [`RomFs::open`]; file
/// data is read through the section reader on demand, never cached.
pub struct RomFs<'a, R: SectionReader + ?Sized> {
    reader: &'a R,
    hash_info: HashInfo<'a>,
    section_offset: u64,
    section_size: u64,
    header: Header,
    tables: Option<Tables>,
    options: OpenOptions,
}

impl<'a, R: SectionReader + ?Sized> RomFs<'a, R> {
    /// Open the RomFS described by `hash_info` with default limits.
    pub fn open(reader: &'a R, hash_info: HashInfo<'a>) -> Result<Self, OpenError<R::Error>> {
        Self::open_with(reader, hash_info, &OpenOptions::default())
    }

    /// Open the RomFS described by `hash_info`.
    ///
    /// The header layout follows the verification scheme: hierarchical SHA-256
    /// sections carry the old 0x28-byte header, hierarchical integrity sections
    /// the current 0x50-byte one.
    pub fn open_with(
        reader: &'a R,
        hash_info: HashInfo<'a>,
        options: &OpenOptions,
    ) -> Result<Self, OpenError<R::Error>> {
        let region = hash_info.romfs_region()?;
        let layout = hash_info.header_layout();

        let header_len = layout.header_size();
        if header_len > region.size {
            return Err(HeaderError::BufferTooSmall {
                required: header_len as usize,
                available: region.size as usize,
            }
            .into());
        }

        let mut header_bytes = [0u8; ROMFS_HEADER_SIZE as usize];
        let header_bytes = &mut header_bytes[..header_len as usize];
        reader
            .read_verified(&hash_info, region.offset, header_bytes)
            .map_err(OpenError::Read)?;
        let header = Header::parse(layout, header_bytes)?;

        debug!(
            %layout,
            section_offset = region.offset,
            section_size = region.size,
            dir_entry_offset = header.dir_entry_offset,
            dir_entry_size = header.dir_entry_size,
            file_entry_offset = header.file_entry_offset,
            file_entry_size = header.file_entry_size,
            body_offset = header.body_offset,
            "opening romfs"
        );

        if header.body_offset > region.size {
            return Err(OpenError::BodyOutOfBounds {
                offset: header.body_offset,
                limit: region.size,
            });
        }

        let dir = load_table(
            reader,
            &hash_info,
            region,
            TableKind::Directory,
            header.dir_entry_offset,
            header.dir_entry_size,
            options,
        )?;
        let file = load_table(
            reader,
            &hash_info,
            region,
            TableKind::File,
            header.file_entry_offset,
            header.file_entry_size,
            options,
        )?;

        Ok(Self {
            reader,
            hash_info,
            section_offset: region.offset,
            section_size: region.size,
            header,
            tables: Some(Tables { dir, file }),
            options: *options,
        })
    }

    /// Free both entry tables.
    ///
    /// Afterwards lookups resolve nothing, and size and data reads fail with a
    /// `Released` error.
    pub fn release(&mut self) {
        if self.tables.take().is_some() {
            debug!(section_offset = self.section_offset, "released romfs tables");
        }
    }

    /// Whether [`release`](Self::release) has been called.
    pub fn is_released(&self) -> bool {
        self.tables.is_none()
    }

    /// Get the normalized header.
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Get the verification descriptor reads are routed through.
    pub fn hash_info(&self) -> &HashInfo<'a> {
        &self.hash_info
    }

    /// Get the limits the image was opened with.
    pub fn options(&self) -> &OpenOptions {
        &self.options
    }

    /// RomFS offset, relative to the start of the FS section.
    pub fn section_offset(&self) -> u64 {
        self.section_offset
    }

    /// RomFS size in bytes.
    pub fn section_size(&self) -> u64 {
        self.section_size
    }

    /// File data offset, relative to the start of the RomFS.
    pub fn body_offset(&self) -> u64 {
        self.header.body_offset
    }

    /// Loaded directory table size, zero once released.
    pub fn dir_table_size(&self) -> u64 {
        self.tables.as_ref().map_or(0, |t| t.dir.len() as u64)
    }

    /// Loaded file table size, zero once released.
    pub fn file_table_size(&self) -> u64 {
        self.tables.as_ref().map_or(0, |t| t.file.len() as u64)
    }

    /// Borrow the loaded entry tables. Both are empty once released.
    pub fn entry_tables(&self) -> EntryTables<'_> {
        match &self.tables {
            Some(tables) => EntryTables::new(&tables.dir, &tables.file),
            None => EntryTables::new(&[], &[]),
        }
    }

    /// Get the directory entry at `offset`, or `None` if no whole record lives there.
    pub fn get_directory_entry(&self, offset: u32) -> Option<DirEntry<'_>> {
        self.entry_tables().directory(offset)
    }

    /// Get the file entry at `offset`, or `None` if no whole record lives there.
    pub fn get_file_entry(&self, offset: u32) -> Option<FileEntry<'_>> {
        self.entry_tables().file(offset)
    }

    /// Get the root directory entry.
    pub fn root_dir(&self) -> Option<DirEntry<'_>> {
        self.get_directory_entry(0)
    }

    /// Iterate over the subdirectories of `dir`.
    pub fn child_dirs(&self, dir: &DirEntry<'_>) -> ChildDirs<'_> {
        self.entry_tables().child_dirs(dir)
    }

    /// Iterate over the files of `dir`.
    pub fn child_files(&self, dir: &DirEntry<'_>) -> ChildFiles<'_> {
        self.entry_tables().child_files(dir)
    }

    /// Iterate through all entries of `dir` (subdirectories first, then files).
    pub fn entries(&self, dir: &DirEntry<'_>) -> Entries<'_> {
        self.entry_tables().entries(dir)
    }

    /// Total size of the files reachable below the directory at `dir_offset`.
    pub fn directory_data_size(&self, dir_offset: u32) -> Result<u64, SizeError> {
        self.directory_stats(dir_offset).map(|stats| stats.bytes)
    }

    /// Total size of every file in the image.
    pub fn total_data_size(&self) -> Result<u64, SizeError> {
        self.directory_data_size(0)
    }

    /// Count the directories, files, and bytes reachable below the directory at `dir_offset`.
    pub fn directory_stats(&self, dir_offset: u32) -> Result<DirStats, SizeError> {
        if self.is_released() {
            return Err(SizeError::Released);
        }
        self.entry_tables()
            .directory_stats(dir_offset, self.options.max_depth)
    }

    /// Read `buf.len()` bytes at `offset` within the RomFS.
    pub fn read_section_data(
        &self,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<(), ReadError<R::Error>> {
        if self.is_released() {
            return Err(ReadError::Released);
        }

        let size = buf.len() as u64;
        let end = offset.checked_add(size).ok_or(ReadError::Overflow)?;
        if end > self.section_size {
            return Err(ReadError::OutOfBounds {
                offset,
                size,
                limit: self.section_size,
            });
        }
        if buf.is_empty() {
            return Ok(());
        }

        let absolute = self
            .section_offset
            .checked_add(offset)
            .ok_or(ReadError::Overflow)?;
        trace!(offset, absolute, size, "reading romfs data");
        self.reader
            .read_verified(&self.hash_info, absolute, buf)
            .map_err(ReadError::Read)
    }

    /// Read `buf.len()` bytes at `offset` within the data of `entry`.
    pub fn read_file_entry_data(
        &self,
        entry: &FileEntry<'_>,
        buf: &mut [u8],
        offset: u64,
    ) -> Result<(), ReadError<R::Error>> {
        let size = buf.len() as u64;
        let end = offset.checked_add(size).ok_or(ReadError::Overflow)?;
        if end > entry.size() {
            return Err(ReadError::OutOfBounds {
                offset,
                size,
                limit: entry.size(),
            });
        }

        let section_offset = self
            .header
            .body_offset
            .checked_add(entry.data_offset())
            .and_then(|o| o.checked_add(offset))
            .ok_or(ReadError::Overflow)?;
        self.read_section_data(buf, section_offset)
    }
}

impl<R: SectionReader + ?Sized> core::fmt::Debug for RomFs<'_, R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("RomFs")
            .field("hash_info", &self.hash_info)
            .field("section_offset", &self.section_offset)
            .field("section_size", &self.section_size)
            .field("header", &self.header)
            .field("dir_table_size", &self.dir_table_size())
            .field("file_table_size", &self.file_table_size())
            .finish_non_exhaustive()
    }
}

/// Read one entry table in full. Nothing is kept on failure.
fn load_table<R: SectionReader + ?Sized>(
    reader: &R,
    hash_info: &HashInfo<'_>,
    region: Region,
    table: TableKind,
    offset: u64,
    size: u64,
    options: &OpenOptions,
) -> Result<Vec<u8>, OpenError<R::Error>> {
    let out_of_bounds = || OpenError::TableOutOfBounds {
        table,
        offset,
        size,
        limit: region.size,
    };
    let end = offset.checked_add(size).ok_or_else(out_of_bounds)?;
    if end > region.size {
        return Err(out_of_bounds());
    }

    let too_large = || OpenError::TableTooLarge {
        table,
        size,
        limit: options.max_table_size,
    };
    if size > options.max_table_size {
        return Err(too_large());
    }
    let len = usize::try_from(size).map_err(|_| too_large())?;

    let mut buf = Vec::new();
    buf.try_reserve_exact(len).map_err(|_| too_large())?;
    buf.resize(len, 0);

    if !buf.is_empty() {
        trace!(%table, offset, size, "loading entry table");
        reader
            .read_verified(hash_info, region.offset + offset, &mut buf)
            .map_err(OpenError::Read)?;
    }

    Ok(buf)
}

/// Errors that can occur when opening a RomFS image
#[derive(Debug, thiserror::Error)]
pub enum OpenError<E> {
    /// Hash descriptor does not locate a usable RomFS region
    #[error("invalid hash info: {0}")]
    InvalidHashInfo(#[from] HashInfoError),
    /// Header is truncated or its size field does not match the layout
    #[error("invalid header: {0}")]
    InvalidHeader(#[from] HeaderError),
    /// Entry table lies outside the RomFS region
    #[error(
        "{table} entry table out of bounds: offset {offset:#x} + size {size:#x} exceeds {limit:#x}"
    )]
    TableOutOfBounds {
        /// Table that failed validation
        table: TableKind,
        /// Declared table offset
        offset: u64,
        /// Declared table size
        size: u64,
        /// RomFS size
        limit: u64,
    },
    /// Entry table is larger than the configured limit
    #[error("{table} entry table too large: {size:#x} bytes, limit {limit:#x}")]
    TableTooLarge {
        /// Table that failed validation
        table: TableKind,
        /// Declared table size
        size: u64,
        /// Configured limit
        limit: u64,
    },
    /// File data region starts past the end of the RomFS
    #[error("body offset {offset:#x} exceeds romfs size {limit:#x}")]
    BodyOutOfBounds {
        /// Declared body offset
        offset: u64,
        /// RomFS size
        limit: u64,
    },
    /// Underlying section read failed
    #[error("section read failed")]
    Read(#[source] E),
}

/// Errors that can occur when reading RomFS data
#[derive(Debug, thiserror::Error)]
pub enum ReadError<E> {
    /// Requested range lies outside the file or RomFS
    #[error("read out of bounds: offset {offset:#x} + size {size:#x} exceeds {limit:#x}")]
    OutOfBounds {
        /// Requested offset
        offset: u64,
        /// Requested length
        size: u64,
        /// Size of the file or RomFS
        limit: u64,
    },
    /// Offset arithmetic does not fit in 64 bits
    #[error("read offset overflows")]
    Overflow,
    /// Tables were released
    #[error("romfs context released")]
    Released,
    /// Underlying section read failed
    #[error("section read failed")]
    Read(#[source] E),
}
