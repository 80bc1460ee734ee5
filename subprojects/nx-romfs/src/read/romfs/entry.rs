use core::str::Utf8Error;

use tracing::warn;
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::raw::romfs::{ROMFS_VOID_ENTRY, RomFsDirEntry, RomFsFileEntry};

/// Metadata table an offset belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    /// Directory entry table
    Directory,
    /// File entry table
    File,
}

impl core::fmt::Display for TableKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Directory => f.write_str("directory"),
            Self::File => f.write_str("file"),
        }
    }
}

/// Map a raw link field to `None` when it holds the void sentinel.
fn link(value: u32) -> Option<u32> {
    (value != ROMFS_VOID_ENTRY).then_some(value)
}

/// Fixed-prefix record stored in one of the entry tables.
trait Record: FromBytes + KnownLayout + Immutable {
    const TABLE: TableKind;

    fn name_len(&self) -> u32;
}

impl Record for RomFsDirEntry {
    const TABLE: TableKind = TableKind::Directory;

    fn name_len(&self) -> u32 {
        self.name_len.get()
    }
}

impl Record for RomFsFileEntry {
    const TABLE: TableKind = TableKind::File;

    fn name_len(&self) -> u32 {
        self.name_len.get()
    }
}

/// Resolve the record at `offset`, requiring both its prefix and its name to lie inside `table`.
fn record<T: Record>(table: &[u8], offset: u32) -> Option<(&T, &[u8])> {
    if offset == ROMFS_VOID_ENTRY {
        return None;
    }

    let start = usize::try_from(offset).ok()?;
    let name_start = start.checked_add(size_of::<T>())?;
    if name_start > table.len() {
        return None;
    }

    let (raw, _) = T::ref_from_prefix(&table[start..]).ok()?;

    let name_len = raw.name_len() as usize;
    let Some(name) = name_start
        .checked_add(name_len)
        .and_then(|name_end| table.get(name_start..name_end))
    else {
        let kind = T::TABLE;
        warn!(
            table = %kind,
            offset,
            name_len,
            table_len = table.len(),
            "entry name extends past table"
        );
        return None;
    };

    Some((raw, name))
}

/// Borrowed view over the two loaded entry tables.
///
/// Every lookup is bounds-checked; an offset that does not resolve to a whole
/// record yields `None`.
#[derive(Debug, Clone, Copy)]
pub struct EntryTables<'t> {
    dir: &'t [u8],
    file: &'t [u8],
}

impl<'t> EntryTables<'t> {
    pub(crate) fn new(dir: &'t [u8], file: &'t [u8]) -> Self {
        Self { dir, file }
    }

    /// Directory entry table bytes.
    pub fn dir_table(&self) -> &'t [u8] {
        self.dir
    }

    /// File entry table bytes.
    pub fn file_table(&self) -> &'t [u8] {
        self.file
    }

    /// Get the directory entry at `offset` in the directory table.
    pub fn directory(&self, offset: u32) -> Option<DirEntry<'t>> {
        let (raw, name) = record::<RomFsDirEntry>(self.dir, offset)?;
        Some(DirEntry { offset, raw, name })
    }

    /// Get the file entry at `offset` in the file table.
    pub fn file(&self, offset: u32) -> Option<FileEntry<'t>> {
        let (raw, name) = record::<RomFsFileEntry>(self.file, offset)?;
        Some(FileEntry { offset, raw, name })
    }

    /// Iterate over the subdirectories of `dir`.
    pub fn child_dirs(&self, dir: &DirEntry<'_>) -> ChildDirs<'t> {
        ChildDirs {
            tables: *self,
            next: dir.first_child_dir(),
            remaining: self.dir.len() / size_of::<RomFsDirEntry>(),
        }
    }

    /// Iterate over the files of `dir`.
    pub fn child_files(&self, dir: &DirEntry<'_>) -> ChildFiles<'t> {
        ChildFiles {
            tables: *self,
            next: dir.first_child_file(),
            remaining: self.file.len() / size_of::<RomFsFileEntry>(),
        }
    }

    /// Iterate through all entries of `dir` (subdirectories first, then files).
    pub fn entries(&self, dir: &DirEntry<'_>) -> Entries<'t> {
        Entries {
            dirs: self.child_dirs(dir),
            files: self.child_files(dir),
        }
    }
}

/// Directory record inside the directory entry table.
#[derive(Debug, Clone, Copy)]
pub struct DirEntry<'t> {
    offset: u32,
    raw: &'t RomFsDirEntry,
    name: &'t [u8],
}

impl<'t> DirEntry<'t> {
    /// Offset of this entry in the directory table.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Get the raw on-disk record.
    pub fn raw(&self) -> &'t RomFsDirEntry {
        self.raw
    }

    /// Raw parent directory offset.
    pub fn parent_offset(&self) -> u32 {
        self.raw.parent_offset.get()
    }

    /// Raw next sibling offset.
    pub fn next_offset(&self) -> u32 {
        self.raw.next_offset.get()
    }

    /// Raw first child directory offset.
    pub fn directory_offset(&self) -> u32 {
        self.raw.dir_offset.get()
    }

    /// Raw first child file offset.
    pub fn file_offset(&self) -> u32 {
        self.raw.file_offset.get()
    }

    /// Raw next-in-bucket offset.
    pub fn bucket_offset(&self) -> u32 {
        self.raw.bucket_offset.get()
    }

    /// Declared name length in bytes.
    pub fn name_length(&self) -> u32 {
        self.raw.name_len.get()
    }

    /// Parent directory, if linked.
    pub fn parent(&self) -> Option<u32> {
        link(self.parent_offset())
    }

    /// Next sibling directory.
    pub fn next_sibling(&self) -> Option<u32> {
        link(self.next_offset())
    }

    /// First child directory.
    pub fn first_child_dir(&self) -> Option<u32> {
        link(self.directory_offset())
    }

    /// First child file.
    pub fn first_child_file(&self) -> Option<u32> {
        link(self.file_offset())
    }

    /// Next directory in the same name-hash bucket.
    pub fn next_in_bucket(&self) -> Option<u32> {
        link(self.bucket_offset())
    }

    /// Raw name bytes (without padding).
    pub fn name_bytes(&self) -> &'t [u8] {
        self.name
    }

    /// Name as UTF-8. The root directory has an empty name.
    pub fn name(&self) -> Result<&'t str, Utf8Error> {
        core::str::from_utf8(self.name)
    }
}

/// File record inside the file entry table.
#[derive(Debug, Clone, Copy)]
pub struct FileEntry<'t> {
    offset: u32,
    raw: &'t RomFsFileEntry,
    name: &'t [u8],
}

impl<'t> FileEntry<'t> {
    /// Offset of this entry in the file table.
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Get the raw on-disk record.
    pub fn raw(&self) -> &'t RomFsFileEntry {
        self.raw
    }

    /// Raw parent directory offset.
    pub fn parent_offset(&self) -> u32 {
        self.raw.parent_offset.get()
    }

    /// Raw next sibling offset.
    pub fn next_offset(&self) -> u32 {
        self.raw.next_offset.get()
    }

    /// Raw next-in-bucket offset.
    pub fn bucket_offset(&self) -> u32 {
        self.raw.bucket_offset.get()
    }

    /// Declared name length in bytes.
    pub fn name_length(&self) -> u32 {
        self.raw.name_len.get()
    }

    /// File data offset, relative to the body offset.
    pub fn data_offset(&self) -> u64 {
        self.raw.data_offset.get()
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.raw.data_size.get()
    }

    /// Parent directory, if linked.
    pub fn parent(&self) -> Option<u32> {
        link(self.parent_offset())
    }

    /// Next sibling file.
    pub fn next_sibling(&self) -> Option<u32> {
        link(self.next_offset())
    }

    /// Next file in the same name-hash bucket.
    pub fn next_in_bucket(&self) -> Option<u32> {
        link(self.bucket_offset())
    }

    /// Raw name bytes (without padding).
    pub fn name_bytes(&self) -> &'t [u8] {
        self.name
    }

    /// Name as UTF-8.
    pub fn name(&self) -> Result<&'t str, Utf8Error> {
        core::str::from_utf8(self.name)
    }
}

/// Directory entry (either a file or subdirectory).
#[derive(Debug, Clone, Copy)]
pub enum RomFsEntry<'t> {
    /// File entry
    File(FileEntry<'t>),
    /// Directory entry
    Dir(DirEntry<'t>),
}

/// Iterator over a sibling chain of directories.
///
/// Yields an error and stops when a link does not resolve, or when the chain
/// is longer than the table has room for (a loop).
#[derive(Debug, Clone)]
pub struct ChildDirs<'t> {
    tables: EntryTables<'t>,
    next: Option<u32>,
    remaining: usize,
}

impl<'t> Iterator for ChildDirs<'t> {
    type Item = Result<DirEntry<'t>, LinkError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next.take()?;
        if self.remaining == 0 {
            warn!(offset, "directory sibling chain loops");
            return Some(Err(LinkError::MalformedLinkage {
                table: TableKind::Directory,
                offset,
            }));
        }
        self.remaining -= 1;

        match self.tables.directory(offset) {
            Some(dir) => {
                self.next = dir.next_sibling();
                Some(Ok(dir))
            }
            None => Some(Err(LinkError::OutOfBounds {
                table: TableKind::Directory,
                offset,
            })),
        }
    }
}

/// Iterator over a sibling chain of files.
#[derive(Debug, Clone)]
pub struct ChildFiles<'t> {
    tables: EntryTables<'t>,
    next: Option<u32>,
    remaining: usize,
}

impl<'t> Iterator for ChildFiles<'t> {
    type Item = Result<FileEntry<'t>, LinkError>;

    fn next(&mut self) -> Option<Self::Item> {
        let offset = self.next.take()?;
        if self.remaining == 0 {
            warn!(offset, "file sibling chain loops");
            return Some(Err(LinkError::MalformedLinkage {
                table: TableKind::File,
                offset,
            }));
        }
        self.remaining -= 1;

        match self.tables.file(offset) {
            Some(file) => {
                self.next = file.next_sibling();
                Some(Ok(file))
            }
            None => Some(Err(LinkError::OutOfBounds {
                table: TableKind::File,
                offset,
            })),
        }
    }
}

/// Iterator over directory entries (subdirectories then files).
#[derive(Debug, Clone)]
pub struct Entries<'t> {
    dirs: ChildDirs<'t>,
    files: ChildFiles<'t>,
}

impl<'t> Iterator for Entries<'t> {
    type Item = Result<RomFsEntry<'t>, LinkError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(dir) = self.dirs.next() {
            return Some(dir.map(RomFsEntry::Dir));
        }
        self.files.next().map(|file| file.map(RomFsEntry::File))
    }
}

/// Error yielded while following a sibling chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LinkError {
    /// Link does not resolve to a whole record
    #[error("{table} entry offset {offset:#x} is out of bounds")]
    OutOfBounds {
        /// Table the link points into
        table: TableKind,
        /// Offending offset
        offset: u32,
    },
    /// Sibling chain revisits an entry
    #[error("{table} sibling chain loops at offset {offset:#x}")]
    MalformedLinkage {
        /// Table the chain lives in
        table: TableKind,
        /// Offset at which the chain was cut
        offset: u32,
    },
}
