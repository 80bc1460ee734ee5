//! Validated access to RomFS images inside integrity-verified FS sections.
//!
//! [`RomFs`] reads the header and both entry tables once, then resolves
//! entries, accumulates directory sizes, and routes file data reads through
//! the [`SectionReader`] with the verification scheme chosen at open time.

mod romfs;
mod source;

pub use self::{
    romfs::{
        ChildDirs, ChildFiles, DEFAULT_MAX_DEPTH, DEFAULT_MAX_TABLE_SIZE, DirEntry, DirStats,
        Entries, EntryTables, FileEntry, Header, HeaderError, LinkError, LinkageFault,
        OpenError, OpenOptions, ReadError, RomFs, RomFsEntry, SizeError, TableKind,
    },
    source::{HashInfo, HashInfoError, HeaderLayout, Region, SectionReader},
};
#[cfg(feature = "std")]
pub use self::romfs::FileReader;
