use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, little_endian::*};

/// Size of the NCA0 RomFS header.
pub const ROMFS_OLD_HEADER_SIZE: u64 = 0x28;

/// Size of the NCA2/NCA3 RomFS header.
pub const ROMFS_HEADER_SIZE: u64 = 0x50;

/// Link value meaning "no entry" (no parent, sibling, child or bucket successor).
pub const ROMFS_VOID_ENTRY: u32 = 0xFFFF_FFFF;

/// RomFS header used by NCA0 sections (0x28 bytes).
///
/// Same field order as [`RomFsHeader`], but every field is 32 bits wide.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RomFsHeaderOld {
    /// Size of this header (always 0x28)
    pub header_size: U32,
    /// Offset to directory hash bucket table
    pub dir_bucket_offset: U32,
    /// Size of directory hash bucket table
    pub dir_bucket_size: U32,
    /// Offset to directory entry table
    pub dir_entry_offset: U32,
    /// Size of directory entry table
    pub dir_entry_size: U32,
    /// Offset to file hash bucket table
    pub file_bucket_offset: U32,
    /// Size of file hash bucket table
    pub file_bucket_size: U32,
    /// Offset to file entry table
    pub file_entry_offset: U32,
    /// Size of file entry table
    pub file_entry_size: U32,
    /// Offset to file data region
    pub body_offset: U32,
}

const_assert_eq!(size_of::<RomFsHeaderOld>() as u64, ROMFS_OLD_HEADER_SIZE);

/// RomFS header used by NCA2/NCA3 sections (0x50 bytes).
///
/// Contains offsets and sizes for hash bucket tables, entry tables, and file data,
/// all relative to the start of the RomFS.
///
/// See: <https://switchbrew.org/wiki/RomFS>
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RomFsHeader {
    /// Size of this header (always 0x50)
    pub header_size: U64,
    /// Offset to directory hash bucket table
    pub dir_bucket_offset: U64,
    /// Size of directory hash bucket table
    pub dir_bucket_size: U64,
    /// Offset to directory entry table
    pub dir_entry_offset: U64,
    /// Size of directory entry table
    pub dir_entry_size: U64,
    /// Offset to file hash bucket table
    pub file_bucket_offset: U64,
    /// Size of file hash bucket table
    pub file_bucket_size: U64,
    /// Offset to file entry table
    pub file_entry_offset: U64,
    /// Size of file entry table
    pub file_entry_size: U64,
    /// Offset to file data region
    pub body_offset: U64,
}

// Verify struct size - https://switchbrew.org/wiki/RomFS#Header
const_assert_eq!(size_of::<RomFsHeader>() as u64, ROMFS_HEADER_SIZE);

/// RomFS directory entry (0x18 bytes + variable-length name).
///
/// The name is padded with zeroes so the whole record is a multiple of 4 bytes.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RomFsDirEntry {
    /// Offset to parent directory
    pub parent_offset: U32,
    /// Offset to next sibling directory (`ROMFS_VOID_ENTRY` if none)
    pub next_offset: U32,
    /// Offset to first child directory (`ROMFS_VOID_ENTRY` if none)
    pub dir_offset: U32,
    /// Offset to first child file (`ROMFS_VOID_ENTRY` if none)
    pub file_offset: U32,
    /// Offset to next entry in hash bucket (`ROMFS_VOID_ENTRY` if end of chain)
    pub bucket_offset: U32,
    /// Length of directory name in bytes
    pub name_len: U32,
    // Directory name follows (variable length UTF-8)
}

// Verify struct size - https://switchbrew.org/wiki/RomFS#Directory_Entry
const_assert_eq!(size_of::<RomFsDirEntry>(), 0x18);

/// RomFS file entry (0x20 bytes + variable-length name).
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct RomFsFileEntry {
    /// Offset to parent directory
    pub parent_offset: U32,
    /// Offset to next sibling file (`ROMFS_VOID_ENTRY` if none)
    pub next_offset: U32,
    /// Offset to file data (relative to the body offset)
    pub data_offset: U64,
    /// Size of file data in bytes
    pub data_size: U64,
    /// Offset to next entry in hash bucket (`ROMFS_VOID_ENTRY` if end of chain)
    pub bucket_offset: U32,
    /// Length of file name in bytes
    pub name_len: U32,
    // File name follows (variable length UTF-8)
}

// Verify struct size - https://switchbrew.org/wiki/RomFS#File_Entry
const_assert_eq!(size_of::<RomFsFileEntry>(), 0x20);
