//! Integrity-verification descriptors stored in NCA FS section headers.
//!
//! Only the fields needed to locate the RomFS region inside an FS section are
//! interpreted by this crate; hashing itself is left to the section reader.

use static_assertions::const_assert_eq;
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, little_endian::*};

/// `IVFC` magic, little-endian.
pub const IVFC_MAGIC: u32 = 0x4346_5649;

/// Maximum number of hash layers in a hierarchical SHA-256 descriptor.
pub const HIERARCHICAL_SHA256_MAX_LAYERS: usize = 5;

/// Number of level records in an IVFC descriptor.
pub const IVFC_LEVEL_COUNT: usize = 6;

/// Region within an FS section.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct HashRegion {
    /// Region offset, relative to the start of the FS section
    pub offset: U64,
    /// Region size in bytes
    pub size: U64,
}

const_assert_eq!(size_of::<HashRegion>(), 0x10);

/// Hierarchical SHA-256 descriptor (0xF8 bytes), used by NCA0 RomFS sections.
///
/// The last populated layer region holds the RomFS itself.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct HierarchicalSha256Data {
    /// SHA-256 of the first hash layer
    pub master_hash: [u8; 0x20],
    /// Hashed block size
    pub hash_block_size: U32,
    /// Number of populated layer regions
    pub layer_count: U32,
    /// Layer regions, hash tables first, data last
    pub layer_regions: [HashRegion; HIERARCHICAL_SHA256_MAX_LAYERS],
    pub reserved: [u8; 0x80],
}

const_assert_eq!(size_of::<HierarchicalSha256Data>(), 0xF8);

/// One IVFC level record.
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct IvfcLevel {
    /// Level offset, relative to the start of the FS section
    pub offset: U64,
    /// Level size in bytes
    pub size: U64,
    /// log2 of the hashed block size
    pub block_order: U32,
    pub reserved: U32,
}

const_assert_eq!(size_of::<IvfcLevel>(), 0x18);

/// Hierarchical integrity (IVFC) descriptor (0xF8 bytes), used by NCA2/NCA3 RomFS sections.
///
/// See: <https://switchbrew.org/wiki/NCA#HierarchicalIntegrity>
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
#[repr(C)]
pub struct IntegrityMetaInfo {
    /// Magic (`IVFC`)
    pub magic: U32,
    /// Format version
    pub version: U32,
    /// Size of the master hash
    pub master_hash_size: U32,
    /// Level count including the master hash level
    pub max_level_count: U32,
    /// Level records; the last populated one holds the RomFS
    pub levels: [IvfcLevel; IVFC_LEVEL_COUNT],
    pub signature_salt: [u8; 0x20],
    pub master_hash: [u8; 0x20],
    pub reserved: [u8; 0x18],
}

const_assert_eq!(size_of::<IntegrityMetaInfo>(), 0xF8);
