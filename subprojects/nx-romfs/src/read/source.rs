use crate::raw::{
    nca::{
        HIERARCHICAL_SHA256_MAX_LAYERS, HierarchicalSha256Data, IVFC_LEVEL_COUNT, IVFC_MAGIC,
        IntegrityMetaInfo,
    },
    romfs::{ROMFS_HEADER_SIZE, ROMFS_OLD_HEADER_SIZE},
};

/// Binary layout of the RomFS header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayout {
    /// 32-bit fields, 0x28 bytes (NCA0)
    Old,
    /// 64-bit fields, 0x50 bytes (NCA2/NCA3)
    Current,
}

impl HeaderLayout {
    /// Expected value of the `header_size` field, which is also the header's on-disk size.
    pub const fn header_size(self) -> u64 {
        match self {
            Self::Old => ROMFS_OLD_HEADER_SIZE,
            Self::Current => ROMFS_HEADER_SIZE,
        }
    }
}

impl core::fmt::Display for HeaderLayout {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Old => f.write_str("old"),
            Self::Current => f.write_str("current"),
        }
    }
}

/// Integrity-verification descriptor of the FS section holding the RomFS.
///
/// Exactly one scheme applies to a section, decided by the container version:
/// NCA0 sections use hierarchical SHA-256, NCA2/NCA3 sections use hierarchical integrity (IVFC).
#[derive(Debug, Clone, Copy)]
pub enum HashInfo<'a> {
    /// NCA0 flat hash layers
    HierarchicalSha256(&'a HierarchicalSha256Data),
    /// NCA2/NCA3 IVFC levels
    HierarchicalIntegrity(&'a IntegrityMetaInfo),
}

impl HashInfo<'_> {
    /// Header layout used by RomFS images verified with this scheme.
    pub fn header_layout(&self) -> HeaderLayout {
        match self {
            Self::HierarchicalSha256(_) => HeaderLayout::Old,
            Self::HierarchicalIntegrity(_) => HeaderLayout::Current,
        }
    }

    /// Location of the RomFS within the FS section.
    pub fn romfs_region(&self) -> Result<Region, HashInfoError> {
        let (offset, size) = match self {
            Self::HierarchicalSha256(info) => {
                let count = info.layer_count.get();
                if !(2..=HIERARCHICAL_SHA256_MAX_LAYERS as u32).contains(&count) {
                    return Err(HashInfoError::InvalidLayerCount { count });
                }
                let layer = &info.layer_regions[count as usize - 1];
                (layer.offset.get(), layer.size.get())
            }
            Self::HierarchicalIntegrity(info) => {
                let magic = info.magic.get();
                if magic != IVFC_MAGIC {
                    return Err(HashInfoError::InvalidMagic { found: magic });
                }
                // The level count includes the master hash, which has no record.
                let count = info.max_level_count.get();
                if !(2..=IVFC_LEVEL_COUNT as u32 + 1).contains(&count) {
                    return Err(HashInfoError::InvalidLayerCount { count });
                }
                let level = &info.levels[count as usize - 2];
                (level.offset.get(), level.size.get())
            }
        };

        if offset.checked_add(size).is_none() {
            return Err(HashInfoError::RegionOverflow { offset, size });
        }

        Ok(Region { offset, size })
    }
}

/// Byte range within an FS section.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    /// Start offset, relative to the start of the FS section
    pub offset: u64,
    /// Length in bytes
    pub size: u64,
}

/// Integrity-verified read access to one FS section.
///
/// Implementors own the hash verification for both schemes; RomFS code only
/// forwards the descriptor chosen when the image was opened.
pub trait SectionReader {
    /// Error reported when a read fails or does not verify.
    type Error: core::error::Error + Send + Sync + 'static;

    /// Fill `buf` with verified bytes starting at `offset` (relative to the FS section).
    fn read_verified(
        &self,
        hash_info: &HashInfo<'_>,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<(), Self::Error>;
}

impl<T: SectionReader + ?Sized> SectionReader for &T {
    type Error = T::Error;

    fn read_verified(
        &self,
        hash_info: &HashInfo<'_>,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<(), Self::Error> {
        (**self).read_verified(hash_info, offset, buf)
    }
}

/// Errors returned when a hash descriptor does not describe a usable RomFS region
#[derive(Debug, thiserror::Error)]
pub enum HashInfoError {
    /// IVFC magic does not match expected value (0x43465649)
    #[error("invalid IVFC magic: expected 0x43465649 (IVFC), found {found:#010x}")]
    InvalidMagic {
        /// Found magic number
        found: u32,
    },
    /// Layer or level count is outside the supported range
    #[error("invalid hash layer count: {count}")]
    InvalidLayerCount {
        /// Found count
        count: u32,
    },
    /// Region end does not fit in 64 bits
    #[error("romfs region overflows: offset {offset:#x}, size {size:#x}")]
    RegionOverflow {
        /// Region offset
        offset: u64,
        /// Region size
        size: u64,
    },
}
