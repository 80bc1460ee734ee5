use zerocopy::FromBytes;

use crate::{
    raw::romfs::{RomFsHeader, RomFsHeaderOld},
    read::source::HeaderLayout,
};

/// RomFS header normalized to 64-bit fields, whichever layout it was read from.
///
/// All offsets are relative to the start of the RomFS.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Layout the header was decoded from
    pub layout: HeaderLayout,
    pub header_size: u64,
    pub dir_bucket_offset: u64,
    pub dir_bucket_size: u64,
    pub dir_entry_offset: u64,
    pub dir_entry_size: u64,
    pub file_bucket_offset: u64,
    pub file_bucket_size: u64,
    pub file_entry_offset: u64,
    pub file_entry_size: u64,
    /// Start of the file data region
    pub body_offset: u64,
}

impl Header {
    /// Decode and validate a header of the given layout.
    pub fn parse(layout: HeaderLayout, bytes: &[u8]) -> Result<Self, HeaderError> {
        let header = match layout {
            HeaderLayout::Old => {
                let raw = RomFsHeaderOld::ref_from_prefix(bytes)
                    .map_err(|_| HeaderError::BufferTooSmall {
                        required: size_of::<RomFsHeaderOld>(),
                        available: bytes.len(),
                    })?
                    .0;
                Self {
                    layout,
                    header_size: raw.header_size.get().into(),
                    dir_bucket_offset: raw.dir_bucket_offset.get().into(),
                    dir_bucket_size: raw.dir_bucket_size.get().into(),
                    dir_entry_offset: raw.dir_entry_offset.get().into(),
                    dir_entry_size: raw.dir_entry_size.get().into(),
                    file_bucket_offset: raw.file_bucket_offset.get().into(),
                    file_bucket_size: raw.file_bucket_size.get().into(),
                    file_entry_offset: raw.file_entry_offset.get().into(),
                    file_entry_size: raw.file_entry_size.get().into(),
                    body_offset: raw.body_offset.get().into(),
                }
            }
            HeaderLayout::Current => {
                let raw = RomFsHeader::ref_from_prefix(bytes)
                    .map_err(|_| HeaderError::BufferTooSmall {
                        required: size_of::<RomFsHeader>(),
                        available: bytes.len(),
                    })?
                    .0;
                Self {
                    layout,
                    header_size: raw.header_size.get(),
                    dir_bucket_offset: raw.dir_bucket_offset.get(),
                    dir_bucket_size: raw.dir_bucket_size.get(),
                    dir_entry_offset: raw.dir_entry_offset.get(),
                    dir_entry_size: raw.dir_entry_size.get(),
                    file_bucket_offset: raw.file_bucket_offset.get(),
                    file_bucket_size: raw.file_bucket_size.get(),
                    file_entry_offset: raw.file_entry_offset.get(),
                    file_entry_size: raw.file_entry_size.get(),
                    body_offset: raw.body_offset.get(),
                }
            }
        };

        if header.header_size != layout.header_size() {
            return Err(HeaderError::InvalidHeaderSize {
                layout,
                expected: layout.header_size(),
                found: header.header_size,
            });
        }

        Ok(header)
    }
}

/// Errors that can occur when decoding a RomFS header
#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    /// Buffer is too small to contain the header
    #[error("buffer too small: need {required} bytes, have {available}")]
    BufferTooSmall {
        /// Number of bytes required
        required: usize,
        /// Number of bytes available
        available: usize,
    },
    /// Header size field does not match the layout
    #[error("invalid {layout} header_size: expected {expected:#x}, found {found:#x}")]
    InvalidHeaderSize {
        /// Layout the header was decoded as
        layout: HeaderLayout,
        /// Size required by the layout
        expected: u64,
        /// Found size value
        found: u64,
    },
}
