//! # nx-romfs
//! Read-only access to RomFS images embedded in NCA FS sections.
//!
//! This crate provides two layers:
//! - `raw`: Low-level binary structure definitions using `zerocopy`
//! - `read`: Validated parsing, tree navigation, size accumulation, and file reads
//!
//! Both RomFS header layouts are supported: the 0x28-byte header of NCA0
//! sections (hierarchical SHA-256) and the 0x50-byte header of NCA2/NCA3
//! sections (hierarchical integrity). Hash verification itself is delegated to
//! a caller-provided [`read::SectionReader`].
//!
//! # References
//! - [switchbrew RomFS](https://switchbrew.org/wiki/RomFS)
//! - [switchbrew NCA](https://switchbrew.org/wiki/NCA)

#![cfg_attr(not(any(feature = "std", test)), no_std)]

extern crate alloc;

pub mod raw;
pub mod read;

#[cfg(test)]
mod test_image;
