//! Raw binary structure definitions for RomFS images and their NCA hash descriptors.
//!
//! This module contains zero-copy struct definitions using the `zerocopy` crate.
//! All structures are defined with `#[repr(C)]` and match the on-disk layout.
//!
//! For validated access with error handling, see the `read` module.

pub mod nca;
pub mod romfs;
