use alloc::{collections::BTreeSet, vec::Vec};

use tracing::warn;

use super::entry::{DirEntry, EntryTables, TableKind};

/// Entries and bytes reachable below a directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirStats {
    /// Descendant directories (the starting directory is not counted)
    pub dirs: u64,
    /// Descendant files
    pub files: u64,
    /// Sum of descendant file sizes
    pub bytes: u64,
}

/// Why a traversal gave up on the directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkageFault {
    /// An entry was reached twice
    Revisited,
    /// Directory nesting exceeds the configured depth
    TooDeep,
    /// File sizes sum past `u64::MAX`
    SizeOverflow,
}

impl core::fmt::Display for LinkageFault {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Revisited => f.write_str("entry reached twice"),
            Self::TooDeep => f.write_str("directory nesting too deep"),
            Self::SizeOverflow => f.write_str("total size overflows"),
        }
    }
}

impl<'t> EntryTables<'t> {
    /// Walk every directory and file reachable from the directory at `dir_offset`.
    ///
    /// Directories deeper than `max_depth` levels below the start, and entries
    /// linked from more than one place, fail the walk.
    pub fn directory_stats(
        &self,
        dir_offset: u32,
        max_depth: usize,
    ) -> Result<DirStats, SizeError> {
        let start = self.directory(dir_offset).ok_or(SizeError::OutOfBounds {
            table: TableKind::Directory,
            offset: dir_offset,
        })?;

        let mut stats = DirStats::default();
        let mut seen_dirs = BTreeSet::from([dir_offset]);
        let mut seen_files = BTreeSet::new();
        let mut pending: Vec<(DirEntry<'t>, usize)> = alloc::vec![(start, 0)];

        while let Some((dir, depth)) = pending.pop() {
            let mut next = dir.first_child_file();
            while let Some(offset) = next {
                if !seen_files.insert(offset) {
                    return Err(malformed(TableKind::File, offset, LinkageFault::Revisited));
                }
                let file = self.file(offset).ok_or(SizeError::OutOfBounds {
                    table: TableKind::File,
                    offset,
                })?;
                stats.bytes = stats.bytes.checked_add(file.size()).ok_or_else(|| {
                    malformed(TableKind::File, offset, LinkageFault::SizeOverflow)
                })?;
                stats.files += 1;
                next = file.next_sibling();
            }

            let mut next = dir.first_child_dir();
            while let Some(offset) = next {
                if !seen_dirs.insert(offset) {
                    return Err(malformed(
                        TableKind::Directory,
                        offset,
                        LinkageFault::Revisited,
                    ));
                }
                let child = self.directory(offset).ok_or(SizeError::OutOfBounds {
                    table: TableKind::Directory,
                    offset,
                })?;
                if depth >= max_depth {
                    return Err(malformed(TableKind::Directory, offset, LinkageFault::TooDeep));
                }
                stats.dirs += 1;
                pending.push((child, depth + 1));
                next = child.next_sibling();
            }
        }

        Ok(stats)
    }
}

fn malformed(table: TableKind, offset: u32, fault: LinkageFault) -> SizeError {
    warn!(%table, offset, %fault, "rejecting malformed romfs linkage");
    SizeError::MalformedLinkage {
        table,
        offset,
        fault,
    }
}

/// Errors that can occur when accumulating directory sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SizeError {
    /// Offset does not resolve to an entry
    #[error("{table} entry offset {offset:#x} is out of bounds")]
    OutOfBounds {
        /// Table the offset points into
        table: TableKind,
        /// Offending offset
        offset: u32,
    },
    /// Links form a loop, nest too deeply, or sum past `u64::MAX`
    #[error("malformed {table} linkage at offset {offset:#x}: {fault}")]
    MalformedLinkage {
        /// Table the offending link points into
        table: TableKind,
        /// Offending offset
        offset: u32,
        /// What went wrong
        fault: LinkageFault,
    },
    /// Tables were released
    #[error("romfs context released")]
    Released,
}
