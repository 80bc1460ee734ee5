use std::io::{self, Read, Seek, SeekFrom};

use super::{FileEntry, RomFs};
use crate::read::source::SectionReader;

impl<'a, R: SectionReader + ?Sized> RomFs<'a, R> {
    /// Get a `std::io` reader over the data of `entry`.
    pub fn file_reader<'r>(&'r self, entry: FileEntry<'r>) -> FileReader<'r, 'a, R> {
        FileReader {
            romfs: self,
            entry,
            pos: 0,
        }
    }
}

/// Seekable reader over one RomFS file. Every `read` goes to the section reader.
pub struct FileReader<'r, 'a, R: SectionReader + ?Sized> {
    romfs: &'r RomFs<'a, R>,
    entry: FileEntry<'r>,
    pos: u64,
}

impl<'r, R: SectionReader + ?Sized> FileReader<'r, '_, R> {
    /// Get the file entry being read.
    pub fn entry(&self) -> &FileEntry<'r> {
        &self.entry
    }

    /// Bytes left before end of file.
    pub fn remaining(&self) -> u64 {
        self.entry.size().saturating_sub(self.pos)
    }
}

impl<R: SectionReader + ?Sized> Read for FileReader<'_, '_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = usize::try_from(self.remaining()).map_or(buf.len(), |r| r.min(buf.len()));
        if len == 0 {
            return Ok(0);
        }

        self.romfs
            .read_file_entry_data(&self.entry, &mut buf[..len], self.pos)
            .map_err(io::Error::other)?;
        self.pos += len as u64;
        Ok(len)
    }
}

impl<R: SectionReader + ?Sized> Seek for FileReader<'_, '_, R> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::End(delta) => self.entry.size().checked_add_signed(delta),
            SeekFrom::Current(delta) => self.pos.checked_add_signed(delta),
        };
        let target = target.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                "invalid seek to a negative or overflowing position",
            )
        })?;

        self.pos = target;
        Ok(target)
    }
}
