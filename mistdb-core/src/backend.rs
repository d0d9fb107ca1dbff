//! Writer and reader backends for the two block streams
//!
//! A block is two logical byte streams (series index and blooms). Backends
//! provide the same layout over different storage: growable in-memory
//! buffers, or two fixed-name files in a caller-provided directory.
//! Round-trip equivalence across backends is a tested property.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use memmap2::Mmap;

use crate::{MistError, Result};

/// File name of the series index stream in a block directory
pub const SERIES_FILE: &str = "series";
/// File name of the blooms stream in a block directory
pub const BLOOM_FILE: &str = "bloom";

/// Byte sink for the two streams of one block
pub trait BlockWriter {
    /// Sequential writer for the series index stream
    fn index(&mut self) -> &mut dyn Write;

    /// Sequential writer for the blooms stream
    fn blooms(&mut self) -> &mut dyn Write;

    /// Flush and durably persist both streams
    fn seal(&mut self) -> Result<()>;

    /// Drop partial output from a build that did not reach seal
    fn discard(&mut self) -> Result<()>;
}

impl<W: BlockWriter + ?Sized> BlockWriter for &mut W {
    fn index(&mut self) -> &mut dyn Write {
        (**self).index()
    }

    fn blooms(&mut self) -> &mut dyn Write {
        (**self).blooms()
    }

    fn seal(&mut self) -> Result<()> {
        (**self).seal()
    }

    fn discard(&mut self) -> Result<()> {
        (**self).discard()
    }
}

/// Random-access reader over the two streams of one block
pub trait BlockReader {
    fn index_len(&self) -> Result<u64>;
    fn blooms_len(&self) -> Result<u64>;

    /// Read `len` bytes of the series index stream starting at `offset`
    fn read_index(&self, offset: u64, len: usize) -> Result<Bytes>;

    /// Read `len` bytes of the blooms stream starting at `offset`
    fn read_blooms(&self, offset: u64, len: usize) -> Result<Bytes>;
}

fn slice_stream(data: &[u8], offset: u64, len: usize, stream: &str) -> Result<Bytes> {
    let start = offset as usize;
    let end = start
        .checked_add(len)
        .filter(|&end| end <= data.len())
        .ok_or_else(|| {
            MistError::Corrupt(format!(
                "{} read out of range: offset {} len {} of {} bytes",
                stream,
                offset,
                len,
                data.len()
            ))
        })?;
    Ok(Bytes::copy_from_slice(&data[start..end]))
}

/// Writer backed by two growable in-memory buffers
#[derive(Default)]
pub struct MemoryBlockWriter {
    index: Vec<u8>,
    blooms: Vec<u8>,
}

impl MemoryBlockWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot the written streams for a matching [`ByteReader`]
    pub fn bytes(&self) -> (Bytes, Bytes) {
        (
            Bytes::copy_from_slice(&self.index),
            Bytes::copy_from_slice(&self.blooms),
        )
    }

    /// Build a reader over the written streams
    pub fn reader(&self) -> ByteReader {
        let (index, blooms) = self.bytes();
        ByteReader::new(index, blooms)
    }
}

impl BlockWriter for MemoryBlockWriter {
    fn index(&mut self) -> &mut dyn Write {
        &mut self.index
    }

    fn blooms(&mut self) -> &mut dyn Write {
        &mut self.blooms
    }

    fn seal(&mut self) -> Result<()> {
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        self.index.clear();
        self.blooms.clear();
        Ok(())
    }
}

/// Reader over in-memory stream snapshots
pub struct ByteReader {
    index: Bytes,
    blooms: Bytes,
}

impl ByteReader {
    pub fn new(index: Bytes, blooms: Bytes) -> Self {
        Self { index, blooms }
    }
}

impl BlockReader for ByteReader {
    fn index_len(&self) -> Result<u64> {
        Ok(self.index.len() as u64)
    }

    fn blooms_len(&self) -> Result<u64> {
        Ok(self.blooms.len() as u64)
    }

    fn read_index(&self, offset: u64, len: usize) -> Result<Bytes> {
        slice_stream(&self.index, offset, len, "index")
    }

    fn read_blooms(&self, offset: u64, len: usize) -> Result<Bytes> {
        slice_stream(&self.blooms, offset, len, "blooms")
    }
}

/// Writer backed by two fixed-name files in a directory.
///
/// `seal` flushes and fsyncs both files; `discard` unlinks whatever was
/// created so a failed build leaves nothing behind.
pub struct DirectoryBlockWriter {
    dir: PathBuf,
    index: BufWriter<File>,
    blooms: BufWriter<File>,
}

impl DirectoryBlockWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let open = |name: &str| -> std::io::Result<BufWriter<File>> {
            let file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(dir.join(name))?;
            Ok(BufWriter::new(file))
        };

        Ok(Self {
            index: open(SERIES_FILE)?,
            blooms: open(BLOOM_FILE)?,
            dir,
        })
    }
}

impl BlockWriter for DirectoryBlockWriter {
    fn index(&mut self) -> &mut dyn Write {
        &mut self.index
    }

    fn blooms(&mut self) -> &mut dyn Write {
        &mut self.blooms
    }

    fn seal(&mut self) -> Result<()> {
        self.index.flush()?;
        self.index.get_ref().sync_all()?;
        self.blooms.flush()?;
        self.blooms.get_ref().sync_all()?;
        Ok(())
    }

    fn discard(&mut self) -> Result<()> {
        for name in [SERIES_FILE, BLOOM_FILE] {
            let path = self.dir.join(name);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }
}

/// Memory-mapped reader over a block directory
pub struct DirectoryBlockReader {
    index: Mmap,
    blooms: Mmap,
}

impl DirectoryBlockReader {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let map = |name: &str| -> Result<Mmap> {
            let file = File::open(dir.join(name))?;
            // Safety: block files are immutable after seal
            Ok(unsafe { Mmap::map(&file)? })
        };
        Ok(Self {
            index: map(SERIES_FILE)?,
            blooms: map(BLOOM_FILE)?,
        })
    }
}

impl BlockReader for DirectoryBlockReader {
    fn index_len(&self) -> Result<u64> {
        Ok(self.index.len() as u64)
    }

    fn blooms_len(&self) -> Result<u64> {
        Ok(self.blooms.len() as u64)
    }

    fn read_index(&self, offset: u64, len: usize) -> Result<Bytes> {
        slice_stream(&self.index, offset, len, "index")
    }

    fn read_blooms(&self, offset: u64, len: usize) -> Result<Bytes> {
        slice_stream(&self.blooms, offset, len, "blooms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_writer_roundtrip() {
        let mut writer = MemoryBlockWriter::new();
        writer.index().write_all(b"index bytes").unwrap();
        writer.blooms().write_all(b"bloom bytes").unwrap();
        writer.seal().unwrap();

        let reader = writer.reader();
        assert_eq!(reader.index_len().unwrap(), 11);
        assert_eq!(reader.read_index(0, 5).unwrap().as_ref(), b"index");
        assert_eq!(reader.read_blooms(6, 5).unwrap().as_ref(), b"bytes");
        assert!(reader.read_index(8, 10).is_err());
    }

    #[test]
    fn test_directory_writer_roundtrip() {
        let dir = tempfile::tempdir().unwrap();

        let mut writer = DirectoryBlockWriter::new(dir.path()).unwrap();
        writer.index().write_all(b"index bytes").unwrap();
        writer.blooms().write_all(b"bloom bytes").unwrap();
        writer.seal().unwrap();

        let reader = DirectoryBlockReader::new(dir.path()).unwrap();
        assert_eq!(reader.index_len().unwrap(), 11);
        assert_eq!(reader.read_index(0, 11).unwrap().as_ref(), b"index bytes");
        assert_eq!(reader.read_blooms(0, 11).unwrap().as_ref(), b"bloom bytes");
    }

    #[test]
    fn test_directory_discard_removes_files() {
        let dir = tempfile::tempdir().unwrap();

        let mut writer = DirectoryBlockWriter::new(dir.path()).unwrap();
        writer.index().write_all(b"partial").unwrap();
        writer.discard().unwrap();

        assert!(!dir.path().join(SERIES_FILE).exists());
        assert!(!dir.path().join(BLOOM_FILE).exists());
    }
}
