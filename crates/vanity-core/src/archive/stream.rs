use std::fmt;
use std::io::{self, Read, Seek, SeekFrom, Write};

use tempfile::SpooledTempFile;

use crate::error::{Result, ResultExt};

/// A finished module archive, readable from the start.
///
/// Small archives stay in memory; larger ones spill to an anonymous
/// temporary file that disappears when the stream is dropped. The stream
/// owns its storage and does not depend on any fetch workspace.
pub struct ArchiveStream {
    inner: SpooledTempFile,
    len: u64,
}

impl ArchiveStream {
    /// An empty sink that stays in memory up to `threshold` bytes.
    pub fn spooled(threshold: usize) -> SpooledTempFile {
        SpooledTempFile::new(threshold)
    }

    /// Rewind a written sink and wrap it for reading.
    pub fn from_spooled(mut inner: SpooledTempFile) -> Result<Self> {
        const OP: &str = "archive.stream";
        inner.flush().op(OP)?;
        let len = inner.seek(SeekFrom::End(0)).op(OP)?;
        inner.seek(SeekFrom::Start(0)).op(OP)?;
        Ok(Self { inner, len })
    }

    /// Wrap bytes already held in memory.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut inner = SpooledTempFile::new(bytes.len());
        inner.write_all(bytes).op("archive.stream")?;
        Self::from_spooled(inner)
    }

    /// Total archive size in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Whether the archive spilled to disk.
    pub fn is_on_disk(&self) -> bool {
        self.inner.is_rolled()
    }

    /// Read the whole remaining archive into memory.
    pub fn into_bytes(mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.len as usize);
        self.inner.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl Read for ArchiveStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Seek for ArchiveStream {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.inner.seek(pos)
    }
}

impl fmt::Debug for ArchiveStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveStream")
            .field("len", &self.len)
            .field("on_disk", &self.is_on_disk())
            .finish()
    }
}
