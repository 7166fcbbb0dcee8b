//! Destinations for downloaded bytes.
//!
//! A sink sees each confirmed frame once, in file order. Both sinks here
//! reject a write that does not start where the previous one ended, so a gap
//! or an overlap surfaces as an error instead of a corrupt file.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Receives file data in increasing, contiguous offset order.
pub trait ChunkSink {
    /// Store `data`, which belongs at `offset` in the remote file.
    fn accept(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;
}

impl<S: ChunkSink + ?Sized> ChunkSink for &mut S {
    fn accept(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        (**self).accept(offset, data)
    }
}

fn check_contiguous(expected: u64, offset: u64) -> io::Result<()> {
    if offset != expected {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("write at offset {offset}, expected {expected}"),
        ));
    }
    Ok(())
}

/// Writes the download to a local file, flushing after every frame.
#[derive(Debug)]
pub struct FileSink {
    file: File,
    path: PathBuf,
    written: u64,
}

impl FileSink {
    /// Create (or truncate) the output file.
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;
        Ok(Self {
            file,
            path,
            written: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl ChunkSink for FileSink {
    fn accept(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        check_contiguous(self.written, offset)?;
        self.file.write_all(data)?;
        self.file.flush()?;
        self.written += data.len() as u64;
        Ok(())
    }
}

/// Collects the download in memory and remembers every write.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    data: Vec<u8>,
    writes: Vec<(u64, usize)>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// `(offset, len)` of each accepted write, in call order.
    pub fn writes(&self) -> &[(u64, usize)] {
        &self.writes
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.data
    }
}

impl ChunkSink for MemorySink {
    fn accept(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        check_contiguous(self.data.len() as u64, offset)?;
        self.data.extend_from_slice(data);
        self.writes.push((offset, data.len()));
        Ok(())
    }
}
