//! Sequential archive reader (C7): reads local file headers one after
//! another starting at offset 0, never touching the central directory.
//!
//! Grounded on `RZipStream.entries()` in the reference implementation's
//! `read.py`: this only handles archives with no gaps between entries and no
//! data descriptors, which is exactly what this crate's writer produces and
//! all this crate's re-mux path needs to copy entries between archives
//! without re-reading a central directory that may not even be trustworthy
//! yet (e.g. mid-write).

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use crate::error::{Result, ZipError};
use crate::types::LocalFileHeader;

/// One entry read off the wire: its header, the header's exact encoded
/// bytes (for re-mux, which needs to reproduce them byte for byte), and the
/// exact compressed bytes that followed it.
pub struct ReadEntry {
    pub lfh: LocalFileHeader,
    pub header_bytes: Vec<u8>,
    pub compressed_bytes: Vec<u8>,
}

/// Scans local file headers from the start of a stream until the central
/// directory signature is reached.
pub struct ZipReader<R> {
    inner: R,
    done: bool,
}

impl ZipReader<BufReader<File>> {
    /// Opens `path` and positions at offset 0, ready to read its first entry.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path.as_ref())?;
        Ok(ZipReader {
            inner: BufReader::new(file),
            done: false,
        })
    }
}

impl<R: Read> ZipReader<R> {
    /// Wraps an already-positioned reader. The caller is responsible for
    /// making sure it starts at the first local file header.
    pub fn from_reader(inner: R) -> Self {
        ZipReader { inner, done: false }
    }

    /// Reads the next entry, or `None` once the central directory signature
    /// is reached. Subsequent calls after `None` also return `None`.
    pub fn next_entry(&mut self) -> Result<Option<ReadEntry>> {
        if self.done {
            return Ok(None);
        }

        let (lfh, header_bytes) = match LocalFileHeader::read_from(&mut self.inner) {
            Ok(pair) => pair,
            Err(ZipError::EndOfLocalFiles) => {
                self.done = true;
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let mut compressed_bytes = vec![0u8; lfh.csize as usize];
        read_exact_counted(&mut self.inner, &mut compressed_bytes)?;

        Ok(Some(ReadEntry {
            lfh,
            header_bytes,
            compressed_bytes,
        }))
    }

    /// Reads every remaining entry whose header passes `filter`, discarding
    /// the rest. Mirrors the `callback` parameter on `entries()`.
    pub fn entries_matching<F>(&mut self, mut filter: F) -> Result<Vec<ReadEntry>>
    where
        F: FnMut(&LocalFileHeader) -> bool,
    {
        let mut out = Vec::new();
        while let Some(entry) = self.next_entry()? {
            if filter(&entry.lfh) {
                out.push(entry);
            }
        }
        Ok(out)
    }
}

fn read_exact_counted<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    let mut total = 0usize;
    while total < buf.len() {
        match r.read(&mut buf[total..])? {
            0 => {
                return Err(ZipError::ShortRead {
                    wanted: buf.len() as u64,
                    got: total as u64,
                })
            }
            n => total += n,
        }
    }
    Ok(())
}
