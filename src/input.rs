//! Wrapped input: a uniform handle over an on-disk file (memory-mapped) or
//! an in-memory buffer, with cached metadata.

use std::fs::File;
use std::sync::Arc;

use memmap2::{Mmap, MmapOptions};

use crate::error::Result;

/// A read-only view over an entry's full contents, shared across compressor
/// jobs operating on disjoint byte ranges.
pub enum InputView {
    Mapped(Mmap),
    Buffer(Vec<u8>),
    Empty,
}

impl InputView {
    pub fn as_slice(&self) -> &[u8] {
        match self {
            InputView::Mapped(m) => &m[..],
            InputView::Buffer(b) => &b[..],
            InputView::Empty => &[],
        }
    }
}

/// Wraps an open file (or in-memory buffer) and lazily produces a read-only
/// view of its full contents. Stat is cached on first access.
pub struct WrappedInput {
    file: Option<File>,
    buffer: Option<Vec<u8>>,
    size: u64,
}

impl WrappedInput {
    pub fn from_file(file: File) -> Result<Self> {
        let size = file.metadata()?.len();
        Ok(WrappedInput {
            file: Some(file),
            buffer: None,
            size,
        })
    }

    pub fn from_buffer(buffer: Vec<u8>) -> Self {
        let size = buffer.len() as u64;
        WrappedInput {
            file: None,
            buffer: Some(buffer),
            size,
        }
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    /// Memory-maps the file (or reuses the owned buffer). A zero-length file
    /// is never mapped: mmap of length zero is unsupported on some platforms
    /// and pointless regardless.
    pub fn view(&self) -> Result<Arc<InputView>> {
        if self.size == 0 {
            return Ok(Arc::new(InputView::Empty));
        }
        if let Some(buf) = &self.buffer {
            return Ok(Arc::new(InputView::Buffer(buf.clone())));
        }
        let file = self.file.as_ref().expect("file-backed WrappedInput must have a file");
        let mmap = unsafe { MmapOptions::new().len(self.size as usize).map(file)? };
        Ok(Arc::new(InputView::Mapped(mmap)))
    }
}
