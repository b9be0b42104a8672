//! # parazip: parallel ZIP archive writer
//!
//! A ZIP writer built around a two-stage pipeline: opening and stat'ing
//! input files runs on one pool, compressing their contents runs on
//! another, and a single serializer thread emits entries to the output
//! stream in submission order. A minimal sequential reader supports the
//! re-mux path: copying already-compressed entries from one archive into
//! another without recompressing them.
//!
//! ## Writing
//!
//! ```no_run
//! use parazip::writer::{ParallelZipWriter, WriterConfig};
//!
//! let writer = ParallelZipWriter::create("out.zip", WriterConfig::default())?;
//! writer.write("file1.txt".as_ref(), None)?;
//! writer.write("file2.txt".as_ref(), Some("renamed.txt"))?;
//! writer.close()?;
//! # Ok::<(), parazip::error::ZipError>(())
//! ```
//!
//! ## Reading
//!
//! ```no_run
//! use parazip::reader::ZipReader;
//!
//! let mut reader = ZipReader::open("out.zip")?;
//! while let Some(entry) = reader.next_entry()? {
//!     println!("{}: {} compressed bytes", entry.lfh.filename, entry.compressed_bytes.len());
//! }
//! # Ok::<(), parazip::error::ZipError>(())
//! ```

pub mod algo;
pub mod chooser;
pub mod crc32_combine;
pub mod error;
pub mod input;
pub mod pool;
pub mod reader;
pub mod trace;
pub mod types;
pub mod writer;

pub use error::{Result, ZipError};
pub use reader::{ReadEntry, ZipReader};
pub use writer::{ParallelZipWriter, WriterConfig};
