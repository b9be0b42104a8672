//! Error types for parazip

use std::io;

/// Result type for parazip operations
pub type Result<T> = std::result::Result<T, ZipError>;

/// Error types that can occur during archive read/write.
#[derive(Debug)]
pub enum ZipError {
    /// I/O error from the underlying stream or filesystem.
    Io(io::Error),
    /// Fewer bytes were available than a header declared.
    ShortRead { wanted: u64, got: u64 },
    /// A record signature did not match any known record type.
    BadSignature(u32),
    /// Sequential scan reached the central directory: not an error, but not
    /// an entry either. Callers treat this as end-of-stream.
    EndOfLocalFiles,
    /// A feature present in the archive is not supported by this implementation
    /// (data descriptors, encryption, multi-disk archives).
    UnsupportedFeature(&'static str),
    /// An algorithm key did not resolve to a known compressor.
    UnknownAlgo(String),
    /// An algorithm key carried a parameter the compressor does not recognize.
    UnknownAlgoParam { algo: String, param: String },
    /// The encoded length of a local file header changed between its
    /// provisional and final write. This can only happen from a bug in
    /// ZIP64-promotion bookkeeping and is unrecoverable.
    ZipSizeInvariantViolated { entry: String },
    /// A compressor failed while producing or consuming bytes.
    CompressFailure(String),
    /// Malformed ZIP structure not covered by a more specific variant.
    InvalidFormat(String),
    /// Entry not found in the archive.
    EntryNotFound(String),
}

impl std::fmt::Display for ZipError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZipError::Io(e) => write!(f, "I/O error: {}", e),
            ZipError::ShortRead { wanted, got } => {
                write!(f, "short read: wanted {} but got {}", wanted, got)
            }
            ZipError::BadSignature(sig) => write!(f, "bad record signature: {:#010x}", sig),
            ZipError::EndOfLocalFiles => write!(f, "end of local files"),
            ZipError::UnsupportedFeature(what) => write!(f, "unsupported feature: {}", what),
            ZipError::UnknownAlgo(key) => write!(f, "unknown compression algorithm: {}", key),
            ZipError::UnknownAlgoParam { algo, param } => {
                write!(f, "unknown parameter {:?} for algorithm {}", param, algo)
            }
            ZipError::ZipSizeInvariantViolated { entry } => {
                write!(f, "local file header changed size for entry {:?}", entry)
            }
            ZipError::CompressFailure(msg) => write!(f, "compression failure: {}", msg),
            ZipError::InvalidFormat(msg) => write!(f, "invalid ZIP format: {}", msg),
            ZipError::EntryNotFound(name) => write!(f, "entry not found: {}", name),
        }
    }
}

impl std::error::Error for ZipError {}

impl From<io::Error> for ZipError {
    fn from(err: io::Error) -> Self {
        ZipError::Io(err)
    }
}
