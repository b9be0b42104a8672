//! Compression plugins and the registry that resolves an algorithm key
//! (`name[@k=v,...]`) to a constructed [`Compressor`].

pub mod deflate;
pub mod freelist;
pub mod store;
pub mod zstd;

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Result, ZipError};
use crate::input::WrappedInput;
use crate::pool::{JobHandle, WorkerPool};

/// `(compressed_bytes, raw_len, crc32_of_raw)`. `crc32_of_raw` is `None` for
/// zstd spacer jobs, which contribute no bytes and no checksum.
pub type CompressedChunk = (Vec<u8>, u64, Option<u32>);

pub trait Compressor: Send + Sync {
    /// The ZIP `method` field this compressor writes.
    fn method(&self) -> u16;
    /// Minimum ZIP version required to decode entries from this compressor.
    fn version_needed(&self) -> u16;
    /// Splits `input` into an ordered sequence of job handles. The consumer
    /// concatenates the returned bytes in order and CRC-combines the chunk
    /// CRCs left to right.
    fn compress_to_jobs(
        &self,
        pool: &WorkerPool,
        size: u64,
        input: Arc<WrappedInput>,
    ) -> Vec<JobHandle<CompressedChunk>>;
}

/// Parses `"k=v,k=v"` into a map; a bare key (no `=`) defaults to `1`.
pub fn parse_params(params: &str) -> Result<HashMap<String, i64>> {
    let mut out = HashMap::new();
    if params.is_empty() {
        return Ok(out);
    }
    for part in params.split(',') {
        match part.split_once('=') {
            Some((k, v)) => {
                let parsed: i64 = v.parse().map_err(|_| ZipError::UnknownAlgoParam {
                    algo: String::new(),
                    param: part.to_string(),
                })?;
                out.insert(k.to_string(), parsed);
            }
            None => {
                out.insert(part.to_string(), 1);
            }
        }
    }
    Ok(out)
}

/// Resolves `"name[@k=v,...]"` into a constructed compressor plus the
/// worker-pool thread count it should plan its concurrency around.
pub fn build_compressor(key: &str, threads: usize) -> Result<Box<dyn Compressor>> {
    let (name, params) = key.split_once('@').unwrap_or((key, ""));
    match name {
        "store" => {
            if !params.is_empty() {
                return Err(ZipError::UnknownAlgoParam {
                    algo: "store".to_string(),
                    param: params.to_string(),
                });
            }
            Ok(Box::new(store::StoreCompressor))
        }
        "deflate" => Ok(Box::new(deflate::DeflateCompressor::new(params)?)),
        "zstd" => Ok(Box::new(zstd::ZstdCompressor::new(threads, params)?)),
        other => Err(ZipError::UnknownAlgo(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_key_defaults_to_one() {
        let parsed = parse_params("enable_ldm").unwrap();
        assert_eq!(parsed.get("enable_ldm"), Some(&1));
    }

    #[test]
    fn keyed_values_parse_as_integers() {
        let parsed = parse_params("compresslevel=6,enable_ldm=1").unwrap();
        assert_eq!(parsed.get("compresslevel"), Some(&6));
        assert_eq!(parsed.get("enable_ldm"), Some(&1));
    }

    #[test]
    fn empty_params_is_empty_map() {
        assert!(parse_params("").unwrap().is_empty());
    }

    #[test]
    fn unknown_algo_name_is_rejected() {
        assert!(matches!(
            build_compressor("lzma", 4).unwrap_err(),
            ZipError::UnknownAlgo(_)
        ));
    }
}
