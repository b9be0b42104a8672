//! The `deflate` method: raw (headerless) DEFLATE, split into 1 MiB blocks
//! compressed independently and joined with full-flush boundaries so the
//! blocks concatenate into one valid stream.

use std::sync::Arc;

use flate2::{Compress, Compression, FlushCompress};

use super::{parse_params, CompressedChunk, Compressor};
use crate::error::{Result, ZipError};
use crate::input::WrappedInput;
use crate::pool::{JobHandle, WorkerPool};

pub(crate) const BLOCK_SIZE: u64 = 1024 * 1024;

pub struct DeflateCompressor {
    level: Compression,
}

impl DeflateCompressor {
    pub fn new(params: &str) -> Result<Self> {
        let mut level = Compression::default();
        for (k, v) in parse_params(params)? {
            match k.as_str() {
                "compresslevel" => {
                    if !(-1..=9).contains(&v) {
                        return Err(ZipError::UnknownAlgoParam {
                            algo: "deflate".to_string(),
                            param: format!("compresslevel={}", v),
                        });
                    }
                    level = if v == -1 {
                        Compression::default()
                    } else {
                        Compression::new(v as u32)
                    };
                }
                other => {
                    return Err(ZipError::UnknownAlgoParam {
                        algo: "deflate".to_string(),
                        param: other.to_string(),
                    })
                }
            }
        }
        Ok(DeflateCompressor { level })
    }
}

impl Compressor for DeflateCompressor {
    fn method(&self) -> u16 {
        8
    }

    fn version_needed(&self) -> u16 {
        20
    }

    fn compress_to_jobs(
        &self,
        pool: &WorkerPool,
        size: u64,
        input: Arc<WrappedInput>,
    ) -> Vec<JobHandle<CompressedChunk>> {
        let block_starts: Vec<u64> = if size == 0 {
            vec![0]
        } else {
            (0..size).step_by(BLOCK_SIZE as usize).collect()
        };
        let last_start = *block_starts.last().unwrap();
        let level = self.level;

        block_starts
            .into_iter()
            .map(|start| {
                let input = Arc::clone(&input);
                let is_final = start == last_start;
                pool.submit(move || {
                    let view = input.view().expect("input view materialization failed");
                    let end = std::cmp::min(size, start + BLOCK_SIZE) as usize;
                    let data = &view.as_slice()[start as usize..end];

                    let mut hasher = crc32fast::Hasher::new();
                    hasher.update(data);
                    let crc = hasher.finalize();

                    // Raw deflate (no zlib header), window bits 15, fresh
                    // stream per block: full-flush boundaries let blocks
                    // concatenate into one valid DEFLATE stream.
                    let mut compressor = Compress::new_with_window_bits(level, false, 15);
                    let mut out = Vec::with_capacity(data.len() / 2 + 64);
                    let flush = if is_final {
                        FlushCompress::Finish
                    } else {
                        FlushCompress::Full
                    };
                    compressor
                        .compress_vec(data, &mut out, flush)
                        .expect("deflate block compression failed");

                    (out, data.len() as u64, Some(crc))
                })
            })
            .collect()
    }
}
