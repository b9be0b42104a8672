//! The `zstd` method. Small inputs get one single-threaded frame; inputs at
//! or above [`SINGLE_THRESHOLD`] get one multi-threaded streaming frame plus
//! "spacer" jobs that reserve the remaining pool slots so a large file
//! doesn't oversubscribe the CPU pool relative to its own internal threads.

use std::io::Write;
use std::sync::{Arc, Condvar, Mutex};

use zstd::stream::raw::CParameter;

use super::freelist::FactoryFreelist;
use super::{parse_params, CompressedChunk, Compressor};
use crate::error::{Result, ZipError};
use crate::input::WrappedInput;
use crate::pool::{JobHandle, WorkerPool};

/// Below this size, one single-threaded frame is cheaper than coordinating
/// multiple pool threads. Matches the reference implementation's threshold.
pub const SINGLE_THRESHOLD: u64 = 1024 * 1024;

/// Maps a pass-through `algo=value` key onto a real zstd advanced parameter,
/// mirroring the reference implementation's `**paramdict` forwarding into
/// `ZstdCompressionParameters.from_level`. Unrecognized keys are rejected here
/// so construction fails fast rather than silently ignoring a typo.
fn resolve_param(key: &str, value: i64) -> Result<CParameter> {
    Ok(match key {
        "enable_ldm" => CParameter::EnableLongDistanceMatching(value != 0),
        "window_log" => CParameter::WindowLog(value as u32),
        "hash_log" => CParameter::HashLog(value as u32),
        "chain_log" => CParameter::ChainLog(value as u32),
        "search_log" => CParameter::SearchLog(value as u32),
        "min_match" => CParameter::MinMatch(value as u32),
        "target_length" => CParameter::TargetLength(value as u32),
        "ldm_hash_log" => CParameter::LdmHashLog(value as u32),
        "ldm_min_match" => CParameter::LdmMinMatch(value as u32),
        "ldm_bucket_size_log" => CParameter::LdmBucketSizeLog(value as u32),
        "ldm_hash_rate_log" => CParameter::LdmHashRateLog(value as u32),
        _ => {
            return Err(ZipError::UnknownAlgoParam {
                algo: "zstd".to_string(),
                param: key.to_string(),
            })
        }
    })
}

pub struct ZstdCompressor {
    level: i32,
    threads: u32,
    extra_params: Arc<Vec<CParameter>>,
    single_scratch: Arc<FactoryFreelist<Vec<u8>>>,
    multi_scratch: Arc<FactoryFreelist<Vec<u8>>>,
}

impl ZstdCompressor {
    pub fn new(threads: usize, params: &str) -> Result<Self> {
        let mut parsed = parse_params(params)?;
        let level = parsed.remove("compresslevel").unwrap_or(10) as i32;
        let mut extra_params = Vec::with_capacity(parsed.len());
        for (key, value) in parsed {
            extra_params.push(resolve_param(&key, value)?);
        }
        Ok(ZstdCompressor {
            level,
            threads: threads.max(1) as u32,
            extra_params: Arc::new(extra_params),
            single_scratch: Arc::new(FactoryFreelist::new(Vec::new)),
            multi_scratch: Arc::new(FactoryFreelist::new(Vec::new)),
        })
    }
}

/// Encodes `data` as one complete zstd frame, reusing an output buffer drawn
/// from `scratch`. Checksum and content-size are kept on for interop with
/// decoders that expect them on zstd-method ZIP entries.
fn encode_frame(
    scratch: &FactoryFreelist<Vec<u8>>,
    level: i32,
    threads: u32,
    multithreaded: bool,
    extra_params: &[CParameter],
    data: &[u8],
) -> (Vec<u8>, u32) {
    let mut buf = scratch.enter();
    buf.clear();

    let mut encoder = zstd::Encoder::new(buf, level).expect("failed to construct zstd encoder");
    encoder
        .include_checksum(true)
        .expect("zstd checksum flag rejected");
    encoder
        .include_contentsize(true)
        .expect("zstd content-size flag rejected");
    if multithreaded {
        encoder
            .multithread(threads)
            .expect("zstd multithread setup rejected");
    }
    for param in extra_params {
        encoder
            .set_parameter(param.clone())
            .expect("zstd advanced parameter rejected");
    }
    encoder.write_all(data).expect("zstd compression failed");
    let buf = encoder.finish().expect("zstd finish failed");

    let result = buf.clone();
    let mut buf = buf;
    buf.clear();
    scratch.leave(buf);

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    (result, hasher.finalize())
}

impl Compressor for ZstdCompressor {
    fn method(&self) -> u16 {
        93
    }

    fn version_needed(&self) -> u16 {
        65
    }

    fn compress_to_jobs(
        &self,
        pool: &WorkerPool,
        size: u64,
        input: Arc<WrappedInput>,
    ) -> Vec<JobHandle<CompressedChunk>> {
        if size < SINGLE_THRESHOLD {
            let level = self.level;
            let scratch = Arc::clone(&self.single_scratch);
            let extra_params = Arc::clone(&self.extra_params);
            return vec![pool.submit(move || {
                let view = input.view().expect("input view materialization failed");
                let data = view.as_slice();
                let (bytes, crc) = encode_frame(&scratch, level, 1, false, &extra_params, data);
                (bytes, data.len() as u64, Some(crc))
            })];
        }

        let done = Arc::new((Mutex::new(false), Condvar::new()));
        let level = self.level;
        let threads = self.threads;
        let scratch = Arc::clone(&self.multi_scratch);
        let extra_params = Arc::clone(&self.extra_params);

        let done_for_real = Arc::clone(&done);
        let real_job = pool.submit(move || {
            let view = input.view().expect("input view materialization failed");
            let data = view.as_slice();
            let (bytes, crc) = encode_frame(&scratch, level, threads, true, &extra_params, data);

            let (lock, cvar) = &*done_for_real;
            let mut finished = lock.lock().expect("zstd condvar mutex poisoned");
            *finished = true;
            cvar.notify_all();

            (bytes, data.len() as u64, Some(crc))
        });

        let mut handles = vec![real_job];
        for _ in 1..self.threads {
            let done_for_spacer = Arc::clone(&done);
            handles.push(pool.submit(move || {
                let (lock, cvar) = &*done_for_spacer;
                let mut finished = lock.lock().expect("zstd condvar mutex poisoned");
                while !*finished {
                    finished = cvar.wait(finished).expect("zstd condvar wait poisoned");
                }
                (Vec::new(), 0u64, None)
            }));
        }
        handles
    }
}
