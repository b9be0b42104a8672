//! The `store` method: copies bytes through unchanged.

use std::sync::Arc;

use super::{CompressedChunk, Compressor};
use crate::input::WrappedInput;
use crate::pool::{JobHandle, WorkerPool};

pub struct StoreCompressor;

impl Compressor for StoreCompressor {
    fn method(&self) -> u16 {
        0
    }

    fn version_needed(&self) -> u16 {
        10
    }

    fn compress_to_jobs(
        &self,
        pool: &WorkerPool,
        _size: u64,
        input: Arc<WrappedInput>,
    ) -> Vec<JobHandle<CompressedChunk>> {
        vec![pool.submit(move || {
            let view = input.view().expect("input view materialization failed");
            let data = view.as_slice();
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(data);
            (data.to_vec(), data.len() as u64, Some(hasher.finalize()))
        })]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_round_trips_bytes_and_crc() {
        let pool = WorkerPool::new(2, 4);
        let input = Arc::new(WrappedInput::from_buffer(b"hello store".to_vec()));
        let jobs = StoreCompressor.compress_to_jobs(&pool, input.size(), input);
        assert_eq!(jobs.len(), 1);
        let (data, raw_len, crc) = jobs.into_iter().next().unwrap().join();
        assert_eq!(data, b"hello store");
        assert_eq!(raw_len, 11);
        let mut hasher = crc32fast::Hasher::new();
        hasher.update(b"hello store");
        assert_eq!(crc, Some(hasher.finalize()));
    }
}
