//! Bounded worker pool with typed completion handles.
//!
//! Stands in for the futures returned by `compress_to_futures` in the
//! reference design: jobs are submitted as closures, and the caller gets back
//! a `JobHandle<T>` it can block on later, preserving the "ordered pipeline
//! of tasks with completion handles" shape without pulling in an async
//! runtime. The pool itself is a thin wrapper over `rayon::ThreadPool` plus a
//! `crossbeam_channel` slot semaphore, the same combination used to model
//! bounded job submission elsewhere in this codebase's lineage.

use std::sync::Arc;

use crossbeam_channel::{bounded, Receiver, Sender};
use rayon::ThreadPool as RayonPool;

/// A handle to a single in-flight or completed job. Call `join()` to block
/// for the result; handles must be joined in the order the contract requires
/// (compressors return their job handles in chunk order).
pub struct JobHandle<T> {
    rx: Receiver<T>,
}

impl<T> JobHandle<T> {
    /// Blocks until the job completes and returns its result.
    ///
    /// Panics if the worker thread panicked without sending a result; this
    /// indicates a bug in a compressor job, not a recoverable condition.
    pub fn join(self) -> T {
        self.rx.recv().expect("worker thread dropped its result sender")
    }

    /// Wraps an already-available value as a completed handle, used by the
    /// re-mux path to inject precompressed bytes without touching the pool.
    pub fn ready(value: T) -> Self
    where
        T: Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let _ = tx.send(value);
        JobHandle { rx }
    }
}

/// A bounded pool of worker threads. Submission blocks once `capacity` jobs
/// are in flight, providing the pipeline's backpressure.
pub struct WorkerPool {
    pool: Arc<RayonPool>,
    slot_tx: Sender<()>,
    slot_rx: Receiver<()>,
}

impl WorkerPool {
    pub fn new(num_threads: usize, capacity: usize) -> Self {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(num_threads.max(1))
            .build()
            .expect("failed to build worker pool");
        let capacity = capacity.max(1);
        let (slot_tx, slot_rx) = bounded(capacity);
        for _ in 0..capacity {
            slot_tx.send(()).expect("freshly created channel cannot be full");
        }
        WorkerPool {
            pool: Arc::new(pool),
            slot_tx,
            slot_rx,
        }
    }

    /// Submits `job` and returns a handle for its result. Blocks if the pool
    /// is already at capacity.
    pub fn submit<T, F>(&self, job: F) -> JobHandle<T>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.slot_rx.recv().expect("worker pool slot channel closed");
        let (tx, rx) = bounded(1);
        let slot_tx = self.slot_tx.clone();
        self.pool.spawn(move || {
            let result = job();
            let _ = tx.send(result);
            let _ = slot_tx.send(());
        });
        JobHandle { rx }
    }
}

/// A counting semaphore built from the same slot-channel idea as
/// [`WorkerPool`]'s capacity limiter, pulled out standalone for the
/// writer's file-descriptor budget (`fd_budget` in the pipeline design).
pub struct Semaphore {
    tx: Sender<()>,
    rx: Receiver<()>,
}

/// An acquired permit. Releases back to the semaphore when dropped, so a
/// permit can be held across thread boundaries (e.g. handed to an I/O pool
/// job that releases it once an entry's resources are closed).
pub struct Permit {
    tx: Sender<()>,
}

impl Drop for Permit {
    fn drop(&mut self) {
        let _ = self.tx.send(());
    }
}

impl Semaphore {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = bounded(capacity);
        for _ in 0..capacity {
            tx.send(()).expect("freshly created channel cannot be full");
        }
        Semaphore { tx, rx }
    }

    /// Blocks until a permit is available.
    pub fn acquire(&self) -> Permit {
        self.rx.recv().expect("semaphore channel closed");
        Permit { tx: self.tx.clone() }
    }
}
