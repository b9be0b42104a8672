//! The write pipeline (C6): a two-stage producer / compressor / serializer
//! pipeline backed by an I/O pool and a CPU pool, a file-descriptor budget,
//! and a single-threaded serializer that gives the output stream a total
//! order. Grounded on `WZip` in the reference implementation's `write.py`,
//! restructured per the distilled design into the open-stage / compress-
//! stage split described in §4.5: opening, stat'ing, and mmapping a file is
//! itself submitted to a pool (`io_pool`) instead of running inline on the
//! caller's thread, so a slow filesystem can't stall the caller while the
//! CPU pool sits idle.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::SystemTime;

use crossbeam_channel::{bounded, Receiver, Sender};

use crate::algo::{build_compressor, CompressedChunk, Compressor};
use crate::chooser::{default_chooser, CompressionChooser};
use crate::error::{Result, ZipError};
use crate::input::WrappedInput;
use crate::pool::{JobHandle, Permit, Semaphore, WorkerPool};
use crate::trace::Tracer;
use crate::types::{CentralDirectoryEntry, LocalFileHeader};

/// Tunables assembled either by the CLI from flags or directly by a library
/// caller embedding the writer without a process boundary.
pub struct WriterConfig {
    pub cpu_threads: usize,
    pub io_threads: usize,
    pub fd_budget: usize,
    pub chooser: CompressionChooser,
    pub force_zip64: bool,
    pub comment: Option<String>,
    pub tracer: Option<Arc<Tracer>>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            cpu_threads: num_cpus::get(),
            io_threads: 4,
            fd_budget: 200,
            chooser: default_chooser().expect("default chooser is always valid"),
            force_zip64: false,
            comment: None,
            tracer: None,
        }
    }
}

/// The in-flight work record queued between the open-consumer and the
/// serializer: a partial LFH, its ordered compressed-chunk job handles, and
/// a guard that releases the input's mmap/fd and `fd_budget` permit once
/// dropped.
struct QueueItem {
    lfh: LocalFileHeader,
    jobs: Vec<JobHandle<CompressedChunk>>,
    release: ReleaseGuard,
}

/// Holds the input alive (and the fd_budget permit acquired for it) until
/// dropped. The serializer hands this to the I/O pool after writing an
/// entry so neither it nor cpu_pool workers block on closing a large mmap.
struct ReleaseGuard {
    input: Option<Arc<WrappedInput>>,
    permit: Option<Permit>,
}

impl ReleaseGuard {
    fn new(input: Arc<WrappedInput>, permit: Permit) -> Self {
        ReleaseGuard {
            input: Some(input),
            permit: Some(permit),
        }
    }

    fn precompressed(permit: Permit) -> Self {
        ReleaseGuard {
            input: None,
            permit: Some(permit),
        }
    }
}

type OpenResult =
    std::result::Result<(LocalFileHeader, Arc<WrappedInput>, Permit), (String, ZipError)>;

enum OpenMsg {
    Job(JobHandle<OpenResult>),
    Precompressed(QueueItem),
    Shutdown,
}

enum CompressMsg {
    Item(QueueItem),
    Shutdown,
}

struct Shared {
    cpu_pool: WorkerPool,
    io_pool: WorkerPool,
    chooser: CompressionChooser,
    cache: Mutex<HashMap<String, Arc<dyn Compressor>>>,
    fd_semaphore: Semaphore,
    tracer: Option<Arc<Tracer>>,
}

impl Shared {
    fn compressor_for(&self, key: &str) -> Result<Arc<dyn Compressor>> {
        let mut cache = self.cache.lock().expect("compressor cache mutex poisoned");
        if let Some(existing) = cache.get(key) {
            return Ok(Arc::clone(existing));
        }
        log::debug!("populating compressor cache for {}", key);
        let built: Arc<dyn Compressor> = Arc::from(build_compressor(key, self.cpu_pool_threads())?);
        cache.insert(key.to_string(), Arc::clone(&built));
        Ok(built)
    }

    fn cpu_pool_threads(&self) -> usize {
        // The pool itself doesn't expose its thread count; zstd's large-file
        // path only needs a reasonable upper bound for spacer-slot sizing,
        // so core count is used directly rather than threading it through.
        num_cpus::get()
    }
}

/// A ZIP archive writer that compresses entries in parallel while keeping
/// the output stream's byte order equal to submission order. See module
/// docs and §4.5 of the design for the pipeline shape.
pub struct ParallelZipWriter {
    shared: Arc<Shared>,
    open_tx: Sender<OpenMsg>,
    open_thread: Option<JoinHandle<()>>,
    serializer_thread: Option<JoinHandle<Result<()>>>,
}

impl ParallelZipWriter {
    /// Creates a new archive at `path`. Fails if the path already exists
    /// unless `force` was set in a way the caller already handled (the CLI
    /// unlinks first per §9's open question decision; this constructor
    /// itself never overwrites).
    pub fn create(path: impl AsRef<Path>, config: WriterConfig) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path.as_ref())?;
        Self::with_output(file, config)
    }

    /// Builds a writer over an already-open output stream (e.g. a file
    /// opened after unlinking for `--force`, or a caller-owned handle).
    pub fn with_output(output: File, config: WriterConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            cpu_pool: WorkerPool::new(config.cpu_threads, config.cpu_threads.max(1) * 2),
            io_pool: WorkerPool::new(config.io_threads, config.io_threads.max(1) * 4),
            chooser: config.chooser,
            cache: Mutex::new(HashMap::new()),
            fd_semaphore: Semaphore::new(config.fd_budget),
            tracer: config.tracer,
        });

        let (open_tx, open_rx) = bounded::<OpenMsg>(shared.io_pool_capacity_hint());
        let (compress_tx, compress_rx) = bounded::<CompressMsg>(shared.cpu_pool_capacity_hint());

        let open_shared = Arc::clone(&shared);
        let open_thread = std::thread::spawn(move || {
            open_consumer(open_shared, open_rx, compress_tx);
        });

        let serializer_shared = Arc::clone(&shared);
        let force_zip64 = config.force_zip64;
        let comment = config.comment;
        let serializer_thread = std::thread::spawn(move || {
            serializer(serializer_shared, compress_rx, output, force_zip64, comment)
        });

        Ok(ParallelZipWriter {
            shared,
            open_tx,
            open_thread: Some(open_thread),
            serializer_thread: Some(serializer_thread),
        })
    }

    /// Submits `local_path` for compression and writing, archived under
    /// `archive_path` (or `local_path` itself if `None`). Returns once the
    /// open stage has been handed to the I/O pool; it does not wait for the
    /// entry to finish compressing or writing.
    pub fn write(&self, local_path: &Path, archive_path: Option<&str>) -> Result<()> {
        let archive_name = archive_path
            .map(|s| s.to_string())
            .unwrap_or_else(|| normalize_archive_path(local_path));

        let permit = self.shared.fd_semaphore.acquire();
        let local_path = local_path.to_path_buf();
        if let Some(t) = &self.shared.tracer {
            t.record("open_submitted", &archive_name);
        }

        let handle = self.shared.io_pool.submit(move || -> OpenResult {
            open_stage(&local_path, &archive_name, permit)
        });

        self.open_tx
            .send(OpenMsg::Job(handle))
            .map_err(|_| ZipError::InvalidFormat("writer already closed".into()))?;
        Ok(())
    }

    /// Bypasses the open/compress stages entirely: enqueues a ready-made
    /// entry whose bytes are already compressed (the re-mux path). Flows
    /// through the same queue as `write()` to preserve submission order and
    /// share backpressure.
    pub fn enqueue_precompressed(&self, lfh: LocalFileHeader, compressed_bytes: Vec<u8>) -> Result<()> {
        let permit = self.shared.fd_semaphore.acquire();
        if let Some(t) = &self.shared.tracer {
            t.record("remux_enqueued", &lfh.filename);
        }
        let raw_len = compressed_bytes.len() as u64;
        let job = JobHandle::ready((compressed_bytes, raw_len, None));
        let item = QueueItem {
            lfh,
            jobs: vec![job],
            release: ReleaseGuard::precompressed(permit),
        };
        self.open_tx
            .send(OpenMsg::Precompressed(item))
            .map_err(|_| ZipError::InvalidFormat("writer already closed".into()))?;
        Ok(())
    }

    /// Shuts the pipeline down: signals both consumer threads, waits for
    /// all outstanding work, writes the central directory and EOCD(s), and
    /// surfaces the first captured failure, if any.
    pub fn close(mut self) -> Result<()> {
        let _ = self.open_tx.send(OpenMsg::Shutdown);
        if let Some(t) = self.open_thread.take() {
            let _ = t.join();
        }
        match self.serializer_thread.take() {
            Some(t) => t.join().unwrap_or_else(|_| {
                Err(ZipError::InvalidFormat("serializer thread panicked".into()))
            }),
            None => Ok(()),
        }
    }
}

impl Shared {
    fn io_pool_capacity_hint(&self) -> usize {
        64
    }
    fn cpu_pool_capacity_hint(&self) -> usize {
        64
    }
}

fn normalize_archive_path(local_path: &Path) -> String {
    local_path
        .components()
        .filter_map(|c| match c {
            std::path::Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

const MMAP_THRESHOLD: u64 = 32 * 1024;

fn open_stage(local_path: &Path, archive_name: &str, permit: Permit) -> OpenResult {
    let result = (|| -> Result<(LocalFileHeader, Arc<WrappedInput>)> {
        let file = File::open(local_path)?;
        let metadata = file.metadata()?;
        let mtime = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let (dos_date, dos_time) = dos_date_time(mtime);
        let size = metadata.len();

        let input = if size == 0 {
            WrappedInput::from_buffer(Vec::new())
        } else if size <= MMAP_THRESHOLD {
            let mut buf = Vec::with_capacity(size as usize);
            let mut file = file;
            std::io::Read::read_to_end(&mut file, &mut buf)?;
            WrappedInput::from_buffer(buf)
        } else {
            WrappedInput::from_file(file)?
        };

        let lfh = LocalFileHeader::new_provisional(archive_name, size, dos_time, dos_date);
        Ok((lfh, Arc::new(input)))
    })();

    match result {
        Ok((lfh, input)) => Ok((lfh, input, permit)),
        // `permit` drops here, releasing its fd_budget slot immediately.
        Err(e) => Err((archive_name.to_string(), e)),
    }
}

fn open_consumer(shared: Arc<Shared>, open_rx: Receiver<OpenMsg>, compress_tx: Sender<CompressMsg>) {
    loop {
        match open_rx.recv() {
            Ok(OpenMsg::Job(handle)) => {
                let result = handle.join();
                match result {
                    Ok((mut lfh, input, permit)) => {
                        let algo_key = shared.chooser.choose(&lfh).to_string();
                        let compressor = match shared.compressor_for(&algo_key) {
                            Ok(c) => c,
                            Err(e) => {
                                log::warn!("skipping {}: {}", lfh.filename, e);
                                continue;
                            }
                        };
                        lfh.method = compressor.method();
                        lfh.version_needed = lfh.version_needed.max(compressor.version_needed());
                        if let Some(t) = &shared.tracer {
                            t.record("chooser_resolved", &lfh.filename);
                        }

                        let jobs = compressor.compress_to_jobs(&shared.cpu_pool, lfh.usize, Arc::clone(&input));
                        if let Some(t) = &shared.tracer {
                            t.record("compress_submitted", &lfh.filename);
                        }

                        let release = ReleaseGuard::new(input, permit);
                        let item = QueueItem { lfh, jobs, release };
                        if compress_tx.send(CompressMsg::Item(item)).is_err() {
                            return;
                        }
                    }
                    Err((path, e)) => {
                        log::warn!("skipping {}: {}", path, e);
                    }
                }
            }
            Ok(OpenMsg::Precompressed(item)) => {
                if compress_tx.send(CompressMsg::Item(item)).is_err() {
                    return;
                }
            }
            Ok(OpenMsg::Shutdown) | Err(_) => {
                let _ = compress_tx.send(CompressMsg::Shutdown);
                return;
            }
        }
    }
}

fn serializer(
    shared: Arc<Shared>,
    compress_rx: Receiver<CompressMsg>,
    output: File,
    force_zip64: bool,
    comment: Option<String>,
) -> Result<()> {
    let mut out = BufWriter::new(output);
    let mut directory: Vec<CentralDirectoryEntry> = Vec::new();
    let mut first_error: Option<ZipError> = None;

    loop {
        match compress_rx.recv() {
            Ok(CompressMsg::Item(item)) => {
                if first_error.is_some() {
                    // Drain without writing once a fatal error has been
                    // captured, so shutdown still terminates cleanly.
                    for job in item.jobs {
                        let _ = job.join();
                    }
                    drop(item.release);
                    continue;
                }
                match serialize_item(&mut out, &mut directory, item) {
                    Ok(()) => {}
                    Err(e) => first_error = Some(e),
                }
            }
            Ok(CompressMsg::Shutdown) | Err(_) => break,
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    crate::types::write_directory_and_eocd(&mut out, &directory, comment.as_deref(), force_zip64)?;
    out.flush()?;
    if let Some(t) = &shared.tracer {
        t.record("shutdown", "writer");
    }
    Ok(())
}

fn serialize_item(
    out: &mut BufWriter<File>,
    directory: &mut Vec<CentralDirectoryEntry>,
    item: QueueItem,
) -> Result<()> {
    let QueueItem { mut lfh, jobs, release } = item;
    let filename = lfh.filename.clone();

    if jobs.len() == 1 {
        let (bytes, _raw_len, crc) = jobs.into_iter().next().unwrap().join();
        lfh.csize = bytes.len() as u64;
        if let Some(crc) = crc {
            lfh.crc32 = crc;
        }
        let file_pos = out.stream_position()?;
        out.write_all(&lfh.encode())?;
        out.write_all(&bytes)?;
        directory.push(CentralDirectoryEntry {
            lfh,
            local_header_offset: file_pos,
        });
    } else {
        let file_pos = out.stream_position()?;
        let provisional_encoded = lfh.encode();
        out.write_all(&provisional_encoded)?;

        let mut running_crc: Option<u32> = None;
        let mut running_size = 0u64;
        for job in jobs {
            let (bytes, raw_len, crc) = job.join();
            if !bytes.is_empty() {
                out.write_all(&bytes)?;
                running_size += bytes.len() as u64;
            }
            if let Some(crc) = crc {
                running_crc = Some(match running_crc {
                    Some(prev) => crate::crc32_combine::combine(prev, crc, raw_len),
                    None => crc,
                });
            }
        }

        lfh.csize = running_size;
        if let Some(crc) = running_crc {
            lfh.crc32 = crc;
        }
        let final_encoded = lfh.encode();
        if final_encoded.len() != provisional_encoded.len() {
            return Err(ZipError::ZipSizeInvariantViolated { entry: filename });
        }
        let after = out.stream_position()?;
        out.seek(SeekFrom::Start(file_pos))?;
        out.write_all(&final_encoded)?;
        out.seek(SeekFrom::Start(after))?;

        directory.push(CentralDirectoryEntry {
            lfh,
            local_header_offset: file_pos,
        });
    }

    log::info!(
        "wrote {} ratio={:.1}%",
        filename,
        ratio_percent(directory.last().unwrap().lfh.csize, directory.last().unwrap().lfh.usize)
    );
    drop(release);
    Ok(())
}

fn ratio_percent(csize: u64, usize: u64) -> f64 {
    if usize == 0 {
        100.0
    } else {
        csize as f64 / usize as f64 * 100.0
    }
}

/// Converts a [`SystemTime`] to DOS `(date, time)` fields, UTC-based like
/// the reference implementation's `time.localtime()`-free pure encoding.
/// Dates before 1980 or after 2107 are clamped to the epoch DOS value.
fn dos_date_time(t: SystemTime) -> (u16, u16) {
    let secs = t
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0);

    let days = secs.div_euclid(86_400);
    let time_of_day = secs.rem_euclid(86_400);

    let (year, month, day) = civil_from_days(days);
    let hour = time_of_day / 3600;
    let minute = (time_of_day % 3600) / 60;
    let second = time_of_day % 60;

    if !(1980..=2107).contains(&year) {
        return (0, 0);
    }

    let dos_date = (((year - 1980) as u16) << 9) | ((month as u16) << 5) | (day as u16);
    let dos_time = ((hour as u16) << 11) | ((minute as u16) << 5) | ((second / 2) as u16);
    (dos_date, dos_time)
}

/// Howard Hinnant's days-since-epoch to civil-date algorithm (proleptic
/// Gregorian, public domain). Used instead of pulling in a chrono-style
/// dependency for a single conversion.
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    let y = if m <= 2 { y + 1 } else { y };
    (y, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ZipReader;
    use std::io::Read;
    use std::io::Write as _;

    fn read_whole(path: &Path, name: &str, method_expect: Option<u16>) -> Vec<u8> {
        let mut reader = ZipReader::open(path).unwrap();
        let mut found = None;
        while let Some(entry) = reader.next_entry().unwrap() {
            if entry.lfh.filename == name {
                found = Some(entry);
            }
        }
        let entry = found.expect("entry not found");
        if let Some(m) = method_expect {
            assert_eq!(entry.lfh.method, m);
        }
        match entry.lfh.method {
            0 => entry.compressed_bytes,
            8 => {
                let mut decoder = flate2::read::DeflateDecoder::new(&entry.compressed_bytes[..]);
                let mut out = Vec::new();
                decoder.read_to_end(&mut out).unwrap();
                out
            }
            93 => zstd::stream::decode_all(&entry.compressed_bytes[..]).unwrap(),
            other => panic!("unexpected method {}", other),
        }
    }

    #[test]
    fn writes_single_small_entry_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("hello.txt");
        std::fs::write(&src, b"hello world").unwrap();
        let out_path = dir.path().join("out.zip");

        let writer = ParallelZipWriter::create(&out_path, WriterConfig::default()).unwrap();
        writer.write(&src, Some("hello.txt")).unwrap();
        writer.close().unwrap();

        let data = read_whole(&out_path, "hello.txt", None);
        assert_eq!(data, b"hello world");
    }

    #[test]
    fn writes_many_entries_preserving_submission_order() {
        let dir = tempfile::tempdir().unwrap();
        let out_path = dir.path().join("many.zip");
        let mut config = WriterConfig::default();
        config.cpu_threads = 4;
        config.io_threads = 2;
        let writer = ParallelZipWriter::create(&out_path, config).unwrap();

        let mut paths = Vec::new();
        for i in 0..20 {
            let p = dir.path().join(format!("{}.txt", i));
            std::fs::write(&p, format!("{}\n", i)).unwrap();
            paths.push(p);
        }
        for (i, p) in paths.iter().enumerate() {
            writer.write(p, Some(&format!("{}.txt", i))).unwrap();
        }
        writer.close().unwrap();

        let mut reader = ZipReader::open(&out_path).unwrap();
        let mut names = Vec::new();
        while let Some(entry) = reader.next_entry().unwrap() {
            names.push(entry.lfh.filename.clone());
        }
        let expected: Vec<String> = (0..20).map(|i| format!("{}.txt", i)).collect();
        assert_eq!(names, expected);
    }

    #[test]
    fn large_entry_splits_into_multiple_deflate_blocks_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("big.bin");
        let payload = vec![0x7Au8; (crate::algo::deflate::BLOCK_SIZE * 2 + 777) as usize];
        std::fs::write(&src, &payload).unwrap();
        let out_path = dir.path().join("big.zip");

        let writer = ParallelZipWriter::create(&out_path, WriterConfig::default()).unwrap();
        writer.write(&src, Some("big.bin")).unwrap();
        writer.close().unwrap();

        let data = read_whole(&out_path, "big.bin", Some(8));
        assert_eq!(data, payload);
    }

    #[test]
    fn force_zip64_emits_zip64_records_even_for_small_archive() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("tiny.txt");
        std::fs::write(&src, b"x").unwrap();
        let out_path = dir.path().join("forced.zip");

        let mut config = WriterConfig::default();
        config.force_zip64 = true;
        let writer = ParallelZipWriter::create(&out_path, config).unwrap();
        writer.write(&src, Some("tiny.txt")).unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&out_path).unwrap();
        assert!(bytes
            .windows(4)
            .any(|w| w == crate::types::ZIP64_EOCD_SIGNATURE.to_le_bytes()));
    }

    #[test]
    fn remux_preserves_precompressed_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let src_zip_path = dir.path().join("src.zip");
        {
            let writer = ParallelZipWriter::create(&src_zip_path, WriterConfig::default()).unwrap();
            writer.write_buffer_for_test("path1", b"Data1").unwrap();
            writer.close().unwrap();
        }

        let out_path = dir.path().join("merged.zip");
        let writer = ParallelZipWriter::create(&out_path, WriterConfig::default()).unwrap();

        let mut reader = ZipReader::open(&src_zip_path).unwrap();
        while let Some(entry) = reader.next_entry().unwrap() {
            writer
                .enqueue_precompressed(entry.lfh.clone(), entry.compressed_bytes.clone())
                .unwrap();
        }
        writer.close().unwrap();

        let data = read_whole(&out_path, "path1", None);
        assert_eq!(data, b"Data1");
    }

    impl ParallelZipWriter {
        /// Test-only helper: writes an in-memory buffer as an entry without
        /// needing a file on disk, going through the same open/compress
        /// path as a re-mux source producer would in `write_buffer`.
        fn write_buffer_for_test(&self, name: &str, data: &[u8]) -> Result<()> {
            let permit = self.shared.fd_semaphore.acquire();
            let input = Arc::new(WrappedInput::from_buffer(data.to_vec()));
            let lfh = LocalFileHeader::new_provisional(name, data.len() as u64, 0, 0);
            let handle = JobHandle::ready(Ok((lfh, input, permit)));
            self.open_tx
                .send(OpenMsg::Job(handle))
                .map_err(|_| ZipError::InvalidFormat("writer already closed".into()))?;
            Ok(())
        }
    }
}
