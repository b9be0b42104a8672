//! Command-line front-end: `-c`/`-e`/`-t` verbs over the parazip library,
//! argument parsing via `clap`'s derive API. Exit-code bits follow the
//! reference implementation's `__main__.py`: bit 0 (`1`) on CRC mismatch
//! during test/extract, bit 3 (`8`) when a create argument is a directory
//! (unsupported input, skipped rather than aborting the run).

use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use parazip::chooser::CompressionChooser;
use parazip::error::ZipError;
use parazip::reader::ZipReader;
use parazip::trace::Tracer;
use parazip::writer::{ParallelZipWriter, WriterConfig};

#[derive(Parser)]
#[command(name = "parazip", about = "Parallel ZIP archive writer with re-mux support")]
struct Args {
    /// Create an archive from the given files.
    #[arg(short = 'c', long = "create", conflicts_with_all = ["extract", "test"])]
    create: bool,

    /// Extract an archive's entries to --dest.
    #[arg(short = 'e', long = "extract", conflicts_with_all = ["create", "test"])]
    extract: bool,

    /// Verify every entry's CRC-32 without writing any files.
    #[arg(short = 't', long = "test", conflicts_with_all = ["create", "extract"])]
    test: bool,

    /// Compression algorithm, e.g. `store` or `deflate@compresslevel=9`.
    #[arg(long)]
    algo: Option<String>,

    /// Increase log verbosity; repeat for more (-v info, -vv debug).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output archive path (required for -c).
    #[arg(short = 'o', long = "output", value_name = "ZIP")]
    output: Option<PathBuf>,

    /// Extraction destination directory (required for -e).
    #[arg(short = 'd', long = "dest", value_name = "DIR")]
    dest: Option<PathBuf>,

    /// CPU-pool thread count.
    #[arg(long, value_name = "N")]
    threads: Option<usize>,

    /// IO-pool thread count.
    #[arg(long = "io-threads", value_name = "N")]
    io_threads: Option<usize>,

    /// Counting-semaphore cap on simultaneously open input files.
    #[arg(long = "file-budget", value_name = "N")]
    file_budget: Option<usize>,

    /// Overwrite the output archive if it already exists.
    #[arg(long)]
    force: bool,

    /// Append a JSON-lines pipeline event trace to this file.
    #[arg(long, value_name = "FILE")]
    trace: Option<PathBuf>,

    /// Files to archive (for -c; bare paths, or `+other.zip` to re-mux).
    /// Exactly one archive path for -e/-t.
    files: Vec<String>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        _ => log::LevelFilter::Debug,
    };
    env_logger::Builder::new().filter_level(level).init();

    let rc = if args.test {
        match args.files.as_slice() {
            [only] => verify(only),
            _ => {
                eprintln!("-t takes exactly one archive");
                return ExitCode::from(2);
            }
        }
    } else if args.extract {
        let dest = match &args.dest {
            Some(d) => d,
            None => {
                eprintln!("-e requires --dest");
                return ExitCode::from(2);
            }
        };
        match args.files.as_slice() {
            [only] => extract(only, dest),
            _ => {
                eprintln!("-e takes exactly one archive");
                return ExitCode::from(2);
            }
        }
    } else if args.create {
        let output = match &args.output {
            Some(o) => o,
            None => {
                eprintln!("-c requires --output");
                return ExitCode::from(2);
            }
        };
        compress(output, &args)
    } else {
        eprintln!("one of -c, -e, -t is required");
        return ExitCode::from(2);
    };

    ExitCode::from(rc)
}

/// Reconstructs a decompressor for an on-wire method, mirroring the
/// reference implementation's `compressor_from_method`: only `store` and
/// `deflate` are supported for reading back, since those are the methods
/// this tool itself ever reads in its own archives for verification.
fn decompress_entry(method: u16, data: &[u8]) -> Result<Vec<u8>, ZipError> {
    match method {
        0 => Ok(data.to_vec()),
        8 => {
            use std::io::Read;
            let mut decoder = flate2::read::DeflateDecoder::new(data);
            let mut out = Vec::new();
            decoder
                .read_to_end(&mut out)
                .map_err(|e| ZipError::CompressFailure(e.to_string()))?;
            Ok(out)
        }
        93 => zstd::stream::decode_all(data).map_err(|e| ZipError::CompressFailure(e.to_string())),
        other => Err(ZipError::UnknownAlgo(format!("method {}", other))),
    }
}

fn verify(filename: &str) -> u8 {
    let mut reader = match ZipReader::open(filename) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}: {}", filename, e);
            return 1;
        }
    };

    let mut rc = 0u8;
    loop {
        let entry = match reader.next_entry() {
            Ok(Some(e)) => e,
            Ok(None) => break,
            Err(e) => {
                eprintln!("{}: {}", filename, e);
                rc |= 1;
                break;
            }
        };

        match decompress_entry(entry.lfh.method, &entry.compressed_bytes) {
            Ok(decompressed) => {
                let crc = crc32fast::hash(&decompressed);
                if crc != entry.lfh.crc32 {
                    println!(
                        "  {}: {:08x} != {:08x} ({})",
                        entry.lfh.filename,
                        crc,
                        entry.lfh.crc32,
                        entry.compressed_bytes.len()
                    );
                    rc |= 1;
                } else {
                    println!("  {}: ok", entry.lfh.filename);
                }
            }
            Err(e) => {
                println!("  {}: decompress failed: {}", entry.lfh.filename, e);
                rc |= 1;
            }
        }
    }
    rc
}

fn extract(filename: &str, dest: &Path) -> u8 {
    let mut reader = match ZipReader::open(filename) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("{}: {}", filename, e);
            return 1;
        }
    };

    let mut rc = 0u8;
    loop {
        let entry = match reader.next_entry() {
            Ok(Some(e)) => e,
            Ok(None) => break,
            Err(e) => {
                eprintln!("{}: {}", filename, e);
                rc |= 1;
                break;
            }
        };

        let decompressed = match decompress_entry(entry.lfh.method, &entry.compressed_bytes) {
            Ok(d) => d,
            Err(e) => {
                println!("  {}: decompress failed: {}", entry.lfh.filename, e);
                rc |= 1;
                continue;
            }
        };

        let crc = crc32fast::hash(&decompressed);
        if crc != entry.lfh.crc32 {
            println!(
                "  {}: {:08x} != {:08x} ({})",
                entry.lfh.filename,
                crc,
                entry.lfh.crc32,
                entry.compressed_bytes.len()
            );
            rc |= 1;
        }

        let out_path = dest.join(&entry.lfh.filename);
        if entry.lfh.filename.ends_with('/') {
            if let Err(e) = fs::create_dir_all(&out_path) {
                log::error!("creating {}: {}", out_path.display(), e);
                rc |= 1;
            }
            continue;
        }
        if let Some(parent) = out_path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                log::error!("creating {}: {}", parent.display(), e);
                rc |= 1;
                continue;
            }
        }
        if let Err(e) = fs::write(&out_path, &decompressed) {
            log::error!("writing {}: {}", out_path.display(), e);
            rc |= 1;
        }
    }
    rc
}

fn compress(output: &Path, args: &Args) -> u8 {
    if args.force {
        let _ = fs::remove_file(output);
    }

    let mut config = WriterConfig::default();
    if let Some(n) = args.threads {
        config.cpu_threads = n;
    }
    if let Some(n) = args.io_threads {
        config.io_threads = n;
    }
    if let Some(n) = args.file_budget {
        config.fd_budget = n;
    }
    if let Some(algo) = &args.algo {
        config.chooser = match CompressionChooser::new(algo.clone(), Vec::new()) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("invalid --algo {}: {}", algo, e);
                return 2;
            }
        };
    }
    if let Some(trace_path) = &args.trace {
        match Tracer::create(trace_path) {
            Ok(t) => config.tracer = Some(std::sync::Arc::new(t)),
            Err(e) => {
                eprintln!("opening --trace {}: {}", trace_path.display(), e);
                return 2;
            }
        }
    }

    let writer = match ParallelZipWriter::create(output, config) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("{}: {}", output.display(), e);
            return 2;
        }
    };

    let mut rc = 0u8;
    for m in &args.files {
        if let Some(source_path) = m.strip_prefix('+') {
            match ZipReader::open(source_path) {
                Ok(mut source) => loop {
                    match source.next_entry() {
                        Ok(Some(entry)) => {
                            if let Err(e) =
                                writer.enqueue_precompressed(entry.lfh, entry.compressed_bytes)
                            {
                                log::warn!("skipping remux entry from {}: {}", source_path, e);
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            log::warn!("skipping {} (hopefully) because of {}", m, e);
                            break;
                        }
                    }
                },
                Err(e) => log::warn!("skipping {} (hopefully) because of {}", m, e),
            }
            continue;
        }

        let path = Path::new(m);
        if path.is_dir() {
            rc |= 8;
            continue;
        }
        if let Err(e) = writer.write(path, None) {
            log::warn!("skipping {} (hopefully) because of {}", m, e);
        }
    }

    if let Err(e) = writer.close() {
        eprintln!("{}: {}", output.display(), e);
        rc |= 1;
    }
    rc
}
