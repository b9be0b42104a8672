use std::io::Read;
use tempfile::tempdir;

use parazip::chooser::CompressionChooser;
use parazip::reader::ZipReader;
use parazip::writer::{ParallelZipWriter, WriterConfig};

fn zstd_config() -> WriterConfig {
    let mut config = WriterConfig::default();
    config.chooser = CompressionChooser::new("zstd@compresslevel=3", Vec::new()).unwrap();
    config
}

fn decompress(data: &[u8]) -> Vec<u8> {
    zstd::stream::decode_all(data).unwrap()
}

#[test]
fn zstd_roundtrip_multiple_entries() {
    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("zstd_test.zip");

    let small_src = dir.path().join("test1.txt");
    std::fs::write(&small_src, b"Hello from Zstd compression!").unwrap();
    let big_src = dir.path().join("test2.bin");
    std::fs::write(&big_src, vec![42u8; 10_000]).unwrap();

    {
        let writer = ParallelZipWriter::create(&zip_path, zstd_config()).unwrap();
        writer.write(&small_src, Some("test1.txt")).unwrap();
        writer.write(&big_src, Some("test2.bin")).unwrap();
        writer.close().unwrap();
    }

    let mut reader = ZipReader::open(&zip_path).unwrap();
    let first = reader.next_entry().unwrap().unwrap();
    assert_eq!(first.lfh.filename, "test1.txt");
    assert_eq!(first.lfh.method, 93);
    assert_eq!(decompress(&first.compressed_bytes), b"Hello from Zstd compression!");

    let second = reader.next_entry().unwrap().unwrap();
    assert_eq!(second.lfh.filename, "test2.bin");
    assert_eq!(second.lfh.method, 93);
    let data2 = decompress(&second.compressed_bytes);
    assert_eq!(data2.len(), 10_000);
    assert!(data2.iter().all(|&b| b == 42));

    // Highly repetitive input should compress to well under half its size.
    assert!((second.compressed_bytes.len() as u64) < second.lfh.usize / 2);

    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn zstd_large_input_crosses_multithreaded_threshold_and_round_trips() {
    let dir = tempdir().unwrap();
    let zip_path = dir.path().join("zstd_stream.zip");
    let src = dir.path().join("large.bin");
    std::fs::write(&src, vec![0x55u8; 2 * 1024 * 1024]).unwrap();

    let mut config = zstd_config();
    config.cpu_threads = 4;
    let writer = ParallelZipWriter::create(&zip_path, config).unwrap();
    writer.write(&src, Some("large.bin")).unwrap();
    writer.close().unwrap();

    let mut reader = ZipReader::open(&zip_path).unwrap();
    let entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.lfh.filename, "large.bin");

    let mut decoder = zstd::stream::read::Decoder::new(&entry.compressed_bytes[..]).unwrap();
    let mut buffer = Vec::new();
    decoder.read_to_end(&mut buffer).unwrap();

    assert_eq!(buffer.len(), 2 * 1024 * 1024);
    assert!(buffer.iter().all(|&b| b == 0x55));
}
