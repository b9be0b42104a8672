use std::io::{Cursor, Seek, Write};
use tempfile::tempdir;

use parazip::reader::ZipReader;
use parazip::types::{CentralDirectoryEntry, LocalFileHeader};
use parazip::writer::{ParallelZipWriter, WriterConfig};

// Crafts a minimal archive with one entry whose local file header carries a
// ZIP64 extra field (promoted because `usize` is reported at or above the
// 32-bit threshold even though the actual bytes on disk are tiny), then
// confirms the sequential reader follows `csize`, not the inflated
// `usize`, when deciding how many bytes to read.
#[test]
fn reader_honors_zip64_extra_in_local_file_header() {
    let mut lfh = LocalFileHeader::new_provisional("a.txt", 0x1_0000_0005, 0, 0);
    let data = b"hello";
    lfh.csize = data.len() as u64;
    lfh.crc32 = crc32fast::hash(data);

    let mut buf = Cursor::new(Vec::new());
    let offset = buf.stream_position().unwrap();
    buf.write_all(&lfh.encode()).unwrap();
    buf.write_all(data).unwrap();

    let cd_entries = vec![CentralDirectoryEntry {
        lfh: lfh.clone(),
        local_header_offset: offset,
    }];
    parazip::types::write_directory_and_eocd(&mut buf, &cd_entries, None, false).unwrap();

    let mut reader = ZipReader::from_reader(Cursor::new(buf.into_inner()));
    let entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.lfh.filename, "a.txt");
    assert_eq!(entry.lfh.usize, 0x1_0000_0005);
    assert_eq!(entry.compressed_bytes, data);
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn writer_forced_zip64_round_trips_through_reader() {
    let dir = tempdir().unwrap();
    let src = dir.path().join("small.txt");
    std::fs::write(&src, b"not actually huge").unwrap();
    let zip_path = dir.path().join("forced64.zip");

    let mut config = WriterConfig::default();
    config.force_zip64 = true;
    let writer = ParallelZipWriter::create(&zip_path, config).unwrap();
    writer.write(&src, Some("small.txt")).unwrap();
    writer.close().unwrap();

    let bytes = std::fs::read(&zip_path).unwrap();
    assert!(bytes
        .windows(4)
        .any(|w| w == parazip::types::ZIP64_EOCD_SIGNATURE.to_le_bytes()));
    assert!(bytes
        .windows(4)
        .any(|w| w == parazip::types::ZIP64_EOCD_LOCATOR_SIGNATURE.to_le_bytes()));

    let mut reader = ZipReader::open(&zip_path).unwrap();
    let entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.lfh.filename, "small.txt");
    assert_eq!(entry.compressed_bytes.is_empty(), false);
}
