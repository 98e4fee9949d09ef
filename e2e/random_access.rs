//! E2E: random access through the footer directory, over compressed,
//! multi-packet, differential streams.

use tempfile::TempDir;

use bcsv::{
    Column, ColumnType, FileCodecId, Layout, Reader, RowCodecId, Writer, WriterOptions,
};

fn sample_layout() -> Layout {
    Layout::from_columns([
        Column::new("seq", ColumnType::UInt64),
        Column::new("value", ColumnType::Double),
        Column::new("tag", ColumnType::String),
    ])
    .unwrap()
}

fn expected(i: u64) -> (u64, f64, String) {
    (i, (i as f64) * 0.5, format!("tag-{}", i / 100))
}

fn write_rows(path: &std::path::Path, opts: WriterOptions, rows: u64) {
    let mut writer = Writer::with_options(sample_layout(), opts);
    writer.open(path, true).unwrap();
    for i in 0..rows {
        let (seq, value, tag) = expected(i);
        writer.row().set(0, seq).unwrap();
        writer.row().set(1, value).unwrap();
        writer.row().set(2, tag).unwrap();
        writer.write_row().unwrap();
    }
    writer.close().unwrap();
}

fn assert_row(reader: &mut Reader, i: u64) {
    let (seq, value, tag) = expected(i);
    let row = reader.read(i).unwrap();
    assert_eq!(row.get::<u64>(0).unwrap(), seq, "row {i}");
    assert_eq!(row.get::<f64>(1).unwrap(), value, "row {i}");
    assert_eq!(row.get_str(2).unwrap(), tag, "row {i}");
    assert_eq!(reader.row_pos(), Some(i));
}

#[test]
fn out_of_order_reads_on_compressed_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("random_lz4.bcsv");
    write_rows(
        &path,
        WriterOptions {
            file_codec: FileCodecId::PacketLz4001,
            block_size: 2048,
            ..WriterOptions::default()
        },
        10_000,
    );

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    assert_eq!(reader.row_count(), 10_000);
    assert!(
        reader.packet_count() >= 10,
        "block size must force at least 10 packets, got {}",
        reader.packet_count()
    );

    for i in [0u64, 9999, 4321, 42] {
        assert_row(&mut reader, i);
    }
}

#[test]
fn random_matches_sequential_scan() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("random_vs_seq.bcsv");
    write_rows(
        &path,
        WriterOptions {
            file_codec: FileCodecId::PacketLz4001,
            block_size: 512,
            ..WriterOptions::default()
        },
        800,
    );

    // sequential pass collects the ground truth
    let mut sequential = Reader::new();
    sequential.open(&path).unwrap();
    let mut scanned = Vec::new();
    while sequential.read_next().unwrap() {
        scanned.push((
            sequential.row().get::<u64>(0).unwrap(),
            sequential.row().get::<f64>(1).unwrap(),
            sequential.row().get_str(2).unwrap().to_string(),
        ));
    }
    assert_eq!(scanned.len(), 800);

    // every index through read(i), in a scrambled order
    let mut random = Reader::new();
    random.open(&path).unwrap();
    for k in 0..800u64 {
        let i = (k * 389) % 800; // coprime stride visits every index
        let row = random.read(i).unwrap();
        let want = &scanned[i as usize];
        assert_eq!(row.get::<u64>(0).unwrap(), want.0, "row {i}");
        assert_eq!(row.get::<f64>(1).unwrap(), want.1, "row {i}");
        assert_eq!(row.get_str(2).unwrap(), want.2, "row {i}");
    }
}

/// Zero-order-hold state must reset at every packet boundary, so jumping
/// backwards and forwards cannot smear values between rows.
#[test]
fn zoh_random_access_resets_state() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("random_zoh.bcsv");
    write_rows(
        &path,
        WriterOptions {
            file_codec: FileCodecId::PacketLz4001,
            row_codec: RowCodecId::Zoh001,
            block_size: 256,
            ..WriterOptions::default()
        },
        2000,
    );

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    assert!(reader.packet_count() > 4);
    for i in [1999u64, 0, 1000, 999, 1, 1998, 500] {
        assert_row(&mut reader, i);
    }
}

/// Batch codec random access decodes from the containing group boundary.
#[test]
fn batch_random_access() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("random_batch.bcsv");
    write_rows(
        &path,
        WriterOptions {
            file_codec: FileCodecId::PacketLz4Batch001,
            block_size: 128,
            ..WriterOptions::default()
        },
        3000,
    );

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    assert!(
        reader.packet_count() > 32,
        "need multiple batch groups, got {} packets",
        reader.packet_count()
    );
    for i in [2999u64, 0, 1500, 2998, 1, 750, 2250] {
        assert_row(&mut reader, i);
    }
}

#[test]
fn stream_random_access() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("random_stream.bcsv");
    write_rows(
        &path,
        WriterOptions {
            file_codec: FileCodecId::StreamLz4001,
            ..WriterOptions::default()
        },
        300,
    );

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    for i in [299u64, 0, 150, 1, 298] {
        assert_row(&mut reader, i);
    }
}

#[test]
fn read_interleaves_with_read_next() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("interleave.bcsv");
    write_rows(
        &path,
        WriterOptions {
            block_size: 512,
            ..WriterOptions::default()
        },
        600,
    );

    let mut reader = Reader::new();
    reader.open(&path).unwrap();

    assert_row(&mut reader, 123);
    // read_next continues from the row after the last returned one
    assert!(reader.read_next().unwrap());
    assert_eq!(reader.row().get::<u64>(0).unwrap(), 124);
    assert_eq!(reader.row_pos(), Some(124));

    assert_row(&mut reader, 0);
    assert!(reader.read_next().unwrap());
    assert_eq!(reader.row().get::<u64>(0).unwrap(), 1);

    assert_row(&mut reader, 599);
    assert!(!reader.read_next().unwrap());
}

#[test]
fn read_out_of_range_is_a_range_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("range.bcsv");
    write_rows(&path, WriterOptions::default(), 10);

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    assert!(matches!(reader.read(10), Err(bcsv::BcsvError::Range(_))));
    assert!(matches!(
        reader.read(u64::MAX),
        Err(bcsv::BcsvError::Range(_))
    ));
    // a range error is not fatal
    assert!(reader.is_open());
    assert_row(&mut reader, 9);
}
