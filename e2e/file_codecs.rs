//! E2E: the file-codec matrix. Every framing x compression x batch
//! combination round-trips with both row codecs, and the id resolution
//! rejects combinations outside the matrix.

use tempfile::TempDir;

use bcsv::{
    resolve_file_codec_id, Column, ColumnType, Compression, FileCodecId, Framing, Layout, Reader,
    RowCodecId, Writer, WriterOptions,
};

const ALL_FILE_CODECS: &[FileCodecId] = &[
    FileCodecId::Stream001,
    FileCodecId::StreamLz4001,
    FileCodecId::Packet001,
    FileCodecId::PacketLz4001,
    FileCodecId::PacketLz4Batch001,
];

const ALL_ROW_CODECS: &[RowCodecId] = &[RowCodecId::Flat001, RowCodecId::Zoh001];

fn sample_layout() -> Layout {
    Layout::from_columns([
        Column::new("seq", ColumnType::Int32),
        Column::new("value", ColumnType::Double),
        Column::new("label", ColumnType::String),
        Column::new("ok", ColumnType::Bool),
    ])
    .unwrap()
}

fn expected_row(i: i32) -> (i32, f64, String, bool) {
    // runs of identical labels give the ZoH codec something to elide
    (
        i,
        f64::from(i / 10) * 0.25,
        format!("label-{}", i / 25),
        i % 3 == 0,
    )
}

fn write_file(
    path: &std::path::Path,
    file_codec: FileCodecId,
    row_codec: RowCodecId,
    rows: i32,
    block_size: u32,
) {
    let mut writer = Writer::with_options(
        sample_layout(),
        WriterOptions {
            file_codec,
            row_codec,
            block_size,
            ..WriterOptions::default()
        },
    );
    writer.open(path, true).unwrap();
    for i in 0..rows {
        let (seq, value, label, ok) = expected_row(i);
        writer.row().set(0, seq).unwrap();
        writer.row().set(1, value).unwrap();
        writer.row().set(2, label).unwrap();
        writer.row().set(3, ok).unwrap();
        writer.write_row().unwrap();
    }
    writer.close().unwrap();
}

fn verify_file(path: &std::path::Path, rows: i32) -> Reader {
    let mut reader = Reader::new();
    reader.open(path).unwrap();
    assert!(reader.is_sealed());
    assert_eq!(reader.row_count(), rows as u64);
    for i in 0..rows {
        let (seq, value, label, ok) = expected_row(i);
        assert!(reader.read_next().unwrap(), "row {i}");
        assert_eq!(reader.row().get::<i32>(0).unwrap(), seq, "row {i}");
        assert_eq!(reader.row().get::<f64>(1).unwrap(), value, "row {i}");
        assert_eq!(reader.row().get_str(2).unwrap(), label, "row {i}");
        assert_eq!(reader.row().get::<bool>(3).unwrap(), ok, "row {i}");
    }
    assert!(!reader.read_next().unwrap());
    reader
}

#[test]
fn resolution_matrix() {
    assert_eq!(
        resolve_file_codec_id(Framing::Stream, Compression::None, false).unwrap(),
        FileCodecId::Stream001
    );
    assert_eq!(
        resolve_file_codec_id(Framing::Stream, Compression::Lz4, false).unwrap(),
        FileCodecId::StreamLz4001
    );
    assert_eq!(
        resolve_file_codec_id(Framing::Packet, Compression::None, false).unwrap(),
        FileCodecId::Packet001
    );
    assert_eq!(
        resolve_file_codec_id(Framing::Packet, Compression::Lz4, false).unwrap(),
        FileCodecId::PacketLz4001
    );
    assert_eq!(
        resolve_file_codec_id(Framing::Packet, Compression::Lz4, true).unwrap(),
        FileCodecId::PacketLz4Batch001
    );

    // the batch flag maps to the batch variant only for packet + LZ4
    assert!(resolve_file_codec_id(Framing::Stream, Compression::None, true).is_err());
    assert!(resolve_file_codec_id(Framing::Stream, Compression::Lz4, true).is_err());
    assert!(resolve_file_codec_id(Framing::Packet, Compression::None, true).is_err());
}

#[test]
fn wire_ids_are_stable() {
    assert_eq!(FileCodecId::Stream001.to_wire(), 0);
    assert_eq!(FileCodecId::StreamLz4001.to_wire(), 1);
    assert_eq!(FileCodecId::Packet001.to_wire(), 2);
    assert_eq!(FileCodecId::PacketLz4001.to_wire(), 3);
    assert_eq!(FileCodecId::PacketLz4Batch001.to_wire(), 4);
    for &id in ALL_FILE_CODECS {
        assert_eq!(FileCodecId::from_wire(id.to_wire()).unwrap(), id);
    }
    assert!(FileCodecId::from_wire(99).is_err());

    assert_eq!(RowCodecId::Flat001.to_wire(), 0);
    assert_eq!(RowCodecId::Zoh001.to_wire(), 1);
    assert!(RowCodecId::from_wire(9).is_err());
}

#[test]
fn every_codec_pair_roundtrips() {
    let dir = TempDir::new().unwrap();
    for &file_codec in ALL_FILE_CODECS {
        for &row_codec in ALL_ROW_CODECS {
            let path = dir.path().join(format!(
                "pair_{}_{}.bcsv",
                file_codec.to_wire(),
                row_codec.to_wire()
            ));
            write_file(&path, file_codec, row_codec, 300, 512);
            let reader = verify_file(&path, 300);
            let header = reader.file_header().unwrap();
            assert_eq!(header.file_codec, file_codec);
            assert_eq!(header.row_codec, row_codec);
        }
    }
}

#[test]
fn packet_codecs_split_into_multiple_packets() {
    let dir = TempDir::new().unwrap();
    for &file_codec in &[
        FileCodecId::Packet001,
        FileCodecId::PacketLz4001,
        FileCodecId::PacketLz4Batch001,
    ] {
        let path = dir.path().join(format!("multi_{}.bcsv", file_codec.to_wire()));
        write_file(&path, file_codec, RowCodecId::Flat001, 2000, 256);
        let reader = verify_file(&path, 2000);
        assert!(
            reader.packet_count() >= 10,
            "{}: expected many packets, got {}",
            file_codec.name(),
            reader.packet_count()
        );
    }
}

#[test]
fn stream_codecs_use_a_single_payload() {
    let dir = TempDir::new().unwrap();
    for &file_codec in &[FileCodecId::Stream001, FileCodecId::StreamLz4001] {
        let path = dir.path().join(format!("stream_{}.bcsv", file_codec.to_wire()));
        write_file(&path, file_codec, RowCodecId::Flat001, 500, 64);
        let reader = verify_file(&path, 500);
        assert_eq!(reader.packet_count(), 1);
    }
}

#[test]
fn empty_file_roundtrips_for_every_codec() {
    let dir = TempDir::new().unwrap();
    for &file_codec in ALL_FILE_CODECS {
        for &row_codec in ALL_ROW_CODECS {
            let path = dir.path().join(format!(
                "empty_{}_{}.bcsv",
                file_codec.to_wire(),
                row_codec.to_wire()
            ));
            write_file(&path, file_codec, row_codec, 0, 0);
            let mut reader = Reader::new();
            reader.open(&path).unwrap();
            assert!(reader.is_sealed());
            assert_eq!(reader.row_count(), 0);
            assert!(!reader.read_next().unwrap());
        }
    }
}

/// Batch groups chain an LZ4 dictionary across packets; crossing several
/// group boundaries must not disturb sequential decode.
#[test]
fn batch_compression_across_group_boundaries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("batch_groups.bcsv");
    // a tiny block size yields well over 3 groups of 16 packets
    write_file(
        &path,
        FileCodecId::PacketLz4Batch001,
        RowCodecId::Flat001,
        3000,
        64,
    );
    let reader = verify_file(&path, 3000);
    assert!(
        reader.packet_count() > 48,
        "expected several batch groups, got {} packets",
        reader.packet_count()
    );
}

#[test]
fn explicit_flush_closes_packets() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flush.bcsv");

    let mut writer = Writer::with_options(
        sample_layout(),
        WriterOptions {
            file_codec: FileCodecId::Packet001,
            ..WriterOptions::default()
        },
    );
    writer.open(&path, true).unwrap();
    for i in 0..30 {
        let (seq, value, label, ok) = expected_row(i);
        writer.row().set(0, seq).unwrap();
        writer.row().set(1, value).unwrap();
        writer.row().set(2, label).unwrap();
        writer.row().set(3, ok).unwrap();
        writer.write_row().unwrap();
        if i % 10 == 9 {
            writer.flush().unwrap();
        }
    }
    writer.close().unwrap();

    let reader = verify_file(&path, 30);
    assert_eq!(reader.packet_count(), 3);
}
