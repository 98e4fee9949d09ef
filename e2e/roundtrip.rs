//! E2E: flat-codec write/read round trips, writer/reader state machines,
//! and the frozen string wire form.

use std::sync::Arc;

use tempfile::TempDir;

use bcsv::codec_row::{FlatCodec, RowCodec};
use bcsv::{
    Bits, Column, ColumnType, FileCodecId, Layout, Reader, Row, RowCodecId, Writer, WriterOptions,
};

fn sample_layout() -> Layout {
    Layout::from_columns([
        Column::new("id", ColumnType::Int32),
        Column::new("name", ColumnType::String),
        Column::new("flag", ColumnType::Bool),
    ])
    .unwrap()
}

#[test]
fn flat_roundtrip_three_rows() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flat_roundtrip.bcsv");
    let rows = [(1i32, "a", true), (2, "bb", false), (3, "", true)];

    let mut writer = Writer::with_options(
        sample_layout(),
        WriterOptions {
            file_codec: FileCodecId::Packet001,
            ..WriterOptions::default()
        },
    );
    writer.open(&path, true).unwrap();
    for (id, name, flag) in rows {
        writer.row().set(0, id).unwrap();
        writer.row().set(1, name.to_string()).unwrap();
        writer.row().set(2, flag).unwrap();
        writer.write_row().unwrap();
    }
    writer.close().unwrap();
    assert_eq!(writer.row_count(), 3);
    assert!(!writer.is_open());

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    assert!(reader.is_sealed());
    assert!(reader.warning().is_none());
    assert_eq!(reader.row_count(), 3);
    assert!(reader.layout().is_compatible(&sample_layout()));

    for (id, name, flag) in rows {
        assert!(reader.read_next().unwrap());
        assert_eq!(reader.row().get::<i32>(0).unwrap(), id);
        assert_eq!(reader.row().get_str(1).unwrap(), name);
        assert_eq!(reader.row().get::<bool>(2).unwrap(), flag);
    }
    assert!(!reader.read_next().unwrap());
    assert_eq!(reader.row_pos(), Some(2));
    reader.close().unwrap();
}

#[test]
fn written_order_is_preserved() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("order.bcsv");
    let layout = Layout::from_columns([
        Column::new("seq", ColumnType::UInt64),
        Column::new("payload", ColumnType::String),
    ])
    .unwrap();

    let mut writer = Writer::new(layout);
    writer.open(&path, true).unwrap();
    for i in 0..500u64 {
        writer.row().set(0, i).unwrap();
        writer.row().set(1, format!("row-{i}")).unwrap();
        writer.write_row().unwrap();
    }
    writer.close().unwrap();

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    let mut expected = 0u64;
    while reader.read_next().unwrap() {
        assert_eq!(reader.row().get::<u64>(0).unwrap(), expected);
        assert_eq!(reader.row().get_str(1).unwrap(), format!("row-{expected}"));
        expected += 1;
    }
    assert_eq!(expected, 500);
}

#[test]
fn every_column_type_roundtrips() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("all_types.bcsv");
    let layout = Layout::from_columns([
        Column::new("b", ColumnType::Bool),
        Column::new("i8", ColumnType::Int8),
        Column::new("i16", ColumnType::Int16),
        Column::new("i32", ColumnType::Int32),
        Column::new("i64", ColumnType::Int64),
        Column::new("u8", ColumnType::UInt8),
        Column::new("u16", ColumnType::UInt16),
        Column::new("u32", ColumnType::UInt32),
        Column::new("u64", ColumnType::UInt64),
        Column::new("f", ColumnType::Float),
        Column::new("d", ColumnType::Double),
        Column::new("s", ColumnType::String),
    ])
    .unwrap();

    let mut writer = Writer::new(layout);
    writer.open(&path, true).unwrap();
    writer.row().set(0, true).unwrap();
    writer.row().set(1, -8i8).unwrap();
    writer.row().set(2, -1600i16).unwrap();
    writer.row().set(3, i32::MIN).unwrap();
    writer.row().set(4, i64::MAX).unwrap();
    writer.row().set(5, 250u8).unwrap();
    writer.row().set(6, 65000u16).unwrap();
    writer.row().set(7, u32::MAX).unwrap();
    writer.row().set(8, u64::MAX).unwrap();
    writer.row().set(9, 2.5f32).unwrap();
    writer.row().set(10, -1e300f64).unwrap();
    writer.row().set(11, "uni\u{00e7}ode".to_string()).unwrap();
    writer.write_row().unwrap();
    writer.close().unwrap();

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    assert!(reader.read_next().unwrap());
    let row = reader.row();
    assert!(row.get::<bool>(0).unwrap());
    assert_eq!(row.get::<i8>(1).unwrap(), -8);
    assert_eq!(row.get::<i16>(2).unwrap(), -1600);
    assert_eq!(row.get::<i32>(3).unwrap(), i32::MIN);
    assert_eq!(row.get::<i64>(4).unwrap(), i64::MAX);
    assert_eq!(row.get::<u8>(5).unwrap(), 250);
    assert_eq!(row.get::<u16>(6).unwrap(), 65000);
    assert_eq!(row.get::<u32>(7).unwrap(), u32::MAX);
    assert_eq!(row.get::<u64>(8).unwrap(), u64::MAX);
    assert_eq!(row.get::<f32>(9).unwrap(), 2.5);
    assert_eq!(row.get::<f64>(10).unwrap(), -1e300);
    assert_eq!(row.get_str(11).unwrap(), "uni\u{00e7}ode");
}

/// The string wire form is a fixed little-endian u32 length prefix; this
/// fixture freezes it.
#[test]
fn flat_string_wire_form_is_frozen() {
    let layout = Arc::new(Layout::from_columns([Column::new("s", ColumnType::String)]).unwrap());
    let mut row = Row::new(layout.clone());
    row.set(0, "ab".to_string()).unwrap();

    let mut codec = FlatCodec::new(layout);
    let mut buf = Vec::new();
    codec.encode_row(&row, &mut buf).unwrap();
    assert_eq!(buf, vec![2, 0, 0, 0, b'a', b'b']);
}

/// Fixed layout of one flat row: bool bitmap, then scalars, then strings.
#[test]
fn flat_row_wire_form_is_frozen() {
    let layout = Arc::new(sample_layout());
    let mut row = Row::new(layout.clone());
    row.set(0, 0x01020304i32).unwrap();
    row.set(1, "x".to_string()).unwrap();
    row.set(2, true).unwrap();

    let mut codec = FlatCodec::new(layout);
    let mut buf = Vec::new();
    codec.encode_row(&row, &mut buf).unwrap();
    // bitmap (1 byte, bit 0 = "flag"), i32 LE, u32 string length, bytes
    assert_eq!(buf, vec![0x01, 0x04, 0x03, 0x02, 0x01, 1, 0, 0, 0, b'x']);
}

#[test]
fn empty_file_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.bcsv");

    let mut writer = Writer::new(sample_layout());
    writer.open(&path, true).unwrap();
    writer.close().unwrap();

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    assert!(reader.is_sealed());
    assert_eq!(reader.row_count(), 0);
    assert_eq!(reader.packet_count(), 0);
    assert!(!reader.read_next().unwrap());
}

#[test]
fn writer_state_machine() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("states.bcsv");

    let mut writer = Writer::new(sample_layout());
    // writes on a closed writer are state errors
    assert!(matches!(
        writer.write_row(),
        Err(bcsv::BcsvError::State(_))
    ));
    assert!(matches!(writer.flush(), Err(bcsv::BcsvError::State(_))));

    writer.open(&path, true).unwrap();
    assert!(writer.is_open());
    // no re-open without close
    assert!(matches!(
        writer.open(&path, true),
        Err(bcsv::BcsvError::State(_))
    ));

    writer.close().unwrap();
    // close is idempotent
    writer.close().unwrap();
    assert!(!writer.is_open());

    // refusing to clobber without overwrite
    let mut second = Writer::new(sample_layout());
    assert!(second.open(&path, false).is_err());
    second.open(&path, true).unwrap();
    second.close().unwrap();
}

#[test]
fn reader_state_machine() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("reader_states.bcsv");

    let mut writer = Writer::new(sample_layout());
    writer.open(&path, true).unwrap();
    writer.row().set(0, 1i32).unwrap();
    writer.row().set(1, "x".to_string()).unwrap();
    writer.row().set(2, false).unwrap();
    writer.write_row().unwrap();
    writer.close().unwrap();

    let mut reader = Reader::new();
    assert!(matches!(
        reader.read_next(),
        Err(bcsv::BcsvError::State(_))
    ));
    assert!(matches!(reader.read(0), Err(bcsv::BcsvError::State(_))));

    reader.open(&path).unwrap();
    assert!(reader.is_open());
    // no re-open without close
    assert!(matches!(
        reader.open(&path),
        Err(bcsv::BcsvError::State(_))
    ));
    reader.close().unwrap();
    reader.open(&path).unwrap();
    assert!(reader.read_next().unwrap());
    reader.close().unwrap();
}

#[test]
fn write_external_row_copies_then_commits() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("external.bcsv");
    let layout = Layout::from_columns([
        Column::new("x", ColumnType::Int32),
        Column::new("s", ColumnType::String),
    ])
    .unwrap();

    let mut writer = Writer::new(layout.clone());
    let mut external = Row::new(Arc::new(layout));
    external.set(0, 77i32).unwrap();
    external.set(1, "hello".to_string()).unwrap();

    writer.open(&path, true).unwrap();
    writer.write(&external).unwrap();

    external.set(0, 88i32).unwrap();
    external.set(1, "world".to_string()).unwrap();
    writer.write(&external).unwrap();
    writer.close().unwrap();

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    assert!(reader.read_next().unwrap());
    assert_eq!(reader.row().get::<i32>(0).unwrap(), 77);
    assert_eq!(reader.row().get_str(1).unwrap(), "hello");
    assert!(reader.read_next().unwrap());
    assert_eq!(reader.row().get::<i32>(0).unwrap(), 88);
    assert_eq!(reader.row().get_str(1).unwrap(), "world");
    assert!(!reader.read_next().unwrap());
}

#[test]
fn row_typed_access_is_checked() {
    let layout = Arc::new(sample_layout());
    let mut row = Row::new(layout);

    assert!(matches!(
        row.set(0, "wrong".to_string()),
        Err(bcsv::BcsvError::Range(_))
    ));
    assert!(matches!(
        row.get::<f64>(0),
        Err(bcsv::BcsvError::Range(_))
    ));
    assert!(matches!(row.get::<i32>(9), Err(bcsv::BcsvError::Range(_))));

    // bulk set overflowing the layout fails without touching the row
    assert!(matches!(
        row.set_slice(2, &[true, false]),
        Err(bcsv::BcsvError::Range(_))
    ));
    assert!(row.presence().none());

    row.set(0, 5i32).unwrap();
    assert!(row.presence().test(0));
    row.clear_presence();
    assert!(row.presence().none());
}

#[test]
fn zoh_file_sets_header_flag() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("flagged.bcsv");

    let mut writer = Writer::with_options(
        sample_layout(),
        WriterOptions {
            row_codec: RowCodecId::Zoh001,
            ..WriterOptions::default()
        },
    );
    writer.open(&path, true).unwrap();
    writer.row().set(0, 1i32).unwrap();
    writer.row().set(1, "a".to_string()).unwrap();
    writer.row().set(2, true).unwrap();
    writer.write_row().unwrap();
    writer.close().unwrap();

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    let header = reader.file_header().unwrap();
    assert_eq!(header.row_codec, RowCodecId::Zoh001);
    assert!(header.flags.contains(bcsv::FileFlags::ZERO_ORDER_HOLD));
}
