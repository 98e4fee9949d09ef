//! E2E: zero-order-hold codec. Repeat suppression, the bool-only
//! transition regression, sentinel identities, and packet-boundary
//! resets.

use std::sync::Arc;

use tempfile::TempDir;

use bcsv::codec_row::{RowCodec, ZohCodec};
use bcsv::{
    Column, ColumnType, Layout, Reader, Row, RowCodecId, Writer, WriterOptions,
    ZOH_EOF_SENTINEL, ZOH_REPEAT_SENTINEL,
};

fn zoh_options() -> WriterOptions {
    WriterOptions::zoh()
}

/// The sentinels are pinned wire constants: both even, so neither can be
/// the first byte of a change mask, whose record bit makes it odd.
#[test]
fn sentinel_identities() {
    assert_eq!(ZOH_REPEAT_SENTINEL, 0xFE);
    assert_eq!(ZOH_EOF_SENTINEL, 0xFC);
    assert_ne!(ZOH_REPEAT_SENTINEL, ZOH_EOF_SENTINEL);
    assert_eq!(ZOH_REPEAT_SENTINEL % 2, 0);
    assert_eq!(ZOH_EOF_SENTINEL % 2, 0);
}

/// Rows 1.0, 1.0, 1.0, 2.0, 2.0 encode as full row, two repeats, one
/// delta, one repeat.
#[test]
fn repeat_suppression_wire_form() {
    let layout = Arc::new(Layout::from_columns([Column::new("v", ColumnType::Float)]).unwrap());
    let mut row = Row::new(layout.clone());
    let mut codec = ZohCodec::new(layout);

    let mut buf = Vec::new();
    for v in [1.0f32, 1.0, 1.0, 2.0, 2.0] {
        row.set(0, v).unwrap();
        codec.encode_row(&row, &mut buf).unwrap();
    }
    codec.finish_payload(&mut buf);

    let repeats = buf.iter().filter(|&&b| b == ZOH_REPEAT_SENTINEL).count();
    assert_eq!(repeats, 3);
    // full record = 1 mask byte + 4 value bytes; same for the delta
    assert_eq!(buf.len(), 5 + 1 + 1 + 5 + 1 + 1);
    assert_eq!(*buf.last().unwrap(), ZOH_EOF_SENTINEL);
    // record bit makes each mask byte odd
    assert_eq!(buf[0] & 1, 1);
}

#[test]
fn repeat_suppression_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zoh_repeats.bcsv");
    let values = [1.0f32, 1.0, 1.0, 2.0, 2.0];

    let layout = Layout::from_columns([Column::new("v", ColumnType::Float)]).unwrap();
    let mut writer = Writer::with_options(layout, zoh_options());
    writer.open(&path, true).unwrap();
    for v in values {
        writer.row().set(0, v).unwrap();
        writer.write_row().unwrap();
    }
    writer.close().unwrap();

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    for v in values {
        assert!(reader.read_next().unwrap());
        assert_eq!(reader.row().get::<f32>(0).unwrap(), v);
    }
    assert!(!reader.read_next().unwrap());
}

/// Rows that differ only in bool columns must not be collapsed into
/// repeats: equality spans all columns, bools included.
#[test]
fn bool_only_transition_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zoh_bool_only.bcsv");
    let rows = [
        (false, true, 42i32),
        (true, false, 42),
        (true, true, 42),
        (true, true, 99),
    ];

    let layout = Layout::from_columns([
        Column::new("flag1", ColumnType::Bool),
        Column::new("flag2", ColumnType::Bool),
        Column::new("value", ColumnType::Int32),
    ])
    .unwrap();
    let mut writer = Writer::with_options(layout, zoh_options());
    writer.open(&path, true).unwrap();
    for (a, b, v) in rows {
        writer.row().set(0, a).unwrap();
        writer.row().set(1, b).unwrap();
        writer.row().set(2, v).unwrap();
        writer.write_row().unwrap();
    }
    writer.close().unwrap();

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    for (i, (a, b, v)) in rows.into_iter().enumerate() {
        assert!(reader.read_next().unwrap(), "row {i}");
        assert_eq!(reader.row().get::<bool>(0).unwrap(), a, "row {i}");
        assert_eq!(reader.row().get::<bool>(1).unwrap(), b, "row {i}");
        assert_eq!(reader.row().get::<i32>(2).unwrap(), v, "row {i}");
    }
    assert!(!reader.read_next().unwrap());
}

/// Every transition of an all-bool layout must survive.
#[test]
fn all_bool_layout_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zoh_all_bool.bcsv");

    let layout = Layout::from_columns([
        Column::new("a", ColumnType::Bool),
        Column::new("b", ColumnType::Bool),
        Column::new("c", ColumnType::Bool),
    ])
    .unwrap();
    let mut writer = Writer::with_options(layout, zoh_options());
    writer.open(&path, true).unwrap();
    for i in 0..8u32 {
        writer.row().set(0, i & 1 != 0).unwrap();
        writer.row().set(1, i & 2 != 0).unwrap();
        writer.row().set(2, i & 4 != 0).unwrap();
        writer.write_row().unwrap();
    }
    writer.close().unwrap();

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    for i in 0..8u32 {
        assert!(reader.read_next().unwrap(), "row {i}");
        assert_eq!(reader.row().get::<bool>(0).unwrap(), i & 1 != 0, "row {i}");
        assert_eq!(reader.row().get::<bool>(1).unwrap(), i & 2 != 0, "row {i}");
        assert_eq!(reader.row().get::<bool>(2).unwrap(), i & 4 != 0, "row {i}");
    }
    assert!(!reader.read_next().unwrap());
}

/// Unchanged cells carry forward; changed cells of mixed classes land in
/// the right rows.
#[test]
fn partial_change_roundtrip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zoh_partial.bcsv");

    let layout = Layout::from_columns([
        Column::new("a", ColumnType::Int32),
        Column::new("b", ColumnType::Double),
        Column::new("s", ColumnType::String),
        Column::new("f", ColumnType::Bool),
    ])
    .unwrap();
    let rows: Vec<(i32, f64, &str, bool)> = vec![
        (1, 0.5, "start", false),
        (1, 0.5, "start", true),   // bool-only change
        (2, 0.5, "start", true),   // scalar-only change
        (2, 0.5, "moved", true),   // string-only change
        (2, 0.5, "moved", true),   // exact repeat
        (3, 9.75, "end", false),   // everything changes
    ];

    let mut writer = Writer::with_options(layout, zoh_options());
    writer.open(&path, true).unwrap();
    for (a, b, s, f) in &rows {
        writer.row().set(0, *a).unwrap();
        writer.row().set(1, *b).unwrap();
        writer.row().set(2, s.to_string()).unwrap();
        writer.row().set(3, *f).unwrap();
        writer.write_row().unwrap();
    }
    writer.close().unwrap();

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    for (i, (a, b, s, f)) in rows.iter().enumerate() {
        assert!(reader.read_next().unwrap(), "row {i}");
        assert_eq!(reader.row().get::<i32>(0).unwrap(), *a, "row {i}");
        assert_eq!(reader.row().get::<f64>(1).unwrap(), *b, "row {i}");
        assert_eq!(reader.row().get_str(2).unwrap(), *s, "row {i}");
        assert_eq!(reader.row().get::<bool>(3).unwrap(), *f, "row {i}");
    }
    assert!(!reader.read_next().unwrap());
}

/// A tiny block size forces many packets; each must open with a full row
/// so packets stay independently decodable.
#[test]
fn repeats_across_packet_boundaries() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zoh_packets.bcsv");

    let layout = Layout::from_columns([Column::new("v", ColumnType::Int64)]).unwrap();
    let mut writer = Writer::with_options(
        layout,
        WriterOptions {
            row_codec: RowCodecId::Zoh001,
            block_size: 32,
            ..WriterOptions::default()
        },
    );
    writer.open(&path, true).unwrap();
    // long runs of identical values spanning packet boundaries
    let values: Vec<i64> = (0..400).map(|i| (i / 37) as i64).collect();
    for &v in &values {
        writer.row().set(0, v).unwrap();
        writer.write_row().unwrap();
    }
    writer.close().unwrap();

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    assert!(reader.packet_count() > 1, "expected multiple packets");
    for (i, &v) in values.iter().enumerate() {
        assert!(reader.read_next().unwrap(), "row {i}");
        assert_eq!(reader.row().get::<i64>(0).unwrap(), v, "row {i}");
    }
    assert!(!reader.read_next().unwrap());
}

/// Wide layouts need multi-byte change masks; the record bit shifts every
/// column over by one.
#[test]
fn wide_layout_multibyte_mask() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zoh_wide.bcsv");

    let mut layout = Layout::new();
    for i in 0..20 {
        layout
            .add_column(Column::new(format!("c{i}"), ColumnType::Int32))
            .unwrap();
    }
    let mut writer = Writer::with_options(layout, zoh_options());
    writer.open(&path, true).unwrap();
    for r in 0..50i32 {
        for c in 0..20usize {
            // a moving pair of changed columns walks across the mask bytes
            let value = if c == (r as usize % 20) { r } else { -1 };
            writer.row().set(c, value).unwrap();
        }
        writer.write_row().unwrap();
    }
    writer.close().unwrap();

    let mut reader = Reader::new();
    reader.open(&path).unwrap();
    for r in 0..50i32 {
        assert!(reader.read_next().unwrap());
        for c in 0..20usize {
            let want = if c == (r as usize % 20) { r } else { -1 };
            assert_eq!(reader.row().get::<i32>(c).unwrap(), want, "row {r} col {c}");
        }
    }
    assert!(!reader.read_next().unwrap());
}
