// Layout bimap synchronization: after any sequence of add / remove /
// rename, the name-to-index map must be exactly the inverse of the
// positional lookup, with no duplicate or empty names.

use bcsv::{Column, ColumnType, Layout};

fn validate_sync(layout: &Layout, context: &str) {
    let count = layout.column_count();
    for i in 0..count {
        let name = layout.name(i);
        assert!(!name.is_empty(), "{context}: column {i} has empty name");
        assert!(layout.has(name), "{context}: index missing '{name}'");
        assert_eq!(
            layout.index(name),
            Some(i),
            "{context}: index maps '{name}' to the wrong position"
        );
    }
    let mut seen = std::collections::HashSet::new();
    for i in 0..count {
        assert!(
            seen.insert(layout.name(i).to_string()),
            "{context}: duplicate name '{}'",
            layout.name(i)
        );
    }
}

fn sample_layout() -> Layout {
    Layout::from_columns([
        Column::new("id", ColumnType::Int32),
        Column::new("name", ColumnType::String),
        Column::new("score", ColumnType::Float),
        Column::new("active", ColumnType::Bool),
    ])
    .unwrap()
}

#[test]
fn add_column_keeps_sync() {
    let mut layout = Layout::new();
    for (i, name) in ["a", "b", "c", "d", "e"].iter().enumerate() {
        layout
            .add_column(Column::new(*name, ColumnType::Int64))
            .unwrap();
        assert_eq!(layout.column_count(), i + 1);
        validate_sync(&layout, &format!("after add '{name}'"));
    }
}

#[test]
fn add_rejects_empty_and_duplicate_names() {
    let mut layout = sample_layout();
    assert!(layout.add_column(Column::new("", ColumnType::Bool)).is_err());
    assert!(layout
        .add_column(Column::new("id", ColumnType::Bool))
        .is_err());
    assert_eq!(layout.column_count(), 4);
    validate_sync(&layout, "after rejected adds");
}

#[test]
fn remove_column_shifts_and_rebuilds() {
    let mut layout = sample_layout();

    layout.remove_column(1).unwrap(); // middle
    assert_eq!(layout.column_count(), 3);
    assert_eq!(layout.name(1), "score");
    validate_sync(&layout, "after removing middle");

    layout.remove_column(0).unwrap(); // first
    assert_eq!(layout.name(0), "score");
    validate_sync(&layout, "after removing first");

    layout.remove_column(1).unwrap(); // last
    assert_eq!(layout.column_count(), 1);
    validate_sync(&layout, "after removing last");

    assert!(layout.remove_column(5).is_err());
}

#[test]
fn set_name_keeps_sync() {
    let mut layout = sample_layout();

    layout.set_name(2, "grade").unwrap();
    assert_eq!(layout.name(2), "grade");
    assert_eq!(layout.index("grade"), Some(2));
    assert!(!layout.has("score"));
    validate_sync(&layout, "after rename");

    // renaming to a different column's name fails
    assert!(layout.set_name(0, "grade").is_err());
    assert_eq!(layout.name(0), "id");
    validate_sync(&layout, "after rejected rename");

    // renaming to itself is a no-op
    layout.set_name(0, "id").unwrap();
    validate_sync(&layout, "after self rename");

    assert!(layout.set_name(0, "").is_err());
}

#[test]
fn interleaved_operations_keep_sync() {
    let mut layout = Layout::new();
    for name in ["w", "x", "y", "z"] {
        layout
            .add_column(Column::new(name, ColumnType::Double))
            .unwrap();
    }
    layout.remove_column(1).unwrap();
    layout.set_name(0, "w2").unwrap();
    layout
        .add_column(Column::new("x", ColumnType::Int8))
        .unwrap();
    layout.remove_column(2).unwrap();
    layout.set_name(2, "tail").unwrap();
    validate_sync(&layout, "after interleaved ops");
    assert_eq!(layout.column_count(), 3);
}

#[test]
fn equality_compares_names_and_types() {
    let a = Layout::from_columns([
        Column::new("x", ColumnType::Int32),
        Column::new("y", ColumnType::Double),
    ])
    .unwrap();
    let b = Layout::from_columns([
        Column::new("a", ColumnType::Int32),
        Column::new("b", ColumnType::Double),
    ])
    .unwrap();
    let c = Layout::from_columns([
        Column::new("x", ColumnType::Int32),
        Column::new("y", ColumnType::Double),
    ])
    .unwrap();

    // same types, different names: compatible but not equal
    assert!(a.is_compatible(&b));
    assert_ne!(a, b);
    assert_eq!(a, c);

    let d = Layout::from_columns([Column::new("x", ColumnType::Int32)]).unwrap();
    assert!(!a.is_compatible(&d));
}

#[test]
fn wire_roundtrip() {
    let layout = sample_layout();
    let mut buf = Vec::new();
    layout.encode_into(&mut buf);
    assert_eq!(buf.len(), layout.encoded_size());

    let mut raw = Vec::new();
    let decoded = Layout::read_wire(&mut buf.as_slice(), &mut raw).unwrap();
    assert_eq!(decoded, layout);
    assert_eq!(raw, buf);
}

#[test]
fn wire_rejects_unknown_type_id() {
    let layout = Layout::from_columns([Column::new("v", ColumnType::Bool)]).unwrap();
    let mut buf = Vec::new();
    layout.encode_into(&mut buf);
    let last = buf.len() - 1;
    buf[last] = 200; // type id out of range
    let mut raw = Vec::new();
    assert!(Layout::read_wire(&mut buf.as_slice(), &mut raw).is_err());
}
