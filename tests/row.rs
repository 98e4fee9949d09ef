// Row buffer: typed access, bulk writes, presence tracking, and the
// visitor facilities.

use std::sync::Arc;

use bcsv::bitvec::Bits;
use bcsv::{CellValue, Column, ColumnType, Layout, Row};

fn layout() -> Arc<Layout> {
    Arc::new(
        Layout::from_columns([
            Column::new("id", ColumnType::Int32),
            Column::new("x", ColumnType::Double),
            Column::new("y", ColumnType::Double),
            Column::new("name", ColumnType::String),
            Column::new("ok", ColumnType::Bool),
        ])
        .unwrap(),
    )
}

#[test]
fn new_row_is_zeroed_and_absent() {
    let row = Row::new(layout());
    assert_eq!(row.get::<i32>(0).unwrap(), 0);
    assert_eq!(row.get::<f64>(1).unwrap(), 0.0);
    assert_eq!(row.get_str(3).unwrap(), "");
    assert!(!row.get::<bool>(4).unwrap());
    assert!(row.presence().none());
}

#[test]
fn set_marks_presence_per_cell() {
    let mut row = Row::new(layout());
    row.set(0, 7i32).unwrap();
    row.set(3, "seven".to_string()).unwrap();
    assert!(row.presence().test(0));
    assert!(!row.presence().test(1));
    assert!(row.presence().test(3));
    assert_eq!(row.presence().count(), 2);

    row.clear_presence();
    assert!(row.presence().none());
    // values survive a presence clear
    assert_eq!(row.get::<i32>(0).unwrap(), 7);
}

#[test]
fn bulk_set_spans_columns() {
    let mut row = Row::new(layout());
    row.set_slice(1, &[1.5f64, -2.5]).unwrap();
    assert_eq!(row.get::<f64>(1).unwrap(), 1.5);
    assert_eq!(row.get::<f64>(2).unwrap(), -2.5);
    assert!(row.presence().test(1));
    assert!(row.presence().test(2));

    // overflow fails before writing anything
    let mut fresh = Row::new(layout());
    assert!(fresh.set_slice(3, &[0.0f64, 0.0, 0.0]).is_err());
    assert!(fresh.presence().none());

    // type mismatch anywhere in the span fails
    assert!(fresh.set_slice(0, &[1i32, 2]).is_err());
}

#[test]
fn visitor_sees_every_cell_in_order() {
    let mut row = Row::new(layout());
    row.set(0, 3i32).unwrap();
    row.set(3, "v".to_string()).unwrap();

    let mut seen = Vec::new();
    row.visit(|i, cell| seen.push((i, cell.column_type())));
    assert_eq!(
        seen,
        vec![
            (0, ColumnType::Int32),
            (1, ColumnType::Double),
            (2, ColumnType::Double),
            (3, ColumnType::String),
            (4, ColumnType::Bool),
        ]
    );
}

#[test]
fn mutable_visitor_folds_changes_into_presence() {
    let mut row = Row::new(layout());
    row.clear_presence();

    // double the numeric cells, leave everything else untouched
    row.visit_mut(|_, cell| match cell {
        CellValue::Int32(v) => {
            *v += 10;
            true
        }
        CellValue::Double(v) => {
            *v += 0.5;
            true
        }
        _ => false,
    });

    assert_eq!(row.get::<i32>(0).unwrap(), 10);
    assert_eq!(row.get::<f64>(1).unwrap(), 0.5);
    assert!(row.presence().test(0));
    assert!(row.presence().test(1));
    assert!(row.presence().test(2));
    assert!(!row.presence().test(3));
    assert!(!row.presence().test(4));
}

#[test]
fn typed_bulk_visitor_over_homogeneous_range() {
    let mut row = Row::new(layout());
    row.set(1, 2.0f64).unwrap();
    row.set(2, 3.0f64).unwrap();

    let mut sum = 0.0;
    row.visit_typed::<f64, _>(1, 2, |_, v| sum += *v).unwrap();
    assert_eq!(sum, 5.0);

    // crossing into a differently typed column is an error
    assert!(row.visit_typed::<f64, _>(1, 3, |_, _| {}).is_err());
    assert!(row.visit_typed::<f64, _>(4, 2, |_, _| {}).is_err());

    row.clear_presence();
    row.visit_typed_mut::<f64, _>(1, 2, |i, v| {
        *v *= -1.0;
        i == 1 // report only the first cell as changed
    })
    .unwrap();
    assert_eq!(row.get::<f64>(1).unwrap(), -2.0);
    assert_eq!(row.get::<f64>(2).unwrap(), -3.0);
    assert!(row.presence().test(1));
    assert!(!row.presence().test(2));
}

#[test]
fn value_equality_spans_all_columns() {
    let mut a = Row::new(layout());
    let mut b = Row::new(layout());
    assert!(a.values_equal(&b));

    // a bool-only difference still counts
    a.set(4, true).unwrap();
    assert!(!a.values_equal(&b));
    b.set(4, true).unwrap();
    assert!(a.values_equal(&b));

    a.set(3, "left".to_string()).unwrap();
    assert!(!a.values_equal(&b));
}

#[test]
fn copy_from_requires_compatible_layouts() {
    let mut a = Row::new(layout());
    a.set(0, 9i32).unwrap();
    a.set(3, "nine".to_string()).unwrap();

    let mut b = Row::new(layout());
    b.copy_from(&a).unwrap();
    assert!(b.values_equal(&a));
    assert!(b.presence().all());

    let other = Arc::new(
        Layout::from_columns([Column::new("lone", ColumnType::Int64)]).unwrap(),
    );
    let mut c = Row::new(other);
    assert!(c.copy_from(&a).is_err());
}

#[test]
fn untyped_access_checks_the_layout() {
    let mut row = Row::new(layout());
    row.set_value(0, CellValue::Int32(4)).unwrap();
    assert_eq!(*row.value(0), CellValue::Int32(4));
    assert!(row.set_value(0, CellValue::Double(4.0)).is_err());
    assert!(row.set_value(99, CellValue::Bool(true)).is_err());
}
