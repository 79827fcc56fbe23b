use super::*;
use crate::types::ColumnType;

fn customer_schema() -> Schema {
    Schema::new(vec![
        ColumnDesc::new("id", ColumnType::Int, 0, true),
        ColumnDesc::new("val", ColumnType::Varchar, 16, false),
    ])
    .unwrap()
}

#[test]
fn test_offsets_and_row_len() {
    let schema = customer_schema();
    assert_eq!(schema.columns[0].col_offset, 0);
    assert_eq!(schema.columns[0].col_len, 4);
    assert_eq!(schema.columns[1].col_offset, 4);
    assert_eq!(schema.columns[1].col_len, 20); // 16 + 4-byte prefix
    assert_eq!(schema.row_len, 24);
}

#[test]
fn test_set_get_fixed_width() {
    let schema = customer_schema();
    let mut t = RAMTuple::new(&schema);
    t.set_col(0, &42i32.to_le_bytes()).unwrap();
    assert_eq!(i32::from_le_bytes(t.get_col(0).try_into().unwrap()), 42);
    assert!(!t.is_null(0));
}

#[test]
fn test_set_get_varchar() {
    let schema = customer_schema();
    let mut t = RAMTuple::new(&schema);
    t.set_col(1, b"hello").unwrap();
    assert_eq!(t.get_varchar_payload(1), b"hello");

    // shrink in place.
    t.update_col_inc(1, b"hi").unwrap();
    assert_eq!(t.get_varchar_payload(1), b"hi");
}

#[test]
fn test_varchar_overflow_rejected() {
    let schema = customer_schema();
    let mut t = RAMTuple::new(&schema);
    let err = t.set_col(1, &[0u8; 17]).unwrap_err();
    assert!(matches!(err, Error::InputError(_)));
}

#[test]
fn test_null_bitmap() {
    let schema = customer_schema();
    let mut t = RAMTuple::new(&schema);
    assert!(!t.is_null(1));
    t.set_null(1, true);
    assert!(t.is_null(1));
    t.set_col(1, b"x").unwrap(); // setting clears null flag
    assert!(!t.is_null(1));
}

#[test]
fn test_copy_row() {
    let schema = customer_schema();
    let mut a = RAMTuple::new(&schema);
    a.set_col(0, &7i32.to_le_bytes()).unwrap();
    a.set_col(1, b"abc").unwrap();

    let mut b = RAMTuple::new(&schema);
    b.copy_row(&a);
    assert_eq!(b.get_col(0), a.get_col(0));
    assert_eq!(b.get_varchar_payload(1), b"abc");
}

#[test]
fn test_row_size_exceeded() {
    let cols = vec![ColumnDesc::new("huge", ColumnType::Varchar, 20_000, false)];
    let err = Schema::new(cols).unwrap_err();
    assert!(matches!(err, Error::RowSizeExceeded { .. }));
}
