use super::*;
use crate::types::ColumnType;
use crate::undo::VecUndoLog;

/// Surface the `log::info!` lines catalog.rs emits on table/index
/// create, mount, and drop under `cargo test -- --nocapture`.
fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}

fn temp_dir(tag: &str) -> String {
    let mut p = std::env::temp_dir();
    p.push(format!("nvmdb.catalog_test.{}.{}", tag, std::process::id()));
    std::fs::remove_dir_all(&p).ok();
    p.to_str().unwrap().to_string()
}

fn customers_columns() -> Vec<ColumnDesc> {
    vec![
        ColumnDesc::new("id", ColumnType::Int, 0, true),
        ColumnDesc::new("balance", ColumnType::UnsignedLong, 0, true),
    ]
}

fn row(schema: &Schema, id: i32, balance: u64) -> RAMTuple<'_> {
    let mut t = RAMTuple::new(schema);
    t.set_col(0, &id.to_le_bytes()).unwrap();
    t.set_col(1, &balance.to_le_bytes()).unwrap();
    t
}

#[test]
fn test_create_table_insert_and_read() {
    let dir = temp_dir("basic");
    let cat = Catalog::new(&dir, Arc::new(VecUndoLog::new()));
    let table = cat.create_table("customers", customers_columns()).unwrap();
    let schema = table.schema().clone();

    let row_id = table.heap_insert(1, &row(&schema, 7, 100)).unwrap();
    let (status, tuple) = table.heap_read(row_id, LookupSnapshot::new(10, 0)).unwrap();
    assert_eq!(status, HeapStatus::Success);
    assert!(tuple.unwrap().col_equal(0, &7i32.to_le_bytes()));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_create_index_backfills_existing_rows() {
    let dir = temp_dir("backfill");
    let cat = Catalog::new(&dir, Arc::new(VecUndoLog::new()));
    let table = cat.create_table("customers", customers_columns()).unwrap();
    let schema = table.schema().clone();

    for i in 1..=3 {
        table.heap_insert(1, &row(&schema, i, 100)).unwrap();
    }
    let index_id = cat.create_index(&table, &[0]).unwrap();

    let desc = table.index_descriptor(index_id).unwrap();
    let (start, end) = crate::index_tuple::build_range(
        &schema,
        &desc,
        &[crate::index_tuple::ColumnPredicate::Unconstrained],
    )
    .unwrap();
    let start_key = Key::encode(&schema, index_id, &start, 0);
    let end_key = Key::encode(&schema, index_id, &end, u32::MAX);
    let mut it = table
        .open_index_scan(index_id, start_key, end_key, LookupSnapshot::new(10, 0), 0, false)
        .unwrap();
    let mut seen = Vec::new();
    while it.valid() {
        seen.push(it.curr());
        it.next();
    }
    assert_eq!(seen, vec![1, 2, 3]);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_heap_update_rekeys_index_entries() {
    let dir = temp_dir("update");
    let cat = Catalog::new(&dir, Arc::new(VecUndoLog::new()));
    let table = cat.create_table("customers", customers_columns()).unwrap();
    let schema = table.schema().clone();

    let row_id = table.heap_insert(1, &row(&schema, 1, 100)).unwrap();
    let index_id = cat.create_index(&table, &[0]).unwrap();

    table.heap_update(row_id, 2, &row(&schema, 9, 250)).unwrap();

    let (status, tuple) = table.heap_read(row_id, LookupSnapshot::new(10, 0)).unwrap();
    assert_eq!(status, HeapStatus::Success);
    assert!(tuple.unwrap().col_equal(0, &9i32.to_le_bytes()));

    let desc = table.index_descriptor(index_id).unwrap();
    let (start, end) = crate::index_tuple::build_range(
        &schema,
        &desc,
        &[crate::index_tuple::ColumnPredicate::Equal(&9i32.to_le_bytes())],
    )
    .unwrap();
    let start_key = Key::encode(&schema, index_id, &start, 0);
    let end_key = Key::encode(&schema, index_id, &end, u32::MAX);
    let mut it = table
        .open_index_scan(index_id, start_key, end_key, LookupSnapshot::new(10, 0), 0, false)
        .unwrap();
    assert!(it.valid());
    assert_eq!(it.curr(), row_id);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_heap_delete_tombstones_index_entry() {
    let dir = temp_dir("delete");
    let cat = Catalog::new(&dir, Arc::new(VecUndoLog::new()));
    let table = cat.create_table("customers", customers_columns()).unwrap();
    let schema = table.schema().clone();

    let row_id = table.heap_insert(1, &row(&schema, 5, 100)).unwrap();
    let index_id = cat.create_index(&table, &[0]).unwrap();
    table.heap_delete(row_id, 2).unwrap();

    let desc = table.index_descriptor(index_id).unwrap();
    let (start, end) = crate::index_tuple::build_range(
        &schema,
        &desc,
        &[crate::index_tuple::ColumnPredicate::Unconstrained],
    )
    .unwrap();
    let start_key = Key::encode(&schema, index_id, &start, 0);
    let end_key = Key::encode(&schema, index_id, &end, u32::MAX);
    let mut it = table
        .open_index_scan(index_id, start_key, end_key, LookupSnapshot::new(10, 0), 0, false)
        .unwrap();
    assert!(!it.valid());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_drop_table_removes_from_registry_but_handle_stays_valid() {
    let dir = temp_dir("drop");
    let cat = Catalog::new(&dir, Arc::new(VecUndoLog::new()));
    let table = cat.create_table("customers", customers_columns()).unwrap();
    let table_id = table.table_id();

    cat.drop_table(table_id).unwrap();
    assert!(table.is_dropped());
    assert!(matches!(cat.table(table_id), Err(Error::TableNotFound(_))));

    // The handle this test still holds remains usable.
    let schema = table.schema().clone();
    assert!(table.heap_insert(1, &row(&schema, 1, 1)).is_ok());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_open_or_rebuild_mounts_existing_arena_and_rebuilds_index() {
    init_logging();
    let dir = temp_dir("rebuild");
    let table_id;
    let index_id;
    {
        let cat = Catalog::new(&dir, Arc::new(VecUndoLog::new()));
        let table = cat.create_table("customers", customers_columns()).unwrap();
        table_id = table.table_id();
        let schema = table.schema().clone();
        for i in 1..=3 {
            table.heap_insert(1, &row(&schema, i, 100)).unwrap();
        }
        index_id = cat.create_index(&table, &[0]).unwrap();
    }

    let cat2 = Catalog::new(&dir, Arc::new(VecUndoLog::new()));
    let table2 = cat2
        .open_or_rebuild(table_id, "customers", customers_columns(), &[(index_id, vec![0])])
        .unwrap();
    let schema = table2.schema().clone();
    let desc = table2.index_descriptor(index_id).unwrap();
    let (start, end) = crate::index_tuple::build_range(
        &schema,
        &desc,
        &[crate::index_tuple::ColumnPredicate::Unconstrained],
    )
    .unwrap();
    let start_key = Key::encode(&schema, index_id, &start, 0);
    let end_key = Key::encode(&schema, index_id, &end, u32::MAX);
    let mut it = table2
        .open_index_scan(index_id, start_key, end_key, LookupSnapshot::new(10, 0), 0, false)
        .unwrap();
    let mut seen = Vec::new();
    while it.valid() {
        seen.push(it.curr());
        it.next();
    }
    assert_eq!(seen, vec![1, 2, 3]);
    std::fs::remove_dir_all(&dir).ok();
}
