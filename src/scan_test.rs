use super::*;
use crate::index_tuple::Key;
use crate::schema::{RAMTuple, Schema};
use crate::table_space::TableSpace;
use crate::types::{ColumnDesc, ColumnType};
use crate::undo::VecUndoLog;
use std::sync::Arc;

fn temp_dir(tag: &str) -> String {
    let mut p = std::env::temp_dir();
    p.push(format!("nvmdb.scan_test.{}.{}", tag, std::process::id()));
    std::fs::remove_dir_all(&p).ok();
    p.to_str().unwrap().to_string()
}

fn key(index_id: u32, n: u32, row_id: RowId) -> Key {
    let mut buf = Vec::new();
    let mut ib = [0u8; 4];
    crate::codec::encode_u32(&mut ib, index_id);
    buf.extend_from_slice(&ib);
    buf.push(crate::codec::TypeTag::Int32 as u8);
    let mut nb = [0u8; 4];
    crate::codec::encode_i32(&mut nb, n as i32);
    buf.extend_from_slice(&nb);
    buf.push(crate::codec::TypeTag::RowId as u8);
    let mut rb = [0u8; 4];
    crate::codec::encode_u32(&mut rb, row_id);
    buf.extend_from_slice(&rb);
    Key(buf)
}

#[test]
fn test_index_scan_iter_walks_forward_in_small_batches_spanning_continuation() {
    let idx = Arc::new(Index::new(1));
    // More entries than DEFAULT_BATCH (6) so the iterator must extend
    // its range via `successor` at least once.
    for n in 1..=9u32 {
        idx.insert(&key(1, n, n), INVALID_CSN).unwrap();
    }
    let snapshot = LookupSnapshot::new(100, 0);
    let start = key(1, 0, 0);
    let end = key(1, u32::MAX, u32::MAX);
    let mut it = IndexScanIter::new(idx, start, end, snapshot, 0, false);

    let mut seen = Vec::new();
    while it.valid() {
        seen.push(it.curr());
        it.next();
    }
    assert_eq!(seen, (1..=9).collect::<Vec<_>>());
}

#[test]
fn test_index_scan_iter_reverse() {
    let idx = Arc::new(Index::new(1));
    for n in 1..=5u32 {
        idx.insert(&key(1, n, n), INVALID_CSN).unwrap();
    }
    let snapshot = LookupSnapshot::new(100, 0);
    let start = key(1, 0, 0);
    let end = key(1, u32::MAX, u32::MAX);
    let mut it = IndexScanIter::new(idx, start, end, snapshot, 0, true);

    let mut seen = Vec::new();
    while it.valid() {
        seen.push(it.curr());
        it.next();
    }
    assert_eq!(seen, vec![5, 4, 3, 2, 1]);
}

#[test]
fn test_index_scan_iter_respects_max_range() {
    let idx = Arc::new(Index::new(1));
    for n in 1..=9u32 {
        idx.insert(&key(1, n, n), INVALID_CSN).unwrap();
    }
    let snapshot = LookupSnapshot::new(100, 0);
    let start = key(1, 0, 0);
    let end = key(1, u32::MAX, u32::MAX);
    let mut it = IndexScanIter::new(idx, start, end, snapshot, 3, false);

    let mut seen = Vec::new();
    while it.valid() {
        seen.push(it.curr());
        it.next();
    }
    assert_eq!(seen, vec![1, 2, 3]);
}

#[test]
fn test_index_scan_iter_filters_delete_markers_by_snapshot() {
    let idx = Arc::new(Index::new(1));
    idx.insert(&key(1, 1, 1), INVALID_CSN).unwrap();
    idx.insert(&key(1, 2, 2), INVALID_CSN).unwrap();
    // Tombstone row 2 at csn 10.
    idx.insert(&key(1, 2, 2), 10).unwrap();

    let start = key(1, 0, 0);
    let end = key(1, u32::MAX, u32::MAX);

    let early = LookupSnapshot::new(5, 0);
    let mut it = IndexScanIter::new(Arc::clone(&idx), start.clone(), end.clone(), early, 0, false);
    let mut seen = Vec::new();
    while it.valid() {
        seen.push(it.curr());
        it.next();
    }
    assert_eq!(seen, vec![1, 2]);

    let late = LookupSnapshot::new(20, 0);
    let mut it2 = IndexScanIter::new(idx, start, end, late, 0, false);
    let mut seen2 = Vec::new();
    while it2.valid() {
        seen2.push(it2.curr());
        it2.next();
    }
    assert_eq!(seen2, vec![1]);
}

fn customer_schema() -> Schema {
    Schema::new(vec![ColumnDesc::new("id", ColumnType::Int, 0, true)]).unwrap()
}

fn tuple<'s>(schema: &'s Schema, id: i32) -> RAMTuple<'s> {
    let mut t = RAMTuple::new(schema);
    t.set_col(0, &id.to_le_bytes()).unwrap();
    t
}

#[test]
fn test_sequential_iter_walks_every_inserted_row_id() {
    let dir = temp_dir("sequential");
    let ts = TableSpace::create(&dir, "heap").unwrap();
    ts.allocate_extent().unwrap();
    let schema = customer_schema();
    let undo = Arc::new(VecUndoLog::new());
    let heap = Heap::new(1, Arc::new(schema.clone()), Arc::new(ts), undo);

    for i in 1..=4 {
        heap.heap_insert(1, &tuple(&schema, i)).unwrap();
    }

    let mut it = SequentialIter::new(&heap);
    let mut seen = Vec::new();
    while it.valid() {
        seen.push(it.curr());
        it.next();
    }
    assert_eq!(seen, vec![1, 2, 3, 4]);
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_sequential_iter_empty_heap_is_immediately_invalid() {
    let dir = temp_dir("empty");
    let ts = TableSpace::create(&dir, "heap").unwrap();
    ts.allocate_extent().unwrap();
    let schema = customer_schema();
    let undo = Arc::new(VecUndoLog::new());
    let heap = Heap::new(1, Arc::new(schema.clone()), Arc::new(ts), undo);

    let it = SequentialIter::new(&heap);
    assert!(!it.valid());
    std::fs::remove_dir_all(&dir).ok();
}
