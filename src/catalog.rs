//! Catalog (C8): the registry of live tables, each owning its schema,
//! table-space, heap, and secondary indexes, with table-level DML that
//! fans a heap mutation out to every index that needs updating.
//!
//! Grounded in the original `nvm_table.h`'s `Table` class (schema,
//! segment head, row length, index vector, ref-counted lifetime) and
//! in `tpcc.h`'s per-thread cached row-id-map handles, generalised here
//! into a thread-local cache of whole table handles so a worker thread
//! reuses the same `Arc<Table>` across calls instead of taking the
//! registry lock on every access.

use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::Error;
use crate::heap::{Heap, HeapStatus};
use crate::index::Index;
use crate::index_tuple::{IndexDescriptor, IndexTuple, Key};
use crate::scan::{IndexScanIter, SequentialIter};
use crate::schema::{RAMTuple, Schema};
use crate::table_space::TableSpace;
use crate::txn::LookupSnapshot;
use crate::types::{ColumnDesc, Csn, RowId, TableId, INVALID_CSN};
use crate::undo::UndoLog;

/// A table's live secondary index: its descriptor (for projection) and
/// the ordered index itself.
struct TableIndex {
    index_id: u32,
    col_ids: Vec<u32>,
    desc: IndexDescriptor,
    index: Arc<Index>,
}

/// A table handle: schema, storage arena, heap, and the indexes built
/// over it. `Catalog::create_table`/`open_or_rebuild` are the only ways
/// to obtain one; DML and scans go through the table rather than the
/// heap directly so index maintenance is never skippable by accident.
pub struct Table {
    table_id: TableId,
    name: String,
    schema: Arc<Schema>,
    table_space: Arc<TableSpace>,
    heap: Heap,
    indexes: Mutex<Vec<TableIndex>>,
    /// Set by `Catalog::drop_table`; a dropped table is no longer
    /// resolvable by new `Catalog::table` lookups, but handles already
    /// cached on a worker thread or held by a caller remain valid until
    /// their last `Arc` clone is dropped (mirrors `nvm_table.h`'s
    /// `IsDropped()`/`RefCount()` pair, using `Arc`'s strong count in
    /// place of a hand-rolled atomic counter).
    dropped: AtomicBool,
}

impl Table {
    pub fn table_id(&self) -> TableId {
        self.table_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.load(Ordering::Acquire)
    }

    fn mark_dropped(&self) {
        self.dropped.store(true, Ordering::Release);
    }

    /// Index ids currently built over this table, in creation order.
    pub fn index_ids(&self) -> Vec<u32> {
        self.indexes.lock().unwrap().iter().map(|ti| ti.index_id).collect()
    }

    fn with_index<R>(&self, index_id: u32, f: impl FnOnce(&TableIndex) -> R) -> Result<R, Error> {
        let indexes = self.indexes.lock().unwrap();
        let ti = indexes
            .iter()
            .find(|ti| ti.index_id == index_id)
            .ok_or(Error::IndexNotFound(index_id))?;
        Ok(f(ti))
    }

    /// Insert a row and publish it into every index built over this
    /// table.
    pub fn heap_insert(&self, creator_csn: Csn, tuple: &RAMTuple) -> Result<RowId, Error> {
        let row_id = self.heap.heap_insert(creator_csn, tuple)?;
        let indexes = self.indexes.lock().unwrap();
        for ti in indexes.iter() {
            insert_index_entry(&self.schema, ti, tuple, row_id, INVALID_CSN)?;
        }
        Ok(row_id)
    }

    pub fn heap_read(&self, row_id: RowId, snapshot: LookupSnapshot) -> Result<(HeapStatus, Option<RAMTuple<'_>>), Error> {
        self.heap.heap_read(row_id, snapshot)
    }

    /// Replace a row's current version and re-key every index: the old
    /// projection is tombstoned at `new_csn`, the new one inserted live.
    pub fn heap_update(&self, row_id: RowId, new_csn: Csn, tuple: &RAMTuple) -> Result<HeapStatus, Error> {
        let current = self.heap.heap_read(row_id, LookupSnapshot::new(Csn::MAX, 0))?;
        let status = self.heap.heap_update(row_id, new_csn, tuple)?;
        if status == HeapStatus::Success {
            if let (HeapStatus::Success, Some(old_tuple)) = current {
                let indexes = self.indexes.lock().unwrap();
                for ti in indexes.iter() {
                    insert_index_entry(&self.schema, ti, &old_tuple, row_id, new_csn)?;
                    insert_index_entry(&self.schema, ti, tuple, row_id, INVALID_CSN)?;
                }
            }
        }
        Ok(status)
    }

    /// Tombstone a row's current version and its index entries at
    /// `delete_csn`.
    pub fn heap_delete(&self, row_id: RowId, delete_csn: Csn) -> Result<HeapStatus, Error> {
        let current = self.heap.heap_read(row_id, LookupSnapshot::new(Csn::MAX, 0))?;
        let status = self.heap.heap_delete(row_id, delete_csn)?;
        if status == HeapStatus::Success {
            if let (HeapStatus::Success, Some(old_tuple)) = current {
                let indexes = self.indexes.lock().unwrap();
                for ti in indexes.iter() {
                    insert_index_entry(&self.schema, ti, &old_tuple, row_id, delete_csn)?;
                }
            }
        }
        Ok(status)
    }

    pub fn heap_upper_row_id(&self) -> RowId {
        self.heap.heap_upper_row_id()
    }

    /// Standalone per-index insert, for adapters that maintain an index
    /// outside the fanned-out table-level DML (e.g. while backfilling a
    /// freshly created index).
    pub fn index_insert(&self, index_id: u32, tuple: &RAMTuple, row_id: RowId) -> Result<(), Error> {
        self.with_index(index_id, |_| ())?;
        let indexes = self.indexes.lock().unwrap();
        let ti = indexes.iter().find(|ti| ti.index_id == index_id).unwrap();
        insert_index_entry(&self.schema, ti, tuple, row_id, INVALID_CSN)
    }

    /// Standalone per-index delete-marker install.
    pub fn index_delete(&self, index_id: u32, tuple: &RAMTuple, row_id: RowId, delete_csn: Csn) -> Result<(), Error> {
        self.with_index(index_id, |_| ())?;
        let indexes = self.indexes.lock().unwrap();
        let ti = indexes.iter().find(|ti| ti.index_id == index_id).unwrap();
        insert_index_entry(&self.schema, ti, tuple, row_id, delete_csn)
    }

    pub fn open_sequential_scan(&self) -> SequentialIter<'_> {
        SequentialIter::new(&self.heap)
    }

    pub fn open_index_scan(
        &self,
        index_id: u32,
        start: Key,
        end: Key,
        snapshot: LookupSnapshot,
        max_range: usize,
        reverse: bool,
    ) -> Result<IndexScanIter, Error> {
        let index = self.with_index(index_id, |ti| Arc::clone(&ti.index))?;
        Ok(IndexScanIter::new(index, start, end, snapshot, max_range, reverse))
    }

    pub fn index_descriptor(&self, index_id: u32) -> Result<IndexDescriptor, Error> {
        self.with_index(index_id, |ti| ti.desc.clone())
    }

    /// Row column-ids an index was built over, in declared order.
    pub fn index_columns(&self, index_id: u32) -> Result<Vec<u32>, Error> {
        self.with_index(index_id, |ti| ti.col_ids.clone())
    }
}

impl Drop for Table {
    fn drop(&mut self) {
        self.table_space.unmount();
    }
}

fn insert_index_entry(schema: &Schema, ti: &TableIndex, tuple: &RAMTuple, row_id: RowId, value_csn: Csn) -> Result<(), Error> {
    let it = IndexTuple::extract_from_tuple(schema, &ti.desc, tuple);
    let key = Key::encode(schema, ti.index_id, &it, row_id);
    ti.index.insert(&key, value_csn)?;
    Ok(())
}

/// Every table gets its own subdirectory of the pool directory, so each
/// table's `TableSpace` takes the pool-directory advisory lock on a
/// distinct file rather than contending with its sibling tables' locks
/// (`TableSpace::create`/`mount` lock once per directory, not once per
/// process).
fn table_dir(pool_dir: &str, name: &str) -> std::path::PathBuf {
    Path::new(pool_dir).join(name)
}

fn oplog_path(pool_dir: &str, name: &str, index_id: u32) -> std::path::PathBuf {
    table_dir(pool_dir, name).join(format!("index_{}.oplog", index_id))
}

thread_local! {
    /// Per-worker mirror of recently resolved table handles, avoiding
    /// the registry lock on the hot DML/scan path (generalises the
    /// original's thread-local row-id-map cache to whole table handles).
    static WORKER_TABLE_CACHE: RefCell<HashMap<TableId, Arc<Table>>> = RefCell::new(HashMap::new());
}

/// Drop every table handle this worker thread has cached. Called from
/// `engine::unregister_worker` when a thread is retiring.
pub fn clear_worker_cache() {
    WORKER_TABLE_CACHE.with(|cache| cache.borrow_mut().clear());
}

/// Registry of live tables: owns table creation/mount/drop and index
/// creation, and resolves a `TableId` to its live handle.
pub struct Catalog {
    pool_dir: String,
    undo: Arc<dyn UndoLog>,
    next_table_id: AtomicU32,
    next_index_id: AtomicU32,
    tables: Mutex<HashMap<TableId, Arc<Table>>>,
}

impl Catalog {
    pub fn new(pool_dir: &str, undo: Arc<dyn UndoLog>) -> Catalog {
        Catalog {
            pool_dir: pool_dir.to_string(),
            undo,
            next_table_id: AtomicU32::new(0),
            next_index_id: AtomicU32::new(0),
            tables: Mutex::new(HashMap::new()),
        }
    }

    /// Create a brand-new table with a fresh storage arena.
    pub fn create_table(&self, name: &str, columns: Vec<ColumnDesc>) -> Result<Arc<Table>, Error> {
        let table_id = self.next_table_id.fetch_add(1, Ordering::AcqRel) + 1;
        let dir = table_dir(&self.pool_dir, name);
        let dir_str = dir.to_str().ok_or_else(|| Error::InvalidFile(dir.display().to_string()))?;
        let table_space = TableSpace::create(dir_str, "heap")?;
        table_space.allocate_extent()?;
        let schema = Arc::new(Schema::new(columns)?);
        let table_space = Arc::new(table_space);
        let heap = Heap::new(table_id, Arc::clone(&schema), Arc::clone(&table_space), Arc::clone(&self.undo));
        let table = Arc::new(Table {
            table_id,
            name: name.to_string(),
            schema,
            table_space,
            heap,
            indexes: Mutex::new(Vec::new()),
            dropped: AtomicBool::new(false),
        });
        self.tables.lock().unwrap().insert(table_id, Arc::clone(&table));
        log::info!(target: "catalog", "created table {} ({:?})", table_id, name);
        Ok(table)
    }

    /// Mount an existing table's arena and rebuild its indexes: replay
    /// each index's operation log, then walk every live row and
    /// re-insert it. The scan is idempotent on an already-current
    /// index (re-inserting a key already at the right value is a
    /// no-op), so there is no harm running it unconditionally rather
    /// than trying to detect whether replay alone sufficed.
    pub fn open_or_rebuild(
        &self,
        table_id: TableId,
        name: &str,
        columns: Vec<ColumnDesc>,
        index_specs: &[(u32, Vec<u32>)],
    ) -> Result<Arc<Table>, Error> {
        let dir = table_dir(&self.pool_dir, name);
        let dir_str = dir.to_str().ok_or_else(|| Error::InvalidFile(dir.display().to_string()))?;
        let table_space = TableSpace::mount(dir_str, "heap")?;
        let schema = Arc::new(Schema::new(columns)?);
        let table_space = Arc::new(table_space);
        let heap = Heap::new(table_id, Arc::clone(&schema), Arc::clone(&table_space), Arc::clone(&self.undo));

        let mut indexes = Vec::with_capacity(index_specs.len());
        for (index_id, col_ids) in index_specs {
            let desc = IndexDescriptor::new(&schema, col_ids, crate::config::DEFAULT_KEY_DATA_LENGTH)?;
            let index = Index::with_oplog(*index_id, oplog_path(&self.pool_dir, name, *index_id))?;
            index.replay()?;
            indexes.push(TableIndex {
                index_id: *index_id,
                col_ids: col_ids.clone(),
                desc,
                index: Arc::new(index),
            });
        }

        let table = Arc::new(Table {
            table_id,
            name: name.to_string(),
            schema,
            table_space,
            heap,
            indexes: Mutex::new(indexes),
            dropped: AtomicBool::new(false),
        });
        backfill_all_indexes(&table)?;
        self.next_table_id.fetch_max(table_id + 1, Ordering::AcqRel);
        self.tables.lock().unwrap().insert(table_id, Arc::clone(&table));
        log::info!(target: "catalog", "mounted table {} ({:?}) with {} indexes", table_id, name, index_specs.len());
        Ok(table)
    }

    /// Build a new secondary index over `table` and backfill it from
    /// every row currently visible in the heap.
    pub fn create_index(&self, table: &Arc<Table>, col_ids: &[u32]) -> Result<u32, Error> {
        let index_id = self.next_index_id.fetch_add(1, Ordering::AcqRel) + 1;
        let desc = IndexDescriptor::new(&table.schema, col_ids, crate::config::DEFAULT_KEY_DATA_LENGTH)?;
        let index = Index::with_oplog(index_id, oplog_path(&self.pool_dir, &table.name, index_id))?;
        let ti = TableIndex {
            index_id,
            col_ids: col_ids.to_vec(),
            desc,
            index: Arc::new(index),
        };
        table.indexes.lock().unwrap().push(ti);
        backfill_index(table, index_id)?;
        log::info!(target: "catalog", "created index {} on table {} over columns {:?}", index_id, table.table_id, col_ids);
        Ok(index_id)
    }

    pub fn drop_index(&self, table: &Arc<Table>, index_id: u32) -> Result<(), Error> {
        let mut indexes = table.indexes.lock().unwrap();
        let before = indexes.len();
        indexes.retain(|ti| ti.index_id != index_id);
        if indexes.len() == before {
            return Err(Error::IndexNotFound(index_id));
        }
        log::info!(target: "catalog", "dropped index {} on table {}", index_id, table.table_id);
        Ok(())
    }

    /// Remove `table_id` from the registry and mark it dropped. A
    /// handle already resolved by a caller or cached on a worker thread
    /// stays valid; the table itself is only destroyed once every
    /// remaining `Arc<Table>` clone is gone.
    pub fn drop_table(&self, table_id: TableId) -> Result<(), Error> {
        let table = self
            .tables
            .lock()
            .unwrap()
            .remove(&table_id)
            .ok_or(Error::TableNotFound(table_id))?;
        table.mark_dropped();
        log::info!(target: "catalog", "dropped table {}", table_id);
        Ok(())
    }

    /// Resolve a table handle, consulting (and populating) this
    /// thread's local cache before taking the registry lock.
    pub fn table(&self, table_id: TableId) -> Result<Arc<Table>, Error> {
        if let Some(cached) = WORKER_TABLE_CACHE.with(|cache| cache.borrow().get(&table_id).cloned()) {
            if !cached.is_dropped() {
                return Ok(cached);
            }
        }
        let table = self
            .tables
            .lock()
            .unwrap()
            .get(&table_id)
            .cloned()
            .ok_or(Error::TableNotFound(table_id))?;
        WORKER_TABLE_CACHE.with(|cache| cache.borrow_mut().insert(table_id, Arc::clone(&table)));
        Ok(table)
    }
}

fn backfill_index(table: &Arc<Table>, index_id: u32) -> Result<(), Error> {
    let mut it = table.open_sequential_scan();
    let snapshot = LookupSnapshot::new(Csn::MAX, 0);
    while it.valid() {
        let row_id = it.curr();
        let (status, tuple) = table.heap_read(row_id, snapshot)?;
        if status == HeapStatus::Success {
            table.index_insert(index_id, &tuple.unwrap(), row_id)?;
        }
        it.next();
    }
    Ok(())
}

fn backfill_all_indexes(table: &Arc<Table>) -> Result<(), Error> {
    let index_ids = table.index_ids();
    for index_id in index_ids {
        backfill_index(table, index_id)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "catalog_test.rs"]
mod catalog_test;
