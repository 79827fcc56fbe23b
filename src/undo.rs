//! The undo/redo contract the heap writes through (spec.md §6
//! "Consumed from undo/redo"): append-version-before-mutation, log
//! index structural ops, and replay on startup. The implementation
//! itself is out of scope (spec.md §1); this module defines the
//! trait boundary plus two test doubles.

use crate::types::{Csn, RowId, TableId};

/// One previous row version, as handed to the undo log before a
/// mutation overwrites it in place.
#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub table: TableId,
    pub row_id: RowId,
    pub creator_csn: Csn,
    pub row_bytes: Vec<u8>,
}

/// A structural index operation logged for crash recovery (spec.md
/// §4.6 "An operation-log entry is written to persistent memory
/// before any structural mutation is committed").
#[derive(Debug, Clone)]
pub struct IndexOpRecord {
    pub index_id: u32,
    pub key: Vec<u8>,
    pub value_csn: Csn,
}

pub trait UndoLog: Send + Sync {
    /// Record `record` before the heap overwrites the row in place.
    fn append_before_mutation(&self, record: UndoRecord);

    /// Record a structural index mutation before it commits.
    fn log_index_op(&self, record: IndexOpRecord);

    /// Replay everything logged since the last checkpoint. Called once
    /// at mount time by the owning process; a no-op for logs with
    /// nothing pending.
    fn replay_on_startup(&self) {}
}

/// An undo log that records nothing. Suitable when the caller's own
/// transaction manager owns durability and this crate's heap is only
/// asked to route through the contract, not to retain history itself.
pub struct NoopUndoLog;

impl UndoLog for NoopUndoLog {
    fn append_before_mutation(&self, _record: UndoRecord) {}
    fn log_index_op(&self, _record: IndexOpRecord) {}
}

/// An in-memory undo log, useful for independently testing the heap
/// and index modules without a production transaction manager.
#[derive(Default)]
pub struct VecUndoLog {
    rows: std::sync::Mutex<Vec<UndoRecord>>,
    index_ops: std::sync::Mutex<Vec<IndexOpRecord>>,
}

impl VecUndoLog {
    pub fn new() -> VecUndoLog {
        VecUndoLog::default()
    }

    pub fn row_records(&self) -> Vec<UndoRecord> {
        self.rows.lock().unwrap().clone()
    }

    pub fn index_op_records(&self) -> Vec<IndexOpRecord> {
        self.index_ops.lock().unwrap().clone()
    }
}

impl UndoLog for VecUndoLog {
    fn append_before_mutation(&self, record: UndoRecord) {
        self.rows.lock().unwrap().push(record);
    }

    fn log_index_op(&self, record: IndexOpRecord) {
        self.index_ops.lock().unwrap().push(record);
    }
}

#[cfg(test)]
mod undo_test {
    use super::*;

    #[test]
    fn test_vec_undo_log_records() {
        let log = VecUndoLog::new();
        log.append_before_mutation(UndoRecord {
            table: 1,
            row_id: 2,
            creator_csn: 3,
            row_bytes: vec![1, 2, 3],
        });
        log.log_index_op(IndexOpRecord {
            index_id: 9,
            key: vec![1],
            value_csn: 0,
        });
        assert_eq!(log.row_records().len(), 1);
        assert_eq!(log.index_op_records().len(), 1);
    }

    #[test]
    fn test_noop_undo_log() {
        let log = NoopUndoLog;
        log.append_before_mutation(UndoRecord {
            table: 1,
            row_id: 1,
            creator_csn: 0,
            row_bytes: vec![],
        });
        log.replay_on_startup();
    }
}
