//! Scan iterator (C7, spec.md §4.7): a batched, snapshot-consistent
//! range cursor over an ordered index, plus the sequential heap
//! iterator used when no index applies to a predicate.

use std::sync::Arc;

use crate::config::DEFAULT_BATCH;
use crate::heap::Heap;
use crate::index::Index;
use crate::index_tuple::Key;
use crate::txn::LookupSnapshot;
use crate::types::{Csn, RowId, INVALID_ROW_ID};

/// Range iterator over `Index`, batching fetches and extending the
/// range via `successor`/`predecessor` continuation when unbounded
/// (spec.md §4.7). Owns a clone of the index's `Arc` rather than
/// borrowing it so a catalog can hand out an iterator without pinning
/// a lock guard on the table's index registry for the iterator's
/// lifetime.
pub struct IndexScanIter {
    index: Arc<Index>,
    cursor_start: Key,
    cursor_end: Key,
    snapshot: LookupSnapshot,
    max_range: usize,
    reverse: bool,
    batch: Vec<(Key, Csn)>,
    pos: usize,
    emitted: usize,
    done: bool,
}

impl IndexScanIter {
    /// `max_range == 0` means unbounded (spec.md §4.7 "Construction").
    pub fn new(
        index: Arc<Index>,
        start: Key,
        end: Key,
        snapshot: LookupSnapshot,
        max_range: usize,
        reverse: bool,
    ) -> IndexScanIter {
        let mut it = IndexScanIter {
            index,
            cursor_start: start,
            cursor_end: end,
            snapshot,
            max_range,
            reverse,
            batch: Vec::new(),
            pos: 0,
            emitted: 0,
            done: false,
        };
        it.fill_batch();
        it
    }

    fn remaining_budget(&self) -> usize {
        if self.max_range == 0 {
            usize::MAX
        } else {
            self.max_range.saturating_sub(self.emitted)
        }
    }

    fn fill_batch(&mut self) {
        self.batch.clear();
        self.pos = 0;
        if self.done {
            return;
        }
        let want = self.remaining_budget().min(DEFAULT_BATCH);
        if want == 0 {
            self.done = true;
            return;
        }
        self.index
            .scan(&self.cursor_start, &self.cursor_end, want, &self.snapshot, self.reverse, &mut self.batch);

        if self.batch.is_empty() {
            self.done = true;
            return;
        }
        if self.batch.len() < want {
            // Fewer entries than asked for: the range is exhausted, a
            // bounded iterator also terminates here.
            self.done = true;
            return;
        }
        // A full batch: extend the range for the next fetch. A bounded
        // iterator still needs this so later batches continue from
        // where this one left off.
        let last = &self.batch[self.batch.len() - 1].0;
        let next_bound = if self.reverse { last.predecessor() } else { last.successor() };
        match next_bound {
            Some(bound) => {
                if self.reverse {
                    self.cursor_end = bound;
                } else {
                    self.cursor_start = bound;
                }
            }
            None => self.done = true,
        }
    }

    pub fn valid(&self) -> bool {
        self.pos < self.batch.len()
    }

    pub fn curr(&self) -> RowId {
        self.batch[self.pos].0.row_id()
    }

    pub fn curr_value_csn(&self) -> Csn {
        self.batch[self.pos].1
    }

    pub fn next(&mut self) {
        if !self.valid() {
            return;
        }
        self.pos += 1;
        self.emitted += 1;
        if self.pos >= self.batch.len() && !self.done {
            self.fill_batch();
        }
    }
}

/// A strided walk over `0..heap_upper_row_id(table)` used when no
/// index satisfies a predicate (spec.md §4.7 "sequential iterator").
pub struct SequentialIter<'h> {
    #[allow(dead_code)]
    heap: &'h Heap,
    row_id: RowId,
    upper: RowId,
}

impl<'h> SequentialIter<'h> {
    pub fn new(heap: &'h Heap) -> SequentialIter<'h> {
        SequentialIter {
            heap,
            row_id: INVALID_ROW_ID + 1,
            upper: heap.heap_upper_row_id(),
        }
    }

    pub fn valid(&self) -> bool {
        self.row_id <= self.upper
    }

    pub fn curr(&self) -> RowId {
        self.row_id
    }

    pub fn next(&mut self) {
        self.row_id += 1;
    }
}

#[cfg(test)]
#[path = "scan_test.rs"]
mod scan_test;
