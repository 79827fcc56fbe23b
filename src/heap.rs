//! Heap access (C5, spec.md §4.5): row read/insert/update/delete under
//! MVCC, built on the row-id map (C4) and the table-space arena (C3).
//!
//! The persistent address held by a row-id-map entry is the address of
//! a small, fixed "chain head" slot — stable for the row's lifetime,
//! per spec.md §4.4's invariant ("Once a row-id map entry is marked
//! valid, its persistent address field is immutable"). The slot's
//! *content* (a pointer to the latest version record) does change on
//! every update; version records themselves form a backward-linked
//! chain through `prev_addr`, walked by `heap_read` to find the
//! version visible to a caller's snapshot.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use crate::error::Error;
use crate::rowid_map::RowIdMap;
use crate::schema::{RAMTuple, Schema};
use crate::table_space::{PersistentAddr, TableSpace};
use crate::txn::LookupSnapshot;
use crate::types::{Csn, RowId, TableId};
use crate::undo::{UndoLog, UndoRecord};

const CHAIN_HEAD_LEN: u64 = 8;

struct VersionRecord {
    creator_csn: Csn,
    /// `0` means live (no delete marker installed on this version).
    deleter_csn: Csn,
    prev_addr: u64,
    row_bytes: Vec<u8>,
    nulls: Vec<u8>,
}

impl VersionRecord {
    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(8 + 8 + 8 + 4 + self.row_bytes.len() + self.nulls.len());
        buf.extend_from_slice(&self.creator_csn.to_le_bytes());
        buf.extend_from_slice(&self.deleter_csn.to_le_bytes());
        buf.extend_from_slice(&self.prev_addr.to_le_bytes());
        buf.extend_from_slice(&(self.row_bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(&self.row_bytes);
        buf.extend_from_slice(&self.nulls);
        buf
    }

    fn decode(buf: &[u8], null_bitmap_len: usize) -> VersionRecord {
        let creator_csn = u64::from_le_bytes(buf[0..8].try_into().unwrap());
        let deleter_csn = u64::from_le_bytes(buf[8..16].try_into().unwrap());
        let prev_addr = u64::from_le_bytes(buf[16..24].try_into().unwrap());
        let row_len = u32::from_le_bytes(buf[24..28].try_into().unwrap()) as usize;
        let row_bytes = buf[28..28 + row_len].to_vec();
        let nulls = buf[28 + row_len..28 + row_len + null_bitmap_len].to_vec();
        VersionRecord {
            creator_csn,
            deleter_csn,
            prev_addr,
            row_bytes,
            nulls,
        }
    }

    fn encoded_len(&self) -> u64 {
        (8 + 8 + 8 + 4 + self.row_bytes.len() + self.nulls.len()) as u64
    }

    fn deleter(&self) -> Option<Csn> {
        if self.deleter_csn == 0 {
            None
        } else {
            Some(self.deleter_csn)
        }
    }
}

/// Outcome of a heap read or write-conflict-checked mutation, mirroring
/// spec.md §4.5's `HAM_SUCCESS`/`HAM_NOT_FOUND`/`HAM_CONFLICT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeapStatus {
    Success,
    NotFound,
    Conflict,
}

pub struct Heap {
    table_id: TableId,
    schema: Arc<Schema>,
    table_space: Arc<TableSpace>,
    row_id_map: RowIdMap,
    next_row_id: AtomicU32,
    undo: Arc<dyn UndoLog>,
}

impl Heap {
    /// On a fresh table-space `table_space.max_row_id()` is `0`
    /// (nothing persisted yet); on a mounted one it recovers the
    /// high-water row-id from the durable version directory, so
    /// `heap_upper_row_id` is correct immediately after restart rather
    /// than resetting to zero (spec.md §3 restart lifecycle contract).
    pub fn new(table_id: TableId, schema: Arc<Schema>, table_space: Arc<TableSpace>, undo: Arc<dyn UndoLog>) -> Heap {
        let row_id_map = RowIdMap::new(table_space.clone(), schema.row_len as u64);
        let next_row_id = table_space.max_row_id();
        Heap {
            table_id,
            schema,
            table_space,
            row_id_map,
            next_row_id: AtomicU32::new(next_row_id),
            undo,
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Inclusive upper bound for sequential scans (spec.md §4.5
    /// `heap_upper_row_id`).
    pub fn heap_upper_row_id(&self) -> RowId {
        self.next_row_id.load(Ordering::Acquire)
    }

    fn read_u64(&self, addr: PersistentAddr) -> Result<u64, Error> {
        let bytes = self.table_space.read(addr, 8)?;
        Ok(u64::from_le_bytes(bytes.try_into().unwrap()))
    }

    fn read_version(&self, addr: PersistentAddr) -> Result<VersionRecord, Error> {
        // Read the fixed prefix first to learn the row length, then
        // the full record (row length varies only for tables whose
        // schema changes, which this engine does not support mid-life;
        // in practice it's constant, but we still size from the header
        // rather than assume).
        let prefix = self.table_space.read(addr, 28)?;
        let row_len = u32::from_le_bytes(prefix[24..28].try_into().unwrap()) as usize;
        let total = 28 + row_len + self.schema.null_bitmap_len();
        let bytes = self.table_space.read(addr, total)?;
        Ok(VersionRecord::decode(&bytes, self.schema.null_bitmap_len()))
    }

    /// Allocate a fresh row-id, write the first version through undo,
    /// and materialise the row-id-map entry (spec.md §4.5
    /// `heap_insert`).
    pub fn heap_insert(&self, creator_csn: Csn, tuple: &RAMTuple) -> Result<RowId, Error> {
        let row_id = self.next_row_id.fetch_add(1, Ordering::AcqRel) + 1;

        self.undo.append_before_mutation(UndoRecord {
            table: self.table_id,
            row_id,
            creator_csn: 0,
            row_bytes: Vec::new(),
        });

        let version = VersionRecord {
            creator_csn,
            deleter_csn: 0,
            prev_addr: 0,
            row_bytes: tuple.raw().to_vec(),
            nulls: tuple.nulls_raw().to_vec(),
        };
        let ver_bytes = version.encode();
        let ver_addr = self.table_space.alloc_bytes(version.encoded_len())?;
        self.table_space.write(ver_addr, &ver_bytes)?;

        let head_addr = self.table_space.alloc_bytes(CHAIN_HEAD_LEN)?;
        self.table_space.write(head_addr, &ver_addr.0.to_le_bytes())?;

        self.table_space.set_version_point(row_id, head_addr)?;
        // Materialise the DRAM cache entry now that the durable chain
        // head exists; is_read=false is only reachable on a row this
        // call itself just published.
        self.row_id_map.get_entry(row_id, false);

        Ok(row_id)
    }

    /// Walk the version chain for `row_id`, selecting the version
    /// visible at `snapshot` (spec.md §4.5 `heap_read`).
    pub fn heap_read(&self, row_id: RowId, snapshot: LookupSnapshot) -> Result<(HeapStatus, Option<RAMTuple<'_>>), Error> {
        let entry = match self.row_id_map.get_entry(row_id, true) {
            Some(e) => e,
            None => return Ok((HeapStatus::NotFound, None)),
        };
        let head_addr = entry.persistent_addr();
        let mut cur = self.read_u64(head_addr)?;
        loop {
            if cur == 0 {
                return Ok((HeapStatus::NotFound, None));
            }
            let version = self.read_version(PersistentAddr(cur))?;
            if snapshot.sees(version.creator_csn, version.deleter()) {
                let tuple = RAMTuple::from_raw(self.schema.as_ref(), version.row_bytes.clone(), version.nulls.clone());
                return Ok((HeapStatus::Success, Some(tuple)));
            }
            if version.prev_addr == 0 {
                return Ok((HeapStatus::NotFound, None));
            }
            cur = version.prev_addr;
        }
    }

    /// Create a new version, link it ahead of the prior chain head,
    /// register undo, and detect write-write conflicts (spec.md §4.5
    /// `heap_update`).
    pub fn heap_update(&self, row_id: RowId, new_csn: Csn, tuple: &RAMTuple) -> Result<HeapStatus, Error> {
        let entry = match self.row_id_map.get_entry(row_id, true) {
            Some(e) => e,
            None => return Ok(HeapStatus::NotFound),
        };
        let head_addr = entry.persistent_addr();
        let old_ver_addr = self.read_u64(head_addr)?;
        if old_ver_addr == 0 {
            return Ok(HeapStatus::NotFound);
        }
        let old_version = self.read_version(PersistentAddr(old_ver_addr))?;
        if old_version.deleter().is_some() || old_version.creator_csn >= new_csn {
            log::warn!(
                target: "heap",
                "update conflict on row {} in table {}: new_csn {} does not see the latest version (creator {}, deleted {})",
                row_id,
                self.table_id,
                new_csn,
                old_version.creator_csn,
                old_version.deleter().is_some()
            );
            return Ok(HeapStatus::Conflict);
        }

        self.undo.append_before_mutation(UndoRecord {
            table: self.table_id,
            row_id,
            creator_csn: old_version.creator_csn,
            row_bytes: old_version.row_bytes.clone(),
        });

        let new_version = VersionRecord {
            creator_csn: new_csn,
            deleter_csn: 0,
            prev_addr: old_ver_addr,
            row_bytes: tuple.raw().to_vec(),
            nulls: tuple.nulls_raw().to_vec(),
        };
        let new_bytes = new_version.encode();
        let new_addr = self.table_space.alloc_bytes(new_version.encoded_len())?;
        self.table_space.write(new_addr, &new_bytes)?;
        self.table_space.write(head_addr, &new_addr.0.to_le_bytes())?;

        Ok(HeapStatus::Success)
    }

    /// Tombstone the latest version at `delete_csn` (spec.md §4.5
    /// `heap_delete`).
    pub fn heap_delete(&self, row_id: RowId, delete_csn: Csn) -> Result<HeapStatus, Error> {
        let entry = match self.row_id_map.get_entry(row_id, true) {
            Some(e) => e,
            None => return Ok(HeapStatus::NotFound),
        };
        let head_addr = entry.persistent_addr();
        let ver_addr = self.read_u64(head_addr)?;
        if ver_addr == 0 {
            return Ok(HeapStatus::NotFound);
        }
        let version = self.read_version(PersistentAddr(ver_addr))?;
        if version.deleter().is_some() {
            log::warn!(
                target: "heap",
                "delete conflict on row {} in table {}: row already deleted at csn {}",
                row_id,
                self.table_id,
                version.deleter().unwrap()
            );
            return Ok(HeapStatus::Conflict);
        }

        self.undo.append_before_mutation(UndoRecord {
            table: self.table_id,
            row_id,
            creator_csn: version.creator_csn,
            row_bytes: version.row_bytes.clone(),
        });

        // The deleter CSN lives at byte offset 8 within the version
        // record (see `VersionRecord::encode`).
        self.table_space
            .write(PersistentAddr(ver_addr + 8), &delete_csn.to_le_bytes())?;

        Ok(HeapStatus::Success)
    }
}

#[cfg(test)]
#[path = "heap_test.rs"]
mod heap_test;
