//! Row-id map (C4, spec.md §4.4): a segmented, lock-free-growable
//! directory from row-id to `(persistent address, DRAM cache slot)`.
//!
//! Grounded directly in the original `nvm_rowid_map.cpp`'s two-phase
//! extend-version protocol: growers publish a new top-level array
//! between two fence-ordered flag bumps, readers double-read the flag
//! around their pointer load and retry on a torn observation.

use std::sync::atomic::{AtomicBool, AtomicPtr, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::{DEFAULT_EXTEND_FACTOR, DEFAULT_SEG_LEN};
use crate::table_space::{PersistentAddr, TableSpace};
use crate::types::RowId;

/// One DRAM cache entry per row (spec.md §3 "Row-id map entry").
pub struct RowIdMapEntry {
    valid: AtomicBool,
    latch: AtomicBool,
    nvm_addr: AtomicU64,
    /// Address of an optional DRAM-cached decoded copy; `0` = none.
    /// Modeled as an opaque handle, not an owned pointer, since the
    /// decoded-row cache itself is outside this component's scope.
    dram_cache: AtomicU64,
    flags: AtomicU32,
}

impl Default for RowIdMapEntry {
    fn default() -> RowIdMapEntry {
        RowIdMapEntry {
            valid: AtomicBool::new(false),
            latch: AtomicBool::new(false),
            nvm_addr: AtomicU64::new(0),
            dram_cache: AtomicU64::new(0),
            flags: AtomicU32::new(0),
        }
    }
}

impl RowIdMapEntry {
    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn persistent_addr(&self) -> PersistentAddr {
        debug_assert!(self.is_valid(), "persistent_addr read before entry is valid");
        PersistentAddr(self.nvm_addr.load(Ordering::Relaxed))
    }

    pub fn set_persistent_addr(&self, addr: PersistentAddr) {
        debug_assert!(self.is_valid(), "persistent_addr write on an unpublished entry");
        self.nvm_addr.store(addr.0, Ordering::Relaxed);
    }

    pub fn dram_cache(&self) -> u64 {
        self.dram_cache.load(Ordering::Relaxed)
    }

    pub fn set_dram_cache(&self, v: u64) {
        self.dram_cache.store(v, Ordering::Relaxed);
    }

    fn lock(&self) {
        // One-shot init latch: brief spin, never held across I/O.
        while self
            .latch
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            std::hint::spin_loop();
        }
    }

    fn unlock(&self) {
        self.latch.store(false, Ordering::Release);
    }
}

type Segment = Box<[RowIdMapEntry]>;

/// Segmented directory: `segments[row_id / SEG_LEN][row_id % SEG_LEN]`.
/// Growth replaces the top-level array; existing segment pointers are
/// never relocated once allocated (spec.md §4.4 invariant).
pub struct RowIdMap {
    table_space: Arc<TableSpace>,
    seg_len: usize,
    extend_factor: usize,
    row_len: u64,
    segments: AtomicPtr<Vec<AtomicPtr<Segment>>>,
    segment_capacity: AtomicU64,
    extend_version: AtomicU32,
    grow_mutex: Mutex<()>,
}

impl RowIdMap {
    pub fn new(table_space: Arc<TableSpace>, row_len: u64) -> RowIdMap {
        let initial_cap = 1usize;
        let top: Vec<AtomicPtr<Segment>> = (0..initial_cap).map(|_| AtomicPtr::new(std::ptr::null_mut())).collect();
        RowIdMap {
            table_space,
            seg_len: DEFAULT_SEG_LEN,
            extend_factor: DEFAULT_EXTEND_FACTOR,
            row_len,
            segments: AtomicPtr::new(Box::into_raw(Box::new(top))),
            segment_capacity: AtomicU64::new(initial_cap as u64),
            extend_version: AtomicU32::new(0),
            grow_mutex: Mutex::new(()),
        }
    }

    pub fn row_len(&self) -> u64 {
        self.row_len
    }

    fn top(&self) -> &Vec<AtomicPtr<Segment>> {
        // SAFETY: the top array is replaced, never freed, until a new
        // one is published (see `extend`); we never drop the old one
        // until after the swap, and callers only ever observe a
        // currently-published pointer through this accessor while
        // holding no borrow across an `extend`.
        unsafe { &*self.segments.load(Ordering::Acquire) }
    }

    /// Readers race with a grower replacing the top-level array;
    /// the double read of `extend_version` around the pointer load
    /// guarantees the observed segment pointer is from a stable array
    /// (spec.md §4.4 "Concurrent growth protocol").
    fn get_segment(&self, seg_id: usize) -> &Segment {
        loop {
            if seg_id >= self.segment_capacity.load(Ordering::Acquire) as usize {
                self.extend(seg_id);
                continue;
            }
            let v1 = self.extend_version.load(Ordering::Acquire);
            let top = self.top();
            let seg_ptr = top[seg_id].load(Ordering::Acquire);
            let v2 = self.extend_version.load(Ordering::Acquire);
            if seg_ptr.is_null() {
                self.extend(seg_id);
                continue;
            }
            if v1 == v2 {
                // SAFETY: segment pointers are allocated once and never
                // freed or relocated for the lifetime of the map.
                return unsafe { &*seg_ptr };
            }
            // torn read across a top-array swap: retry.
        }
    }

    fn extend(&self, seg_id: usize) {
        let _guard = self.grow_mutex.lock().unwrap();

        // Someone else may have grown the top array already.
        if seg_id >= self.segment_capacity.load(Ordering::Acquire) as usize {
            let old_cap = self.segment_capacity.load(Ordering::Acquire) as usize;
            let mut new_cap = old_cap.max(1) * self.extend_factor;
            while new_cap <= seg_id {
                new_cap *= self.extend_factor;
            }
            let old_top_ptr = self.segments.load(Ordering::Acquire);
            let old_top = unsafe { &*old_top_ptr };
            let mut new_top: Vec<AtomicPtr<Segment>> = Vec::with_capacity(new_cap);
            for slot in old_top.iter() {
                new_top.push(AtomicPtr::new(slot.load(Ordering::Acquire)));
            }
            for _ in old_top.len()..new_cap {
                new_top.push(AtomicPtr::new(std::ptr::null_mut()));
            }

            // Set-flag phase.
            self.extend_version.fetch_add(1, Ordering::AcqRel);
            let new_top_ptr = Box::into_raw(Box::new(new_top));
            self.segments.store(new_top_ptr, Ordering::Release);
            // Reset-flag phase: any in-flight reader whose double-read
            // straddles this swap observes a version mismatch and
            // retries rather than trusting a torn pointer.
            self.extend_version.fetch_add(1, Ordering::AcqRel);
            self.segment_capacity.store(new_cap as u64, Ordering::Release);

            // Deallocate the old top array after the flag transition
            // (spec.md step 5). Segment pointers it held are copied
            // into the new array above, so this only frees the
            // directory, never a segment.
            unsafe {
                drop(Box::from_raw(old_top_ptr));
            }
            log::debug!(target: "rowid_map", "grew top array from {} to {} segments", old_cap, new_cap);
        }

        // Materialise the segment itself if still missing.
        let top = self.top();
        if top[seg_id].load(Ordering::Acquire).is_null() {
            let seg: Segment = (0..self.seg_len).map(|_| RowIdMapEntry::default()).collect();
            let seg_ptr = Box::into_raw(Box::new(seg));
            if top[seg_id]
                .compare_exchange(std::ptr::null_mut(), seg_ptr, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // Another thread materialised it first; drop ours.
                unsafe {
                    drop(Box::from_raw(seg_ptr));
                }
            }
        }
    }

    /// Materialise and return the entry for `row_id`, lazily binding
    /// it to its persistent address on first access.
    ///
    /// When `is_read` is true and no persistent version exists for
    /// `row_id`, returns `None` ("no such row"); when false (an insert
    /// path establishing a brand-new row), the caller is expected to
    /// have already published the row's persistent address via
    /// `TableSpace::set_version_point` before calling this.
    pub fn get_entry(&self, row_id: RowId, is_read: bool) -> Option<&RowIdMapEntry> {
        let seg_id = row_id as usize / self.seg_len;
        let intra = row_id as usize % self.seg_len;
        let segment = self.get_segment(seg_id);
        let entry = &segment[intra];

        if !entry.is_valid() {
            let nvm_addr = match self.table_space.version_point(row_id) {
                Some(a) => a,
                None => {
                    if is_read {
                        return None;
                    }
                    // Write path materialising a new row: the caller
                    // publishes the address to the table-space first.
                    panic!("get_entry(is_read=false) called before version_point was published for row {}", row_id);
                }
            };
            entry.lock();
            if !entry.is_valid() {
                entry.nvm_addr.store(nvm_addr.0, Ordering::Relaxed);
                entry.dram_cache.store(0, Ordering::Relaxed);
                entry.flags.store(0, Ordering::Relaxed);
                // Release fence orders the address store before the
                // validity publication (spec.md §4.4, §5 ordering
                // guarantee).
                entry.valid.store(true, Ordering::Release);
            }
            entry.unlock();
        }
        std::sync::atomic::fence(Ordering::Acquire);
        Some(entry)
    }
}

impl Drop for RowIdMap {
    fn drop(&mut self) {
        let top_ptr = self.segments.load(Ordering::Acquire);
        let top = unsafe { Box::from_raw(top_ptr) };
        for slot in top.iter() {
            let p = slot.load(Ordering::Acquire);
            if !p.is_null() {
                unsafe {
                    drop(Box::from_raw(p));
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "rowid_map_test.rs"]
mod rowid_map_test;
