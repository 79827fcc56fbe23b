//! Transaction and snapshot contracts consumed, not implemented, by
//! this crate (spec.md §1 scope note, §6 "Consumed from the
//! transaction subsystem"). A minimal trait plus a test double let
//! the engine compile and be exercised independently of a real
//! transaction manager.

use crate::types::Csn;

/// Transaction lifecycle state a core call may observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Active,
    Committed,
    Aborted,
    /// Caller has requested abort but the abort hasn't completed; any
    /// core call on such a transaction fails (spec.md §5
    /// "Cancellation & timeouts").
    WaitAbort,
}

/// The subset of transaction behavior the storage core depends on.
/// Begin/commit/abort mechanics themselves live outside this crate.
pub trait Transaction {
    fn status(&self) -> TxStatus;
    /// Valid only once the transaction has committed.
    fn commit_csn(&self) -> Csn;
}

/// MVCC visibility horizon handed to index scans and heap reads
/// (spec.md §3 "Snapshot").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LookupSnapshot {
    /// Upper bound on visible commits.
    pub snapshot: Csn,
    /// Lower bound used to prune retained delete markers.
    pub min_csn: Csn,
}

impl LookupSnapshot {
    pub fn new(snapshot: Csn, min_csn: Csn) -> LookupSnapshot {
        LookupSnapshot { snapshot, min_csn }
    }

    /// MVCC visibility rule (spec.md §4.5): a version created at
    /// `creator` and (optionally) deleted at `deleter` is visible to
    /// this snapshot iff it was created no later than the snapshot and
    /// either never deleted or deleted strictly after it.
    pub fn sees(&self, creator: Csn, deleter: Option<Csn>) -> bool {
        creator <= self.snapshot && deleter.map_or(true, |d| d > self.snapshot)
    }
}

/// A trivial `Transaction` implementation for tests and for embedding
/// contexts that don't yet have a real transaction manager wired in.
pub struct SimpleTransaction {
    status: TxStatus,
    commit_csn: Csn,
}

impl SimpleTransaction {
    pub fn new() -> SimpleTransaction {
        SimpleTransaction {
            status: TxStatus::Active,
            commit_csn: 0,
        }
    }

    pub fn commit(&mut self, csn: Csn) {
        self.commit_csn = csn;
        self.status = TxStatus::Committed;
    }

    pub fn abort(&mut self) {
        self.status = TxStatus::Aborted;
    }
}

impl Default for SimpleTransaction {
    fn default() -> SimpleTransaction {
        SimpleTransaction::new()
    }
}

impl Transaction for SimpleTransaction {
    fn status(&self) -> TxStatus {
        self.status
    }

    fn commit_csn(&self) -> Csn {
        self.commit_csn
    }
}
