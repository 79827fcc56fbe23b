//! Ordered index (C6, spec.md §4.6): an encoded-key ordered store with
//! point lookup, snapshot-aware range scan, and crash recovery through
//! an append-only operation log.
//!
//! Structural mutation is serialised by a `RwLock`; scans take the read
//! side and never block each other or block on an in-flight insert for
//! longer than the structural-commit critical section. Memory
//! reclamation for index readers racing a (future) lock-free
//! replacement is modeled through `crossbeam-epoch` registration, kept
//! at the surface even though the `BTreeMap` backing this version
//! reclaims through ordinary drop, so callers can be written once
//! against the eventual lock-free structure.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use crc::{Crc, CRC_32_ISO_HDLC};
use crossbeam_epoch::{Collector, LocalHandle};

use crate::error::Error;
use crate::index_tuple::Key;
use crate::txn::LookupSnapshot;
use crate::types::{Csn, INVALID_CSN};

/// Named checkpoints a white-box fault-injection hook can observe
/// (spec.md §4.6 "A white-box breakpoint facility").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultPoint {
    BeforeOpLogAppend,
    AfterOpLogAppend,
    BeforeStructuralCommit,
}

const OP_INSERT: u8 = 1;

const OPLOG_CRC: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

struct OpLog {
    path: Option<PathBuf>,
    file: Option<File>,
}

impl OpLog {
    fn disabled() -> OpLog {
        OpLog { path: None, file: None }
    }

    fn open(path: PathBuf) -> Result<OpLog, Error> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(OpLog {
            path: Some(path),
            file: Some(file),
        })
    }

    /// Record layout: `[op:1][klen:4][key:klen][csn:8][crc32:4]`. The
    /// trailing checksum covers everything before it, so a record torn
    /// by a mid-write crash (spec.md §4.6 "tolerates mid-operation
    /// process restart") is detectable rather than silently misread.
    fn append(&mut self, key: &Key, value_csn: Csn) -> Result<(), Error> {
        let file = match self.file.as_mut() {
            Some(f) => f,
            None => return Ok(()),
        };
        let mut rec = Vec::with_capacity(1 + 4 + key.len() + 8 + 4);
        rec.push(OP_INSERT);
        rec.extend_from_slice(&(key.len() as u32).to_le_bytes());
        rec.extend_from_slice(&key.0);
        rec.extend_from_slice(&value_csn.to_le_bytes());
        let crc = OPLOG_CRC.checksum(&rec);
        rec.extend_from_slice(&crc.to_le_bytes());
        file.write_all(&rec)?;
        file.sync_data()?;
        Ok(())
    }

    /// Read every well-formed record logged so far, in append order.
    /// Stops at the first record whose header claims more bytes than
    /// remain, or whose checksum doesn't match: both are the signature
    /// of a record partially written when the process crashed, never
    /// of a record this `OpLog` itself produced successfully. The log
    /// is append-only, so a bad record can only ever be the last one.
    fn read_all(path: &Path) -> Result<Vec<(Key, Csn)>, Error> {
        let mut file = match File::open(path) {
            Ok(f) => f,
            Err(ref e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut buf = Vec::new();
        file.read_to_end(&mut buf)?;
        let mut out = Vec::new();
        let mut pos = 0usize;
        while pos < buf.len() {
            match Self::read_one(&buf, pos) {
                Some((key, csn, next)) => {
                    out.push((key, csn));
                    pos = next;
                }
                None => {
                    log::warn!(
                        target: "index",
                        "op-log {} has a torn or corrupt tail record at offset {}, truncating replay there",
                        path.display(),
                        pos
                    );
                    break;
                }
            }
        }
        Ok(out)
    }

    fn read_one(buf: &[u8], pos: usize) -> Option<(Key, Csn, usize)> {
        const HEADER_LEN: usize = 1 + 4;
        if pos + HEADER_LEN > buf.len() {
            return None;
        }
        let klen = u32::from_le_bytes(buf[pos + 1..pos + 5].try_into().unwrap()) as usize;
        let body_len = HEADER_LEN + klen + 8;
        let rec_len = body_len + 4;
        if pos + rec_len > buf.len() {
            return None;
        }
        let body = &buf[pos..pos + body_len];
        let want_crc = u32::from_le_bytes(buf[pos + body_len..pos + rec_len].try_into().unwrap());
        if OPLOG_CRC.checksum(body) != want_crc {
            return None;
        }
        let key = Key(buf[pos + HEADER_LEN..pos + HEADER_LEN + klen].to_vec());
        let csn = u64::from_le_bytes(buf[pos + HEADER_LEN + klen..pos + body_len].try_into().unwrap());
        Some((key, csn, pos + rec_len))
    }

    /// Drop every record already reflected in the tree, called once
    /// replay succeeds at mount time.
    fn truncate(&mut self) -> Result<(), Error> {
        if let Some(path) = &self.path {
            self.file = None;
            let file = OpenOptions::new().create(true).write(true).truncate(true).open(path)?;
            drop(file);
            self.file = Some(OpenOptions::new().append(true).open(path)?);
        }
        Ok(())
    }
}

/// A worker's registration with an index's epoch-based reclamation
/// group (spec.md §4.6 `register_thread`/`unregister_thread`).
pub struct IndexWorker {
    group_id: u32,
    handle: LocalHandle,
}

impl IndexWorker {
    pub fn group_id(&self) -> u32 {
        self.group_id
    }

    pub fn pin(&self) -> crossbeam_epoch::Guard {
        self.handle.pin()
    }

    /// Detach from the reclamation group (spec.md `unregister_thread`).
    pub fn unregister_thread(self) {}
}

pub struct Index {
    index_id: u32,
    tree: RwLock<BTreeMap<Vec<u8>, Csn>>,
    oplog: Mutex<OpLog>,
    collector: Collector,
    fault: Mutex<Option<Box<dyn Fn(FaultPoint) + Send + Sync>>>,
}

impl Index {
    /// Build an index with no durable op-log; useful for tests and for
    /// secondary indexes rebuilt wholesale on every mount.
    pub fn new(index_id: u32) -> Index {
        Index {
            index_id,
            tree: RwLock::new(BTreeMap::new()),
            oplog: Mutex::new(OpLog::disabled()),
            collector: Collector::new(),
            fault: Mutex::new(None),
        }
    }

    /// Build an index whose structural mutations are logged to
    /// `oplog_path` before commit (spec.md §4.6 "Crash recovery").
    pub fn with_oplog<P: AsRef<Path>>(index_id: u32, oplog_path: P) -> Result<Index, Error> {
        Ok(Index {
            index_id,
            tree: RwLock::new(BTreeMap::new()),
            oplog: Mutex::new(OpLog::open(oplog_path.as_ref().to_path_buf())?),
            collector: Collector::new(),
            fault: Mutex::new(None),
        })
    }

    pub fn index_id(&self) -> u32 {
        self.index_id
    }

    /// Re-apply every operation-log record not yet reflected in the
    /// tree, then truncate the log. Called once at mount time.
    pub fn replay(&self) -> Result<(), Error> {
        let mut oplog = self.oplog.lock().unwrap();
        let path = match &oplog.path {
            Some(p) => p.clone(),
            None => return Ok(()),
        };
        let records = OpLog::read_all(&path)?;
        if records.is_empty() {
            return Ok(());
        }
        let mut tree = self.tree.write().unwrap();
        for (key, csn) in &records {
            tree.insert(key.0.clone(), *csn);
        }
        drop(tree);
        oplog.truncate()?;
        log::info!(target: "index", "index {} replayed {} op-log records", self.index_id, records.len());
        Ok(())
    }

    /// Install a white-box fault hook invoked at each named checkpoint
    /// during `insert` (test-only; a no-op hook costs one branch).
    pub fn set_fault<F>(&self, hook: F)
    where
        F: Fn(FaultPoint) + Send + Sync + 'static,
    {
        *self.fault.lock().unwrap() = Some(Box::new(hook));
    }

    fn fire(&self, point: FaultPoint) {
        if let Some(hook) = self.fault.lock().unwrap().as_ref() {
            hook(point);
        }
    }

    /// Insert `(key, value_csn)`. If `key` already exists its value is
    /// overwritten (the mechanism used to install a delete-marker CSN
    /// on an existing entry) and `true` is returned; otherwise the pair
    /// is inserted fresh and `false` is returned (spec.md §4.6
    /// `insert`).
    pub fn insert(&self, key: &Key, value_csn: Csn) -> Result<bool, Error> {
        self.fire(FaultPoint::BeforeOpLogAppend);
        self.oplog.lock().unwrap().append(key, value_csn)?;
        self.fire(FaultPoint::AfterOpLogAppend);
        self.fire(FaultPoint::BeforeStructuralCommit);
        let mut tree = self.tree.write().unwrap();
        let existed = tree.insert(key.0.clone(), value_csn).is_some();
        Ok(existed)
    }

    pub fn lookup(&self, key: &Key) -> (Csn, bool) {
        let tree = self.tree.read().unwrap();
        match tree.get(&key.0) {
            Some(&csn) => (csn, true),
            None => (INVALID_CSN, false),
        }
    }

    /// Whether a scanned entry is visible to `snapshot` (spec.md §4.6
    /// scan filter): live entries always pass; tombstoned entries pass
    /// only when their delete CSN falls outside the caller's visible
    /// delete horizon `(min_csn, snapshot]`.
    fn visible(value_csn: Csn, snapshot: &LookupSnapshot) -> bool {
        value_csn == INVALID_CSN || !(value_csn > snapshot.min_csn && value_csn <= snapshot.snapshot)
    }

    /// Collect up to `max` (`0` = unbounded) visible pairs with keys in
    /// `[start, end]`, ascending unless `reverse` (spec.md §4.6 `scan`).
    pub fn scan(
        &self,
        start: &Key,
        end: &Key,
        max: usize,
        snapshot: &LookupSnapshot,
        reverse: bool,
        out_pairs: &mut Vec<(Key, Csn)>,
    ) {
        let tree = self.tree.read().unwrap();
        let limit = if max == 0 { usize::MAX } else { max };
        let range = tree.range(start.0.as_slice()..=end.0.as_slice());
        if reverse {
            for (k, &v) in range.rev() {
                if out_pairs.len() >= limit {
                    break;
                }
                if Self::visible(v, snapshot) {
                    out_pairs.push((Key(k.clone()), v));
                }
            }
        } else {
            for (k, &v) in range {
                if out_pairs.len() >= limit {
                    break;
                }
                if Self::visible(v, snapshot) {
                    out_pairs.push((Key(k.clone()), v));
                }
            }
        }
    }

    /// Attach a worker thread to reclamation group `group_id` (spec.md
    /// §4.6 `register_thread`).
    pub fn register_thread(&self, group_id: u32) -> IndexWorker {
        IndexWorker {
            group_id,
            handle: self.collector.register(),
        }
    }
}

#[cfg(test)]
#[path = "index_test.rs"]
mod index_test;
