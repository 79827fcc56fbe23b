//! `nvmdb` is the storage core backing a SQL foreign-data integration:
//! transactional create/read/update/delete on typed rows, secondary
//! and primary indexing, and MVCC snapshots suitable for OLTP
//! workloads such as TPC-C.
//!
//! The crate is organised bottom-up, leaves first:
//!
//! - [`codec`] — order-preserving byte encoding for index keys (C1).
//! - [`types`], [`schema`] — the closed column-type palette and typed
//!   row layout (C2).
//! - [`table_space`] — fixed-size extents over a directory-backed
//!   arena (C3).
//! - [`rowid_map`] — the segmented, lock-free-growable row-id
//!   directory (C4).
//! - [`heap`] — MVCC row read/insert/update/delete (C5).
//! - [`index_tuple`] — index descriptors, projection, and key
//!   encoding, sitting between C2 and C6.
//! - [`index`] — the durable ordered index: insert, lookup,
//!   snapshot-aware scan, crash recovery (C6).
//! - [`scan`] — batched range iteration over [`index`] and a
//!   sequential heap walk (C7).
//! - [`catalog`] — the table/index registry tying the above together,
//!   plus per-table DML that fans a mutation out to every declared
//!   index (C8).
//! - [`engine`] — process lifecycle: pool init/mount, worker
//!   registration, and the optional process-wide singleton.
//!
//! [`txn`] and [`undo`] define the narrow contracts this crate
//! consumes from the transaction and undo/redo subsystems (spec §1
//! scope note) rather than implementing them.

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: jemallocator::Jemalloc = jemallocator::Jemalloc;

pub mod catalog;
pub mod codec;
pub mod config;
pub mod engine;
pub mod error;
pub mod heap;
pub mod index;
pub mod index_tuple;
pub mod rowid_map;
pub mod scan;
pub mod schema;
pub mod table_space;
pub mod txn;
pub mod types;
pub mod undo;
mod util;

pub use crate::catalog::{Catalog, Table};
pub use crate::engine::Engine;
pub use crate::error::{Error, Result};
pub use crate::heap::HeapStatus;
pub use crate::schema::{RAMTuple, Schema};
pub use crate::txn::{LookupSnapshot, Transaction, TxStatus};
pub use crate::types::{ColumnDesc, ColumnType, Csn, RowId, TableId, INVALID_CSN, INVALID_ROW_ID};
