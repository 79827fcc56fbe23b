//! The closed column-type palette (spec.md §3) and the per-column
//! descriptor that a table's schema is built out of.

use serde::{Deserialize, Serialize};

/// A dense row identifier, unique within a table, issued monotonically
/// by the heap. `0` is a reserved sentinel; valid row-ids fall in
/// `[1, i32::MAX)`.
pub type RowId = u32;

/// Reserved sentinel row-id; never issued by `heap_insert`.
pub const INVALID_ROW_ID: RowId = 0;

/// Opaque table identifier, assigned by the catalog at `create_table`.
pub type TableId = u32;

/// Commit sequence number: a 64-bit logical timestamp assigned at
/// transaction commit, used for MVCC visibility.
pub type Csn = u64;

/// `INVALID_CSN` marks a live index entry (no delete marker installed).
pub const INVALID_CSN: Csn = 0;

/// Column-id sentinel returned when a name lookup misses.
pub const INVALID_COL_ID: u32 = u32::MAX;

/// The closed set of column types the engine understands. Mirrors the
/// original `enum ColumnType` (`COL_TYPE_*`) one for one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Char,
    Tiny,
    Short,
    Int,
    Long,
    UnsignedLong,
    Float,
    Double,
    Decimal,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    TimeTz,
    Interval,
    Tinterval,
    Varchar,
    Bpchar,
    Text,
}

impl ColumnType {
    /// Fixed in-row byte width for the types that have one. Varchar-like
    /// types are sized from the column's declared maximum length instead
    /// (`ColumnDesc::col_len` already accounts for the 4-byte prefix in
    /// that case), so they return `None` here.
    pub fn fixed_width(self) -> Option<u32> {
        use ColumnType::*;
        match self {
            Char | Tiny => Some(1),
            Short | TimeTz => Some(2),
            Int | Float | Date | Time => Some(4),
            Long | UnsignedLong | Double | Timestamp | TimestampTz | Interval | Tinterval => {
                Some(8)
            }
            Decimal | Varchar | Bpchar | Text => None,
        }
    }

    /// `true` for the variable-width, length-prefixed types.
    pub fn is_varlen(self) -> bool {
        self.fixed_width().is_none()
    }

    /// Index column support, per spec.md §7 `IndexTypeNotSupported`:
    /// only int32, uint64 and varchar may back an index column.
    pub fn is_index_supported(self) -> bool {
        matches!(self, ColumnType::Int | ColumnType::UnsignedLong | ColumnType::Varchar)
    }
}

/// Describes a single column of a table's row layout.
#[derive(Debug, Clone)]
pub struct ColumnDesc {
    pub col_type: ColumnType,
    /// In-row byte length, including the 4-byte length prefix for
    /// varchar-family columns.
    pub col_len: u32,
    /// Byte offset of this column within the row buffer.
    pub col_offset: u32,
    pub is_not_null: bool,
    pub col_name: String,
}

impl ColumnDesc {
    pub fn new(col_name: &str, col_type: ColumnType, declared_len: u32, is_not_null: bool) -> ColumnDesc {
        let col_len = match col_type.fixed_width() {
            Some(w) => w,
            // varchar-family: declared_len is the max payload, +4 for the
            // length prefix (spec.md §3: "byte length (including 4-byte
            // length prefix for varchar)").
            None => declared_len + 4,
        };
        ColumnDesc {
            col_type,
            col_len,
            col_offset: 0,
            is_not_null,
            col_name: col_name.to_string(),
        }
    }

    /// Payload length for varchar-family columns (excludes the 4-byte
    /// prefix); meaningless for fixed-width types.
    pub fn max_payload_len(&self) -> u32 {
        self.col_len.saturating_sub(4)
    }
}
