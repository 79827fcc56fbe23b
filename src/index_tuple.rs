//! Index descriptors, index-tuple projection, and composite key
//! encoding (C2's projection step plus C6's key layout, spec.md §3-4.2
//! and §4.6).

use crate::codec;
use crate::config;
use crate::error::Error;
use crate::schema::{RAMTuple, Schema};
use crate::types::{ColumnType, RowId};

/// One projected column: which row column it draws from, its in-row
/// byte length, and its offset within the dense index-tuple buffer.
#[derive(Debug, Clone)]
pub struct IndexColumnDesc {
    pub col_id: u32,
    pub col_len: u32,
    pub in_key_offset: u32,
}

/// An ordered sequence of projected columns (spec.md §3 "Index
/// descriptor").
#[derive(Debug, Clone)]
pub struct IndexDescriptor {
    pub columns: Vec<IndexColumnDesc>,
    pub index_len: u32,
}

impl IndexDescriptor {
    /// Build a descriptor from a schema and the row column-ids to
    /// project, in declared order. Validates spec.md §7's
    /// `IndexTypeNotSupported`, `IndexColumnNullable` and
    /// `KeySizeExceeded` up front.
    pub fn new(schema: &Schema, col_ids: &[u32], key_data_length: usize) -> Result<IndexDescriptor, Error> {
        let mut columns = Vec::with_capacity(col_ids.len());
        let mut offset = 0u32;
        for &col_id in col_ids {
            let col = schema.col_desc(col_id);
            if !col.col_type.is_index_supported() {
                return Err(Error::IndexTypeNotSupported(format!(
                    "{} ({:?})",
                    col.col_name, col.col_type
                )));
            }
            if !col.is_not_null {
                return Err(Error::IndexColumnNullable(col.col_name.clone()));
            }
            columns.push(IndexColumnDesc {
                col_id,
                col_len: col.col_len,
                in_key_offset: offset,
            });
            offset += col.col_len;
        }
        let index_len = offset;

        // Worst-case encoded size: each column contributes a 1-byte tag
        // plus its payload (and varchar adds one more NUL byte).
        let mut worst_case = 0usize;
        for ic in &columns {
            let col = schema.col_desc(ic.col_id);
            worst_case += 1 + ic.col_len as usize;
            if col.col_type == ColumnType::Varchar {
                worst_case += 1;
            }
        }
        if worst_case > key_data_length {
            return Err(Error::KeySizeExceeded {
                wanted: worst_case,
                limit: key_data_length,
            });
        }

        Ok(IndexDescriptor { columns, index_len })
    }
}

/// A dense projection of a row onto an index's declared columns,
/// ready to be encoded into a `Key` (spec.md glossary "Index tuple").
pub struct IndexTuple<'d> {
    desc: &'d IndexDescriptor,
    data: Vec<u8>,
}

impl<'d> IndexTuple<'d> {
    pub fn new(desc: &'d IndexDescriptor) -> IndexTuple<'d> {
        IndexTuple {
            desc,
            data: vec![0u8; desc.index_len as usize],
        }
    }

    /// Concatenate the selected columns of `tuple` into index-column
    /// order (spec.md §4.2 "Projection into an index tuple").
    pub fn extract_from_tuple(schema: &Schema, desc: &'d IndexDescriptor, tuple: &RAMTuple) -> IndexTuple<'d> {
        let mut it = IndexTuple::new(desc);
        for col in &desc.columns {
            let raw = tuple.get_col(col.col_id);
            let off = col.in_key_offset as usize;
            it.data[off..off + raw.len()].copy_from_slice(raw);
            let _ = schema; // schema kept for symmetry/documentation with the ground source
        }
        it
    }

    pub fn set_col(&mut self, index_col_idx: usize, bytes: &[u8]) {
        let col = &self.desc.columns[index_col_idx];
        let off = col.in_key_offset as usize;
        self.data[off..off + bytes.len()].copy_from_slice(bytes);
    }

    pub fn fill_col_with(&mut self, index_col_idx: usize, byte: u8) {
        let col = &self.desc.columns[index_col_idx];
        let off = col.in_key_offset as usize;
        for b in &mut self.data[off..off + col.col_len as usize] {
            *b = byte;
        }
    }

    pub fn get_col(&self, index_col_idx: usize) -> &[u8] {
        let col = &self.desc.columns[index_col_idx];
        let off = col.in_key_offset as usize;
        &self.data[off..off + col.col_len as usize]
    }

    /// Encode this projection's columns (with their 1-byte type tags)
    /// into `buf`, returning the number of bytes written.
    pub fn encode(&self, schema: &Schema, buf: &mut Vec<u8>) {
        for col in &self.desc.columns {
            let col_desc = schema.col_desc(col.col_id);
            let raw = self.get_col_by_desc(col);
            match col_desc.col_type {
                ColumnType::Int => {
                    buf.push(codec::TypeTag::Int32 as u8);
                    let i = i32::from_le_bytes(raw[0..4].try_into().unwrap());
                    let mut b = [0u8; 4];
                    codec::encode_i32(&mut b, i);
                    buf.extend_from_slice(&b);
                }
                ColumnType::UnsignedLong => {
                    buf.push(codec::TypeTag::Uint64 as u8);
                    let u = u64::from_le_bytes(raw[0..8].try_into().unwrap());
                    let mut b = [0u8; 8];
                    codec::encode_u64(&mut b, u);
                    buf.extend_from_slice(&b);
                }
                ColumnType::Varchar => {
                    buf.push(codec::TypeTag::Varchar as u8);
                    let len = u32::from_le_bytes(raw[0..4].try_into().unwrap()) as usize;
                    let payload = &raw[4..4 + len];
                    let mut b = vec![0u8; payload.len() + 1];
                    codec::encode_varchar(&mut b, payload);
                    buf.extend_from_slice(&b);
                }
                other => unreachable!("index column type {:?} was not rejected at descriptor build", other),
            }
        }
    }

    fn get_col_by_desc<'a>(&'a self, col: &IndexColumnDesc) -> &'a [u8] {
        let off = col.in_key_offset as usize;
        &self.data[off..off + col.col_len as usize]
    }
}

/// A composite encoded index key: `[index-id:4][encoded cols][tag=ROWID:1][row-id:4]`
/// (spec.md §3 "Index key").
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(pub Vec<u8>);

impl Key {
    /// Encode `tuple` under `index_id`, suffixed by `row_id`.
    pub fn encode(schema: &Schema, index_id: u32, tuple: &IndexTuple, row_id: RowId) -> Key {
        let mut buf = Vec::with_capacity(config::DEFAULT_KEY_MAX);
        let mut ib = [0u8; 4];
        codec::encode_u32(&mut ib, index_id);
        buf.extend_from_slice(&ib);
        tuple.encode(schema, &mut buf);
        buf.push(codec::TypeTag::RowId as u8);
        let mut rb = [0u8; 4];
        codec::encode_u32(&mut rb, row_id);
        buf.extend_from_slice(&rb);
        Key(buf)
    }

    /// Row-id carried in the final 4 bytes of the key, per the fixed
    /// `[tag][row-id]` suffix.
    pub fn row_id(&self) -> RowId {
        let n = self.0.len();
        codec::decode_u32(&self.0[n - 4..n])
    }

    /// Lexicographically smallest key strictly greater than `self`
    /// (spec.md §4.7 "successor"): byte-increment with carry. Returns
    /// `None` if the key is already at its maximum value.
    pub fn successor(&self) -> Option<Key> {
        let mut bytes = self.0.clone();
        for i in (0..bytes.len()).rev() {
            if bytes[i] != 0xff {
                bytes[i] += 1;
                return Some(Key(bytes));
            }
            bytes[i] = 0;
        }
        None
    }

    /// Lexicographically largest key strictly less than `self`:
    /// byte-decrement with borrow. Returns `None` if the key is already
    /// all-zero (used by reverse-scan continuation).
    pub fn predecessor(&self) -> Option<Key> {
        let mut bytes = self.0.clone();
        for i in (0..bytes.len()).rev() {
            if bytes[i] != 0x00 {
                bytes[i] -= 1;
                return Some(Key(bytes));
            }
            bytes[i] = 0xff;
        }
        None
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// A predicate on a single indexed column, used to build scan range
/// bounds (spec.md §4.6 "Range construction rules").
pub enum ColumnPredicate<'a> {
    Equal(&'a [u8]),
    GreaterOrEqual(&'a [u8]),
    LessOrEqual(&'a [u8]),
    Unconstrained,
}

/// Build `(start, end)` index tuples for a range scan from one
/// predicate per indexed column, following spec.md's construction
/// rules verbatim: equality pins both bounds; `>=`/`<=` pin one bound
/// and fill the other with the column's type extreme; an unconstrained
/// suffix column fills both bounds with the type extremes.
pub fn build_range<'d>(
    schema: &Schema,
    desc: &'d IndexDescriptor,
    predicates: &[ColumnPredicate],
) -> Result<(IndexTuple<'d>, IndexTuple<'d>), Error> {
    if predicates.len() > desc.columns.len() {
        return Err(Error::InputError(
            "more predicates than indexed columns".to_string(),
        ));
    }
    let mut start = IndexTuple::new(desc);
    let mut end = IndexTuple::new(desc);
    for (i, pred) in predicates.iter().enumerate() {
        let col_desc = schema.col_desc(desc.columns[i].col_id);
        match pred {
            ColumnPredicate::Equal(v) => {
                start.set_col(i, v);
                end.set_col(i, v);
            }
            ColumnPredicate::GreaterOrEqual(v) => {
                start.set_col(i, v);
                fill_type_max(&mut end, i, col_desc);
            }
            ColumnPredicate::LessOrEqual(v) => {
                end.set_col(i, v);
                fill_type_min(&mut start, i, col_desc);
            }
            ColumnPredicate::Unconstrained => {
                fill_type_min(&mut start, i, col_desc);
                fill_type_max(&mut end, i, col_desc);
            }
        }
    }
    // Unreferenced suffix columns: unconstrained (min..max).
    for i in predicates.len()..desc.columns.len() {
        let col_desc = schema.col_desc(desc.columns[i].col_id);
        fill_type_min(&mut start, i, col_desc);
        fill_type_max(&mut end, i, col_desc);
    }
    Ok((start, end))
}

fn fill_type_min(tuple: &mut IndexTuple, idx: usize, col_desc: &crate::types::ColumnDesc) {
    match col_desc.col_type {
        ColumnType::Int => tuple.set_col(idx, &i32::MIN.to_le_bytes()),
        ColumnType::UnsignedLong => tuple.set_col(idx, &0u64.to_le_bytes()),
        // Empty string: prefix length 0, no payload — the smallest
        // possible varchar value under order-preserving encoding.
        ColumnType::Varchar => tuple.set_col(idx, &0u32.to_le_bytes()),
        other => unreachable!("non-indexable type {:?}", other),
    }
}

fn fill_type_max(tuple: &mut IndexTuple, idx: usize, col_desc: &crate::types::ColumnDesc) {
    match col_desc.col_type {
        ColumnType::Int => tuple.set_col(idx, &i32::MAX.to_le_bytes()),
        ColumnType::UnsignedLong => tuple.set_col(idx, &u64::MAX.to_le_bytes()),
        // The largest payload this column can hold, filled with 0xff:
        // the highest-sorting string under the column's max length.
        ColumnType::Varchar => {
            let max_len = col_desc.max_payload_len();
            let mut buf = vec![0xffu8; 4 + max_len as usize];
            buf[0..4].copy_from_slice(&max_len.to_le_bytes());
            tuple.set_col(idx, &buf);
        }
        other => unreachable!("non-indexable type {:?}", other),
    }
}

#[cfg(test)]
#[path = "index_tuple_test.rs"]
mod index_tuple_test;
