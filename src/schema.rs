//! Per-table schema: column descriptors laid out into a row, and the
//! typed row buffer (`RAMTuple`) that reads/writes individual columns
//! (C2, spec.md §4.2).

use crate::error::Error;
use crate::types::{ColumnDesc, ColumnType};

/// A table's column layout: each column's byte offset is assigned once,
/// by walking the descriptor list in order and summing widths, per
/// spec.md §4.2 ("A schema is initialised by walking the column
/// descriptors once...").
#[derive(Debug, Clone)]
pub struct Schema {
    pub columns: Vec<ColumnDesc>,
    pub row_len: usize,
}

impl Schema {
    pub fn new(mut columns: Vec<ColumnDesc>) -> Result<Schema, Error> {
        let mut offset: u32 = 0;
        for col in columns.iter_mut() {
            col.col_offset = offset;
            offset = offset
                .checked_add(col.col_len)
                .ok_or_else(|| Error::RowSizeExceeded {
                    wanted: usize::MAX,
                    limit: crate::config::MAX_TUPLE_LEN,
                })?;
        }
        let row_len = offset as usize;
        if row_len > crate::config::MAX_TUPLE_LEN {
            return Err(Error::RowSizeExceeded {
                wanted: row_len,
                limit: crate::config::MAX_TUPLE_LEN,
            });
        }
        Ok(Schema { columns, row_len })
    }

    pub fn col_count(&self) -> usize {
        self.columns.len()
    }

    pub fn col_id_by_name(&self, name: &str) -> Option<u32> {
        self.columns
            .iter()
            .position(|c| c.col_name == name)
            .map(|i| i as u32)
    }

    pub fn col_desc(&self, col_id: u32) -> &ColumnDesc {
        &self.columns[col_id as usize]
    }

    pub fn null_bitmap_len(&self) -> usize {
        (self.col_count() + 7) / 8
    }
}

/// An in-memory row: the schema's flat byte buffer plus a per-row null
/// bitmap (spec.md §3 "Row (tuple)").
#[derive(Debug, Clone)]
pub struct RAMTuple<'s> {
    schema: &'s Schema,
    data: Vec<u8>,
    nulls: Vec<u8>,
}

impl<'s> RAMTuple<'s> {
    pub fn new(schema: &'s Schema) -> RAMTuple<'s> {
        RAMTuple {
            schema,
            data: vec![0u8; schema.row_len],
            nulls: vec![0u8; schema.null_bitmap_len()],
        }
    }

    pub fn schema(&self) -> &'s Schema {
        self.schema
    }

    pub fn raw(&self) -> &[u8] {
        &self.data
    }

    fn field_range(&self, col_id: u32) -> (usize, usize) {
        let col = self.schema.col_desc(col_id);
        let off = col.col_offset as usize;
        (off, off + col.col_len as usize)
    }

    /// Copy a fixed-width value into its offset; for varchar columns,
    /// `bytes` is the payload (without the length prefix) and a 4-byte
    /// length prefix is written ahead of it.
    pub fn set_col(&mut self, col_id: u32, bytes: &[u8]) -> Result<(), Error> {
        let col = self.schema.col_desc(col_id).clone();
        if col.col_type.is_varlen() {
            let max = col.max_payload_len() as usize;
            if bytes.len() > max {
                return Err(Error::InputError(format!(
                    "value of {} bytes exceeds column {} max {}",
                    bytes.len(),
                    col.col_name,
                    max
                )));
            }
            #[cfg(debug_assertions)]
            debug_assert!(bytes.len() <= max, "varlen sanity check for {}", col.col_name);
            let (off, _) = self.field_range(col_id);
            self.data[off..off + 4].copy_from_slice(&(bytes.len() as u32).to_le_bytes());
            self.data[off + 4..off + 4 + bytes.len()].copy_from_slice(bytes);
            for b in &mut self.data[off + 4 + bytes.len()..off + col.col_len as usize] {
                *b = 0;
            }
        } else {
            let (off, end) = self.field_range(col_id);
            if bytes.len() != end - off {
                return Err(Error::InputError(format!(
                    "value length {} does not match column {} width {}",
                    bytes.len(),
                    col.col_name,
                    end - off
                )));
            }
            self.data[off..end].copy_from_slice(bytes);
        }
        self.set_null(col_id, false);
        Ok(())
    }

    /// Interior view of a field's raw bytes: the 4-byte prefix plus
    /// payload for varchar columns, or the fixed-width bytes otherwise.
    pub fn get_col(&self, col_id: u32) -> &[u8] {
        let (off, end) = self.field_range(col_id);
        &self.data[off..end]
    }

    /// Effective payload of a varchar-family column (prefix stripped).
    pub fn get_varchar_payload(&self, col_id: u32) -> &[u8] {
        let col = self.schema.col_desc(col_id);
        debug_assert!(col.col_type.is_varlen());
        let (off, _) = self.field_range(col_id);
        let len = u32::from_le_bytes(self.data[off..off + 4].try_into().unwrap()) as usize;
        &self.data[off + 4..off + 4 + len]
    }

    pub fn col_equal(&self, col_id: u32, bytes: &[u8]) -> bool {
        self.get_col(col_id) == bytes
    }

    pub fn set_null(&mut self, col_id: u32, is_null: bool) {
        let idx = col_id as usize;
        let byte = idx / 8;
        let bit = 1u8 << (idx % 8);
        if is_null {
            self.nulls[byte] |= bit;
        } else {
            self.nulls[byte] &= !bit;
        }
    }

    pub fn is_null(&self, col_id: u32) -> bool {
        let idx = col_id as usize;
        (self.nulls[idx / 8] & (1u8 << (idx % 8))) != 0
    }

    /// In-place overwrite with the same effective length.
    pub fn update_col(&mut self, col_id: u32, bytes: &[u8]) -> Result<(), Error> {
        self.set_col(col_id, bytes)
    }

    /// In-place overwrite where the new effective length may differ
    /// from the old one (varchar shrink/grow within the column's max).
    pub fn update_col_inc(&mut self, col_id: u32, bytes: &[u8]) -> Result<(), Error> {
        self.set_col(col_id, bytes)
    }

    /// Bulk copy a row with the same schema.
    pub fn copy_row(&mut self, src: &RAMTuple<'s>) {
        debug_assert!(std::ptr::eq(self.schema, src.schema));
        self.data.copy_from_slice(&src.data);
        self.nulls.copy_from_slice(&src.nulls);
    }

    pub fn from_raw(schema: &'s Schema, data: Vec<u8>, nulls: Vec<u8>) -> RAMTuple<'s> {
        debug_assert_eq!(data.len(), schema.row_len);
        RAMTuple { schema, data, nulls }
    }

    pub fn nulls_raw(&self) -> &[u8] {
        &self.nulls
    }
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod schema_test;
