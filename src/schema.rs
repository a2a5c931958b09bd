//! Node/rel table definitions tying the column store (E), CSR storage (F)
//! and primary-key indexing together. This layer is the natural seam
//! between "one column" (E) and "the database" (database.rs), patterned on
//! how a `BTreeFile` elsewhere in this crate bundles a page file with a
//! schema.

use std::collections::HashMap;
use std::path::Path;

use crate::column::{Column, ColumnSchema, LogicalType};
use crate::csr::CsrTable;
use crate::error::{GraphError, GraphResult};
use crate::io::{Decodeable, Encodeable};
use crate::value::Value;

/// A node table: a fixed column order, a designated primary-key column, and
/// an in-memory hash index over it (spec §4.I "Index updates").
pub struct NodeTable {
    pub name: String,
    pub columns: Vec<Column>,
    pub column_names: Vec<String>,
    pub pk_column_index: usize,
    pub pk_index: HashMap<PkValue, u64>,
    pub tombstones: std::collections::HashSet<u64>,
    /// Commit sequence number each row (by offset) was inserted at, for
    /// snapshot-isolated reads (spec §4.J).
    pub created_seq: Vec<u64>,
    /// Commit sequence number each deleted row (by offset) was deleted at.
    pub deleted_seq: HashMap<u64, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PkValue {
    Int64(i64),
    String(String),
}

impl PkValue {
    pub fn from_value(v: &Value) -> GraphResult<Self> {
        match v {
            Value::Int64(i) => Ok(PkValue::Int64(*i)),
            Value::String(s) => Ok(PkValue::String(s.clone())),
            _ => Err(GraphError::invalid_input("primary key must be Int64 or String")),
        }
    }
}

impl NodeTable {
    pub fn new(name: impl Into<String>, schemas: Vec<ColumnSchema>, file: std::sync::Arc<crate::storage::PageFileHandle>, pk_column_index: usize) -> Self {
        let column_names = schemas.iter().map(|s| s.name.clone()).collect();
        let columns = schemas
            .into_iter()
            .enumerate()
            .map(|(i, schema)| Column::new(schema, file.clone(), i as u32))
            .collect();
        Self {
            name: name.into(),
            columns,
            column_names,
            pk_column_index,
            pk_index: HashMap::new(),
            tombstones: std::collections::HashSet::new(),
            created_seq: Vec::new(),
            deleted_seq: HashMap::new(),
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.column_names.iter().position(|n| n == name)
    }

    pub fn num_rows(&self) -> u64 {
        self.columns.first().map(|c| c.num_rows() as u64).unwrap_or(0)
    }

    /// Appends one row and maintains the primary-key index, rejecting
    /// duplicates (spec §8 "PK duplicate"). `commit_seq` is the sequence
    /// number assigned by the commit this row belongs to; it is what later
    /// snapshot reads compare against (spec §4.J).
    pub fn insert_row(&mut self, row: &[Value], commit_seq: u64) -> GraphResult<u64> {
        let pk = PkValue::from_value(&row[self.pk_column_index])?;
        if self.pk_index.contains_key(&pk) {
            return Err(GraphError::invalid_input("duplicate primary key"));
        }
        let offset = self.num_rows();
        for (col, value) in self.columns.iter_mut().zip(row.iter()) {
            append_scalar(col, value)?;
        }
        self.pk_index.insert(pk, offset);
        self.created_seq.push(commit_seq);
        Ok(offset)
    }

    pub fn delete_row(&mut self, offset: u64, commit_seq: u64) -> GraphResult<()> {
        self.tombstones.insert(offset);
        self.deleted_seq.insert(offset, commit_seq);
        self.pk_index.retain(|_, &mut o| o != offset);
        Ok(())
    }

    pub fn lookup_pk(&self, pk: &PkValue) -> Option<u64> {
        if let Some(&offset) = self.pk_index.get(pk) {
            if !self.tombstones.contains(&offset) {
                return Some(offset);
            }
        }
        None
    }

    /// Whether `offset` is part of the snapshot as of `snapshot_seq`: it
    /// must have been created at or before that sequence, and not yet
    /// deleted as of it (spec §4.J, §8 "read-only snapshot").
    pub fn is_visible(&self, offset: u64, snapshot_seq: u64) -> bool {
        let created = self.created_seq.get(offset as usize).copied().unwrap_or(u64::MAX);
        if created > snapshot_seq {
            return false;
        }
        match self.deleted_seq.get(&offset) {
            Some(&deleted) => deleted > snapshot_seq,
            None => true,
        }
    }

    fn row_at(&self, offset: u64) -> GraphResult<Vec<Value>> {
        use std::cell::RefCell;
        use std::rc::Rc;
        let group = offset as usize / crate::config::NODE_GROUP_SIZE;
        let row_in_group = offset as usize % crate::config::NODE_GROUP_SIZE;
        let mut row = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            let state = Rc::new(RefCell::new(crate::vector::DataChunkState::new(1)));
            let mut vector = crate::column::new_vector(&logical_type_of(&col.schema.logical_type), state);
            col.scan(group, row_in_group, row_in_group + 1, &mut vector, 0)?;
            row.push(get_scalar(&vector, 0, &col.schema.logical_type));
        }
        Ok(row)
    }

    /// Writes every live row wholesale to `path`, the same rewrite-whole-
    /// file pattern [`crate::csr::CsrTable::persist`] uses for adjacency
    /// (spec §4.E/§4.I): a checkpoint is what makes node data reloadable
    /// across a restart, so tombstoned rows are simply dropped rather than
    /// carried forward as on-disk tombstones.
    pub fn persist(&self, path: impl AsRef<Path>) -> GraphResult<()> {
        let live_offsets: Vec<u64> = (0..self.num_rows()).filter(|o| !self.tombstones.contains(o)).collect();
        let mut out = (live_offsets.len() as u32).encode();
        for &offset in &live_offsets {
            out.extend(self.created_seq.get(offset as usize).copied().unwrap_or(0).encode());
            let row = self.row_at(offset)?;
            out.extend(row.encode());
        }
        std::fs::write(path, out)?;
        Ok(())
    }

    /// Rebuilds a table from a file [`NodeTable::persist`] wrote, or an
    /// empty table if `path` doesn't exist yet (spec §8 "node table reload",
    /// mirroring [`crate::csr::CsrTable::load`]'s own fresh-table fallback).
    pub fn load(
        path: impl AsRef<Path>,
        name: impl Into<String>,
        schemas: Vec<ColumnSchema>,
        file: std::sync::Arc<crate::storage::PageFileHandle>,
        pk_column_index: usize,
    ) -> GraphResult<Self> {
        let mut table = Self::new(name, schemas, file, pk_column_index);
        let path = path.as_ref();
        if !path.exists() {
            return Ok(table);
        }
        let bytes = std::fs::read(path)?;
        let mut cursor = std::io::Cursor::new(bytes);
        let num_rows = u32::decode_from(&mut cursor)?;
        for _ in 0..num_rows {
            let commit_seq = u64::decode_from(&mut cursor)?;
            let row = Vec::<Value>::decode_from(&mut cursor)?;
            table.insert_row(&row, commit_seq)?;
        }
        Ok(table)
    }
}

/// Appends a single `Value` to `col` through a throwaway one-row vector —
/// bridges the row-oriented local buffer and write transaction API to the
/// columnar `Column::append` contract.
pub fn append_scalar(col: &mut Column, value: &Value) -> GraphResult<()> {
    use std::cell::RefCell;
    use std::rc::Rc;
    let state = Rc::new(RefCell::new(crate::vector::DataChunkState::new(1)));
    let mut vector = crate::column::new_vector(&logical_type_of(&col.schema.logical_type), state);
    set_scalar(&mut vector, 0, value)?;
    col.append(&vector, 1)
}

fn logical_type_of(ty: &LogicalType) -> LogicalType {
    ty.clone()
}

pub fn set_scalar(vector: &mut crate::vector::ValueVector, pos: usize, value: &Value) -> GraphResult<()> {
    match value {
        Value::Null => vector.set_null(pos, true),
        Value::Int64(v) => vector.set_int64(pos, *v),
        Value::Double(v) => vector.set_double(pos, *v),
        Value::Bool(v) => vector.set_bool(pos, *v),
        Value::String(v) => vector.set_string(pos, v),
    }
    Ok(())
}

pub fn get_scalar(vector: &crate::vector::ValueVector, pos: usize, ty: &LogicalType) -> Value {
    if vector.is_null(pos) {
        return Value::Null;
    }
    match ty {
        LogicalType::Int64 | LogicalType::InternalId => Value::Int64(vector.get_int64(pos)),
        LogicalType::Double => Value::Double(vector.get_double(pos)),
        LogicalType::Bool => Value::Bool(vector.get_bool(pos)),
        LogicalType::String => Value::String(vector.get_string(pos).to_string()),
        LogicalType::List(_) | LogicalType::Struct(_) => Value::Null,
    }
}

/// Widens a scalar `Value` the same way [`crate::column::chunk::FixedChunk`]
/// does internally, for rel properties which are stored as raw `i128` slots
/// in CSR groups rather than through a `ValueVector`.
pub fn value_to_i128(value: &Value) -> i128 {
    match value {
        Value::Int64(v) => *v as i128,
        Value::Double(v) => v.to_bits() as i128,
        Value::Bool(v) => *v as i128,
        Value::String(_) | Value::Null => 0,
    }
}

/// Applies an in-place update to row `offset` of `table`'s `column_index`
/// column (spec §4.I "Index updates" commit path).
pub fn update_cell(table: &mut NodeTable, offset: u64, column_index: usize, value: &Value) -> GraphResult<()> {
    use std::cell::RefCell;
    use std::rc::Rc;
    let group = offset as usize / crate::config::NODE_GROUP_SIZE;
    let row_in_group = offset as usize % crate::config::NODE_GROUP_SIZE;
    let col = &mut table.columns[column_index];
    let state = Rc::new(RefCell::new(crate::vector::DataChunkState::new(1)));
    let mut vector = crate::column::new_vector(&logical_type_of(&col.schema.logical_type), state);
    set_scalar(&mut vector, 0, value)?;
    col.write(group, row_in_group, &vector, 0)
}

/// A rel table: forward/backward CSR storage plus the property schema
/// shared by both directions.
pub struct RelTable {
    pub name: String,
    pub src_table: String,
    pub dst_table: String,
    pub property_names: Vec<String>,
    pub csr: CsrTable,
    pub next_rel_id: u64,
}

impl RelTable {
    pub fn new(name: impl Into<String>, src_table: impl Into<String>, dst_table: impl Into<String>, property_names: Vec<String>) -> Self {
        Self {
            name: name.into(),
            src_table: src_table.into(),
            dst_table: dst_table.into(),
            csr: CsrTable::new(property_names.clone()),
            property_names,
            next_rel_id: 0,
        }
    }

    pub fn alloc_rel_id(&mut self) -> u64 {
        let id = self.next_rel_id;
        self.next_rel_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::ColumnSchema;
    use crate::storage::PageFileHandle;
    use std::sync::Arc;
    use tempfile::tempdir;

    #[test]
    fn insert_row_rejects_duplicate_primary_key() {
        let dir = tempdir().unwrap();
        let file = Arc::new(PageFileHandle::open(dir.path().join("data.bin")).unwrap());
        let schemas = vec![ColumnSchema {
            name: "id".into(),
            logical_type: LogicalType::Int64,
            nullable: false,
        }];
        let mut table = NodeTable::new("Person", schemas, file, 0);
        table.insert_row(&[Value::Int64(1)], 1).unwrap();
        assert!(table.insert_row(&[Value::Int64(1)], 2).is_err());
    }

    #[test]
    fn delete_then_reinsert_same_pk_leaves_single_index_entry() {
        let dir = tempdir().unwrap();
        let file = Arc::new(PageFileHandle::open(dir.path().join("data.bin")).unwrap());
        let schemas = vec![ColumnSchema {
            name: "id".into(),
            logical_type: LogicalType::Int64,
            nullable: false,
        }];
        let mut table = NodeTable::new("Person", schemas, file, 0);
        let offset = table.insert_row(&[Value::Int64(1)], 1).unwrap();
        table.delete_row(offset, 2).unwrap();
        table.insert_row(&[Value::Int64(1)], 3).unwrap();
        assert_eq!(table.pk_index.len(), 1);
    }

    #[test]
    fn visibility_is_pinned_to_the_reader_s_snapshot_sequence() {
        let dir = tempdir().unwrap();
        let file = Arc::new(PageFileHandle::open(dir.path().join("data.bin")).unwrap());
        let schemas = vec![ColumnSchema {
            name: "id".into(),
            logical_type: LogicalType::Int64,
            nullable: false,
        }];
        let mut table = NodeTable::new("Person", schemas, file, 0);
        let offset = table.insert_row(&[Value::Int64(1)], 5).unwrap();

        assert!(!table.is_visible(offset, 4));
        assert!(table.is_visible(offset, 5));
        assert!(table.is_visible(offset, 6));

        table.delete_row(offset, 9).unwrap();
        assert!(table.is_visible(offset, 8));
        assert!(!table.is_visible(offset, 9));
    }

    #[test]
    fn persist_then_load_rebuilds_rows_and_drops_tombstoned_ones() {
        let dir = tempdir().unwrap();
        let schemas = vec![
            ColumnSchema { name: "id".into(), logical_type: LogicalType::Int64, nullable: false },
            ColumnSchema { name: "name".into(), logical_type: LogicalType::String, nullable: true },
        ];
        let file = Arc::new(PageFileHandle::open(dir.path().join("data.bin")).unwrap());
        let mut table = NodeTable::new("Person", schemas.clone(), file, 0);
        table.insert_row(&[Value::Int64(1), Value::String("Alice".into())], 1).unwrap();
        let gone = table.insert_row(&[Value::Int64(2), Value::String("Bob".into())], 2).unwrap();
        table.delete_row(gone, 3).unwrap();

        let path = dir.path().join("person.nodes.bin");
        table.persist(&path).unwrap();

        let file2 = Arc::new(PageFileHandle::open(dir.path().join("data2.bin")).unwrap());
        let loaded = NodeTable::load(&path, "Person", schemas, file2, 0).unwrap();
        assert_eq!(loaded.num_rows(), 1);
        assert_eq!(loaded.row_at(0).unwrap(), vec![Value::Int64(1), Value::String("Alice".into())]);
        assert!(loaded.lookup_pk(&PkValue::Int64(2)).is_none());
    }

    #[test]
    fn load_on_a_missing_path_returns_a_fresh_empty_table() {
        let dir = tempdir().unwrap();
        let schemas = vec![ColumnSchema { name: "id".into(), logical_type: LogicalType::Int64, nullable: false }];
        let file = Arc::new(PageFileHandle::open(dir.path().join("data.bin")).unwrap());
        let loaded = NodeTable::load(dir.path().join("missing.bin"), "Person", schemas, file, 0).unwrap();
        assert_eq!(loaded.num_rows(), 0);
    }
}
