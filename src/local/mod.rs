//! Component I: per-transaction local write buffers (spec §4.I).
//!
//! A write transaction's uncommitted inserts/updates/deletes live here,
//! mirroring the persistent layout loosely (a flat row list rather than
//! node-group-chunked columns — the commit path is what fans these out into
//! real column chunks and CSR groups). Discarding a `LocalStore` is the
//! entire abort path: persistent state is never touched.

use std::collections::{HashMap, HashSet};

use crate::value::Value;

/// One buffered insert plus the batch-level `ignore_errors` policy
/// `InsertNode` was built with, carried through to commit time since the
/// duplicate-primary-key check can only run against the persisted index
/// there (spec §4.I "commit").
#[derive(Debug, Clone)]
pub struct PendingNodeInsert {
    pub row: Vec<Value>,
    pub ignore_errors: bool,
}

#[derive(Debug, Default)]
pub struct LocalNodeGroup {
    /// Newly inserted rows, in column order matching the table schema.
    pub inserted: Vec<PendingNodeInsert>,
    /// `(global_offset, column_index, value)` updates against already
    /// persisted rows.
    pub updates: Vec<(u64, usize, Value)>,
    /// Global offsets tombstoned by a delete.
    pub deletes: HashSet<u64>,
}

impl LocalNodeGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, row: Vec<Value>, ignore_errors: bool) {
        self.inserted.push(PendingNodeInsert { row, ignore_errors });
    }

    pub fn update(&mut self, offset: u64, column: usize, value: Value) {
        self.updates.push((offset, column, value));
    }

    pub fn delete(&mut self, offset: u64) {
        self.deletes.insert(offset);
    }
}

#[derive(Debug, Clone)]
pub struct RelRow {
    pub rel_id: u64,
    pub src: u64,
    pub dst: u64,
    pub properties: Vec<Value>,
}

/// Buffered rel inserts/deletes with the two sorted-by-construction indices
/// spec §4.F names (`fwd_index`, `bwd_index`).
#[derive(Debug, Default)]
pub struct LocalRelTable {
    pub inserted: Vec<RelRow>,
    fwd_index: HashMap<u64, Vec<usize>>,
    bwd_index: HashMap<u64, Vec<usize>>,
    /// `(src, dst, rel_id)` deletions against already-persisted edges.
    pub deletes: Vec<(u64, u64, u64)>,
}

impl LocalRelTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, row: RelRow) {
        let idx = self.inserted.len();
        self.fwd_index.entry(row.src).or_default().push(idx);
        self.bwd_index.entry(row.dst).or_default().push(idx);
        self.inserted.push(row);
    }

    /// Intersects the two sorted row lists on `(src, dst)`, per spec §4.F's
    /// description of local rel lookup.
    pub fn lookup(&self, src: u64, dst: u64) -> Vec<&RelRow> {
        self.fwd_index
            .get(&src)
            .map(|idxs| {
                idxs.iter()
                    .map(|&i| &self.inserted[i])
                    .filter(|row| row.dst == dst)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn incident_on_src(&self, src: u64) -> impl Iterator<Item = &RelRow> {
        self.fwd_index
            .get(&src)
            .into_iter()
            .flatten()
            .map(move |&i| &self.inserted[i])
    }

    pub fn incident_on_dst(&self, dst: u64) -> impl Iterator<Item = &RelRow> {
        self.bwd_index
            .get(&dst)
            .into_iter()
            .flatten()
            .map(move |&i| &self.inserted[i])
    }

    pub fn delete(&mut self, src: u64, dst: u64, rel_id: u64) {
        self.deletes.push((src, dst, rel_id));
    }
}

/// Everything a single write transaction has buffered, keyed by table name.
#[derive(Debug, Default)]
pub struct LocalStore {
    node_groups: HashMap<String, LocalNodeGroup>,
    rel_tables: HashMap<String, LocalRelTable>,
}

impl LocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node_group_mut(&mut self, table: &str) -> &mut LocalNodeGroup {
        self.node_groups.entry(table.to_string()).or_insert_with(LocalNodeGroup::new)
    }

    pub fn node_group(&self, table: &str) -> Option<&LocalNodeGroup> {
        self.node_groups.get(table)
    }

    pub fn rel_table_mut(&mut self, table: &str) -> &mut LocalRelTable {
        self.rel_tables.entry(table.to_string()).or_insert_with(LocalRelTable::new)
    }

    pub fn rel_table(&self, table: &str) -> Option<&LocalRelTable> {
        self.rel_tables.get(table)
    }

    pub fn touched_node_tables(&self) -> impl Iterator<Item = &String> {
        self.node_groups.keys()
    }

    pub fn touched_rel_tables(&self) -> impl Iterator<Item = &String> {
        self.rel_tables.keys()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rel_lookup_intersects_fwd_and_dst() {
        let mut table = LocalRelTable::new();
        table.insert(RelRow { rel_id: 1, src: 10, dst: 20, properties: vec![] });
        table.insert(RelRow { rel_id: 2, src: 10, dst: 30, properties: vec![] });
        let found = table.lookup(10, 20);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].rel_id, 1);
    }

    #[test]
    fn node_group_tracks_inserts_updates_deletes_independently() {
        let mut group = LocalNodeGroup::new();
        group.insert(vec![Value::Int64(1)], false);
        group.update(5, 0, Value::Int64(99));
        group.delete(7);
        assert_eq!(group.inserted.len(), 1);
        assert_eq!(group.updates.len(), 1);
        assert!(group.deletes.contains(&7));
    }
}
