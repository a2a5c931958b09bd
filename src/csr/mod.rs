//! Component F: CSR-encoded relationship adjacency storage (spec §4.F).
//!
//! A group's offsets/neighbors/properties are kept fully in memory and
//! rebuilt wholesale by [`CSRTable::merge_group`] — the "out-of-place group
//! rewrite" path spec §4.E describes for column stores, generalized here to
//! adjacency lists since CSR offsets cannot be patched incrementally without
//! shifting every later entry.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use crate::config::NODE_GROUP_SIZE;
use crate::error::{GraphError, GraphResult};
use crate::io::{Decodeable, Encodeable};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Fwd,
    Bwd,
}

/// One not-yet-committed or freshly-built edge, local to the group it will
/// live in (`src_local` is the bound node's offset within its node group).
#[derive(Debug, Clone)]
pub struct CsrEdge {
    pub src_local: u32,
    pub dst_offset: u64,
    pub rel_id: u64,
    pub properties: Vec<i128>,
}

/// Offsets + neighbors + per-property arrays for one bound-node group, one
/// direction (spec §3 "CSR group").
pub struct CsrGroup {
    offsets: Vec<u64>,
    neighbors: Vec<u64>,
    rel_ids: Vec<u64>,
    properties: Vec<Vec<i128>>,
}

impl CsrGroup {
    pub fn empty(num_properties: usize) -> Self {
        Self {
            offsets: vec![0u64; NODE_GROUP_SIZE + 1],
            neighbors: Vec::new(),
            rel_ids: Vec::new(),
            properties: vec![Vec::new(); num_properties],
        }
    }

    /// Builds a group from an edge list in one pass: sort by bound offset,
    /// then prefix-sum degrees into `offsets` (spec §4.F).
    pub fn build(mut edges: Vec<CsrEdge>, num_properties: usize) -> Self {
        edges.sort_by_key(|e| e.src_local);
        let mut offsets = vec![0u64; NODE_GROUP_SIZE + 1];
        for e in &edges {
            offsets[e.src_local as usize + 1] += 1;
        }
        for i in 1..offsets.len() {
            offsets[i] += offsets[i - 1];
        }
        let neighbors = edges.iter().map(|e| e.dst_offset).collect();
        let rel_ids = edges.iter().map(|e| e.rel_id).collect();
        let mut properties = vec![Vec::with_capacity(edges.len()); num_properties];
        for e in &edges {
            for (slot, &v) in properties.iter_mut().zip(e.properties.iter()) {
                slot.push(v);
            }
        }
        Self {
            offsets,
            neighbors,
            rel_ids,
            properties,
        }
    }

    /// Half-open `[start, end)` range into the flat neighbor array for
    /// `bound_local`'s adjacency list. Returns `(0, 0)` rather than an error
    /// when the bound node has no edges (spec §4.F "no-match").
    pub fn range(&self, bound_local: usize) -> (usize, usize) {
        if bound_local + 1 >= self.offsets.len() {
            return (0, 0);
        }
        (self.offsets[bound_local] as usize, self.offsets[bound_local + 1] as usize)
    }

    pub fn degree(&self, bound_local: usize) -> u64 {
        let (s, e) = self.range(bound_local);
        (e - s) as u64
    }

    pub fn neighbors(&self) -> &[u64] {
        &self.neighbors
    }

    pub fn rel_ids(&self) -> &[u64] {
        &self.rel_ids
    }

    pub fn property(&self, index: usize) -> Option<&[i128]> {
        self.properties.get(index).map(|v| v.as_slice())
    }

    fn to_edges(&self) -> Vec<CsrEdge> {
        let mut out = Vec::with_capacity(self.neighbors.len());
        let mut group_of = vec![0u32; self.neighbors.len()];
        for local in 0..NODE_GROUP_SIZE {
            let (s, e) = self.range(local);
            for idx in s..e {
                group_of[idx] = local as u32;
            }
        }
        for i in 0..self.neighbors.len() {
            out.push(CsrEdge {
                src_local: group_of[i],
                dst_offset: self.neighbors[i],
                rel_id: self.rel_ids[i],
                properties: self.properties.iter().map(|p| p[i]).collect(),
            });
        }
        out
    }
}

/// Forward and backward adjacency for one relationship table (spec §4.F).
pub struct CsrTable {
    property_names: Vec<String>,
    fwd_groups: HashMap<usize, CsrGroup>,
    bwd_groups: HashMap<usize, CsrGroup>,
}

impl CsrTable {
    pub fn new(property_names: Vec<String>) -> Self {
        Self {
            property_names,
            fwd_groups: HashMap::new(),
            bwd_groups: HashMap::new(),
        }
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.property_names.iter().position(|n| n == name)
    }

    fn groups(&self, direction: Direction) -> &HashMap<usize, CsrGroup> {
        match direction {
            Direction::Fwd => &self.fwd_groups,
            Direction::Bwd => &self.bwd_groups,
        }
    }

    fn groups_mut(&mut self, direction: Direction) -> &mut HashMap<usize, CsrGroup> {
        match direction {
            Direction::Fwd => &mut self.fwd_groups,
            Direction::Bwd => &mut self.bwd_groups,
        }
    }

    pub fn scan(&self, direction: Direction, group_idx: usize, bound_local: usize) -> (&[u64], &[u64]) {
        match self.groups(direction).get(&group_idx) {
            Some(group) => {
                let (s, e) = group.range(bound_local);
                (&group.neighbors()[s..e], &group.rel_ids()[s..e])
            }
            None => (&[], &[]),
        }
    }

    pub fn property_slice(
        &self,
        direction: Direction,
        group_idx: usize,
        bound_local: usize,
        name: &str,
    ) -> GraphResult<&[i128]> {
        let index = self
            .property_index(name)
            .ok_or_else(|| GraphError::invalid_input(format!("no such rel property '{}'", name)))?;
        match self.groups(direction).get(&group_idx) {
            Some(group) => {
                let (s, e) = group.range(bound_local);
                Ok(&group.property(index).unwrap()[s..e])
            }
            None => Ok(&[]),
        }
    }

    /// Merges `new_edges` into `group_idx`'s existing content and rebuilds
    /// the group (spec §4.E-style out-of-place rewrite, applied to
    /// adjacency lists). Used by commit.
    pub fn merge_group(&mut self, direction: Direction, group_idx: usize, new_edges: Vec<CsrEdge>) {
        let num_properties = self.property_names.len();
        let existing = self
            .groups_mut(direction)
            .remove(&group_idx)
            .unwrap_or_else(|| CsrGroup::empty(num_properties));
        let mut edges = existing.to_edges();
        edges.extend(new_edges);
        self.groups_mut(direction)
            .insert(group_idx, CsrGroup::build(edges, num_properties));
    }

    /// Removes every edge matching `(src_local, dst_offset, rel_id)` from
    /// the group, rebuilding it.
    pub fn delete_edge(&mut self, direction: Direction, group_idx: usize, src_local: u32, dst_offset: u64, rel_id: u64) {
        let Some(existing) = self.groups(direction).get(&group_idx) else {
            return;
        };
        let num_properties = self.property_names.len();
        let edges: Vec<CsrEdge> = existing
            .to_edges()
            .into_iter()
            .filter(|e| !(e.src_local == src_local && e.dst_offset == dst_offset && e.rel_id == rel_id))
            .collect();
        self.groups_mut(direction)
            .insert(group_idx, CsrGroup::build(edges, num_properties));
    }

    /// Writes every forward group's edge list wholesale, the same
    /// rewrite-whole-file pattern [`crate::catalog::StatisticsCatalog`] uses
    /// for its statistics (checkpoint recovery replays this rather than
    /// diffing individual offsets). Backward groups are not persisted
    /// separately since [`merge_group`](Self::merge_group) rebuilds them
    /// from forward edges on load.
    pub fn persist(&self, path: impl AsRef<Path>) -> GraphResult<()> {
        let mut out = (self.fwd_groups.len() as u32).encode();
        for (&group_idx, group) in &self.fwd_groups {
            out.extend((group_idx as u64).encode());
            out.extend(encode_edges(&group.to_edges()));
        }
        std::fs::write(path, out)?;
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>, property_names: Vec<String>) -> GraphResult<Self> {
        let mut table = Self::new(property_names);
        let path = path.as_ref();
        if !path.exists() {
            return Ok(table);
        }
        let bytes = std::fs::read(path)?;
        let mut cursor = std::io::Cursor::new(bytes);
        let num_groups = u32::decode_from(&mut cursor)?;
        for _ in 0..num_groups {
            let group_idx = u64::decode_from(&mut cursor)? as usize;
            let edges = decode_edges(&mut cursor)?;
            let mut fwd_edges = Vec::with_capacity(edges.len());
            let mut bwd_edges: HashMap<usize, Vec<CsrEdge>> = HashMap::new();
            for edge in edges {
                let dst_group = (edge.dst_offset as usize) / NODE_GROUP_SIZE;
                let dst_local = (edge.dst_offset as usize) % NODE_GROUP_SIZE;
                bwd_edges.entry(dst_group).or_default().push(CsrEdge {
                    src_local: dst_local as u32,
                    dst_offset: edge.src_local as u64 + (group_idx * NODE_GROUP_SIZE) as u64,
                    rel_id: edge.rel_id,
                    properties: edge.properties.clone(),
                });
                fwd_edges.push(edge);
            }
            table.merge_group(Direction::Fwd, group_idx, fwd_edges);
            for (bwd_group, edges) in bwd_edges {
                table.merge_group(Direction::Bwd, bwd_group, edges);
            }
        }
        Ok(table)
    }
}

fn encode_edges(edges: &[CsrEdge]) -> Vec<u8> {
    let mut out = (edges.len() as u32).encode();
    for e in edges {
        out.extend(e.src_local.encode());
        out.extend(e.dst_offset.encode());
        out.extend(e.rel_id.encode());
        out.extend((e.properties.len() as u32).encode());
        for &p in &e.properties {
            out.extend(((p >> 64) as i64).encode());
            out.extend((p as u64 as i64).encode());
        }
    }
    out
}

fn decode_edges<R: Read>(reader: &mut R) -> GraphResult<Vec<CsrEdge>> {
    let n = u32::decode_from(reader)? as usize;
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        let src_local = u32::decode_from(reader)?;
        let dst_offset = u64::decode_from(reader)?;
        let rel_id = u64::decode_from(reader)?;
        let num_props = u32::decode_from(reader)? as usize;
        let mut properties = Vec::with_capacity(num_props);
        for _ in 0..num_props {
            let hi = i64::decode_from(reader)?;
            let lo = i64::decode_from(reader)?;
            properties.push(((hi as i128) << 64) | (lo as u64 as i128));
        }
        out.push(CsrEdge {
            src_local,
            dst_offset,
            rel_id,
            properties,
        });
    }
    Ok(out)
}
