//! Component K: statistics catalog (spec §4.K).
//!
//! Persisted wholesale (not incrementally) as an `original` file plus a
//! `wal-shadow` copy so a checkpoint can swap them atomically, the same
//! two-file pattern spec §6 calls out for `nodes_statistics_and_deleted_ids.bin`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::GraphResult;
use crate::io::{Decodeable, Encodeable};

#[derive(Debug, Clone, Default)]
pub struct ColumnStats {
    pub null_count: u64,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

impl Encodeable for ColumnStats {
    fn encode(&self) -> Vec<u8> {
        let mut out = self.null_count.encode();
        out.extend(self.min.is_some().encode());
        out.extend(self.min.unwrap_or(0).encode());
        out.extend(self.max.is_some().encode());
        out.extend(self.max.unwrap_or(0).encode());
        out
    }
}

impl Decodeable for ColumnStats {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
        let null_count = u64::decode_from(reader)?;
        let has_min = bool::decode_from(reader)?;
        let min_raw = i64::decode_from(reader)?;
        let has_max = bool::decode_from(reader)?;
        let max_raw = i64::decode_from(reader)?;
        Ok(Self {
            null_count,
            min: has_min.then_some(min_raw),
            max: has_max.then_some(max_raw),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct TableStatistics {
    pub num_rows: u64,
    pub column_stats: Vec<ColumnStats>,
}

impl Encodeable for TableStatistics {
    fn encode(&self) -> Vec<u8> {
        let mut out = self.num_rows.encode();
        out.extend(self.column_stats.encode());
        out
    }
}

impl Decodeable for TableStatistics {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            num_rows: u64::decode_from(reader)?,
            column_stats: Vec::<ColumnStats>::decode_from(reader)?,
        })
    }
}

/// Per-rel-table-group forward/backward degree counters (spec §10
/// supplemented feature, grounded on kuzu's adjacency-cost statistics).
#[derive(Debug, Clone, Default)]
pub struct RelTableStats {
    pub num_rels: u64,
    pub per_group_fwd_degree_sum: Vec<u64>,
    pub per_group_bwd_degree_sum: Vec<u64>,
}

impl Encodeable for RelTableStats {
    fn encode(&self) -> Vec<u8> {
        let mut out = self.num_rels.encode();
        out.extend(self.per_group_fwd_degree_sum.encode());
        out.extend(self.per_group_bwd_degree_sum.encode());
        out
    }
}

impl Decodeable for RelTableStats {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Self {
            num_rels: u64::decode_from(reader)?,
            per_group_fwd_degree_sum: Vec::<u64>::decode_from(reader)?,
            per_group_bwd_degree_sum: Vec::<u64>::decode_from(reader)?,
        })
    }
}

#[derive(Debug, Clone, Default)]
struct CatalogFile {
    node_tables: Vec<(String, TableStatistics)>,
    rel_tables: Vec<(String, RelTableStats)>,
}

impl Encodeable for CatalogFile {
    fn encode(&self) -> Vec<u8> {
        let mut out = (self.node_tables.len() as u32).encode();
        for (name, stats) in &self.node_tables {
            out.extend(name.encode());
            out.extend(stats.encode());
        }
        out.extend((self.rel_tables.len() as u32).encode());
        for (name, stats) in &self.rel_tables {
            out.extend(name.encode());
            out.extend(stats.encode());
        }
        out
    }
}

impl Decodeable for CatalogFile {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> std::io::Result<Self> {
        let n = u32::decode_from(reader)? as usize;
        let mut node_tables = Vec::with_capacity(n);
        for _ in 0..n {
            node_tables.push((String::decode_from(reader)?, TableStatistics::decode_from(reader)?));
        }
        let m = u32::decode_from(reader)? as usize;
        let mut rel_tables = Vec::with_capacity(m);
        for _ in 0..m {
            rel_tables.push((String::decode_from(reader)?, RelTableStats::decode_from(reader)?));
        }
        Ok(Self { node_tables, rel_tables })
    }
}

/// `table_id -> TableStatistics` / `RelTableStats`, updated on every insert
/// and delete, persisted wholesale to `nodes_statistics_and_deleted_ids.bin`
/// / `rels_statistics.bin` at checkpoint time (spec §4.K, §6).
pub struct StatisticsCatalog {
    node_tables: HashMap<String, TableStatistics>,
    rel_tables: HashMap<String, RelTableStats>,
    original_path: PathBuf,
    shadow_path: PathBuf,
}

impl StatisticsCatalog {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            node_tables: HashMap::new(),
            rel_tables: HashMap::new(),
            original_path: dir.join("nodes_statistics_and_deleted_ids.bin"),
            shadow_path: dir.join("nodes_statistics_and_deleted_ids.bin.wal-shadow"),
        }
    }

    pub fn open(dir: impl AsRef<Path>) -> GraphResult<Self> {
        let mut catalog = Self::new(dir);
        if catalog.original_path.exists() {
            let bytes = fs::read(&catalog.original_path)?;
            let file = CatalogFile::decode_from(&mut bytes.as_slice())?;
            catalog.node_tables = file.node_tables.into_iter().collect();
            catalog.rel_tables = file.rel_tables.into_iter().collect();
        }
        Ok(catalog)
    }

    pub fn node_stats_mut(&mut self, table: &str) -> &mut TableStatistics {
        self.node_tables.entry(table.to_string()).or_default()
    }

    pub fn node_stats(&self, table: &str) -> Option<&TableStatistics> {
        self.node_tables.get(table)
    }

    pub fn rel_stats_mut(&mut self, table: &str) -> &mut RelTableStats {
        self.rel_tables.entry(table.to_string()).or_default()
    }

    pub fn rel_stats(&self, table: &str) -> Option<&RelTableStats> {
        self.rel_tables.get(table)
    }

    /// Writes the shadow copy, then atomically swings it into place; the
    /// two-file layout lets this file ride along with a regular checkpoint
    /// without its own WAL plumbing.
    pub fn persist(&self) -> GraphResult<()> {
        let file = CatalogFile {
            node_tables: self.node_tables.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            rel_tables: self.rel_tables.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        };
        fs::write(&self.shadow_path, file.encode())?;
        fs::rename(&self.shadow_path, &self.original_path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn persist_then_reopen_roundtrips_counters() {
        let dir = tempdir().unwrap();
        let mut catalog = StatisticsCatalog::new(dir.path());
        catalog.node_stats_mut("Person").num_rows = 42;
        catalog.rel_stats_mut("Knows").num_rels = 7;
        catalog.persist().unwrap();

        let reopened = StatisticsCatalog::open(dir.path()).unwrap();
        assert_eq!(reopened.node_stats("Person").unwrap().num_rows, 42);
        assert_eq!(reopened.rel_stats("Knows").unwrap().num_rels, 7);
    }

    #[test]
    fn open_on_fresh_directory_starts_empty() {
        let dir = tempdir().unwrap();
        let catalog = StatisticsCatalog::open(dir.path()).unwrap();
        assert!(catalog.node_stats("Person").is_none());
    }
}
