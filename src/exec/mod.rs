//! Component H: the pull-based vectorized operator tree (spec §4.H).
//!
//! Scan and Extend read directly from the columnar/CSR storage through
//! [`crate::vector::ValueVector`]; everything downstream materializes
//! `Vec<Tuple>` row batches rather than propagating `ValueVector`/selection-
//! vector state end-to-end — full factorized-table plumbing through every
//! join/aggregate/sort stage was out of proportion to this pass, so this is
//! recorded as a deliberate simplification (see DESIGN.md) rather than a
//! silent gap. Each operator still honors the three-hook contract and the
//! cooperative cancellation check spec §5 requires.

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::column::new_vector;
use crate::config::{NODE_GROUP_SIZE, VECTOR_CAPACITY};
use crate::csr::Direction;
use crate::error::{GraphError, GraphResult};
use crate::local::{LocalStore, RelRow};
use crate::schema::{get_scalar, NodeTable, RelTable};
use crate::value::{Tuple, Value};
use crate::vector::DataChunkState;

pub struct ExecContext {
    pub interrupted: Arc<std::sync::atomic::AtomicBool>,
    pub local: Rc<RefCell<LocalStore>>,
    /// The commit sequence number this transaction's reads are pinned to
    /// (spec §4.J snapshot isolation): a row is visible only if it was
    /// created at or before this sequence and not deleted at or before it.
    /// Write transactions see every committed row (`u64::MAX`); read-only
    /// transactions are pinned to the sequence captured at `begin`.
    pub snapshot_seq: u64,
}

impl ExecContext {
    pub fn new(local: Rc<RefCell<LocalStore>>) -> Self {
        Self {
            interrupted: Arc::new(std::sync::atomic::AtomicBool::new(false)),
            local,
            snapshot_seq: u64::MAX,
        }
    }

    pub fn check_interrupted(&self) -> GraphResult<()> {
        if self.interrupted.load(Ordering::SeqCst) {
            Err(GraphError::interrupted())
        } else {
            Ok(())
        }
    }
}

/// The three-hook operator contract of spec §4.H.
pub trait PhysicalOperator {
    fn init_global_state(&mut self, _ctx: &ExecContext) -> GraphResult<()> {
        Ok(())
    }

    fn init_local_state(&mut self, _ctx: &ExecContext) -> GraphResult<()> {
        Ok(())
    }

    /// Appends at most one morsel's worth of tuples to `out`; returns
    /// `false` once the operator is exhausted.
    fn get_next_tuple(&mut self, ctx: &ExecContext, out: &mut Vec<Tuple>) -> GraphResult<bool>;
}

fn cmp_values(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Int64(x), Value::Int64(y)) => x.cmp(y),
        (Value::Double(x), Value::Double(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Null, _) => Ordering::Less,
        (_, Value::Null) => Ordering::Greater,
        _ => Ordering::Equal,
    }
}

fn group_key(values: &[Value]) -> String {
    format!("{:?}", values)
}

/// Scans a node table morsel by morsel via a shared atomic cursor so
/// multiple worker threads could in principle dispense disjoint morsels;
/// only one driver pulls in this pass (spec §5 "scheduling").
pub struct ScanNodeTable {
    table: Arc<Mutex<NodeTable>>,
    columns: Vec<String>,
    cursor: Arc<AtomicU64>,
    morsel_size: u64,
}

impl ScanNodeTable {
    pub fn new(table: Arc<Mutex<NodeTable>>, columns: Vec<String>) -> Self {
        Self {
            table,
            columns,
            cursor: Arc::new(AtomicU64::new(0)),
            morsel_size: VECTOR_CAPACITY as u64,
        }
    }
}

impl PhysicalOperator for ScanNodeTable {
    fn get_next_tuple(&mut self, ctx: &ExecContext, out: &mut Vec<Tuple>) -> GraphResult<bool> {
        ctx.check_interrupted()?;
        let table = self.table.lock().unwrap();
        let total = table.num_rows();
        loop {
            let start = self.cursor.fetch_add(self.morsel_size, Ordering::SeqCst);
            if start >= total {
                return Ok(false);
            }
            let group = (start / NODE_GROUP_SIZE as u64) as usize;
            let group_start = group as u64 * NODE_GROUP_SIZE as u64;
            let group_cap = (group_start + NODE_GROUP_SIZE as u64).min(total);
            let end = (start + self.morsel_size).min(group_cap);
            let row_start = (start - group_start) as usize;
            let row_end = (end - group_start) as usize;
            if row_end <= row_start {
                continue;
            }
            let col_indices: Vec<usize> = self
                .columns
                .iter()
                .map(|c| table.column_index(c).ok_or_else(|| GraphError::invalid_input(format!("no such column '{}'", c))))
                .collect::<GraphResult<_>>()?;
            let count = row_end - row_start;
            let state = Rc::new(RefCell::new(DataChunkState::new(count)));
            let mut vectors: Vec<_> = col_indices
                .iter()
                .map(|&i| new_vector(&table.columns[i].schema.logical_type, state.clone()))
                .collect();
            for (vi, &ci) in col_indices.iter().enumerate() {
                table.columns[ci].scan(group, row_start, row_end, &mut vectors[vi], 0)?;
            }
            for r in 0..count {
                let global_offset = group_start + row_start as u64 + r as u64;
                if !table.is_visible(global_offset, ctx.snapshot_seq) {
                    continue;
                }
                let mut tuple = Vec::with_capacity(vectors.len() + 1);
                tuple.push(Value::Int64(global_offset as i64));
                for (vi, &ci) in col_indices.iter().enumerate() {
                    tuple.push(get_scalar(&vectors[vi], r, &table.columns[ci].schema.logical_type));
                }
                out.push(tuple);
            }
            return Ok(true);
        }
    }
}

/// Edge traversal: for every source-node offset in a tuple (column 0 by
/// `ScanNodeTable`'s convention), scans one CSR list and emits one output
/// tuple per neighbor (spec §4.H "Extend").
pub struct Extend {
    child: Box<dyn PhysicalOperator>,
    rel_table: Arc<Mutex<RelTable>>,
    direction: Direction,
    src_col_idx: usize,
}

impl Extend {
    pub fn new(child: Box<dyn PhysicalOperator>, rel_table: Arc<Mutex<RelTable>>, direction: Direction, src_col_idx: usize) -> Self {
        Self {
            child,
            rel_table,
            direction,
            src_col_idx,
        }
    }
}

impl PhysicalOperator for Extend {
    fn get_next_tuple(&mut self, ctx: &ExecContext, out: &mut Vec<Tuple>) -> GraphResult<bool> {
        ctx.check_interrupted()?;
        let mut batch = Vec::new();
        if !self.child.get_next_tuple(ctx, &mut batch)? {
            return Ok(false);
        }
        let rel = self.rel_table.lock().unwrap();
        for tuple in &batch {
            let src_offset = tuple[self.src_col_idx]
                .as_int64()
                .ok_or_else(|| GraphError::internal("extend expects an Int64 source offset"))? as u64;
            let group = (src_offset / NODE_GROUP_SIZE as u64) as usize;
            let local = (src_offset % NODE_GROUP_SIZE as u64) as usize;
            let (neighbors, rel_ids) = rel.csr.scan(self.direction, group, local);
            for (&dst, &rel_id) in neighbors.iter().zip(rel_ids.iter()) {
                let mut extended = tuple.clone();
                extended.push(Value::Int64(dst as i64));
                extended.push(Value::Int64(rel_id as i64));
                out.push(extended);
            }
        }
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
    Mark,
    Count,
}

/// Build-then-probe hash join supporting INNER/LEFT/MARK/COUNT semantics
/// (spec §4.H "Hash join"). Keys are compared by their `Debug` rendering
/// since [`Value`] doesn't implement `Hash`/`Eq` (it carries `f64`).
pub struct HashJoin {
    build: Box<dyn PhysicalOperator>,
    probe: Box<dyn PhysicalOperator>,
    build_key_idx: usize,
    probe_key_idx: usize,
    join_type: JoinType,
    table: Option<HashMap<String, Vec<Tuple>>>,
    build_width: usize,
}

impl HashJoin {
    pub fn new(
        build: Box<dyn PhysicalOperator>,
        probe: Box<dyn PhysicalOperator>,
        build_key_idx: usize,
        probe_key_idx: usize,
        join_type: JoinType,
    ) -> Self {
        Self {
            build,
            probe,
            build_key_idx,
            probe_key_idx,
            join_type,
            table: None,
            build_width: 0,
        }
    }

    fn ensure_built(&mut self, ctx: &ExecContext) -> GraphResult<()> {
        if self.table.is_some() {
            return Ok(());
        }
        let mut map: HashMap<String, Vec<Tuple>> = HashMap::new();
        loop {
            let mut batch = Vec::new();
            if !self.build.get_next_tuple(ctx, &mut batch)? {
                break;
            }
            for tuple in batch {
                self.build_width = self.build_width.max(tuple.len());
                let key = format!("{:?}", tuple[self.build_key_idx]);
                map.entry(key).or_default().push(tuple);
            }
        }
        self.table = Some(map);
        Ok(())
    }
}

impl PhysicalOperator for HashJoin {
    fn get_next_tuple(&mut self, ctx: &ExecContext, out: &mut Vec<Tuple>) -> GraphResult<bool> {
        ctx.check_interrupted()?;
        self.ensure_built(ctx)?;
        let mut probe_batch = Vec::new();
        if !self.probe.get_next_tuple(ctx, &mut probe_batch)? {
            return Ok(false);
        }
        let map = self.table.as_ref().unwrap();
        for probe_tuple in probe_batch {
            let key = format!("{:?}", probe_tuple[self.probe_key_idx]);
            let matches = map.get(&key);
            match self.join_type {
                JoinType::Inner => {
                    if let Some(rows) = matches {
                        for build_row in rows {
                            let mut joined = probe_tuple.clone();
                            joined.extend(build_row.clone());
                            out.push(joined);
                        }
                    }
                }
                JoinType::Left => {
                    if let Some(rows) = matches.filter(|r| !r.is_empty()) {
                        for build_row in rows {
                            let mut joined = probe_tuple.clone();
                            joined.extend(build_row.clone());
                            out.push(joined);
                        }
                    } else {
                        let mut joined = probe_tuple.clone();
                        joined.extend(std::iter::repeat(Value::Null).take(self.build_width));
                        out.push(joined);
                    }
                }
                JoinType::Mark => {
                    let mut joined = probe_tuple.clone();
                    joined.push(Value::Bool(matches.map(|r| !r.is_empty()).unwrap_or(false)));
                    out.push(joined);
                }
                JoinType::Count => {
                    let mut joined = probe_tuple.clone();
                    joined.push(Value::Int64(matches.map(|r| r.len()).unwrap_or(0) as i64));
                    out.push(joined);
                }
            }
        }
        Ok(true)
    }
}

/// Multiway list intersection (spec §4.H "Intersect"): each source yields
/// `(group_key, id)` tuples; output is, per group key, the ids common to
/// every source. Runs as a single barrier pull since the sources must be
/// fully drained before the intersection is known.
pub struct Intersect {
    sources: Vec<Box<dyn PhysicalOperator>>,
    key_idx: usize,
    id_idx: usize,
    done: bool,
}

impl Intersect {
    pub fn new(sources: Vec<Box<dyn PhysicalOperator>>, key_idx: usize, id_idx: usize) -> Self {
        Self {
            sources,
            key_idx,
            id_idx,
            done: false,
        }
    }
}

impl PhysicalOperator for Intersect {
    fn get_next_tuple(&mut self, ctx: &ExecContext, out: &mut Vec<Tuple>) -> GraphResult<bool> {
        ctx.check_interrupted()?;
        if self.done {
            return Ok(false);
        }
        self.done = true;
        if self.sources.is_empty() {
            return Ok(true);
        }
        let mut per_source: Vec<HashMap<String, BTreeSet<i64>>> = Vec::with_capacity(self.sources.len());
        for src in &mut self.sources {
            let mut sets: HashMap<String, BTreeSet<i64>> = HashMap::new();
            loop {
                let mut batch = Vec::new();
                if !src.get_next_tuple(ctx, &mut batch)? {
                    break;
                }
                for tuple in batch {
                    if let Some(id) = tuple[self.id_idx].as_int64() {
                        sets.entry(group_key(&tuple[self.key_idx..self.key_idx + 1])).or_default().insert(id);
                    }
                }
            }
            per_source.push(sets);
        }
        // drive the sweep from the smallest source (spec §4.H).
        let smallest_idx = per_source
            .iter()
            .enumerate()
            .min_by_key(|(_, s)| s.values().map(|v| v.len()).sum::<usize>())
            .map(|(i, _)| i)
            .unwrap();
        for (key, driver_ids) in &per_source[smallest_idx] {
            let mut result = driver_ids.clone();
            for (i, other) in per_source.iter().enumerate() {
                if i == smallest_idx {
                    continue;
                }
                let other_ids = other.get(key).cloned().unwrap_or_default();
                result = result.intersection(&other_ids).copied().collect();
            }
            for id in result {
                out.push(vec![Value::String(key.clone()), Value::Int64(id)]);
            }
        }
        Ok(true)
    }
}

/// Materializes the right (build) side once, nested-loops the left side
/// against it (spec §4.H "Cross product").
pub struct CrossProduct {
    left: Box<dyn PhysicalOperator>,
    right: Box<dyn PhysicalOperator>,
    right_rows: Option<Vec<Tuple>>,
}

impl CrossProduct {
    pub fn new(left: Box<dyn PhysicalOperator>, right: Box<dyn PhysicalOperator>) -> Self {
        Self {
            left,
            right,
            right_rows: None,
        }
    }
}

impl PhysicalOperator for CrossProduct {
    fn get_next_tuple(&mut self, ctx: &ExecContext, out: &mut Vec<Tuple>) -> GraphResult<bool> {
        ctx.check_interrupted()?;
        if self.right_rows.is_none() {
            let mut rows = Vec::new();
            loop {
                let mut batch = Vec::new();
                if !self.right.get_next_tuple(ctx, &mut batch)? {
                    break;
                }
                rows.extend(batch);
            }
            self.right_rows = Some(rows);
        }
        let mut left_batch = Vec::new();
        if !self.left.get_next_tuple(ctx, &mut left_batch)? {
            return Ok(false);
        }
        let right_rows = self.right_rows.as_ref().unwrap();
        for l in &left_batch {
            for r in right_rows {
                let mut joined = l.clone();
                joined.extend(r.clone());
                out.push(joined);
            }
        }
        Ok(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

#[derive(Debug, Clone, Default)]
struct AggState {
    count: i64,
    sum: f64,
    min: Option<f64>,
    max: Option<f64>,
}

impl AggState {
    fn accumulate(&mut self, func: AggFunc, value: &Value) {
        if value.is_null() && func != AggFunc::Count {
            return;
        }
        let numeric = match value {
            Value::Int64(v) => *v as f64,
            Value::Double(v) => *v,
            _ => 0.0,
        };
        match func {
            AggFunc::Count => self.count += 1,
            AggFunc::Sum | AggFunc::Avg => {
                self.count += 1;
                self.sum += numeric;
            }
            AggFunc::Min => {
                self.min = Some(self.min.map_or(numeric, |m| m.min(numeric)));
            }
            AggFunc::Max => {
                self.max = Some(self.max.map_or(numeric, |m| m.max(numeric)));
            }
        }
    }

    fn finalize(&self, func: AggFunc) -> Value {
        match func {
            AggFunc::Count => Value::Int64(self.count),
            AggFunc::Sum => Value::Double(self.sum),
            AggFunc::Avg => {
                if self.count == 0 {
                    Value::Null
                } else {
                    Value::Double(self.sum / self.count as f64)
                }
            }
            AggFunc::Min => self.min.map(Value::Double).unwrap_or(Value::Null),
            AggFunc::Max => self.max.map(Value::Double).unwrap_or(Value::Null),
        }
    }
}

/// Hash-grouped aggregation (spec §4.H "Aggregate (hash)"). Drains the
/// child fully, then emits one row per distinct group.
pub struct Aggregate {
    child: Box<dyn PhysicalOperator>,
    group_by_idxs: Vec<usize>,
    aggs: Vec<(AggFunc, usize)>,
    emitted: bool,
}

impl Aggregate {
    pub fn new(child: Box<dyn PhysicalOperator>, group_by_idxs: Vec<usize>, aggs: Vec<(AggFunc, usize)>) -> Self {
        Self {
            child,
            group_by_idxs,
            aggs,
            emitted: false,
        }
    }
}

impl PhysicalOperator for Aggregate {
    fn get_next_tuple(&mut self, ctx: &ExecContext, out: &mut Vec<Tuple>) -> GraphResult<bool> {
        ctx.check_interrupted()?;
        if self.emitted {
            return Ok(false);
        }
        let mut groups: HashMap<String, (Vec<Value>, Vec<AggState>)> = HashMap::new();
        loop {
            let mut batch = Vec::new();
            if !self.child.get_next_tuple(ctx, &mut batch)? {
                break;
            }
            for tuple in batch {
                let keys: Vec<Value> = self.group_by_idxs.iter().map(|&i| tuple[i].clone()).collect();
                let key_str = group_key(&keys);
                let entry = groups
                    .entry(key_str)
                    .or_insert_with(|| (keys.clone(), vec![AggState::default(); self.aggs.len()]));
                for (state, (func, col)) in entry.1.iter_mut().zip(self.aggs.iter()) {
                    state.accumulate(*func, &tuple[*col]);
                }
            }
        }
        for (_, (keys, states)) in groups {
            let mut row = keys;
            for (state, (func, _)) in states.iter().zip(self.aggs.iter()) {
                row.push(state.finalize(*func));
            }
            out.push(row);
        }
        self.emitted = true;
        Ok(true)
    }
}

/// Full materialize + sort, with an optional top-k truncation (spec §4.H
/// "Order-by / top-k").
pub struct OrderBy {
    child: Box<dyn PhysicalOperator>,
    sort_col: usize,
    descending: bool,
    limit: Option<usize>,
    emitted: bool,
}

impl OrderBy {
    pub fn new(child: Box<dyn PhysicalOperator>, sort_col: usize, descending: bool, limit: Option<usize>) -> Self {
        Self {
            child,
            sort_col,
            descending,
            limit,
            emitted: false,
        }
    }
}

impl PhysicalOperator for OrderBy {
    fn get_next_tuple(&mut self, ctx: &ExecContext, out: &mut Vec<Tuple>) -> GraphResult<bool> {
        ctx.check_interrupted()?;
        if self.emitted {
            return Ok(false);
        }
        let mut rows = Vec::new();
        loop {
            let mut batch = Vec::new();
            if !self.child.get_next_tuple(ctx, &mut batch)? {
                break;
            }
            rows.extend(batch);
        }
        rows.sort_by(|a, b| cmp_values(&a[self.sort_col], &b[self.sort_col]));
        if self.descending {
            rows.reverse();
        }
        if let Some(limit) = self.limit {
            rows.truncate(limit);
        }
        out.extend(rows);
        self.emitted = true;
        Ok(true)
    }
}

/// Buffers inserted rows into the active transaction's local node group.
/// Primary-key uniqueness can only be checked against the persisted index
/// at commit time (spec §4.H "Insert / update / delete", §4.I "commit") —
/// another writer's insert of the same key is invisible here until it
/// commits, so checking now would both race and reject keys that are in
/// fact free.
pub struct InsertNode {
    table_name: String,
    child: Box<dyn PhysicalOperator>,
    ignore_errors: bool,
}

impl InsertNode {
    /// `table`/`pk_column_index` are accepted for call-site symmetry with
    /// [`DeleteNode`]/[`UpdateNode`] (every write operator names the table
    /// it targets against the caller's live handle) but are no longer
    /// consulted here now that the duplicate-key check lives in
    /// [`crate::database::Database::commit`].
    pub fn new(_table: Arc<Mutex<NodeTable>>, table_name: impl Into<String>, _pk_column_index: usize, child: Box<dyn PhysicalOperator>, ignore_errors: bool) -> Self {
        Self {
            table_name: table_name.into(),
            child,
            ignore_errors,
        }
    }
}

impl PhysicalOperator for InsertNode {
    fn get_next_tuple(&mut self, ctx: &ExecContext, out: &mut Vec<Tuple>) -> GraphResult<bool> {
        ctx.check_interrupted()?;
        let mut batch = Vec::new();
        if !self.child.get_next_tuple(ctx, &mut batch)? {
            return Ok(false);
        }
        let mut local = ctx.local.borrow_mut();
        let mut inserted = 0i64;
        for row in batch {
            local.node_group_mut(&self.table_name).insert(row, self.ignore_errors);
            inserted += 1;
        }
        out.push(vec![Value::Int64(inserted)]);
        Ok(true)
    }
}

/// Tombstones node offsets produced by `child`'s first column (spec §4.H).
pub struct DeleteNode {
    table_name: String,
    offset_col: usize,
    child: Box<dyn PhysicalOperator>,
}

impl DeleteNode {
    pub fn new(table_name: impl Into<String>, offset_col: usize, child: Box<dyn PhysicalOperator>) -> Self {
        Self {
            table_name: table_name.into(),
            offset_col,
            child,
        }
    }
}

impl PhysicalOperator for DeleteNode {
    fn get_next_tuple(&mut self, ctx: &ExecContext, out: &mut Vec<Tuple>) -> GraphResult<bool> {
        ctx.check_interrupted()?;
        let mut batch = Vec::new();
        if !self.child.get_next_tuple(ctx, &mut batch)? {
            return Ok(false);
        }
        let mut local = ctx.local.borrow_mut();
        let mut deleted = 0i64;
        for row in batch {
            let offset = row[self.offset_col]
                .as_int64()
                .ok_or_else(|| GraphError::internal("delete expects an Int64 offset"))? as u64;
            local.node_group_mut(&self.table_name).delete(offset);
            deleted += 1;
        }
        out.push(vec![Value::Int64(deleted)]);
        Ok(true)
    }
}

/// In-place column updates (spec §4.H): each input tuple is
/// `(offset, value)`.
pub struct UpdateNode {
    table_name: String,
    column_index: usize,
    offset_col: usize,
    value_col: usize,
    child: Box<dyn PhysicalOperator>,
}

impl UpdateNode {
    pub fn new(table_name: impl Into<String>, column_index: usize, offset_col: usize, value_col: usize, child: Box<dyn PhysicalOperator>) -> Self {
        Self {
            table_name: table_name.into(),
            column_index,
            offset_col,
            value_col,
            child,
        }
    }
}

impl PhysicalOperator for UpdateNode {
    fn get_next_tuple(&mut self, ctx: &ExecContext, out: &mut Vec<Tuple>) -> GraphResult<bool> {
        ctx.check_interrupted()?;
        let mut batch = Vec::new();
        if !self.child.get_next_tuple(ctx, &mut batch)? {
            return Ok(false);
        }
        let mut local = ctx.local.borrow_mut();
        let mut updated = 0i64;
        for row in batch {
            let offset = row[self.offset_col]
                .as_int64()
                .ok_or_else(|| GraphError::internal("update expects an Int64 offset"))? as u64;
            local.node_group_mut(&self.table_name).update(offset, self.column_index, row[self.value_col].clone());
            updated += 1;
        }
        out.push(vec![Value::Int64(updated)]);
        Ok(true)
    }
}

/// Buffers a rel insert: each input tuple is `(src_offset, dst_offset,
/// property...)`.
pub struct InsertRel {
    rel_table: Arc<Mutex<RelTable>>,
    table_name: String,
    child: Box<dyn PhysicalOperator>,
}

impl InsertRel {
    pub fn new(rel_table: Arc<Mutex<RelTable>>, table_name: impl Into<String>, child: Box<dyn PhysicalOperator>) -> Self {
        Self {
            rel_table,
            table_name: table_name.into(),
            child,
        }
    }
}

impl PhysicalOperator for InsertRel {
    fn get_next_tuple(&mut self, ctx: &ExecContext, out: &mut Vec<Tuple>) -> GraphResult<bool> {
        ctx.check_interrupted()?;
        let mut batch = Vec::new();
        if !self.child.get_next_tuple(ctx, &mut batch)? {
            return Ok(false);
        }
        let mut rel_table = self.rel_table.lock().unwrap();
        let mut local = ctx.local.borrow_mut();
        let mut inserted = 0i64;
        for row in batch {
            let src = row[0].as_int64().ok_or_else(|| GraphError::internal("rel insert expects src offset"))? as u64;
            let dst = row[1].as_int64().ok_or_else(|| GraphError::internal("rel insert expects dst offset"))? as u64;
            let rel_id = rel_table.alloc_rel_id();
            local.rel_table_mut(&self.table_name).insert(RelRow {
                rel_id,
                src,
                dst,
                properties: row[2..].to_vec(),
            });
            inserted += 1;
        }
        out.push(vec![Value::Int64(inserted)]);
        Ok(true)
    }
}

/// Deletes a rel by `(src_offset, dst_offset, rel_id)`, recorded for the
/// commit path to apply against the committed CSR groups (spec §4.H, §4.F
/// "directed rel delete").
pub struct DeleteRel {
    table_name: String,
    child: Box<dyn PhysicalOperator>,
}

impl DeleteRel {
    pub fn new(table_name: impl Into<String>, child: Box<dyn PhysicalOperator>) -> Self {
        Self {
            table_name: table_name.into(),
            child,
        }
    }
}

impl PhysicalOperator for DeleteRel {
    fn get_next_tuple(&mut self, ctx: &ExecContext, out: &mut Vec<Tuple>) -> GraphResult<bool> {
        ctx.check_interrupted()?;
        let mut batch = Vec::new();
        if !self.child.get_next_tuple(ctx, &mut batch)? {
            return Ok(false);
        }
        let mut local = ctx.local.borrow_mut();
        let mut deleted = 0i64;
        for row in batch {
            let src = row[0].as_int64().ok_or_else(|| GraphError::internal("rel delete expects src offset"))? as u64;
            let dst = row[1].as_int64().ok_or_else(|| GraphError::internal("rel delete expects dst offset"))? as u64;
            let rel_id = row[2].as_int64().ok_or_else(|| GraphError::internal("rel delete expects rel id"))? as u64;
            local.rel_table_mut(&self.table_name).delete(src, dst, rel_id);
            deleted += 1;
        }
        out.push(vec![Value::Int64(deleted)]);
        Ok(true)
    }
}

/// Sink that buffers every tuple pulled from `child` (spec §4.H "Result
/// collector").
pub struct ResultCollector {
    child: Box<dyn PhysicalOperator>,
    pub collected: Vec<Tuple>,
}

impl ResultCollector {
    pub fn new(child: Box<dyn PhysicalOperator>) -> Self {
        Self {
            child,
            collected: Vec::new(),
        }
    }

    /// Drains the child operator entirely, honoring cancellation.
    pub fn run(&mut self, ctx: &ExecContext) -> GraphResult<&[Tuple]> {
        loop {
            let mut batch = Vec::new();
            if !self.child.get_next_tuple(ctx, &mut batch)? {
                break;
            }
            self.collected.extend(batch);
        }
        Ok(&self.collected)
    }
}
