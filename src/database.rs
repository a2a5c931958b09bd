//! Wires components A-K together behind a `Database`/`Connection` surface,
//! built around a process-wide `Database` singleton
//! (`once_cell::sync::OnceCell` + `HandyRwLock`) rather than passing state
//! through every call site explicitly.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use log::info;
use once_cell::sync::OnceCell;

use crate::catalog::StatisticsCatalog;
use crate::column::{ColumnSchema, LogicalType};
use crate::config::DatabaseConfig;
use crate::csr::Direction;
use crate::error::{GraphError, GraphResult};
use crate::exec::{ExecContext, PhysicalOperator, ResultCollector};
use crate::schema::{NodeTable, RelTable};
use crate::storage::{BufferPool, PageFileHandle, ShadowWal};
use crate::txn::{Transaction, TransactionManager};
use crate::util::HandyRwLock;
use crate::value::Tuple;

static INSTANCE: OnceCell<RwLock<Database>> = OnceCell::new();

/// The process-wide handle spec §6 calls "the database instance": every
/// table, the buffer pool, the shadow WAL, and the one live transaction
/// manager it implies.
pub struct Database {
    dir: PathBuf,
    config: DatabaseConfig,
    pub buffer_pool: Arc<BufferPool>,
    pub shadow_wal: Arc<ShadowWal>,
    pub txn_manager: Arc<TransactionManager>,
    pub catalog: Mutex<StatisticsCatalog>,
    node_tables: Mutex<HashMap<String, Arc<Mutex<NodeTable>>>>,
    rel_tables: Mutex<HashMap<String, Arc<Mutex<RelTable>>>>,
    wal_bytes_since_checkpoint: std::sync::atomic::AtomicU64,
}

impl Database {
    /// Opens (or creates) a database rooted at `dir`. Catalog statistics are
    /// reloaded here; node and rel table data is reloaded lazily, the first
    /// time each table is re-registered via [`Database::create_node_table`]/
    /// [`Database::create_rel_table`] — both check for a prior wholesale
    /// dump under `dir` and reconstruct from it instead of starting empty
    /// (spec §6, §8 "checkpoint persists"). Durability for this reload is
    /// tied to [`Database::checkpoint`] having run at least once since the
    /// relevant commits: there is no WAL-backed redo of committed-but-not-
    /// yet-checkpointed writes (see DESIGN.md).
    pub fn open(dir: impl AsRef<Path>, config: DatabaseConfig) -> GraphResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        let buffer_pool = Arc::new(BufferPool::new(config.frame_count()));
        let shadow_wal = Arc::new(ShadowWal::open(dir.join("shadow.wal"))?);
        let catalog = StatisticsCatalog::open(&dir)?;
        info!("opened database at {}", dir.display());
        Ok(Self {
            dir,
            config,
            buffer_pool,
            shadow_wal,
            txn_manager: Arc::new(TransactionManager::new()),
            catalog: Mutex::new(catalog),
            node_tables: Mutex::new(HashMap::new()),
            rel_tables: Mutex::new(HashMap::new()),
            wal_bytes_since_checkpoint: std::sync::atomic::AtomicU64::new(0),
        })
    }

    /// Installs `db` as the process-wide singleton; panics if called twice.
    pub fn install(db: Database) -> &'static RwLock<Database> {
        INSTANCE.set(RwLock::new(db)).ok().expect("Database already installed");
        INSTANCE.get().unwrap()
    }

    pub fn global() -> &'static RwLock<Database> {
        INSTANCE.get().expect("Database::install was never called")
    }

    /// Registers a node table, reloading it from its wholesale-persisted
    /// sidecar (spec §8 "checkpoint persists") if one exists — the same
    /// check-and-load shape [`Database::create_rel_table`] already used for
    /// CSR adjacency, now also covering node column data.
    pub fn create_node_table(&self, name: impl Into<String>, schemas: Vec<ColumnSchema>, pk_column_index: usize) -> GraphResult<()> {
        let name = name.into();
        let file_path = self.dir.join(format!("{}.data.bin", name));
        let file = Arc::new(PageFileHandle::open(file_path)?);
        self.shadow_wal.register_file(self.next_file_index(), file.clone());
        let rows_path = self.dir.join(format!("{}.nodes.bin", name));
        let table = NodeTable::load(&rows_path, name.clone(), schemas, file, pk_column_index)?;
        self.node_tables.lock().unwrap().insert(name, Arc::new(Mutex::new(table)));
        Ok(())
    }

    pub fn create_rel_table(
        &self,
        name: impl Into<String>,
        src_table: impl Into<String>,
        dst_table: impl Into<String>,
        property_names: Vec<String>,
    ) -> GraphResult<()> {
        let name = name.into();
        let rels_path = self.dir.join(format!("{}.rels.bin", name));
        let table = if rels_path.exists() {
            let mut t = RelTable::new(name.clone(), src_table, dst_table, property_names.clone());
            t.csr = crate::csr::CsrTable::load(&rels_path, property_names)?;
            t
        } else {
            RelTable::new(name.clone(), src_table, dst_table, property_names)
        };
        self.rel_tables.lock().unwrap().insert(name, Arc::new(Mutex::new(table)));
        Ok(())
    }

    pub fn node_table(&self, name: &str) -> GraphResult<Arc<Mutex<NodeTable>>> {
        self.node_tables
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::invalid_input(format!("no such node table '{}'", name)))
    }

    pub fn rel_table(&self, name: &str) -> GraphResult<Arc<Mutex<RelTable>>> {
        self.rel_tables
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| GraphError::invalid_input(format!("no such rel table '{}'", name)))
    }

    fn next_file_index(&self) -> u32 {
        self.node_tables.lock().unwrap().len() as u32
    }

    pub fn begin_read_only(&self) -> Transaction {
        self.txn_manager.begin_read_only()
    }

    pub fn begin_write(&self) -> GraphResult<Transaction> {
        self.txn_manager.begin_write()
    }

    /// Applies a write transaction's local buffers into the persistent node
    /// and rel tables, updates running statistics, then releases the writer
    /// slot (spec §4.I "commit"). `ignore_errors` rows are skipped with a
    /// recorded warning rather than aborting the whole transaction (spec §10
    /// supplemented feature).
    pub fn commit(&self, tx: &mut Transaction) -> GraphResult<()> {
        let local = tx.local.clone();
        let commit_seq = self.txn_manager.next_commit_seq();
        {
            let local = local.borrow();
            for table_name in local.touched_node_tables() {
                let table = self.node_table(table_name)?;
                let mut table = table.lock().unwrap();
                let group = local.node_group(table_name).unwrap();
                let mut stats = self.catalog.lock().unwrap();
                for pending in &group.inserted {
                    match table.insert_row(&pending.row, commit_seq) {
                        Ok(_) => stats.node_stats_mut(table_name).num_rows += 1,
                        Err(e) if self.config.ignore_errors || pending.ignore_errors => tx.record_warning(e.to_string()),
                        Err(e) => return Err(e),
                    }
                }
                for &offset in &group.deletes {
                    table.delete_row(offset, commit_seq)?;
                    stats.node_stats_mut(table_name).num_rows = stats.node_stats_mut(table_name).num_rows.saturating_sub(1);
                }
                for &(offset, col, ref value) in &group.updates {
                    crate::schema::update_cell(&mut table, offset, col, value)?;
                }
            }
            for table_name in local.touched_rel_tables() {
                let table = self.rel_table(table_name)?;
                let mut table = table.lock().unwrap();
                let local_rel = local.rel_table(table_name).unwrap();
                let mut stats = self.catalog.lock().unwrap();
                for row in &local_rel.inserted {
                    let group = (row.src as usize) / crate::config::NODE_GROUP_SIZE;
                    let bwd_group = (row.dst as usize) / crate::config::NODE_GROUP_SIZE;
                    let src_local = (row.src as usize) % crate::config::NODE_GROUP_SIZE;
                    let dst_local = (row.dst as usize) % crate::config::NODE_GROUP_SIZE;
                    let props: Vec<i128> = row.properties.iter().map(crate::schema::value_to_i128).collect();
                    table.csr.merge_group(
                        Direction::Fwd,
                        group,
                        vec![crate::csr::CsrEdge {
                            src_local: src_local as u32,
                            dst_offset: row.dst,
                            rel_id: row.rel_id,
                            properties: props.clone(),
                        }],
                    );
                    table.csr.merge_group(
                        Direction::Bwd,
                        bwd_group,
                        vec![crate::csr::CsrEdge {
                            src_local: dst_local as u32,
                            dst_offset: row.src,
                            rel_id: row.rel_id,
                            properties: props,
                        }],
                    );
                    stats.rel_stats_mut(table_name).num_rels += 1;
                }
                for &(src, dst, rel_id) in &local_rel.deletes {
                    let group = (src as usize) / crate::config::NODE_GROUP_SIZE;
                    let bwd_group = (dst as usize) / crate::config::NODE_GROUP_SIZE;
                    let src_local = (src as usize) % crate::config::NODE_GROUP_SIZE;
                    let dst_local = (dst as usize) % crate::config::NODE_GROUP_SIZE;
                    table.csr.delete_edge(Direction::Fwd, group, src_local as u32, dst, rel_id);
                    table.csr.delete_edge(Direction::Bwd, bwd_group, dst_local as u32, src, rel_id);
                    stats.rel_stats_mut(table_name).num_rels = stats.rel_stats_mut(table_name).num_rels.saturating_sub(1);
                }
            }
        }
        self.txn_manager.commit(tx)?;
        self.wal_bytes_since_checkpoint
            .fetch_add(1, Ordering::Relaxed);
        if self.wal_bytes_since_checkpoint.load(Ordering::Relaxed) >= self.config.wal_size_threshold_bytes {
            self.checkpoint()?;
        }
        Ok(())
    }

    pub fn rollback(&self, tx: &mut Transaction) {
        self.txn_manager.rollback(tx);
    }

    /// Drains active readers, flushes every node table's sealed columns and
    /// writes its wholesale row dump, persists every rel table's CSR groups
    /// and the statistics catalog, then runs the shadow WAL's own
    /// replay/clear cycle (spec §4.C, §4.J). `NodeTable`/`CsrTable`/
    /// `StatisticsCatalog` all persist the same way: a full rewrite of one
    /// file per checkpoint, not page-level shadowing — the shadow WAL here
    /// only ever holds pages nothing in this pass stages into it, so
    /// `ShadowWal::checkpoint` runs as a harmless no-op rather than a
    /// load-bearing recovery step; it stays wired in because checkpointing
    /// is exactly when a shadow WAL is expected to be drained, and its own
    /// replay/clear behavior is what `shadow_wal.rs`'s tests exercise
    /// directly. Crash durability for node/rel data is therefore pinned to
    /// `checkpoint()` having completed, not to every individual commit (see
    /// DESIGN.md, `tests/checkpoint_replay.rs`).
    pub fn checkpoint(&self) -> GraphResult<()> {
        self.txn_manager.checkpoint(self.config.checkpoint_wait_timeout_us, || {
            for (name, table) in self.node_tables.lock().unwrap().iter() {
                let mut table = table.lock().unwrap();
                for column in &mut table.columns {
                    column.flush_all()?;
                }
                table.persist(self.dir.join(format!("{}.nodes.bin", name)))?;
            }
            for (name, table) in self.rel_tables.lock().unwrap().iter() {
                let table = table.lock().unwrap();
                table.csr.persist(self.dir.join(format!("{}.rels.bin", name)))?;
            }
            self.catalog.lock().unwrap().persist()?;
            self.shadow_wal.checkpoint()
        })?;
        self.wal_bytes_since_checkpoint.store(0, Ordering::Relaxed);
        Ok(())
    }
}

/// Per-transaction handle exposing the query/execute surface (spec §6). A
/// `Connection` owns exactly one [`Transaction`] at a time.
pub struct Connection<'a> {
    db: &'a Database,
    tx: Transaction,
    interrupted: Arc<AtomicBool>,
}

impl<'a> Connection<'a> {
    pub fn begin_read_only(db: &'a Database) -> Self {
        Self {
            db,
            tx: db.begin_read_only(),
            interrupted: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn begin_write(db: &'a Database) -> GraphResult<Self> {
        Ok(Self {
            db,
            tx: db.begin_write()?,
            interrupted: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Cooperative cancellation handle (spec §6): callers hold a clone of
    /// this and flip it from another thread to interrupt a running query.
    pub fn cancellation_token(&self) -> Arc<AtomicBool> {
        self.interrupted.clone()
    }

    /// Runs a physical plan to completion against this connection's
    /// transaction-local state, returning every tuple the root operator
    /// produced (spec §6 "query").
    pub fn query(&self, mut plan: Box<dyn PhysicalOperator>) -> GraphResult<Vec<Tuple>> {
        let ctx = ExecContext {
            interrupted: self.interrupted.clone(),
            local: self.tx.local.clone(),
            snapshot_seq: self.snapshot_seq(),
        };
        plan.init_global_state(&ctx)?;
        plan.init_local_state(&ctx)?;
        let mut collector = ResultCollector::new(plan);
        collector.run(&ctx)?;
        Ok(collector.collected.clone())
    }

    pub fn execute(&self, plan: Box<dyn PhysicalOperator>) -> GraphResult<Vec<Tuple>> {
        self.query(plan)
    }

    pub fn commit(mut self) -> GraphResult<()> {
        self.db.commit(&mut self.tx)
    }

    pub fn rollback(mut self) {
        self.db.rollback(&mut self.tx);
    }

    pub fn warnings(&self) -> &[String] {
        &self.tx.warnings
    }

    /// Exposes a fresh [`ExecContext`] sharing this connection's local
    /// buffer and cancellation token, for callers assembling their own
    /// operator tree incrementally rather than through [`Connection::query`].
    pub fn exec_context(&self) -> ExecContext {
        ExecContext {
            interrupted: self.interrupted.clone(),
            local: self.tx.local.clone(),
            snapshot_seq: self.snapshot_seq(),
        }
    }

    /// Write transactions always read the latest committed state (their own
    /// uncommitted writes live in `local`, not in the tables); read-only
    /// transactions are pinned to the sequence number captured at `begin`
    /// (spec §4.J, §8 "read-only snapshot").
    fn snapshot_seq(&self) -> u64 {
        if self.tx.is_write() {
            u64::MAX
        } else {
            self.tx.snapshot_timestamp
        }
    }
}
