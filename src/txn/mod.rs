//! Transaction lifecycle and single-writer discipline: an `AtomicU32` id
//! counter, explicit `commit`/`abort` methods, and separate tracking of
//! active transactions behind a mutex rather than a lock-free structure.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{GraphError, GraphResult};
use crate::local::LocalStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionID(pub u64);

impl fmt::Display for TransactionID {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Active,
    Committed,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    Write,
}

pub struct Transaction {
    pub id: TransactionID,
    pub mode: TransactionMode,
    /// The commit sequence number this transaction's reads are pinned to
    /// (spec §4.J "snapshot isolation"): captured once at `begin` and held
    /// fixed for the transaction's whole lifetime, so a read-only
    /// transaction never observes a commit made after it began.
    pub snapshot_timestamp: u64,
    status: TransactionStatus,
    /// Shared (not `Sync`) so the single-threaded operator tree executing
    /// on behalf of this transaction can mutate it through [`crate::exec::ExecContext`]
    /// without the transaction itself needing interior mutability on every
    /// field.
    pub local: Rc<RefCell<LocalStore>>,
    /// `ignore_errors` warning buffer (spec §10 supplemented feature).
    pub warnings: Vec<String>,
}

impl Transaction {
    fn new(id: TransactionID, mode: TransactionMode, snapshot_timestamp: u64) -> Self {
        Self {
            id,
            mode,
            snapshot_timestamp,
            status: TransactionStatus::Active,
            local: Rc::new(RefCell::new(LocalStore::new())),
            warnings: Vec::new(),
        }
    }

    pub fn is_write(&self) -> bool {
        self.mode == TransactionMode::Write
    }

    pub fn status(&self) -> TransactionStatus {
        self.status
    }

    fn mark_committed(&mut self) {
        self.status = TransactionStatus::Committed;
    }

    fn mark_aborted(&mut self) {
        self.status = TransactionStatus::Aborted;
    }

    pub fn record_warning(&mut self, msg: impl Into<String>) {
        self.warnings.push(msg.into());
    }
}

/// Single-writer, multi-reader transaction manager (spec §4.J).
pub struct TransactionManager {
    next_id: AtomicU64,
    /// Monotonically increasing commit sequence number. Bumped once per
    /// write commit ([`TransactionManager::next_commit_seq`]), never by
    /// checkpointing — checkpointing only changes what is durable on disk,
    /// not what is visible, so it must not move the snapshot a transaction
    /// is pinned to.
    snapshot_clock: AtomicU64,
    writer: Mutex<Option<TransactionID>>,
    active_readers: Mutex<HashSet<TransactionID>>,
    checkpoint_in_progress: Mutex<bool>,
}

impl TransactionManager {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            snapshot_clock: AtomicU64::new(0),
            writer: Mutex::new(None),
            active_readers: Mutex::new(HashSet::new()),
            checkpoint_in_progress: Mutex::new(false),
        }
    }

    fn alloc_id(&self) -> TransactionID {
        TransactionID(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    pub fn current_snapshot(&self) -> u64 {
        self.snapshot_clock.load(Ordering::SeqCst)
    }

    /// Allocates the next commit sequence number, advancing what future
    /// `begin_read_only`/`begin_write` calls will see. Called once per
    /// write commit, before the writer's rows are stamped and applied.
    pub fn next_commit_seq(&self) -> u64 {
        self.snapshot_clock.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn begin_read_only(&self) -> Transaction {
        let id = self.alloc_id();
        let tx = Transaction::new(id, TransactionMode::ReadOnly, self.current_snapshot());
        self.active_readers.lock().unwrap().insert(id);
        tx
    }

    pub fn begin_write(&self) -> GraphResult<Transaction> {
        if *self.checkpoint_in_progress.lock().unwrap() {
            return Err(GraphError::transaction_manager("checkpoint in progress, cannot begin a write transaction"));
        }
        let mut writer = self.writer.lock().unwrap();
        if writer.is_some() {
            return Err(GraphError::transaction_manager("a write transaction is already active"));
        }
        let id = self.alloc_id();
        *writer = Some(id);
        Ok(Transaction::new(id, TransactionMode::Write, self.current_snapshot()))
    }

    pub fn commit(&self, tx: &mut Transaction) -> GraphResult<()> {
        if tx.status() != TransactionStatus::Active {
            return Err(GraphError::transaction_manager("commit on a non-active transaction"));
        }
        if tx.is_write() {
            let mut writer = self.writer.lock().unwrap();
            if *writer != Some(tx.id) {
                return Err(GraphError::conflict("commit by a transaction that is not the active writer", tx.id));
            }
            *writer = None;
        } else {
            self.active_readers.lock().unwrap().remove(&tx.id);
        }
        tx.mark_committed();
        Ok(())
    }

    pub fn rollback(&self, tx: &mut Transaction) {
        if tx.is_write() {
            let mut writer = self.writer.lock().unwrap();
            if *writer == Some(tx.id) {
                *writer = None;
            }
        } else {
            self.active_readers.lock().unwrap().remove(&tx.id);
        }
        tx.mark_aborted();
    }

    /// Blocks new write transactions, waits up to `timeout_us` for active
    /// readers to drain, then runs `do_replay` (the shadow WAL checkpoint).
    /// Does not touch the snapshot clock: checkpointing only moves
    /// already-committed data from the shadow WAL onto its real pages, it
    /// does not itself commit anything (spec §4.J).
    pub fn checkpoint<F>(&self, timeout_us: u64, do_replay: F) -> GraphResult<()>
    where
        F: FnOnce() -> GraphResult<()>,
    {
        *self.checkpoint_in_progress.lock().unwrap() = true;
        let result = self.checkpoint_inner(timeout_us, do_replay);
        *self.checkpoint_in_progress.lock().unwrap() = false;
        result
    }

    fn checkpoint_inner<F>(&self, timeout_us: u64, do_replay: F) -> GraphResult<()>
    where
        F: FnOnce() -> GraphResult<()>,
    {
        let deadline = Instant::now() + Duration::from_micros(timeout_us);
        loop {
            if self.active_readers.lock().unwrap().is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                return Err(GraphError::transaction_manager(
                    "checkpoint timed out waiting for active read-only transactions to drain",
                ));
            }
            std::thread::sleep(Duration::from_micros(500));
        }
        do_replay()?;
        Ok(())
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_one_write_transaction_at_a_time() {
        let mgr = TransactionManager::new();
        let _tx1 = mgr.begin_write().unwrap();
        assert!(mgr.begin_write().is_err());
    }

    #[test]
    fn commit_releases_writer_slot() {
        let mgr = TransactionManager::new();
        let mut tx1 = mgr.begin_write().unwrap();
        mgr.commit(&mut tx1).unwrap();
        assert!(mgr.begin_write().is_ok());
    }

    #[test]
    fn readers_do_not_block_each_other() {
        let mgr = TransactionManager::new();
        let _r1 = mgr.begin_read_only();
        let _r2 = mgr.begin_read_only();
        assert!(mgr.begin_write().is_ok());
    }

    #[test]
    fn checkpoint_times_out_with_active_reader() {
        let mgr = TransactionManager::new();
        let _r = mgr.begin_read_only();
        let result = mgr.checkpoint(1000, || Ok(()));
        assert!(result.is_err());
    }

    #[test]
    fn checkpoint_proceeds_once_readers_drain() {
        let mgr = TransactionManager::new();
        let mut r = mgr.begin_read_only();
        mgr.commit(&mut r).unwrap();
        assert!(mgr.checkpoint(1_000_000, || Ok(())).is_ok());
    }
}
