//! Database-wide configuration.
//!
//! Built once and handed to [`crate::database::Database::new`] explicitly
//! rather than reading it back out of environment variables.

pub const PAGE_SIZE: usize = 4096;
pub const NODE_GROUP_SIZE: usize = 1 << 17;
pub const VECTOR_CAPACITY: usize = 2048;
pub const OVERLARGE_LIMIT: usize = PAGE_SIZE;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Total buffer pool size in bytes; frame count = this / PAGE_SIZE.
    pub buffer_pool_bytes: usize,
    /// Execution parallelism.
    pub max_threads: usize,
    /// Max wait for read-only transactions to drain before a checkpoint fails.
    pub checkpoint_wait_timeout_us: u64,
    /// WAL size, in bytes, that triggers an automatic checkpoint.
    pub wal_size_threshold_bytes: u64,
    /// Per-batch-insert policy: skip rows that fail constraints instead of
    /// aborting the whole batch.
    pub ignore_errors: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            buffer_pool_bytes: 1 << 30,
            max_threads: num_cpus(),
            checkpoint_wait_timeout_us: 5_000_000,
            wal_size_threshold_bytes: 64 << 20,
            ignore_errors: false,
        }
    }
}

impl DatabaseConfig {
    pub fn frame_count(&self) -> usize {
        (self.buffer_pool_bytes / PAGE_SIZE).max(1)
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}
