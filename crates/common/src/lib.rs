#[cfg(test)]
mod tests;

use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf, time::Duration};
use thiserror::Error;

/// Identifier for a column within a table schema.
pub type ColumnId = u16;

/// Identifier for a tablespace file (one per table, one per index).
/// Examples:
/// - `let system_space = SpaceId(0);`
/// - `let users_table_space = SpaceId(12);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SpaceId(pub u32);

/// Logical page number, scoped to a single [`SpaceId`]; page 0 of any space
/// is always its header/free-list page.
/// Examples:
/// - `let header_page = PageId(0);`
/// - `let leaf_page = PageId(42);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageId(pub u32);

/// Fully-qualified page address: which tablespace, and which page within it.
/// Examples:
/// - `let addr = PageAddress { space: SpaceId(3), page: PageId(0) };`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageAddress {
    pub space: SpaceId,
    pub page: PageId,
}

impl PageAddress {
    pub fn new(space: SpaceId, page: PageId) -> Self {
        Self { space, page }
    }
}

/// Logical identifier for a table registered in the catalog.
/// Examples:
/// - `let users = TableId(7);`
/// - `let system_tables = TableId(0);`
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(pub u64);

/// Logical identifier for an index registered in the catalog. Primary key
/// indexes and secondary indexes share this namespace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IndexId(pub u64);

/// Identifier for an in-flight transaction. Monotonically increasing,
/// assigned when a transaction begins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TxnId(pub u64);

/// Log sequence number: a strictly increasing byte offset into the logical
/// WAL stream. `Lsn(0)` is reserved to mean "nothing has been logged yet".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const ZERO: Lsn = Lsn(0);

    pub fn next(self, len: u64) -> Lsn {
        Lsn(self.0 + len)
    }
}

/// Canonical error type shared across database subsystems.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("parse: {0}")]
    Parser(String),
    #[error("plan: {0}")]
    Planner(String),
    #[error("exec: {0}")]
    Executor(String),
    #[error("catalog: {0}")]
    Catalog(String),
    #[error("storage: {0}")]
    Storage(String),
    #[error("wal: {0}")]
    Wal(String),
    #[error("constraint violation: {0}")]
    Constraint(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("corruption detected: {0}")]
    Corruption(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("timed out: {0}")]
    Timeout(String),
    #[error("buffer pool exhausted ({pinned} of {capacity} frames pinned)")]
    PoolExhausted { pinned: usize, capacity: usize },
    #[error("internal invariant violated: {0}")]
    Internal(String),
    #[error("transaction {0:?} aborted")]
    TxnAborted(TxnId),
    #[error("transaction {0:?} chosen as deadlock victim")]
    DeadlockAbort(TxnId),
    #[error("duplicate key in unique index")]
    DuplicateKey,
    #[error("b+tree structure corrupt: {0}")]
    TreeCorrupt(String),
    #[error("table not found: {0}")]
    TableNotFound(String),
    #[error("column mismatch: {0}")]
    ColumnMismatch(String),
    #[error("value too long: {0}")]
    ValueTooLong(String),
    #[error("not-null violation: {0}")]
    NotNullViolation(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a `DbError`.
pub type DbResult<T> = Result<T, DbError>;

/// WAL durability posture: how aggressively log records are forced to disk
/// before a transaction is considered committed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncMode {
    /// fsync after every single append; strongest durability, highest latency.
    Immediate,
    /// batch concurrent commits into a single fsync.
    GroupCommit,
    /// rely on a background ticker to fsync periodically; commit returns
    /// before the record is durable.
    Async,
}

/// Runtime configuration for the database components.
///
/// # Example
/// ```
/// use common::Config;
/// use std::path::PathBuf;
///
/// let config = Config::builder()
///     .data_dir(PathBuf::from("./my_db"))
///     .page_size(16384)
///     .buffer_pool_pages(512)
///     .wal_enabled(true)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Directory where tablespace files, catalog metadata, WAL segments, and
    /// checkpoint manifests live.
    #[builder(default = PathBuf::from("./db_data"))]
    pub data_dir: PathBuf,
    /// Fixed-size page allocation in bytes, shared by every tablespace.
    #[builder(default = 16384)]
    pub page_size: usize,
    /// Number of page frames the buffer pool keeps resident.
    #[builder(default = 256)]
    pub buffer_pool_pages: usize,
    /// Controls whether the write-ahead log is enabled.
    #[builder(default = true)]
    pub wal_enabled: bool,
    /// WAL durability posture.
    #[builder(default = SyncMode::GroupCommit)]
    pub sync_mode: SyncMode,
    /// Maximum size, in bytes, of a single WAL segment file before rotation.
    #[builder(default = 100 * 1024 * 1024)]
    pub wal_segment_bytes: u64,
    /// Interval between background dirty-page flush sweeps.
    #[builder(default = Duration::from_secs(5))]
    pub flush_interval: Duration,
    /// Interval between background checkpoints.
    #[builder(default = Duration::from_secs(60))]
    pub checkpoint_interval: Duration,
    /// Number of historical checkpoint manifests retained before GC.
    #[builder(default = 10)]
    pub max_checkpoints: usize,
    /// Milliseconds a block must sit unaccessed in the LRU "old" sublist
    /// before a repeat access promotes it to "young" (anti-scan-thrashing).
    #[builder(default = 1000)]
    pub old_block_time_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./db_data"),
            page_size: 16384,
            buffer_pool_pages: 256,
            wal_enabled: true,
            sync_mode: SyncMode::GroupCommit,
            wal_segment_bytes: 100 * 1024 * 1024,
            flush_interval: Duration::from_secs(5),
            checkpoint_interval: Duration::from_secs(60),
            max_checkpoints: 10,
            old_block_time_ms: 1000,
        }
    }
}

/// Execution statistics collected during query execution for EXPLAIN ANALYZE.
///
/// # Examples
/// ```
/// use common::ExecutionStats;
/// use std::time::Duration;
///
/// let stats = ExecutionStats {
///     open_time: Duration::from_millis(5),
///     total_next_time: Duration::from_millis(150),
///     close_time: Duration::from_millis(2),
///     rows_produced: 1000,
///     rows_filtered: 500,
///     pages_scanned: 10,
/// };
/// assert_eq!(stats.total_time().as_millis(), 157);
/// ```
#[derive(Clone, Debug, Default)]
pub struct ExecutionStats {
    /// Time spent in open() method
    pub open_time: Duration,
    /// Cumulative time spent across all next() calls
    pub total_next_time: Duration,
    /// Time spent in close() method
    pub close_time: Duration,
    /// Number of rows returned by this operator
    pub rows_produced: u64,
    /// Number of rows filtered out
    pub rows_filtered: u64,
    /// Number of pages scanned
    pub pages_scanned: u64,
}

impl ExecutionStats {
    /// Returns total execution time (open + next + close)
    pub fn total_time(&self) -> Duration {
        self.open_time + self.total_next_time + self.close_time
    }

    /// Formats duration in human-readable form (e.g., "123.45ms", "1.234s")
    pub fn format_duration(d: Duration) -> String {
        let micros = d.as_micros();
        if micros < 1000 {
            format!("{micros}µs")
        } else if micros < 1_000_000 {
            format!("{:.2}ms", micros as f64 / 1000.0)
        } else {
            format!("{:.3}s", micros as f64 / 1_000_000.0)
        }
    }
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{
        Config, DbError, DbResult, ExecutionStats, IndexId, Lsn, PageAddress, PageId, SpaceId,
        SyncMode, TableId, TxnId,
    };
    pub use types::{SqlType, Value};
}
