//! Transaction context, the in-memory transaction table, logical undo, and
//! record-lock based deadlock handling that the DML executor (C10) uses to
//! scope every statement.
//!
//! Everything here is in-memory bookkeeping: durability comes from the WAL
//! records the executor writes alongside these calls, not from this crate.

mod locks;

pub use locks::{LockTable, RecordKey};

use ahash::RandomState;
use common::{DbError, DbResult, Lsn, PageId, SpaceId, TableId, TxnId};
use hashbrown::{HashMap, HashSet};
use std::sync::{
    Arc, RwLock,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

type Map<K, V> = HashMap<K, V, RandomState>;
type Set<K> = HashSet<K, RandomState>;

/// Status of a transaction across its lifetime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxnStatus {
    Active,
    Committed,
    Aborted,
}

/// The logical inverse of one DML mutation, recorded alongside the redo WAL
/// entry so a rollback can undo it without re-reading the WAL.
///
/// A row is identified here by its encoded primary key, not a page/slot
/// `RecordId`: storage is index-organized, so the clustered index's key is
/// the only stable handle a row has. Row payloads are carried as the same
/// encoded bytes the executor's row codec produces, so this crate never
/// needs to depend on `types`.
#[derive(Clone, Debug, PartialEq)]
pub enum UndoAction {
    /// Undo an insert by deleting the row it created.
    UndoInsert { table_id: TableId, pk: Vec<u8> },
    /// Undo a delete by reinserting the row it removed.
    UndoDelete {
        table_id: TableId,
        pk: Vec<u8>,
        row: Vec<u8>,
    },
    /// Undo an update by restoring the row's previous values.
    UndoUpdate {
        table_id: TableId,
        pk: Vec<u8>,
        before: Vec<u8>,
    },
}

/// `(txn_id, start_ts, status, modified_pages, first_lsn, last_lsn)` plus the
/// undo stack needed to roll the transaction back.
#[derive(Clone, Debug)]
pub struct TransactionContext {
    pub txn_id: TxnId,
    pub start_ts: u128,
    pub status: TxnStatus,
    pub modified_pages: Set<(SpaceId, PageId)>,
    pub first_lsn: Option<Lsn>,
    pub last_lsn: Option<Lsn>,
    undo_log: Vec<UndoAction>,
}

impl TransactionContext {
    fn new(txn_id: TxnId, start_ts: u128) -> Self {
        Self {
            txn_id,
            start_ts,
            status: TxnStatus::Active,
            modified_pages: Set::default(),
            first_lsn: None,
            last_lsn: None,
            undo_log: Vec::new(),
        }
    }

    /// Records that this transaction dirtied a page and assigns an LSN,
    /// tracking the transaction's first and most recent LSN.
    pub fn record_page(&mut self, space: SpaceId, page: PageId, lsn: Lsn) {
        self.modified_pages.insert((space, page));
        if self.first_lsn.is_none() {
            self.first_lsn = Some(lsn);
        }
        self.last_lsn = Some(lsn);
    }

    /// Pushes a logical undo action, applied in reverse order on rollback.
    pub fn push_undo(&mut self, action: UndoAction) {
        self.undo_log.push(action);
    }

    /// Drains the undo log in LIFO order for rollback.
    pub fn take_undo_log(&mut self) -> Vec<UndoAction> {
        let mut log = std::mem::take(&mut self.undo_log);
        log.reverse();
        log
    }
}

/// A cancellation flag threaded explicitly through long-running operations.
/// No ambient task-local state: a caller that wants cancellation support
/// must pass the token down.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(DbError::Cancelled)` if the token has been cancelled;
    /// intended to be called at cooperative checkpoints inside a loop.
    pub fn check(&self) -> DbResult<()> {
        if self.is_cancelled() {
            Err(DbError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Concurrent map of active and recently-finished transactions, keyed by
/// `txn_id`.
pub struct TxnTable {
    txns: RwLock<Map<TxnId, TransactionContext>>,
    next_id: AtomicU64,
}

impl TxnTable {
    pub fn new() -> Self {
        Self {
            txns: RwLock::new(Map::default()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Starts a new transaction and returns its id. `start_ts` is supplied
    /// by the caller (typically milliseconds since the Unix epoch) since
    /// this crate cannot read the clock itself in a way that stays
    /// deterministic for replay.
    pub fn begin(&self, start_ts: u128) -> TxnId {
        let id = TxnId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let ctx = TransactionContext::new(id, start_ts);
        self.txns
            .write()
            .expect("txn table lock poisoned")
            .insert(id, ctx);
        id
    }

    /// Runs `f` against the transaction's context, failing fast with
    /// `TxnAborted` if it has already been aborted.
    pub fn with_txn<T>(
        &self,
        txn_id: TxnId,
        f: impl FnOnce(&mut TransactionContext) -> DbResult<T>,
    ) -> DbResult<T> {
        let mut guard = self.txns.write().expect("txn table lock poisoned");
        let ctx = guard
            .get_mut(&txn_id)
            .ok_or_else(|| DbError::NotFound(format!("txn {}", txn_id.0)))?;
        if ctx.status == TxnStatus::Aborted {
            return Err(DbError::TxnAborted(txn_id));
        }
        f(ctx)
    }

    /// Marks a transaction committed at `commit_lsn`.
    pub fn commit(&self, txn_id: TxnId, commit_lsn: Lsn) -> DbResult<()> {
        let mut guard = self.txns.write().expect("txn table lock poisoned");
        let ctx = guard
            .get_mut(&txn_id)
            .ok_or_else(|| DbError::NotFound(format!("txn {}", txn_id.0)))?;
        ctx.last_lsn = Some(commit_lsn);
        ctx.status = TxnStatus::Committed;
        Ok(())
    }

    /// Marks a transaction aborted and returns its undo log for rollback.
    pub fn abort(&self, txn_id: TxnId) -> DbResult<Vec<UndoAction>> {
        let mut guard = self.txns.write().expect("txn table lock poisoned");
        let ctx = guard
            .get_mut(&txn_id)
            .ok_or_else(|| DbError::NotFound(format!("txn {}", txn_id.0)))?;
        let log = ctx.take_undo_log();
        ctx.status = TxnStatus::Aborted;
        Ok(log)
    }

    /// Snapshot of every still-active transaction id, for checkpoint
    /// records.
    pub fn active_txns(&self) -> Vec<TxnId> {
        self.txns
            .read()
            .expect("txn table lock poisoned")
            .values()
            .filter(|c| c.status == TxnStatus::Active)
            .map(|c| c.txn_id)
            .collect()
    }

    pub fn status(&self, txn_id: TxnId) -> Option<TxnStatus> {
        self.txns
            .read()
            .expect("txn table lock poisoned")
            .get(&txn_id)
            .map(|c| c.status)
    }
}

impl Default for TxnTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests;
