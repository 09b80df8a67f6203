//! Record-level locking with a timeout-based deadlock break.
//!
//! The tree itself only ever takes short-duration page latches (acquired
//! bottom-up, root before leaf, released once a child is safely latched).
//! This table is the separate, longer-duration lock a transaction holds on
//! a specific key for the life of the transaction; two transactions that
//! would otherwise cycle waiting on each other's record locks are broken by
//! letting the wait time out and surfacing `DeadlockAbort` to the loser.

use ahash::RandomState;
use common::{DbError, DbResult, TableId, TxnId};
use hashbrown::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A lockable record: the table it belongs to and its encoded index key.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub table_id: TableId,
    pub key: Vec<u8>,
}

impl RecordKey {
    pub fn new(table_id: TableId, key: Vec<u8>) -> Self {
        Self { table_id, key }
    }
}

struct Inner {
    holders: HashMap<RecordKey, TxnId, RandomState>,
}

/// Exclusive record locks, one holder per key at a time.
pub struct LockTable {
    inner: Mutex<Inner>,
    cv: Condvar,
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                holders: HashMap::default(),
            }),
            cv: Condvar::new(),
        }
    }

    /// Blocks until `txn_id` holds the lock on `key`, or until `timeout`
    /// elapses, in which case the caller is the deadlock loser and gets
    /// back `DbError::DeadlockAbort`.
    pub fn acquire(&self, key: &RecordKey, txn_id: TxnId, timeout: Duration) -> DbResult<()> {
        let mut guard = self.inner.lock().expect("lock table mutex poisoned");
        if guard.holders.get(key) == Some(&txn_id) {
            return Ok(());
        }
        let deadline = Instant::now() + timeout;
        loop {
            match guard.holders.get(key) {
                None => {
                    guard.holders.insert(key.clone(), txn_id);
                    return Ok(());
                }
                Some(_) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(DbError::DeadlockAbort(txn_id));
                    }
                    let (next_guard, timed_out) = self
                        .cv
                        .wait_timeout(guard, deadline - now)
                        .expect("lock table condvar poisoned");
                    guard = next_guard;
                    if timed_out.timed_out() && guard.holders.contains_key(key) {
                        return Err(DbError::DeadlockAbort(txn_id));
                    }
                }
            }
        }
    }

    /// Releases every lock held by `txn_id`, called on commit or abort.
    pub fn release_all(&self, txn_id: TxnId) {
        let mut guard = self.inner.lock().expect("lock table mutex poisoned");
        guard.holders.retain(|_, holder| *holder != txn_id);
        drop(guard);
        self.cv.notify_all();
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_txn_reacquires_its_own_lock() {
        let locks = LockTable::new();
        let key = RecordKey::new(TableId(1), vec![1, 2, 3]);
        locks.acquire(&key, TxnId(1), Duration::from_millis(50)).unwrap();
        locks.acquire(&key, TxnId(1), Duration::from_millis(50)).unwrap();
    }

    #[test]
    fn contended_lock_times_out_as_deadlock_abort() {
        let locks = LockTable::new();
        let key = RecordKey::new(TableId(1), vec![1]);
        locks.acquire(&key, TxnId(1), Duration::from_millis(50)).unwrap();

        let err = locks
            .acquire(&key, TxnId(2), Duration::from_millis(30))
            .unwrap_err();
        assert!(matches!(err, DbError::DeadlockAbort(TxnId(2))));
    }

    #[test]
    fn release_all_frees_locks_for_other_waiters() {
        let locks = LockTable::new();
        let key = RecordKey::new(TableId(1), vec![9]);
        locks.acquire(&key, TxnId(1), Duration::from_millis(50)).unwrap();
        locks.release_all(TxnId(1));
        locks.acquire(&key, TxnId(2), Duration::from_millis(50)).unwrap();
    }
}
