//! Persistence Manager (C5): coordinates the buffer pool, WAL, and
//! checkpoint manager into flush-a-page / flush-all-dirty / create-checkpoint
//! / recover, plus the two background tickers that drive them.

use buffer::BufferPool;
use checkpoint::{CheckpointManager, CheckpointManifest};
use common::{DbResult, Lsn, PageId, SpaceId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use storage::PageBuf;
use tokio::sync::Mutex;
use txn::CancelToken;
use wal::Wal;

fn bincode_config() -> impl bincode::config::Config {
    bincode::config::legacy()
}

/// The redo records this crate itself writes to the WAL. DML-level
/// insert/update/delete/commit/rollback records are written by the
/// executor directly through [`PersistenceManager::append_redo`]; this
/// crate only needs to know about its own page-flush record.
#[derive(Clone, Debug, Serialize, Deserialize)]
enum RedoRecord {
    /// A complete, idempotent snapshot of one page, written just before
    /// that page's content is flushed to its backing tablespace. Replaying
    /// this record restores the page regardless of whether the original
    /// flush to disk ever completed.
    PageFlush {
        space: SpaceId,
        page: PageId,
        image: Vec<u8>,
    },
}

/// Coordinates C2 (buffer pool), C3 (WAL), and C4 (checkpoint manager).
pub struct PersistenceManager {
    pool: BufferPool,
    wal: Wal,
    checkpoints: CheckpointManager,
}

impl PersistenceManager {
    pub fn new(pool: BufferPool, wal: Wal, checkpoints: CheckpointManager) -> Self {
        Self {
            pool,
            wal,
            checkpoints,
        }
    }

    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    pub fn pool_mut(&mut self) -> &mut BufferPool {
        &mut self.pool
    }

    pub fn wal_mut(&mut self) -> &mut Wal {
        &mut self.wal
    }

    /// Appends an executor-authored redo record (insert/update/delete/
    /// commit/rollback) to the WAL, returning its assigned LSN.
    pub fn append_redo(&mut self, payload: &[u8]) -> DbResult<Lsn> {
        self.wal.append(payload)
    }

    /// Flushes one page if it is dirty: write a `page_flush` redo record,
    /// sync the WAL up through that record's LSN, then hand the page to
    /// the buffer pool to write to its tablespace. Returns whether
    /// anything was flushed.
    pub fn flush_page(&mut self, space: SpaceId, page: PageId) -> DbResult<bool> {
        if !self
            .pool
            .dirty_pages()
            .iter()
            .any(|(s, p, _)| *s == space && *p == page)
        {
            return Ok(false);
        }

        let image = self.pool.fetch_page(space, page)?.to_vec();
        self.pool.unpin_page(space, page, false, None)?;

        let payload = bincode::serde::encode_to_vec(
            RedoRecord::PageFlush {
                space,
                page,
                image,
            },
            bincode_config(),
        )
        .map_err(|e| common::DbError::Wal(format!("failed to encode page_flush record: {e}")))?;

        let lsn = self.wal.append(&payload)?;
        self.wal.sync()?;
        self.pool.flush_page(space, page, lsn)
    }

    /// Flushes every currently-dirty page, checking `cancel` between pages.
    pub fn flush_all_dirty(&mut self, cancel: &CancelToken) -> DbResult<usize> {
        let dirty = self.pool.dirty_pages();
        let mut flushed = 0;
        for (space, page, _) in dirty {
            cancel.check()?;
            if self.flush_page(space, page)? {
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    /// Flushes every dirty page, then writes a checkpoint manifest, then
    /// (optionally) truncates WAL segments fully covered by it.
    pub fn create_checkpoint(
        &mut self,
        cancel: &CancelToken,
        truncate_wal: bool,
    ) -> DbResult<CheckpointManifest> {
        self.flush_all_dirty(cancel)?;
        let open_spaces = self.pool.storage().list_spaces()?;
        let checkpoint_lsn = last_durable_lsn(&self.wal);
        let manifest = self.checkpoints.take(checkpoint_lsn, open_spaces)?;
        if truncate_wal {
            self.wal.truncate(checkpoint_lsn)?;
        }
        tracing::info!(lsn = checkpoint_lsn.0, index = manifest.index, "checkpoint written");
        Ok(manifest)
    }

    /// Reads the latest checkpoint (or starts from LSN 0), streams WAL
    /// entries from that point, and reapplies every `page_flush` record
    /// idempotently. Returns the number of records replayed.
    pub fn recover(&mut self) -> DbResult<usize> {
        let from = match self.checkpoints.read_latest()? {
            Some(manifest) => manifest.checkpoint_lsn,
            None => Lsn::ZERO,
        };
        let records = self.wal.replay_from(from)?;
        let mut applied = 0;
        for record in &records {
            let Ok((op, _)): Result<(RedoRecord, usize), _> =
                bincode::serde::decode_from_slice(&record.payload, bincode_config())
            else {
                continue;
            };
            match op {
                RedoRecord::PageFlush { space, page, image } => {
                    if self.pool.storage_mut().open_space(space).is_err() {
                        self.pool.storage_mut().create_space(space)?;
                    }
                    self.pool
                        .storage_mut()
                        .write_page(space, page, &PageBuf { data: image })?;
                }
            }
            applied += 1;
        }
        tracing::info!(from = from.0, applied, "recovery replay complete");
        Ok(applied)
    }
}

fn last_durable_lsn(wal: &Wal) -> Lsn {
    let next = wal.next_lsn();
    if next.0 <= 1 { Lsn::ZERO } else { Lsn(next.0 - 1) }
}

/// Runs the flush ticker until `cancel` is set: every `period`, flushes all
/// dirty pages. Intended to be spawned as its own tokio task.
pub async fn flush_ticker(
    manager: Arc<Mutex<PersistenceManager>>,
    period: Duration,
    cancel: CancelToken,
) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        if cancel.is_cancelled() {
            let mut guard = manager.lock().await;
            let _ = guard.flush_all_dirty(&cancel);
            return;
        }
        let mut guard = manager.lock().await;
        if let Err(err) = guard.flush_all_dirty(&cancel) {
            tracing::warn!(?err, "flush ticker iteration failed");
        }
    }
}

/// Runs the checkpoint ticker until `cancel` is set: every `period`, takes
/// a checkpoint and truncates WAL up to it.
pub async fn checkpoint_ticker(
    manager: Arc<Mutex<PersistenceManager>>,
    period: Duration,
    cancel: CancelToken,
) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        if cancel.is_cancelled() {
            let mut guard = manager.lock().await;
            let _ = guard.create_checkpoint(&cancel, true);
            return;
        }
        let mut guard = manager.lock().await;
        if let Err(err) = guard.create_checkpoint(&cancel, true) {
            tracing::warn!(?err, "checkpoint ticker iteration failed");
        }
    }
}

#[cfg(test)]
mod tests;
