//! Buffer pool: the page cache sitting between the executor/B+Tree and the
//! tablespace files managed by `storage`.
//!
//! Modeled on the midpoint-insertion LRU used by production storage engines:
//! a page freshly read from disk enters the *old* sublist rather than the
//! head of the cache, and is only promoted to the *young* sublist if it is
//! accessed again after sitting in *old* for at least `old_block_time`. This
//! keeps a single sequential scan (a full table scan, a large range query)
//! from flushing genuinely hot pages out of the cache.
//!
//! Durability is layered in, not hard-wired: `flush_page`/`flush_all` take a
//! caller-supplied `durable_lsn` and refuse to write a page to disk whose
//! `oldest_modification_lsn` is not yet covered by it. The buffer pool has no
//! dependency on the `wal` crate; the `persistence` crate is what asks the
//! WAL how far it has synced and passes that value down.


use common::{DbError, DbResult, Lsn, PageId, SpaceId};
use hashbrown::HashMap;
use std::collections::VecDeque;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};
use storage::{PageBuf, StorageManager};

pub type FrameKey = (SpaceId, PageId);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Sublist {
    Young,
    Old,
}

struct Frame {
    data: Vec<u8>,
    pin_count: u32,
    dirty: bool,
    oldest_modification_lsn: Option<Lsn>,
    sublist: Sublist,
    entered_sublist_at: Instant,
    /// Content latch: crabbed up and down a B+Tree descent by callers that
    /// need shared or exclusive access to this page's bytes across more
    /// than one buffer pool call. Distinct from the pool's own frame-table
    /// bookkeeping, which is protected by `&mut self`.
    latch: Arc<RwLock<()>>,
}

/// Point-in-time counters useful for monitoring and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct BufferPoolStats {
    pub resident_pages: usize,
    pub capacity: usize,
    pub dirty_pages: usize,
    pub pinned_pages: usize,
    pub young_pages: usize,
    pub old_pages: usize,
    pub hits: u64,
    pub misses: u64,
    pub hit_rate: f64,
    pub reads: u64,
    pub writes: u64,
}

/// The page cache. Owns the [`StorageManager`] beneath it: all page I/O in
/// the engine flows through here.
pub struct BufferPool {
    storage: StorageManager,
    capacity: usize,
    old_block_time: Duration,
    frames: HashMap<FrameKey, Frame>,
    young: VecDeque<FrameKey>,
    old: VecDeque<FrameKey>,
    hits: u64,
    misses: u64,
    reads: u64,
    writes: u64,
}

impl BufferPool {
    /// # Panics
    /// Panics if `capacity` is 0.
    pub fn new(storage: StorageManager, capacity: usize, old_block_time: Duration) -> Self {
        assert!(capacity > 0, "buffer pool capacity must be > 0");
        Self {
            storage,
            capacity,
            old_block_time,
            frames: HashMap::new(),
            young: VecDeque::new(),
            old: VecDeque::new(),
            hits: 0,
            misses: 0,
            reads: 0,
            writes: 0,
        }
    }

    pub fn storage(&self) -> &StorageManager {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut StorageManager {
        &mut self.storage
    }

    pub fn page_size(&self) -> usize {
        self.storage.page_size()
    }

    /// Fetch a page, loading it from storage on a miss, and pin it so it
    /// cannot be evicted. The caller must pair this with `unpin_page`.
    pub fn fetch_page(&mut self, space: SpaceId, page: PageId) -> DbResult<&mut [u8]> {
        let key = (space, page);

        if self.frames.contains_key(&key) {
            self.hits += 1;
            self.touch(key);
        } else {
            self.misses += 1;
            self.reads += 1;
            self.make_room()?;
            let buf = self.storage.read_page(space, page)?;
            self.frames.insert(
                key,
                Frame {
                    data: buf.data,
                    pin_count: 0,
                    dirty: false,
                    oldest_modification_lsn: None,
                    sublist: Sublist::Old,
                    entered_sublist_at: Instant::now(),
                    latch: Arc::new(RwLock::new(())),
                },
            );
            self.old.push_front(key);
        }

        let frame = self.frames.get_mut(&key).expect("frame just inserted");
        frame.pin_count += 1;
        Ok(&mut frame.data)
    }

    /// Allocate a brand new page and pin it, ready for the caller to
    /// initialize and mark dirty via `unpin_page`.
    pub fn new_page(&mut self, space: SpaceId) -> DbResult<(PageId, &mut [u8])> {
        let page = self.storage.allocate_page(space)?;
        let key = (space, page);
        self.make_room()?;

        self.frames.insert(
            key,
            Frame {
                data: vec![0u8; self.storage.page_size()],
                pin_count: 1,
                dirty: true,
                oldest_modification_lsn: None,
                sublist: Sublist::Old,
                entered_sublist_at: Instant::now(),
                latch: Arc::new(RwLock::new(())),
            },
        );
        self.old.push_front(key);

        let frame = self.frames.get_mut(&key).expect("frame just inserted");
        Ok((page, &mut frame.data))
    }

    /// Hand out the content latch for a resident page, for a caller doing
    /// its own crabbing across a B+Tree descent. The page must already be
    /// resident (normally true right after `fetch_page`/`new_page`).
    pub fn page_latch(&self, space: SpaceId, page: PageId) -> DbResult<Arc<RwLock<()>>> {
        self.frames
            .get(&(space, page))
            .map(|f| f.latch.clone())
            .ok_or_else(|| DbError::Internal(format!("latch requested for non-resident page {page:?}")))
    }

    /// Release a pin acquired by `fetch_page`/`new_page`. If the page was
    /// modified, pass `dirty = true` and the LSN of the WAL record that
    /// covers the modification, so the buffer pool can enforce
    /// write-ahead-logging on flush.
    pub fn unpin_page(
        &mut self,
        space: SpaceId,
        page: PageId,
        dirty: bool,
        lsn: Option<Lsn>,
    ) -> DbResult<()> {
        let key = (space, page);
        let frame = self
            .frames
            .get_mut(&key)
            .ok_or_else(|| DbError::Internal(format!("unpin of non-resident page {page:?}")))?;

        if frame.pin_count == 0 {
            return Err(DbError::Internal(format!(
                "double-unpin of page {page:?} in space {space:?}"
            )));
        }
        frame.pin_count -= 1;

        if dirty {
            frame.dirty = true;
            if let Some(lsn) = lsn {
                frame.oldest_modification_lsn =
                    Some(frame.oldest_modification_lsn.map_or(lsn, |cur| cur.min(lsn)));
            }
        }
        Ok(())
    }

    /// Free a page back to storage. The page must not be pinned.
    pub fn free_page(&mut self, space: SpaceId, page: PageId) -> DbResult<()> {
        let key = (space, page);
        if let Some(frame) = self.frames.get(&key) {
            if frame.pin_count > 0 {
                return Err(DbError::Internal(format!(
                    "cannot free pinned page {page:?}"
                )));
            }
            self.remove_frame(key);
        }
        self.storage.free_page(space, page)
    }

    /// Pages whose modifications are not yet safely on disk, with the LSN
    /// each one requires the WAL to be durable up to before it can flush.
    /// The persistence layer uses this to compute the checkpoint LSN.
    pub fn dirty_pages(&self) -> Vec<(SpaceId, PageId, Option<Lsn>)> {
        self.frames
            .iter()
            .filter(|(_, f)| f.dirty)
            .map(|(&(space, page), f)| (space, page, f.oldest_modification_lsn))
            .collect()
    }

    /// Flush one page if its modifications are covered by `durable_lsn`.
    /// Returns `Ok(false)` without writing if the WAL has not yet been
    /// synced far enough to make the flush safe.
    pub fn flush_page(
        &mut self,
        space: SpaceId,
        page: PageId,
        durable_lsn: Lsn,
    ) -> DbResult<bool> {
        let key = (space, page);
        let Some(frame) = self.frames.get(&key) else {
            return Ok(false);
        };
        if !frame.dirty {
            return Ok(false);
        }
        if let Some(required) = frame.oldest_modification_lsn {
            if required > durable_lsn {
                return Ok(false);
            }
        }

        let buf = PageBuf {
            data: frame.data.clone(),
        };
        self.storage.write_page(space, page, &buf)?;
        self.writes += 1;

        let frame = self.frames.get_mut(&key).expect("checked above");
        frame.dirty = false;
        frame.oldest_modification_lsn = None;
        Ok(true)
    }

    /// Flush every dirty page covered by `durable_lsn`. Returns the number
    /// of pages actually written.
    pub fn flush_all(&mut self, durable_lsn: Lsn) -> DbResult<usize> {
        let keys: Vec<FrameKey> = self
            .frames
            .iter()
            .filter(|(_, f)| f.dirty)
            .map(|(&k, _)| k)
            .collect();

        let mut flushed = 0;
        for (space, page) in keys {
            if self.flush_page(space, page, durable_lsn)? {
                flushed += 1;
            }
        }
        Ok(flushed)
    }

    pub fn stats(&self) -> BufferPoolStats {
        let total = self.hits + self.misses;
        let hit_rate = if total == 0 { 0.0 } else { self.hits as f64 / total as f64 };
        BufferPoolStats {
            resident_pages: self.frames.len(),
            capacity: self.capacity,
            dirty_pages: self.frames.values().filter(|f| f.dirty).count(),
            pinned_pages: self.frames.values().filter(|f| f.pin_count > 0).count(),
            young_pages: self.young.len(),
            old_pages: self.old.len(),
            hits: self.hits,
            misses: self.misses,
            hit_rate,
            reads: self.reads,
            writes: self.writes,
        }
    }

    /// Update LRU bookkeeping for a cache hit: move within `young`, or
    /// promote from `old` to `young` if it has aged past `old_block_time`.
    fn touch(&mut self, key: FrameKey) {
        let sublist = self.frames.get(&key).map(|f| f.sublist);
        match sublist {
            Some(Sublist::Young) => {
                remove_key(&mut self.young, key);
                self.young.push_front(key);
            }
            Some(Sublist::Old) => {
                let aged = self
                    .frames
                    .get(&key)
                    .map(|f| f.entered_sublist_at.elapsed() >= self.old_block_time)
                    .unwrap_or(false);
                remove_key(&mut self.old, key);
                if aged {
                    if let Some(frame) = self.frames.get_mut(&key) {
                        frame.sublist = Sublist::Young;
                        frame.entered_sublist_at = Instant::now();
                    }
                    self.young.push_front(key);
                } else {
                    self.old.push_front(key);
                }
            }
            None => {}
        }
    }

    /// Evict one unpinned, clean frame if the pool is at capacity. Prefers
    /// the LRU end of `old` before touching `young`, matching the production
    /// rationale that newly-loaded pages should be the first casualty of
    /// cache pressure. Dirty frames are never silently dropped: if every
    /// evictable candidate is dirty, callers must flush before retrying.
    fn make_room(&mut self) -> DbResult<()> {
        if self.frames.len() < self.capacity {
            return Ok(());
        }

        if let Some(victim) = self.find_evictable(Sublist::Old) {
            self.remove_frame(victim);
            return Ok(());
        }
        if let Some(victim) = self.find_evictable(Sublist::Young) {
            self.remove_frame(victim);
            return Ok(());
        }

        Err(DbError::PoolExhausted {
            pinned: self.frames.values().filter(|f| f.pin_count > 0).count(),
            capacity: self.capacity,
        })
    }

    fn find_evictable(&self, which: Sublist) -> Option<FrameKey> {
        let list = match which {
            Sublist::Old => &self.old,
            Sublist::Young => &self.young,
        };
        list.iter()
            .rev()
            .find(|k| {
                self.frames
                    .get(k)
                    .map(|f| f.pin_count == 0 && !f.dirty)
                    .unwrap_or(false)
            })
            .copied()
    }

    fn remove_frame(&mut self, key: FrameKey) {
        if let Some(frame) = self.frames.remove(&key) {
            match frame.sublist {
                Sublist::Young => remove_key(&mut self.young, key),
                Sublist::Old => remove_key(&mut self.old, key),
            }
        }
    }
}

fn remove_key(list: &mut VecDeque<FrameKey>, key: FrameKey) {
    if let Some(pos) = list.iter().position(|&k| k == key) {
        list.remove(pos);
    }
}
