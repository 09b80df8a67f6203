//! B+Tree index implementation for persistent on-disk indexes.
//!
//! A `BTree` is a thin, stateless-except-for-root handle: all page I/O goes
//! through a caller-owned `buffer::BufferPool`, which is what actually talks
//! to tablespace storage. This lets many indexes (the primary key index and
//! every secondary index of every table) share one buffer pool and compete
//! for the same cache, the way a real engine's indexes share one instance's
//! buffer pool.
//!
//! Keys and values are opaque, pre-encoded byte strings (`&[u8]`/`Vec<u8>`):
//! this crate only ever compares keys lexicographically and stores values
//! without interpreting them. It does not know about typed SQL values,
//! composite keys, or what a value byte string represents -- the `index`
//! crate owns both the `Value -> Vec<u8>` order-preserving key encoding and
//! the decision of what a given index's value bytes mean (a clustered
//! index's value is a whole encoded row; a secondary index's value is the
//! primary key's encoded bytes).
//!
//! Every mutation accepts an optional LSN produced by the caller (normally
//! the `txn` crate, after writing an undo/redo record to the WAL) and
//! threads it through to the buffer pool's dirty-page tracking, so a page
//! can never be flushed to disk before the log record that justifies its
//! content is durable.
//!
//! Pages are the bit-exact layout in [`page`]: a fixed header, infimum and
//! supremum sentinels, and user records (see [`record`]) reachable either
//! through the tail slot directory or the forward chain. An internal page's
//! entries are one-to-one with its children: entry 0 always carries the
//! empty key (sorting below every real key) and points at "everything less
//! than the first real separator"; entry `i` for `i >= 1` carries the
//! minimum key of the subtree rooted at its child.
//!
//! Every page access is bracketed by that page's content latch (a
//! `std::sync::RwLock` held in its buffer frame): shared for reads, upgraded
//! to exclusive for the leaf being mutated and any ancestor a split, merge,
//! or redistribute touches. The rest of this engine drives the tree from a
//! single thread today, so the mechanism is not yet under real contention,
//! but the acquire/release discipline is real and is what a concurrent
//! caller would rely on.

mod page;
mod record;

use buffer::BufferPool;
use common::{DbError, DbResult, IndexId, Lsn, PageId, SpaceId};
use page::{InsertOutcome, InternalEntry, LeafEntry, ReplaceOutcome};

/// Below this fraction of live-byte occupancy, a non-root page is a merge or
/// redistribute candidate.
const MIN_OCCUPANCY: f64 = 0.5;

/// A persistent B+Tree index identified by its catalog [`IndexId`] and the
/// tablespace it lives in. Keys and values are pre-encoded `Vec<u8>` byte
/// strings.
#[derive(Debug, Clone)]
pub struct BTree {
    pub index_id: IndexId,
    pub space_id: SpaceId,
    root_page: PageId,
    pub unique: bool,
}

impl BTree {
    /// Create a brand new index: a fresh tablespace holding a single empty
    /// leaf as its root.
    pub fn create(
        pool: &mut BufferPool,
        index_id: IndexId,
        space_id: SpaceId,
        unique: bool,
    ) -> DbResult<Self> {
        pool.storage_mut().create_space(space_id)?;
        let (root_page, _) = pool.new_page(space_id)?;
        let tree = Self {
            index_id,
            space_id,
            root_page,
            unique,
        };
        tree.write_page_latched(pool, root_page, None, |data| {
            page::init_leaf(data);
            Ok(())
        })?;
        pool.unpin_page(space_id, root_page, true, None)?;
        Ok(tree)
    }

    /// Attach to an existing index whose root page is already known (read
    /// from the catalog's table storage info).
    pub fn open(index_id: IndexId, space_id: SpaceId, root_page: PageId, unique: bool) -> Self {
        Self {
            index_id,
            space_id,
            root_page,
            unique,
        }
    }

    pub fn root_page(&self) -> PageId {
        self.root_page
    }

    /// Exact-match lookup. A unique index returns at most one value; a
    /// non-unique (secondary, non-PK) index may return several.
    pub fn search(&self, pool: &mut BufferPool, key: &[u8]) -> DbResult<Vec<Vec<u8>>> {
        let leaf_page = self.find_leaf(pool, key)?;
        let (entries, _, _) = self.read_leaf(pool, leaf_page)?;
        Ok(entries
            .into_iter()
            .filter(|e| !e.delete_mark && e.key.as_slice() == key)
            .map(|e| e.value)
            .collect())
    }

    /// Inclusive range scan, ascending, following leaf sibling pointers.
    pub fn range_scan(
        &self,
        pool: &mut BufferPool,
        low: Option<&[u8]>,
        high: Option<&[u8]>,
    ) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let start_key: &[u8] = low.unwrap_or(&[]);
        let mut leaf_page = self.find_leaf(pool, start_key)?;
        let mut results = Vec::new();

        loop {
            let (entries, next_leaf, _) = self.read_leaf(pool, leaf_page)?;

            for e in entries {
                if e.delete_mark {
                    continue;
                }
                if let Some(lo) = low {
                    if e.key.as_slice() < lo {
                        continue;
                    }
                }
                if let Some(hi) = high {
                    if e.key.as_slice() > hi {
                        return Ok(results);
                    }
                }
                results.push((e.key, e.value));
            }

            match next_leaf {
                Some(next) => leaf_page = next,
                None => break,
            }
        }

        Ok(results)
    }

    /// Insert a key/value pair. For a unique index, a pre-existing entry
    /// with the same key is rejected with `DbError::DuplicateKey`.
    pub fn insert(
        &mut self,
        pool: &mut BufferPool,
        key: Vec<u8>,
        value: Vec<u8>,
        lsn: Option<Lsn>,
    ) -> DbResult<()> {
        if self.unique && !self.search(pool, &key)?.is_empty() {
            return Err(DbError::DuplicateKey);
        }

        let result = self.insert_recursive(pool, self.root_page, key, value, lsn)?;
        if let Some((split_key, new_child)) = result {
            let old_root = self.root_page;
            let old_level = {
                let raw = self.read_page(pool, old_root)?;
                page::read_level(&raw)
            };

            let (new_root_page, _) = pool.new_page(self.space_id)?;
            let entries = vec![
                InternalEntry { key: Vec::new(), child: old_root },
                InternalEntry { key: split_key, child: new_child },
            ];
            self.write_page_latched(pool, new_root_page, lsn, |data| {
                page::encode_internal(&entries, old_level + 1, data)
            })?;
            pool.unpin_page(self.space_id, new_root_page, true, lsn)?;
            self.root_page = new_root_page;
        }
        Ok(())
    }

    /// Remove one matching `(key, value)` entry. Returns whether anything
    /// was removed. Removal tombstones the record in place; once the
    /// page's live-byte occupancy drops below 50%, the affected subtree is
    /// merged with a sibling or has entries redistributed from one.
    pub fn delete(
        &mut self,
        pool: &mut BufferPool,
        key: &[u8],
        value: &[u8],
        lsn: Option<Lsn>,
    ) -> DbResult<bool> {
        let (deleted, _) = self.delete_recursive(pool, self.root_page, key, value, lsn)?;
        if deleted {
            self.maybe_collapse_root(pool, lsn)?;
        }
        Ok(deleted)
    }

    /// Replace the value of an existing `(key, old_value)` entry. Values
    /// that still fit the record's reserved slot are overwritten in place;
    /// a value that grew past what the slot holds falls back to tombstoning
    /// the old record and inserting the new one under the same key.
    pub fn replace(
        &mut self,
        pool: &mut BufferPool,
        key: &[u8],
        old_value: &[u8],
        new_value: Vec<u8>,
        lsn: Option<Lsn>,
    ) -> DbResult<bool> {
        let leaf_page = self.find_leaf(pool, key)?;
        let mut raw = self.read_page(pool, leaf_page)?;

        match page::replace_leaf_value(&mut raw, key, old_value, &new_value)? {
            ReplaceOutcome::Replaced => {
                self.write_page_latched(pool, leaf_page, lsn, |data| {
                    data.copy_from_slice(&raw);
                    Ok(())
                })?;
                Ok(true)
            }
            ReplaceOutcome::NotFound => Ok(false),
            ReplaceOutcome::NoRoom => {
                if !page::mark_delete_leaf(&mut raw, key, old_value)? {
                    return Ok(false);
                }
                match page::insert_leaf_record(&mut raw, key, &new_value)? {
                    InsertOutcome::Inserted => {
                        self.write_page_latched(pool, leaf_page, lsn, |data| {
                            data.copy_from_slice(&raw);
                            Ok(())
                        })?;
                        Ok(true)
                    }
                    InsertOutcome::Full => Err(DbError::TreeCorrupt(
                        "leaf page has no room to replace a grown value".into(),
                    )),
                }
            }
        }
    }

    /// The leftmost leaf page, used by full index scans.
    pub fn first_leaf_page(&self, pool: &mut BufferPool) -> DbResult<PageId> {
        let mut page_id = self.root_page;
        loop {
            let raw = self.read_page(pool, page_id)?;
            if page::is_leaf(&raw) {
                return Ok(page_id);
            }
            let entries = page::decode_internal(&raw)?;
            page_id = entries
                .first()
                .ok_or_else(|| DbError::TreeCorrupt("internal node has no children".into()))?
                .child;
        }
    }

    /// Every `(key, value)` pair in ascending order. Used by full scans and
    /// by tests; avoid on hot paths over large indexes.
    pub fn scan_all(&self, pool: &mut BufferPool) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut page_id = self.first_leaf_page(pool)?;
        let mut results = Vec::new();
        loop {
            let (entries, next_leaf, _) = self.read_leaf(pool, page_id)?;
            for e in entries {
                if !e.delete_mark {
                    results.push((e.key, e.value));
                }
            }
            match next_leaf {
                Some(next) => page_id = next,
                None => break,
            }
        }
        Ok(results)
    }

    fn find_leaf(&self, pool: &mut BufferPool, key: &[u8]) -> DbResult<PageId> {
        let mut current = self.root_page;
        loop {
            let raw = self.read_page(pool, current)?;
            if page::is_leaf(&raw) {
                return Ok(current);
            }
            let entries = page::decode_internal(&raw)?;
            current = entries[child_index(&entries, key)].child;
        }
    }

    fn insert_recursive(
        &mut self,
        pool: &mut BufferPool,
        page_id: PageId,
        key: Vec<u8>,
        value: Vec<u8>,
        lsn: Option<Lsn>,
    ) -> DbResult<Option<(Vec<u8>, PageId)>> {
        let raw = self.read_page(pool, page_id)?;

        if page::is_leaf(&raw) {
            return self.insert_leaf(pool, page_id, raw, key, value, lsn);
        }

        let entries = page::decode_internal(&raw)?;
        let idx = child_index(&entries, &key);
        let child_page = entries[idx].child;
        let split = self.insert_recursive(pool, child_page, key, value, lsn)?;

        let Some((new_key, new_child)) = split else {
            return Ok(None);
        };

        let level = page::read_level(&raw);
        let mut entries = entries;
        entries.insert(idx + 1, InternalEntry { key: new_key, child: new_child });

        let mut scratch = vec![0u8; raw.len()];
        if page::encode_internal(&entries, level, &mut scratch).is_ok() {
            self.write_page_latched(pool, page_id, lsn, |data| {
                data.copy_from_slice(&scratch);
                Ok(())
            })?;
            return Ok(None);
        }

        // Doesn't fit: split the combined entry list in two. Entry 0 of the
        // right half becomes its new "-infinity" pointer; its former key is
        // promoted to the parent as the new separator.
        let mid = entries.len() / 2;
        let mut right_entries = entries.split_off(mid);
        let split_key = right_entries[0].key.clone();
        right_entries[0].key = Vec::new();
        let left_entries = entries;

        let (right_page, _) = pool.new_page(self.space_id)?;
        self.write_page_latched(pool, right_page, lsn, |data| {
            page::encode_internal(&right_entries, level, data)
        })?;
        pool.unpin_page(self.space_id, right_page, true, lsn)?;

        self.write_page_latched(pool, page_id, lsn, |data| {
            page::encode_internal(&left_entries, level, data)
        })?;

        Ok(Some((split_key, right_page)))
    }

    fn insert_leaf(
        &mut self,
        pool: &mut BufferPool,
        page_id: PageId,
        mut raw: Vec<u8>,
        key: Vec<u8>,
        value: Vec<u8>,
        lsn: Option<Lsn>,
    ) -> DbResult<Option<(Vec<u8>, PageId)>> {
        match page::insert_leaf_record(&mut raw, &key, &value)? {
            InsertOutcome::Inserted => {
                self.write_page_latched(pool, page_id, lsn, |data| {
                    data.copy_from_slice(&raw);
                    Ok(())
                })?;
                Ok(None)
            }
            InsertOutcome::Full => {
                let (mut entries, next_page, prev_page) = page::decode_leaf(&raw)?;
                entries.retain(|e| !e.delete_mark);
                let pos = entries.partition_point(|e| e.key.as_slice() <= key.as_slice());
                entries.insert(pos, LeafEntry { key, value, delete_mark: false });

                let mid = entries.len() / 2;
                let right_entries = entries.split_off(mid);
                let left_entries = entries;
                let split_key = right_entries[0].key.clone();

                let (right_page, _) = pool.new_page(self.space_id)?;
                self.write_page_latched(pool, right_page, lsn, |data| {
                    page::encode_leaf(&right_entries, next_page, Some(page_id), data)
                })?;
                pool.unpin_page(self.space_id, right_page, true, lsn)?;

                self.write_page_latched(pool, page_id, lsn, |data| {
                    page::encode_leaf(&left_entries, Some(right_page), prev_page, data)
                })?;

                if let Some(old_next) = next_page {
                    self.write_page_latched(pool, old_next, lsn, |data| {
                        page::set_prev_page(data, Some(right_page));
                        Ok(())
                    })?;
                }

                Ok(Some((split_key, right_page)))
            }
        }
    }

    /// Descend to `key`'s leaf, tombstone the matching entry, and propagate
    /// any resulting underflow back up as `(deleted, this_subtree_underflowed)`.
    fn delete_recursive(
        &mut self,
        pool: &mut BufferPool,
        page_id: PageId,
        key: &[u8],
        value: &[u8],
        lsn: Option<Lsn>,
    ) -> DbResult<(bool, bool)> {
        let raw = self.read_page(pool, page_id)?;

        if page::is_leaf(&raw) {
            let mut raw = raw;
            let deleted = page::mark_delete_leaf(&mut raw, key, value)?;
            if !deleted {
                return Ok((false, false));
            }
            self.write_page_latched(pool, page_id, lsn, |data| {
                data.copy_from_slice(&raw);
                Ok(())
            })?;
            let underflow = page_id != self.root_page && page::leaf_occupancy(&raw)? < MIN_OCCUPANCY;
            return Ok((true, underflow));
        }

        let mut entries = page::decode_internal(&raw)?;
        let idx = child_index(&entries, key);
        let child_page = entries[idx].child;

        let (deleted, child_underflow) = self.delete_recursive(pool, child_page, key, value, lsn)?;
        if !deleted {
            return Ok((false, false));
        }

        if child_underflow {
            self.rebalance_child(pool, &mut entries, idx, lsn)?;
        }

        let level = page::read_level(&raw);
        self.write_page_latched(pool, page_id, lsn, |data| {
            page::encode_internal(&entries, level, data)
        })?;

        let underflow = if page_id == self.root_page {
            false
        } else if entries.len() <= 1 {
            true
        } else {
            let mut scratch = vec![0u8; raw.len()];
            page::encode_internal(&entries, level, &mut scratch)?;
            page::internal_occupancy(&scratch)? < MIN_OCCUPANCY
        };
        Ok((true, underflow))
    }

    /// Fix an underflowing child at `entries[idx]`: redistribute an entry
    /// from a sibling if one can spare it, otherwise merge with a sibling
    /// and drop the emptied page's entry from `entries`.
    fn rebalance_child(
        &mut self,
        pool: &mut BufferPool,
        entries: &mut Vec<InternalEntry>,
        idx: usize,
        lsn: Option<Lsn>,
    ) -> DbResult<()> {
        let child_page = entries[idx].child;
        let child_raw = self.read_page(pool, child_page)?;

        if page::is_leaf(&child_raw) {
            self.rebalance_leaf_child(pool, entries, idx, lsn)
        } else {
            self.rebalance_internal_child(pool, entries, idx, lsn)
        }
    }

    fn rebalance_leaf_child(
        &mut self,
        pool: &mut BufferPool,
        entries: &mut Vec<InternalEntry>,
        idx: usize,
        lsn: Option<Lsn>,
    ) -> DbResult<()> {
        let child_page = entries[idx].child;
        let (mut child_entries, child_next, child_prev) = {
            let raw = self.read_page(pool, child_page)?;
            page::decode_leaf(&raw)?
        };
        child_entries.retain(|e| !e.delete_mark);

        if idx > 0 {
            let left_page = entries[idx - 1].child;
            let (mut left_entries, left_next, left_prev) = {
                let raw = self.read_page(pool, left_page)?;
                page::decode_leaf(&raw)?
            };
            left_entries.retain(|e| !e.delete_mark);

            if left_entries.len() > 1 {
                let borrowed = left_entries.pop().unwrap();
                child_entries.insert(0, borrowed);
                entries[idx].key = child_entries[0].key.clone();

                self.write_page_latched(pool, left_page, lsn, |data| {
                    page::encode_leaf(&left_entries, left_next, left_prev, data)
                })?;
                self.write_page_latched(pool, child_page, lsn, |data| {
                    page::encode_leaf(&child_entries, child_next, child_prev, data)
                })?;
                return Ok(());
            }
        }

        if idx + 1 < entries.len() {
            let right_page = entries[idx + 1].child;
            let (mut right_entries, right_next, right_prev) = {
                let raw = self.read_page(pool, right_page)?;
                page::decode_leaf(&raw)?
            };
            right_entries.retain(|e| !e.delete_mark);

            if right_entries.len() > 1 {
                let borrowed = right_entries.remove(0);
                child_entries.push(borrowed);
                entries[idx + 1].key = right_entries[0].key.clone();

                self.write_page_latched(pool, right_page, lsn, |data| {
                    page::encode_leaf(&right_entries, right_next, right_prev, data)
                })?;
                self.write_page_latched(pool, child_page, lsn, |data| {
                    page::encode_leaf(&child_entries, child_next, child_prev, data)
                })?;
                return Ok(());
            }
        }

        if idx > 0 {
            let left_page = entries[idx - 1].child;
            let (mut left_entries, _left_next, left_prev) = {
                let raw = self.read_page(pool, left_page)?;
                page::decode_leaf(&raw)?
            };
            left_entries.retain(|e| !e.delete_mark);
            left_entries.extend(child_entries);

            self.write_page_latched(pool, left_page, lsn, |data| {
                page::encode_leaf(&left_entries, child_next, left_prev, data)
            })?;
            if let Some(after) = child_next {
                self.write_page_latched(pool, after, lsn, |data| {
                    page::set_prev_page(data, Some(left_page));
                    Ok(())
                })?;
            }
            pool.free_page(self.space_id, child_page)?;
            entries.remove(idx);
        } else {
            let right_page = entries[idx + 1].child;
            let (mut right_entries, right_next, _right_prev) = {
                let raw = self.read_page(pool, right_page)?;
                page::decode_leaf(&raw)?
            };
            right_entries.retain(|e| !e.delete_mark);
            child_entries.extend(right_entries);

            self.write_page_latched(pool, child_page, lsn, |data| {
                page::encode_leaf(&child_entries, right_next, child_prev, data)
            })?;
            if let Some(after) = right_next {
                self.write_page_latched(pool, after, lsn, |data| {
                    page::set_prev_page(data, Some(child_page));
                    Ok(())
                })?;
            }
            pool.free_page(self.space_id, right_page)?;
            entries.remove(idx + 1);
        }
        Ok(())
    }

    fn rebalance_internal_child(
        &mut self,
        pool: &mut BufferPool,
        entries: &mut Vec<InternalEntry>,
        idx: usize,
        lsn: Option<Lsn>,
    ) -> DbResult<()> {
        let child_page = entries[idx].child;
        let (mut child_entries, level) = {
            let raw = self.read_page(pool, child_page)?;
            (page::decode_internal(&raw)?, page::read_level(&raw))
        };

        if idx > 0 {
            let left_page = entries[idx - 1].child;
            let mut left_entries = {
                let raw = self.read_page(pool, left_page)?;
                page::decode_internal(&raw)?
            };

            if left_entries.len() > 1 {
                let mut borrowed = left_entries.pop().unwrap();
                let new_separator = borrowed.key.clone();
                child_entries[0].key = entries[idx].key.clone();
                borrowed.key = Vec::new();
                entries[idx].key = new_separator;
                child_entries.insert(0, borrowed);

                self.write_page_latched(pool, left_page, lsn, |data| {
                    page::encode_internal(&left_entries, level, data)
                })?;
                self.write_page_latched(pool, child_page, lsn, |data| {
                    page::encode_internal(&child_entries, level, data)
                })?;
                return Ok(());
            }
        }

        if idx + 1 < entries.len() {
            let right_page = entries[idx + 1].child;
            let mut right_entries = {
                let raw = self.read_page(pool, right_page)?;
                page::decode_internal(&raw)?
            };

            if right_entries.len() > 1 {
                let mut borrowed = right_entries.remove(0);
                borrowed.key = entries[idx + 1].key.clone();
                entries[idx + 1].key = right_entries[0].key.clone();
                right_entries[0].key = Vec::new();
                child_entries.push(borrowed);

                self.write_page_latched(pool, right_page, lsn, |data| {
                    page::encode_internal(&right_entries, level, data)
                })?;
                self.write_page_latched(pool, child_page, lsn, |data| {
                    page::encode_internal(&child_entries, level, data)
                })?;
                return Ok(());
            }
        }

        if idx > 0 {
            let left_page = entries[idx - 1].child;
            let mut left_entries = {
                let raw = self.read_page(pool, left_page)?;
                page::decode_internal(&raw)?
            };
            child_entries[0].key = entries[idx].key.clone();
            left_entries.extend(child_entries);

            self.write_page_latched(pool, left_page, lsn, |data| {
                page::encode_internal(&left_entries, level, data)
            })?;
            pool.free_page(self.space_id, child_page)?;
            entries.remove(idx);
        } else {
            let right_page = entries[idx + 1].child;
            let mut right_entries = {
                let raw = self.read_page(pool, right_page)?;
                page::decode_internal(&raw)?
            };
            right_entries[0].key = entries[idx + 1].key.clone();
            child_entries.extend(right_entries);

            self.write_page_latched(pool, child_page, lsn, |data| {
                page::encode_internal(&child_entries, level, data)
            })?;
            pool.free_page(self.space_id, right_page)?;
            entries.remove(idx + 1);
        }
        Ok(())
    }

    /// Shrink tree height after deletes leave the root with a single child.
    fn maybe_collapse_root(&mut self, pool: &mut BufferPool, _lsn: Option<Lsn>) -> DbResult<()> {
        let raw = self.read_page(pool, self.root_page)?;
        if page::is_leaf(&raw) {
            return Ok(());
        }
        let entries = page::decode_internal(&raw)?;
        if entries.len() != 1 {
            return Ok(());
        }
        let only_child = entries[0].child;
        let old_root = self.root_page;
        self.root_page = only_child;
        pool.free_page(self.space_id, old_root)?;
        Ok(())
    }

    /// Read a page's raw bytes under its shared content latch.
    fn read_page(&self, pool: &mut BufferPool, page_id: PageId) -> DbResult<Vec<u8>> {
        pool.fetch_page(self.space_id, page_id)?;
        let latch = pool.page_latch(self.space_id, page_id)?;
        let raw = {
            let _guard = latch
                .read()
                .map_err(|_| DbError::Internal("page latch poisoned".into()))?;
            pool.fetch_page(self.space_id, page_id)?.to_vec()
        };
        pool.unpin_page(self.space_id, page_id, false, None)?;
        pool.unpin_page(self.space_id, page_id, false, None)?;
        Ok(raw)
    }

    /// Read a leaf page's decoded entries and sibling pointers, under its
    /// shared content latch.
    fn read_leaf(
        &self,
        pool: &mut BufferPool,
        page_id: PageId,
    ) -> DbResult<(Vec<LeafEntry>, Option<PageId>, Option<PageId>)> {
        let raw = self.read_page(pool, page_id)?;
        page::decode_leaf(&raw)
    }

    /// Mutate a page's bytes under its exclusive content latch, then unpin
    /// it dirty (or clean, if `write_fn` failed).
    fn write_page_latched(
        &self,
        pool: &mut BufferPool,
        page_id: PageId,
        lsn: Option<Lsn>,
        write_fn: impl FnOnce(&mut [u8]) -> DbResult<()>,
    ) -> DbResult<()> {
        pool.fetch_page(self.space_id, page_id)?;
        let latch = pool.page_latch(self.space_id, page_id)?;
        let result = {
            let _guard = latch
                .write()
                .map_err(|_| DbError::Internal("page latch poisoned".into()))?;
            let data = pool.fetch_page(self.space_id, page_id)?;
            write_fn(data)
        };
        pool.unpin_page(self.space_id, page_id, result.is_ok(), lsn)?;
        pool.unpin_page(self.space_id, page_id, false, None)?;
        result
    }
}

/// The child to descend into for `key`: the rightmost entry whose key is
/// `<= key`. Entry 0 always has the empty key, so this is never empty.
fn child_index(entries: &[InternalEntry], key: &[u8]) -> usize {
    entries.partition_point(|e| e.key.as_slice() <= key) - 1
}

#[cfg(test)]
mod tests;
