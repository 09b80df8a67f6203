//! Index Manager (C9): an in-memory registry of index descriptors, each
//! backed by a [`btree::BTree`], plus the order-preserving key encoding
//! that turns typed [`Value`] columns into the byte keys `btree` stores.
//!
//! This crate is the only place in the engine that knows both "what a SQL
//! value is" and "how a B+Tree orders its keys" -- `btree` itself only ever
//! deals in bytes, which keeps its dependency graph free of `types`.

mod encoding;

pub use encoding::{encode_key, encode_value};

use ahash::RandomState;
use btree::BTree;
use buffer::BufferPool;
use common::{DbError, DbResult, IndexId, Lsn, SpaceId, TableId};
use hashbrown::HashMap;
use types::Value;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Describes one registered index: which table it belongs to, whether it
/// enforces uniqueness, and which tablespace/root page its B+Tree lives at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub index_id: IndexId,
    pub table_id: TableId,
    pub name: String,
    pub unique: bool,
    pub space_id: SpaceId,
}

/// Registry of live indexes, keyed by [`IndexId`] and by `(table_id, name)`.
/// Every mutating operation is delegated to the index's underlying
/// `btree::BTree`, after encoding the caller's `Value` key into bytes.
#[derive(Default)]
pub struct IndexManager {
    descriptors: Map<IndexId, IndexDescriptor>,
    by_table_name: Map<(TableId, String), IndexId>,
    trees: Map<IndexId, BTree>,
}

impl IndexManager {
    pub fn new() -> Self {
        Self {
            descriptors: Map::default(),
            by_table_name: Map::default(),
            trees: Map::default(),
        }
    }

    /// Creates a brand-new index: a fresh tablespace and B+Tree root, then
    /// registers it under `index_id`.
    pub fn create_index(
        &mut self,
        pool: &mut BufferPool,
        index_id: IndexId,
        table_id: TableId,
        name: &str,
        space_id: SpaceId,
        unique: bool,
    ) -> DbResult<IndexDescriptor> {
        if self.descriptors.contains_key(&index_id) {
            return Err(DbError::Catalog(format!(
                "index id {} is already registered",
                index_id.0
            )));
        }
        let tree = BTree::create(pool, index_id, space_id, unique)?;
        let descriptor = IndexDescriptor {
            index_id,
            table_id,
            name: name.to_string(),
            unique,
            space_id,
        };
        self.trees.insert(index_id, tree);
        self.by_table_name
            .insert((table_id, name.to_string()), index_id);
        self.descriptors.insert(index_id, descriptor.clone());
        Ok(descriptor)
    }

    /// Attaches to an index whose tablespace and root page already exist on
    /// disk (recovery / reopening an existing database).
    pub fn open_index(
        &mut self,
        index_id: IndexId,
        table_id: TableId,
        name: &str,
        space_id: SpaceId,
        root_page: common::PageId,
        unique: bool,
    ) -> IndexDescriptor {
        let tree = BTree::open(index_id, space_id, root_page, unique);
        let descriptor = IndexDescriptor {
            index_id,
            table_id,
            name: name.to_string(),
            unique,
            space_id,
        };
        self.trees.insert(index_id, tree);
        self.by_table_name
            .insert((table_id, name.to_string()), index_id);
        self.descriptors.insert(index_id, descriptor.clone());
        descriptor
    }

    /// All indexes registered against a table.
    pub fn list_indexes(&self, table_id: TableId) -> Vec<&IndexDescriptor> {
        self.descriptors
            .values()
            .filter(|d| d.table_id == table_id)
            .collect()
    }

    pub fn descriptor(&self, index_id: IndexId) -> DbResult<&IndexDescriptor> {
        self.descriptors
            .get(&index_id)
            .ok_or_else(|| DbError::NotFound(format!("index id {}", index_id.0)))
    }

    pub fn index_by_name(&self, table_id: TableId, name: &str) -> Option<IndexId> {
        self.by_table_name
            .get(&(table_id, name.to_string()))
            .copied()
    }

    fn tree_mut(&mut self, index_id: IndexId) -> DbResult<&mut BTree> {
        self.trees
            .get_mut(&index_id)
            .ok_or_else(|| DbError::NotFound(format!("index id {}", index_id.0)))
    }

    fn tree(&self, index_id: IndexId) -> DbResult<&BTree> {
        self.trees
            .get(&index_id)
            .ok_or_else(|| DbError::NotFound(format!("index id {}", index_id.0)))
    }

    /// Root page of an index's B+Tree, for persisting into the catalog
    /// once an index has just been created.
    pub fn root_page(&self, index_id: IndexId) -> DbResult<common::PageId> {
        Ok(self.tree(index_id)?.root_page())
    }

    /// Inserts a pre-encoded `(key, value)` pair directly, bypassing typed
    /// key encoding. Used when the caller already holds an encoded key --
    /// e.g. a primary key read back out of a secondary index's value.
    pub fn insert_encoded(
        &mut self,
        pool: &mut BufferPool,
        index_id: IndexId,
        key: Vec<u8>,
        value: Vec<u8>,
        lsn: Option<Lsn>,
    ) -> DbResult<()> {
        self.tree_mut(index_id)?.insert(pool, key, value, lsn)
    }

    /// Deletes a pre-encoded `(key, value)` pair.
    pub fn delete_encoded(
        &mut self,
        pool: &mut BufferPool,
        index_id: IndexId,
        key: &[u8],
        value: &[u8],
        lsn: Option<Lsn>,
    ) -> DbResult<bool> {
        self.tree_mut(index_id)?.delete(pool, key, value, lsn)
    }

    /// Replaces the value of a pre-encoded key's entry in place.
    pub fn replace_encoded(
        &mut self,
        pool: &mut BufferPool,
        index_id: IndexId,
        key: &[u8],
        old_value: &[u8],
        new_value: Vec<u8>,
        lsn: Option<Lsn>,
    ) -> DbResult<bool> {
        self.tree_mut(index_id)?
            .replace(pool, key, old_value, new_value, lsn)
    }

    /// Exact-match lookup by pre-encoded key.
    pub fn search_encoded(
        &self,
        pool: &mut BufferPool,
        index_id: IndexId,
        key: &[u8],
    ) -> DbResult<Vec<Vec<u8>>> {
        self.tree(index_id)?.search(pool, key)
    }

    /// Every `(key, value)` pair of an index in ascending key order.
    pub fn scan_all_encoded(
        &self,
        pool: &mut BufferPool,
        index_id: IndexId,
    ) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        self.tree(index_id)?.scan_all(pool)
    }

    /// Encodes `key` and inserts `(key, value)` into the named index. For a
    /// clustered (primary) index `value` is the row's own encoded bytes;
    /// for a secondary index it is the primary key's encoded bytes.
    pub fn insert_key(
        &mut self,
        pool: &mut BufferPool,
        index_id: IndexId,
        key: &[Value],
        value: Vec<u8>,
        lsn: Option<Lsn>,
    ) -> DbResult<()> {
        let encoded = encode_key(key);
        self.tree_mut(index_id)?.insert(pool, encoded, value, lsn)
    }

    /// Encodes `key` and removes the matching `(key, value)` entry.
    pub fn delete_key(
        &mut self,
        pool: &mut BufferPool,
        index_id: IndexId,
        key: &[Value],
        value: &[u8],
        lsn: Option<Lsn>,
    ) -> DbResult<bool> {
        let encoded = encode_key(key);
        self.tree_mut(index_id)?.delete(pool, &encoded, value, lsn)
    }

    /// Replaces the value of an existing `(key, old_value)` entry in place.
    pub fn replace_key(
        &mut self,
        pool: &mut BufferPool,
        index_id: IndexId,
        key: &[Value],
        old_value: &[u8],
        new_value: Vec<u8>,
        lsn: Option<Lsn>,
    ) -> DbResult<bool> {
        let encoded = encode_key(key);
        self.tree_mut(index_id)?
            .replace(pool, &encoded, old_value, new_value, lsn)
    }

    /// Exact-match lookup. Returns the raw value bytes stored alongside the
    /// matching key(s).
    pub fn search_key(
        &self,
        pool: &mut BufferPool,
        index_id: IndexId,
        key: &[Value],
    ) -> DbResult<Vec<Vec<u8>>> {
        let encoded = encode_key(key);
        self.tree(index_id)?.search(pool, &encoded)
    }

    /// Inclusive range scan over encoded bounds. Returns `(encoded_key,
    /// value)` pairs in ascending key order.
    pub fn range_scan(
        &self,
        pool: &mut BufferPool,
        index_id: IndexId,
        low: Option<&[Value]>,
        high: Option<&[Value]>,
    ) -> DbResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let low_enc = low.map(encode_key);
        let high_enc = high.map(encode_key);
        self.tree(index_id)?.range_scan(
            pool,
            low_enc.as_deref(),
            high_enc.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests;
