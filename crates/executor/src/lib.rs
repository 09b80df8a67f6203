//! DML Executor (C10): turns a resolved [`ast::InsertStmt`] /
//! [`ast::UpdateStmt`] / [`ast::DeleteStmt`] into clustered- and
//! secondary-index mutations, writing redo records through the persistence
//! manager and logical undo through the transaction table as it goes.
//!
//! Storage is index-organized (no separate heap file): a table's clustered
//! index leaf stores the row's own encoded bytes, keyed by the table's
//! primary key; every secondary index leaf stores the primary key's encoded
//! bytes as its value. A secondary-index lookup is therefore always two
//! hops -- one range/equality scan over the secondary tree, one lookup
//! (or direct `_encoded` call, since the value is already an encoded key)
//! against the clustered tree.

pub mod ast;
pub mod codec;

use ast::{DeleteStmt, InsertStmt, UpdateStmt, WhereCondition};
use catalog::{Catalog, Column, IndexKind};
use common::{ColumnId, DbError, DbResult, IndexId, Lsn, TableId, TxnId};
use index::IndexManager;
use persistence::PersistenceManager;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use txn::{TxnTable, UndoAction};
use types::Value;

fn bincode_config() -> impl bincode::config::Config {
    bincode::config::legacy()
}

/// The clustered index shares the `IndexManager` registry with every
/// secondary index, but catalog hands out secondary `IndexId`s starting at
/// 1. This offset keeps a table's clustered index id out of that range so
/// the two counters can never collide.
const CLUSTERED_INDEX_OFFSET: u64 = 1_000_000_000;

fn clustered_index_id(table_id: TableId) -> IndexId {
    IndexId(CLUSTERED_INDEX_OFFSET + table_id.0)
}

/// Public accessor for a table's clustered `IndexId`, used by callers (such
/// as `engine`) that reattach indexes from catalog metadata at startup
/// without going through [`Executor::create_table`].
pub fn clustered_index_id_for(table_id: TableId) -> IndexId {
    clustered_index_id(table_id)
}

/// The logical WAL records this crate authors, alongside the persistence
/// manager's own `page_flush` records. Recovery relies on `page_flush`
/// images alone (see [`Executor::commit`]); these exist for the undo/audit
/// trail a real engine keeps in its log.
#[derive(Clone, Debug, Serialize, Deserialize)]
enum DmlRedo {
    Insert {
        table_id: TableId,
        key: Vec<u8>,
        row: Vec<u8>,
    },
    Update {
        table_id: TableId,
        key: Vec<u8>,
        before: Vec<u8>,
        after: Vec<u8>,
    },
    Delete {
        table_id: TableId,
        key: Vec<u8>,
        row: Vec<u8>,
    },
    Commit {
        txn_id: TxnId,
    },
    Rollback {
        txn_id: TxnId,
    },
}

fn encode_redo(record: &DmlRedo) -> DbResult<Vec<u8>> {
    bincode::serde::encode_to_vec(record, bincode_config())
        .map_err(|e| DbError::Wal(format!("failed to encode dml redo record: {e}")))
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0)
}

/// Which DML statement a [`DmlResult`] came from, for callers that branch on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DmlKind {
    Insert,
    Update,
    Delete,
}

/// The outcome of running one DML statement.
#[derive(Clone, Debug, PartialEq)]
pub struct DmlResult {
    pub affected_rows: u64,
    pub last_insert_id: Option<i64>,
    pub kind: DmlKind,
}

/// A read-only snapshot of the pieces of a table's catalog entry the DML
/// pipelines need, taken up front so the rest of a statement's execution
/// doesn't have to juggle borrows of `self.catalog` alongside `self.indexes`.
struct TableSnapshot {
    id: TableId,
    clustered_id: IndexId,
    primary_key: Vec<ColumnId>,
    columns: Vec<Column>,
    secondary: Vec<SecondaryIndexSnapshot>,
}

struct SecondaryIndexSnapshot {
    id: IndexId,
    columns: Vec<ColumnId>,
}

/// Bundles the catalog (C8), index manager (C9), persistence manager (C1-C5),
/// and transaction table (C6/C7) into the single surface the DML pipelines
/// drive. Owns no policy beyond "every statement runs inside a transaction":
/// callers that want multi-statement transactions pass a `txn_id` they got
/// from [`Executor::begin`]; callers that don't get one per statement.
pub struct Executor {
    catalog: Catalog,
    indexes: IndexManager,
    persistence: PersistenceManager,
    txns: TxnTable,
}

impl Executor {
    pub fn new(catalog: Catalog, indexes: IndexManager, persistence: PersistenceManager) -> Self {
        Self {
            catalog,
            indexes,
            persistence,
            txns: TxnTable::new(),
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    pub fn indexes(&self) -> &IndexManager {
        &self.indexes
    }

    pub fn persistence_mut(&mut self) -> &mut PersistenceManager {
        &mut self.persistence
    }

    /// Starts an explicit transaction a caller will later `commit`/`rollback`
    /// itself, spanning more than one statement.
    pub fn begin(&mut self) -> TxnId {
        self.txns.begin(now_millis())
    }

    /// Creates a table and its clustered index in one step: registers the
    /// schema in the catalog, then creates the B+Tree backing its primary
    /// key (or surrogate key, if `primary_key` is empty) and records the
    /// real root page back into the catalog.
    pub fn create_table(
        &mut self,
        schema: &str,
        name: &str,
        columns: Vec<Column>,
        primary_key: Vec<ColumnId>,
    ) -> DbResult<TableId> {
        let table_id = self
            .catalog
            .create_table(schema, name, columns, primary_key)?;
        let storage = self.catalog.storage_info(schema, name)?.clone();
        let clustered_id = clustered_index_id(table_id);
        let descriptor = self.indexes.create_index(
            self.persistence.pool_mut(),
            clustered_id,
            table_id,
            "__clustered__",
            storage.space_id,
            true,
        )?;
        self.catalog
            .set_root_page(schema, name, self.indexes.root_page(descriptor.index_id)?)?;
        Ok(table_id)
    }

    /// Creates a secondary index over `columns`, building it from every row
    /// currently in the table's clustered index.
    pub fn create_index(
        &mut self,
        schema: &str,
        table_name: &str,
        index_name: &str,
        columns: &[&str],
        unique: bool,
    ) -> DbResult<IndexId> {
        let index_id = self.catalog.create_index(
            schema,
            table_name,
            index_name,
            columns,
            IndexKind::BTree { unique },
        )?;
        let table = self.catalog.table(schema, table_name)?;
        let table_id = table.id;
        let clustered_id = clustered_index_id(table_id);
        let column_ordinals = table.index(index_name)?.columns.clone();
        let space_id = common::SpaceId(1_000_000 + index_id.0 as u32);

        self.indexes.create_index(
            self.persistence.pool_mut(),
            index_id,
            table_id,
            index_name,
            space_id,
            unique,
        )?;

        let rows = self
            .indexes
            .scan_all_encoded(self.persistence.pool_mut(), clustered_id)?;
        for (pk_bytes, row_bytes) in &rows {
            let row = codec::decode_row(row_bytes)?;
            let key_values = codec::project_key(&row, &column_ordinals);
            let key_bytes = index::encode_key(&key_values);
            self.indexes.insert_encoded(
                self.persistence.pool_mut(),
                index_id,
                key_bytes,
                pk_bytes.clone(),
                None,
            )?;
        }

        self.catalog.set_index_root_page(
            schema,
            table_name,
            index_name,
            self.indexes.root_page(index_id)?,
        )?;
        Ok(index_id)
    }

    fn snapshot_table(&self, schema: &str, table_name: &str) -> DbResult<TableSnapshot> {
        let table = self.catalog.table(schema, table_name)?;
        let secondary = table
            .indexes()
            .iter()
            .map(|idx| SecondaryIndexSnapshot {
                id: idx.id,
                columns: idx.columns.clone(),
            })
            .collect();
        Ok(TableSnapshot {
            id: table.id,
            clustered_id: clustered_index_id(table.id),
            primary_key: table.primary_key.clone(),
            columns: table.schema_def.columns.clone(),
            secondary,
        })
    }

    fn append_redo(&mut self, record: &DmlRedo) -> DbResult<Lsn> {
        let payload = encode_redo(record)?;
        self.persistence.append_redo(&payload)
    }

    fn record_dirty_pages(&mut self, txn_id: TxnId, lsn: Lsn) -> DbResult<()> {
        let dirty = self.persistence.pool().dirty_pages();
        self.txns.with_txn(txn_id, |ctx| {
            for (space, page, _) in &dirty {
                ctx.record_page(*space, *page, lsn);
            }
            Ok(())
        })
    }

    /// Commits `txn_id`: flushes every page the transaction dirtied (so each
    /// gets a `page_flush` redo record before this call returns -- the
    /// physiological image recovery actually replays) then appends a
    /// logical commit record and marks the transaction committed.
    pub fn commit(&mut self, txn_id: TxnId) -> DbResult<()> {
        let pages: Vec<_> = self
            .txns
            .with_txn(txn_id, |ctx| Ok(ctx.modified_pages.iter().copied().collect()))?;
        for (space, page) in pages {
            self.persistence.flush_page(space, page)?;
        }
        let lsn = self.append_redo(&DmlRedo::Commit { txn_id })?;
        self.persistence.wal_mut().sync()?;
        self.txns.commit(txn_id, lsn)
    }

    /// Rolls `txn_id` back: drains its undo log in LIFO order, reversing
    /// each logged mutation against the clustered and secondary indexes.
    pub fn rollback(&mut self, txn_id: TxnId) -> DbResult<()> {
        let undo_log = self.txns.abort(txn_id)?;
        for action in undo_log {
            self.apply_undo(action)?;
        }
        let _ = self.append_redo(&DmlRedo::Rollback { txn_id })?;
        Ok(())
    }

    fn apply_undo(&mut self, action: UndoAction) -> DbResult<()> {
        match action {
            UndoAction::UndoInsert { table_id, pk } => {
                let clustered_id = clustered_index_id(table_id);
                if let Some(row_bytes) = self
                    .indexes
                    .search_encoded(self.persistence.pool_mut(), clustered_id, &pk)?
                    .into_iter()
                    .next()
                {
                    self.remove_from_all_indexes(table_id, &pk, &row_bytes)?;
                }
            }
            UndoAction::UndoDelete { table_id, pk, row } => {
                let clustered_id = clustered_index_id(table_id);
                self.indexes.insert_encoded(
                    self.persistence.pool_mut(),
                    clustered_id,
                    pk.clone(),
                    row.clone(),
                    None,
                )?;
                self.insert_into_secondary_indexes(table_id, &pk, &row)?;
            }
            UndoAction::UndoUpdate { table_id, pk, before } => {
                let clustered_id = clustered_index_id(table_id);
                let current = self
                    .indexes
                    .search_encoded(self.persistence.pool_mut(), clustered_id, &pk)?
                    .into_iter()
                    .next();
                if let Some(current_row) = current {
                    self.indexes.replace_encoded(
                        self.persistence.pool_mut(),
                        clustered_id,
                        &pk,
                        &current_row,
                        before.clone(),
                        None,
                    )?;
                    self.resync_secondary_indexes(table_id, &pk, &current_row, &before)?;
                }
            }
        }
        Ok(())
    }

    /// `(index_id, key_columns)` for every secondary index on a table,
    /// cloned out of the catalog so callers can freely mutate
    /// `self.indexes` while iterating.
    fn secondary_index_list(&self, table_id: TableId) -> DbResult<Vec<(IndexId, Vec<ColumnId>)>> {
        let table = self.catalog.table_by_id(table_id)?;
        Ok(table
            .indexes()
            .iter()
            .map(|idx| (idx.id, idx.columns.clone()))
            .collect())
    }

    fn remove_from_all_indexes(
        &mut self,
        table_id: TableId,
        pk_bytes: &[u8],
        row_bytes: &[u8],
    ) -> DbResult<()> {
        let clustered_id = clustered_index_id(table_id);
        let row = codec::decode_row(row_bytes)?;
        for (index_id, columns) in self.secondary_index_list(table_id)? {
            let key_bytes = index::encode_key(&codec::project_key(&row, &columns));
            self.indexes.delete_encoded(
                self.persistence.pool_mut(),
                index_id,
                &key_bytes,
                pk_bytes,
                None,
            )?;
        }
        self.indexes.delete_encoded(
            self.persistence.pool_mut(),
            clustered_id,
            pk_bytes,
            row_bytes,
            None,
        )?;
        Ok(())
    }

    fn insert_into_secondary_indexes(
        &mut self,
        table_id: TableId,
        pk_bytes: &[u8],
        row_bytes: &[u8],
    ) -> DbResult<()> {
        let row = codec::decode_row(row_bytes)?;
        for (index_id, columns) in self.secondary_index_list(table_id)? {
            let key_bytes = index::encode_key(&codec::project_key(&row, &columns));
            self.indexes.insert_encoded(
                self.persistence.pool_mut(),
                index_id,
                key_bytes,
                pk_bytes.to_vec(),
                None,
            )?;
        }
        Ok(())
    }

    fn resync_secondary_indexes(
        &mut self,
        table_id: TableId,
        pk_bytes: &[u8],
        old_row_bytes: &[u8],
        new_row_bytes: &[u8],
    ) -> DbResult<()> {
        let old_row = codec::decode_row(old_row_bytes)?;
        let new_row = codec::decode_row(new_row_bytes)?;
        for (index_id, columns) in self.secondary_index_list(table_id)? {
            let old_key = index::encode_key(&codec::project_key(&old_row, &columns));
            let new_key = index::encode_key(&codec::project_key(&new_row, &columns));
            if old_key == new_key {
                continue;
            }
            self.indexes.delete_encoded(
                self.persistence.pool_mut(),
                index_id,
                &old_key,
                pk_bytes,
                None,
            )?;
            self.indexes.insert_encoded(
                self.persistence.pool_mut(),
                index_id,
                new_key,
                pk_bytes.to_vec(),
                None,
            )?;
        }
        Ok(())
    }

    /// Runs `stmt` inside `txn_id` if supplied, otherwise opens and
    /// auto-commits a fresh transaction for the one statement. On error the
    /// transaction (whichever supplied or opened it) is rolled back before
    /// the error propagates.
    pub fn insert(&mut self, stmt: &InsertStmt, txn_id: Option<TxnId>) -> DbResult<DmlResult> {
        self.run_statement(txn_id, |exec, tid| exec.insert_inner(stmt, tid))
    }

    /// Reads every row of `schema.table` matching `condition`, via the same
    /// access-method choice UPDATE/DELETE use to locate their targets.
    /// Returns each row's encoded primary key alongside its decoded values.
    pub fn select(
        &mut self,
        schema: &str,
        table: &str,
        condition: &WhereCondition,
    ) -> DbResult<Vec<(Vec<u8>, Vec<Value>)>> {
        let snapshot = self.snapshot_table(schema, table)?;
        self.resolve_rows(&snapshot, condition)
    }

    pub fn update(&mut self, stmt: &UpdateStmt, txn_id: Option<TxnId>) -> DbResult<DmlResult> {
        self.run_statement(txn_id, |exec, tid| exec.update_inner(stmt, tid))
    }

    pub fn delete(&mut self, stmt: &DeleteStmt, txn_id: Option<TxnId>) -> DbResult<DmlResult> {
        self.run_statement(txn_id, |exec, tid| exec.delete_inner(stmt, tid))
    }

    fn run_statement(
        &mut self,
        txn_id: Option<TxnId>,
        body: impl FnOnce(&mut Self, TxnId) -> DbResult<DmlResult>,
    ) -> DbResult<DmlResult> {
        let (tid, owns_txn) = match txn_id {
            Some(tid) => (tid, false),
            None => (self.begin(), true),
        };
        match body(self, tid) {
            Ok(result) => {
                if owns_txn {
                    self.commit(tid)?;
                }
                Ok(result)
            }
            Err(err) => {
                let _ = self.rollback(tid);
                Err(err)
            }
        }
    }

    fn insert_inner(&mut self, stmt: &InsertStmt, txn_id: TxnId) -> DbResult<DmlResult> {
        let snapshot = self.snapshot_table(&stmt.schema, &stmt.table)?;
        if stmt.values.len() != snapshot.columns.len() {
            return Err(DbError::ColumnMismatch(format!(
                "table '{}.{}' expects {} columns, got {}",
                stmt.schema,
                stmt.table,
                snapshot.columns.len(),
                stmt.values.len()
            )));
        }
        for (column, value) in snapshot.columns.iter().zip(&stmt.values) {
            validate_value(column, value)?;
        }

        let (pk_values, last_insert_id) = if snapshot.primary_key.is_empty() {
            let table = self.catalog.table_mut(&stmt.schema, &stmt.table)?;
            let generated = table.next_auto_increment() as i64;
            (vec![Value::Int(generated)], Some(generated))
        } else {
            (
                codec::project_key(&stmt.values, &snapshot.primary_key),
                None,
            )
        };
        let pk_bytes = index::encode_key(&pk_values);
        let row_bytes = codec::encode_row(&stmt.values)?;

        if !self
            .indexes
            .search_encoded(self.persistence.pool_mut(), snapshot.clustered_id, &pk_bytes)?
            .is_empty()
        {
            return Err(DbError::DuplicateKey);
        }

        let redo = DmlRedo::Insert {
            table_id: snapshot.id,
            key: pk_bytes.clone(),
            row: row_bytes.clone(),
        };
        let lsn = self.append_redo(&redo)?;

        self.indexes.insert_encoded(
            self.persistence.pool_mut(),
            snapshot.clustered_id,
            pk_bytes.clone(),
            row_bytes.clone(),
            Some(lsn),
        )?;

        self.txns.with_txn(txn_id, |ctx| {
            ctx.push_undo(UndoAction::UndoInsert {
                table_id: snapshot.id,
                pk: pk_bytes.clone(),
            });
            Ok(())
        })?;

        let mut inserted: Vec<(IndexId, Vec<u8>)> = Vec::new();
        for sec in &snapshot.secondary {
            let key_bytes = index::encode_key(&codec::project_key(&stmt.values, &sec.columns));
            if let Err(err) = self.indexes.insert_encoded(
                self.persistence.pool_mut(),
                sec.id,
                key_bytes.clone(),
                pk_bytes.clone(),
                Some(lsn),
            ) {
                for (id, key) in inserted.into_iter().rev() {
                    let _ = self.indexes.delete_encoded(
                        self.persistence.pool_mut(),
                        id,
                        &key,
                        &pk_bytes,
                        None,
                    );
                }
                return Err(err);
            }
            inserted.push((sec.id, key_bytes));
        }

        self.record_dirty_pages(txn_id, lsn)?;

        Ok(DmlResult {
            affected_rows: 1,
            last_insert_id,
            kind: DmlKind::Insert,
        })
    }

    fn resolve_rows(
        &mut self,
        snapshot: &TableSnapshot,
        condition: &WhereCondition,
    ) -> DbResult<Vec<(Vec<u8>, Vec<Value>)>> {
        match condition {
            WhereCondition::None => {
                let pairs = self
                    .indexes
                    .scan_all_encoded(self.persistence.pool_mut(), snapshot.clustered_id)?;
                pairs
                    .into_iter()
                    .map(|(pk, row)| Ok((pk, codec::decode_row(&row)?)))
                    .collect()
            }
            WhereCondition::PkEquals(values) => {
                let pk_bytes = index::encode_key(values);
                let rows = self.indexes.search_encoded(
                    self.persistence.pool_mut(),
                    snapshot.clustered_id,
                    &pk_bytes,
                )?;
                rows.into_iter()
                    .map(|row| Ok((pk_bytes.clone(), codec::decode_row(&row)?)))
                    .collect()
            }
            WhereCondition::ColumnEquals { column, value } => {
                if let Some(sec) = snapshot.secondary.iter().find(|sec| sec.columns == [*column]) {
                    let key_bytes = index::encode_key(std::slice::from_ref(value));
                    let pks =
                        self.indexes
                            .search_encoded(self.persistence.pool_mut(), sec.id, &key_bytes)?;
                    let mut out = Vec::with_capacity(pks.len());
                    for pk_bytes in pks {
                        let rows = self.indexes.search_encoded(
                            self.persistence.pool_mut(),
                            snapshot.clustered_id,
                            &pk_bytes,
                        )?;
                        if let Some(row) = rows.into_iter().next() {
                            out.push((pk_bytes, codec::decode_row(&row)?));
                        }
                    }
                    Ok(out)
                } else {
                    let pairs = self
                        .indexes
                        .scan_all_encoded(self.persistence.pool_mut(), snapshot.clustered_id)?;
                    let mut out = Vec::new();
                    for (pk, row_bytes) in pairs {
                        let row = codec::decode_row(&row_bytes)?;
                        if row.get(*column as usize) == Some(value) {
                            out.push((pk, row));
                        }
                    }
                    Ok(out)
                }
            }
        }
    }

    fn update_inner(&mut self, stmt: &UpdateStmt, txn_id: TxnId) -> DbResult<DmlResult> {
        let snapshot = self.snapshot_table(&stmt.schema, &stmt.table)?;
        for assignment in &stmt.assignments {
            let column = snapshot
                .columns
                .get(assignment.column as usize)
                .ok_or_else(|| {
                    DbError::ColumnMismatch(format!("unknown column ordinal {}", assignment.column))
                })?;
            validate_value(column, &assignment.value)?;
        }

        let targets = self.resolve_rows(&snapshot, &stmt.condition)?;
        let mut affected = 0u64;
        for (pk_bytes, before_row) in targets {
            let mut after_row = before_row.clone();
            for assignment in &stmt.assignments {
                after_row[assignment.column as usize] = assignment.value.clone();
            }

            let new_pk_bytes = if snapshot.primary_key.is_empty() {
                pk_bytes.clone()
            } else {
                index::encode_key(&codec::project_key(&after_row, &snapshot.primary_key))
            };
            let before_bytes = codec::encode_row(&before_row)?;
            let after_bytes = codec::encode_row(&after_row)?;

            let redo = DmlRedo::Update {
                table_id: snapshot.id,
                key: pk_bytes.clone(),
                before: before_bytes.clone(),
                after: after_bytes.clone(),
            };
            let lsn = self.append_redo(&redo)?;

            if new_pk_bytes == pk_bytes {
                self.indexes.replace_encoded(
                    self.persistence.pool_mut(),
                    snapshot.clustered_id,
                    &pk_bytes,
                    &before_bytes,
                    after_bytes.clone(),
                    Some(lsn),
                )?;
            } else {
                self.indexes.delete_encoded(
                    self.persistence.pool_mut(),
                    snapshot.clustered_id,
                    &pk_bytes,
                    &before_bytes,
                    Some(lsn),
                )?;
                self.indexes.insert_encoded(
                    self.persistence.pool_mut(),
                    snapshot.clustered_id,
                    new_pk_bytes.clone(),
                    after_bytes.clone(),
                    Some(lsn),
                )?;
            }

            for sec in &snapshot.secondary {
                let old_key = index::encode_key(&codec::project_key(&before_row, &sec.columns));
                let new_key = index::encode_key(&codec::project_key(&after_row, &sec.columns));
                if old_key == new_key && new_pk_bytes == pk_bytes {
                    continue;
                }
                self.indexes.delete_encoded(
                    self.persistence.pool_mut(),
                    sec.id,
                    &old_key,
                    &pk_bytes,
                    Some(lsn),
                )?;
                self.indexes.insert_encoded(
                    self.persistence.pool_mut(),
                    sec.id,
                    new_key,
                    new_pk_bytes.clone(),
                    Some(lsn),
                )?;
            }

            self.record_dirty_pages(txn_id, lsn)?;
            self.txns.with_txn(txn_id, |ctx| {
                ctx.push_undo(UndoAction::UndoUpdate {
                    table_id: snapshot.id,
                    pk: new_pk_bytes.clone(),
                    before: before_bytes.clone(),
                });
                Ok(())
            })?;
            affected += 1;
        }

        Ok(DmlResult {
            affected_rows: affected,
            last_insert_id: None,
            kind: DmlKind::Update,
        })
    }

    fn delete_inner(&mut self, stmt: &DeleteStmt, txn_id: TxnId) -> DbResult<DmlResult> {
        let snapshot = self.snapshot_table(&stmt.schema, &stmt.table)?;
        let targets = self.resolve_rows(&snapshot, &stmt.condition)?;
        let mut affected = 0u64;
        for (pk_bytes, row) in targets {
            let row_bytes = codec::encode_row(&row)?;
            let redo = DmlRedo::Delete {
                table_id: snapshot.id,
                key: pk_bytes.clone(),
                row: row_bytes.clone(),
            };
            let lsn = self.append_redo(&redo)?;

            self.indexes.delete_encoded(
                self.persistence.pool_mut(),
                snapshot.clustered_id,
                &pk_bytes,
                &row_bytes,
                Some(lsn),
            )?;

            for sec in &snapshot.secondary {
                let key_bytes = index::encode_key(&codec::project_key(&row, &sec.columns));
                self.indexes.delete_encoded(
                    self.persistence.pool_mut(),
                    sec.id,
                    &key_bytes,
                    &pk_bytes,
                    Some(lsn),
                )?;
            }

            self.record_dirty_pages(txn_id, lsn)?;
            self.txns.with_txn(txn_id, |ctx| {
                ctx.push_undo(UndoAction::UndoDelete {
                    table_id: snapshot.id,
                    pk: pk_bytes.clone(),
                    row: row_bytes.clone(),
                });
                Ok(())
            })?;
            affected += 1;
        }

        Ok(DmlResult {
            affected_rows: affected,
            last_insert_id: None,
            kind: DmlKind::Delete,
        })
    }
}

fn validate_value(column: &Column, value: &Value) -> DbResult<()> {
    if matches!(value, Value::Null) {
        if !column.nullable {
            return Err(DbError::NotNullViolation(format!(
                "column '{}' does not accept NULL",
                column.name
            )));
        }
        return Ok(());
    }
    if let Some(max_len) = column.max_len {
        let len = match value {
            Value::String(s) => Some(s.len()),
            Value::Bytes(b) => Some(b.len()),
            _ => None,
        };
        if let Some(len) = len {
            if len > max_len {
                return Err(DbError::ValueTooLong(format!(
                    "column '{}' accepts at most {} bytes, got {}",
                    column.name, max_len, len
                )));
            }
        }
    }
    Ok(())
}
