//! Engine: wires the Storage Provider (C1) through DML Executor (C10) into
//! a single handle an embedding binary opens once at startup.
//!
//! This is the boundary spec.md §6 describes: a caller hands it a
//! `common::Config` (data directory, page size, buffer pool size, sync
//! mode), `Engine::open` lays out the on-disk directories, loads (or
//! creates) the catalog, and replays the WAL from the last checkpoint
//! before returning a handle ready to take DML.

use catalog::{Catalog, Column, IndexKind};
use checkpoint::CheckpointManager;
use common::{ColumnId, Config, DbResult, IndexId, TableId};
use executor::{
    ast::{DeleteStmt, InsertStmt, UpdateStmt},
    DmlResult, Executor,
};
use index::IndexManager;
use persistence::PersistenceManager;
use std::path::{Path, PathBuf};
use storage::StorageManager;
use txn::CancelToken;

const CATALOG_FILE: &str = "catalog.json";
const DATA_SUBDIR: &str = "tablespaces";
const WAL_SUBDIR: &str = "wal";
const CHECKPOINT_SUBDIR: &str = "checkpoints";

/// An open database: the executor plus the config it was opened with, kept
/// around so background tickers and `shutdown` know where things live.
pub struct Engine {
    executor: Executor,
    config: Config,
    cancel: CancelToken,
}

impl Engine {
    /// Opens (creating if absent) the database rooted at `config.data_dir`,
    /// then replays the WAL from the latest checkpoint.
    pub fn open(config: Config) -> DbResult<Self> {
        std::fs::create_dir_all(&config.data_dir)?;
        let storage = StorageManager::new(
            config.data_dir.join(DATA_SUBDIR),
            config.page_size,
        )?;
        let pool = buffer::BufferPool::new(
            storage,
            config.buffer_pool_pages,
            std::time::Duration::from_millis(config.old_block_time_ms),
        );
        let wal = wal::Wal::open(
            config.data_dir.join(WAL_SUBDIR),
            config.wal_segment_bytes,
            config.sync_mode,
        )?;
        let checkpoints =
            CheckpointManager::open(config.data_dir.join(CHECKPOINT_SUBDIR), config.max_checkpoints)?;
        let mut persistence = PersistenceManager::new(pool, wal, checkpoints);

        let catalog_path = catalog_path(&config.data_dir);
        let catalog = Catalog::load(&catalog_path)?;

        let replayed = persistence.recover()?;
        tracing::info!(replayed, "recovery complete");

        let indexes = reopen_indexes(&mut persistence, &catalog)?;

        let executor = Executor::new(catalog, indexes, persistence);
        Ok(Self {
            executor,
            config,
            cancel: CancelToken::new(),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn create_table(
        &mut self,
        schema: &str,
        name: &str,
        columns: Vec<Column>,
        primary_key: Vec<ColumnId>,
    ) -> DbResult<TableId> {
        let id = self
            .executor
            .create_table(schema, name, columns, primary_key)?;
        self.save_catalog()?;
        Ok(id)
    }

    pub fn create_index(
        &mut self,
        schema: &str,
        table_name: &str,
        index_name: &str,
        columns: &[&str],
        unique: bool,
    ) -> DbResult<IndexId> {
        let id = self
            .executor
            .create_index(schema, table_name, index_name, columns, unique)?;
        self.save_catalog()?;
        Ok(id)
    }

    pub fn insert(&mut self, stmt: &InsertStmt) -> DbResult<DmlResult> {
        self.executor.insert(stmt, None)
    }

    pub fn update(&mut self, stmt: &UpdateStmt) -> DbResult<DmlResult> {
        self.executor.update(stmt, None)
    }

    pub fn delete(&mut self, stmt: &DeleteStmt) -> DbResult<DmlResult> {
        self.executor.delete(stmt, None)
    }

    pub fn select(
        &mut self,
        schema: &str,
        table: &str,
        condition: &executor::ast::WhereCondition,
    ) -> DbResult<Vec<(Vec<u8>, Vec<types::Value>)>> {
        self.executor.select(schema, table, condition)
    }

    /// Flushes every dirty page and writes a checkpoint manifest.
    pub fn checkpoint(&mut self) -> DbResult<()> {
        self.executor
            .persistence_mut()
            .create_checkpoint(&self.cancel, true)?;
        Ok(())
    }

    /// Checkpoints and persists the catalog; called before the process
    /// exits cleanly.
    pub fn shutdown(mut self) -> DbResult<()> {
        self.checkpoint()?;
        self.save_catalog()
    }

    fn save_catalog(&self) -> DbResult<()> {
        self.executor
            .catalog()
            .save(&catalog_path(&self.config.data_dir))
    }
}

fn catalog_path(data_dir: &Path) -> PathBuf {
    data_dir.join(CATALOG_FILE)
}

/// Reattaches every table's clustered index and every secondary index to a
/// fresh `IndexManager`, from the root pages recorded in the catalog. Called
/// once at startup, after WAL replay has restored page content.
fn reopen_indexes(persistence: &mut PersistenceManager, catalog: &Catalog) -> DbResult<IndexManager> {
    let mut indexes = IndexManager::new();
    for table in catalog.tables() {
        persistence
            .pool_mut()
            .storage_mut()
            .open_space(table.storage.space_id)?;
        indexes.open_index(
            executor::clustered_index_id_for(table.id),
            table.id,
            "__clustered__",
            table.storage.space_id,
            table.storage.root_page,
            true,
        );
        for index in table.indexes() {
            let IndexKind::BTree { unique } = &index.kind;
            persistence.pool_mut().storage_mut().open_space(index.space_id)?;
            indexes.open_index(
                index.id,
                table.id,
                &index.name,
                index.space_id,
                index.root_page,
                *unique,
            );
        }
    }
    Ok(indexes)
}

#[cfg(test)]
mod tests;
