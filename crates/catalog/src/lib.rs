//! Table -> storage map (C8): the process-wide registry of which tablespace
//! and root page back each table and index, plus the schema (columns, SQL
//! types) describing how to interpret the rows stored there.
//!
//! This is the same `Catalog`/`TableMeta`/`TableSchema`/`Column` shape the
//! teacher shipped; it already models "(schema, table) -> storage info" as
//! an in-memory registry persisted to JSON. It has been extended with the
//! `TableStorageInfo` fields the engine needs to open a table's clustered
//! index without a separate lookup, and with the reserved system schema
//! names that cannot be dropped or recreated.

use std::{fs, path::Path};

use ahash::RandomState;
use common::{ColumnId, DbError, DbResult, IndexId, PageId, SpaceId, TableId};
use hashbrown::HashMap;
use serde::{Deserialize, Serialize};
use types::SqlType;

type Map<K, V> = HashMap<K, V, RandomState>;

/// Database (schema) names reserved by the engine itself; see
/// [`validate_schema_name`].
pub const RESERVED_SCHEMAS: [&str; 4] =
    ["information_schema", "mysql", "performance_schema", "sys"];

/// Validates a schema (database) name: 1-64 bytes, `[A-Za-z0-9_$]`, and a
/// non-digit first character. Does not itself reject reserved names --
/// callers creating or dropping a schema should additionally check
/// [`RESERVED_SCHEMAS`].
pub fn validate_schema_name(name: &str) -> DbResult<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(DbError::Catalog(format!(
            "schema name '{name}' must be 1-64 bytes long"
        )));
    }
    let mut chars = name.chars();
    let first = chars.next().expect("checked non-empty above");
    if first.is_ascii_digit() {
        return Err(DbError::Catalog(format!(
            "schema name '{name}' cannot start with a digit"
        )));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
    {
        return Err(DbError::Catalog(format!(
            "schema name '{name}' contains characters outside [A-Za-z0-9_$]"
        )));
    }
    Ok(())
}

/// Returns whether `name` names a reserved system schema that cannot be
/// dropped or recreated.
pub fn is_reserved_schema(name: &str) -> bool {
    RESERVED_SCHEMAS.contains(&name)
}

/// Which physical layout backs a table's storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StorageKind {
    /// Index-organized table: rows live in the leaves of the primary key's
    /// B+Tree.
    Clustered,
    /// A system catalog table backed by the reserved system tablespace
    /// rather than a per-table tablespace.
    System,
}

/// `(schema, table, space_id, root_page, index_page, data_segment_id, type)`
/// -- the full storage binding for one table, as spec'd by the Table ->
/// Storage Map. `index_page` is the root of the table's default secondary
/// index page chain, if any has been created yet.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableStorageInfo {
    pub schema: String,
    pub table: String,
    pub space_id: SpaceId,
    pub root_page: PageId,
    pub index_page: Option<PageId>,
    pub data_segment_id: u64,
    pub kind: StorageKind,
}

/// Persistent catalog that stores table schemas and index metadata.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Catalog {
    tables: Vec<TableMeta>,
    next_table_id: u64,
    next_index_id: u64,
    #[serde(skip)]
    #[serde(default)]
    table_name_index: Map<(String, String), usize>,
    #[serde(skip)]
    #[serde(default)]
    table_id_index: Map<TableId, usize>,
}

impl Catalog {
    /// Create an empty catalog.
    pub fn new() -> Self {
        let mut catalog = Self {
            tables: Vec::new(),
            next_table_id: 1,
            next_index_id: 1,
            table_name_index: Map::default(),
            table_id_index: Map::default(),
        };
        catalog.rebuild_indexes();
        catalog
    }

    /// Load a catalog from disk, returning an empty catalog if the file does not exist.
    pub fn load(path: &Path) -> DbResult<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let data = fs::read_to_string(path)?;
        let mut catalog: Catalog = serde_json::from_str(&data)
            .map_err(|err| DbError::Catalog(format!("invalid catalog file: {err}")))?;
        catalog.rebuild_indexes();
        Ok(catalog)
    }

    /// Persist the catalog contents as pretty JSON.
    pub fn save(&self, path: &Path) -> DbResult<()> {
        let data = serde_json::to_string_pretty(self)
            .map_err(|err| DbError::Catalog(format!("serialize failed: {err}")))?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Returns an immutable reference to a table by (schema, name).
    pub fn table(&self, schema: &str, name: &str) -> DbResult<&TableMeta> {
        let idx = self
            .table_name_index
            .get(&(schema.to_string(), name.to_string()))
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{schema}.{name}'")))?;
        self.tables
            .get(idx)
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{schema}.{name}'")))
    }

    /// Returns an immutable reference to a table by identifier.
    pub fn table_by_id(&self, id: TableId) -> DbResult<&TableMeta> {
        let idx = self
            .table_id_index
            .get(&id)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown table id {}", id.0)))?;
        self.tables
            .get(idx)
            .ok_or_else(|| DbError::Catalog(format!("unknown table id {}", id.0)))
    }

    /// Registers a new table, reserving a [`TableId`] and a fresh space id
    /// for its clustered index. The caller is responsible for actually
    /// creating that tablespace and B+Tree and then calling
    /// [`Catalog::set_root_page`] once the real root page is known.
    ///
    /// `primary_key` names the ordinals of the clustered index's key
    /// columns; pass an empty slice to have the engine generate a
    /// surrogate `Int` key via [`TableMeta::next_auto_increment`].
    pub fn create_table(
        &mut self,
        schema: &str,
        name: &str,
        columns: Vec<Column>,
        primary_key: Vec<ColumnId>,
    ) -> DbResult<TableId> {
        validate_schema_name(schema)?;
        if is_reserved_schema(schema) {
            return Err(DbError::Catalog(format!(
                "schema '{schema}' is reserved and cannot be created into"
            )));
        }
        let key = (schema.to_string(), name.to_string());
        if self.table_name_index.contains_key(&key) {
            return Err(DbError::Catalog(format!(
                "table '{schema}.{name}' already exists"
            )));
        }
        let table_schema = TableSchema::try_new(columns)?;
        for ordinal in &primary_key {
            if *ordinal as usize >= table_schema.columns.len() {
                return Err(DbError::Catalog(format!(
                    "primary key ordinal {ordinal} out of range for table '{schema}.{name}'"
                )));
            }
        }
        let table_id = TableId(self.next_table_id);
        let space_id = SpaceId(self.next_table_id as u32);
        self.next_table_id += 1;
        let storage = TableStorageInfo {
            schema: schema.to_string(),
            table: name.to_string(),
            space_id,
            root_page: PageId(0),
            index_page: None,
            data_segment_id: table_id.0,
            kind: StorageKind::Clustered,
        };
        let table = TableMeta::new(
            table_id,
            schema.to_string(),
            name.to_string(),
            table_schema,
            storage,
            primary_key,
        );
        self.tables.push(table);
        self.rebuild_indexes();
        Ok(table_id)
    }

    /// Remove a table and its associated indexes.
    pub fn drop_table(&mut self, schema: &str, name: &str) -> DbResult<()> {
        if is_reserved_schema(schema) {
            return Err(DbError::Catalog(format!(
                "schema '{schema}' is reserved and cannot be dropped from"
            )));
        }
        let key = (schema.to_string(), name.to_string());
        let idx = self
            .table_name_index
            .get(&key)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{schema}.{name}'")))?;
        self.tables.remove(idx);
        self.rebuild_indexes();
        Ok(())
    }

    /// Records the real root page of a table's clustered index, once its
    /// B+Tree has actually been created.
    pub fn set_root_page(&mut self, schema: &str, name: &str, root_page: PageId) -> DbResult<()> {
        let table = self.table_mut(schema, name)?;
        table.storage.root_page = root_page;
        Ok(())
    }

    /// Create an index over the given table columns, returning its identifier.
    pub fn create_index(
        &mut self,
        schema: &str,
        table_name: &str,
        index_name: &str,
        columns: &[&str],
        kind: IndexKind,
    ) -> DbResult<IndexId> {
        if columns.is_empty() {
            return Err(DbError::Catalog(
                "index must reference at least one column".into(),
            ));
        }
        let resolved = {
            let table = self.table(schema, table_name)?;
            let mut resolved = Vec::with_capacity(columns.len());
            for name in columns {
                let ordinal = table.schema.column_index(name).ok_or_else(|| {
                    DbError::Catalog(format!("unknown column '{name}' on table '{table_name}'"))
                })?;
                resolved.push(ordinal);
            }
            resolved
        };
        let index_id = IndexId(self.next_index_id);
        self.next_index_id += 1;
        let table = self.table_mut(schema, table_name)?;
        table.add_index(IndexMeta {
            id: index_id,
            name: index_name.to_string(),
            columns: resolved,
            kind,
            space_id: SpaceId(1_000_000 + index_id.0 as u32),
            root_page: PageId(0),
        })?;
        Ok(index_id)
    }

    /// Drop an index attached to a table.
    pub fn drop_index(&mut self, schema: &str, table_name: &str, index_name: &str) -> DbResult<()> {
        let table = self.table_mut(schema, table_name)?;
        table.remove_index(index_name)
    }

    /// Records the real root page of a secondary index's B+Tree, once it
    /// has actually been created.
    pub fn set_index_root_page(
        &mut self,
        schema: &str,
        table_name: &str,
        index_name: &str,
        root_page: PageId,
    ) -> DbResult<()> {
        let table = self.table_mut(schema, table_name)?;
        let idx = table
            .index_name_lookup
            .get(index_name)
            .copied()
            .ok_or_else(|| {
                DbError::Catalog(format!(
                    "index '{index_name}' does not exist on table '{table_name}'"
                ))
            })?;
        table.indexes[idx].root_page = root_page;
        Ok(())
    }

    /// Immutable iterator over all tables.
    pub fn tables(&self) -> impl Iterator<Item = &TableMeta> {
        self.tables.iter()
    }

    pub fn table_mut(&mut self, schema: &str, name: &str) -> DbResult<&mut TableMeta> {
        let key = (schema.to_string(), name.to_string());
        let id = self
            .table_name_index
            .get(&key)
            .copied()
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{schema}.{name}'")))?;
        self.tables
            .get_mut(id)
            .ok_or_else(|| DbError::Catalog(format!("unknown table '{schema}.{name}'")))
    }

    /// The registry entry for a table's backing storage.
    pub fn storage_info(&self, schema: &str, name: &str) -> DbResult<&TableStorageInfo> {
        Ok(&self.table(schema, name)?.storage)
    }

    /// The fixed storage bindings for the reserved system schemas: the
    /// catalog itself lives in low, hand-assigned space ids the way
    /// InnoDB's system tablespace holds its own data dictionary.
    pub fn system_table_info() -> Vec<TableStorageInfo> {
        RESERVED_SCHEMAS
            .iter()
            .enumerate()
            .map(|(i, schema)| TableStorageInfo {
                schema: (*schema).to_string(),
                table: "__catalog__".to_string(),
                space_id: SpaceId(i as u32),
                root_page: PageId(0),
                index_page: None,
                data_segment_id: i as u64,
                kind: StorageKind::System,
            })
            .collect()
    }

    fn rebuild_indexes(&mut self) {
        self.table_name_index.clear();
        self.table_id_index.clear();
        for (idx, table) in self.tables.iter_mut().enumerate() {
            self.table_name_index
                .insert((table.schema.clone(), table.name.clone()), idx);
            self.table_id_index.insert(table.id, idx);
            table.rebuild_index_lookup();
        }
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Metadata describing a registered table.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TableMeta {
    pub id: TableId,
    pub schema: String,
    pub name: String,
    pub schema_def: TableSchema,
    pub storage: TableStorageInfo,
    pub indexes: Vec<IndexMeta>,
    /// Ordinals of the clustered index's key columns. Empty means the
    /// engine generates a surrogate `Int` key via [`Self::next_auto_increment`].
    pub primary_key: Vec<ColumnId>,
    next_auto_increment: u64,
    #[serde(skip)]
    #[serde(default)]
    index_name_lookup: Map<String, usize>,
    #[serde(skip)]
    #[serde(default)]
    index_id_lookup: Map<IndexId, usize>,
}

impl TableMeta {
    fn new(
        id: TableId,
        schema: String,
        name: String,
        schema_def: TableSchema,
        storage: TableStorageInfo,
        primary_key: Vec<ColumnId>,
    ) -> Self {
        let mut table = Self {
            id,
            schema,
            name,
            schema_def,
            storage,
            indexes: Vec::new(),
            primary_key,
            next_auto_increment: 1,
            index_name_lookup: Map::default(),
            index_id_lookup: Map::default(),
        };
        table.rebuild_index_lookup();
        table
    }

    /// Whether this table's primary key is engine-generated rather than
    /// taken from an explicit column.
    pub fn has_surrogate_key(&self) -> bool {
        self.primary_key.is_empty()
    }

    /// Returns the next surrogate key value, advancing the counter. Only
    /// meaningful when [`Self::has_surrogate_key`] is true.
    pub fn next_auto_increment(&mut self) -> u64 {
        let value = self.next_auto_increment;
        self.next_auto_increment += 1;
        value
    }

    fn add_index(&mut self, index: IndexMeta) -> DbResult<()> {
        if self.index_name_lookup.contains_key(&index.name) {
            return Err(DbError::Catalog(format!(
                "index '{}' already exists on table '{}'",
                index.name, self.name
            )));
        }
        self.indexes.push(index);
        self.rebuild_index_lookup();
        Ok(())
    }

    fn remove_index(&mut self, index_name: &str) -> DbResult<()> {
        let idx = self
            .index_name_lookup
            .get(index_name)
            .copied()
            .ok_or_else(|| {
                DbError::Catalog(format!(
                    "index '{index_name}' does not exist on table '{}'",
                    self.name
                ))
            })?;
        self.indexes.remove(idx);
        self.rebuild_index_lookup();
        Ok(())
    }

    /// Lookup an index by name.
    pub fn index(&self, name: &str) -> DbResult<&IndexMeta> {
        let idx = self.index_name_lookup.get(name).copied().ok_or_else(|| {
            DbError::Catalog(format!(
                "index '{name}' does not exist on table '{}'",
                self.name
            ))
        })?;
        self.indexes
            .get(idx)
            .ok_or_else(|| DbError::Catalog(format!("index '{name}' missing on '{}'", self.name)))
    }

    /// Lookup an index by identifier.
    pub fn index_by_id(&self, id: IndexId) -> DbResult<&IndexMeta> {
        let idx = self.index_id_lookup.get(&id).copied().ok_or_else(|| {
            DbError::Catalog(format!("unknown index id {} on '{}'", id.0, self.name))
        })?;
        self.indexes.get(idx).ok_or_else(|| {
            DbError::Catalog(format!(
                "index id {} missing in table '{}'",
                id.0, self.name
            ))
        })
    }

    /// Returns true if an index with the provided name exists.
    pub fn has_index(&self, index_name: &str) -> bool {
        self.index_name_lookup.contains_key(index_name)
    }

    /// Returns all indexes defined on this table.
    pub fn indexes(&self) -> &[IndexMeta] {
        &self.indexes
    }

    fn rebuild_index_lookup(&mut self) {
        self.index_name_lookup.clear();
        self.index_id_lookup.clear();
        for (idx, index) in self.indexes.iter().enumerate() {
            self.index_name_lookup.insert(index.name.clone(), idx);
            self.index_id_lookup.insert(index.id, idx);
        }
    }
}

/// Column layout for a table, along with helpful lookup structures.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct TableSchema {
    pub columns: Vec<Column>,
    pub name_to_ordinal: Map<String, ColumnId>,
}

impl TableSchema {
    pub fn try_new(columns: Vec<Column>) -> DbResult<Self> {
        if columns.is_empty() {
            return Err(DbError::Catalog(
                "table must contain at least one column".into(),
            ));
        }
        if columns.len() > u16::MAX as usize {
            return Err(DbError::Catalog(
                "too many columns for a single table".into(),
            ));
        }
        let mut name_to_ordinal = Map::default();
        for (idx, column) in columns.iter().enumerate() {
            let ordinal = idx as ColumnId;
            if name_to_ordinal
                .insert(column.name.clone(), ordinal)
                .is_some()
            {
                return Err(DbError::Catalog(format!(
                    "duplicate column '{}' found while building schema",
                    column.name
                )));
            }
        }
        Ok(Self {
            columns,
            name_to_ordinal,
        })
    }

    /// Returns the ordinal for a column name.
    pub fn column_index(&self, name: &str) -> Option<ColumnId> {
        self.name_to_ordinal.get(name).copied()
    }

    /// Returns the SQL type for the provided ordinal.
    pub fn column_type(&self, ordinal: ColumnId) -> Option<&SqlType> {
        self.columns.get(ordinal as usize).map(|c| &c.ty)
    }
}

/// Describes a logical column within a table schema.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: SqlType,
    pub nullable: bool,
    pub max_len: Option<usize>,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
            nullable: true,
            max_len: None,
        }
    }

    /// A column that rejects `NULL`.
    pub fn not_null(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            nullable: false,
            ..Self::new(name, ty)
        }
    }

    /// Caps `String`/`Bytes` values at `max_len` bytes.
    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }
}

/// Metadata describing a table index.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexMeta {
    pub id: IndexId,
    pub name: String,
    pub columns: Vec<ColumnId>,
    pub kind: IndexKind,
    pub space_id: SpaceId,
    pub root_page: PageId,
}

/// Supported index implementations. Hash/bitmap/trie indexes from earlier
/// iterations of this catalog are gone: every index in this engine is a
/// B+Tree, unique or not.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum IndexKind {
    BTree { unique: bool },
}
