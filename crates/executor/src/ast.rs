//! The minimal *resolved* shape of the three DML AST nodes the core
//! consumes. The real lexer/parser/planner lives outside this crate's
//! scope; by the time a statement reaches here, column names have already
//! been resolved to their schema and ordinals.

use common::ColumnId;
use types::Value;

/// How an UPDATE/DELETE's WHERE clause narrows down rows, already reduced
/// to the shapes the executor's access-method chooser understands.
#[derive(Clone, Debug, PartialEq)]
pub enum WhereCondition {
    /// No predicate: every row in the table.
    None,
    /// Primary key equality, e.g. `WHERE id = 7` (or a composite PK tuple).
    PkEquals(Vec<Value>),
    /// Equality against a single non-key column.
    ColumnEquals { column: ColumnId, value: Value },
}

/// `INSERT INTO schema.table VALUES (...)`. `values` is positional, in
/// schema column order; a surrogate-key table still supplies a value for
/// every declared column (the generated key is not itself a column).
#[derive(Clone, Debug, PartialEq)]
pub struct InsertStmt {
    pub schema: String,
    pub table: String,
    pub values: Vec<Value>,
}

/// One `column = value` assignment inside an UPDATE's SET list.
#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    pub column: ColumnId,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateStmt {
    pub schema: String,
    pub table: String,
    pub assignments: Vec<Assignment>,
    pub condition: WhereCondition,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DeleteStmt {
    pub schema: String,
    pub table: String,
    pub condition: WhereCondition,
}
