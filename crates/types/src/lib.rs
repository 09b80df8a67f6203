use std::cmp::Ordering;

/// Declared column type in a table schema.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SqlType {
    Int,
    UInt,
    Float,
    Text,
    Bool,
    Bytes,
    Time,
}

/// A dynamically-typed column value.
///
/// This is the tagged sum every row, key, and WAL payload is built from.
/// Comparisons and equality are only defined within a tag: comparing across
/// types (e.g. `Int` vs `Text`) returns `None` rather than picking an
/// arbitrary cross-type ordering.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Bool(bool),
    Bytes(Vec<u8>),
    String(String),
    /// Milliseconds since the Unix epoch.
    Time(i64),
}

impl Value {
    /// Ordinal of the value's tag, used as the leading byte of its key encoding
    /// and to group comparisons/equality by type.
    pub fn tag(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Int(_) => 1,
            Value::UInt(_) => 2,
            Value::Float(_) => 3,
            Value::Bool(_) => 4,
            Value::Bytes(_) => 5,
            Value::String(_) => 6,
            Value::Time(_) => 7,
        }
    }

    pub fn sql_type(&self) -> Option<SqlType> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(SqlType::Int),
            Value::UInt(_) => Some(SqlType::UInt),
            Value::Float(_) => Some(SqlType::Float),
            Value::Bool(_) => Some(SqlType::Bool),
            Value::Bytes(_) => Some(SqlType::Bytes),
            Value::String(_) => Some(SqlType::Text),
            Value::Time(_) => Some(SqlType::Time),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Compare two values of the same tag. Cross-tag comparisons (including
    /// against `Null`) return `None`; callers that need SQL's three-valued
    /// NULL handling check `is_null()` first.
    pub fn cmp_same_type(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::UInt(a), Value::UInt(b)) => Some(a.cmp(b)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Bytes(a), Value::Bytes(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Time(a), Value::Time(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    pub fn eq_same_type(&self, other: &Value) -> Option<bool> {
        self.cmp_same_type(other).map(|o| o == Ordering::Equal)
    }
}
