//! Row encode/decode (§4.6): a row is a positional `Vec<Value>`, serialized
//! with the same bincode legacy config every other on-disk structure in
//! this workspace uses.

use common::{ColumnId, DbError, DbResult};
use types::Value;

fn bincode_config() -> impl bincode::config::Config {
    bincode::config::legacy()
}

pub fn encode_row(values: &[Value]) -> DbResult<Vec<u8>> {
    bincode::serde::encode_to_vec(values, bincode_config())
        .map_err(|e| DbError::Storage(format!("failed to encode row: {e}")))
}

pub fn decode_row(bytes: &[u8]) -> DbResult<Vec<Value>> {
    let (values, _): (Vec<Value>, usize) =
        bincode::serde::decode_from_slice(bytes, bincode_config())
            .map_err(|e| DbError::Corruption(format!("failed to decode row: {e}")))?;
    Ok(values)
}

/// Projects a row down to the column values named by `ordinals`, in order
/// -- used to build both primary-key and secondary-index key tuples.
pub fn project_key(values: &[Value], ordinals: &[ColumnId]) -> Vec<Value> {
    ordinals
        .iter()
        .map(|&ord| values[ord as usize].clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_row() {
        let row = vec![Value::Int(7), Value::String("alice".into()), Value::Null];
        let encoded = encode_row(&row).unwrap();
        let decoded = decode_row(&encoded).unwrap();
        assert_eq!(decoded, row);
    }

    #[test]
    fn projects_key_columns_in_order() {
        let row = vec![Value::Int(7), Value::String("eng".into()), Value::Bool(true)];
        assert_eq!(
            project_key(&row, &[1, 0]),
            vec![Value::String("eng".into()), Value::Int(7)]
        );
    }
}
