use super::*;
use std::time::Duration;
use storage::{DEFAULT_PAGE_SIZE, StorageManager};
use tempfile::tempdir;

fn pool(dir: &std::path::Path) -> BufferPool {
    let storage = StorageManager::new(dir, DEFAULT_PAGE_SIZE).unwrap();
    BufferPool::new(storage, 64, Duration::from_millis(1000))
}

/// Test-only stand-in for a row/rid payload.
fn val(slot: u16) -> Vec<u8> {
    slot.to_be_bytes().to_vec()
}

#[test]
fn create_and_search_typed_key() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut mgr = IndexManager::new();
    mgr.create_index(&mut pool, IndexId(1), TableId(1), "pk_users", SpaceId(1), true)
        .unwrap();

    let v = val(0);
    mgr.insert_key(&mut pool, IndexId(1), &[Value::Int(42)], v.clone(), None)
        .unwrap();

    let results = mgr
        .search_key(&mut pool, IndexId(1), &[Value::Int(42)])
        .unwrap();
    assert_eq!(results, vec![v]);
}

#[test]
fn unique_violation_surfaces_through_manager() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut mgr = IndexManager::new();
    mgr.create_index(&mut pool, IndexId(1), TableId(1), "pk_users", SpaceId(1), true)
        .unwrap();

    mgr.insert_key(&mut pool, IndexId(1), &[Value::Int(1)], val(0), None)
        .unwrap();
    let err = mgr
        .insert_key(&mut pool, IndexId(1), &[Value::Int(1)], val(1), None)
        .unwrap_err();
    assert!(matches!(err, DbError::DuplicateKey));
}

#[test]
fn list_indexes_filters_by_table() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut mgr = IndexManager::new();
    mgr.create_index(&mut pool, IndexId(1), TableId(1), "pk_users", SpaceId(1), true)
        .unwrap();
    mgr.create_index(&mut pool, IndexId(2), TableId(1), "idx_users_name", SpaceId(2), false)
        .unwrap();
    mgr.create_index(&mut pool, IndexId(3), TableId(2), "pk_orders", SpaceId(3), true)
        .unwrap();

    let users_indexes = mgr.list_indexes(TableId(1));
    assert_eq!(users_indexes.len(), 2);
}

#[test]
fn composite_string_int_keys_range_scan_correctly() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut mgr = IndexManager::new();
    mgr.create_index(&mut pool, IndexId(1), TableId(1), "idx_dept_emp", SpaceId(1), false)
        .unwrap();

    let entries = [
        (vec![Value::String("eng".into()), Value::Int(1)], 0u16),
        (vec![Value::String("eng".into()), Value::Int(2)], 1),
        (vec![Value::String("eng".into()), Value::Int(3)], 2),
        (vec![Value::String("sales".into()), Value::Int(1)], 3),
    ];
    for (key, slot) in &entries {
        mgr.insert_key(&mut pool, IndexId(1), key, val(*slot), None)
            .unwrap();
    }

    let low = vec![Value::String("eng".into()), Value::Int(1)];
    let high = vec![Value::String("eng".into()), Value::Int(2)];
    let results = mgr
        .range_scan(&mut pool, IndexId(1), Some(&low), Some(&high))
        .unwrap();
    assert_eq!(results.len(), 2);
}

#[test]
fn delete_key_removes_entry() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut mgr = IndexManager::new();
    mgr.create_index(&mut pool, IndexId(1), TableId(1), "pk_users", SpaceId(1), true)
        .unwrap();

    let v = val(0);
    mgr.insert_key(&mut pool, IndexId(1), &[Value::Int(7)], v.clone(), None)
        .unwrap();
    assert!(mgr
        .delete_key(&mut pool, IndexId(1), &[Value::Int(7)], &v, None)
        .unwrap());
    assert!(mgr
        .search_key(&mut pool, IndexId(1), &[Value::Int(7)])
        .unwrap()
        .is_empty());
}

#[test]
fn replace_key_updates_value_in_place() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut mgr = IndexManager::new();
    mgr.create_index(&mut pool, IndexId(1), TableId(1), "pk_users", SpaceId(1), true)
        .unwrap();

    let old = val(0);
    let new = val(1);
    mgr.insert_key(&mut pool, IndexId(1), &[Value::Int(7)], old.clone(), None)
        .unwrap();
    assert!(mgr
        .replace_key(&mut pool, IndexId(1), &[Value::Int(7)], &old, new.clone(), None)
        .unwrap());

    let results = mgr
        .search_key(&mut pool, IndexId(1), &[Value::Int(7)])
        .unwrap();
    assert_eq!(results, vec![new]);
}

#[test]
fn unknown_index_id_errors() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mgr = IndexManager::new();
    let err = mgr
        .search_key(&mut pool, IndexId(99), &[Value::Int(1)])
        .unwrap_err();
    assert!(matches!(err, DbError::NotFound(_)));
}
