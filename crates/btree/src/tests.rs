use super::*;
use buffer::BufferPool;
use common::{IndexId, SpaceId};
use std::time::Duration;
use storage::{DEFAULT_PAGE_SIZE, StorageManager};
use tempfile::tempdir;

fn pool(dir: &std::path::Path) -> BufferPool {
    let storage = StorageManager::new(dir, DEFAULT_PAGE_SIZE).unwrap();
    BufferPool::new(storage, 64, Duration::from_millis(1000))
}

/// Test-only stand-in for a row/rid payload: the tree does not care what
/// the value bytes mean, so a big-endian slot number is enough to tell
/// entries apart.
fn val(slot: u16) -> Vec<u8> {
    slot.to_be_bytes().to_vec()
}

/// Test-only stand-in for the real order-preserving encoder (owned by the
/// `index` crate): big-endian so integer byte order matches integer value
/// order.
fn int_key(v: i64) -> Vec<u8> {
    v.to_be_bytes().to_vec()
}

fn str_key(s: &str) -> Vec<u8> {
    s.as_bytes().to_vec()
}

fn composite(parts: &[Vec<u8>]) -> Vec<u8> {
    let mut out = Vec::new();
    for p in parts {
        out.extend_from_slice(&(p.len() as u32).to_be_bytes());
        out.extend_from_slice(p);
    }
    out
}

#[test]
fn create_empty_index() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    let results = index.search(&mut pool, &int_key(1)).unwrap();
    assert!(results.is_empty());
}

#[test]
fn insert_and_search_single_key() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    let v = val(0);
    index.insert(&mut pool, int_key(42), v.clone(), None).unwrap();

    let results = index.search(&mut pool, &int_key(42)).unwrap();
    assert_eq!(results, vec![v]);

    let results = index.search(&mut pool, &int_key(99)).unwrap();
    assert!(results.is_empty());
}

#[test]
fn unique_index_rejects_duplicate_key() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    index.insert(&mut pool, int_key(1), val(0), None).unwrap();
    let err = index.insert(&mut pool, int_key(1), val(1), None).unwrap_err();
    assert!(matches!(err, DbError::DuplicateKey));
}

#[test]
fn non_unique_index_allows_duplicate_keys() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), false).unwrap();

    for slot in 0..3 {
        index
            .insert(&mut pool, int_key(42), val(slot), None)
            .unwrap();
    }

    let results = index.search(&mut pool, &int_key(42)).unwrap();
    assert_eq!(results.len(), 3);
}

#[test]
fn insert_multiple_keys_reverse_order() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    for i in (0..10).rev() {
        index
            .insert(&mut pool, int_key(i), val(i as u16), None)
            .unwrap();
    }

    for i in 0..10 {
        let results = index.search(&mut pool, &int_key(i)).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0], val(i as u16));
    }
}

#[test]
fn delete_existing_key() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    let v = val(0);
    index.insert(&mut pool, int_key(42), v.clone(), None).unwrap();
    assert!(index.delete(&mut pool, &int_key(42), &v, None).unwrap());
    assert!(index.search(&mut pool, &int_key(42)).unwrap().is_empty());
}

#[test]
fn delete_non_existent_key_returns_false() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    assert!(!index
        .delete(&mut pool, &int_key(42), &val(0), None)
        .unwrap());
}

#[test]
fn range_scan_with_bounds() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    for i in 0..10 {
        index
            .insert(&mut pool, int_key(i), val(i as u16), None)
            .unwrap();
    }

    let low = int_key(3);
    let high = int_key(7);
    let results = index
        .range_scan(&mut pool, Some(&low), Some(&high))
        .unwrap();

    assert_eq!(results.len(), 5);
    for (i, (_, v)) in results.iter().enumerate() {
        assert_eq!(*v, val((3 + i) as u16));
    }
}

#[test]
fn string_keys_compare_lexically() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    for (slot, name) in ["alice", "bob", "charlie", "dave"].iter().enumerate() {
        index
            .insert(&mut pool, str_key(name), val(slot as u16), None)
            .unwrap();
    }

    let results = index.search(&mut pool, &str_key("charlie")).unwrap();
    assert_eq!(results, vec![val(2)]);
}

#[test]
fn composite_keys() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    let entries = [
        (composite(&[str_key("eng"), int_key(1)]), 0u16),
        (composite(&[str_key("eng"), int_key(2)]), 1),
        (composite(&[str_key("sales"), int_key(1)]), 2),
    ];
    for (key, slot) in &entries {
        index.insert(&mut pool, key.clone(), val(*slot), None).unwrap();
    }

    let results = index
        .search(&mut pool, &composite(&[str_key("eng"), int_key(2)]))
        .unwrap();
    assert_eq!(results, vec![val(1)]);
}

#[test]
fn many_inserts_trigger_splits_and_remain_searchable() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    let count = 500i64;
    for i in 0..count {
        index
            .insert(
                &mut pool,
                int_key(i),
                val((i % u16::MAX as i64) as u16),
                None,
            )
            .unwrap();
    }

    for i in 0..count {
        let results = index.search(&mut pool, &int_key(i)).unwrap();
        assert_eq!(results.len(), 1, "key {i} not found");
    }

    let all = index.scan_all(&mut pool).unwrap();
    assert_eq!(all.len(), count as usize);
}

#[test]
fn deleted_key_is_excluded_from_scans_and_range_queries() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    for i in 0..5 {
        index.insert(&mut pool, int_key(i), val(i as u16), None).unwrap();
    }
    assert!(index.delete(&mut pool, &int_key(2), &val(2), None).unwrap());

    assert!(index.search(&mut pool, &int_key(2)).unwrap().is_empty());
    let all = index.scan_all(&mut pool).unwrap();
    assert_eq!(all.len(), 4);
    let range = index.range_scan(&mut pool, Some(&int_key(0)), Some(&int_key(4))).unwrap();
    assert_eq!(range.len(), 4);
}

#[test]
fn delete_then_insert_reuses_the_tombstoned_slot() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    index.insert(&mut pool, int_key(1), val(1), None).unwrap();
    index.insert(&mut pool, int_key(2), val(2), None).unwrap();
    assert!(index.delete(&mut pool, &int_key(1), &val(1), None).unwrap());

    index.insert(&mut pool, int_key(3), val(3), None).unwrap();
    assert_eq!(index.search(&mut pool, &int_key(3)).unwrap(), vec![val(3)]);
    assert!(index.search(&mut pool, &int_key(1)).unwrap().is_empty());

    let all = index.scan_all(&mut pool).unwrap();
    assert_eq!(all.len(), 2);
}

#[test]
fn replace_updates_value_of_matching_size_in_place() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    index.insert(&mut pool, int_key(42), val(1), None).unwrap();
    assert!(index
        .replace(&mut pool, &int_key(42), &val(1), val(2), None)
        .unwrap());

    assert_eq!(index.search(&mut pool, &int_key(42)).unwrap(), vec![val(2)]);
}

#[test]
fn replace_with_a_larger_value_falls_back_to_tombstone_and_reinsert() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    let small = vec![9u8];
    let large = vec![1u8; 64];
    index.insert(&mut pool, int_key(42), small.clone(), None).unwrap();
    assert!(index
        .replace(&mut pool, &int_key(42), &small, large.clone(), None)
        .unwrap());

    assert_eq!(index.search(&mut pool, &int_key(42)).unwrap(), vec![large]);
}

#[test]
fn replace_of_missing_entry_returns_false() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    assert!(!index
        .replace(&mut pool, &int_key(1), &val(0), val(1), None)
        .unwrap());
}

#[test]
fn deleting_most_keys_triggers_merges_and_leaves_survivors_searchable() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    let count = 300i64;
    for i in 0..count {
        index.insert(&mut pool, int_key(i), val((i % u16::MAX as i64) as u16), None).unwrap();
    }

    // Delete every key but every tenth, driving many leaves (and eventually
    // their parents) below the merge/redistribute occupancy threshold.
    for i in 0..count {
        if i % 10 != 0 {
            let v = val((i % u16::MAX as i64) as u16);
            assert!(index.delete(&mut pool, &int_key(i), &v, None).unwrap());
        }
    }

    for i in 0..count {
        let results = index.search(&mut pool, &int_key(i)).unwrap();
        if i % 10 == 0 {
            assert_eq!(results.len(), 1, "survivor key {i} missing");
        } else {
            assert!(results.is_empty(), "deleted key {i} still present");
        }
    }

    let all = index.scan_all(&mut pool).unwrap();
    assert_eq!(all.len(), (count / 10) as usize);
    for (i, (k, _)) in all.iter().enumerate() {
        assert_eq!(k, &int_key(i as i64 * 10));
    }
}

#[test]
fn deleting_every_key_leaves_an_empty_but_usable_index() {
    let dir = tempdir().unwrap();
    let mut pool = pool(dir.path());
    let mut index = BTree::create(&mut pool, IndexId(1), SpaceId(1), true).unwrap();

    let count = 100i64;
    for i in 0..count {
        index.insert(&mut pool, int_key(i), val(i as u16), None).unwrap();
    }
    for i in 0..count {
        assert!(index.delete(&mut pool, &int_key(i), &val(i as u16), None).unwrap());
    }

    assert!(index.scan_all(&mut pool).unwrap().is_empty());

    index.insert(&mut pool, int_key(1), val(1), None).unwrap();
    assert_eq!(index.search(&mut pool, &int_key(1)).unwrap(), vec![val(1)]);
}
