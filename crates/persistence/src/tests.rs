use super::*;
use common::SyncMode;
use std::time::Duration;
use storage::{DEFAULT_PAGE_SIZE, StorageManager};
use tempfile::tempdir;

fn manager(dir: &std::path::Path) -> PersistenceManager {
    let storage = StorageManager::new(dir.join("data"), DEFAULT_PAGE_SIZE).unwrap();
    let pool = BufferPool::new(storage, 64, Duration::from_millis(500));
    let wal = Wal::open(dir.join("wal"), 1024 * 1024, SyncMode::Immediate).unwrap();
    let checkpoints = CheckpointManager::open(dir.join("checkpoints"), 10).unwrap();
    PersistenceManager::new(pool, wal, checkpoints)
}

#[test]
fn flush_page_clears_dirty_and_writes_redo() {
    let dir = tempdir().unwrap();
    let mut mgr = manager(dir.path());
    mgr.pool_mut().storage_mut().create_space(SpaceId(1)).unwrap();
    let (page, data) = mgr.pool_mut().new_page(SpaceId(1)).unwrap();
    data[0] = 7;
    mgr.pool_mut().unpin_page(SpaceId(1), page, true, None).unwrap();

    let flushed = mgr.flush_page(SpaceId(1), page).unwrap();
    assert!(flushed);
    assert_eq!(mgr.pool().dirty_pages().len(), 0);
}

#[test]
fn flush_page_on_clean_page_is_a_no_op() {
    let dir = tempdir().unwrap();
    let mut mgr = manager(dir.path());
    mgr.pool_mut().storage_mut().create_space(SpaceId(1)).unwrap();
    let (page, _) = mgr.pool_mut().new_page(SpaceId(1)).unwrap();
    mgr.pool_mut().unpin_page(SpaceId(1), page, false, None).unwrap();

    assert!(!mgr.flush_page(SpaceId(1), page).unwrap());
}

#[test]
fn flush_all_dirty_flushes_every_dirty_page() {
    let dir = tempdir().unwrap();
    let mut mgr = manager(dir.path());
    mgr.pool_mut().storage_mut().create_space(SpaceId(1)).unwrap();
    for _ in 0..5 {
        let (page, _) = mgr.pool_mut().new_page(SpaceId(1)).unwrap();
        mgr.pool_mut().unpin_page(SpaceId(1), page, true, None).unwrap();
    }

    let flushed = mgr.flush_all_dirty(&CancelToken::new()).unwrap();
    assert_eq!(flushed, 5);
}

#[test]
fn create_checkpoint_flushes_then_writes_manifest() {
    let dir = tempdir().unwrap();
    let mut mgr = manager(dir.path());
    mgr.pool_mut().storage_mut().create_space(SpaceId(1)).unwrap();
    let (page, _) = mgr.pool_mut().new_page(SpaceId(1)).unwrap();
    mgr.pool_mut().unpin_page(SpaceId(1), page, true, None).unwrap();

    let manifest = mgr.create_checkpoint(&CancelToken::new(), false).unwrap();
    assert_eq!(manifest.index, 1);
    assert_eq!(mgr.pool().dirty_pages().len(), 0);
}

#[test]
fn recover_replays_page_flush_records_into_fresh_storage() {
    let dir = tempdir().unwrap();
    let space_dir = dir.path().join("data");
    let wal_dir = dir.path().join("wal");
    let ckpt_dir = dir.path().join("checkpoints");

    let (space, page, image) = {
        let storage = StorageManager::new(&space_dir, DEFAULT_PAGE_SIZE).unwrap();
        let pool = BufferPool::new(storage, 64, Duration::from_millis(500));
        let wal = Wal::open(&wal_dir, 1024 * 1024, SyncMode::Immediate).unwrap();
        let checkpoints = CheckpointManager::open(&ckpt_dir, 10).unwrap();
        let mut mgr = PersistenceManager::new(pool, wal, checkpoints);

        mgr.pool_mut().storage_mut().create_space(SpaceId(1)).unwrap();
        let (page, data) = mgr.pool_mut().new_page(SpaceId(1)).unwrap();
        data[0] = 99;
        let image = data.to_vec();
        mgr.pool_mut().unpin_page(SpaceId(1), page, true, None).unwrap();
        mgr.flush_page(SpaceId(1), page).unwrap();
        (SpaceId(1), page, image)
    };

    // Simulate a restart against the same on-disk WAL/checkpoint directories.
    let storage = StorageManager::new(&space_dir, DEFAULT_PAGE_SIZE).unwrap();
    let pool = BufferPool::new(storage, 64, Duration::from_millis(500));
    let wal = Wal::open(&wal_dir, 1024 * 1024, SyncMode::Immediate).unwrap();
    let checkpoints = CheckpointManager::open(&ckpt_dir, 10).unwrap();
    let mut mgr = PersistenceManager::new(pool, wal, checkpoints);

    let applied = mgr.recover().unwrap();
    assert_eq!(applied, 1);

    mgr.pool_mut().storage_mut().open_space(space).unwrap();
    let restored = mgr.pool_mut().storage_mut().read_page(space, page).unwrap();
    assert_eq!(restored.data[0], image[0]);
}
