use super::*;
use tempfile::tempdir;

#[test]
fn create_open_round_trip() {
    let dir = tempdir().unwrap();
    let mut mgr = StorageManager::new(dir.path(), DEFAULT_PAGE_SIZE).unwrap();
    mgr.create_space(SpaceId(1)).unwrap();

    let info = mgr.get_info(SpaceId(1)).unwrap();
    assert_eq!(info.page_size, DEFAULT_PAGE_SIZE);
    assert_eq!(info.num_pages, 1);
    assert_eq!(info.free_pages, 0);
}

#[test]
fn create_twice_errors() {
    let dir = tempdir().unwrap();
    let mut mgr = StorageManager::new(dir.path(), DEFAULT_PAGE_SIZE).unwrap();
    mgr.create_space(SpaceId(1)).unwrap();
    let err = mgr.create_space(SpaceId(1)).unwrap_err();
    assert!(matches!(err, DbError::Storage(_)));
}

#[test]
fn allocate_and_read_write_page() {
    let dir = tempdir().unwrap();
    let mut mgr = StorageManager::new(dir.path(), DEFAULT_PAGE_SIZE).unwrap();
    mgr.create_space(SpaceId(1)).unwrap();

    let page = mgr.allocate_page(SpaceId(1)).unwrap();
    assert_eq!(page, PageId(1));

    let mut buf = PageBuf::zeroed(DEFAULT_PAGE_SIZE);
    buf.data[0..5].copy_from_slice(b"hello");
    mgr.write_page(SpaceId(1), page, &buf).unwrap();

    let read = mgr.read_page(SpaceId(1), page).unwrap();
    assert_eq!(&read.data[0..5], b"hello");
}

#[test]
fn freed_pages_are_recycled() {
    let dir = tempdir().unwrap();
    let mut mgr = StorageManager::new(dir.path(), DEFAULT_PAGE_SIZE).unwrap();
    mgr.create_space(SpaceId(1)).unwrap();

    let a = mgr.allocate_page(SpaceId(1)).unwrap();
    let b = mgr.allocate_page(SpaceId(1)).unwrap();
    mgr.free_page(SpaceId(1), a).unwrap();

    let info = mgr.get_info(SpaceId(1)).unwrap();
    assert_eq!(info.free_pages, 1);

    let reused = mgr.allocate_page(SpaceId(1)).unwrap();
    assert_eq!(reused, a);
    assert_ne!(reused, b);

    let info = mgr.get_info(SpaceId(1)).unwrap();
    assert_eq!(info.free_pages, 0);
}

#[test]
fn reopen_preserves_pages_across_instances() {
    let dir = tempdir().unwrap();
    let page;
    {
        let mut mgr = StorageManager::new(dir.path(), DEFAULT_PAGE_SIZE).unwrap();
        mgr.create_space(SpaceId(7)).unwrap();
        page = mgr.allocate_page(SpaceId(7)).unwrap();
        let mut buf = PageBuf::zeroed(DEFAULT_PAGE_SIZE);
        buf.data[0] = 0xAB;
        mgr.write_page(SpaceId(7), page, &buf).unwrap();
        mgr.sync_all().unwrap();
    }

    let mut mgr = StorageManager::new(dir.path(), DEFAULT_PAGE_SIZE).unwrap();
    mgr.open_space(SpaceId(7)).unwrap();
    let read = mgr.read_page(SpaceId(7), page).unwrap();
    assert_eq!(read.data[0], 0xAB);
}

#[test]
fn corrupted_home_page_recovers_from_doublewrite_buffer() {
    let dir = tempdir().unwrap();
    let mut mgr = StorageManager::new(dir.path(), DEFAULT_PAGE_SIZE).unwrap();
    mgr.create_space(SpaceId(3)).unwrap();
    let page = mgr.allocate_page(SpaceId(3)).unwrap();

    let mut buf = PageBuf::zeroed(DEFAULT_PAGE_SIZE);
    buf.data[10] = 0x42;
    mgr.write_page(SpaceId(3), page, &buf).unwrap();
    mgr.sync_all().unwrap();
    mgr.close_space(SpaceId(3)).unwrap();

    // Simulate a torn write: corrupt the home copy on disk directly.
    let data_path = space_path(dir.path(), SpaceId(3));
    let mut raw = std::fs::read(&data_path).unwrap();
    let stride = DEFAULT_PAGE_SIZE + CHECKSUM_BYTES;
    raw[stride + 10] = 0xFF;
    std::fs::write(&data_path, raw).unwrap();

    mgr.open_space(SpaceId(3)).unwrap();
    let recovered = mgr.read_page(SpaceId(3), page).unwrap();
    assert_eq!(recovered.data[10], 0x42);
}

#[test]
fn delete_space_requires_close() {
    let dir = tempdir().unwrap();
    let mut mgr = StorageManager::new(dir.path(), DEFAULT_PAGE_SIZE).unwrap();
    mgr.create_space(SpaceId(9)).unwrap();

    let err = mgr.delete_space(SpaceId(9)).unwrap_err();
    assert!(matches!(err, DbError::Storage(_)));

    mgr.close_space(SpaceId(9)).unwrap();
    mgr.delete_space(SpaceId(9)).unwrap();
    assert!(!space_path(dir.path(), SpaceId(9)).exists());
}

#[test]
fn list_spaces_reflects_disk_contents() {
    let dir = tempdir().unwrap();
    let mut mgr = StorageManager::new(dir.path(), DEFAULT_PAGE_SIZE).unwrap();
    mgr.create_space(SpaceId(1)).unwrap();
    mgr.create_space(SpaceId(2)).unwrap();

    let spaces = mgr.list_spaces().unwrap();
    assert_eq!(spaces, vec![SpaceId(1), SpaceId(2)]);
}
