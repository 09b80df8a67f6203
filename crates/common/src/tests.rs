use super::*;
use std::io;

#[test]
fn config_defaults_are_sane() {
    let cfg = Config::default();
    assert_eq!(cfg.page_size, 16384);
    assert_eq!(cfg.buffer_pool_pages, 256);
    assert!(cfg.wal_enabled);
    assert_eq!(cfg.sync_mode, SyncMode::GroupCommit);
    assert_eq!(cfg.max_checkpoints, 10);
}

#[test]
fn db_error_formats_cleanly() {
    let err = DbError::Storage("corruption".into());
    assert!(format!("{err}").contains("storage"));

    let err = DbError::PoolExhausted {
        pinned: 256,
        capacity: 256,
    };
    assert!(format!("{err}").contains("256"));
}

#[test]
fn lsn_advances_monotonically() {
    let a = Lsn::ZERO;
    let b = a.next(128);
    assert!(b > a);
    assert_eq!(b, Lsn(128));
}

#[test]
fn io_error_converts() {
    let e = io::Error::other("oops");
    let db_err: DbError = e.into();
    assert!(matches!(db_err, DbError::Io(_)));
}
