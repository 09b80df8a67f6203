use super::*;

#[test]
fn begin_assigns_increasing_ids() {
    let table = TxnTable::new();
    let a = table.begin(1);
    let b = table.begin(2);
    assert!(b.0 > a.0);
    assert_eq!(table.status(a), Some(TxnStatus::Active));
}

#[test]
fn commit_marks_status_and_last_lsn() {
    let table = TxnTable::new();
    let id = table.begin(1);
    table.commit(id, Lsn(42)).unwrap();
    assert_eq!(table.status(id), Some(TxnStatus::Committed));
}

#[test]
fn abort_returns_undo_log_in_lifo_order() {
    let table = TxnTable::new();
    let id = table.begin(1);
    table
        .with_txn(id, |ctx| {
            ctx.push_undo(UndoAction::UndoInsert {
                table_id: TableId(1),
                pk: vec![1],
            });
            ctx.push_undo(UndoAction::UndoInsert {
                table_id: TableId(1),
                pk: vec![2],
            });
            Ok(())
        })
        .unwrap();

    let log = table.abort(id).unwrap();
    assert_eq!(log.len(), 2);
    match &log[0] {
        UndoAction::UndoInsert { pk, .. } => assert_eq!(pk, &vec![2]),
        _ => panic!("expected UndoInsert"),
    }
    assert_eq!(table.status(id), Some(TxnStatus::Aborted));
}

#[test]
fn operations_on_aborted_txn_fail_fast() {
    let table = TxnTable::new();
    let id = table.begin(1);
    table.abort(id).unwrap();

    let err = table.with_txn(id, |_ctx| Ok(())).unwrap_err();
    assert!(matches!(err, DbError::TxnAborted(_)));
}

#[test]
fn record_page_tracks_first_and_last_lsn() {
    let table = TxnTable::new();
    let id = table.begin(1);
    table
        .with_txn(id, |ctx| {
            ctx.record_page(SpaceId(1), PageId(1), Lsn(10));
            ctx.record_page(SpaceId(1), PageId(2), Lsn(20));
            Ok(())
        })
        .unwrap();

    table
        .with_txn(id, |ctx| {
            assert_eq!(ctx.first_lsn, Some(Lsn(10)));
            assert_eq!(ctx.last_lsn, Some(Lsn(20)));
            assert_eq!(ctx.modified_pages.len(), 2);
            Ok(())
        })
        .unwrap();
}

#[test]
fn active_txns_excludes_committed_and_aborted() {
    let table = TxnTable::new();
    let a = table.begin(1);
    let b = table.begin(2);
    let c = table.begin(3);
    table.commit(a, Lsn(1)).unwrap();
    table.abort(b).unwrap();

    let active = table.active_txns();
    assert_eq!(active, vec![c]);
}

#[test]
fn cancel_token_reports_cancellation() {
    let token = CancelToken::new();
    assert!(token.check().is_ok());
    token.cancel();
    assert!(matches!(token.check(), Err(DbError::Cancelled)));
}
