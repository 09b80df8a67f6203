use super::*;
use tempfile::tempdir;

#[test]
fn append_and_replay_records() {
    let dir = tempdir().unwrap();
    let mut wal = Wal::open(dir.path(), 1024 * 1024, SyncMode::Immediate).unwrap();

    let lsn1 = wal.append(b"insert row 1").unwrap();
    let lsn2 = wal.append(b"delete row 1").unwrap();
    assert!(lsn2 > lsn1);

    let replayed = wal.replay_from(Lsn(0)).unwrap();
    assert_eq!(replayed.len(), 2);
    assert_eq!(replayed[0].payload.as_ref(), b"insert row 1");
    assert_eq!(replayed[1].payload.as_ref(), b"delete row 1");
}

#[test]
fn replay_from_skips_earlier_records() {
    let dir = tempdir().unwrap();
    let mut wal = Wal::open(dir.path(), 1024 * 1024, SyncMode::Immediate).unwrap();

    let _lsn1 = wal.append(b"first").unwrap();
    let lsn2 = wal.append(b"second").unwrap();
    wal.append(b"third").unwrap();

    let replayed = wal.replay_from(lsn2).unwrap();
    assert_eq!(replayed.len(), 2);
    assert_eq!(replayed[0].payload.as_ref(), b"second");
}

#[test]
fn empty_payload_round_trips() {
    let dir = tempdir().unwrap();
    let mut wal = Wal::open(dir.path(), 1024 * 1024, SyncMode::Immediate).unwrap();

    wal.append(b"").unwrap();
    let replayed = wal.replay_from(Lsn(0)).unwrap();
    assert_eq!(replayed.len(), 1);
    assert!(replayed[0].payload.is_empty());
}

#[test]
fn reopen_resumes_lsn_after_valid_records() {
    let dir = tempdir().unwrap();
    let next_lsn;
    {
        let mut wal = Wal::open(dir.path(), 1024 * 1024, SyncMode::Immediate).unwrap();
        wal.append(b"a").unwrap();
        wal.append(b"b").unwrap();
        next_lsn = wal.next_lsn();
    }

    let wal = Wal::open(dir.path(), 1024 * 1024, SyncMode::Immediate).unwrap();
    assert_eq!(wal.next_lsn(), next_lsn);

    let replayed = wal.replay_from(Lsn(0)).unwrap();
    assert_eq!(replayed.len(), 2);
}

#[test]
fn rotation_creates_new_segment_past_the_size_limit() {
    let dir = tempdir().unwrap();
    let mut wal = Wal::open(dir.path(), 64, SyncMode::Immediate).unwrap();

    for i in 0..20 {
        wal.append(format!("record-{i}").as_bytes()).unwrap();
    }

    assert!(wal.segment_count() > 1);
    let replayed = wal.replay_from(Lsn(0)).unwrap();
    assert_eq!(replayed.len(), 20);
}

#[test]
fn truncate_removes_fully_covered_segments() {
    let dir = tempdir().unwrap();
    let mut wal = Wal::open(dir.path(), 64, SyncMode::Immediate).unwrap();

    let mut lsns = Vec::new();
    for i in 0..20 {
        lsns.push(wal.append(format!("record-{i}").as_bytes()).unwrap());
    }
    let segments_before = wal.segment_count();
    assert!(segments_before > 2);

    let midpoint = lsns[10];
    wal.truncate(midpoint).unwrap();
    assert!(wal.segment_count() < segments_before);

    let replayed = wal.replay_from(Lsn(0)).unwrap();
    assert!(replayed.iter().all(|r| r.lsn >= Lsn(1)));
}

#[test]
fn corrupted_tail_frame_is_dropped_on_replay() {
    let dir = tempdir().unwrap();
    let mut wal = Wal::open(dir.path(), 1024 * 1024, SyncMode::Immediate).unwrap();

    wal.append(b"good-one").unwrap();
    wal.append(b"good-two").unwrap();
    drop(wal);

    let path = dir.path().join("wal_00000000000000000001.log");
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&path, bytes).unwrap();

    let wal = Wal::open(dir.path(), 1024 * 1024, SyncMode::Immediate).unwrap();
    let replayed = wal.replay_from(Lsn(0)).unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].payload.as_ref(), b"good-one");
}

#[test]
fn group_commit_mode_does_not_fsync_on_every_append() {
    let dir = tempdir().unwrap();
    let mut wal = Wal::open(dir.path(), 1024 * 1024, SyncMode::GroupCommit).unwrap();
    wal.append(b"buffered").unwrap();
    wal.sync().unwrap();

    let replayed = wal.replay_from(Lsn(0)).unwrap();
    assert_eq!(replayed.len(), 1);
}
