//! Write-ahead log: a sequence of checksummed, length-prefixed records
//! spread across rotating segment files.
//!
//! # Architecture
//!
//! - **Segmented**: the log is split into `wal_<start_lsn>.log` files so
//!   old segments fully covered by a checkpoint can be deleted in one
//!   filesystem call instead of rewriting a single growing file.
//! - **Physiological records**: a WAL record is an opaque, caller-defined
//!   payload (`bytes::Bytes`) plus the [`Lsn`] assigned to it; the WAL
//!   itself has no opinion on what it encodes. The `txn`/`executor` crates
//!   define the payload shapes (row image, undo entry, ...).
//! - **Checksum-verified replay**: each frame carries a CRC32 over its LSN,
//!   length, and payload. Replay stops at the first checksum failure, which
//!   is the expected shape of a torn write at the tail after a crash.
//! - **Three sync postures** ([`SyncMode`]): `Immediate` fsyncs on every
//!   append, `GroupCommit` and `Async` only flush the OS buffer on append
//!   and rely on an external caller (the `persistence` crate's tickers) to
//!   call `sync()`.

#[cfg(test)]
mod tests;

use bytes::Bytes;
use common::{DbError, DbResult, Lsn, SyncMode};
use std::{
    fs::{self, File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// Bytes of fixed framing overhead per record: 8 (lsn) + 4 (len) + 4 (crc32).
const FRAME_OVERHEAD: u64 = 16;

/// A decoded record returned by [`Wal::replay_from`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WalRecord {
    pub lsn: Lsn,
    pub payload: Bytes,
}

#[derive(Clone, Debug)]
struct SegmentMeta {
    start_lsn: Lsn,
    path: PathBuf,
}

fn segment_path(dir: &Path, start_lsn: Lsn) -> PathBuf {
    dir.join(format!("wal_{:020}.log", start_lsn.0))
}

fn frame_len(payload_len: usize) -> u64 {
    FRAME_OVERHEAD + payload_len as u64
}

fn encode_frame(lsn: Lsn, payload: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(frame_len(payload.len()) as usize);
    buf.extend_from_slice(&lsn.0.to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    let crc = crc32fast::hash(&buf);
    buf.extend_from_slice(&crc.to_le_bytes());
    buf
}

/// Write-ahead log manager.
pub struct Wal {
    dir: PathBuf,
    segment_bytes: u64,
    sync_mode: SyncMode,
    segments: Vec<SegmentMeta>,
    active: File,
    active_len: u64,
    next_lsn: Lsn,
}

impl Wal {
    /// Open (or create) the WAL rooted at `dir`. Existing segments are
    /// discovered and the active segment is the one with the highest
    /// `start_lsn`; `next_lsn` resumes from the tail of valid records found
    /// during a lightweight scan of that segment.
    pub fn open(dir: impl Into<PathBuf>, segment_bytes: u64, sync_mode: SyncMode) -> DbResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let mut segments = discover_segments(&dir)?;
        let next_lsn = if segments.is_empty() {
            let start = Lsn(1);
            let path = segment_path(&dir, start);
            File::create(&path)?;
            segments.push(SegmentMeta { start_lsn: start, path });
            start
        } else {
            tail_lsn(&segments)?
        };

        let active_path = segments.last().expect("non-empty by construction").path.clone();
        let active = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&active_path)?;
        let active_len = active.metadata()?.len();

        Ok(Self {
            dir,
            segment_bytes,
            sync_mode,
            segments,
            active,
            active_len,
            next_lsn,
        })
    }

    pub fn sync_mode(&self) -> SyncMode {
        self.sync_mode
    }

    /// Append a record, rotating to a new segment first if it would not fit
    /// within `segment_bytes`. Returns the LSN assigned to the record.
    ///
    /// Under [`SyncMode::Immediate`] the write is fsynced before returning;
    /// otherwise the caller (or a background ticker) must call `sync()`.
    pub fn append(&mut self, payload: &[u8]) -> DbResult<Lsn> {
        let lsn = self.next_lsn;
        let frame = encode_frame(lsn, payload);

        if self.active_len > 0 && self.active_len + frame.len() as u64 > self.segment_bytes {
            self.rotate(lsn)?;
        }

        self.active
            .write_all(&frame)
            .map_err(|e| DbError::Wal(format!("append failed: {e}")))?;
        self.active_len += frame.len() as u64;

        if self.sync_mode == SyncMode::Immediate {
            self.active
                .sync_all()
                .map_err(|e| DbError::Wal(format!("fsync failed: {e}")))?;
        } else {
            self.active
                .flush()
                .map_err(|e| DbError::Wal(format!("flush failed: {e}")))?;
        }

        self.next_lsn = Lsn(lsn.0 + frame.len() as u64);
        Ok(lsn)
    }

    /// Force the active segment durable. Used directly under
    /// `SyncMode::Immediate` (redundant there) and by the persistence
    /// layer's group-commit / async tickers otherwise.
    pub fn sync(&mut self) -> DbResult<()> {
        self.active
            .sync_all()
            .map_err(|e| DbError::Wal(format!("fsync failed: {e}")))
    }

    fn rotate(&mut self, start_lsn: Lsn) -> DbResult<()> {
        self.sync()?;
        let path = segment_path(&self.dir, start_lsn);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| DbError::Wal(format!("segment rotation failed: {e}")))?;
        self.segments.push(SegmentMeta { start_lsn, path });
        self.active = file;
        self.active_len = 0;
        Ok(())
    }

    /// Replay every record with `lsn >= from`, in order, stopping at the
    /// first checksum failure (the expected shape of a crash-torn tail).
    pub fn replay_from(&self, from: Lsn) -> DbResult<Vec<WalRecord>> {
        let mut out = Vec::new();
        'segments: for seg in &self.segments {
            let mut file = File::open(&seg.path)
                .map_err(|e| DbError::Wal(format!("open segment for replay failed: {e}")))?;
            loop {
                let mut lsn_buf = [0u8; 8];
                match file.read_exact(&mut lsn_buf) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => continue 'segments,
                    Err(e) => return Err(DbError::Wal(format!("read lsn failed: {e}"))),
                }
                let lsn = Lsn(u64::from_le_bytes(lsn_buf));

                let mut len_buf = [0u8; 4];
                if file.read_exact(&mut len_buf).is_err() {
                    break 'segments;
                }
                let len = u32::from_le_bytes(len_buf) as usize;

                let mut payload = vec![0u8; len];
                if file.read_exact(&mut payload).is_err() {
                    break 'segments;
                }

                let mut crc_buf = [0u8; 4];
                if file.read_exact(&mut crc_buf).is_err() {
                    break 'segments;
                }
                let expected_crc = u32::from_le_bytes(crc_buf);

                let mut check = Vec::with_capacity(12 + len);
                check.extend_from_slice(&lsn_buf);
                check.extend_from_slice(&len_buf);
                check.extend_from_slice(&payload);
                if crc32fast::hash(&check) != expected_crc {
                    break 'segments;
                }

                if lsn >= from {
                    out.push(WalRecord {
                        lsn,
                        payload: Bytes::from(payload),
                    });
                }
            }
        }
        Ok(out)
    }

    /// Delete every segment file entirely older than `before_lsn`: a
    /// segment is removable once the *next* segment's `start_lsn` is
    /// itself `<= before_lsn`, i.e. nothing in this segment can still be
    /// needed by recovery from a checkpoint at `before_lsn`.
    pub fn truncate(&mut self, before_lsn: Lsn) -> DbResult<()> {
        let mut keep = Vec::new();
        for i in 0..self.segments.len() {
            let removable = match self.segments.get(i + 1) {
                Some(next) => next.start_lsn <= before_lsn,
                None => false, // never remove the active segment
            };
            if removable {
                fs::remove_file(&self.segments[i].path)?;
            } else {
                keep.push(self.segments[i].clone());
            }
        }
        self.segments = keep;
        Ok(())
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn next_lsn(&self) -> Lsn {
        self.next_lsn
    }
}

fn discover_segments(dir: &Path) -> DbResult<Vec<SegmentMeta>> {
    let mut segments = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(rest) = name.strip_prefix("wal_") {
            if let Some(digits) = rest.strip_suffix(".log") {
                if let Ok(start) = digits.parse::<u64>() {
                    segments.push(SegmentMeta {
                        start_lsn: Lsn(start),
                        path: entry.path(),
                    });
                }
            }
        }
    }
    segments.sort_by_key(|s| s.start_lsn);
    Ok(segments)
}

/// Scan the last segment to find where valid records end, so a reopened WAL
/// resumes LSN assignment past any surviving records rather than at the
/// segment's nominal start.
fn tail_lsn(segments: &[SegmentMeta]) -> DbResult<Lsn> {
    let last = segments.last().expect("non-empty");
    let mut file = File::open(&last.path)?;
    let mut cursor = last.start_lsn;

    loop {
        let mut lsn_buf = [0u8; 8];
        if file.read_exact(&mut lsn_buf).is_err() {
            break;
        }
        let lsn = Lsn(u64::from_le_bytes(lsn_buf));

        let mut len_buf = [0u8; 4];
        if file.read_exact(&mut len_buf).is_err() {
            break;
        }
        let len = u32::from_le_bytes(len_buf) as usize;

        let mut rest = vec![0u8; len + 4];
        if file.read_exact(&mut rest).is_err() {
            break;
        }

        let mut check = Vec::with_capacity(12 + len);
        check.extend_from_slice(&lsn_buf);
        check.extend_from_slice(&len_buf);
        check.extend_from_slice(&rest[..len]);
        let expected_crc = u32::from_le_bytes(rest[len..].try_into().unwrap());
        if crc32fast::hash(&check) != expected_crc {
            break;
        }

        cursor = Lsn(lsn.0 + frame_len(len));
    }

    let _ = file.seek(SeekFrom::Start(0));
    Ok(cursor)
}
