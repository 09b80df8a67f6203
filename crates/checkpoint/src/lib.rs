//! Checkpoint manifests: periodic snapshots of "everything durable up to
//! this LSN", written so recovery can skip replaying the whole WAL.
//!
//! Each checkpoint is a small JSON file, `checkpoint_<index>.json`, written
//! via write-to-temp, fsync, atomic rename so a crash mid-write can never
//! leave a half-written manifest at its final name. Manifests accumulate a
//! monotonically increasing `index`; `take` garbage-collects older ones
//! beyond `max_checkpoints`.


use common::{DbError, DbResult, Lsn, SpaceId};
use serde::{Deserialize, Serialize};
use std::{
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

/// A durable snapshot of recovery-relevant state at one point in time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CheckpointManifest {
    pub index: u64,
    /// Every WAL record with an LSN below this one has been applied to a
    /// flushed page; recovery only needs to redo from here forward.
    pub checkpoint_lsn: Lsn,
    /// Tablespaces open at the time of the checkpoint, for sanity-checking
    /// recovery against the on-disk catalog.
    pub open_spaces: Vec<SpaceId>,
    pub created_at_unix_ms: u128,
}

fn manifest_path(dir: &Path, index: u64) -> PathBuf {
    dir.join(format!("checkpoint_{index:010}.json"))
}

/// Manages the set of checkpoint manifests under a directory.
pub struct CheckpointManager {
    dir: PathBuf,
    max_checkpoints: usize,
    next_index: u64,
}

impl CheckpointManager {
    pub fn open(dir: impl Into<PathBuf>, max_checkpoints: usize) -> DbResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let next_index = existing_indices(&dir)?.into_iter().max().map_or(0, |m| m + 1);
        Ok(Self {
            dir,
            max_checkpoints,
            next_index,
        })
    }

    /// Write a new checkpoint manifest and garbage-collect old ones beyond
    /// `max_checkpoints`. Returns the manifest written.
    pub fn take(&mut self, checkpoint_lsn: Lsn, open_spaces: Vec<SpaceId>) -> DbResult<CheckpointManifest> {
        let index = self.next_index;
        let manifest = CheckpointManifest {
            index,
            checkpoint_lsn,
            open_spaces,
            created_at_unix_ms: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
        };

        let final_path = manifest_path(&self.dir, index);
        let tmp_path = self.dir.join(format!("checkpoint_{index:010}.json.tmp"));

        let json = serde_json::to_vec_pretty(&manifest)
            .map_err(|e| DbError::Internal(format!("encode checkpoint manifest failed: {e}")))?;

        let mut tmp = File::create(&tmp_path)?;
        tmp.write_all(&json)?;
        tmp.sync_all()?;
        drop(tmp);
        fs::rename(&tmp_path, &final_path)?;

        self.next_index += 1;
        self.gc()?;
        Ok(manifest)
    }

    /// Read the most recent manifest, if any exist.
    pub fn read_latest(&self) -> DbResult<Option<CheckpointManifest>> {
        let indices = existing_indices(&self.dir)?;
        match indices.into_iter().max() {
            Some(idx) => self.read_at(idx).map(Some),
            None => Ok(None),
        }
    }

    pub fn read_at(&self, index: u64) -> DbResult<CheckpointManifest> {
        let path = manifest_path(&self.dir, index);
        let bytes = fs::read(&path).map_err(|e| {
            DbError::NotFound(format!("checkpoint {index} not found at {}: {e}", path.display()))
        })?;
        serde_json::from_slice(&bytes)
            .map_err(|e| DbError::Corruption(format!("checkpoint {index} manifest corrupt: {e}")))
    }

    fn gc(&mut self) -> DbResult<()> {
        let mut indices = existing_indices(&self.dir)?;
        indices.sort_unstable();
        while indices.len() > self.max_checkpoints {
            let oldest = indices.remove(0);
            let path = manifest_path(&self.dir, oldest);
            if path.exists() {
                fs::remove_file(path)?;
            }
        }
        Ok(())
    }
}

fn existing_indices(dir: &Path) -> DbResult<Vec<u64>> {
    let mut indices = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if let Some(rest) = name.strip_prefix("checkpoint_") {
            if let Some(digits) = rest.strip_suffix(".json") {
                if let Ok(idx) = digits.parse::<u64>() {
                    indices.push(idx);
                }
            }
        }
    }
    Ok(indices)
}
