//! Tablespace storage: fixed-size pages backed by a flat file per space,
//! with free-page recycling and doublewrite-buffer protection against torn
//! writes.
//!
//! Every table and every index owns one tablespace file, addressed by a
//! [`SpaceId`]. Within a space, pages are numbered from zero; page zero is
//! reserved for the space header (page size, page count, free-list head) and
//! is never handed out by `allocate_page`.
//!
//! # Torn-write protection
//!
//! A crash mid-write can leave a page half-old, half-new ("torn"). Before a
//! page is written to its home offset, a copy is written sequentially to a
//! doublewrite buffer file and fsynced; only then is the home write
//! performed. On read, a checksum mismatch at the home location triggers a
//! recovery attempt from the doublewrite slot.

#[cfg(test)]
mod tests;

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use common::{DbError, DbResult, PageId, SpaceId};

/// Default logical page size used by every tablespace in this engine.
pub const DEFAULT_PAGE_SIZE: usize = 16384;

/// Bytes appended to every on-disk page holding its CRC32 checksum.
const CHECKSUM_BYTES: usize = 4;

/// Number of slots in the doublewrite buffer; a space can have at most this
/// many writes in flight before the buffer wraps and starts overwriting its
/// own earlier entries (acceptable: only the most recent write per slot
/// needs protecting).
const DOUBLEWRITE_SLOTS: u32 = 64;

/// A single fixed-size logical page, already stripped of its on-disk
/// checksum trailer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageBuf {
    pub data: Vec<u8>,
}

impl PageBuf {
    pub fn zeroed(page_size: usize) -> Self {
        Self {
            data: vec![0u8; page_size],
        }
    }
}

/// Metadata describing one open tablespace, returned by [`StorageManager::get_info`].
#[derive(Debug, Clone)]
pub struct SpaceInfo {
    pub space_id: SpaceId,
    pub path: PathBuf,
    pub page_size: usize,
    pub num_pages: u32,
    pub free_pages: u32,
}

/// Page zero of every tablespace: page size, total page count, and the head
/// of the free-page list (0 means empty, since page 0 can never be free).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct SpaceHeader {
    page_size: u32,
    num_pages: u32,
    free_list_head: u32,
}

fn header_bincode_config() -> impl bincode::config::Config {
    bincode::config::legacy()
}

/// An open tablespace: one data file plus one doublewrite file.
struct SpaceFile {
    space_id: SpaceId,
    path: PathBuf,
    file: File,
    dw_file: File,
    page_size: usize,
    header: SpaceHeader,
}

impl SpaceFile {
    fn stride(&self) -> usize {
        self.page_size + CHECKSUM_BYTES
    }

    fn create(dir: &Path, space_id: SpaceId, page_size: usize) -> DbResult<Self> {
        let path = space_path(dir, space_id);
        if path.exists() {
            return Err(DbError::Storage(format!(
                "space {} already exists at {}",
                space_id.0,
                path.display()
            )));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        let dw_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(doublewrite_path(dir, space_id))?;

        let mut space = Self {
            space_id,
            path,
            file,
            dw_file,
            page_size,
            header: SpaceHeader {
                page_size: page_size as u32,
                num_pages: 1,
                free_list_head: 0,
            },
        };
        space.write_header_page()?;
        Ok(space)
    }

    fn open(dir: &Path, space_id: SpaceId) -> DbResult<Self> {
        let path = space_path(dir, space_id);
        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let dw_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(doublewrite_path(dir, space_id))?;

        // Peek the page size from the header page before we know the stride.
        let mut probe = vec![0u8; DEFAULT_PAGE_SIZE + CHECKSUM_BYTES];
        file.seek(SeekFrom::Start(0))?;
        let read = file.read(&mut probe)?;
        if read < CHECKSUM_BYTES {
            return Err(DbError::Corruption(format!(
                "space {} header page truncated",
                space_id.0
            )));
        }
        let (header, _): (SpaceHeader, usize) =
            bincode::serde::decode_from_slice(&probe, header_bincode_config())
                .map_err(|e| DbError::Corruption(format!("space header decode failed: {e}")))?;

        let page_size = header.page_size as usize;
        Ok(Self {
            space_id,
            path,
            file,
            dw_file,
            page_size,
            header,
        })
    }

    fn write_header_page(&mut self) -> DbResult<()> {
        let mut data = vec![0u8; self.page_size];
        let written =
            bincode::serde::encode_into_slice(&self.header, &mut data, header_bincode_config())
                .map_err(|e| DbError::Storage(format!("encode space header failed: {e}")))?;
        debug_assert!(written <= self.page_size);
        self.write_raw(0, &data)
    }

    fn read_header_page(&mut self) -> DbResult<()> {
        let data = self.read_raw(0)?;
        let (header, _): (SpaceHeader, usize) =
            bincode::serde::decode_from_slice(&data, header_bincode_config())
                .map_err(|e| DbError::Corruption(format!("space header decode failed: {e}")))?;
        self.header = header;
        Ok(())
    }

    /// Write `data` (exactly `page_size` bytes) to `page_no`, going through
    /// the doublewrite buffer first.
    fn write_raw(&mut self, page_no: u32, data: &[u8]) -> DbResult<()> {
        debug_assert_eq!(data.len(), self.page_size);
        let checksum = crc32fast::hash(data);
        let mut framed = Vec::with_capacity(self.stride());
        framed.extend_from_slice(data);
        framed.extend_from_slice(&checksum.to_le_bytes());

        let dw_slot = page_no % DOUBLEWRITE_SLOTS;
        self.dw_file
            .seek(SeekFrom::Start(dw_slot as u64 * self.stride() as u64))?;
        self.dw_file.write_all(&framed)?;
        self.dw_file.sync_all()?;

        self.file
            .seek(SeekFrom::Start(page_no as u64 * self.stride() as u64))?;
        self.file.write_all(&framed)?;
        self.file.flush()?;
        Ok(())
    }

    fn read_raw(&mut self, page_no: u32) -> DbResult<Vec<u8>> {
        let stride = self.stride();
        let mut framed = vec![0u8; stride];
        self.file
            .seek(SeekFrom::Start(page_no as u64 * stride as u64))?;
        self.file.read_exact(&mut framed)?;

        if Self::checksum_ok(&framed) {
            return Ok(framed[..self.page_size].to_vec());
        }

        // Home page is torn; try to recover the last doublewrite copy.
        let dw_slot = page_no % DOUBLEWRITE_SLOTS;
        let mut dw_framed = vec![0u8; stride];
        self.dw_file
            .seek(SeekFrom::Start(dw_slot as u64 * stride as u64))?;
        self.dw_file.read_exact(&mut dw_framed)?;

        if Self::checksum_ok(&dw_framed) {
            self.file
                .seek(SeekFrom::Start(page_no as u64 * stride as u64))?;
            self.file.write_all(&dw_framed)?;
            self.file.sync_all()?;
            return Ok(dw_framed[..self.page_size].to_vec());
        }

        Err(DbError::Corruption(format!(
            "page {page_no} in space {} failed checksum in both the home location and the doublewrite buffer",
            self.space_id.0
        )))
    }

    fn checksum_ok(framed: &[u8]) -> bool {
        let split = framed.len() - CHECKSUM_BYTES;
        let expected = u32::from_le_bytes(framed[split..].try_into().unwrap());
        crc32fast::hash(&framed[..split]) == expected
    }

    fn allocate_page(&mut self) -> DbResult<PageId> {
        if self.header.free_list_head != 0 {
            let reused = self.header.free_list_head;
            let data = self.read_raw(reused)?;
            let next = u32::from_le_bytes(data[0..4].try_into().unwrap());
            self.header.free_list_head = next;
            self.write_header_page()?;
            self.write_raw(reused, &vec![0u8; self.page_size])?;
            return Ok(PageId(reused));
        }

        let new_id = self.header.num_pages;
        self.header.num_pages += 1;
        self.write_header_page()?;
        self.write_raw(new_id, &vec![0u8; self.page_size])?;
        Ok(PageId(new_id))
    }

    fn free_page(&mut self, page: PageId) -> DbResult<()> {
        if page.0 == 0 {
            return Err(DbError::Storage("cannot free the space header page".into()));
        }
        let mut data = vec![0u8; self.page_size];
        data[0..4].copy_from_slice(&self.header.free_list_head.to_le_bytes());
        self.write_raw(page.0, &data)?;
        self.header.free_list_head = page.0;
        self.write_header_page()?;
        Ok(())
    }

    fn free_page_count(&mut self) -> DbResult<u32> {
        let mut count = 0;
        let mut cursor = self.header.free_list_head;
        while cursor != 0 {
            count += 1;
            let data = self.read_raw(cursor)?;
            cursor = u32::from_le_bytes(data[0..4].try_into().unwrap());
        }
        Ok(count)
    }

    fn sync(&mut self) -> DbResult<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

fn space_path(dir: &Path, space_id: SpaceId) -> PathBuf {
    dir.join(format!("space_{:010}.dat", space_id.0))
}

fn doublewrite_path(dir: &Path, space_id: SpaceId) -> PathBuf {
    dir.join(format!("space_{:010}.dwb", space_id.0))
}

/// Owns every open tablespace and dispatches page-level I/O to the right one.
///
/// This is the engine's C1: the only component that ever opens a raw file
/// handle for table/index data. Everything above it (the buffer pool, the
/// B+Tree) addresses pages purely through `(SpaceId, PageId)`.
pub struct StorageManager {
    dir: PathBuf,
    page_size: usize,
    spaces: HashMap<SpaceId, SpaceFile>,
}

impl StorageManager {
    pub fn new(dir: impl Into<PathBuf>, page_size: usize) -> DbResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            page_size,
            spaces: HashMap::new(),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Create a brand new, empty tablespace. Errors if one already exists on
    /// disk for this id.
    pub fn create_space(&mut self, space_id: SpaceId) -> DbResult<()> {
        let space = SpaceFile::create(&self.dir, space_id, self.page_size)?;
        self.spaces.insert(space_id, space);
        Ok(())
    }

    /// Open an existing tablespace file, loading its header.
    pub fn open_space(&mut self, space_id: SpaceId) -> DbResult<()> {
        if self.spaces.contains_key(&space_id) {
            return Ok(());
        }
        let space = SpaceFile::open(&self.dir, space_id)?;
        self.spaces.insert(space_id, space);
        Ok(())
    }

    /// Close a tablespace, dropping its file handles. A later `open_space`
    /// reopens it from disk.
    pub fn close_space(&mut self, space_id: SpaceId) -> DbResult<()> {
        self.spaces.remove(&space_id);
        Ok(())
    }

    /// Permanently delete a tablespace's files. The space must be closed.
    pub fn delete_space(&mut self, space_id: SpaceId) -> DbResult<()> {
        if self.spaces.contains_key(&space_id) {
            return Err(DbError::Storage(format!(
                "space {} must be closed before it can be deleted",
                space_id.0
            )));
        }
        let path = space_path(&self.dir, space_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        let dw_path = doublewrite_path(&self.dir, space_id);
        if dw_path.exists() {
            std::fs::remove_file(&dw_path)?;
        }
        Ok(())
    }

    /// List every space currently discoverable on disk.
    pub fn list_spaces(&self) -> DbResult<Vec<SpaceId>> {
        let mut ids = Vec::new();
        for entry in std::fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(rest) = name.strip_prefix("space_") {
                if let Some(digits) = rest.strip_suffix(".dat") {
                    if let Ok(id) = digits.parse::<u32>() {
                        ids.push(SpaceId(id));
                    }
                }
            }
        }
        ids.sort_by_key(|s| s.0);
        Ok(ids)
    }

    pub fn get_info(&mut self, space_id: SpaceId) -> DbResult<SpaceInfo> {
        self.open_space(space_id)?;
        let space = self.space_mut(space_id)?;
        space.read_header_page()?;
        let free_pages = space.free_page_count()?;
        Ok(SpaceInfo {
            space_id,
            path: space.path.clone(),
            page_size: space.page_size,
            num_pages: space.header.num_pages,
            free_pages,
        })
    }

    pub fn allocate_page(&mut self, space_id: SpaceId) -> DbResult<PageId> {
        self.space_mut(space_id)?.allocate_page()
    }

    pub fn free_page(&mut self, space_id: SpaceId, page: PageId) -> DbResult<()> {
        self.space_mut(space_id)?.free_page(page)
    }

    pub fn read_page(&mut self, space_id: SpaceId, page: PageId) -> DbResult<PageBuf> {
        let data = self.space_mut(space_id)?.read_raw(page.0)?;
        Ok(PageBuf { data })
    }

    pub fn write_page(&mut self, space_id: SpaceId, page: PageId, buf: &PageBuf) -> DbResult<()> {
        self.space_mut(space_id)?.write_raw(page.0, &buf.data)
    }

    /// Fsync a single space's data file.
    pub fn sync_space(&mut self, space_id: SpaceId) -> DbResult<()> {
        self.space_mut(space_id)?.sync()
    }

    /// Fsync every open space. Used by the checkpoint/persistence layer.
    pub fn sync_all(&mut self) -> DbResult<()> {
        for space in self.spaces.values_mut() {
            space.sync()?;
        }
        Ok(())
    }

    fn space_mut(&mut self, space_id: SpaceId) -> DbResult<&mut SpaceFile> {
        self.spaces
            .get_mut(&space_id)
            .ok_or_else(|| DbError::NotFound(format!("space {} is not open", space_id.0)))
    }
}
