use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::error::{Error, Result};
use crate::wal::Wal;

pub const PAGE_SIZE: usize = 4096;
const MAGIC: &str = "TINYDB01";

/// Default LRU cache capacity, in pages.
const DEFAULT_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    magic: String,
    version: u32,
    page_size: u32,
    next_page_id: u64,
    metadata: Json,
}

/// Owns the single on-disk file plus its WAL. Unlike a design that keeps a
/// separate `Transaction` object with its own snapshot (useful for
/// multi-reader isolation), this crate is single-writer only, so `Pager`
/// folds begin/write/commit/rollback directly: there is exactly one
/// in-flight set of dirty pages at a time.
pub struct Pager {
    path: PathBuf,
    file: File,
    page_size: usize,
    header: Header,
    wal: Wal,
    tx_active: bool,
    dirty: HashMap<u64, Vec<u8>>,
    /// Caches clean (already-flushed) page reads; dirty pages are served
    /// straight from `dirty` instead, and any write invalidates the cache
    /// entry so a cached page never goes stale.
    cache: LruCache<u64, Vec<u8>>,
}

impl Pager {
    pub fn open(path: impl AsRef<Path>) -> Result<Pager> {
        let path = path.as_ref().to_path_buf();

        Self::recover_if_needed(&path)?;

        let existed = path.exists() && path.metadata().map(|m| m.len() > 0).unwrap_or(false);
        if !existed {
            Self::init_file(&path)?;
        }

        let mut file = OpenOptions::new().read(true).write(true).open(&path)?;
        let header = Self::read_header(&mut file, PAGE_SIZE)?;
        let wal = Wal::open(&path)?;

        Ok(Pager {
            path,
            file,
            page_size: PAGE_SIZE,
            header,
            wal,
            tx_active: false,
            dirty: HashMap::new(),
            cache: LruCache::new(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap()),
        })
    }

    fn init_file(path: &Path) -> Result<()> {
        let header = Header {
            magic: MAGIC.to_string(),
            version: 1,
            page_size: PAGE_SIZE as u32,
            next_page_id: 1,
            metadata: serde_json::json!({}),
        };
        let page = Self::encode_header_page(&header, PAGE_SIZE)?;
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;
        file.write_all(&page)?;
        file.sync_all()?;
        Ok(())
    }

    /// Replay any committed-but-unflushed transactions from the WAL into
    /// the main file, fsync, then truncate the log. Runs before the file is
    /// opened for normal use so a crash between COMMIT and checkpoint never
    /// loses data.
    fn recover_if_needed(path: &Path) -> Result<()> {
        let replay = Wal::recover(path)?;
        if replay.is_empty() {
            return Ok(());
        }
        if !path.exists() {
            Self::init_file(path)?;
        }
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;
        for txn in replay {
            for (page_id, after_image) in txn.writes {
                file.seek(SeekFrom::Start(page_id * PAGE_SIZE as u64))?;
                file.write_all(&after_image)?;
            }
        }
        file.flush()?;
        file.sync_all()?;
        let mut wal = Wal::open(path)?;
        wal.reset()?;
        Ok(())
    }

    fn read_header(file: &mut File, page_size: usize) -> Result<Header> {
        file.seek(SeekFrom::Start(0))?;
        let mut raw = vec![0u8; page_size];
        file.read_exact(&mut raw)?;
        let len = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]) as usize;
        let payload = &raw[4..4 + len];
        let header: Header = serde_json::from_slice(payload)?;
        if header.magic != MAGIC {
            return Err(Error::Corruption("not a tinydb file".into()));
        }
        if header.page_size as usize != page_size {
            return Err(Error::Corruption("page size mismatch".into()));
        }
        Ok(header)
    }

    fn encode_header_page(header: &Header, page_size: usize) -> Result<Vec<u8>> {
        let payload = serde_json::to_vec(header)?;
        if payload.len() + 4 > page_size {
            return Err(Error::Corruption("header too large for page".into()));
        }
        let mut page = vec![0u8; page_size];
        page[0..4].copy_from_slice(&(payload.len() as u32).to_le_bytes());
        page[4..4 + payload.len()].copy_from_slice(&payload);
        Ok(page)
    }

    fn persist_header(&mut self) -> Result<()> {
        let page = Self::encode_header_page(&self.header, self.page_size)?;
        self.write_page(0, &page)
    }

    pub fn page_count(&self) -> u64 {
        self.header.next_page_id
    }

    pub fn allocate_page(&mut self) -> Result<u64> {
        let page_id = self.header.next_page_id;
        self.header.next_page_id += 1;
        self.persist_header()?;
        self.write_page(page_id, &vec![0u8; self.page_size])?;
        Ok(page_id)
    }

    pub fn read_page(&mut self, page_id: u64) -> Result<Vec<u8>> {
        if self.tx_active {
            if let Some(data) = self.dirty.get(&page_id) {
                return Ok(data.clone());
            }
        }
        if let Some(data) = self.cache.get(&page_id) {
            return Ok(data.clone());
        }
        self.file
            .seek(SeekFrom::Start(page_id * self.page_size as u64))?;
        let mut buf = vec![0u8; self.page_size];
        self.file.read_exact(&mut buf).map_err(|_| {
            Error::PageNotFound(page_id)
        })?;
        self.cache.put(page_id, buf.clone());
        Ok(buf)
    }

    pub fn write_page(&mut self, page_id: u64, data: &[u8]) -> Result<()> {
        if data.len() != self.page_size {
            return Err(Error::Corruption("invalid page size".into()));
        }
        if self.tx_active {
            self.wal.log_page_write(page_id, data)?;
            self.dirty.insert(page_id, data.to_vec());
            self.cache.pop(&page_id);
            return Ok(());
        }
        self.write_page_direct(page_id, data)
    }

    fn write_page_direct(&mut self, page_id: u64, data: &[u8]) -> Result<()> {
        self.file
            .seek(SeekFrom::Start(page_id * self.page_size as u64))?;
        self.file.write_all(data)?;
        self.cache.put(page_id, data.to_vec());
        Ok(())
    }

    pub fn begin(&mut self) -> Result<()> {
        if self.tx_active {
            return Err(Error::Transaction("Transaction already active".into()));
        }
        self.wal.begin()?;
        self.tx_active = true;
        self.dirty.clear();
        Ok(())
    }

    /// Commit order matters: the WAL's COMMIT marker is durable before any
    /// dirty page reaches the main file, so recovery can always redo a
    /// crash that happens mid-flush.
    pub fn commit(&mut self) -> Result<()> {
        if !self.tx_active {
            return Ok(());
        }
        self.wal.commit()?;
        let pages: Vec<(u64, Vec<u8>)> = self.dirty.drain().collect();
        for (page_id, data) in pages {
            self.write_page_direct(page_id, &data)?;
        }
        self.file.flush()?;
        self.file.sync_all()?;
        self.tx_active = false;
        Ok(())
    }

    pub fn rollback(&mut self) {
        if !self.tx_active {
            return;
        }
        self.dirty.clear();
        self.wal.abort();
        self.tx_active = false;
    }

    pub fn in_transaction(&self) -> bool {
        self.tx_active
    }

    pub fn metadata(&self) -> Json {
        self.header.metadata.clone()
    }

    pub fn set_metadata(&mut self, metadata: Json) -> Result<()> {
        self.header.metadata = metadata;
        self.persist_header()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn create_open_roundtrip_metadata() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        drop(tmp);

        {
            let mut pager = Pager::open(&path).unwrap();
            pager.set_metadata(serde_json::json!({"hello": "world"})).unwrap();
        }
        let pager = Pager::open(&path).unwrap();
        assert_eq!(pager.metadata()["hello"], "world");
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(Wal::path_for(&path));
    }

    #[test]
    fn commit_then_reopen_sees_page() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        drop(tmp);

        {
            let mut pager = Pager::open(&path).unwrap();
            let pid = pager.allocate_page().unwrap();
            pager.begin().unwrap();
            let mut data = vec![0u8; PAGE_SIZE];
            data[0] = 42;
            pager.write_page(pid, &data).unwrap();
            pager.commit().unwrap();
        }
        let mut pager = Pager::open(&path).unwrap();
        let data = pager.read_page(1).unwrap();
        assert_eq!(data[0], 42);
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(Wal::path_for(&path));
    }

    #[test]
    fn rollback_discards_dirty_pages() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();
        drop(tmp);

        let mut pager = Pager::open(&path).unwrap();
        let pid = pager.allocate_page().unwrap();
        pager.begin().unwrap();
        let mut data = vec![0u8; PAGE_SIZE];
        data[0] = 99;
        pager.write_page(pid, &data).unwrap();
        pager.rollback();
        let data = pager.read_page(pid).unwrap();
        assert_eq!(data[0], 0);
        let _ = std::fs::remove_file(&path);
        let _ = std::fs::remove_file(Wal::path_for(&path));
    }
}
