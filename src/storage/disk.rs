//! Disk manager - maps pages to offsets in one database file
//!
//! File layout: a reserved header region (`DB_HEADER_SIZE` bytes) precedes
//! the page area; page `n` occupies
//! `[DB_HEADER_SIZE + n*PAGE_SIZE, DB_HEADER_SIZE + (n+1)*PAGE_SIZE)`.
//! The first 4 bytes of the file hold the free-list head page number as a
//! signed 32-bit little-endian integer (-1 = empty list).
//!
//! Freed pages store the page number of the next free page in their first
//! 4 bytes, forming an intrusive singly-linked free list entirely inside
//! already-allocated page storage.

use crate::common::{Error, Result};
use crate::storage::constants::{PageId, DB_HEADER_SIZE, FREE_LIST_EMPTY, PAGE_SIZE};
use crate::storage::page::Page;
use parking_lot::Mutex;
use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Calculate the byte offset of a page within the database file
pub fn page_offset(page_id: PageId) -> u64 {
    DB_HEADER_SIZE as u64 + u64::from(page_id) * PAGE_SIZE as u64
}

struct DiskInner {
    /// `None` once the manager has been closed
    file: Option<File>,
    /// Head of the in-file free list
    free_list_head: Option<PageId>,
    /// Next never-yet-allocated page number
    next_page_id: PageId,
}

/// Per-file disk manager.
///
/// One instance is exclusively responsible for one database file. All
/// operations share a single critical section: `allocate_page` and
/// `deallocate_page` both read and mutate the free-list head, so at minimum
/// those two must be mutually exclusive.
///
/// # Failure semantics
///
/// I/O failures propagate as [`Error::Io`] and are never retried here.
pub struct DiskManager {
    path: PathBuf,
    inner: Mutex<DiskInner>,
}

impl DiskManager {
    /// Open the database file, creating it and its parent directories if
    /// they don't exist.
    ///
    /// A fresh file gets an initialized header region (empty free list); an
    /// existing file has its free-list head read back and its next
    /// allocatable page number derived from the file length.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be created or read, and
    /// [`Error::Corruption`] if the persisted free-list head is nonsense.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let file_len = file.metadata()?.len();
        let (free_list_head, next_page_id) = if file_len == 0 {
            // Fresh file: materialize the header region with an empty list.
            file.set_len(DB_HEADER_SIZE as u64)?;
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&FREE_LIST_EMPTY.to_le_bytes())?;
            file.sync_all()?;
            (None, 0)
        } else {
            let mut raw = [0u8; 4];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut raw)?;
            let head = decode_head(i32::from_le_bytes(raw))?;

            let page_bytes = file_len.saturating_sub(DB_HEADER_SIZE as u64);
            let next_page_id = page_bytes.div_ceil(PAGE_SIZE as u64);
            let next_page_id = PageId::try_from(next_page_id)
                .map_err(|_| Error::corruption("database file exceeds addressable page range"))?;
            (head, next_page_id)
        };

        log::debug!(
            "opened database file {:?}: free_list_head={:?}, next_page_id={}",
            path,
            free_list_head,
            next_page_id
        );

        Ok(Self {
            path,
            inner: Mutex::new(DiskInner {
                file: Some(file),
                free_list_head,
                next_page_id,
            }),
        })
    }

    /// Path of the underlying database file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current free-list head, if any
    pub fn free_list_head(&self) -> Option<PageId> {
        self.inner.lock().free_list_head
    }

    /// Next never-yet-allocated page number
    pub fn next_page_id(&self) -> PageId {
        self.inner.lock().next_page_id
    }

    /// Read a page from the database file.
    ///
    /// A page whose offset lies beyond the current file length has never
    /// been materialized; a zero-filled page for that id is returned
    /// instead of an error - pages materialize lazily on first write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the manager is closed or the read fails.
    pub fn read_page(&self, page_id: PageId) -> Result<Page> {
        let mut inner = self.inner.lock();
        let file = open_file(&mut inner)?;

        let offset = page_offset(page_id);
        let file_len = file.metadata()?.len();
        if offset >= file_len {
            return Ok(Page::new(page_id));
        }

        file.seek(SeekFrom::Start(offset))?;
        let mut bytes = [0u8; PAGE_SIZE];
        let mut read = 0usize;
        while read < PAGE_SIZE {
            match file.read(&mut bytes[read..])? {
                0 => break, // short file tail: remainder stays zeroed
                n => read += n,
            }
        }

        Ok(Page::from_bytes(page_id, bytes))
    }

    /// Write a page's full fixed-size buffer at its computed offset,
    /// overwriting in place, and sync it to stable storage.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the manager is closed or the write fails.
    pub fn write_page(&self, page: &Page) -> Result<()> {
        let mut inner = self.inner.lock();
        let file = open_file(&mut inner)?;

        file.seek(SeekFrom::Start(page_offset(page.id())))?;
        file.write_all(page.raw())?;
        file.sync_all()?;
        Ok(())
    }

    /// Allocate a page, preferring recycled pages from the free list.
    ///
    /// If the free list is non-empty its head is popped (the popped page's
    /// first 4 bytes name the new head); otherwise the next never-used page
    /// counter is returned and advanced. The returned id is never reachable
    /// from the free list and never already in use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] on file errors and [`Error::Corruption`] if a
    /// free page's next-pointer is invalid.
    pub fn allocate_page(&self) -> Result<PageId> {
        let mut inner = self.inner.lock();

        if let Some(head) = inner.free_list_head {
            let file = open_file(&mut inner)?;
            file.seek(SeekFrom::Start(page_offset(head)))?;
            let mut raw = [0u8; 4];
            file.read_exact(&mut raw)?;
            let next = decode_head(i32::from_le_bytes(raw))?;

            inner.free_list_head = next;
            log::trace!("allocated recycled page {head}, new free-list head {next:?}");
            return Ok(head);
        }

        let page_id = inner.next_page_id;
        inner.next_page_id += 1;
        log::trace!("allocated fresh page {page_id}");
        Ok(page_id)
    }

    /// Deallocate a page, pushing it onto the free list.
    ///
    /// The page's first 4 bytes are overwritten with the current free-list
    /// head and the page becomes the new head. The caller must guarantee
    /// the page holds no live tuples; this is not verified here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the manager is closed or the write fails.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        let mut inner = self.inner.lock();
        let next = encode_head(inner.free_list_head);

        let file = open_file(&mut inner)?;
        let offset = page_offset(page_id);

        // Materialize the full page so the file covers it, then stamp the
        // next-free pointer into its first 4 bytes.
        let file_len = file.metadata()?.len();
        if offset + PAGE_SIZE as u64 > file_len {
            file.set_len(offset + PAGE_SIZE as u64)?;
        }
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&next.to_le_bytes())?;
        file.sync_all()?;

        inner.free_list_head = Some(page_id);
        log::trace!("deallocated page {page_id}, pushed onto free list");
        Ok(())
    }

    /// Persist the free-list head to the header region and release the
    /// file handle. Idempotent: a second close is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the header write or sync fails.
    pub fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        let head = encode_head(inner.free_list_head);

        if let Some(mut file) = inner.file.take() {
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&head.to_le_bytes())?;
            file.sync_all()?;
            log::debug!("closed database file {:?} with free-list head {head}", self.path);
        }
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        // Best-effort: persist the free-list head even if close was skipped.
        if let Err(err) = self.close() {
            log::error!("failed to close database file {:?}: {err}", self.path);
        }
    }
}

fn open_file(inner: &mut DiskInner) -> Result<&mut File> {
    inner
        .file
        .as_mut()
        .ok_or_else(|| Error::io("disk manager is closed"))
}

fn encode_head(head: Option<PageId>) -> i32 {
    match head {
        // Page ids that survive the round-trip are bounded by i32::MAX.
        Some(id) => i32::try_from(id).unwrap_or(FREE_LIST_EMPTY),
        None => FREE_LIST_EMPTY,
    }
}

fn decode_head(raw: i32) -> Result<Option<PageId>> {
    if raw == FREE_LIST_EMPTY {
        Ok(None)
    } else {
        PageId::try_from(raw)
            .map(Some)
            .map_err(|_| Error::corruption(format!("invalid free-list head {raw}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::test_utils::TempDir;

    #[test]
    fn test_fresh_file_initialization() {
        let dir = TempDir::new().unwrap();
        let disk = DiskManager::open(dir.file_path("test.db")).unwrap();

        assert_eq!(disk.free_list_head(), None);
        assert_eq!(disk.next_page_id(), 0);
    }

    #[test]
    fn test_page_offset_formula() {
        assert_eq!(page_offset(0), DB_HEADER_SIZE as u64);
        assert_eq!(page_offset(1), DB_HEADER_SIZE as u64 + PAGE_SIZE as u64);
        assert_eq!(
            page_offset(100),
            DB_HEADER_SIZE as u64 + 100 * PAGE_SIZE as u64
        );
    }

    #[test]
    fn test_read_never_written_page_is_zeroed() {
        let dir = TempDir::new().unwrap();
        let disk = DiskManager::open(dir.file_path("test.db")).unwrap();

        let page = disk.read_page(12).unwrap();
        assert_eq!(page.id(), 12);
        assert_eq!(page.slot_count(), 0);
    }

    #[test]
    fn test_write_read_round_trip() {
        let dir = TempDir::new().unwrap();
        let disk = DiskManager::open(dir.file_path("test.db")).unwrap();

        let mut page = Page::new(0);
        page.insert_raw(b"payload").unwrap();
        disk.write_page(&page).unwrap();

        let read_back = disk.read_page(0).unwrap();
        assert_eq!(read_back.get_raw(0), Some(&b"payload"[..]));
    }

    #[test]
    fn test_allocate_sequential_then_recycle() {
        let dir = TempDir::new().unwrap();
        let disk = DiskManager::open(dir.file_path("test.db")).unwrap();

        assert_eq!(disk.allocate_page().unwrap(), 0);
        assert_eq!(disk.allocate_page().unwrap(), 1);

        disk.deallocate_page(0).unwrap();
        assert_eq!(disk.free_list_head(), Some(0));

        // The freed page comes back before any never-used page.
        assert_eq!(disk.allocate_page().unwrap(), 0);
        assert_eq!(disk.free_list_head(), None);
        assert_eq!(disk.allocate_page().unwrap(), 2);
    }

    #[test]
    fn test_free_list_is_lifo() {
        let dir = TempDir::new().unwrap();
        let disk = DiskManager::open(dir.file_path("test.db")).unwrap();

        for _ in 0..3 {
            disk.allocate_page().unwrap();
        }
        disk.deallocate_page(0).unwrap();
        disk.deallocate_page(1).unwrap();
        disk.deallocate_page(2).unwrap();

        assert_eq!(disk.allocate_page().unwrap(), 2);
        assert_eq!(disk.allocate_page().unwrap(), 1);
        assert_eq!(disk.allocate_page().unwrap(), 0);
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let disk = DiskManager::open(dir.file_path("test.db")).unwrap();

        disk.close().unwrap();
        disk.close().unwrap();

        assert!(disk.read_page(0).unwrap_err().is_io());
    }

    #[test]
    fn test_reopen_restores_state() {
        let dir = TempDir::new().unwrap();
        let path = dir.file_path("test.db");

        {
            let disk = DiskManager::open(&path).unwrap();
            for _ in 0..4 {
                disk.allocate_page().unwrap();
            }
            // Materialize page 3 so the file length covers all four pages.
            disk.write_page(&Page::new(3)).unwrap();
            disk.deallocate_page(1).unwrap();
            disk.close().unwrap();
        }

        let disk = DiskManager::open(&path).unwrap();
        assert_eq!(disk.free_list_head(), Some(1));
        assert_eq!(disk.next_page_id(), 4);
        assert_eq!(disk.allocate_page().unwrap(), 1);
        assert_eq!(disk.allocate_page().unwrap(), 4);
    }
}
