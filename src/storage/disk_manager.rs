//! Disk Manager - the persistence contract and the single-file backend.
//!
//! The buffer pool only ever talks to a [`DiskManager`]. It assumes every
//! call is synchronous and durable once it returns `Ok`.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;

/// Persistence backend consumed by the buffer pool.
///
/// Implementations are driven through `&mut self`; the buffer pool serializes
/// every call under its own latch.
#[cfg_attr(test, mockall::automock)]
pub trait DiskManager: Send {
    /// Fill `page` with the stored contents of `page_id`.
    fn read_page(&mut self, page_id: PageId, page: &mut Page) -> Result<()>;

    /// Persist the full contents of `page` as `page_id`.
    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()>;

    /// Hand out a fresh id whose stored contents are all zeros.
    fn allocate_page(&mut self) -> Result<PageId>;

    /// Mark `page_id` reclaimable. Space may or may not be reused later.
    fn deallocate_page(&mut self, page_id: PageId) -> Result<()>;
}

/// Stores all pages in one file.
///
/// # File Layout
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Page 0  │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ (4KB)   │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      4096     8192    ...    N×4096
/// ```
///
/// Deallocated ids go on an in-memory free list and are handed out again
/// (most recently freed first, zeroed) before the file grows. The free list
/// is not persisted; after a reopen, previously freed pages read as whatever
/// was last written to them.
///
/// # Durability
/// Every write and every file extension is followed by `fsync()`.
pub struct FileDiskManager {
    file: File,
    /// Number of page slots in the file.
    page_count: u32,
    /// Deallocated ids, reused LIFO.
    free_pages: Vec<PageId>,
    /// Same ids as `free_pages`, for liveness checks.
    freed: HashSet<PageId>,
}

impl FileDiskManager {
    /// Create a new database file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            page_count: 0,
            free_pages: Vec::new(),
            freed: HashSet::new(),
        })
    }

    /// Open an existing database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let page_count = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;

        Ok(Self {
            file,
            page_count,
            free_pages: Vec::new(),
            freed: HashSet::new(),
        })
    }

    /// Open an existing database file, or create it if it doesn't exist.
    pub fn open_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path)
        }
    }

    /// Number of page slots in the file, including deallocated ones.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    /// Number of deallocated ids waiting for reuse.
    #[inline]
    pub fn free_page_count(&self) -> usize {
        self.free_pages.len()
    }

    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.page_count as u64) * (PAGE_SIZE as u64)
    }

    /// Reject ids that are not live pages of this file.
    fn check_live(&self, page_id: PageId) -> Result<()> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id));
        }
        if page_id.0 >= self.page_count || self.freed.contains(&page_id) {
            return Err(Error::PageNotFound(page_id));
        }
        Ok(())
    }

    fn write_at(&mut self, page_id: PageId, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        self.file.write_all(bytes)?;
        self.file.sync_all()?;
        Ok(())
    }
}

impl DiskManager for FileDiskManager {
    fn read_page(&mut self, page_id: PageId, page: &mut Page) -> Result<()> {
        self.check_live(page_id)?;

        self.file.seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        self.file.read_exact(page.as_mut_slice())?;
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        self.check_live(page_id)?;
        self.write_at(page_id, page.as_slice())
    }

    fn allocate_page(&mut self) -> Result<PageId> {
        let zeros = [0u8; PAGE_SIZE];

        if let Some(&page_id) = self.free_pages.last() {
            self.write_at(page_id, &zeros)?;
            self.free_pages.pop();
            self.freed.remove(&page_id);
            return Ok(page_id);
        }

        if self.page_count as u64 >= crate::common::config::MAX_PAGES {
            return Err(Error::Io(std::io::Error::other(
                "database file is at its maximum page count",
            )));
        }

        let page_id = PageId::new(self.page_count);
        self.write_at(page_id, &zeros)?;
        self.page_count += 1;
        Ok(page_id)
    }

    fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        self.check_live(page_id)?;
        self.free_pages.push(page_id);
        self.freed.insert(page_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_dm() -> (FileDiskManager, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let dm = FileDiskManager::create(dir.path().join("test.db")).unwrap();
        (dm, dir)
    }

    #[test]
    fn test_create_existing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        FileDiskManager::create(&path).unwrap();
        assert!(FileDiskManager::create(&path).is_err());
        assert!(FileDiskManager::open(dir.path().join("missing.db")).is_err());
    }

    #[test]
    fn test_allocate_and_read_zeroed_page() {
        let (mut dm, _dir) = create_dm();

        assert_eq!(dm.file_size(), 0);
        let page_id = dm.allocate_page().unwrap();
        assert_eq!(page_id, PageId::new(0));
        assert_eq!(dm.page_count(), 1);
        assert_eq!(dm.file_size(), PAGE_SIZE as u64);

        let mut page = Page::new();
        page.as_mut_slice()[0] = 0xFF;
        dm.read_page(page_id, &mut page).unwrap();
        assert!(page.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_and_read_page() {
        let (mut dm, _dir) = create_dm();
        let page_id = dm.allocate_page().unwrap();

        let mut page = Page::new();
        page.as_mut_slice()[0] = 0xAB;
        page.as_mut_slice()[4095] = 0xEF;
        dm.write_page(page_id, &page).unwrap();

        let mut read_back = Page::new();
        dm.read_page(page_id, &mut read_back).unwrap();
        assert_eq!(read_back.as_slice()[0], 0xAB);
        assert_eq!(read_back.as_slice()[4095], 0xEF);
    }

    #[test]
    fn test_persistence_across_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let mut dm = FileDiskManager::create(&path).unwrap();
            let page_id = dm.allocate_page().unwrap();
            let mut page = Page::new();
            page.as_mut_slice()[0] = 0x42;
            dm.write_page(page_id, &page).unwrap();
        }

        let mut dm = FileDiskManager::open_or_create(&path).unwrap();
        assert_eq!(dm.page_count(), 1);

        let mut page = Page::new();
        dm.read_page(PageId::new(0), &mut page).unwrap();
        assert_eq!(page.as_slice()[0], 0x42);
    }

    #[test]
    fn test_unallocated_page_not_found() {
        let (mut dm, _dir) = create_dm();
        dm.allocate_page().unwrap();

        let mut page = Page::new();
        assert!(matches!(
            dm.read_page(PageId::new(1), &mut page),
            Err(Error::PageNotFound(_))
        ));
        assert!(matches!(
            dm.write_page(PageId::new(5), &page),
            Err(Error::PageNotFound(_))
        ));
        assert!(matches!(
            dm.read_page(PageId::INVALID, &mut page),
            Err(Error::InvalidPageId(_))
        ));
    }

    #[test]
    fn test_deallocate_and_reuse() {
        let (mut dm, _dir) = create_dm();
        let p0 = dm.allocate_page().unwrap();
        let p1 = dm.allocate_page().unwrap();

        let mut page = Page::new();
        page.as_mut_slice()[0] = 0x77;
        dm.write_page(p0, &page).unwrap();

        dm.deallocate_page(p0).unwrap();
        assert_eq!(dm.free_page_count(), 1);
        assert!(matches!(
            dm.read_page(p0, &mut page),
            Err(Error::PageNotFound(_))
        ));
        // Freeing twice is a caller bug
        assert!(dm.deallocate_page(p0).is_err());

        // Reused before the file grows, and zeroed
        let reused = dm.allocate_page().unwrap();
        assert_eq!(reused, p0);
        assert_eq!(dm.free_page_count(), 0);
        assert_eq!(dm.page_count(), 2);
        assert_eq!(dm.file_size(), 2 * PAGE_SIZE as u64);
        dm.read_page(reused, &mut page).unwrap();
        assert_eq!(page.as_slice()[0], 0);

        assert_eq!(dm.allocate_page().unwrap(), PageId::new(2));
        assert_ne!(p1, reused);
    }
}
