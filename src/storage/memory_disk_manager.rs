//! Heap-backed [`DiskManager`] for tests and throwaway pools.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;
use crate::storage::DiskManager;

#[derive(Default)]
struct Store {
    pages: HashMap<PageId, Box<Page>>,
    next_page_id: u32,
    /// Every successful write, in call order.
    write_log: Vec<PageId>,
    reads: u64,
    deallocations: u64,
}

/// Keeps every page in memory.
///
/// Ids are handed out sequentially from 0 and never reused. Clones share
/// the same store, so a test can hand one handle to the buffer pool and keep
/// another to inspect what the pool actually wrote.
///
/// # Example
/// ```
/// use pagepool::storage::{DiskManager, MemoryDiskManager};
/// use pagepool::Page;
///
/// let mut dm = MemoryDiskManager::new();
/// let observer = dm.clone();
///
/// let pid = dm.allocate_page().unwrap();
/// dm.write_page(pid, &Page::new()).unwrap();
/// assert_eq!(observer.write_log(), vec![pid]);
/// ```
#[derive(Clone, Default)]
pub struct MemoryDiskManager {
    store: Arc<Mutex<Store>>,
}

impl MemoryDiskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids of all successful writes, oldest first.
    pub fn write_log(&self) -> Vec<PageId> {
        self.store.lock().write_log.clone()
    }

    pub fn write_count(&self) -> u64 {
        self.store.lock().write_log.len() as u64
    }

    pub fn read_count(&self) -> u64 {
        self.store.lock().reads
    }

    pub fn deallocation_count(&self) -> u64 {
        self.store.lock().deallocations
    }

    /// Number of live (allocated, not deallocated) pages.
    pub fn live_page_count(&self) -> usize {
        self.store.lock().pages.len()
    }

    /// Copy of the stored bytes of `page_id`, bypassing the counters.
    pub fn peek(&self, page_id: PageId) -> Option<Vec<u8>> {
        self.store
            .lock()
            .pages
            .get(&page_id)
            .map(|page| page.as_slice().to_vec())
    }
}

impl DiskManager for MemoryDiskManager {
    fn read_page(&mut self, page_id: PageId, page: &mut Page) -> Result<()> {
        let mut store = self.store.lock();
        let stored = store
            .pages
            .get(&page_id)
            .ok_or(Error::PageNotFound(page_id))?;
        page.copy_from(stored);
        store.reads += 1;
        Ok(())
    }

    fn write_page(&mut self, page_id: PageId, page: &Page) -> Result<()> {
        let mut store = self.store.lock();
        store
            .pages
            .get_mut(&page_id)
            .ok_or(Error::PageNotFound(page_id))?
            .copy_from(page);
        store.write_log.push(page_id);
        Ok(())
    }

    fn allocate_page(&mut self) -> Result<PageId> {
        let mut store = self.store.lock();
        let page_id = PageId::new(store.next_page_id);
        if !page_id.is_valid() {
            return Err(Error::Io(std::io::Error::other("page ids exhausted")));
        }
        store.next_page_id += 1;
        store.pages.insert(page_id, Box::new(Page::new()));
        Ok(page_id)
    }

    fn deallocate_page(&mut self, page_id: PageId) -> Result<()> {
        let mut store = self.store.lock();
        store
            .pages
            .remove(&page_id)
            .ok_or(Error::PageNotFound(page_id))?;
        store.deallocations += 1;
        Ok(())
    }
}
