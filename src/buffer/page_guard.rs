//! RAII guards for page access.
//!
//! - [`PageReadGuard`] - Shared read access (multiple allowed)
//! - [`PageWriteGuard`] - Exclusive write access (unpins dirty)
//!
//! Both guards release the page lock *before* unpinning, so a guard being
//! dropped never holds its page lock while waiting on the pool latch.

use std::ops::{Deref, DerefMut};

use parking_lot::{RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::page::Page;

use super::buffer_pool_manager::BufferPoolManager;

/// Unpins its page when dropped.
///
/// Declared as the last field of each guard: fields drop in declaration
/// order, so the page lock is already released when this runs.
struct Pin<'a> {
    bpm: &'a BufferPoolManager,
    page_id: PageId,
    dirty: bool,
}

impl Drop for Pin<'_> {
    fn drop(&mut self) {
        // A permissively deleted page still counts this pin until it drops
        let _ = self.bpm.unpin_page(self.page_id, self.dirty);
    }
}

/// Guard for read-only page access.
///
/// # Example
/// ```
/// # use pagepool::{BufferPoolManager, storage::MemoryDiskManager};
/// # let bpm = BufferPoolManager::new(2, MemoryDiskManager::new());
/// # let page_id = bpm.new_page_guarded().unwrap().unwrap().page_id();
/// let guard = bpm.fetch_page_read(page_id).unwrap().expect("frame available");
/// assert_eq!(guard.as_slice()[0], 0);
/// // guard drops here, page unpinned
/// ```
pub struct PageReadGuard<'a> {
    page: RwLockReadGuard<'a, Page>,
    pin: Pin<'a>,
}

impl<'a> PageReadGuard<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        page_id: PageId,
        page: RwLockReadGuard<'a, Page>,
    ) -> Self {
        Self {
            page,
            pin: Pin {
                bpm,
                page_id,
                dirty: false,
            },
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }
}

impl Deref for PageReadGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.page
    }
}

/// Guard for exclusive write access to a page.
///
/// The page is marked dirty and unpinned when the guard drops, whether or
/// not it was actually modified.
pub struct PageWriteGuard<'a> {
    page: RwLockWriteGuard<'a, Page>,
    pin: Pin<'a>,
}

impl<'a> PageWriteGuard<'a> {
    pub(crate) fn new(
        bpm: &'a BufferPoolManager,
        page_id: PageId,
        page: RwLockWriteGuard<'a, Page>,
    ) -> Self {
        Self {
            page,
            pin: Pin {
                bpm,
                page_id,
                dirty: true,
            },
        }
    }

    #[inline]
    pub fn page_id(&self) -> PageId {
        self.pin.page_id
    }
}

impl Deref for PageWriteGuard<'_> {
    type Target = Page;

    #[inline]
    fn deref(&self) -> &Page {
        &self.page
    }
}

impl DerefMut for PageWriteGuard<'_> {
    #[inline]
    fn deref_mut(&mut self) -> &mut Page {
        &mut self.page
    }
}
