//! Frame - a slot in the buffer pool.
//!
//! A [`Frame`] holds a [`Page`] plus the metadata the pool manages for it:
//! - Which page currently occupies it ([`PageId::INVALID`] when free)
//! - Pin count (active holders)
//! - Dirty flag (contents differ from the disk manager's copy)

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::PageId;
use crate::storage::page::Page;

/// A frame in the buffer pool.
///
/// The pool allocates a fixed `Vec<Frame>` at startup; a frame's position in
/// that vector is its [`FrameId`](crate::FrameId) for the life of the pool.
///
/// # Thread Safety
/// - `page`: `RwLock`, the only way callers reach the bytes
/// - `page_id`, `pin_count`, `is_dirty`: atomics, so they can be read
///   without the pool latch
///
/// Metadata is only ever *written* by the
/// [`BufferPoolManager`](crate::BufferPoolManager) while it holds its latch.
pub struct Frame {
    page: RwLock<Page>,
    page_id: AtomicU32,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
}

impl Frame {
    /// Create a free frame.
    pub fn new() -> Self {
        Self {
            page: RwLock::new(Page::new()),
            page_id: AtomicU32::new(PageId::INVALID.0),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
        }
    }

    // ========================================================================
    // Page access
    // ========================================================================

    /// Acquire read lock on the page.
    #[inline]
    pub fn page(&self) -> RwLockReadGuard<'_, Page> {
        self.page.read()
    }

    /// Acquire write lock on the page.
    #[inline]
    pub fn page_mut(&self) -> RwLockWriteGuard<'_, Page> {
        self.page.write()
    }

    // ========================================================================
    // Metadata
    // ========================================================================

    /// Page currently held, or [`PageId::INVALID`].
    #[inline]
    pub fn page_id(&self) -> PageId {
        PageId(self.page_id.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn set_page_id(&self, page_id: PageId) {
        self.page_id.store(page_id.0, Ordering::Release);
    }

    #[inline]
    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Increment the pin count. Returns the new pin count.
    #[inline]
    pub(crate) fn pin(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Decrement the pin count. Returns the new pin count.
    ///
    /// # Panics
    /// Panics if the pin count is already 0.
    #[inline]
    pub(crate) fn unpin(&self) -> u32 {
        let old = self.pin_count.fetch_sub(1, Ordering::AcqRel);
        assert!(old > 0, "pin count underflow");
        old - 1
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn mark_dirty(&self) {
        self.is_dirty.store(true, Ordering::Release);
    }

    /// Take ownership of the frame for `page_id`: pinned once, clean.
    pub(crate) fn install(&self, page_id: PageId) {
        self.set_page_id(page_id);
        self.is_dirty.store(false, Ordering::Release);
        self.pin_count.store(1, Ordering::Release);
    }

    /// Return the metadata to the free state. Page bytes are left alone.
    pub(crate) fn clear(&self) {
        self.set_page_id(PageId::INVALID);
        self.is_dirty.store(false, Ordering::Release);
        self.pin_count.store(0, Ordering::Release);
    }

    /// True if no page occupies the frame.
    #[inline]
    pub fn is_free(&self) -> bool {
        !self.page_id().is_valid()
    }
}

impl Default for Frame {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("page_id", &self.page_id())
            .field("pin_count", &self.pin_count())
            .field("is_dirty", &self.is_dirty())
            .finish()
    }
}
