//! Buffer Pool Manager - the core page caching layer.
//!
//! The [`BufferPoolManager`] provides:
//! - At most one resident frame per page
//! - Pin-based reference counting
//! - Write-back of dirty pages before their frame is reused
//! - Allocation and deletion of pages through the disk manager

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, info, trace, warn};
use parking_lot::Mutex;

use crate::buffer::replacer::LruReplacer;
use crate::buffer::{BufferPoolStats, Frame, PageReadGuard, PageWriteGuard};
use crate::common::config::{BufferPoolConfig, DeletePolicy};
use crate::common::{Error, FrameId, PageId, Result};
use crate::container::hash::ExtendibleHash;
use crate::recovery::LogManager;
use crate::storage::page::Page;
use crate::storage::DiskManager;

/// State only touched while holding the pool latch.
struct PoolState {
    /// Frames holding no page. Popped from the front, returned to the back.
    free_list: VecDeque<FrameId>,
    /// Pages deleted while still pinned (permissive policy only). Their
    /// frames are reclaimed, and the ids deallocated, on the last unpin.
    doomed: HashMap<PageId, FrameId>,
    disk_manager: Box<dyn DiskManager>,
}

/// Manages a fixed pool of frames caching disk pages.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────────────────────┐
/// │                     BufferPoolManager                        │
/// │  ┌────────────────────┐  ┌────────────────────────────────┐  │
/// │  │ page_table         │  │      frames: Vec<Frame>        │  │
/// │  │ ExtendibleHash     │─▶│ [Frame0] [Frame1] [Frame2] ... │  │
/// │  │ PageId → FrameId   │  └────────────────────────────────┘  │
/// │  └────────────────────┘                                      │
/// │  ┌────────────────────┐  ┌──────────────┐  ┌──────────────┐  │
/// │  │ latch: Mutex       │  │   replacer   │  │ log_manager  │  │
/// │  │ free_list + disk   │  │ LruReplacer  │  │  (optional)  │  │
/// │  └────────────────────┘  └──────────────┘  └──────────────┘  │
/// └──────────────────────────────────────────────────────────────┘
/// ```
///
/// # Invariants
/// Every frame is in exactly one of these states:
/// - on the free list (no page, unpinned, clean)
/// - resident and pinned (in the page table, not in the replacer)
/// - resident and unpinned (in the page table and in the replacer)
/// - deleted but still pinned (in `doomed`, in neither of the above)
///
/// # Thread Safety
/// One latch serializes every public operation end to end, disk I/O
/// included. The page table and the replacer have their own locks but are
/// only ever called with the latch held, so lock order is always
/// latch → page table / replacer.
///
/// Page bytes are behind each frame's `RwLock`. The lock order is
/// page lock → latch: flushes pin the page and take its lock before the
/// latch, and the latch only ever locks pages of unpinned or free frames.
/// A thread holding a page guard may therefore call back into the pool.
///
/// Do not call `flush_page` for a page whose write lock the same thread
/// holds. The guards returned by [`fetch_page_read`](Self::fetch_page_read)
/// and [`fetch_page_write`](Self::fetch_page_write) release the page lock
/// before they unpin.
///
/// # Usage
/// ```
/// use pagepool::storage::MemoryDiskManager;
/// use pagepool::BufferPoolManager;
///
/// let bpm = BufferPoolManager::new(4, MemoryDiskManager::new());
///
/// let (frame, page_id) = bpm.new_page().unwrap().expect("pool has room");
/// frame.page_mut().as_mut_slice()[0] = 0xAB;
/// assert!(bpm.unpin_page(page_id, true));
///
/// let frame = bpm.fetch_page(page_id).unwrap().expect("pool has room");
/// assert_eq!(frame.page().as_slice()[0], 0xAB);
/// assert!(bpm.unpin_page(page_id, false));
/// ```
pub struct BufferPoolManager {
    /// Fixed pool of frames allocated at startup.
    frames: Vec<Frame>,

    /// Resident pages.
    page_table: ExtendibleHash<PageId, FrameId>,

    /// Resident frames with no pins, least recently unpinned first.
    replacer: LruReplacer<FrameId>,

    latch: Mutex<PoolState>,

    /// Flushed before any page image is written.
    log_manager: Option<Arc<dyn LogManager>>,

    delete_policy: DeletePolicy,

    stats: BufferPoolStats,
}

impl BufferPoolManager {
    /// Create a pool of `pool_size` frames with default settings and no log
    /// manager.
    ///
    /// # Panics
    /// Panics if `pool_size` is 0.
    pub fn new<D: DiskManager + 'static>(pool_size: usize, disk_manager: D) -> Self {
        Self::with_config(
            BufferPoolConfig::default().with_pool_size(pool_size),
            disk_manager,
            None,
        )
    }

    /// Create a pool from an explicit configuration.
    ///
    /// # Panics
    /// Panics if `config.pool_size` or `config.bucket_size` is 0.
    pub fn with_config<D: DiskManager + 'static>(
        config: BufferPoolConfig,
        disk_manager: D,
        log_manager: Option<Arc<dyn LogManager>>,
    ) -> Self {
        assert!(config.pool_size > 0, "pool_size must be > 0");

        let frames: Vec<Frame> = (0..config.pool_size).map(|_| Frame::new()).collect();
        let free_list: VecDeque<FrameId> = (0..config.pool_size).map(FrameId::new).collect();

        info!(
            "buffer pool: {} frames, bucket size {}, {:?}, logging {}",
            config.pool_size,
            config.bucket_size,
            config.delete_policy,
            if log_manager.is_some() { "on" } else { "off" }
        );

        Self {
            frames,
            page_table: ExtendibleHash::new(config.bucket_size),
            replacer: LruReplacer::new(),
            latch: Mutex::new(PoolState {
                free_list,
                doomed: HashMap::new(),
                disk_manager: Box::new(disk_manager),
            }),
            log_manager,
            delete_policy: config.delete_policy,
            stats: BufferPoolStats::new(),
        }
    }

    // ========================================================================
    // Public API: pin / unpin
    // ========================================================================

    /// Pin `page_id` in a frame, loading it if it is not resident.
    ///
    /// Returns `Ok(None)` if the page is not resident and every frame is
    /// pinned. Each successful call adds one pin; balance it with
    /// [`unpin_page`](Self::unpin_page).
    ///
    /// # Errors
    /// - `Error::InvalidPageId` for [`PageId::INVALID`]
    /// - Any disk manager or log manager error hit while writing back the
    ///   reclaimed frame or reading the page
    pub fn fetch_page(&self, page_id: PageId) -> Result<Option<&Frame>> {
        if !page_id.is_valid() {
            return Err(Error::InvalidPageId(page_id));
        }

        let mut state = self.latch.lock();

        if state.doomed.contains_key(&page_id) {
            return Err(Error::PageNotFound(page_id));
        }

        if let Some(frame_id) = self.page_table.find(&page_id) {
            let frame = &self.frames[frame_id.0];
            let pins = frame.pin();
            self.replacer.erase(&frame_id);
            BufferPoolStats::bump(&self.stats.cache_hits);
            trace!("hit {} in {} (pins: {})", page_id, frame_id, pins);
            return Ok(Some(frame));
        }

        BufferPoolStats::bump(&self.stats.cache_misses);

        let Some(frame_id) = self.acquire_frame(&mut state)? else {
            return Ok(None);
        };
        let frame = &self.frames[frame_id.0];

        let read = state.disk_manager.read_page(page_id, &mut frame.page_mut());
        if let Err(err) = read {
            state.free_list.push_front(frame_id);
            return Err(err);
        }
        BufferPoolStats::bump(&self.stats.pages_read);

        frame.install(page_id);
        self.page_table.insert(page_id, frame_id);
        trace!("loaded {} into {}", page_id, frame_id);

        Ok(Some(frame))
    }

    /// Drop one pin on `page_id`, marking it dirty if `is_dirty`.
    ///
    /// The dirty flag is sticky: passing `false` never clears it. When the
    /// last pin goes the frame becomes eligible for eviction.
    ///
    /// Returns `false` if the page is not resident or not pinned.
    ///
    /// Unpins of a page deleted while pinned drain its remaining pins; the
    /// last one frees the frame and deallocates the id.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let mut state = self.latch.lock();

        if let Some(&frame_id) = state.doomed.get(&page_id) {
            self.release_doomed(&mut state, page_id, frame_id);
            return true;
        }

        let Some(frame_id) = self.page_table.find(&page_id) else {
            debug!("unpin of non-resident {}", page_id);
            return false;
        };
        let frame = &self.frames[frame_id.0];

        if !frame.is_pinned() {
            warn!("unpin of {} which has no pins", page_id);
            return false;
        }

        if is_dirty {
            frame.mark_dirty();
        }
        if frame.unpin() == 0 {
            self.replacer.insert(frame_id);
        }
        true
    }

    // ========================================================================
    // Public API: create and delete pages
    // ========================================================================

    /// Allocate a fresh page and pin it in a zeroed frame.
    ///
    /// Returns `Ok(None)` if every frame is pinned; no page is allocated in
    /// that case.
    ///
    /// # Errors
    /// Disk manager or log manager errors from the write-back or the
    /// allocation.
    pub fn new_page(&self) -> Result<Option<(&Frame, PageId)>> {
        let mut state = self.latch.lock();

        let Some(frame_id) = self.acquire_frame(&mut state)? else {
            return Ok(None);
        };

        let page_id = match state.disk_manager.allocate_page() {
            Ok(page_id) => page_id,
            Err(err) => {
                state.free_list.push_front(frame_id);
                return Err(err);
            }
        };

        let frame = &self.frames[frame_id.0];
        frame.page_mut().reset();
        frame.install(page_id);
        self.page_table.insert(page_id, frame_id);
        trace!("new {} in {}", page_id, frame_id);

        Ok(Some((frame, page_id)))
    }

    /// Drop `page_id` from the pool and deallocate it in the disk manager.
    ///
    /// Returns `Ok(false)` if the page is not resident; nothing is
    /// deallocated then. Dirty contents are discarded, not written.
    ///
    /// Under [`DeletePolicy::Permissive`] a pinned page leaves the page
    /// table at once, but keeps its frame and its id until the outstanding
    /// pins are unpinned, so the id cannot be handed out again while stale
    /// holders remain.
    ///
    /// # Errors
    /// - `Error::PagePinned` if the page is pinned and the pool was built
    ///   with [`DeletePolicy::RejectPinned`]; nothing is changed
    /// - Disk manager errors from the deallocation; nothing is changed
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.latch.lock();

        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[frame_id.0];

        if frame.is_pinned() {
            match self.delete_policy {
                DeletePolicy::RejectPinned => {
                    warn!("refusing to delete pinned {}", page_id);
                    return Err(Error::PagePinned(page_id));
                }
                DeletePolicy::Permissive => {
                    warn!(
                        "deleting {} with {} outstanding pins",
                        page_id,
                        frame.pin_count()
                    );
                    self.page_table.remove(&page_id);
                    state.doomed.insert(page_id, frame_id);
                    return Ok(true);
                }
            }
        }

        state.disk_manager.deallocate_page(page_id)?;

        self.page_table.remove(&page_id);
        frame.clear();
        self.replacer.erase(&frame_id);
        state.free_list.push_back(frame_id);
        trace!("deleted {}, {} returned to free list", page_id, frame_id);

        Ok(true)
    }

    // ========================================================================
    // Public API: flush
    // ========================================================================

    /// Write the resident copy of `page_id` to the disk manager.
    ///
    /// Writes whether or not the page is dirty or pinned. The dirty flag is
    /// left as it was, so a dirty page is written again when it is evicted.
    ///
    /// Returns `Ok(false)` for [`PageId::INVALID`] or a non-resident page.
    ///
    /// Waits for any writer holding the page lock to finish.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Ok(false);
        }

        let frame = {
            let _state = self.latch.lock();
            let Some(frame_id) = self.page_table.find(&page_id) else {
                return Ok(false);
            };
            self.pin_for_flush(frame_id)
        };

        let result = self.write_pinned(frame, page_id);
        self.unpin_page(page_id, false);
        result.map(|()| true)
    }

    /// [`flush_page`](Self::flush_page) every resident page.
    ///
    /// Stops at the first error; every page pinned for the flush is still
    /// unpinned.
    pub fn flush_all_pages(&self) -> Result<()> {
        let pinned: Vec<(PageId, &Frame)> = {
            let _state = self.latch.lock();
            (0..self.frames.len())
                .map(FrameId::new)
                .filter_map(|frame_id| {
                    let page_id = self.frames[frame_id.0].page_id();
                    (self.page_table.find(&page_id) == Some(frame_id))
                        .then(|| (page_id, self.pin_for_flush(frame_id)))
                })
                .collect()
        };

        let mut result = Ok(());
        for (page_id, frame) in pinned {
            if result.is_ok() {
                result = self.write_pinned(frame, page_id);
            }
            self.unpin_page(page_id, false);
        }
        result
    }

    // ========================================================================
    // Public API: guards
    // ========================================================================

    /// [`fetch_page`](Self::fetch_page) wrapped in a shared guard that unpins
    /// (clean) on drop.
    pub fn fetch_page_read(&self, page_id: PageId) -> Result<Option<PageReadGuard<'_>>> {
        Ok(self
            .fetch_page(page_id)?
            .map(|frame| PageReadGuard::new(self, page_id, frame.page())))
    }

    /// [`fetch_page`](Self::fetch_page) wrapped in an exclusive guard that
    /// unpins dirty on drop.
    pub fn fetch_page_write(&self, page_id: PageId) -> Result<Option<PageWriteGuard<'_>>> {
        Ok(self
            .fetch_page(page_id)?
            .map(|frame| PageWriteGuard::new(self, page_id, frame.page_mut())))
    }

    /// [`new_page`](Self::new_page) wrapped in an exclusive guard.
    pub fn new_page_guarded(&self) -> Result<Option<PageWriteGuard<'_>>> {
        Ok(self
            .new_page()?
            .map(|(frame, page_id)| PageWriteGuard::new(self, page_id, frame.page_mut())))
    }

    // ========================================================================
    // Public API: introspection
    // ========================================================================

    pub fn stats(&self) -> &BufferPoolStats {
        &self.stats
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    pub fn delete_policy(&self) -> DeletePolicy {
        self.delete_policy
    }

    pub fn free_frame_count(&self) -> usize {
        self.latch.lock().free_list.len()
    }

    /// Resident frames with no pins.
    pub fn evictable_count(&self) -> usize {
        let _state = self.latch.lock();
        self.replacer.size()
    }

    /// Resident frames with at least one pin.
    pub fn pinned_frame_count(&self) -> usize {
        let _state = self.latch.lock();
        self.frames
            .iter()
            .filter(|frame| !frame.is_free() && frame.is_pinned())
            .count()
    }

    /// Pages currently in the page table.
    pub fn resident_page_count(&self) -> usize {
        let _state = self.latch.lock();
        self.page_table.len()
    }

    /// Pin count of `page_id`, or `None` if it is not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let _state = self.latch.lock();
        self.page_table
            .find(&page_id)
            .map(|frame_id| self.frames[frame_id.0].pin_count())
    }

    /// Dirty flag of `page_id`, or `None` if it is not resident.
    pub fn is_dirty(&self, page_id: PageId) -> Option<bool> {
        let _state = self.latch.lock();
        self.page_table
            .find(&page_id)
            .map(|frame_id| self.frames[frame_id.0].is_dirty())
    }

    // ========================================================================
    // Internal: frame acquisition and write-back
    // ========================================================================

    /// Find a frame to reuse: the free list first, then the replacer.
    ///
    /// A reclaimed frame is written back if dirty, dropped from the page
    /// table and cleared, so the caller always gets a free, clean frame.
    /// `Ok(None)` means every frame is pinned.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<Option<FrameId>> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(Some(frame_id));
        }

        let Some(frame_id) = self.replacer.victim() else {
            warn!("buffer pool exhausted: all {} frames pinned", self.frames.len());
            return Ok(None);
        };

        let frame = &self.frames[frame_id.0];
        let old_page_id = frame.page_id();

        if frame.is_dirty() {
            trace!("writing back dirty {} from {}", old_page_id, frame_id);
            if let Err(err) = self.write_frame(state, frame, old_page_id) {
                // Still resident and dirty; keep it reclaimable.
                self.replacer.insert(frame_id);
                return Err(err);
            }
            BufferPoolStats::bump(&self.stats.write_backs);
        }

        self.page_table.remove(&old_page_id);
        frame.clear();
        BufferPoolStats::bump(&self.stats.evictions);
        trace!("evicted {} from {}", old_page_id, frame_id);

        Ok(Some(frame_id))
    }

    /// Pin a resident frame so it survives while the latch is dropped.
    /// Caller holds the latch.
    fn pin_for_flush(&self, frame_id: FrameId) -> &Frame {
        let frame = &self.frames[frame_id.0];
        frame.pin();
        self.replacer.erase(&frame_id);
        frame
    }

    /// Write a pinned frame: page lock first, then the latch.
    fn write_pinned(&self, frame: &Frame, page_id: PageId) -> Result<()> {
        let page = frame.page();
        let mut state = self.latch.lock();
        self.write_image(&mut state, page_id, &page)
    }

    /// Write `frame` as `page_id`, flushing the log first.
    ///
    /// Only for frames nobody has pinned, whose page lock is uncontended.
    fn write_frame(&self, state: &mut PoolState, frame: &Frame, page_id: PageId) -> Result<()> {
        self.write_image(state, page_id, &frame.page())
    }

    fn write_image(&self, state: &mut PoolState, page_id: PageId, page: &Page) -> Result<()> {
        if let Some(log_manager) = &self.log_manager {
            log_manager.flush()?;
        }
        state.disk_manager.write_page(page_id, page)?;
        BufferPoolStats::bump(&self.stats.pages_written);
        Ok(())
    }

    /// Drop one pin of a page deleted while pinned. The last pin returns
    /// the frame to the free list and deallocates the id.
    fn release_doomed(&self, state: &mut PoolState, page_id: PageId, frame_id: FrameId) {
        let frame = &self.frames[frame_id.0];
        if frame.unpin() > 0 {
            return;
        }

        state.doomed.remove(&page_id);
        if let Err(err) = state.disk_manager.deallocate_page(page_id) {
            warn!("deallocating deleted {} failed, id leaked: {}", page_id, err);
        }
        frame.clear();
        state.free_list.push_back(frame_id);
        trace!(
            "last pin of deleted {} gone, {} returned to free list",
            page_id,
            frame_id
        );
    }
}
