use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use log::{debug, error, warn};
use parking_lot::Mutex;

use crate::common::{FrameId, PageId, Result, SiltError, INVALID_PAGE_ID, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler, PageBuf};

use super::{FrameHeader, LruReplacer, ReadPageGuard, WritePageGuard};

/// Pool bookkeeping kept consistent under one lock: which page lives in
/// which frame, and which frames hold nothing at all.
struct PoolBookkeeping {
    /// Maps resident pages to their frames
    page_table: HashMap<PageId, FrameId>,
    /// Frames that currently hold no page
    free_list: VecDeque<FrameId>,
}

/// BufferPoolManager caches disk pages in a fixed array of frames. Every
/// page a caller touches is either served from the pool or loaded from disk
/// into a frame taken from the free list - or, when that is empty, from a
/// frame the LRU replacer evicts (writing the old contents back first if
/// they are dirty). The pool is the single owner of pin counts and dirty
/// flags.
///
/// Callers access page bytes through RAII guards obtained from
/// `fetch_read_page`/`fetch_write_page`/`new_page`; dropping a guard unpins
/// the page. `unpin_page` stays public as the primitive underneath.
pub struct BufferPoolManager {
    pool_size: usize,
    frames: Vec<Arc<FrameHeader>>,
    state: Mutex<PoolBookkeeping>,
    replacer: LruReplacer,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames over the given disk manager.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = VecDeque::with_capacity(pool_size);
        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(Arc::new(FrameHeader::new(frame_id)));
            free_list.push_back(frame_id);
        }

        Self {
            pool_size,
            frames,
            state: Mutex::new(PoolBookkeeping {
                page_table: HashMap::new(),
                free_list,
            }),
            replacer: LruReplacer::new(pool_size),
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Pins the page for shared access, loading it from disk if necessary.
    pub fn fetch_read_page(self: &Arc<Self>, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_pin(page_id)?;
        let frame = Arc::clone(&self.frames[frame_id.as_usize()]);
        Ok(ReadPageGuard::new(Arc::clone(self), page_id, frame))
    }

    /// Pins the page for exclusive access, loading it from disk if
    /// necessary.
    pub fn fetch_write_page(self: &Arc<Self>, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_pin(page_id)?;
        let frame = Arc::clone(&self.frames[frame_id.as_usize()]);
        Ok(WritePageGuard::new(Arc::clone(self), page_id, frame))
    }

    /// Allocates a fresh logical page and returns it zero-filled and pinned
    /// once. Fails when no frame can be obtained or the allocator is
    /// exhausted.
    pub fn new_page(self: &Arc<Self>) -> Result<(PageId, WritePageGuard)> {
        let frame_id = {
            let mut state = self.state.lock();
            let frame_id = self.acquire_frame(&mut state)?;

            let page_id = match self.disk_scheduler.disk_manager().allocate_page() {
                Ok(page_id) => page_id,
                Err(e) => {
                    state.free_list.push_back(frame_id);
                    return Err(e);
                }
            };

            let frame = &self.frames[frame_id.as_usize()];
            frame.reset();
            frame.set_page_id(page_id);
            frame.pin();
            state.page_table.insert(page_id, frame_id);
            frame_id
        };

        let frame = Arc::clone(&self.frames[frame_id.as_usize()]);
        let page_id = frame.page_id();
        Ok((page_id, WritePageGuard::new(Arc::clone(self), page_id, frame)))
    }

    /// Releases one pin on the page, ORing in the dirty flag. Unpinning a
    /// page whose count is already zero is tolerated and reports success;
    /// only an unpin of a page that is not resident reports failure.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return false;
        };

        let frame = &self.frames[frame_id.as_usize()];
        if is_dirty {
            frame.set_dirty(true);
        }
        if let Some(0) = frame.unpin() {
            self.replacer.unpin(frame_id);
        }
        true
    }

    /// Drops the page from the pool and returns its logical id to the
    /// allocator. Succeeds trivially when the page is not resident; fails
    /// (returns false) while someone still holds a pin on it.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut state = self.state.lock();
        let Some(&frame_id) = state.page_table.get(&page_id) else {
            return Ok(true);
        };

        let frame = &self.frames[frame_id.as_usize()];
        if frame.pin_count() > 0 {
            return Ok(false);
        }

        state.page_table.remove(&page_id);
        self.replacer.pin(frame_id);
        frame.reset();
        state.free_list.push_back(frame_id);

        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;
        Ok(true)
    }

    /// Writes the page's current bytes to disk and clears its dirty flag,
    /// leaving the caller-visible pin count alone. Reports false for an
    /// unresident or invalid id.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        // Pin the frame so it cannot be evicted, then copy outside the
        // pool lock; the copy may have to wait for a writer's page latch.
        let frame = {
            let state = self.state.lock();
            let Some(&frame_id) = state.page_table.get(&page_id) else {
                return Ok(false);
            };
            let frame = Arc::clone(&self.frames[frame_id.as_usize()]);
            frame.pin();
            self.replacer.pin(frame_id);
            frame
        };

        let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
        frame.copy_to(&mut buf[..]);
        let result = self.disk_scheduler.schedule_write(page_id, buf);
        if result.is_ok() {
            frame.set_dirty(false);
        }
        self.unpin_page(page_id, false);
        result.map(|_| true)
    }

    /// Writes every dirty resident page back to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let dirty_pages: Vec<PageId> = {
            let state = self.state.lock();
            state
                .page_table
                .iter()
                .filter(|(_, &frame_id)| self.frames[frame_id.as_usize()].is_dirty())
                .map(|(&page_id, _)| page_id)
                .collect()
        };

        for page_id in dirty_pages {
            // A page evicted since the scan flushes as a no-op.
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Debug invariant check: true when no frame holds a pinned page. Used
    /// by test harnesses to catch leaked pins, never by production logic.
    pub fn check_all_unpinned(&self) -> bool {
        let mut all_unpinned = true;
        for frame in &self.frames {
            let pins = frame.pin_count();
            if pins != 0 {
                error!("page {} left with pin count {}", frame.page_id(), pins);
                all_unpinned = false;
            }
        }
        all_unpinned
    }

    /// Allocation-bit passthrough to the disk manager.
    pub fn is_page_free(&self, page_id: PageId) -> Result<bool> {
        self.disk_scheduler.disk_manager().is_page_free(page_id)
    }

    /// Pin count of a resident page, or None when the page is not in the
    /// pool.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let state = self.state.lock();
        state
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.lock().free_list.len()
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    /// Pins `page_id` into a frame and returns the frame id. Resident pages
    /// are pinned in place; everything else goes through frame acquisition
    /// and a disk read.
    fn fetch_pin(&self, page_id: PageId) -> Result<FrameId> {
        if page_id == INVALID_PAGE_ID {
            return Err(SiltError::InvalidPageId(page_id));
        }

        let mut state = self.state.lock();
        if let Some(&frame_id) = state.page_table.get(&page_id) {
            let frame = &self.frames[frame_id.as_usize()];
            frame.pin();
            self.replacer.pin(frame_id);
            return Ok(frame_id);
        }

        let frame_id = self.acquire_frame(&mut state)?;
        let frame = &self.frames[frame_id.as_usize()];

        let buf = match self.disk_scheduler.schedule_read(page_id) {
            Ok(buf) => buf,
            Err(e) => {
                state.free_list.push_back(frame_id);
                return Err(e);
            }
        };

        frame.set_page_id(page_id);
        frame.copy_from(&buf[..]);
        frame.set_dirty(false);
        frame.pin();
        state.page_table.insert(page_id, frame_id);
        Ok(frame_id)
    }

    /// Obtains an empty frame: free list first, then an LRU victim whose
    /// old contents are written back if dirty. Fails with `PoolExhausted`
    /// when every frame is pinned.
    fn acquire_frame(&self, state: &mut PoolBookkeeping) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop_front() {
            return Ok(frame_id);
        }

        let Some(frame_id) = self.replacer.victim() else {
            return Err(SiltError::PoolExhausted);
        };

        let frame = &self.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();
        if frame.is_dirty() {
            let mut buf: PageBuf = Box::new([0u8; PAGE_SIZE]);
            frame.copy_to(&mut buf[..]);
            if let Err(e) = self.disk_scheduler.schedule_write(old_page_id, buf) {
                // Write-back failed: leave the page intact and evictable.
                self.replacer.unpin(frame_id);
                return Err(e);
            }
        }
        debug!("evicted page {} from frame {}", old_page_id, frame_id);

        state.page_table.remove(&old_page_id);
        frame.reset();
        Ok(frame_id)
    }
}

impl Drop for BufferPoolManager {
    fn drop(&mut self) {
        if let Err(e) = self.flush_all_pages() {
            warn!("failed to flush pages on shutdown: {}", e);
        }
    }
}
