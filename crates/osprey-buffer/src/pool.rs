//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::page_table::PageTable;
use crate::replacer::{ClockReplacer, Replacer};
use log::debug;
use parking_lot::Mutex;
use sysinfo::System;
use osprey_common::page::{PageId, PAGE_SIZE};
use osprey_common::{OspreyError, Result};

/// A dirty page that was evicted from the buffer pool.
/// The caller must write it back to disk to prevent data loss.
#[derive(Debug)]
pub struct EvictedPage {
    pub page_id: PageId,
    pub data: Box<[u8; PAGE_SIZE]>,
}

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

/// Buffer pool manager.
///
/// Manages a fixed-size pool of page frames with:
/// - Page ID to frame ID mapping
/// - Free frame list for newly cached pages
/// - Clock replacement for eviction
/// - Pin counting: a pinned page is never evicted
pub struct BufferPool {
    config: BufferPoolConfig,
    frames: Vec<BufferFrame>,
    page_table: PageTable,
    free_list: Mutex<Vec<FrameId>>,
    replacer: ClockReplacer,
}

impl BufferPool {
    /// Creates a new buffer pool.
    pub fn new(config: BufferPoolConfig) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();

        // All frames start free; pop from the back so low IDs go out first.
        let free_list: Vec<_> = (0..num_frames).rev().map(|i| FrameId(i as u32)).collect();

        Self {
            config,
            frames,
            page_table: PageTable::new(num_frames),
            free_list: Mutex::new(free_list),
            replacer: ClockReplacer::new(num_frames),
        }
    }

    /// Creates a buffer pool sized to 25% of available system RAM,
    /// with a floor of 1,000 frames.
    pub fn auto_sized() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let target_bytes = available_bytes / 4;
        let num_frames = (target_bytes / PAGE_SIZE).max(1_000);

        debug!("auto-sized buffer pool: {num_frames} frames");
        Self::new(BufferPoolConfig { num_frames })
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of free frames.
    pub fn free_count(&self) -> usize {
        self.free_list.lock().len()
    }

    /// Returns the number of pages currently cached.
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }

    /// Checks if a page is resident in the buffer pool.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.page_table.contains(page_id)
    }

    /// Returns the pin count of a resident page, or None if not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let frame_id = self.page_table.get(page_id)?;
        Some(self.frames[frame_id.0 as usize].pin_count())
    }

    /// Pins a page if it is resident. Returns true on success.
    pub fn pin_existing(&self, page_id: PageId) -> bool {
        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = &self.frames[frame_id.0 as usize];
            frame.pin();
            self.replacer.record_access(frame_id);
            return true;
        }
        false
    }

    /// Installs a page into the pool and pins it.
    ///
    /// If the page is already resident it is simply pinned again; the
    /// provided data is ignored in that case. Returns any evicted dirty
    /// page, which the caller must write back to disk.
    pub fn install(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<Option<EvictedPage>> {
        if self.pin_existing(page_id) {
            return Ok(None);
        }

        let (frame_id, evicted) = self.allocate_frame()?;
        let frame = &self.frames[frame_id.0 as usize];
        frame.reset();
        frame.set_page_id(Some(page_id));
        frame.copy_from(data);
        frame.pin();
        self.replacer.record_access(frame_id);
        self.page_table.insert(page_id, frame_id);

        Ok(evicted)
    }

    /// Allocates a frame, evicting an unpinned page if necessary.
    fn allocate_frame(&self) -> Result<(FrameId, Option<EvictedPage>)> {
        {
            let mut free_list = self.free_list.lock();
            if let Some(frame_id) = free_list.pop() {
                return Ok((frame_id, None));
            }
        }

        let victim_id = self.replacer.evict(&|fid| {
            let frame = &self.frames[fid.0 as usize];
            !frame.is_empty() && frame.pin_count() == 0
        });

        let Some(victim_id) = victim_id else {
            return Err(OspreyError::BufferPoolFull);
        };

        let frame = &self.frames[victim_id.0 as usize];

        let evicted = if frame.is_dirty() {
            frame.page_id().map(|page_id| {
                let guard = frame.read_data();
                let mut data = Box::new([0u8; PAGE_SIZE]);
                data.copy_from_slice(&**guard);
                EvictedPage { page_id, data }
            })
        } else {
            None
        };

        if let Some(old_page_id) = frame.page_id() {
            debug!("evicting page {old_page_id} from {victim_id}");
            self.page_table.remove(old_page_id);
        }

        Ok((victim_id, evicted))
    }

    /// Unpins a page. Returns false if the page is not resident.
    ///
    /// At pin count zero the page becomes a legal eviction victim.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = &self.frames[frame_id.0 as usize];
            if is_dirty {
                frame.set_dirty(true);
            }
            frame.unpin();
            return true;
        }
        false
    }

    /// Runs a closure against the frame holding a resident page.
    ///
    /// Callers must hold a pin for the duration of the access; this method
    /// does not pin.
    pub fn with_frame<R>(&self, page_id: PageId, f: impl FnOnce(&BufferFrame) -> R) -> Option<R> {
        let frame_id = self.page_table.get(page_id)?;
        Some(f(&self.frames[frame_id.0 as usize]))
    }

    /// Flushes one page through the callback if it is resident and dirty.
    ///
    /// Returns true if the page was flushed.
    pub fn flush_page<F>(&self, page_id: PageId, mut flush_fn: F) -> Result<bool>
    where
        F: FnMut(PageId, &[u8; PAGE_SIZE]) -> Result<()>,
    {
        let Some(frame_id) = self.page_table.get(page_id) else {
            return Ok(false);
        };
        let frame = &self.frames[frame_id.0 as usize];
        if !frame.is_dirty() {
            return Ok(false);
        }

        {
            let data = frame.read_data();
            flush_fn(page_id, &data)?;
        }
        frame.set_dirty(false);
        Ok(true)
    }

    /// Flushes every resident dirty page through the callback.
    ///
    /// Returns the number of pages flushed.
    pub fn flush_all<F>(&self, mut flush_fn: F) -> Result<usize>
    where
        F: FnMut(PageId, &[u8; PAGE_SIZE]) -> Result<()>,
    {
        let mut flushed = 0;
        for frame in &self.frames {
            let Some(page_id) = frame.page_id() else {
                continue;
            };
            if !frame.is_dirty() {
                continue;
            }
            {
                let data = frame.read_data();
                flush_fn(page_id, &data)?;
            }
            frame.set_dirty(false);
            flushed += 1;
        }
        Ok(flushed)
    }
}
