//! Pinned page store: buffer-pool-backed page access.
//!
//! Every page access goes through the buffer pool; pages are fetched into
//! frames, pinned while in use, and written back lazily on eviction or
//! flush. Pin ownership is expressed as a scoped guard so a pin can never
//! leak and never be released twice.

use crate::disk::{DiskManager, DiskManagerConfig, FileId};
use log::trace;
use std::sync::Arc;
use osprey_buffer::{BufferPool, BufferPoolConfig};
use osprey_common::page::{PageHeader, PageId, PageType, PAGE_SIZE};
use osprey_common::{OspreyError, Result, StorageConfig};

/// Composes the disk manager and buffer pool into a single page store.
pub struct PageStore {
    disk: Arc<DiskManager>,
    pool: Arc<BufferPool>,
}

impl PageStore {
    /// Creates a new page store.
    pub fn new(disk: Arc<DiskManager>, pool: Arc<BufferPool>) -> Self {
        Self { disk, pool }
    }

    /// Builds the full storage stack described by a configuration.
    pub fn from_config(config: &StorageConfig) -> Result<Arc<Self>> {
        let disk = Arc::new(DiskManager::new(DiskManagerConfig {
            data_dir: config.data_dir.clone(),
            fsync_enabled: config.fsync_enabled,
            verify_checksums: config.verify_checksums,
        })?);
        let pool = Arc::new(BufferPool::new(BufferPoolConfig {
            num_frames: config.buffer_pool_pages,
        }));
        Ok(Arc::new(Self::new(disk, pool)))
    }

    /// Returns the underlying disk manager.
    pub fn disk(&self) -> &DiskManager {
        &self.disk
    }

    /// Returns the underlying buffer pool.
    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Opens an existing named file. Fails with `FileNotFound` if absent.
    pub fn open_file(&self, name: &str) -> Result<FileId> {
        self.disk.open(name)
    }

    /// Creates a new named file.
    pub fn create_file(&self, name: &str) -> Result<FileId> {
        self.disk.create(name)
    }

    /// Pins a page, loading it from disk if it is not resident.
    ///
    /// The returned guard keeps the page's frame pinned until it is dropped
    /// or explicitly unpinned.
    pub fn pin(self: &Arc<Self>, page_id: PageId) -> Result<PinnedPage> {
        if self.pool.pin_existing(page_id) {
            return Ok(PinnedPage::new(self.clone(), page_id));
        }

        let data = self.disk.read_page(page_id)?;
        let evicted = self.pool.install(page_id, &data)?;
        if let Some(evicted) = evicted {
            trace!("writing back evicted page {}", evicted.page_id);
            self.disk.write_page(evicted.page_id, &evicted.data)?;
        }

        Ok(PinnedPage::new(self.clone(), page_id))
    }

    /// Allocates a fresh page at the end of a file and pins it.
    ///
    /// The page header is initialized with the given page type and the
    /// page is marked dirty.
    pub fn allocate(self: &Arc<Self>, file_id: FileId, page_type: PageType) -> Result<PinnedPage> {
        let page_num = self.disk.allocate_page(file_id)?;
        let page_id = PageId::new(file_id.0, page_num);

        let data = Box::new([0u8; PAGE_SIZE]);
        let evicted = self.pool.install(page_id, &data)?;
        if let Some(evicted) = evicted {
            self.disk.write_page(evicted.page_id, &evicted.data)?;
        }

        let mut page = PinnedPage::new(self.clone(), page_id);
        page.write(|data| {
            let header = PageHeader::new(page_id, page_type);
            data[..PageHeader::SIZE].copy_from_slice(&header.to_bytes());
        })?;
        Ok(page)
    }

    /// Flushes every dirty resident page to disk.
    pub fn flush(&self) -> Result<usize> {
        self.pool
            .flush_all(|page_id, data| self.disk.write_page(page_id, data))
    }
}

/// A pinned page: pins on acquisition, unpins exactly once on release.
///
/// Dropping the guard releases the pin along every exit path, including
/// early returns and error paths. Paths that must observe an unpin failure
/// call `unpin` explicitly instead.
pub struct PinnedPage {
    store: Arc<PageStore>,
    page_id: PageId,
    released: bool,
}

impl PinnedPage {
    fn new(store: Arc<PageStore>, page_id: PageId) -> Self {
        Self {
            store,
            page_id,
            released: false,
        }
    }

    /// Returns the identifier of the pinned page.
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Runs a closure over the page bytes.
    pub fn read<R>(&self, f: impl FnOnce(&[u8; PAGE_SIZE]) -> R) -> Result<R> {
        self.store
            .pool
            .with_frame(self.page_id, |frame| {
                let data = frame.read_data();
                f(&data)
            })
            .ok_or_else(|| {
                OspreyError::Internal(format!("pinned page {} not resident", self.page_id))
            })
    }

    /// Runs a closure over the page bytes mutably, marking the page dirty.
    pub fn write<R>(&mut self, f: impl FnOnce(&mut [u8; PAGE_SIZE]) -> R) -> Result<R> {
        self.store
            .pool
            .with_frame(self.page_id, |frame| {
                frame.set_dirty(true);
                let mut data = frame.write_data();
                f(&mut data)
            })
            .ok_or_else(|| {
                OspreyError::Internal(format!("pinned page {} not resident", self.page_id))
            })
    }

    /// Like `write`, for closures that themselves return a `Result`.
    pub fn update<R>(
        &mut self,
        f: impl FnOnce(&mut [u8; PAGE_SIZE]) -> Result<R>,
    ) -> Result<R> {
        self.write(f)?
    }

    /// Releases the pin, surfacing failure instead of swallowing it.
    pub fn unpin(mut self) -> Result<()> {
        self.released = true;
        if self.store.pool.unpin_page(self.page_id, false) {
            Ok(())
        } else {
            Err(OspreyError::ScanTeardown(format!(
                "page {} was not resident at unpin",
                self.page_id
            )))
        }
    }
}

impl Drop for PinnedPage {
    fn drop(&mut self) {
        if !self.released {
            self.store.pool.unpin_page(self.page_id, false);
        }
    }
}

impl std::fmt::Debug for PinnedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PinnedPage")
            .field("page_id", &self.page_id)
            .finish()
    }
}
