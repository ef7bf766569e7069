//! Disk manager for page-level file I/O.
//!
//! Files are addressed by their catalog name (e.g. `orders.2`,
//! `orders.bitmap2`); the disk manager assigns each opened file a numeric
//! id that becomes the `file_id` half of every PageId read through it.

use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use osprey_common::page::{self, PageId, PAGE_SIZE};
use osprey_common::{OspreyError, Result};

/// Numeric handle for an open file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u32);

/// Configuration for the disk manager.
#[derive(Debug, Clone)]
pub struct DiskManagerConfig {
    /// Base directory for data files.
    pub data_dir: PathBuf,
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
    /// Verify page checksums on read.
    pub verify_checksums: bool,
}

impl Default for DiskManagerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            fsync_enabled: true,
            verify_checksums: true,
        }
    }
}

/// Handle for an open data file.
struct FileHandle {
    file: File,
    #[allow(dead_code)]
    path: PathBuf,
    num_pages: u32,
}

struct DiskInner {
    files: Vec<FileHandle>,
    by_name: HashMap<String, FileId>,
}

/// Manages reading and writing pages to named disk files.
pub struct DiskManager {
    config: DiskManagerConfig,
    inner: Mutex<DiskInner>,
}

impl DiskManager {
    /// Creates a new disk manager, creating the data directory if needed.
    pub fn new(config: DiskManagerConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)?;

        Ok(Self {
            config,
            inner: Mutex::new(DiskInner {
                files: Vec::new(),
                by_name: HashMap::new(),
            }),
        })
    }

    /// Returns the data directory path.
    pub fn data_dir(&self) -> &Path {
        &self.config.data_dir
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.config.data_dir.join(name)
    }

    /// Returns true if a file with the given name exists on disk.
    pub fn exists(&self, name: &str) -> bool {
        self.file_path(name).exists()
    }

    fn register(&self, name: &str, file: File, path: PathBuf) -> Result<FileId> {
        let num_pages = (file.metadata()?.len() / PAGE_SIZE as u64) as u32;
        let mut inner = self.inner.lock();
        let file_id = FileId(inner.files.len() as u32);
        inner.files.push(FileHandle {
            file,
            path,
            num_pages,
        });
        inner.by_name.insert(name.to_string(), file_id);
        Ok(file_id)
    }

    /// Opens an existing file. Fails with `FileNotFound` if it is absent.
    pub fn open(&self, name: &str) -> Result<FileId> {
        if let Some(&file_id) = self.inner.lock().by_name.get(name) {
            return Ok(file_id);
        }

        let path = self.file_path(name);
        if !path.exists() {
            return Err(OspreyError::FileNotFound(name.to_string()));
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        debug!("opened file {name}");
        self.register(name, file, path)
    }

    /// Creates a new empty file, truncating any previous content.
    pub fn create(&self, name: &str) -> Result<FileId> {
        let existing = self.inner.lock().by_name.get(name).copied();
        if let Some(file_id) = existing {
            // Already open: truncate in place.
            let mut inner = self.inner.lock();
            let handle = &mut inner.files[file_id.0 as usize];
            handle.file.set_len(0)?;
            handle.num_pages = 0;
            return Ok(file_id);
        }

        let path = self.file_path(name);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        debug!("created file {name}");
        self.register(name, file, path)
    }

    /// Returns the number of pages in a file.
    pub fn num_pages(&self, file_id: FileId) -> Result<u32> {
        let inner = self.inner.lock();
        let handle = inner
            .files
            .get(file_id.0 as usize)
            .ok_or_else(|| OspreyError::Internal(format!("file {} not open", file_id.0)))?;
        Ok(handle.num_pages)
    }

    /// Extends a file by one zeroed page and returns the new page number.
    pub fn allocate_page(&self, file_id: FileId) -> Result<u32> {
        let mut inner = self.inner.lock();
        let handle = inner
            .files
            .get_mut(file_id.0 as usize)
            .ok_or_else(|| OspreyError::Internal(format!("file {} not open", file_id.0)))?;

        let page_num = handle.num_pages;
        let offset = (page_num as u64) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;
        handle.file.write_all(&[0u8; PAGE_SIZE])?;
        handle.num_pages += 1;
        Ok(page_num)
    }

    /// Reads a page from disk, verifying its checksum when enabled.
    pub fn read_page(&self, page_id: PageId) -> Result<Box<[u8; PAGE_SIZE]>> {
        let mut inner = self.inner.lock();
        let handle = inner
            .files
            .get_mut(page_id.file_id as usize)
            .ok_or_else(|| OspreyError::Internal(format!("file {} not open", page_id.file_id)))?;

        if page_id.page_num >= handle.num_pages {
            return Err(OspreyError::PageCorrupted {
                page_id: page_id.as_u64(),
                reason: format!(
                    "page {} beyond end of file ({} pages)",
                    page_id.page_num, handle.num_pages
                ),
            });
        }

        let offset = (page_id.page_num as u64) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;

        let mut buffer = Box::new([0u8; PAGE_SIZE]);
        handle.file.read_exact(&mut *buffer)?;
        drop(inner);

        if self.config.verify_checksums {
            let stored = page::stored_checksum(&buffer);
            // Zero means the page was never stamped (freshly allocated).
            if stored != 0 && stored != page::page_checksum(&buffer) {
                return Err(OspreyError::PageCorrupted {
                    page_id: page_id.as_u64(),
                    reason: "checksum mismatch".to_string(),
                });
            }
        }

        Ok(buffer)
    }

    /// Writes a page to disk, stamping its checksum.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let mut stamped = Box::new(*data);
        page::stamp_checksum(&mut stamped);

        let mut inner = self.inner.lock();
        let handle = inner
            .files
            .get_mut(page_id.file_id as usize)
            .ok_or_else(|| OspreyError::Internal(format!("file {} not open", page_id.file_id)))?;

        let offset = (page_id.page_num as u64) * (PAGE_SIZE as u64);
        handle.file.seek(SeekFrom::Start(offset))?;
        handle.file.write_all(&*stamped)?;
        if page_id.page_num >= handle.num_pages {
            handle.num_pages = page_id.page_num + 1;
        }

        if self.config.fsync_enabled {
            handle.file.sync_data()?;
        }

        Ok(())
    }
}
