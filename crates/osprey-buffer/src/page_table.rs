//! Page table mapping page IDs to buffer frames.

use crate::frame::FrameId;
use parking_lot::RwLock;
use std::collections::HashMap;
use osprey_common::page::PageId;

/// Number of shards in the page table.
const NUM_SHARDS: usize = 16;

/// Sharded map from PageId to FrameId.
///
/// Lookups hash the packed page ID to a shard; each shard is an
/// independently locked hash map so unrelated lookups do not contend.
pub struct PageTable {
    shards: Vec<RwLock<HashMap<u64, FrameId>>>,
}

impl PageTable {
    /// Creates a new page table sized for the given number of frames.
    pub fn new(capacity: usize) -> Self {
        let per_shard = (capacity / NUM_SHARDS).max(8);
        let shards = (0..NUM_SHARDS)
            .map(|_| RwLock::new(HashMap::with_capacity(per_shard)))
            .collect();
        Self { shards }
    }

    #[inline]
    fn shard(&self, key: u64) -> &RwLock<HashMap<u64, FrameId>> {
        // Mix the file id into the shard choice so single-file workloads spread
        let idx = (key ^ (key >> 32)) as usize % NUM_SHARDS;
        &self.shards[idx]
    }

    /// Looks up the frame holding a page.
    #[inline]
    pub fn get(&self, page_id: PageId) -> Option<FrameId> {
        let key = page_id.as_u64();
        self.shard(key).read().get(&key).copied()
    }

    /// Returns true if the page is mapped to a frame.
    #[inline]
    pub fn contains(&self, page_id: PageId) -> bool {
        self.get(page_id).is_some()
    }

    /// Maps a page to a frame.
    #[inline]
    pub fn insert(&self, page_id: PageId, frame_id: FrameId) {
        let key = page_id.as_u64();
        self.shard(key).write().insert(key, frame_id);
    }

    /// Removes a page mapping. Returns the frame it was mapped to, if any.
    #[inline]
    pub fn remove(&self, page_id: PageId) -> Option<FrameId> {
        let key = page_id.as_u64();
        self.shard(key).write().remove(&key)
    }

    /// Returns the number of mapped pages.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().len()).sum()
    }

    /// Returns true if no pages are mapped.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let table = PageTable::new(64);
        let page = PageId::new(0, 42);

        assert!(table.get(page).is_none());

        table.insert(page, FrameId(7));
        assert_eq!(table.get(page), Some(FrameId(7)));
        assert!(table.contains(page));
        assert_eq!(table.len(), 1);

        assert_eq!(table.remove(page), Some(FrameId(7)));
        assert!(table.get(page).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_overwrite_mapping() {
        let table = PageTable::new(64);
        let page = PageId::new(1, 1);

        table.insert(page, FrameId(0));
        table.insert(page, FrameId(1));
        assert_eq!(table.get(page), Some(FrameId(1)));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_distinct_files_do_not_collide() {
        let table = PageTable::new(64);

        table.insert(PageId::new(0, 5), FrameId(0));
        table.insert(PageId::new(1, 5), FrameId(1));

        assert_eq!(table.get(PageId::new(0, 5)), Some(FrameId(0)));
        assert_eq!(table.get(PageId::new(1, 5)), Some(FrameId(1)));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_many_pages() {
        let table = PageTable::new(64);
        for i in 0..1000 {
            table.insert(PageId::new(0, i), FrameId(i));
        }
        assert_eq!(table.len(), 1000);
        for i in 0..1000 {
            assert_eq!(table.get(PageId::new(0, i)), Some(FrameId(i)));
        }
    }
}
