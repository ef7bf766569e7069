//! B+Tree index files.
//!
//! Page 0 of an index file is the metadata page (attribute type, root,
//! height, entry count); the remaining pages are internal and leaf nodes.
//! Every page access is pinned through the page store. Duplicate keys are
//! allowed; a logical delete is keyed by the exact (key, payload) pair.
//! Deletion never rebalances: a leaf may run empty and is skipped by the
//! chain walk.

use crate::disk::FileId;
use crate::index::{keycodec, leaf, node, MAX_KEY_SIZE};
use crate::store::{PageStore, PinnedPage};
use bytes::Bytes;
use log::{debug, trace};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use osprey_common::page::{PageId, PageType};
use osprey_common::{AttrType, OspreyError, Result, Value};

/// Magic number identifying an index metadata page.
const META_MAGIC: u32 = 0x4F53_5049;

/// Format version stored in the metadata page.
const META_VERSION: u16 = 1;

/// Page number of the metadata page.
const META_PAGE: u32 = 0;

/// Mutable shape of the tree, mirrored on the metadata page.
#[derive(Debug, Clone, Copy)]
struct TreeShape {
    root: u32,
    height: u32,
    entry_count: u64,
}

/// A B+Tree index over one disk file.
pub struct IndexFile {
    store: Arc<PageStore>,
    file_id: FileId,
    attr: AttrType,
    meta: RwLock<TreeShape>,
}

impl fmt::Debug for IndexFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexFile")
            .field("file_id", &self.file_id)
            .field("attr", &self.attr)
            .field("meta", &*self.meta.read())
            .finish_non_exhaustive()
    }
}

impl IndexFile {
    /// Creates a new empty index file for keys of the given type.
    pub fn create(store: Arc<PageStore>, name: &str, attr: AttrType) -> Result<Self> {
        let file_id = store.create_file(name)?;

        let meta_guard = store.allocate(file_id, PageType::IndexMeta)?;
        if meta_guard.page_id().page_num != META_PAGE {
            return Err(OspreyError::IndexCorrupted(format!(
                "metadata page of {name} allocated at {}",
                meta_guard.page_id()
            )));
        }
        drop(meta_guard);

        let mut root_guard = store.allocate(file_id, PageType::IndexLeaf)?;
        root_guard.write(|data| leaf::init(data))?;
        let root = root_guard.page_id().page_num;
        drop(root_guard);

        let shape = TreeShape {
            root,
            height: 1,
            entry_count: 0,
        };
        let index = Self {
            store,
            file_id,
            attr,
            meta: RwLock::new(shape),
        };
        index.write_meta(&shape)?;
        debug!("created index {name}");
        Ok(index)
    }

    /// Opens an existing index file. Fails with `FileNotFound` if absent.
    pub fn open(store: Arc<PageStore>, name: &str) -> Result<Self> {
        let file_id = store.open_file(name)?;
        let guard = store.pin(PageId::new(file_id.0, META_PAGE))?;
        let (attr, shape) = guard.read(read_meta)??;
        drop(guard);

        debug!(
            "opened index {name}: {} entries, height {}",
            shape.entry_count, shape.height
        );
        Ok(Self {
            store,
            file_id,
            attr,
            meta: RwLock::new(shape),
        })
    }

    /// Returns the key attribute type of this index.
    pub fn attr_type(&self) -> AttrType {
        self.attr
    }

    /// Returns the number of entries in the index.
    pub fn len(&self) -> u64 {
        self.meta.read().entry_count
    }

    /// Returns true if the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the current tree height (1 = the root is a leaf).
    pub fn height(&self) -> u32 {
        self.meta.read().height
    }

    /// Encodes a typed key for this index.
    pub fn encode_key(&self, value: &Value) -> Result<Bytes> {
        keycodec::encode_key(self.attr, value)
    }

    /// Decodes a stored key back into a typed value.
    pub fn decode_key(&self, key: &[u8]) -> Result<Value> {
        keycodec::decode_key(self.attr, key)
    }

    /// Pins a page of this index file.
    pub(crate) fn pin_page(&self, page_num: u32) -> Result<PinnedPage> {
        self.store.pin(PageId::new(self.file_id.0, page_num))
    }

    fn write_meta(&self, shape: &TreeShape) -> Result<()> {
        let attr = self.attr;
        let shape = *shape;
        let mut guard = self.pin_page(META_PAGE)?;
        guard.write(|data| {
            let base = osprey_common::page::PageHeader::SIZE;
            data[base..base + 4].copy_from_slice(&META_MAGIC.to_le_bytes());
            data[base + 4..base + 6].copy_from_slice(&META_VERSION.to_le_bytes());
            data[base + 6] = attr as u8;
            data[base + 7] = 0;
            data[base + 8..base + 12].copy_from_slice(&shape.root.to_le_bytes());
            data[base + 12..base + 16].copy_from_slice(&shape.height.to_le_bytes());
            data[base + 16..base + 24].copy_from_slice(&shape.entry_count.to_le_bytes());
        })
    }

    /// Inserts a typed key with an opaque payload. Duplicates are allowed.
    pub fn insert(&self, key: &Value, payload: &[u8]) -> Result<()> {
        let encoded = self.encode_key(key)?;
        self.insert_bytes(&encoded, payload)
    }

    /// Inserts an encoded key with an opaque payload.
    pub fn insert_bytes(&self, key: &[u8], payload: &[u8]) -> Result<()> {
        if key.len() > MAX_KEY_SIZE {
            return Err(OspreyError::KeyTooLarge {
                size: key.len(),
                max: MAX_KEY_SIZE,
            });
        }

        let mut shape = self.meta.write();

        // Descend toward the insertion point, remembering the internal path.
        let mut path = Vec::with_capacity(shape.height as usize);
        let mut current = shape.root;
        for _ in 1..shape.height {
            let guard = self.pin_page(current)?;
            path.push(current);
            current = guard.read(|data| node::child_upper(data, key))?;
        }

        let mut leaf_guard = self.pin_page(current)?;
        match leaf_guard.update(|data| leaf::insert(data, key, payload)) {
            Ok(()) => {}
            Err(OspreyError::NodeFull) => {
                drop(leaf_guard);
                self.split_leaf_and_insert(&mut shape, current, &path, key, payload)?;
            }
            Err(e) => return Err(e),
        }

        shape.entry_count += 1;
        self.write_meta(&shape)
    }

    fn split_leaf_and_insert(
        &self,
        shape: &mut TreeShape,
        leaf_pg: u32,
        path: &[u32],
        key: &[u8],
        payload: &[u8],
    ) -> Result<()> {
        let mut right_guard = self.store.allocate(self.file_id, PageType::IndexLeaf)?;
        let right_pg = right_guard.page_id().page_num;
        let mut left_guard = self.pin_page(leaf_pg)?;

        let split_key = left_guard.update(|left_data| {
            right_guard.update(|right_data| leaf::split(left_data, right_data, right_pg))
        })?;
        trace!("split leaf {leaf_pg} -> {right_pg}");

        if key < split_key.as_ref() {
            left_guard.update(|data| leaf::insert(data, key, payload))?;
        } else {
            right_guard.update(|data| leaf::insert(data, key, payload))?;
        }
        drop(left_guard);
        drop(right_guard);

        self.propagate_split(shape, split_key, right_pg, path)
    }

    /// Pushes a new separator up the tree, splitting internal nodes as
    /// needed and growing a new root when the old one overflows.
    fn propagate_split(
        &self,
        shape: &mut TreeShape,
        mut sep: Bytes,
        mut new_child: u32,
        path: &[u32],
    ) -> Result<()> {
        let mut idx = path.len();
        loop {
            if idx == 0 {
                let mut root_guard = self.store.allocate(self.file_id, PageType::IndexInternal)?;
                let new_root = root_guard.page_id().page_num;
                let old_root = shape.root;
                let level = shape.height as u16;
                root_guard.update(|data| {
                    node::init(data, level);
                    node::set_leftmost(data, old_root);
                    node::insert(data, &sep, new_child)
                })?;
                shape.root = new_root;
                shape.height += 1;
                trace!("grew new root {new_root}, height {}", shape.height);
                return Ok(());
            }

            idx -= 1;
            let parent_pg = path[idx];
            let mut parent_guard = self.pin_page(parent_pg)?;
            match parent_guard.update(|data| node::insert(data, &sep, new_child)) {
                Ok(()) => return Ok(()),
                Err(OspreyError::NodeFull) => {
                    let mut right_guard =
                        self.store.allocate(self.file_id, PageType::IndexInternal)?;
                    let right_pg = right_guard.page_id().page_num;

                    let promoted = parent_guard.update(|left_data| {
                        right_guard.update(|right_data| node::split(left_data, right_data))
                    })?;

                    if sep.as_ref() < promoted.as_ref() {
                        parent_guard.update(|data| node::insert(data, &sep, new_child))?;
                    } else {
                        right_guard.update(|data| node::insert(data, &sep, new_child))?;
                    }

                    sep = promoted;
                    new_child = right_pg;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Logically deletes the exact (key, payload) pair.
    ///
    /// Walks the key's run across the leaf chain; returns false if no
    /// matching entry exists.
    pub fn delete(&self, key: &[u8], payload: &[u8]) -> Result<bool> {
        let mut shape = self.meta.write();
        let Some((mut page_num, mut slot)) = self.locate(&shape, key)? else {
            return Ok(false);
        };

        loop {
            let mut guard = self.pin_page(page_num)?;
            let (entry, next) = guard.read(|data| (leaf::entry_at(data, slot), leaf::next_leaf(data)))?;
            match entry {
                None => match next {
                    Some(n) => {
                        page_num = n;
                        slot = 0;
                    }
                    None => return Ok(false),
                },
                Some(entry) => {
                    if entry.key.as_ref() != key {
                        return Ok(false);
                    }
                    if entry.payload.as_ref() == payload {
                        guard.update(|data| leaf::remove_at(data, slot))?;
                        shape.entry_count = shape.entry_count.saturating_sub(1);
                        drop(guard);
                        self.write_meta(&shape)?;
                        trace!("deleted entry at {page_num}:{slot}");
                        return Ok(true);
                    }
                    slot += 1;
                }
            }
        }
    }

    /// Finds the first entry with key >= the search key.
    ///
    /// Follows the leaf chain past exhausted leaves; returns the leaf page
    /// number and slot, or None when no such entry exists.
    pub fn seek(&self, key: &[u8]) -> Result<Option<(u32, u16)>> {
        let shape = self.meta.read();
        self.locate(&shape, key)
    }

    fn locate(&self, shape: &TreeShape, key: &[u8]) -> Result<Option<(u32, u16)>> {
        let mut current = shape.root;
        for _ in 1..shape.height {
            let guard = self.pin_page(current)?;
            current = guard.read(|data| node::child_lower(data, key))?;
        }

        let mut page_num = current;
        loop {
            let guard = self.pin_page(page_num)?;
            let (count, next, slot) = guard.read(|data| {
                (
                    leaf::entry_count(data),
                    leaf::next_leaf(data),
                    leaf::lower_bound(data, key),
                )
            })?;
            if slot < count {
                return Ok(Some((page_num, slot)));
            }
            match next {
                Some(n) => page_num = n,
                None => return Ok(None),
            }
        }
    }

    /// Finds the first entry of the index in key order.
    pub fn first(&self) -> Result<Option<(u32, u16)>> {
        let shape = self.meta.read();
        let mut current = shape.root;
        for _ in 1..shape.height {
            let guard = self.pin_page(current)?;
            current = guard.read(|data| node::leftmost(data))?;
        }

        let mut page_num = current;
        loop {
            let guard = self.pin_page(page_num)?;
            let (count, next) = guard.read(|data| (leaf::entry_count(data), leaf::next_leaf(data)))?;
            if count > 0 {
                return Ok(Some((page_num, 0)));
            }
            match next {
                Some(n) => page_num = n,
                None => return Ok(None),
            }
        }
    }
}

/// Parses the metadata page.
fn read_meta(data: &[u8; osprey_common::page::PAGE_SIZE]) -> Result<(AttrType, TreeShape)> {
    let base = osprey_common::page::PageHeader::SIZE;
    let magic = u32::from_le_bytes([data[base], data[base + 1], data[base + 2], data[base + 3]]);
    if magic != META_MAGIC {
        return Err(OspreyError::IndexCorrupted(format!(
            "bad metadata magic {magic:#x}"
        )));
    }
    let version = u16::from_le_bytes([data[base + 4], data[base + 5]]);
    if version != META_VERSION {
        return Err(OspreyError::IndexCorrupted(format!(
            "unsupported index version {version}"
        )));
    }
    let attr = AttrType::from_u8(data[base + 6])?;
    let root = u32::from_le_bytes([
        data[base + 8],
        data[base + 9],
        data[base + 10],
        data[base + 11],
    ]);
    let height = u32::from_le_bytes([
        data[base + 12],
        data[base + 13],
        data[base + 14],
        data[base + 15],
    ]);
    let entry_count = u64::from_le_bytes([
        data[base + 16],
        data[base + 17],
        data[base + 18],
        data[base + 19],
        data[base + 20],
        data[base + 21],
        data[base + 22],
        data[base + 23],
    ]);
    Ok((
        attr,
        TreeShape {
            root,
            height,
            entry_count,
        },
    ))
}
