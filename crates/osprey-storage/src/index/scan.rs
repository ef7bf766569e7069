//! Range scans over an index's leaf chain.
//!
//! A scan owns at most one pinned leaf page at any time. Advancing past a
//! leaf unpins it and pins its successor; exhausting the chain, crossing
//! the upper bound, or closing the scan drops the pin. The pin is held by
//! a scoped guard, so it is released on every exit path.
//!
//! The consumer may delete the entry the scan just returned. Deletion can
//! restructure the tree under the cursor, so the cursor is re-derived
//! afterwards from a stable coordinate: the entry's key plus its ordinal
//! among surviving entries of the same key.

use crate::index::file::IndexFile;
use crate::index::leaf;
use crate::store::PinnedPage;
use bytes::Bytes;
use log::trace;
use osprey_common::{OspreyError, Result, Value};

/// One entry produced by a range scan: encoded key plus raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanEntry {
    /// Order-preserving encoded key bytes.
    pub key: Bytes,
    /// Opaque payload bytes.
    pub payload: Bytes,
}

/// An in-order scan over an index, bounded above by an optional key.
pub struct RangeScan<'a> {
    index: &'a IndexFile,
    /// Current leaf, pinned. None means the scan is exhausted.
    page: Option<PinnedPage>,
    /// Slot of the cursor within the current leaf.
    slot: u16,
    /// Encoded upper bound; entries with greater keys are never returned.
    upper: Option<Bytes>,
    /// Whether `next` has been called at least once.
    started: bool,
    /// Set by `delete_current`; makes the following `next` re-read in
    /// place instead of advancing.
    just_deleted: bool,
    /// Key of the last returned entry.
    current_key: Option<Bytes>,
    /// Ordinal of the last returned entry among surviving entries with
    /// the same key.
    run_ordinal: u32,
}

impl<'a> RangeScan<'a> {
    /// Opens a scan over `[lower, upper]` (both bounds inclusive and
    /// optional). The cursor is positioned on the first candidate entry
    /// without consuming it.
    pub fn open(
        index: &'a IndexFile,
        lower: Option<&Value>,
        upper: Option<&Value>,
    ) -> Result<Self> {
        let upper = match upper {
            Some(v) => Some(index.encode_key(v)?),
            None => None,
        };

        let start = match lower {
            Some(v) => {
                let key = index.encode_key(v)?;
                index.seek(&key)?
            }
            None => index.first()?,
        };

        let (page, slot) = match start {
            Some((page_num, slot)) => (Some(index.pin_page(page_num)?), slot),
            None => (None, 0),
        };

        trace!("opened scan, positioned = {}", page.is_some());
        Ok(Self {
            index,
            page,
            slot,
            upper,
            started: false,
            just_deleted: false,
            current_key: None,
            run_ordinal: 0,
        })
    }

    fn iter_err(e: OspreyError) -> OspreyError {
        match e {
            e @ OspreyError::ScanIterator(_) => e,
            other => OspreyError::ScanIterator(other.to_string()),
        }
    }

    /// Moves the cursor onto a valid slot, following the leaf chain past
    /// exhausted leaves. Clears the cursor when the chain ends.
    fn settle(&mut self) -> Result<()> {
        loop {
            let Some(page) = &self.page else {
                return Ok(());
            };
            let (count, next) = page
                .read(|data| (leaf::entry_count(data), leaf::next_leaf(data)))
                .map_err(Self::iter_err)?;
            if self.slot < count {
                return Ok(());
            }

            // Leaf exhausted: release it before touching the next one.
            self.page = None;
            match next {
                Some(page_num) => {
                    self.page = Some(self.index.pin_page(page_num).map_err(Self::iter_err)?);
                    self.slot = 0;
                }
                None => return Ok(()),
            }
        }
    }

    /// Returns the next entry in key order, or None once the scan is
    /// exhausted.
    ///
    /// The first call returns the entry at the opening position; later
    /// calls advance. A call following a successful `delete_current`
    /// re-reads the cursor position instead of advancing past it.
    pub fn next(&mut self) -> Result<Option<ScanEntry>> {
        if self.page.is_none() {
            return Ok(None);
        }

        let advance = self.started && !self.just_deleted;
        let hold_ordinal = self.just_deleted;
        self.started = true;
        self.just_deleted = false;
        if advance {
            self.slot += 1;
        }

        self.settle()?;
        let Some(page) = &self.page else {
            trace!("scan exhausted at end of chain");
            return Ok(None);
        };

        let entry = page
            .read(|data| leaf::entry_at(data, self.slot))
            .map_err(Self::iter_err)?
            .ok_or_else(|| OspreyError::ScanIterator("cursor past leaf end".to_string()))?;

        if let Some(bound) = &self.upper {
            if entry.key.as_ref() > bound.as_ref() {
                // Past the bound: release the page and stop for good.
                self.page = None;
                trace!("scan exhausted at upper bound");
                return Ok(None);
            }
        }

        match &self.current_key {
            Some(key) if key.as_ref() == entry.key.as_ref() => {
                if !hold_ordinal {
                    self.run_ordinal += 1;
                }
            }
            _ => self.run_ordinal = 0,
        }
        self.current_key = Some(entry.key.clone());

        Ok(Some(ScanEntry {
            key: entry.key,
            payload: entry.payload,
        }))
    }

    /// Deletes the entry the scan last returned.
    ///
    /// A no-op when the previous call was already a delete or the scan has
    /// not produced an entry yet; an error when the scan holds no page.
    /// After the delete the cursor is re-derived (run start plus the
    /// number of surviving same-key predecessors) so the following `next`
    /// continues with the deleted entry's successor.
    pub fn delete_current(&mut self) -> Result<()> {
        let Some(page) = &self.page else {
            return Err(OspreyError::ScanDelete("no active page".to_string()));
        };
        if !self.started || self.just_deleted {
            return Ok(());
        }

        let entry = page
            .read(|data| leaf::entry_at(data, self.slot))
            .map_err(|e| OspreyError::ScanDelete(e.to_string()))?
            .ok_or_else(|| OspreyError::ScanDelete("cursor past leaf end".to_string()))?;

        // Release the pin before mutating the tree.
        self.page = None;

        let removed = self
            .index
            .delete(&entry.key, &entry.payload)
            .map_err(|e| OspreyError::ScanDelete(e.to_string()))?;
        if !removed {
            return Err(OspreyError::ScanDelete(
                "current entry no longer present".to_string(),
            ));
        }
        trace!("deleted current entry, re-deriving cursor");

        // Re-derive the cursor: the deleted entry's successor now sits at
        // the same ordinal within the key's run.
        match self
            .index
            .seek(&entry.key)
            .map_err(|e| OspreyError::ScanDelete(e.to_string()))?
        {
            Some((page_num, slot)) => {
                self.page = Some(
                    self.index
                        .pin_page(page_num)
                        .map_err(|e| OspreyError::ScanDelete(e.to_string()))?,
                );
                self.slot = slot;
                for _ in 0..self.run_ordinal {
                    self.slot += 1;
                    self.settle()
                        .map_err(|e| OspreyError::ScanDelete(e.to_string()))?;
                }
            }
            None => self.page = None,
        }

        self.just_deleted = true;
        Ok(())
    }

    /// Returns true once the scan can produce no further entries.
    pub fn is_exhausted(&self) -> bool {
        self.page.is_none()
    }

    /// Tears the scan down, releasing its pinned page (zero or one).
    ///
    /// Idempotent; closing an exhausted scan releases nothing.
    pub fn close(&mut self) -> Result<()> {
        if let Some(page) = self.page.take() {
            page.unpin()
                .map_err(|e| OspreyError::ScanTeardown(e.to_string()))?;
        }
        Ok(())
    }
}
