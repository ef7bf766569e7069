//! The uniform scan contract shared by every index flavor.
//!
//! All index adapters expose the same capability: open a scan over an
//! optional key range, pull entries, close. Each produced entry resolves
//! to exactly one rid; adapters whose stored payloads pack several rids
//! expand them before they surface here, so consumers never see the
//! payload shape.

use crate::tuple::Rid;
use osprey_common::{Result, Value};

/// One logical index entry: a typed key and the rid it points at.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexEntry {
    /// The entry's key, decoded to its declared type.
    pub key: Value,
    /// The row the entry refers to.
    pub rid: Rid,
}

/// A pull-based scan over index entries in ascending key order.
pub trait EntryScan {
    /// Returns the next entry, or None once the scan is exhausted.
    fn next_entry(&mut self) -> Result<Option<IndexEntry>>;

    /// Tears the scan down, releasing any pinned pages it still holds.
    fn close(&mut self) -> Result<()>;
}

/// An index that can be scanned over an optional key range.
pub trait ScanSource {
    /// The scan type this index produces.
    type Scan<'a>: EntryScan
    where
        Self: 'a;

    /// Opens a scan over `[lower, upper]`, both bounds optional and
    /// inclusive.
    fn open_scan(&self, lower: Option<&Value>, upper: Option<&Value>) -> Result<Self::Scan<'_>>;
}
