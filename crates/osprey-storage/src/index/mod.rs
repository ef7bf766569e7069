//! B+Tree index files and range scans.
//!
//! An index file holds one B+Tree: page 0 is a metadata page, the rest are
//! internal and leaf node pages. Leaf pages form a forward chain in key
//! order; keys are stored order-preserving-encoded so byte comparison
//! equals typed comparison. Duplicate keys are allowed and stored as
//! contiguous runs.
//!
//! On top of the tree sit the range scan iterator and the index access
//! adapters (key, bitmap, compressed bitmap) sharing one scan contract.

pub mod access;
pub mod bitmap;
pub mod file;
pub mod keycodec;
pub mod leaf;
pub mod node;
pub mod scan;

pub use access::{EntryScan, IndexEntry, ScanSource};
pub use bitmap::{BitmapIndex, CompressedBitmapIndex, KeyIndex};
pub use file::IndexFile;
pub use scan::{RangeScan, ScanEntry};

/// Maximum encoded key size accepted by an index.
pub const MAX_KEY_SIZE: usize = 256;
