//! Storage engine for OspreyDB.
//!
//! This crate provides:
//! - Disk manager for page-level I/O over catalog-named files
//! - Pinned page store routing every access through the buffer pool
//! - Columnar relations with rid-to-position-to-tuple resolution
//! - B+Tree index files with a leaf-chain range scan iterator
//! - Index access adapters (key, bitmap, compressed bitmap)

mod columnar;
mod disk;
pub mod index;
mod schema;
mod store;
mod tuple;

pub use columnar::Relation;
pub use disk::{DiskManager, DiskManagerConfig, FileId};
pub use schema::{ColumnDef, Schema};
pub use store::{PageStore, PinnedPage};
pub use tuple::{Position, Rid, Tuple};
