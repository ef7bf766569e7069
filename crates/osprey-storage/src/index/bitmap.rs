//! Index access adapters: key, bitmap, and compressed bitmap.
//!
//! All three flavors store their entries in a B+Tree index file and
//! satisfy the same scan contract; they differ only in payload encoding
//! and file naming:
//!
//! - key index: payload is one rid, file `name.index{i}`
//! - bitmap index: payload is one rid, file `name.bitmap{i}`
//! - compressed bitmap index: payload is a run `(start rid, length)`,
//!   file `name.cbitmap{i}`; its scan expands each run into successive
//!   single-rid entries
//!
//! Column numbers in file names are 1-based.

use crate::index::access::{EntryScan, IndexEntry, ScanSource};
use crate::index::file::IndexFile;
use crate::index::scan::RangeScan;
use crate::store::PageStore;
use crate::tuple::Rid;
use std::fmt;
use std::sync::Arc;
use osprey_common::{AttrType, OspreyError, Result, Value};

/// Encodes a single-rid payload.
fn rid_payload(rid: Rid) -> [u8; 8] {
    rid.0.to_le_bytes()
}

/// Decodes a single-rid payload.
fn rid_from_payload(payload: &[u8]) -> Result<Rid> {
    let raw: [u8; 8] = payload
        .try_into()
        .map_err(|_| OspreyError::IndexCorrupted(format!("rid payload of {} bytes", payload.len())))?;
    Ok(Rid(u64::from_le_bytes(raw)))
}

/// Encodes a run payload: start rid + run length.
fn run_payload(start: Rid, len: u32) -> [u8; 12] {
    let mut buf = [0u8; 12];
    buf[0..8].copy_from_slice(&start.0.to_le_bytes());
    buf[8..12].copy_from_slice(&len.to_le_bytes());
    buf
}

/// Decodes a run payload.
fn run_from_payload(payload: &[u8]) -> Result<(Rid, u32)> {
    if payload.len() != 12 {
        return Err(OspreyError::IndexCorrupted(format!(
            "run payload of {} bytes",
            payload.len()
        )));
    }
    let start = u64::from_le_bytes([
        payload[0], payload[1], payload[2], payload[3], payload[4], payload[5], payload[6],
        payload[7],
    ]);
    let len = u32::from_le_bytes([payload[8], payload[9], payload[10], payload[11]]);
    Ok((Rid(start), len))
}

/// A scan yielding one entry per stored (key, rid) pair.
pub struct SingleRidScan<'a> {
    inner: RangeScan<'a>,
    index: &'a IndexFile,
}

impl EntryScan for SingleRidScan<'_> {
    fn next_entry(&mut self) -> Result<Option<IndexEntry>> {
        let Some(entry) = self.inner.next()? else {
            return Ok(None);
        };
        Ok(Some(IndexEntry {
            key: self.index.decode_key(&entry.key)?,
            rid: rid_from_payload(&entry.payload)?,
        }))
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}

/// A scan decompressing run payloads into successive single-rid entries.
pub struct RunScan<'a> {
    inner: RangeScan<'a>,
    index: &'a IndexFile,
    /// Run currently being expanded: key, next rid, rids remaining.
    pending: Option<(Value, u64, u32)>,
}

impl EntryScan for RunScan<'_> {
    fn next_entry(&mut self) -> Result<Option<IndexEntry>> {
        loop {
            if let Some((key, next_rid, remaining)) = self.pending.take() {
                if remaining > 0 {
                    if remaining > 1 {
                        self.pending = Some((key.clone(), next_rid + 1, remaining - 1));
                    }
                    return Ok(Some(IndexEntry {
                        key,
                        rid: Rid(next_rid),
                    }));
                }
            }

            let Some(entry) = self.inner.next()? else {
                return Ok(None);
            };
            let (start, len) = run_from_payload(&entry.payload)?;
            let key = self.index.decode_key(&entry.key)?;
            // Zero-length runs are legal and simply skipped.
            self.pending = Some((key, start.0, len));
        }
    }

    fn close(&mut self) -> Result<()> {
        self.pending = None;
        self.inner.close()
    }
}

/// Ordered key index over a column; each entry carries one rid.
pub struct KeyIndex {
    file: IndexFile,
}

impl KeyIndex {
    /// File name for the key index on a 1-based column of a relation.
    pub fn file_name(relation: &str, column: usize) -> String {
        format!("{relation}.index{column}")
    }

    /// Creates an empty key index for a relation column.
    pub fn create(
        store: Arc<PageStore>,
        relation: &str,
        column: usize,
        attr: AttrType,
    ) -> Result<Self> {
        Ok(Self {
            file: IndexFile::create(store, &Self::file_name(relation, column), attr)?,
        })
    }

    /// Opens an existing key index. Fails with `FileNotFound` if absent.
    pub fn open(store: Arc<PageStore>, relation: &str, column: usize) -> Result<Self> {
        Ok(Self {
            file: IndexFile::open(store, &Self::file_name(relation, column))?,
        })
    }

    /// Inserts an entry for a key and the row holding it.
    pub fn insert(&self, key: &Value, rid: Rid) -> Result<()> {
        self.file.insert(key, &rid_payload(rid))
    }

    /// Returns the underlying index file.
    pub fn file(&self) -> &IndexFile {
        &self.file
    }
}

impl ScanSource for KeyIndex {
    type Scan<'a>
        = SingleRidScan<'a>
    where
        Self: 'a;

    fn open_scan(&self, lower: Option<&Value>, upper: Option<&Value>) -> Result<SingleRidScan<'_>> {
        Ok(SingleRidScan {
            inner: RangeScan::open(&self.file, lower, upper)?,
            index: &self.file,
        })
    }
}

/// Bitmap index: one entry per (key value, rid) pair.
pub struct BitmapIndex {
    file: IndexFile,
}

impl fmt::Debug for BitmapIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BitmapIndex").finish_non_exhaustive()
    }
}

impl BitmapIndex {
    /// File name for the bitmap index on a 1-based column of a relation.
    pub fn file_name(relation: &str, column: usize) -> String {
        format!("{relation}.bitmap{column}")
    }

    /// Creates an empty bitmap index for a relation column.
    pub fn create(
        store: Arc<PageStore>,
        relation: &str,
        column: usize,
        attr: AttrType,
    ) -> Result<Self> {
        Ok(Self {
            file: IndexFile::create(store, &Self::file_name(relation, column), attr)?,
        })
    }

    /// Opens an existing bitmap index. Fails with `FileNotFound` if absent.
    pub fn open(store: Arc<PageStore>, relation: &str, column: usize) -> Result<Self> {
        Ok(Self {
            file: IndexFile::open(store, &Self::file_name(relation, column))?,
        })
    }

    /// Inserts an entry for a key and the row holding it.
    pub fn insert(&self, key: &Value, rid: Rid) -> Result<()> {
        self.file.insert(key, &rid_payload(rid))
    }

    /// Returns the underlying index file.
    pub fn file(&self) -> &IndexFile {
        &self.file
    }
}

impl ScanSource for BitmapIndex {
    type Scan<'a>
        = SingleRidScan<'a>
    where
        Self: 'a;

    fn open_scan(&self, lower: Option<&Value>, upper: Option<&Value>) -> Result<SingleRidScan<'_>> {
        Ok(SingleRidScan {
            inner: RangeScan::open(&self.file, lower, upper)?,
            index: &self.file,
        })
    }
}

/// Compressed bitmap index: entries hold run-length payloads covering
/// consecutive rids that share a key value.
pub struct CompressedBitmapIndex {
    file: IndexFile,
}

impl fmt::Debug for CompressedBitmapIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressedBitmapIndex").finish_non_exhaustive()
    }
}

impl CompressedBitmapIndex {
    /// File name for the compressed bitmap index on a 1-based column.
    pub fn file_name(relation: &str, column: usize) -> String {
        format!("{relation}.cbitmap{column}")
    }

    /// Creates an empty compressed bitmap index for a relation column.
    pub fn create(
        store: Arc<PageStore>,
        relation: &str,
        column: usize,
        attr: AttrType,
    ) -> Result<Self> {
        Ok(Self {
            file: IndexFile::create(store, &Self::file_name(relation, column), attr)?,
        })
    }

    /// Opens an existing compressed bitmap index. Fails with
    /// `FileNotFound` if absent.
    pub fn open(store: Arc<PageStore>, relation: &str, column: usize) -> Result<Self> {
        Ok(Self {
            file: IndexFile::open(store, &Self::file_name(relation, column))?,
        })
    }

    /// Inserts a run of consecutive rids sharing a key.
    pub fn insert_run(&self, key: &Value, start: Rid, len: u32) -> Result<()> {
        self.file.insert(key, &run_payload(start, len))
    }

    /// Returns the underlying index file.
    pub fn file(&self) -> &IndexFile {
        &self.file
    }
}

impl ScanSource for CompressedBitmapIndex {
    type Scan<'a>
        = RunScan<'a>
    where
        Self: 'a;

    fn open_scan(&self, lower: Option<&Value>, upper: Option<&Value>) -> Result<RunScan<'_>> {
        Ok(RunScan {
            inner: RangeScan::open(&self.file, lower, upper)?,
            index: &self.file,
            pending: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::{DiskManager, DiskManagerConfig};
    use osprey_buffer::{BufferPool, BufferPoolConfig};
    use tempfile::tempdir;

    fn store(dir: &std::path::Path) -> Arc<PageStore> {
        let disk = Arc::new(
            DiskManager::new(DiskManagerConfig {
                data_dir: dir.to_path_buf(),
                fsync_enabled: false,
                verify_checksums: true,
            })
            .unwrap(),
        );
        let pool = Arc::new(BufferPool::new(BufferPoolConfig { num_frames: 64 }));
        Arc::new(PageStore::new(disk, pool))
    }

    fn drain<S: EntryScan>(scan: &mut S) -> Vec<(Value, u64)> {
        let mut out = Vec::new();
        while let Some(entry) = scan.next_entry().unwrap() {
            out.push((entry.key, entry.rid.0));
        }
        scan.close().unwrap();
        out
    }

    #[test]
    fn test_file_naming_convention() {
        assert_eq!(BitmapIndex::file_name("orders", 2), "orders.bitmap2");
        assert_eq!(
            CompressedBitmapIndex::file_name("orders", 2),
            "orders.cbitmap2"
        );
        assert_eq!(KeyIndex::file_name("orders", 2), "orders.index2");
    }

    #[test]
    fn test_open_missing_bitmap_fails() {
        let dir = tempdir().unwrap();
        let err = BitmapIndex::open(store(dir.path()), "ghost", 1).unwrap_err();
        assert!(matches!(err, OspreyError::FileNotFound(name) if name == "ghost.bitmap1"));
    }

    #[test]
    fn test_bitmap_scan_yields_typed_entries() {
        let dir = tempdir().unwrap();
        let index = BitmapIndex::create(store(dir.path()), "t", 1, AttrType::Int).unwrap();
        index.insert(&Value::Int(20), Rid(1)).unwrap();
        index.insert(&Value::Int(10), Rid(0)).unwrap();
        index.insert(&Value::Int(20), Rid(2)).unwrap();

        let mut scan = index.open_scan(None, None).unwrap();
        let entries = drain(&mut scan);
        assert_eq!(
            entries,
            vec![
                (Value::Int(10), 0),
                (Value::Int(20), 1),
                (Value::Int(20), 2)
            ]
        );
    }

    #[test]
    fn test_compressed_scan_expands_runs() {
        let dir = tempdir().unwrap();
        let index =
            CompressedBitmapIndex::create(store(dir.path()), "t", 1, AttrType::Str).unwrap();
        index.insert_run(&Value::from("a"), Rid(0), 3).unwrap();
        index.insert_run(&Value::from("b"), Rid(3), 1).unwrap();
        index.insert_run(&Value::from("a"), Rid(10), 2).unwrap();

        let mut scan = index.open_scan(None, None).unwrap();
        let entries = drain(&mut scan);
        assert_eq!(
            entries,
            vec![
                (Value::from("a"), 0),
                (Value::from("a"), 1),
                (Value::from("a"), 2),
                (Value::from("a"), 10),
                (Value::from("a"), 11),
                (Value::from("b"), 3),
            ]
        );
    }

    #[test]
    fn test_compressed_scan_skips_empty_runs() {
        let dir = tempdir().unwrap();
        let index =
            CompressedBitmapIndex::create(store(dir.path()), "t", 1, AttrType::Int).unwrap();
        index.insert_run(&Value::Int(1), Rid(0), 0).unwrap();
        index.insert_run(&Value::Int(2), Rid(5), 1).unwrap();

        let mut scan = index.open_scan(None, None).unwrap();
        assert_eq!(drain(&mut scan), vec![(Value::Int(2), 5)]);
    }

    #[test]
    fn test_plain_and_compressed_agree_on_logical_content() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        let plain = BitmapIndex::create(store.clone(), "p", 1, AttrType::Int).unwrap();
        let compressed =
            CompressedBitmapIndex::create(store.clone(), "c", 1, AttrType::Int).unwrap();

        // Same logical content: key 1 -> rids 0..3, key 2 -> rids 3..5.
        for rid in 0..3 {
            plain.insert(&Value::Int(1), Rid(rid)).unwrap();
        }
        for rid in 3..5 {
            plain.insert(&Value::Int(2), Rid(rid)).unwrap();
        }
        compressed.insert_run(&Value::Int(1), Rid(0), 3).unwrap();
        compressed.insert_run(&Value::Int(2), Rid(3), 2).unwrap();

        let mut plain_scan = plain.open_scan(None, None).unwrap();
        let mut compressed_scan = compressed.open_scan(None, None).unwrap();
        assert_eq!(drain(&mut plain_scan), drain(&mut compressed_scan));
    }

    #[test]
    fn test_scan_bounds_apply_to_adapters() {
        let dir = tempdir().unwrap();
        let index = BitmapIndex::create(store(dir.path()), "t", 1, AttrType::Int).unwrap();
        for v in 1..=5 {
            index.insert(&Value::Int(v), Rid(v as u64)).unwrap();
        }

        let mut scan = index
            .open_scan(Some(&Value::Int(2)), Some(&Value::Int(4)))
            .unwrap();
        let keys: Vec<_> = drain(&mut scan).into_iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec![Value::Int(2), Value::Int(3), Value::Int(4)]);
    }

    #[test]
    fn test_payload_codecs_reject_garbage() {
        assert!(rid_from_payload(&[1, 2, 3]).is_err());
        assert!(run_from_payload(&[0; 8]).is_err());
        let (start, len) = run_from_payload(&run_payload(Rid(9), 4)).unwrap();
        assert_eq!((start, len), (Rid(9), 4));
    }
}
