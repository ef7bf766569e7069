//! Access-layer integration tests: columnar relations and index scans
//! working together against real files through the buffer pool.

use std::sync::Arc;

use rand::seq::SliceRandom;

use osprey_buffer::{BufferPool, BufferPoolConfig};
use osprey_common::page::PageId;
use osprey_common::{AttrType, OspreyError, Value};
use osprey_storage::index::{
    BitmapIndex, CompressedBitmapIndex, EntryScan, IndexFile, RangeScan, ScanSource,
};
use osprey_storage::{ColumnDef, DiskManager, DiskManagerConfig, PageStore, Relation, Rid, Schema};
use tempfile::tempdir;

fn make_store(dir: &std::path::Path, frames: usize) -> Arc<PageStore> {
    let _ = env_logger::builder().is_test(true).try_init();
    let disk = Arc::new(
        DiskManager::new(DiskManagerConfig {
            data_dir: dir.to_path_buf(),
            fsync_enabled: false,
            verify_checksums: true,
        })
        .expect("disk manager"),
    );
    let pool = Arc::new(BufferPool::new(BufferPoolConfig { num_frames: frames }));
    Arc::new(PageStore::new(disk, pool))
}

fn total_pins(store: &Arc<PageStore>, file: osprey_storage::FileId) -> u32 {
    let pages = store.disk().num_pages(file).expect("num_pages");
    (0..pages)
        .filter_map(|n| store.pool().pin_count(PageId::new(file.0, n)))
        .sum()
}

#[test]
fn relation_rows_resolve_through_index_entries() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path(), 64);

    let schema = Schema::new(vec![
        ColumnDef::new("id", AttrType::Int),
        ColumnDef::string("name", 16),
    ])
    .unwrap();
    let mut rel = Relation::create(store.clone(), "emp", schema).unwrap();
    let index = BitmapIndex::create(store.clone(), "emp", 1, AttrType::Int).unwrap();

    for (id, name) in [(3, "carol"), (1, "alice"), (2, "bob")] {
        let rid = rel
            .append(&[Value::Int(id), Value::from(name)])
            .unwrap();
        index.insert(&Value::Int(id), rid).unwrap();
    }

    // Pull entries in key order and resolve each rid back to its tuple.
    let mut scan = index.open_scan(None, None).unwrap();
    let mut names = Vec::new();
    while let Some(entry) = scan.next_entry().unwrap() {
        let tuple = rel.fetch(entry.rid).unwrap();
        assert_eq!(tuple.field(1).unwrap(), &entry.key);
        names.push(tuple.field(2).unwrap().to_string());
    }
    scan.close().unwrap();

    assert_eq!(names, vec!["alice", "bob", "carol"]);
}

#[test]
fn scan_state_survives_flush_and_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = make_store(dir.path(), 64);
        let index = IndexFile::create(store.clone(), "t.index1", AttrType::Str).unwrap();
        for (i, key) in ["delta", "alpha", "echo", "bravo", "charlie"].iter().enumerate() {
            index
                .insert(&Value::from(*key), &(i as u64).to_le_bytes())
                .unwrap();
        }
        store.flush().unwrap();
    }

    // A cold process opens the index and scans it from disk.
    let store = make_store(dir.path(), 64);
    let index = IndexFile::open(store, "t.index1").unwrap();
    let mut scan = RangeScan::open(&index, None, Some(&Value::from("charlie"))).unwrap();

    let mut keys = Vec::new();
    while let Some(entry) = scan.next().unwrap() {
        keys.push(index.decode_key(&entry.key).unwrap().to_string());
    }
    assert_eq!(keys, vec!["alpha", "bravo", "charlie"]);
}

#[test]
fn scan_of_large_index_works_in_a_tiny_pool() {
    let dir = tempdir().unwrap();
    // Pool far smaller than the index: pages must cycle in and out.
    let store = make_store(dir.path(), 8);
    let index = IndexFile::create(store.clone(), "big.index1", AttrType::Int).unwrap();

    let total = 5_000u64;
    let mut values: Vec<u64> = (0..total).collect();
    values.shuffle(&mut rand::thread_rng());
    for v in values {
        index
            .insert(&Value::Int(v as i64), &v.to_le_bytes())
            .unwrap();
    }

    let mut scan = RangeScan::open(&index, None, None).unwrap();
    let mut count = 0u64;
    let mut prev = i64::MIN;
    while let Some(entry) = scan.next().unwrap() {
        let Value::Int(v) = index.decode_key(&entry.key).unwrap() else {
            panic!("int index produced a non-int key");
        };
        assert!(v >= prev);
        prev = v;
        count += 1;
    }
    assert_eq!(count, total);
}

#[test]
fn closing_a_scan_mid_flight_releases_its_only_pin() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path(), 64);
    let index = IndexFile::create(store.clone(), "t.index1", AttrType::Int).unwrap();
    let file = store.open_file("t.index1").unwrap();
    for v in 0..100 {
        index.insert(&Value::Int(v), &[0u8; 8]).unwrap();
    }

    let mut scan = RangeScan::open(&index, None, None).unwrap();
    scan.next().unwrap();
    assert_eq!(total_pins(&store, file), 1);

    scan.close().unwrap();
    assert_eq!(total_pins(&store, file), 0);
}

#[test]
fn dropping_a_scan_releases_its_pin() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path(), 64);
    let index = IndexFile::create(store.clone(), "t.index1", AttrType::Int).unwrap();
    let file = store.open_file("t.index1").unwrap();
    index.insert(&Value::Int(1), &[0u8; 8]).unwrap();

    {
        let mut scan = RangeScan::open(&index, None, None).unwrap();
        scan.next().unwrap();
        assert_eq!(total_pins(&store, file), 1);
        // No explicit close: the scan goes out of scope holding a page.
    }
    assert_eq!(total_pins(&store, file), 0);
}

#[test]
fn delete_during_scan_persists_across_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = make_store(dir.path(), 64);
        let index = IndexFile::create(store.clone(), "t.index1", AttrType::Int).unwrap();
        for (i, v) in [10, 20, 20, 30].iter().enumerate() {
            index
                .insert(&Value::Int(*v), &(i as u64).to_le_bytes())
                .unwrap();
        }

        let mut scan = RangeScan::open(&index, None, None).unwrap();
        scan.next().unwrap(); // 10
        scan.next().unwrap(); // first 20
        scan.delete_current().unwrap();
        scan.close().unwrap();
        store.flush().unwrap();
    }

    let store = make_store(dir.path(), 64);
    let index = IndexFile::open(store, "t.index1").unwrap();
    assert_eq!(index.len(), 3);

    let mut scan = RangeScan::open(&index, None, None).unwrap();
    let mut payloads = Vec::new();
    while let Some(entry) = scan.next().unwrap() {
        payloads.push(u64::from_le_bytes(entry.payload.as_ref().try_into().unwrap()));
    }
    // Payload 1 (the first 20) is gone; the second 20 and neighbors remain.
    assert_eq!(payloads, vec![0, 2, 3]);
}

#[test]
fn bitmap_and_compressed_deliver_identical_entry_streams() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path(), 64);

    let plain = BitmapIndex::create(store.clone(), "p", 2, AttrType::Str).unwrap();
    let compressed = CompressedBitmapIndex::create(store.clone(), "c", 2, AttrType::Str).unwrap();

    // key "x" covers rids 0..4, key "y" covers rids 4..6
    for rid in 0..4 {
        plain.insert(&Value::from("x"), Rid(rid)).unwrap();
    }
    for rid in 4..6 {
        plain.insert(&Value::from("y"), Rid(rid)).unwrap();
    }
    compressed.insert_run(&Value::from("x"), Rid(0), 4).unwrap();
    compressed.insert_run(&Value::from("y"), Rid(4), 2).unwrap();

    let mut plain_entries = Vec::new();
    let mut scan = plain.open_scan(None, None).unwrap();
    while let Some(entry) = scan.next_entry().unwrap() {
        plain_entries.push((entry.key, entry.rid));
    }
    scan.close().unwrap();

    let mut compressed_entries = Vec::new();
    let mut scan = compressed.open_scan(None, None).unwrap();
    while let Some(entry) = scan.next_entry().unwrap() {
        compressed_entries.push((entry.key, entry.rid));
    }
    scan.close().unwrap();

    assert_eq!(plain_entries, compressed_entries);
}

#[test]
fn missing_index_file_aborts_setup() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path(), 16);

    let err = BitmapIndex::open(store.clone(), "orders", 3).unwrap_err();
    assert!(matches!(err, OspreyError::FileNotFound(name) if name == "orders.bitmap3"));

    let err = CompressedBitmapIndex::open(store, "orders", 3).unwrap_err();
    assert!(matches!(err, OspreyError::FileNotFound(name) if name == "orders.cbitmap3"));
}
