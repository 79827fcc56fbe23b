use super::*;
use crate::table_space::TableSpace;
use rand::{prelude::random, rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use std::thread;

/// Surface the `log::debug!` growth line from rowid_map.rs under
/// `cargo test -- --nocapture`.
fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("debug"))
        .is_test(true)
        .try_init();
}

fn temp_dir(tag: &str) -> String {
    let mut p = std::env::temp_dir();
    p.push(format!("nvmdb.rowid_map_test.{}.{}", tag, std::process::id()));
    std::fs::remove_dir_all(&p).ok();
    p.to_str().unwrap().to_string()
}

#[test]
fn test_get_entry_missing_row_is_none_for_read() {
    let dir = temp_dir("missing");
    let ts = TableSpace::create(&dir, "heap").unwrap();
    ts.allocate_extent().unwrap();
    let map = RowIdMap::new(Arc::new(ts), 32);
    assert!(map.get_entry(7, true).is_none());
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_get_entry_materialises_and_is_stable() {
    let dir = temp_dir("materialise");
    let ts = TableSpace::create(&dir, "heap").unwrap();
    ts.allocate_extent().unwrap();
    ts.set_version_point(7, PersistentAddr(123)).unwrap();
    let map = RowIdMap::new(Arc::new(ts), 32);

    let entry = map.get_entry(7, true).expect("entry");
    assert!(entry.is_valid());
    assert_eq!(entry.persistent_addr(), PersistentAddr(123));

    // Second access returns the same stable address.
    let entry2 = map.get_entry(7, true).expect("entry");
    assert_eq!(entry2.persistent_addr(), PersistentAddr(123));
}

#[test]
fn test_growth_beyond_one_segment() {
    init_logging();
    let dir = temp_dir("growth");
    let ts = TableSpace::create(&dir, "heap").unwrap();
    ts.allocate_extent().unwrap();
    let far_row = (DEFAULT_SEG_LEN * 3 + 5) as RowId;
    ts.set_version_point(far_row, PersistentAddr(999)).unwrap();
    let map = RowIdMap::new(Arc::new(ts), 32);

    let entry = map.get_entry(far_row, true).expect("entry beyond first segment");
    assert_eq!(entry.persistent_addr(), PersistentAddr(999));
    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_concurrent_growth_never_loses_or_tears() {
    let dir = temp_dir("concurrent");
    let ts = TableSpace::create(&dir, "heap").unwrap();
    ts.allocate_extent().unwrap();
    let n_rows: u32 = (DEFAULT_SEG_LEN * 6) as u32;
    for r in 0..n_rows {
        ts.set_version_point(r, PersistentAddr((r as u64) + 1)).unwrap();
    }
    let map = Arc::new(RowIdMap::new(Arc::new(ts), 32));

    let mut handles = Vec::new();
    for t in 0..4u32 {
        let map = Arc::clone(&map);
        handles.push(thread::spawn(move || {
            for r in (t..n_rows).step_by(4) {
                let entry = map.get_entry(r, true).expect("entry");
                assert!(entry.is_valid());
                assert_eq!(entry.persistent_addr(), PersistentAddr((r as u64) + 1));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    std::fs::remove_dir_all(&dir).ok();
}

/// Randomized version of the growth race above: a seeded per-thread
/// access order (instead of a fixed stride) and a randomized row
/// count, so repeated runs exercise different growth-boundary
/// crossings (spec.md §8 "Row-id map": "growth never loses a
/// previously stored segment").
#[test]
fn test_random_access_order_never_loses_or_tears_through_growth() {
    let seed: u64 = random();
    println!("seed: {}", seed);
    let mut seeder = StdRng::seed_from_u64(seed);

    let dir = temp_dir("random_concurrent");
    let ts = TableSpace::create(&dir, "heap").unwrap();
    ts.allocate_extent().unwrap();
    let n_rows: u32 = DEFAULT_SEG_LEN as u32 * (2 + seeder.gen_range(0..5));
    for r in 0..n_rows {
        ts.set_version_point(r, PersistentAddr((r as u64) + 1)).unwrap();
    }
    let map = Arc::new(RowIdMap::new(Arc::new(ts), 32));

    let mut handles = Vec::new();
    for t in 0..4u64 {
        let map = Arc::clone(&map);
        let mut order: Vec<u32> = (0..n_rows).collect();
        let mut rng = StdRng::seed_from_u64(seed.wrapping_add(t));
        for i in (1..order.len()).rev() {
            let j = rng.gen_range(0..=i);
            order.swap(i, j);
        }
        handles.push(thread::spawn(move || {
            for r in order {
                let entry = map.get_entry(r, true).expect("entry");
                assert!(entry.is_valid());
                assert_eq!(entry.persistent_addr(), PersistentAddr((r as u64) + 1));
            }
        }));
    }
    for h in handles {
        h.join().unwrap();
    }
    std::fs::remove_dir_all(&dir).ok();
}
