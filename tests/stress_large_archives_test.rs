//! Large Archive Stress Tests
//!
//! Tests for large archives, many entries, and deep trees.
//!
//! Run with: cargo test --test stress_large_archives_test -- --ignored --nocapture

use phar_rs::{Compression, Phar, Registry};
use std::time::Instant;

#[test]
#[ignore] // Run manually: cargo test test_500mb_archive -- --ignored
fn test_500mb_archive() {
    println!("\n🚀 Creating 500MB archive (50 × 10MB files)...");
    let start = Instant::now();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.phar");
    let registry = Registry::new();

    {
        let mut phar = Phar::open(&registry, &path).unwrap();
        phar.start_buffering();
        for i in 0..50 {
            phar.set(&format!("file{:03}.bin", i), vec![i as u8; 10 * 1024 * 1024])
                .unwrap();
        }
        phar.stop_buffering().unwrap();
    }
    let create_time = start.elapsed();

    let size_mb = std::fs::metadata(&path).unwrap().len() / 1024 / 1024;
    println!("  ✓ Archive created: {} MB", size_mb);
    println!("  ⏱ Creation time: {:?}", create_time);

    let read_start = Instant::now();
    let phar = Phar::open(&registry, &path).unwrap();
    assert_eq!(phar.count(), 50);
    for idx in [0, 25, 49] {
        let data = phar.get(&format!("file{:03}.bin", idx)).unwrap().content().unwrap();
        assert_eq!(data.len(), 10 * 1024 * 1024);
        assert_eq!(data[0], idx as u8);
    }
    println!("  ⏱ Read time: {:?}", read_start.elapsed());
}

#[test]
#[ignore] // Run manually: cargo test test_10k_small_files -- --ignored
fn test_10k_small_files() {
    println!("\n🚀 Creating archive with 10,000 small files...");
    let start = Instant::now();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("many.phar");
    let registry = Registry::new();

    {
        let mut phar = Phar::open(&registry, &path).unwrap();
        phar.start_buffering();
        for i in 0..10_000 {
            phar.set(&format!("d{:02}/file{:05}.txt", i % 100, i), format!("content {}", i))
                .unwrap();
        }
        phar.compress_files(Compression::Gzip).unwrap();
        phar.stop_buffering().unwrap();
    }
    println!("  ⏱ Creation time: {:?}", start.elapsed());

    let phar = Phar::open(&registry, &path).unwrap();
    assert_eq!(phar.count(), 10_000);
    assert_eq!(phar.children("").unwrap().len(), 100);
    assert_eq!(
        phar.get("d42/file09942.txt").unwrap().content_string().unwrap(),
        "content 9942"
    );
}

#[test]
fn test_1000_files_regular() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("regular.phar");
    let registry = Registry::new();

    {
        let mut phar = Phar::open(&registry, &path).unwrap();
        phar.start_buffering();
        for i in 0..1000 {
            phar.set(&format!("file{}.txt", i), format!("data{}", i)).unwrap();
        }
        phar.stop_buffering().unwrap();
    }

    let phar = Phar::open(&registry, &path).unwrap();
    assert_eq!(phar.count(), 1000);

    // Insertion order survives the round trip
    let keys: Vec<String> = phar.iter().map(|e| e.path().to_string()).collect();
    let expected: Vec<String> = (0..1000).map(|i| format!("file{}.txt", i)).collect();
    assert_eq!(keys, expected);

    println!("✓ 1000 files round-tripped in order");
}

#[test]
fn test_deep_directory_structure() {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::new();
    let mut phar = Phar::open(&registry, dir.path().join("deep.phar")).unwrap();

    let deep: String = (0..100).map(|i| format!("level{}/", i)).collect();
    let key = format!("{}leaf.txt", deep);
    phar.set(&key, "bottom").unwrap();

    assert_eq!(phar.get(&key).unwrap().content().unwrap(), b"bottom");
    assert_eq!(phar.children("level0").unwrap().len(), 1);
    assert!(phar.children("level0").unwrap()[0].is_dir());

    let dest = dir.path().join("out");
    assert_eq!(phar.extract_to(&dest).unwrap(), 1);
    assert!(dest.join(&key).exists());
}

#[test]
fn test_many_small_files_baseline() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("baseline.phar");
    let registry = Registry::new();

    let start = Instant::now();
    {
        let mut phar = Phar::open(&registry, &path).unwrap();
        phar.start_buffering();
        for i in 0..500 {
            phar.set(&format!("f{}", i), vec![b'x'; 100]).unwrap();
        }
        phar.compress_files(Compression::Bzip2).unwrap();
        phar.stop_buffering().unwrap();
    }

    let phar = Phar::open(&registry, &path).unwrap();
    let total: usize = phar.files().map(|e| e.content().unwrap().len()).sum();
    assert_eq!(total, 500 * 100);
    println!("✓ 500 bzip2 entries in {:?}", start.elapsed());
}
