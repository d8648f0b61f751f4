//! Path Traversal Prevention Tests
//!
//! Entry keys are normalized before they reach the store: separators are
//! unified, leading and empty components are dropped, and parent components
//! are refused. Extraction re-checks keys read from disk.

use phar_rs::{normalize_key, Phar, PharError, Registry, HEADER_SIZE, MAX_PATH_LENGTH};
use tempfile::TempDir;

/// Helper: registry plus an open archive inside a temp directory
fn open_archive(name: &str) -> (TempDir, Registry, Phar) {
    let dir = tempfile::tempdir().unwrap();
    let registry = Registry::new();
    let phar = Phar::open(&registry, dir.path().join(name)).unwrap();
    (dir, registry, phar)
}

#[test]
fn test_path_traversal_dot_dot() {
    println!("\n🔒 Testing path traversal with ../");

    let (_dir, _registry, mut phar) = open_archive("dotdot.phar");

    for key in ["../../etc/passwd", "a/../../b", "..", "a/..\\..\\b"] {
        assert!(
            matches!(phar.set(key, "malicious"), Err(PharError::InvalidPath(_))),
            "{} should be rejected",
            key
        );
    }
    assert!(phar.is_empty());

    println!("  ✅ Parent components rejected");
}

#[test]
fn test_absolute_paths_become_relative() {
    let (_dir, _registry, mut phar) = open_archive("absolute.phar");

    phar.set("/etc/passwd", "x").unwrap();
    phar.set("C:\\Windows\\system.ini", "y").unwrap();

    let keys: Vec<&str> = phar.iter().map(|e| e.path()).collect();
    assert_eq!(keys, vec!["etc/passwd", "C:/Windows/system.ini"]);
    assert!(phar.exists("etc/passwd"));
    assert!(phar.exists("/etc/passwd"));
}

#[test]
fn test_path_normalization() {
    assert_eq!(normalize_key("./a/./b//c/").unwrap(), "a/b/c");
    assert_eq!(normalize_key("a\\b\\c").unwrap(), "a/b/c");
    assert_eq!(normalize_key("...").unwrap(), "...");
    assert_eq!(normalize_key("a/.hidden").unwrap(), "a/.hidden");

    let (_dir, _registry, mut phar) = open_archive("normalize.phar");
    phar.set("dir//file.txt", "1").unwrap();
    phar.set("./dir/file.txt", "2").unwrap();

    // Both spellings name the same entry
    assert_eq!(phar.len(), 1);
    assert_eq!(phar.get("dir/file.txt").unwrap().content().unwrap(), b"2");
}

#[test]
fn test_empty_keys_rejected() {
    let (_dir, _registry, mut phar) = open_archive("empty.phar");

    for key in ["", "/", "./", "//", "."] {
        assert!(
            matches!(phar.set(key, "x"), Err(PharError::InvalidPath(_))),
            "{:?} should be rejected",
            key
        );
    }
    assert!(matches!(phar.add_empty_dir(""), Err(PharError::InvalidPath(_))));
    assert!(!phar.exists(""));
}

#[test]
fn test_path_length_overflow() {
    let (_dir, _registry, mut phar) = open_archive("long.phar");

    let ok = "a".repeat(MAX_PATH_LENGTH);
    phar.set(&ok, "fits").unwrap();

    let too_long = "a".repeat(MAX_PATH_LENGTH + 1);
    assert!(matches!(phar.set(&too_long, "x"), Err(PharError::InvalidPath(_))));
}

#[test]
fn test_path_with_special_characters() {
    let (dir, registry, mut phar) = open_archive("special.phar");
    let path = phar.path().to_path_buf();

    let keys = ["file with spaces.txt", "ünïcödé/文件.txt", "semi;colon", "tab\tname"];
    for key in keys {
        phar.set(key, key).unwrap();
    }
    drop(phar);

    let phar = Phar::open(&registry, &path).unwrap();
    for key in keys {
        assert_eq!(phar.get(key).unwrap().content_string().unwrap(), key);
    }
    drop(dir);
}

#[test]
fn test_path_case_sensitivity() {
    let (_dir, _registry, mut phar) = open_archive("case.phar");

    phar.set("File.txt", "upper").unwrap();
    phar.set("file.txt", "lower").unwrap();

    assert_eq!(phar.count(), 2);
    assert_eq!(phar.get("File.txt").unwrap().content().unwrap(), b"upper");
}

#[test]
fn test_extract_refuses_forged_keys() {
    println!("\n🔒 Testing extraction of a forged ../ key");

    let (dir, registry, mut phar) = open_archive("forged.phar");
    let path = phar.path().to_path_buf();
    phar.set("aaaaaaaa", "payload").unwrap();
    drop(phar);

    // Rewrite the stored key in place and fix the manifest CRC
    let mut bytes = std::fs::read(&path).unwrap();
    let key_at = HEADER_SIZE + 4 + 2 + 5 + 44;
    assert_eq!(&bytes[key_at..key_at + 8], b"aaaaaaaa");
    bytes[key_at..key_at + 8].copy_from_slice(b"../evil!");
    let manifest_size = u64::from_le_bytes(bytes[28..36].try_into().unwrap()) as usize;
    let crc = crc32fast::hash(&bytes[HEADER_SIZE..HEADER_SIZE + manifest_size]);
    bytes[56..60].copy_from_slice(&crc.to_le_bytes());
    std::fs::write(&path, bytes).unwrap();

    let phar = Phar::open(&registry, &path).unwrap();
    let dest = dir.path().join("out");
    assert!(matches!(phar.extract_to(&dest), Err(PharError::InvalidPath(_))));
    assert!(!dir.path().join("evil!").exists());

    println!("  ✅ Forged key refused at extraction");
}
