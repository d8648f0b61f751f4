#![no_main]

use libfuzzer_sys::fuzz_target;
use phar_rs::{ArchiveReader, Phar, Registry};
use std::io::Write;
use tempfile::NamedTempFile;

fuzz_target!(|data: &[u8]| {
    // Parsing in memory should never panic
    let reader = match ArchiveReader::from_bytes(data.to_vec()) {
        Ok(r) => r,
        Err(_) => return, // Expected for invalid data
    };

    let _ = reader.entry_count();
    let _ = reader.alias();
    let _: Vec<&str> = reader.list_files().collect();

    // Lazy decode of every entry should never panic either
    let loaded = reader.into_loaded();
    for entry in loaded.store.iter() {
        let _ = entry.content();
    }

    // Full open path through the façade
    let mut temp_file = match NamedTempFile::new() {
        Ok(f) => f,
        Err(_) => return,
    };
    if temp_file.write_all(data).is_err() || temp_file.flush().is_err() {
        return;
    }

    let registry = Registry::new();
    let phar = match Phar::open(&registry, temp_file.path()) {
        Ok(p) => p,
        Err(_) => return,
    };

    let _ = phar.count();
    let _ = phar.children("");
    let _ = phar.exists("test.txt");
    let _ = phar.exists("");
    let _ = phar.exists("../../../etc/passwd");
    let _ = phar.metadata().map(|m| m.len());
});
