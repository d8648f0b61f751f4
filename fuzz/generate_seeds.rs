//! Generate seed corpus for fuzzing

use phar_rs::{Compression, OpenOptions, Phar, Registry};
use std::collections::HashMap;
use std::fs;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let corpus_dir = "fuzz/corpus/fuzz_archive_parse";
    fs::create_dir_all(corpus_dir)?;

    println!("Generating seed corpus...");
    let registry = Registry::new();

    // Seed 1: Empty archive (no entries)
    {
        let path = format!("{}/seed_empty.phar", corpus_dir);
        let mut phar = Phar::open(&registry, &path)?;
        phar.start_buffering();
        phar.stop_buffering()?;
        println!("✓ Generated: {}", path);
    }

    // Seed 2: Single small file with alias
    {
        let path = format!("{}/seed_single_small.phar", corpus_dir);
        let mut phar = OpenOptions::new().alias("seed.phar").open(&registry, &path)?;
        phar.set("test.txt", "Hello, World!")?;
        println!("✓ Generated: {}", path);
    }

    // Seed 3: Files, an empty directory and metadata
    {
        let path = format!("{}/seed_multi.phar", corpus_dir);
        let mut phar = Phar::open(&registry, &path)?;
        phar.start_buffering();
        phar.set("file1.txt", "First file")?;
        phar.set("dir/file2.txt", "Second file in directory")?;
        phar.add_empty_dir("empty")?;
        phar.set_metadata(&HashMap::from([("bootstrap", "file1.txt")]))?;
        phar.set_entry_metadata("file1.txt", &42)?;
        phar.stop_buffering()?;
        println!("✓ Generated: {}", path);
    }

    // Seeds 4 and 5: Per-entry GZIP and BZIP2
    for codec in [Compression::Gzip, Compression::Bzip2] {
        let path = format!("{}/seed_entries_{}.phar", corpus_dir, codec.name());
        let mut phar = Phar::open(&registry, &path)?;
        phar.start_buffering();
        phar.set("large.txt", b"This is test data for compression. ".repeat(1000))?;
        phar.set("binary.bin", (0..=255u8).collect::<Vec<u8>>())?;
        phar.compress_files(codec)?;
        phar.stop_buffering()?;
        println!("✓ Generated: {}", path);
    }

    // Seeds 6 and 7: Whole-archive wrappers
    {
        let path = format!("{}/seed_container.phar", corpus_dir);
        let mut phar = Phar::open(&registry, &path)?;
        phar.set("a.txt", "wrapped")?;
        for codec in [Compression::Gzip, Compression::Bzip2] {
            let converted = phar.compress(codec)?;
            println!("✓ Generated: {}", converted.path().display());
        }
    }

    println!("\nGenerated 7 seed files in {}", corpus_dir);
    Ok(())
}
