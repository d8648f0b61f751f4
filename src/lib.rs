//! phar-rs: single-file archive engine
//!
//! This library implements a Phar-style container that multiplexes named
//! entries inside one file, combining:
//! - An ordered entry store with O(1) lookup
//! - A self-describing manifest (entries are listed without decompressing content)
//! - Per-entry and whole-archive compression (DEFLATE/bzip2)
//! - Buffered writes committed with an atomic replace
//! - An explicit registry of open archives keyed by path and alias
//!
//! # Example
//!
//! ```no_run
//! use phar_rs::{Compression, Phar, Registry};
//!
//! let registry = Registry::new();
//! let mut phar = Phar::open(&registry, "example.phar")?;
//!
//! phar.start_buffering();
//! phar.set("index.php", "<?php echo 'hi';")?;
//! phar.add_empty_dir("assets")?;
//! phar.compress_files(Compression::Gzip)?;
//! phar.stop_buffering()?;
//!
//! let data = phar.get("index.php")?.content()?;
//! assert_eq!(data, b"<?php echo 'hi';");
//! # Ok::<(), phar_rs::PharError>(())
//! ```

// Core modules
pub mod archive;
pub mod config;
pub mod error;
pub mod metadata;
pub mod phar;
pub mod registry;
pub mod walker;

// Re-export commonly used types
pub use archive::{
    ArchiveFormat, ArchiveReader, ArchiveWriter, Compression, DirEntry, Entry, EntryKind,
    EntryStore, FileHeader, API_VERSION, FORMAT_VERSION_MAJOR, FORMAT_VERSION_MINOR, HEADER_SIZE,
    MAGIC_NUMBER, MAX_PATH_LENGTH,
};
pub use config::PharConfig;
pub use error::{PharError, Result};
pub use metadata::Metadata;
pub use phar::{normalize_key, OpenOptions, Phar};
pub use registry::{canonical_path, Registration, Registry};
pub use walker::{walk_directory, SourceEntry};
