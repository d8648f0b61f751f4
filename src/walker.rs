//! Directory walker feeding `Phar::build_from_iter`
//!
//! The archive engine never resolves host paths itself; it consumes
//! `SourceEntry` items. `walk_directory` is the filesystem-backed producer.

use crate::error::{PharError, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One item produced by a directory walker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEntry {
    /// File content under a root-relative key
    File { path: String, data: Vec<u8> },
    /// Empty directory to be preserved as a marker
    Directory { path: String },
}

impl SourceEntry {
    pub fn path(&self) -> &str {
        match self {
            SourceEntry::File { path, .. } | SourceEntry::Directory { path } => path,
        }
    }
}

/// Lazily walk `root`, yielding files and empty directories
///
/// Keys are relative to `root` and use `/` separators. Entries are sorted
/// by file name for a stable archive order; symlinks are not followed.
/// File contents are read only when the item is pulled.
pub fn walk_directory<P: AsRef<Path>>(root: P) -> impl Iterator<Item = Result<SourceEntry>> {
    let root: PathBuf = root.as_ref().to_path_buf();

    WalkDir::new(&root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_map(move |item| {
            let entry = match item {
                Ok(entry) => entry,
                Err(e) => return Some(Err(walk_error(e))),
            };

            let key = match relative_key(&root, entry.path()) {
                Ok(key) => key,
                Err(e) => return Some(Err(e)),
            };

            let file_type = entry.file_type();
            if file_type.is_file() {
                match std::fs::read(entry.path()) {
                    Ok(data) => Some(Ok(SourceEntry::File { path: key, data })),
                    Err(e) => Some(Err(PharError::from(e))),
                }
            } else if file_type.is_dir() {
                match is_empty_dir(entry.path()) {
                    Ok(true) => Some(Ok(SourceEntry::Directory { path: key })),
                    Ok(false) => None,
                    Err(e) => Some(Err(e)),
                }
            } else {
                None
            }
        })
}

fn relative_key(root: &Path, path: &Path) -> Result<String> {
    let relative = path.strip_prefix(root).map_err(|_| {
        PharError::InvalidPath(format!(
            "{} is outside {}",
            path.display(),
            root.display()
        ))
    })?;
    Ok(relative.to_string_lossy().replace('\\', "/"))
}

fn is_empty_dir(path: &Path) -> Result<bool> {
    Ok(std::fs::read_dir(path)?.next().is_none())
}

fn walk_error(err: walkdir::Error) -> PharError {
    match err.into_io_error() {
        Some(io) => PharError::Io(io),
        None => PharError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "filesystem loop while walking directory",
        )),
    }
}
