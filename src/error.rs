use std::io;
use thiserror::Error;

/// Result type for phar operations
pub type Result<T> = std::result::Result<T, PharError>;

/// Unified error type for all phar operations
#[derive(Debug, Error)]
pub enum PharError {
    // Entry errors
    #[error("Entry {0} does not exist")]
    EntryNotFound(String),

    #[error("Entry {0} already exists")]
    EntryExists(String),

    #[error("Entry {0} is a directory")]
    IsDirectory(String),

    #[error("Invalid entry path: {0}")]
    InvalidPath(String),

    // Archive errors
    #[error("{0}")]
    DuplicateArchive(String),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("Cannot unlink \"{0}\": archive is still open")]
    ArchiveInUse(String),

    #[error("Write operations are disabled by configuration")]
    ReadOnly,

    // Compression errors
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    #[error("Decode failed: {0}")]
    DecodeError(String),

    #[error("CRC mismatch for {path}: expected {expected:08x}, got {actual:08x}")]
    CrcMismatch {
        path: String,
        expected: u32,
        actual: u32,
    },

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for PharError {
    fn from(err: toml::de::Error) -> Self {
        PharError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for PharError {
    fn from(err: toml::ser::Error) -> Self {
        PharError::Config(err.to_string())
    }
}

impl PharError {
    /// Error raised when a converted archive would land on an already registered path
    pub(crate) fn converted_exists(path: &std::path::Path) -> Self {
        PharError::DuplicateArchive(format!(
            "Unable to add newly converted phar \"{}\" to the list of phars, a phar with that name already exists",
            path.display()
        ))
    }
}
