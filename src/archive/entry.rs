use crate::archive::codec;
use crate::archive::format::Compression;
use crate::error::{PharError, Result};
use crate::metadata::Metadata;
use std::cell::OnceCell;
use std::time::{SystemTime, UNIX_EPOCH};

/// What an entry holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EntryKind {
    File = 0,
    Directory = 1,
}

impl EntryKind {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::File),
            1 => Ok(Self::Directory),
            _ => Err(PharError::CorruptArchive(format!(
                "unknown entry kind {}",
                value
            ))),
        }
    }
}

/// One named file or empty-directory marker inside an archive
///
/// `stored` holds the payload exactly as it sits in the container. For
/// compressed entries the logical content is decoded on first access and
/// cached, so enumerating an opened archive never inflates anything.
#[derive(Debug, Clone)]
pub struct Entry {
    path: String,
    kind: EntryKind,
    compression: Compression,
    stored: Vec<u8>,
    decoded: OnceCell<Vec<u8>>,
    uncompressed_size: u64,
    crc32: u32,
    modified_time: u64,
    metadata: Option<Metadata>,
}

impl Entry {
    /// Create an uncompressed file entry
    pub fn file(path: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::File,
            compression: Compression::None,
            uncompressed_size: data.len() as u64,
            crc32: crc32fast::hash(&data),
            stored: data,
            decoded: OnceCell::new(),
            modified_time: now(),
            metadata: None,
        }
    }

    /// Create an empty-directory marker
    pub fn directory(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: EntryKind::Directory,
            compression: Compression::None,
            stored: Vec::new(),
            decoded: OnceCell::new(),
            uncompressed_size: 0,
            crc32: 0,
            modified_time: now(),
            metadata: None,
        }
    }

    /// Rebuild an entry from its manifest fields and stored payload
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        path: String,
        kind: EntryKind,
        compression: Compression,
        stored: Vec<u8>,
        uncompressed_size: u64,
        crc32: u32,
        modified_time: u64,
        metadata: Option<Metadata>,
    ) -> Self {
        Self {
            path,
            kind,
            compression,
            stored,
            decoded: OnceCell::new(),
            uncompressed_size,
            crc32,
            modified_time,
            metadata,
        }
    }

    /// Key of this entry inside the archive
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Last path component
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    /// Codec applied to this entry's payload
    pub fn compression(&self) -> Compression {
        self.compression
    }

    /// Whether the payload carries any compression
    pub fn is_compressed(&self) -> bool {
        self.compression != Compression::None
    }

    /// Whether `codec` is the compression in effect
    pub fn is_compressed_with(&self, codec: Compression) -> bool {
        codec != Compression::None && self.compression == codec
    }

    /// Logical (decompressed) size
    pub fn uncompressed_size(&self) -> u64 {
        self.uncompressed_size
    }

    /// Size of the payload as stored in the container
    pub fn compressed_size(&self) -> u64 {
        self.stored.len() as u64
    }

    /// CRC32 of the logical content
    pub fn crc32(&self) -> u32 {
        self.crc32
    }

    /// Modification time (Unix epoch seconds)
    pub fn modified_time(&self) -> u64 {
        self.modified_time
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata.is_some()
    }

    /// Logical content of a file entry
    pub fn content(&self) -> Result<&[u8]> {
        if self.is_dir() {
            return Err(PharError::IsDirectory(self.path.clone()));
        }

        if self.compression == Compression::None {
            return Ok(&self.stored);
        }

        if let Some(data) = self.decoded.get() {
            return Ok(data);
        }

        let data = codec::decode(&self.stored, self.compression, self.uncompressed_size)?;
        let actual = crc32fast::hash(&data);
        if actual != self.crc32 {
            return Err(PharError::CrcMismatch {
                path: self.path.clone(),
                expected: self.crc32,
                actual,
            });
        }

        Ok(self.decoded.get_or_init(|| data))
    }

    /// Logical content as UTF-8 text
    pub fn content_string(&self) -> Result<String> {
        let data = self.content()?;
        String::from_utf8(data.to_vec())
            .map_err(|e| PharError::DecodeError(format!("{} is not UTF-8: {}", self.path, e)))
    }

    pub(crate) fn stored(&self) -> &[u8] {
        &self.stored
    }

    /// Copy of this entry with its payload re-encoded under `codec`
    ///
    /// Directory markers carry no payload and are returned unchanged.
    pub(crate) fn recompressed(&self, codec: Compression, level: u32) -> Result<Self> {
        if self.is_dir() || self.compression == codec {
            return Ok(self.clone());
        }

        let content = self.content()?.to_vec();
        let (stored, decoded) = match codec {
            Compression::None => (content, OnceCell::new()),
            _ => (codec::encode(&content, codec, level)?, OnceCell::from(content)),
        };

        Ok(Self {
            compression: codec,
            stored,
            decoded,
            ..self.clone_header()
        })
    }

    /// Copy of this entry under a new key
    pub(crate) fn renamed(&self, path: String) -> Self {
        Self {
            path,
            ..self.clone()
        }
    }

    /// Copy of this entry with replaced metadata
    pub(crate) fn with_metadata(&self, metadata: Option<Metadata>) -> Self {
        Self {
            metadata,
            ..self.clone()
        }
    }

    fn clone_header(&self) -> Self {
        Self {
            path: self.path.clone(),
            kind: self.kind,
            compression: self.compression,
            stored: Vec::new(),
            decoded: OnceCell::new(),
            uncompressed_size: self.uncompressed_size,
            crc32: self.crc32,
            modified_time: self.modified_time,
            metadata: self.metadata.clone(),
        }
    }
}

/// Child of a directory, as listed by `Phar::children`
///
/// Implicit directories (a prefix of some key with no marker of its own)
/// are synthesized with no backing entry.
#[derive(Debug, Clone)]
pub struct DirEntry<'a> {
    path: String,
    entry: Option<&'a Entry>,
}

impl<'a> DirEntry<'a> {
    pub(crate) fn backed(entry: &'a Entry) -> Self {
        Self {
            path: entry.path().to_string(),
            entry: Some(entry),
        }
    }

    pub(crate) fn synthesized(path: String) -> Self {
        Self { path, entry: None }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn is_dir(&self) -> bool {
        self.entry.map_or(true, Entry::is_dir)
    }

    /// Backing entry, `None` for synthesized directories
    pub fn entry(&self) -> Option<&'a Entry> {
        self.entry
    }
}

fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
