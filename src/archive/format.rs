use crate::error::{PharError, Result};
use std::io::{Read, Write};
use std::path::Path;

/// Magic number: 0x89 'P' 'H' 'R' 0x0D 0x0A 0x1A 0x0A
/// Follows PNG pattern for corruption detection
pub const MAGIC_NUMBER: [u8; 8] = [0x89, b'P', b'H', b'R', 0x0D, 0x0A, 0x1A, 0x0A];

/// Current container format version
pub const FORMAT_VERSION_MAJOR: u16 = 1;
pub const FORMAT_VERSION_MINOR: u16 = 0;

/// Header size in bytes
pub const HEADER_SIZE: usize = 64;

/// Maximum entry key length in bytes (UTF-8)
pub const MAX_PATH_LENGTH: usize = u16::MAX as usize;

/// Compatibility tag reported by `Phar::api_version`
pub const API_VERSION: &str = "1.1.1";

/// Compression codecs, shared by entries and whole-archive wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Compression {
    #[default]
    None = 0,
    Gzip = 1,
    Bzip2 = 2,
}

impl Compression {
    /// Public flag value for `None`
    pub const NONE: u32 = 0x0000;
    /// Public flag value for `Gzip`
    pub const GZ: u32 = 0x1000;
    /// Public flag value for `Bzip2`
    pub const BZ2: u32 = 0x2000;

    /// Decode the manifest tag byte
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(Self::None),
            1 => Ok(Self::Gzip),
            2 => Ok(Self::Bzip2),
            _ => Err(PharError::CorruptArchive(format!(
                "unknown compression tag {}",
                value
            ))),
        }
    }

    /// Decode a public flag value (`NONE`, `GZ`, `BZ2`)
    pub fn from_flag(flag: u32) -> Result<Self> {
        match flag {
            Self::NONE => Ok(Self::None),
            Self::GZ => Ok(Self::Gzip),
            Self::BZ2 => Ok(Self::Bzip2),
            other => Err(PharError::UnsupportedCompression(format!(
                "unknown compression flag {:#06x}",
                other
            ))),
        }
    }

    /// Public flag value of this codec
    pub fn flag(self) -> u32 {
        match self {
            Self::None => Self::NONE,
            Self::Gzip => Self::GZ,
            Self::Bzip2 => Self::BZ2,
        }
    }

    /// File name suffix a whole-archive wrapper appends
    pub fn extension(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::Gzip => Some("gz"),
            Self::Bzip2 => Some("bz2"),
        }
    }

    /// Whether the codec was compiled into this build
    pub fn is_available(self) -> bool {
        match self {
            Self::None => true,
            Self::Gzip => cfg!(feature = "gzip"),
            Self::Bzip2 => cfg!(feature = "bzip2"),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Bzip2 => "bzip2",
        }
    }
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Container flavour recorded in the header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum ArchiveFormat {
    #[default]
    Phar = 1,
    Tar = 2,
    Zip = 3,
}

impl ArchiveFormat {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Phar),
            2 => Ok(Self::Tar),
            3 => Ok(Self::Zip),
            _ => Err(PharError::CorruptArchive(format!(
                "unknown archive format tag {}",
                value
            ))),
        }
    }

    /// Infer the format from a file name such as `app.tar.phar` or `app.zip`
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        let parts: Vec<&str> = name.split('.').skip(1).collect();

        if parts.contains(&"tar") {
            Self::Tar
        } else if parts.contains(&"zip") {
            Self::Zip
        } else {
            Self::Phar
        }
    }
}

/// Fixed-size header at the beginning of the container image
///
/// Layout (64 bytes):
/// - Magic: 8 bytes
/// - Version Major / Minor: uint16 each
/// - Flags: uint32
/// - Archive Format: uint8, then 3 reserved bytes
/// - Manifest Offset / Size: uint64 each
/// - Payload Offset / Size: uint64 each
/// - Entry Count: uint32
/// - Manifest CRC32: uint32
/// - Reserved: 4 bytes
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub version_major: u16,
    pub version_minor: u16,
    pub flags: u32,
    pub format: ArchiveFormat,
    pub manifest_offset: u64,
    pub manifest_size: u64,
    pub payload_offset: u64,
    pub payload_size: u64,
    pub entry_count: u32,
    pub manifest_crc32: u32,
}

impl FileHeader {
    pub fn new(format: ArchiveFormat) -> Self {
        Self {
            version_major: FORMAT_VERSION_MAJOR,
            version_minor: FORMAT_VERSION_MINOR,
            flags: 0,
            format,
            manifest_offset: HEADER_SIZE as u64,
            manifest_size: 0,
            payload_offset: HEADER_SIZE as u64,
            payload_size: 0,
            entry_count: 0,
            manifest_crc32: 0,
        }
    }

    /// Write header to a writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&MAGIC_NUMBER)?;
        writer.write_all(&self.version_major.to_le_bytes())?;
        writer.write_all(&self.version_minor.to_le_bytes())?;
        writer.write_all(&self.flags.to_le_bytes())?;
        writer.write_all(&[self.format as u8, 0, 0, 0])?;
        writer.write_all(&self.manifest_offset.to_le_bytes())?;
        writer.write_all(&self.manifest_size.to_le_bytes())?;
        writer.write_all(&self.payload_offset.to_le_bytes())?;
        writer.write_all(&self.payload_size.to_le_bytes())?;
        writer.write_all(&self.entry_count.to_le_bytes())?;
        writer.write_all(&self.manifest_crc32.to_le_bytes())?;
        writer.write_all(&[0u8; 4])?;
        Ok(())
    }

    /// Read header from a reader
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut magic = [0u8; 8];
        read_exact(&mut reader, &mut magic, "header")?;

        if magic != MAGIC_NUMBER {
            return Err(PharError::CorruptArchive(
                "invalid magic number in archive header".to_string(),
            ));
        }

        let version_major = read_u16(&mut reader)?;
        let version_minor = read_u16(&mut reader)?;
        let flags = read_u32(&mut reader)?;

        let mut format_bytes = [0u8; 4];
        read_exact(&mut reader, &mut format_bytes, "header")?;
        let format = ArchiveFormat::from_u8(format_bytes[0])?;

        let manifest_offset = read_u64(&mut reader)?;
        let manifest_size = read_u64(&mut reader)?;
        let payload_offset = read_u64(&mut reader)?;
        let payload_size = read_u64(&mut reader)?;
        let entry_count = read_u32(&mut reader)?;
        let manifest_crc32 = read_u32(&mut reader)?;

        let mut reserved = [0u8; 4];
        read_exact(&mut reader, &mut reserved, "header")?;

        Ok(Self {
            version_major,
            version_minor,
            flags,
            format,
            manifest_offset,
            manifest_size,
            payload_offset,
            payload_size,
            entry_count,
            manifest_crc32,
        })
    }

    /// Validate version compatibility
    pub fn validate_version(&self) -> Result<()> {
        if self.version_major > FORMAT_VERSION_MAJOR {
            return Err(PharError::CorruptArchive(format!(
                "unsupported archive version {}.{}",
                self.version_major, self.version_minor
            )));
        }
        Ok(())
    }
}

// Helpers for reading primitive types out of in-memory images.
// Short reads mean a truncated archive, not an I/O failure.
pub(crate) fn read_exact<R: Read>(mut reader: R, buf: &mut [u8], what: &str) -> Result<()> {
    reader
        .read_exact(buf)
        .map_err(|_| PharError::CorruptArchive(format!("truncated {}", what)))
}

pub(crate) fn read_u8<R: Read>(mut reader: R) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact(&mut reader, &mut buf, "field")?;
    Ok(buf[0])
}

pub(crate) fn read_u16<R: Read>(mut reader: R) -> Result<u16> {
    let mut buf = [0u8; 2];
    read_exact(&mut reader, &mut buf, "field")?;
    Ok(u16::from_le_bytes(buf))
}

pub(crate) fn read_u32<R: Read>(mut reader: R) -> Result<u32> {
    let mut buf = [0u8; 4];
    read_exact(&mut reader, &mut buf, "field")?;
    Ok(u32::from_le_bytes(buf))
}

pub(crate) fn read_u64<R: Read>(mut reader: R) -> Result<u64> {
    let mut buf = [0u8; 8];
    read_exact(&mut reader, &mut buf, "field")?;
    Ok(u64::from_le_bytes(buf))
}
