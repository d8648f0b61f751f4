use crate::archive::format::{read_exact, read_u16, read_u32, read_u64, FileHeader};
use crate::error::{PharError, Result};
use std::io::{Read, Write};

/// ENDR signature for the end record
pub const END_RECORD_SIGNATURE: [u8; 4] = [0x45, 0x4E, 0x44, 0x52]; // "ENDR"

/// End Record size in bytes (fixed)
pub const END_RECORD_SIZE: usize = 64;

/// End record (ENDR)
///
/// Located in the last 64 bytes of the container image. It repeats the
/// manifest location from the header so a truncated or half-written image
/// is rejected before any entry is parsed.
///
/// Structure (64 bytes fixed):
/// - Signature: "ENDR" (4 bytes)
/// - Version Major: uint16 (2 bytes)
/// - Version Minor: uint16 (2 bytes)
/// - Manifest Offset: uint64 (8 bytes)
/// - Manifest Size: uint64 (8 bytes)
/// - Entry Count: uint32 (4 bytes)
/// - Payload CRC32: uint32 (4 bytes)
/// - Reserved: 32 bytes
#[derive(Debug, Clone)]
pub struct EndRecord {
    pub version_major: u16,
    pub version_minor: u16,
    pub manifest_offset: u64,
    pub manifest_size: u64,
    pub entry_count: u32,
    pub payload_crc32: u32,
}

impl EndRecord {
    /// Build the end record matching a header
    pub fn for_header(header: &FileHeader, payload_crc32: u32) -> Self {
        Self {
            version_major: header.version_major,
            version_minor: header.version_minor,
            manifest_offset: header.manifest_offset,
            manifest_size: header.manifest_size,
            entry_count: header.entry_count,
            payload_crc32,
        }
    }

    /// Write end record to a writer
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<usize> {
        writer.write_all(&END_RECORD_SIGNATURE)?;
        writer.write_all(&self.version_major.to_le_bytes())?;
        writer.write_all(&self.version_minor.to_le_bytes())?;
        writer.write_all(&self.manifest_offset.to_le_bytes())?;
        writer.write_all(&self.manifest_size.to_le_bytes())?;
        writer.write_all(&self.entry_count.to_le_bytes())?;
        writer.write_all(&self.payload_crc32.to_le_bytes())?;
        writer.write_all(&[0u8; 32])?;

        Ok(END_RECORD_SIZE)
    }

    /// Read end record from a reader
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut sig = [0u8; 4];
        read_exact(&mut reader, &mut sig, "end record")?;
        if sig != END_RECORD_SIGNATURE {
            return Err(PharError::CorruptArchive(
                "invalid end record signature (expected ENDR)".to_string(),
            ));
        }

        let version_major = read_u16(&mut reader)?;
        let version_minor = read_u16(&mut reader)?;
        let manifest_offset = read_u64(&mut reader)?;
        let manifest_size = read_u64(&mut reader)?;
        let entry_count = read_u32(&mut reader)?;
        let payload_crc32 = read_u32(&mut reader)?;

        let mut reserved = [0u8; 32];
        read_exact(&mut reader, &mut reserved, "end record")?;

        Ok(Self {
            version_major,
            version_minor,
            manifest_offset,
            manifest_size,
            entry_count,
            payload_crc32,
        })
    }

    /// Validate end record matches header
    pub fn validate_against_header(&self, header: &FileHeader) -> Result<()> {
        if self.version_major != header.version_major || self.version_minor != header.version_minor
        {
            return Err(PharError::CorruptArchive(format!(
                "ENDR version mismatch: header v{}.{}, ENDR v{}.{}",
                header.version_major, header.version_minor, self.version_major, self.version_minor
            )));
        }

        if self.manifest_offset != header.manifest_offset
            || self.manifest_size != header.manifest_size
        {
            return Err(PharError::CorruptArchive(format!(
                "ENDR manifest location mismatch: header {}+{}, ENDR {}+{}",
                header.manifest_offset,
                header.manifest_size,
                self.manifest_offset,
                self.manifest_size
            )));
        }

        if self.entry_count != header.entry_count {
            return Err(PharError::CorruptArchive(format!(
                "ENDR entry count mismatch: header {}, ENDR {}",
                header.entry_count, self.entry_count
            )));
        }

        Ok(())
    }
}
