//! Manifest block
//!
//! The manifest sits between the header and the payload region and indexes
//! every entry, so an archive can be opened and enumerated without touching
//! (or inflating) entry payloads.
//!
//! ```text
//! Manifest:
//!   Record Count: uint32
//!   Alias Length: uint16, Alias: UTF-8 (length 0 = no alias)
//!   Metadata: uint8 present flag, uint32 length, bytes
//!   Entry Records...
//!
//! Entry Record (variable length):
//!   Signature: "ENTR" (4 bytes)
//!   Data Offset: uint64 (relative to payload region)
//!   Uncompressed Size: uint64
//!   Stored Size: uint64
//!   CRC32: uint32 (of logical content)
//!   Modified Timestamp: uint64
//!   Compression: uint8 (0 none, 1 gzip, 2 bzip2)
//!   Kind: uint8 (0 file, 1 directory)
//!   Path Length: uint16, Path: UTF-8
//!   Metadata: uint8 present flag, uint32 length, bytes
//! ```

use crate::archive::entry::EntryKind;
use crate::archive::format::{
    read_exact, read_u16, read_u32, read_u64, read_u8, Compression, MAX_PATH_LENGTH,
};
use crate::error::{PharError, Result};
use crate::metadata::Metadata;
use std::io::{Cursor, Read, Write};

/// ENTR signature for manifest entry records
pub const ENTRY_RECORD_SIGNATURE: [u8; 4] = [0x45, 0x4E, 0x54, 0x52]; // "ENTR"

/// Manifest description of one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRecord {
    pub path: String,
    pub data_offset: u64,
    pub uncompressed_size: u64,
    pub stored_size: u64,
    pub crc32: u32,
    pub modified_time: u64,
    pub compression: Compression,
    pub kind: EntryKind,
    pub metadata: Option<Metadata>,
}

impl EntryRecord {
    /// Write record to the manifest
    pub fn write_to<W: Write>(&self, mut writer: W) -> Result<()> {
        writer.write_all(&ENTRY_RECORD_SIGNATURE)?;
        writer.write_all(&self.data_offset.to_le_bytes())?;
        writer.write_all(&self.uncompressed_size.to_le_bytes())?;
        writer.write_all(&self.stored_size.to_le_bytes())?;
        writer.write_all(&self.crc32.to_le_bytes())?;
        writer.write_all(&self.modified_time.to_le_bytes())?;
        writer.write_all(&[self.compression as u8, self.kind as u8])?;

        let path_bytes = self.path.as_bytes();
        if path_bytes.len() > MAX_PATH_LENGTH {
            return Err(PharError::InvalidPath(format!(
                "path too long: {} bytes (max {})",
                path_bytes.len(),
                MAX_PATH_LENGTH
            )));
        }
        writer.write_all(&(path_bytes.len() as u16).to_le_bytes())?;
        writer.write_all(path_bytes)?;

        write_blob(&mut writer, self.metadata.as_ref())
    }

    /// Read record from the manifest
    pub fn read_from<R: Read>(mut reader: R) -> Result<Self> {
        let mut sig = [0u8; 4];
        read_exact(&mut reader, &mut sig, "entry record")?;
        if sig != ENTRY_RECORD_SIGNATURE {
            return Err(PharError::CorruptArchive(
                "invalid entry record signature (expected ENTR)".to_string(),
            ));
        }

        let data_offset = read_u64(&mut reader)?;
        let uncompressed_size = read_u64(&mut reader)?;
        let stored_size = read_u64(&mut reader)?;
        let crc32 = read_u32(&mut reader)?;
        let modified_time = read_u64(&mut reader)?;
        let compression = Compression::from_u8(read_u8(&mut reader)?)?;
        let kind = EntryKind::from_u8(read_u8(&mut reader)?)?;

        let path_len = read_u16(&mut reader)?;
        let mut path_buf = vec![0u8; path_len as usize];
        read_exact(&mut reader, &mut path_buf, "entry path")?;
        let path = String::from_utf8(path_buf).map_err(|e| {
            PharError::CorruptArchive(format!("invalid UTF-8 in entry path: {}", e))
        })?;

        let metadata = read_blob(&mut reader)?;

        Ok(Self {
            path,
            data_offset,
            uncompressed_size,
            stored_size,
            crc32,
            modified_time,
            compression,
            kind,
            metadata,
        })
    }
}

/// Decoded manifest block
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    pub alias: Option<String>,
    pub metadata: Option<Metadata>,
    pub records: Vec<EntryRecord>,
}

impl Manifest {
    /// Serialize the manifest block
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.write_all(&(self.records.len() as u32).to_le_bytes())?;

        let alias = self.alias.as_deref().unwrap_or("").as_bytes();
        if alias.len() > MAX_PATH_LENGTH {
            return Err(PharError::InvalidPath(format!(
                "alias too long: {} bytes",
                alias.len()
            )));
        }
        buf.write_all(&(alias.len() as u16).to_le_bytes())?;
        buf.write_all(alias)?;

        write_blob(&mut buf, self.metadata.as_ref())?;

        for record in &self.records {
            record.write_to(&mut buf)?;
        }
        Ok(buf)
    }

    /// Parse a manifest block
    ///
    /// `expected_entries` comes from the header; any disagreement, unknown
    /// tag, short read, or trailing byte fails with `CorruptArchive`.
    pub fn from_bytes(bytes: &[u8], expected_entries: u32) -> Result<Self> {
        let mut cursor = Cursor::new(bytes);

        let count = read_u32(&mut cursor)?;
        if count != expected_entries {
            return Err(PharError::CorruptArchive(format!(
                "entry count mismatch: header {}, manifest {}",
                expected_entries, count
            )));
        }

        let alias_len = read_u16(&mut cursor)?;
        let mut alias_buf = vec![0u8; alias_len as usize];
        read_exact(&mut cursor, &mut alias_buf, "alias")?;
        let alias = match alias_len {
            0 => None,
            _ => Some(String::from_utf8(alias_buf).map_err(|e| {
                PharError::CorruptArchive(format!("invalid UTF-8 in alias: {}", e))
            })?),
        };

        let metadata = read_blob(&mut cursor)?;

        // Each record is at least 48 bytes; cap the reservation accordingly
        let max_records = bytes.len() / 48;
        let mut records = Vec::with_capacity((count as usize).min(max_records));
        for _ in 0..count {
            records.push(EntryRecord::read_from(&mut cursor)?);
        }

        if cursor.position() != bytes.len() as u64 {
            return Err(PharError::CorruptArchive(format!(
                "{} trailing bytes after manifest",
                bytes.len() as u64 - cursor.position()
            )));
        }

        Ok(Self {
            alias,
            metadata,
            records,
        })
    }
}

fn write_blob<W: Write>(mut writer: W, blob: Option<&Metadata>) -> Result<()> {
    match blob {
        Some(metadata) => {
            writer.write_all(&[1])?;
            writer.write_all(&(metadata.len() as u32).to_le_bytes())?;
            writer.write_all(metadata.as_bytes())?;
        }
        None => {
            writer.write_all(&[0])?;
            writer.write_all(&0u32.to_le_bytes())?;
        }
    }
    Ok(())
}

fn read_blob<R: Read>(mut reader: R) -> Result<Option<Metadata>> {
    let present = read_u8(&mut reader)?;
    let len = read_u32(&mut reader)?;
    match present {
        0 if len == 0 => Ok(None),
        1 => {
            let mut buf = Vec::new();
            reader
                .take(len as u64)
                .read_to_end(&mut buf)
                .map_err(|_| PharError::CorruptArchive("truncated metadata".to_string()))?;
            if buf.len() != len as usize {
                return Err(PharError::CorruptArchive("truncated metadata".to_string()));
            }
            Ok(Some(Metadata::from_bytes(buf)))
        }
        _ => Err(PharError::CorruptArchive(format!(
            "invalid metadata marker {} (length {})",
            present, len
        ))),
    }
}
