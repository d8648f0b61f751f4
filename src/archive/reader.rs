use crate::archive::codec;
use crate::archive::end_record::{EndRecord, END_RECORD_SIZE};
use crate::archive::entry::Entry;
use crate::archive::format::{ArchiveFormat, Compression, FileHeader, HEADER_SIZE};
use crate::archive::manifest::Manifest;
use crate::archive::store::EntryStore;
use crate::error::{PharError, Result};
use crate::metadata::Metadata;
use std::path::Path;

/// Everything an archive needs after its file has been parsed
#[derive(Debug)]
pub struct LoadedArchive {
    pub format: ArchiveFormat,
    pub compression: Compression,
    pub alias: Option<String>,
    pub metadata: Option<Metadata>,
    pub store: EntryStore,
}

/// Parser for container files
///
/// The whole file is read into memory up front and the handle is closed
/// before parsing starts; entries keep their stored payloads and decode
/// lazily.
pub struct ArchiveReader {
    header: FileHeader,
    manifest: Manifest,
    image: Vec<u8>,
    compression: Compression,
}

impl ArchiveReader {
    /// Read and parse an archive file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    /// Parse an archive held in memory
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let (image, compression) = codec::unwrap(bytes).map_err(|e| match e {
            PharError::DecodeError(msg) => PharError::CorruptArchive(msg),
            other => other,
        })?;

        if image.len() < HEADER_SIZE + END_RECORD_SIZE {
            return Err(PharError::CorruptArchive(format!(
                "truncated image: {} bytes",
                image.len()
            )));
        }

        let header = FileHeader::read_from(&image[..HEADER_SIZE])?;
        header.validate_version()?;

        let end_offset = image.len() - END_RECORD_SIZE;
        let end_record = EndRecord::read_from(&image[end_offset..])?;
        end_record.validate_against_header(&header)?;

        let manifest_range = region(header.manifest_offset, header.manifest_size, end_offset)?;
        let payload_range = region(header.payload_offset, header.payload_size, end_offset)?;
        if manifest_range.start != HEADER_SIZE
            || payload_range.start != manifest_range.end
            || payload_range.end != end_offset
        {
            return Err(PharError::CorruptArchive(
                "manifest and payload regions do not tile the image".to_string(),
            ));
        }

        let manifest_bytes = &image[manifest_range];
        if crc32fast::hash(manifest_bytes) != header.manifest_crc32 {
            return Err(PharError::CorruptArchive(
                "manifest checksum mismatch".to_string(),
            ));
        }
        let manifest = Manifest::from_bytes(manifest_bytes, header.entry_count)?;

        if crc32fast::hash(&image[payload_range]) != end_record.payload_crc32 {
            return Err(PharError::CorruptArchive(
                "payload checksum mismatch".to_string(),
            ));
        }

        for record in &manifest.records {
            region(record.data_offset, record.stored_size, header.payload_size as usize)
                .map_err(|_| {
                    PharError::CorruptArchive(format!(
                        "entry {} points outside the payload region",
                        record.path
                    ))
                })?;
            if record.compression == Compression::None
                && record.stored_size != record.uncompressed_size
            {
                return Err(PharError::CorruptArchive(format!(
                    "entry {} is stored uncompressed but sizes differ ({} != {})",
                    record.path, record.stored_size, record.uncompressed_size
                )));
            }
        }

        Ok(Self {
            header,
            manifest,
            image,
            compression,
        })
    }

    /// Get archive header information
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Whole-archive wrapper detected while reading
    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn alias(&self) -> Option<&str> {
        self.manifest.alias.as_deref()
    }

    pub fn entry_count(&self) -> usize {
        self.manifest.records.len()
    }

    /// Entry keys in manifest order, without touching payloads
    pub fn list_files(&self) -> impl Iterator<Item = &str> + '_ {
        self.manifest.records.iter().map(|r| r.path.as_str())
    }

    /// Convert into an entry store
    pub fn into_loaded(self) -> LoadedArchive {
        let payload_start = self.header.payload_offset as usize;
        let mut store = EntryStore::new();

        for record in self.manifest.records {
            // Offsets were bounds-checked in from_bytes
            let start = payload_start + record.data_offset as usize;
            let end = start + record.stored_size as usize;
            store.put(Entry::from_parts(
                record.path,
                record.kind,
                record.compression,
                self.image[start..end].to_vec(),
                record.uncompressed_size,
                record.crc32,
                record.modified_time,
                record.metadata,
            ));
        }

        LoadedArchive {
            format: self.header.format,
            compression: self.compression,
            alias: self.manifest.alias,
            metadata: self.manifest.metadata,
            store,
        }
    }
}

/// Bounds-check `offset + size` against `limit`
fn region(offset: u64, size: u64, limit: usize) -> Result<std::ops::Range<usize>> {
    let end = offset
        .checked_add(size)
        .filter(|end| *end <= limit as u64)
        .ok_or_else(|| {
            PharError::CorruptArchive(format!(
                "region {}+{} exceeds {} bytes",
                offset, size, limit
            ))
        })?;
    Ok(offset as usize..end as usize)
}
