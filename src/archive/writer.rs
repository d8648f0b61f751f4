use crate::archive::codec;
use crate::archive::end_record::EndRecord;
use crate::archive::entry::Entry;
use crate::archive::format::{ArchiveFormat, Compression, FileHeader, HEADER_SIZE};
use crate::archive::manifest::{EntryRecord, Manifest};
use crate::error::{PharError, Result};
use crate::metadata::Metadata;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Serializer for container images
///
/// Entries are appended in order; `finish` lays out header, manifest,
/// payload region and end record. Entry payloads are written exactly as
/// stored, so compression happens before an entry reaches the writer.
pub struct ArchiveWriter {
    format: ArchiveFormat,
    alias: Option<String>,
    metadata: Option<Metadata>,
    records: Vec<EntryRecord>,
    payload: Vec<u8>,
}

impl ArchiveWriter {
    pub fn new(format: ArchiveFormat) -> Self {
        Self {
            format,
            alias: None,
            metadata: None,
            records: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn with_alias(mut self, alias: Option<String>) -> Self {
        self.alias = alias;
        self
    }

    /// Attach container-level metadata
    pub fn with_metadata(mut self, metadata: Option<Metadata>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Append an entry and its stored payload
    pub fn add_entry(&mut self, entry: &Entry) -> Result<()> {
        let stored = entry.stored();
        self.records.push(EntryRecord {
            path: entry.path().to_string(),
            data_offset: self.payload.len() as u64,
            uncompressed_size: entry.uncompressed_size(),
            stored_size: stored.len() as u64,
            crc32: entry.crc32(),
            modified_time: entry.modified_time(),
            compression: entry.compression(),
            kind: entry.kind(),
            metadata: entry.metadata().cloned(),
        });
        self.payload.extend_from_slice(stored);
        Ok(())
    }

    pub fn entry_count(&self) -> usize {
        self.records.len()
    }

    /// Produce the unwrapped container image
    pub fn finish(self) -> Result<Vec<u8>> {
        let entry_count = u32::try_from(self.records.len()).map_err(|_| {
            PharError::CorruptArchive(format!("too many entries: {}", self.records.len()))
        })?;

        let manifest = Manifest {
            alias: self.alias,
            metadata: self.metadata,
            records: self.records,
        }
        .to_bytes()?;

        let mut header = FileHeader::new(self.format);
        header.manifest_offset = HEADER_SIZE as u64;
        header.manifest_size = manifest.len() as u64;
        header.payload_offset = header.manifest_offset + header.manifest_size;
        header.payload_size = self.payload.len() as u64;
        header.entry_count = entry_count;
        header.manifest_crc32 = crc32fast::hash(&manifest);

        let end_record = EndRecord::for_header(&header, crc32fast::hash(&self.payload));

        let mut image = Vec::with_capacity(HEADER_SIZE + manifest.len() + self.payload.len() + 64);
        header.write_to(&mut image)?;
        image.write_all(&manifest)?;
        image.write_all(&self.payload)?;
        end_record.write_to(&mut image)?;

        Ok(image)
    }

    /// Wrap the image with `compression` and atomically replace `path`
    ///
    /// Returns the number of bytes written.
    pub fn finalize<P: AsRef<Path>>(
        self,
        path: P,
        compression: Compression,
        level: u32,
    ) -> Result<u64> {
        let image = self.finish()?;
        let bytes = codec::wrap(image, compression, level)?;
        write_atomic(path.as_ref(), &bytes)?;
        Ok(bytes.len() as u64)
    }
}

/// Write `bytes` to a sibling temp file, then rename it over `path`
///
/// A failure at any step leaves whatever was at `path` untouched.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut temp = NamedTempFile::new_in(dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| PharError::Io(e.error))?;
    Ok(())
}
