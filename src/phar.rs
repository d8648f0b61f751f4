//! Archive façade
//!
//! A `Phar` owns the committed entry store, the write buffer overlay and the
//! container metadata of one archive file, and holds its registry binding
//! for as long as it lives.

use crate::archive::{
    ArchiveFormat, ArchiveReader, ArchiveWriter, Compression, DirEntry, Entry, EntryStore,
    LoadedArchive, WriteBuffer, API_VERSION, MAX_PATH_LENGTH,
};
use crate::config::PharConfig;
use crate::error::{PharError, Result};
use crate::metadata::Metadata;
use crate::registry::{Registration, Registry};
use crate::walker::{walk_directory, SourceEntry};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Options for opening or creating an archive
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    alias: Option<String>,
    format: Option<ArchiveFormat>,
}

impl OpenOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the archive under `alias` as well as its path
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Force the archive format instead of inferring it from the file name
    pub fn format(mut self, format: ArchiveFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn open<P: AsRef<Path>>(&self, registry: &Registry, path: P) -> Result<Phar> {
        Phar::open_with(registry, path, self)
    }
}

/// One open archive
///
/// Mutations go through the write buffer. While idle every mutation is
/// committed to disk before the call returns; between `start_buffering` and
/// `stop_buffering` they are staged in memory and committed once.
///
/// Entry references returned by [`Phar::get`] borrow from the archive and
/// cannot outlive a later mutation.
#[derive(Debug)]
pub struct Phar {
    registration: Registration,
    format: ArchiveFormat,
    alias: Option<String>,
    compression: Compression,
    metadata: Option<Metadata>,
    store: EntryStore,
    buffer: WriteBuffer,
}

impl Phar {
    /// Open the archive at `path`, or start a new one if no file exists
    pub fn open<P: AsRef<Path>>(registry: &Registry, path: P) -> Result<Self> {
        Self::open_with(registry, path, &OpenOptions::default())
    }

    pub fn open_with<P: AsRef<Path>>(
        registry: &Registry,
        path: P,
        options: &OpenOptions,
    ) -> Result<Self> {
        let path = registry.resolve(path)?;

        let loaded = match read_existing(&path)? {
            Some(bytes) => Some(ArchiveReader::from_bytes(bytes)?.into_loaded()),
            None => None,
        };

        let (stored_format, compression, stored_alias, metadata, store) = match loaded {
            Some(LoadedArchive {
                format,
                compression,
                alias,
                metadata,
                store,
            }) => (Some(format), compression, alias, metadata, store),
            None => (None, Compression::None, None, None, EntryStore::new()),
        };

        let alias = options.alias.clone().or(stored_alias);
        let format = options
            .format
            .or(stored_format)
            .unwrap_or_else(|| ArchiveFormat::from_path(&path));

        let registration = registry.register(&path, alias.as_deref())?;

        info!(
            path = %path.display(),
            entries = store.len(),
            compression = %compression,
            created = stored_format.is_none(),
            "opened archive"
        );

        Ok(Self {
            registration,
            format,
            alias,
            compression,
            metadata,
            store,
            buffer: WriteBuffer::new(),
        })
    }

    /// Delete an archive file
    ///
    /// Fails `ArchiveInUse` while an archive for that path (or alias) is
    /// still open in `registry`.
    pub fn unlink_archive<P: AsRef<Path>>(registry: &Registry, path: P) -> Result<()> {
        registry.unlink(path)
    }

    /// Compatibility tag of this engine
    pub fn api_version() -> &'static str {
        API_VERSION
    }

    /// Whether `codec` is compiled into this build
    pub fn can_compress(codec: Compression) -> bool {
        codec.is_available()
    }

    /// Codecs usable for entry and container compression
    pub fn supported_compression() -> Vec<Compression> {
        [Compression::Gzip, Compression::Bzip2]
            .into_iter()
            .filter(|c| c.is_available())
            .collect()
    }

    /// Whether this archive accepts writes
    ///
    /// False when the registry configuration is read-only or a codec
    /// backend is compiled out.
    pub fn can_write(&self) -> bool {
        !self.config().readonly
            && Compression::Gzip.is_available()
            && Compression::Bzip2.is_available()
    }

    /// Canonical path the archive is registered under
    pub fn path(&self) -> &Path {
        self.registration.path()
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    pub fn registry(&self) -> &Registry {
        self.registration.registry()
    }

    fn config(&self) -> &PharConfig {
        self.registration.registry().config()
    }

    pub fn exists(&self, key: &str) -> bool {
        normalize_key(key)
            .map(|key| self.buffer.exists(&self.store, &key))
            .unwrap_or(false)
    }

    /// Borrow the entry stored under `key`
    pub fn get(&self, key: &str) -> Result<&Entry> {
        let key = normalize_key(key)?;
        self.buffer
            .get(&self.store, &key)
            .ok_or(PharError::EntryNotFound(key))
    }

    /// Create or overwrite a file entry
    pub fn set(&mut self, key: &str, content: impl Into<Vec<u8>>) -> Result<()> {
        let key = normalize_key(key)?;
        let entry = Entry::file(key, content.into());
        self.mutate(|buffer| buffer.stage_put(entry))
    }

    /// Store literal bytes under `key`
    pub fn add_from_string(&mut self, key: &str, content: impl AsRef<[u8]>) -> Result<()> {
        self.set(key, content.as_ref().to_vec())
    }

    /// Store the content of an external file
    ///
    /// The key defaults to `external` as written.
    pub fn add_file<P: AsRef<Path>>(&mut self, external: P, key: Option<&str>) -> Result<()> {
        let external = external.as_ref();
        let key = match key {
            Some(key) => normalize_key(key)?,
            None => normalize_key(&external.to_string_lossy())?,
        };
        let content = std::fs::read(external)?;
        let entry = Entry::file(key, content);
        self.mutate(|buffer| buffer.stage_put(entry))
    }

    /// Insert an empty-directory marker
    pub fn add_empty_dir(&mut self, name: &str) -> Result<()> {
        let key = normalize_key(name)?;
        let entry = Entry::directory(key);
        self.mutate(|buffer| buffer.stage_put(entry))
    }

    /// Remove an entry
    pub fn unset(&mut self, key: &str) -> Result<()> {
        let key = normalize_key(key)?;
        if !self.buffer.exists(&self.store, &key) {
            return Err(PharError::EntryNotFound(key));
        }
        self.mutate(|buffer| buffer.stage_remove(&key))
    }

    /// Duplicate an entry (content, compression and metadata) under `dst`
    pub fn copy(&mut self, src: &str, dst: &str) -> Result<bool> {
        let src = normalize_key(src)?;
        let dst = normalize_key(dst)?;
        let entry = self.get(&src)?.renamed(dst.clone());
        if self.buffer.exists(&self.store, &dst) {
            return Err(PharError::EntryExists(dst));
        }
        self.mutate(|buffer| buffer.stage_put(entry))?;
        Ok(true)
    }

    /// Add every file and empty directory below `root`
    ///
    /// Returns the number of entries added.
    pub fn build_from_directory<P: AsRef<Path>>(&mut self, root: P) -> Result<usize> {
        self.build_from_iter(walk_directory(root))
    }

    /// Add entries produced by a walker
    ///
    /// The source is consumed before anything is staged, so a failing
    /// walker leaves the archive untouched. All entries land in one commit.
    pub fn build_from_iter<I>(&mut self, source: I) -> Result<usize>
    where
        I: IntoIterator<Item = Result<SourceEntry>>,
    {
        self.ensure_writable()?;

        let mut entries = Vec::new();
        for item in source {
            let entry = match item? {
                SourceEntry::File { path, data } => Entry::file(normalize_key(&path)?, data),
                SourceEntry::Directory { path } => Entry::directory(normalize_key(&path)?),
            };
            entries.push(entry);
        }

        let added = entries.len();
        debug!(path = %self.path().display(), added, "building from source");
        self.mutate(|buffer| entries.into_iter().for_each(|e| buffer.stage_put(e)))?;
        Ok(added)
    }

    /// Number of file entries; directory markers are not counted
    pub fn count(&self) -> usize {
        self.iter().filter(|e| e.is_file()).count()
    }

    /// Number of entries of any kind
    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }

    /// Every entry, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.buffer.iter(&self.store)
    }

    /// File entries only
    pub fn files(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.iter().filter(|e| e.is_file())
    }

    /// Immediate children of `dir` (`""` or `"/"` for the root)
    ///
    /// Intermediate directories with no marker of their own are
    /// synthesized.
    pub fn children(&self, dir: &str) -> Result<Vec<DirEntry<'_>>> {
        let prefix = match dir.trim_matches('/') {
            "" => String::new(),
            _ => {
                let dir = normalize_key(dir)?;
                match self.buffer.get(&self.store, &dir) {
                    Some(entry) if entry.is_file() => {
                        return Err(PharError::InvalidPath(format!("{} is not a directory", dir)))
                    }
                    Some(_) => {}
                    None if !self.iter().any(|e| e.path().starts_with(&format!("{}/", dir))) => {
                        return Err(PharError::EntryNotFound(dir))
                    }
                    None => {}
                }
                format!("{}/", dir)
            }
        };

        let mut children: Vec<DirEntry<'_>> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for entry in self.iter() {
            let Some(rest) = entry.path().strip_prefix(prefix.as_str()) else {
                continue;
            };
            let child = match rest.split_once('/') {
                Some((head, _)) => DirEntry::synthesized(format!("{}{}", prefix, head)),
                None => DirEntry::backed(entry),
            };
            match index.get(child.path()) {
                Some(&at) => {
                    if child.entry().is_some() {
                        children[at] = child;
                    }
                }
                None => {
                    index.insert(child.path().to_string(), children.len());
                    children.push(child);
                }
            }
        }

        Ok(children)
    }

    /// Write every entry below `dest`
    ///
    /// Returns the number of files written.
    pub fn extract_to<P: AsRef<Path>>(&self, dest: P) -> Result<usize> {
        let dest = dest.as_ref();
        let mut written = 0;

        for entry in self.iter() {
            // Keys read from disk have not been through normalize_key
            if normalize_key(entry.path())? != entry.path() {
                return Err(PharError::InvalidPath(entry.path().to_string()));
            }
            let target = dest.join(entry.path());
            if entry.is_dir() {
                std::fs::create_dir_all(&target)?;
                continue;
            }
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&target, entry.content()?)?;
            written += 1;
        }

        info!(path = %self.path().display(), dest = %dest.display(), written, "extracted archive");
        Ok(written)
    }

    /// Re-encode every file entry with `codec`
    pub fn compress_files(&mut self, codec: Compression) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_available(codec)?;

        let level = self.config().level(codec);
        let entries = self
            .files()
            .map(|entry| entry.recompressed(codec, level))
            .collect::<Result<Vec<_>>>()?;

        debug!(path = %self.path().display(), codec = %codec, files = entries.len(), "compressing files");
        self.mutate(|buffer| entries.into_iter().for_each(|e| buffer.stage_put(e)))
    }

    /// Store every file entry uncompressed
    pub fn decompress_files(&mut self) -> Result<()> {
        self.compress_files(Compression::None)
    }

    /// Re-encode one entry with `codec`
    pub fn set_entry_compression(&mut self, key: &str, codec: Compression) -> Result<()> {
        self.ensure_writable()?;
        self.ensure_available(codec)?;

        let level = self.config().level(codec);
        let entry = self.get(key)?;
        if entry.is_dir() {
            return Err(PharError::IsDirectory(entry.path().to_string()));
        }
        let entry = entry.recompressed(codec, level)?;
        self.mutate(|buffer| buffer.stage_put(entry))
    }

    pub fn set_entry_metadata<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<()> {
        let metadata = Metadata::encode(value)?;
        let entry = self.get(key)?.with_metadata(Some(metadata));
        self.mutate(|buffer| buffer.stage_put(entry))
    }

    /// Drop an entry's metadata; returns whether it had any
    pub fn del_entry_metadata(&mut self, key: &str) -> Result<bool> {
        let entry = self.get(key)?;
        if !entry.has_metadata() {
            return Ok(false);
        }
        let entry = entry.with_metadata(None);
        self.mutate(|buffer| buffer.stage_put(entry))?;
        Ok(true)
    }

    pub fn has_metadata(&self) -> bool {
        self.metadata().is_some()
    }

    /// Raw container metadata
    pub fn metadata(&self) -> Option<&Metadata> {
        self.buffer.metadata(self.metadata.as_ref())
    }

    /// Decode container metadata into `T`
    pub fn get_metadata<T: DeserializeOwned>(&self) -> Result<Option<T>> {
        self.metadata().map(|m| m.decode()).transpose()
    }

    pub fn set_metadata<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<()> {
        let metadata = Metadata::encode(value)?;
        self.mutate(|buffer| buffer.stage_metadata(Some(metadata)))
    }

    /// Remove container metadata; returns whether it existed
    pub fn del_metadata(&mut self) -> Result<bool> {
        if !self.has_metadata() {
            return Ok(false);
        }
        self.mutate(|buffer| buffer.stage_metadata(None))?;
        Ok(true)
    }

    /// Stage mutations in memory until `stop_buffering`
    ///
    /// Calling this while already buffering does nothing.
    pub fn start_buffering(&mut self) {
        if self.buffer.start() {
            debug!(path = %self.path().display(), "started buffering");
        } else {
            debug!(path = %self.path().display(), "already buffering");
        }
    }

    /// Commit staged mutations in one atomic write and leave buffering
    ///
    /// On failure the archive stays in buffering mode with everything still
    /// staged, and the file on disk is unchanged. Does nothing when idle.
    pub fn stop_buffering(&mut self) -> Result<()> {
        if !self.buffer.is_buffering() {
            return Ok(());
        }
        self.flush()?;
        self.buffer.stop();
        debug!(path = %self.path().display(), "stopped buffering");
        Ok(())
    }

    pub fn is_buffering(&self) -> bool {
        self.buffer.is_buffering()
    }

    /// Codec wrapping the whole container
    pub fn container_compression(&self) -> Compression {
        self.compression
    }

    /// Whether the whole container is wrapped by a codec
    pub fn is_compressed(&self) -> bool {
        self.compression != Compression::None
    }

    pub fn is_compressed_with(&self, codec: Compression) -> bool {
        codec != Compression::None && self.compression == codec
    }

    /// Write a copy of this archive wrapped with `codec`
    ///
    /// The copy lands next to the source with `.gz`/`.bz2` appended (or
    /// stripped for `Compression::None`) and is returned as a new, separately
    /// registered archive. Fails `DuplicateArchive` if that path is already
    /// registered, which includes converting an uncompressed archive to
    /// `Compression::None`.
    pub fn compress(&self, codec: Compression) -> Result<Phar> {
        self.ensure_writable()?;
        self.ensure_available(codec)?;

        let target = converted_path(self.path(), codec);
        let registration = match self.registry().register(&target, None) {
            Ok(registration) => registration,
            Err(PharError::DuplicateArchive(_)) => {
                warn!(target = %target.display(), "converted archive already registered");
                return Err(PharError::converted_exists(&target));
            }
            Err(e) => return Err(e),
        };

        let metadata = self.metadata().cloned();
        let mut store = EntryStore::new();
        let mut writer = ArchiveWriter::new(self.format).with_metadata(metadata.clone());
        for entry in self.iter() {
            writer.add_entry(entry)?;
            store.put(entry.clone());
        }

        let level = self.config().level(codec);
        let written = writer.finalize(&target, codec, level)?;

        info!(
            source = %self.path().display(),
            target = %target.display(),
            codec = %codec,
            bytes = written,
            "converted archive"
        );

        Ok(Phar {
            registration,
            format: self.format,
            alias: None,
            compression: codec,
            metadata,
            store,
            buffer: WriteBuffer::new(),
        })
    }

    /// Equivalent to `compress(Compression::None)`
    pub fn decompress(&self) -> Result<Phar> {
        self.compress(Compression::None)
    }

    fn mutate(&mut self, op: impl FnOnce(&mut WriteBuffer)) -> Result<()> {
        self.ensure_writable()?;
        op(&mut self.buffer);

        if self.buffer.is_buffering() {
            return Ok(());
        }

        if let Err(e) = self.flush() {
            warn!(path = %self.path().display(), error = %e, "commit failed, rolling back");
            self.buffer.discard();
            return Err(e);
        }
        Ok(())
    }

    /// Serialize the merged view and atomically replace the file
    fn flush(&mut self) -> Result<()> {
        let mut writer = ArchiveWriter::new(self.format)
            .with_alias(self.alias.clone())
            .with_metadata(self.metadata().cloned());
        for entry in self.buffer.iter(&self.store) {
            writer.add_entry(entry)?;
        }
        let entries = writer.entry_count();

        let level = self.config().level(self.compression);
        let written = writer.finalize(self.registration.path(), self.compression, level)?;

        self.buffer.apply(&mut self.store, &mut self.metadata);

        debug!(path = %self.path().display(), entries, bytes = written, "committed archive");
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        if self.config().readonly {
            return Err(PharError::ReadOnly);
        }
        Ok(())
    }

    fn ensure_available(&self, codec: Compression) -> Result<()> {
        if !codec.is_available() {
            return Err(PharError::UnsupportedCompression(format!(
                "{} support is not compiled in",
                codec
            )));
        }
        Ok(())
    }
}

impl Drop for Phar {
    fn drop(&mut self) {
        if self.buffer.is_dirty() {
            warn!(path = %self.path().display(), "discarding staged writes");
        }
    }
}

/// Canonical form of an entry key
///
/// Backslashes become `/`; empty, `.` and leading/trailing separators are
/// dropped. Empty keys, `..` components and over-long keys are rejected.
pub fn normalize_key(key: &str) -> Result<String> {
    let replaced = key.replace('\\', "/");
    let mut parts = Vec::new();

    for part in replaced.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                return Err(PharError::InvalidPath(format!(
                    "{}: parent components are not allowed",
                    key
                )))
            }
            part => parts.push(part),
        }
    }

    let normalized = parts.join("/");
    if normalized.is_empty() {
        return Err(PharError::InvalidPath(format!("{:?}: empty key", key)));
    }
    if normalized.len() > MAX_PATH_LENGTH {
        return Err(PharError::InvalidPath(format!(
            "key is {} bytes, limit is {}",
            normalized.len(),
            MAX_PATH_LENGTH
        )));
    }
    Ok(normalized)
}

/// Target path for a container conversion to `codec`
fn converted_path(path: &Path, codec: Compression) -> PathBuf {
    let name = path.as_os_str().to_string_lossy();
    let base = [Compression::Gzip, Compression::Bzip2]
        .iter()
        .filter_map(|c| c.extension())
        .find_map(|ext| name.strip_suffix(&format!(".{}", ext)))
        .unwrap_or(&name);

    match codec.extension() {
        Some(ext) => PathBuf::from(format!("{}.{}", base, ext)),
        None => PathBuf::from(base),
    }
}

/// Bytes of an existing, non-empty archive file
fn read_existing(path: &Path) -> Result<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) if bytes.is_empty() => Ok(None),
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_phar(name: &str) -> (tempfile::TempDir, Registry, Phar) {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::new();
        let phar = Phar::open(&registry, dir.path().join(name)).unwrap();
        (dir, registry, phar)
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("a/b.txt").unwrap(), "a/b.txt");
        assert_eq!(normalize_key("/a//b/").unwrap(), "a/b");
        assert_eq!(normalize_key("./a/./b").unwrap(), "a/b");
        assert_eq!(normalize_key("a\\b").unwrap(), "a/b");
        assert!(matches!(normalize_key(""), Err(PharError::InvalidPath(_))));
        assert!(matches!(normalize_key("/"), Err(PharError::InvalidPath(_))));
        assert!(matches!(normalize_key("a/../b"), Err(PharError::InvalidPath(_))));
    }

    #[test]
    fn test_converted_path() {
        let p = Path::new("/tmp/x.phar");
        assert_eq!(converted_path(p, Compression::Gzip), PathBuf::from("/tmp/x.phar.gz"));
        assert_eq!(converted_path(p, Compression::Bzip2), PathBuf::from("/tmp/x.phar.bz2"));
        assert_eq!(converted_path(p, Compression::None), PathBuf::from("/tmp/x.phar"));
        assert_eq!(
            converted_path(Path::new("/tmp/x.phar.gz"), Compression::Bzip2),
            PathBuf::from("/tmp/x.phar.bz2")
        );
        assert_eq!(
            converted_path(Path::new("/tmp/x.phar.bz2"), Compression::None),
            PathBuf::from("/tmp/x.phar")
        );
    }

    #[test]
    fn test_new_archive_not_persisted_until_commit() {
        let (dir, registry, mut phar) = temp_phar("new.phar");
        let path = phar.path().to_path_buf();
        assert!(!path.exists());
        assert!(registry.is_registered(&path));

        phar.set("a.txt", "A").unwrap();
        assert!(path.exists());
        drop(dir);
    }

    #[test]
    fn test_children_synthesizes_directories() {
        let (_dir, _registry, mut phar) = temp_phar("tree.phar");
        phar.start_buffering();
        phar.set("top.txt", "t").unwrap();
        phar.set("src/lib/a.txt", "a").unwrap();
        phar.set("src/b.txt", "b").unwrap();
        phar.add_empty_dir("src/empty").unwrap();
        phar.stop_buffering().unwrap();

        let root: Vec<(String, bool)> = phar
            .children("")
            .unwrap()
            .iter()
            .map(|c| (c.path().to_string(), c.is_dir()))
            .collect();
        assert_eq!(
            root,
            vec![("top.txt".to_string(), false), ("src".to_string(), true)]
        );

        let src: Vec<String> = phar
            .children("src")
            .unwrap()
            .iter()
            .map(|c| c.file_name().to_string())
            .collect();
        assert_eq!(src, vec!["lib", "b.txt", "empty"]);

        assert!(phar.children("src/empty").unwrap().is_empty());
        assert!(matches!(phar.children("missing"), Err(PharError::EntryNotFound(_))));
        assert!(matches!(phar.children("top.txt"), Err(PharError::InvalidPath(_))));
    }

    #[test]
    fn test_readonly_config_refuses_writes() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Registry::with_config(PharConfig {
            readonly: true,
            ..PharConfig::default()
        });
        let mut phar = Phar::open(&registry, dir.path().join("ro.phar")).unwrap();

        assert!(!phar.can_write());
        assert!(matches!(phar.set("a", "b"), Err(PharError::ReadOnly)));
        assert!(matches!(phar.set_metadata(&1), Err(PharError::ReadOnly)));
        assert!(!phar.exists("a"));
    }
}
