//! Process registry of open archives
//!
//! A `Registry` enforces that at most one live archive is bound to a
//! canonical path, and that an alias names at most one archive. It is an
//! explicit object rather than global state: create one at startup, hand
//! clones to whatever opens archives, and drop (or `clear`) it at teardown.
//! Clones share state; registration and release are serialized by a mutex.

use crate::config::PharConfig;
use crate::error::{PharError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct Slot {
    id: u64,
    alias: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u64,
    archives: HashMap<PathBuf, Slot>,
    aliases: HashMap<String, PathBuf>,
}

impl RegistryState {
    fn evict(&mut self, path: &Path) -> bool {
        match self.archives.remove(path) {
            Some(slot) => {
                if let Some(alias) = slot.alias {
                    self.aliases.remove(&alias);
                }
                true
            }
            None => false,
        }
    }
}

/// Shared registry of open archives plus the engine configuration
#[derive(Debug, Clone, Default)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
    config: Arc<PharConfig>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: PharConfig) -> Self {
        Self {
            state: Arc::default(),
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PharConfig {
        &self.config
    }

    /// Bind an archive to `path` (and optionally `alias`)
    ///
    /// `path` should already be resolved with [`Registry::resolve`]. The
    /// binding lasts until the returned guard is dropped.
    pub fn register(&self, path: &Path, alias: Option<&str>) -> Result<Registration> {
        let mut state = self.state.lock();

        if state.archives.contains_key(path) {
            warn!(path = %path.display(), "archive already registered");
            return Err(PharError::DuplicateArchive(format!(
                "phar \"{}\" is already open",
                path.display()
            )));
        }

        if let Some(alias) = alias {
            if let Some(owner) = state.aliases.get(alias) {
                warn!(alias, owner = %owner.display(), "alias already registered");
                return Err(PharError::DuplicateArchive(format!(
                    "alias \"{}\" is already used by phar \"{}\"",
                    alias,
                    owner.display()
                )));
            }
        }

        state.next_id += 1;
        let id = state.next_id;

        state.archives.insert(
            path.to_path_buf(),
            Slot {
                id,
                alias: alias.map(str::to_string),
            },
        );
        if let Some(alias) = alias {
            state.aliases.insert(alias.to_string(), path.to_path_buf());
        }

        debug!(path = %path.display(), alias, id, "registered archive");

        Ok(Registration {
            registry: self.clone(),
            path: path.to_path_buf(),
            id,
        })
    }

    /// Resolve an alias or a path to the canonical path key
    pub fn resolve<P: AsRef<Path>>(&self, name: P) -> Result<PathBuf> {
        let name = name.as_ref();
        if let Some(alias) = name.to_str() {
            if let Some(path) = self.state.lock().aliases.get(alias) {
                return Ok(path.clone());
            }
        }
        canonical_path(name)
    }

    /// Registered path for an alias or path, if any
    pub fn lookup<P: AsRef<Path>>(&self, name: P) -> Option<PathBuf> {
        let path = self.resolve(name).ok()?;
        self.state
            .lock()
            .archives
            .contains_key(&path)
            .then_some(path)
    }

    pub fn is_registered<P: AsRef<Path>>(&self, name: P) -> bool {
        self.lookup(name).is_some()
    }

    /// Alias bound to a registered path
    pub fn alias_of(&self, path: &Path) -> Option<String> {
        self.state
            .lock()
            .archives
            .get(path)
            .and_then(|slot| slot.alias.clone())
    }

    /// Forcefully evict a registration; returns whether one existed
    pub fn unregister<P: AsRef<Path>>(&self, name: P) -> bool {
        let Ok(path) = self.resolve(name) else {
            return false;
        };
        let evicted = self.state.lock().evict(&path);
        if evicted {
            debug!(path = %path.display(), "evicted archive");
        }
        evicted
    }

    /// Delete an archive file that no live archive holds
    ///
    /// Refused with `ArchiveInUse` while a live archive is bound to the
    /// path; drop it first.
    pub fn unlink<P: AsRef<Path>>(&self, name: P) -> Result<()> {
        let path = self.resolve(name)?;
        let state = self.state.lock();

        if state.archives.contains_key(&path) {
            warn!(path = %path.display(), "refusing to unlink open archive");
            return Err(PharError::ArchiveInUse(path.display().to_string()));
        }

        std::fs::remove_file(&path)?;

        info!(path = %path.display(), "unlinked archive");
        Ok(())
    }

    /// Number of registered archives
    pub fn len(&self) -> usize {
        self.state.lock().archives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every registration
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.archives.clear();
        state.aliases.clear();
    }

    fn release(&self, path: &Path, id: u64) {
        let mut state = self.state.lock();
        // The slot may have been evicted and re-bound by someone else
        if state.archives.get(path).is_some_and(|slot| slot.id == id) {
            state.evict(path);
            debug!(path = %path.display(), id, "released archive");
        }
    }
}

/// Binding of one live archive in a [`Registry`]; released on drop
#[derive(Debug)]
pub struct Registration {
    registry: Registry,
    path: PathBuf,
    id: u64,
}

impl Registration {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.release(&self.path, self.id);
    }
}

/// Absolute, lexically normalized form of `path`
///
/// The parent directory is canonicalized when it exists so that symlinked
/// spellings of one location share a registry key.
pub fn canonical_path(path: &Path) -> Result<PathBuf> {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()?.join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }

    if let (Some(parent), Some(name)) = (normalized.parent(), normalized.file_name()) {
        if let Ok(parent) = std::fs::canonicalize(parent) {
            return Ok(parent.join(name));
        }
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_release() {
        let registry = Registry::new();
        let path = PathBuf::from("/nonexistent-root/registry-test-a.phar");

        let guard = registry.register(&path, Some("a.phar")).unwrap();
        assert!(registry.is_registered(&path));
        assert_eq!(registry.resolve("a.phar").unwrap(), path);
        assert_eq!(registry.alias_of(&path).as_deref(), Some("a.phar"));

        drop(guard);
        assert!(registry.is_empty());
        assert!(registry.lookup("a.phar").is_none());
    }

    #[test]
    fn test_duplicate_path_and_alias() {
        let registry = Registry::new();
        let a = PathBuf::from("/nonexistent-root/registry-test-b.phar");
        let b = PathBuf::from("/nonexistent-root/registry-test-c.phar");

        let _guard = registry.register(&a, Some("shared")).unwrap();
        assert!(matches!(
            registry.register(&a, None),
            Err(PharError::DuplicateArchive(_))
        ));
        assert!(matches!(
            registry.register(&b, Some("shared")),
            Err(PharError::DuplicateArchive(_))
        ));
        assert!(registry.register(&b, None).is_ok());
    }

    #[test]
    fn test_stale_guard_does_not_release_new_binding() {
        let registry = Registry::new();
        let path = PathBuf::from("/nonexistent-root/registry-test-d.phar");

        let old = registry.register(&path, None).unwrap();
        assert!(registry.unregister(&path));
        let _new = registry.register(&path, None).unwrap();

        drop(old);
        assert!(registry.is_registered(&path));
    }

    #[test]
    fn test_unlink_refuses_live_binding() {
        let dir = tempfile::tempdir().unwrap();
        let path = canonical_path(&dir.path().join("busy.phar")).unwrap();
        std::fs::write(&path, b"x").unwrap();

        let registry = Registry::new();
        let guard = registry.register(&path, Some("busy")).unwrap();
        assert!(matches!(
            registry.unlink(&path),
            Err(PharError::ArchiveInUse(_))
        ));
        assert!(matches!(
            registry.unlink("busy"),
            Err(PharError::ArchiveInUse(_))
        ));
        assert!(path.exists());

        drop(guard);
        registry.unlink(&path).unwrap();
        assert!(!path.exists());
        assert!(!registry.is_registered(&path));
    }

    #[test]
    fn test_canonical_path_normalizes() {
        let path = canonical_path(Path::new("/nonexistent-root/a/./b/../c.phar")).unwrap();
        assert_eq!(path, PathBuf::from("/nonexistent-root/a/c.phar"));
    }
}
