use crate::archive::entry::Entry;
use crate::error::{PharError, Result};
use std::collections::HashMap;

/// Ordered mapping from entry key to entry
///
/// Lookup is O(1) by key; iteration follows insertion order.
/// Overwriting an existing key keeps its position.
#[derive(Debug, Clone, Default)]
pub struct EntryStore {
    entries: HashMap<String, Entry>,
    order: Vec<String>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn exists(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn get(&self, key: &str) -> Result<&Entry> {
        self.entries
            .get(key)
            .ok_or_else(|| PharError::EntryNotFound(key.to_string()))
    }

    /// Insert or overwrite the entry stored under its own key
    pub fn put(&mut self, entry: Entry) {
        let key = entry.path().to_string();
        if self.entries.insert(key.clone(), entry).is_none() {
            self.order.push(key);
        }
    }

    pub fn remove(&mut self, key: &str) -> Result<Entry> {
        let entry = self
            .entries
            .remove(key)
            .ok_or_else(|| PharError::EntryNotFound(key.to_string()))?;
        self.order.retain(|k| k != key);
        Ok(entry)
    }

    /// Duplicate an entry under a new key
    pub fn copy(&mut self, src: &str, dst: &str) -> Result<bool> {
        let entry = self.get(src)?.renamed(dst.to_string());
        self.put(entry);
        Ok(true)
    }

    /// Number of file entries; directory markers are not counted
    pub fn count(&self) -> usize {
        self.entries.values().filter(|e| e.is_file()).count()
    }

    /// Number of entries of any kind
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Entry> + '_ {
        self.order.iter().filter_map(|key| self.entries.get(key))
    }

    pub fn keys(&self) -> &[String] {
        &self.order
    }
}
