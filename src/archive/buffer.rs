use crate::archive::entry::Entry;
use crate::archive::store::EntryStore;
use crate::metadata::Metadata;
use std::collections::HashMap;

/// Pending operation on one key
#[derive(Debug, Clone)]
pub enum Staged {
    /// Overwrite in place, or append if the key is new
    Put(Entry),
    Remove,
    /// Removed and put again within one batch: leaves its old position
    /// and is appended
    Reinsert(Entry),
}

/// Staged overlay over the committed `EntryStore`
///
/// Mutations are recorded per key and only reach the store (and the disk)
/// when the owner commits. Reads go through the overlay, so the owning
/// archive sees its own staged state while the file on disk is untouched.
///
/// States: idle (owner commits after every mutation) and buffering
/// (owner commits on `stop`). Starting while buffering is a no-op.
#[derive(Debug, Default)]
pub struct WriteBuffer {
    buffering: bool,
    staged: HashMap<String, Staged>,
    order: Vec<String>,
    metadata: Option<Option<Metadata>>,
}

impl WriteBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    /// Enter buffering; returns false if already buffering
    pub fn start(&mut self) -> bool {
        !std::mem::replace(&mut self.buffering, true)
    }

    /// Leave buffering; returns whether it was active
    pub fn stop(&mut self) -> bool {
        std::mem::replace(&mut self.buffering, false)
    }

    /// Whether anything is staged
    pub fn is_dirty(&self) -> bool {
        !self.staged.is_empty() || self.metadata.is_some()
    }

    pub fn stage_put(&mut self, entry: Entry) {
        let key = entry.path().to_string();
        let staged = match self.staged.get(&key) {
            Some(Staged::Remove) => {
                self.order.retain(|k| *k != key);
                self.order.push(key.clone());
                Staged::Reinsert(entry)
            }
            Some(Staged::Reinsert(_)) => Staged::Reinsert(entry),
            Some(Staged::Put(_)) => Staged::Put(entry),
            None => {
                self.order.push(key.clone());
                Staged::Put(entry)
            }
        };
        self.staged.insert(key, staged);
    }

    pub fn stage_remove(&mut self, key: &str) {
        if !self.staged.contains_key(key) {
            self.order.push(key.to_string());
        }
        self.staged.insert(key.to_string(), Staged::Remove);
    }

    pub fn stage_metadata(&mut self, metadata: Option<Metadata>) {
        self.metadata = Some(metadata);
    }

    /// Drop every staged operation
    pub fn discard(&mut self) {
        self.staged.clear();
        self.order.clear();
        self.metadata = None;
    }

    /// Look a key up through the overlay
    pub fn get<'a>(&'a self, store: &'a EntryStore, key: &str) -> Option<&'a Entry> {
        match self.staged.get(key) {
            Some(Staged::Put(entry)) | Some(Staged::Reinsert(entry)) => Some(entry),
            Some(Staged::Remove) => None,
            None => store.get(key).ok(),
        }
    }

    pub fn exists(&self, store: &EntryStore, key: &str) -> bool {
        self.get(store, key).is_some()
    }

    /// Merged view: committed entries in store order (with staged
    /// replacements and removals applied), then appended keys in the
    /// order they were last inserted
    pub fn iter<'a>(&'a self, store: &'a EntryStore) -> impl Iterator<Item = &'a Entry> + 'a {
        let committed = store
            .iter()
            .filter_map(move |entry| match self.staged.get(entry.path()) {
                Some(Staged::Put(staged)) => Some(staged),
                Some(Staged::Remove) | Some(Staged::Reinsert(_)) => None,
                None => Some(entry),
            });

        let added = self
            .order
            .iter()
            .filter_map(move |key| match self.staged.get(key.as_str()) {
                Some(Staged::Put(entry)) if !store.exists(key) => Some(entry),
                Some(Staged::Reinsert(entry)) => Some(entry),
                _ => None,
            });

        committed.chain(added)
    }

    /// Container metadata as seen through the overlay
    pub fn metadata<'a>(&'a self, committed: Option<&'a Metadata>) -> Option<&'a Metadata> {
        match &self.metadata {
            Some(staged) => staged.as_ref(),
            None => committed,
        }
    }

    /// Fold every staged operation into the committed state
    pub fn apply(&mut self, store: &mut EntryStore, metadata: &mut Option<Metadata>) {
        for key in self.order.drain(..) {
            match self.staged.remove(&key) {
                Some(Staged::Put(entry)) => store.put(entry),
                Some(Staged::Remove) => {
                    // A key staged and removed within one batch never reached the store
                    let _ = store.remove(&key);
                }
                Some(Staged::Reinsert(entry)) => {
                    let _ = store.remove(&key);
                    store.put(entry);
                }
                None => {}
            }
        }
        if let Some(staged) = self.metadata.take() {
            *metadata = staged;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn committed() -> EntryStore {
        let mut store = EntryStore::new();
        store.put(Entry::file("a", b"1".to_vec()));
        store.put(Entry::file("b", b"2".to_vec()));
        store
    }

    fn keys<'a>(buffer: &'a WriteBuffer, store: &'a EntryStore) -> Vec<&'a str> {
        buffer.iter(store).map(Entry::path).collect()
    }

    #[test]
    fn test_state_transitions() {
        let mut buffer = WriteBuffer::new();
        assert!(!buffer.is_buffering());
        assert!(buffer.start());
        assert!(!buffer.start());
        assert!(buffer.is_buffering());
        assert!(buffer.stop());
        assert!(!buffer.stop());
    }

    #[test]
    fn test_overlay_reads() {
        let store = committed();
        let mut buffer = WriteBuffer::new();

        buffer.stage_put(Entry::file("c", b"3".to_vec()));
        buffer.stage_put(Entry::file("a", b"changed".to_vec()));
        buffer.stage_remove("b");

        assert!(buffer.is_dirty());
        assert!(!buffer.exists(&store, "b"));
        assert!(store.exists("b"));
        assert_eq!(
            buffer.get(&store, "a").unwrap().content().unwrap(),
            b"changed"
        );
        assert_eq!(keys(&buffer, &store), vec!["a", "c"]);
    }

    #[test]
    fn test_apply_folds_into_store() {
        let mut store = committed();
        let mut metadata = None;
        let mut buffer = WriteBuffer::new();

        buffer.stage_put(Entry::file("c", b"3".to_vec()));
        buffer.stage_remove("a");
        buffer.stage_put(Entry::file("tmp", Vec::new()));
        buffer.stage_remove("tmp");
        buffer.stage_metadata(Some(Metadata::from_bytes(b"{}".to_vec())));

        buffer.apply(&mut store, &mut metadata);

        assert!(!buffer.is_dirty());
        assert_eq!(store.keys(), &["b".to_string(), "c".to_string()]);
        assert!(metadata.is_some());
    }

    #[test]
    fn test_reinsert_moves_key_to_end() {
        let mut store = committed();
        let mut metadata = None;
        let mut buffer = WriteBuffer::new();

        buffer.stage_remove("a");
        buffer.stage_put(Entry::file("a", b"again".to_vec()));
        assert_eq!(keys(&buffer, &store), vec!["b", "a"]);

        buffer.apply(&mut store, &mut metadata);
        assert_eq!(store.keys(), &["b".to_string(), "a".to_string()]);
        assert_eq!(store.get("a").unwrap().content().unwrap(), b"again");
    }

    #[test]
    fn test_reinsert_of_new_key_follows_later_keys() {
        let mut store = EntryStore::new();
        let mut metadata = None;
        let mut buffer = WriteBuffer::new();

        buffer.stage_put(Entry::file("c", b"3".to_vec()));
        buffer.stage_put(Entry::file("d", b"4".to_vec()));
        buffer.stage_remove("c");
        buffer.stage_put(Entry::file("c", b"5".to_vec()));
        assert_eq!(keys(&buffer, &store), vec!["d", "c"]);

        buffer.apply(&mut store, &mut metadata);
        assert_eq!(store.keys(), &["d".to_string(), "c".to_string()]);
    }

    #[test]
    fn test_discard() {
        let store = committed();
        let mut buffer = WriteBuffer::new();
        buffer.stage_remove("a");
        buffer.discard();
        assert!(!buffer.is_dirty());
        assert!(buffer.exists(&store, "a"));
    }
}
