use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// A per-session string key-value store.
///
/// Mirrors the browser `Storage` interface: synchronous presence check,
/// get, set and remove by string key.
pub trait SessionStorage: Send + Sync {
    /// Whether an entry exists for `key`.
    fn contains_key(&self, key: &str) -> bool;

    /// The stored text for `key`, if any.
    fn get_item(&self, key: &str) -> Option<String>;

    /// Store `value` under `key`, replacing any previous entry.
    fn set_item(&self, key: &str, value: &str);

    /// Remove the entry for `key`. Removing a missing key is a no-op.
    fn remove_item(&self, key: &str);

    /// All keys currently stored, in no particular order.
    fn keys(&self) -> Vec<String>;

    /// Remove every entry.
    fn clear(&self);

    /// Number of stored entries.
    fn len(&self) -> usize {
        self.keys().len()
    }

    /// Whether no entries are stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-process session storage.
///
/// Clones share the same entries, so one `MemoryStorage` plays the role of
/// a single browsing session for every context it is handed to.
///
/// # Examples
///
/// ```
/// use tincan_session::storage::{MemoryStorage, SessionStorage};
///
/// let storage = MemoryStorage::new();
/// storage.set_item("theme", "\"dark\"");
/// assert_eq!(storage.get_item("theme").as_deref(), Some("\"dark\""));
///
/// let shared = storage.clone();
/// shared.remove_item("theme");
/// assert!(!storage.contains_key("theme"));
/// ```
#[derive(Clone, Default, Debug)]
pub struct MemoryStorage {
    entries: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStorage {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionStorage for MemoryStorage {
    fn contains_key(&self, key: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.contains_key(key)
    }

    fn get_item(&self, key: &str) -> Option<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(key).cloned()
    }

    fn set_item(&self, key: &str, value: &str) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
    }

    fn remove_item(&self, key: &str) {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
    }

    fn keys(&self) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.keys().cloned().collect()
    }

    fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
