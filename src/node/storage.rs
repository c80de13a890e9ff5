//! Local single-shard key-value storage.

use std::collections::HashMap;

/// The node's local shard: a plain in-memory map from string key to
/// string value. Volatile; owned exclusively by the node it shards for.
#[derive(Debug, Clone, Default)]
pub struct LocalStore {
    entries: HashMap<String, String>,
}

impl LocalStore {
    pub fn new() -> Self {
        LocalStore {
            entries: HashMap::new(),
        }
    }

    /// Inserts a new key-value pair. Fails if the key already exists.
    pub fn create(&mut self, key: &str, value: &str) -> bool {
        if self.entries.contains_key(key) {
            return false;
        }
        self.entries.insert(key.into(), value.into());
        true
    }

    /// `Some(value)` if the key is held locally, else `None`.
    pub fn read(&self, key: &str) -> Option<String> {
        self.entries.get(key).cloned()
    }

    /// Overwrites the value of an existing key. Fails if the key is absent.
    pub fn update(&mut self, key: &str, value: &str) -> bool {
        match self.entries.get_mut(key) {
            Some(slot) => {
                *slot = value.into();
                true
            }
            None => false,
        }
    }

    /// Removes a key. Fails if the key is absent.
    pub fn delete(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Iterates all locally held entries (used by stabilization to
    /// re-replicate the full shard).
    pub fn entries(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
