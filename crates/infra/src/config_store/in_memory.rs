//! In-memory config store for tests/dev.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use super::{ConfigStore, StoreError};

#[derive(Debug)]
pub struct InMemoryConfigStore {
    entries: RwLock<Option<HashMap<String, String>>>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Some(HashMap::new())),
        }
    }

    /// Seed with entries (builder style).
    pub fn with(self, key: &str, value: &str) -> Self {
        if let Some(map) = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .as_mut()
        {
            map.insert(key.to_string(), value.to_string());
        }
        self
    }

    /// Copy of every entry (test assertions).
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .unwrap_or_default()
    }
}

impl Default for InMemoryConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for InMemoryConfigStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let map = entries.as_ref().ok_or(StoreError::Closed)?;
        Ok(map.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let map = entries.as_mut().ok_or(StoreError::Closed)?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn close(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seeded_values_are_readable() {
        let store = InMemoryConfigStore::new().with("status", "active");
        assert_eq!(store.get("status").unwrap().as_deref(), Some("active"));
        assert_eq!(store.get("missing").unwrap(), None);
        store.set("status", "deactivated").unwrap();
        assert_eq!(store.snapshot().get("status").map(String::as_str), Some("deactivated"));
    }

    #[test]
    fn close_rejects_further_use() {
        let store = InMemoryConfigStore::new();
        store.close();
        assert!(matches!(store.get("status"), Err(StoreError::Closed)));
        assert!(matches!(store.set("status", "x"), Err(StoreError::Closed)));
    }
}
