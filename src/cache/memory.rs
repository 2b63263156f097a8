//! Process-local storage backend.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::entry::StoredEntry;
use super::key::RequestKey;
use super::storage::{Storage, StorageError, Store, validate_store_name};

fn poisoned() -> StorageError {
    StorageError::Unavailable("memory store lock poisoned".into())
}

/// An in-memory [`Storage`]. Contents live as long as the value does.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    stores: RwLock<HashMap<String, Arc<MemoryStore>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>, StorageError> {
        validate_store_name(name)?;
        let mut stores = self.stores.write().map_err(|_| poisoned())?;
        let store: Arc<dyn Store> = stores
            .entry(name.to_owned())
            .or_insert_with(|| Arc::new(MemoryStore::new(name)))
            .clone();
        Ok(store)
    }

    async fn names(&self) -> Result<Vec<String>, StorageError> {
        let stores = self.stores.read().map_err(|_| poisoned())?;
        let mut names: Vec<String> = stores.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        let mut stores = self.stores.write().map_err(|_| poisoned())?;
        Ok(stores.remove(name).is_some())
    }
}

/// One named in-memory store.
#[derive(Debug)]
pub struct MemoryStore {
    name: String,
    entries: RwLock<HashMap<RequestKey, StoredEntry>>,
}

impl MemoryStore {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RequestKey) -> Result<Option<StoredEntry>, StorageError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    async fn put(&self, entry: StoredEntry) -> Result<(), StorageError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        entries.insert(entry.key().clone(), entry);
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool, StorageError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        Ok(entries.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<RequestKey>, StorageError> {
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let mut keys: Vec<RequestKey> = entries.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Response, StatusCode};

    fn entry(url: &str) -> StoredEntry {
        let response = Response::new(StatusCode::OK).body("img");
        StoredEntry::stamp(RequestKey::new("GET", url), &response, 10)
    }

    #[tokio::test]
    async fn open_is_idempotent() {
        let storage = MemoryStorage::new();
        let a = storage.open("image-cache-v1").await.unwrap();
        a.put(entry("http://x/a.png")).await.unwrap();

        let b = storage.open("image-cache-v1").await.unwrap();
        assert_eq!(b.keys().await.unwrap().len(), 1);
        assert_eq!(storage.names().await.unwrap(), vec!["image-cache-v1"]);
    }

    #[tokio::test]
    async fn delete_store_drops_entries() {
        let storage = MemoryStorage::new();
        let store = storage.open("image-cache-v1").await.unwrap();
        store.put(entry("http://x/a.png")).await.unwrap();

        assert!(storage.delete("image-cache-v1").await.unwrap());
        assert!(!storage.delete("image-cache-v1").await.unwrap());

        let fresh = storage.open("image-cache-v1").await.unwrap();
        assert!(fresh.keys().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn put_replaces_and_delete_reports() {
        let storage = MemoryStorage::new();
        let store = storage.open("s").await.unwrap();
        let key = RequestKey::new("GET", "http://x/a.png");

        store.put(entry("http://x/a.png")).await.unwrap();
        store.put(entry("http://x/a.png")).await.unwrap();
        assert_eq!(store.keys().await.unwrap(), vec![key.clone()]);

        assert!(store.delete(&key).await.unwrap());
        assert!(!store.delete(&key).await.unwrap());
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn invalid_name_is_refused() {
        let storage = MemoryStorage::new();
        assert!(matches!(
            storage.open("../etc").await,
            Err(StorageError::InvalidName(_))
        ));
    }
}
