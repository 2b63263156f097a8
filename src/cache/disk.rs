//! Persistent storage backend rooted in a directory.
//!
//! Layout: `<root>/<store-name>/<sha256(method "\n" url)>.json`, one JSON
//! document per entry. Entries are written to a temporary file and renamed
//! into place, so a reader sees either the old entry, the new one, or none.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::fs;
use tracing::warn;

use super::entry::StoredEntry;
use super::key::RequestKey;
use super::storage::{Storage, StorageError, Store, validate_store_name};

const ENTRY_EXT: &str = "json";
const TMP_EXT: &str = "tmp";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// A [`Storage`] whose stores are sub-directories of `root`.
///
/// Contents survive process restarts; any process pointing at the same root
/// sees the same stores.
#[derive(Debug, Clone)]
pub struct DiskStorage {
    root: PathBuf,
}

impl DiskStorage {
    /// The root directory is created lazily on first `open`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl Storage for DiskStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>, StorageError> {
        validate_store_name(name)?;
        let dir = self.root.join(name);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;
        Ok(Arc::new(DiskStore {
            name: name.to_owned(),
            dir,
        }))
    }

    async fn names(&self) -> Result<Vec<String>, StorageError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.root, e)),
        };

        let mut names = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.root, e))?
        {
            let is_dir = item
                .file_type()
                .await
                .map_err(|e| StorageError::io(item.path(), e))?
                .is_dir();
            if !is_dir {
                continue;
            }
            if let Some(name) = item.file_name().to_str() {
                if validate_store_name(name).is_ok() {
                    names.push(name.to_owned());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        validate_store_name(name)?;
        let dir = self.root.join(name);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(&dir, e)),
        }
    }
}

/// One store directory.
#[derive(Debug)]
pub struct DiskStore {
    name: String,
    dir: PathBuf,
}

impl DiskStore {
    fn entry_path(&self, key: &RequestKey) -> PathBuf {
        self.dir.join(format!("{}.{ENTRY_EXT}", key.digest()))
    }

    async fn read_entry(path: &Path) -> Result<Option<StoredEntry>, StorageError> {
        let raw = match fs::read(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::io(path, e)),
        };
        serde_json::from_slice(&raw)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                path: path.to_owned(),
                source,
            })
    }
}

#[async_trait]
impl Store for DiskStore {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &RequestKey) -> Result<Option<StoredEntry>, StorageError> {
        let path = self.entry_path(key);
        let entry = match Self::read_entry(&path).await {
            Ok(entry) => entry,
            // Unreadable files, such as an older on-disk format, count as absent.
            Err(e @ StorageError::Corrupt { .. }) => {
                warn!(store = %self.name, url = %key.url, error = %e, "discarding unreadable cache entry");
                match fs::remove_file(&path).await {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(StorageError::io(&path, e)),
                }
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        // A digest collision would surface as a foreign key; treat it as absent.
        Ok(entry.filter(|e| e.key() == key))
    }

    async fn put(&self, entry: StoredEntry) -> Result<(), StorageError> {
        let path = self.entry_path(entry.key());
        let raw = serde_json::to_vec(&entry).map_err(|source| StorageError::Corrupt {
            path: path.clone(),
            source,
        })?;

        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("{}.{seq}.{TMP_EXT}", std::process::id()));

        fs::write(&tmp, &raw)
            .await
            .map_err(|e| StorageError::io(&tmp, e))?;
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(StorageError::io(&path, e));
        }
        Ok(())
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool, StorageError> {
        let path = self.entry_path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StorageError::io(&path, e)),
        }
    }

    async fn keys(&self) -> Result<Vec<RequestKey>, StorageError> {
        let mut dir = match fs::read_dir(&self.dir).await {
            Ok(dir) => dir,
            // Store deleted underneath us.
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.dir, e)),
        };

        let mut keys = Vec::new();
        while let Some(item) = dir
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.dir, e))?
        {
            let path = item.path();
            if path.extension().and_then(|e| e.to_str()) != Some(ENTRY_EXT) {
                continue;
            }
            match Self::read_entry(&path).await {
                Ok(Some(entry)) => keys.push(entry.key().clone()),
                Ok(None) => {}
                Err(e) => warn!(store = %self.name, error = %e, "skipping unreadable cache entry"),
            }
        }
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Response, StatusCode};

    fn entry(url: &str, expires_at: u64) -> StoredEntry {
        let response = Response::new(StatusCode::OK)
            .header("Content-Type", "image/png")
            .body_bytes(&b"\x89PNG\r\n"[..]);
        StoredEntry::stamp(RequestKey::new("GET", url), &response, expires_at)
    }

    #[tokio::test]
    async fn entries_survive_a_new_storage_instance() {
        let root = tempfile::tempdir().unwrap();
        let key = RequestKey::new("GET", "http://x/a.png");

        {
            let storage = DiskStorage::new(root.path());
            let store = storage.open("image-cache-v1").await.unwrap();
            store.put(entry("http://x/a.png", 42)).await.unwrap();
        }

        let storage = DiskStorage::new(root.path());
        let store = storage.open("image-cache-v1").await.unwrap();
        let back = store.get(&key).await.unwrap().unwrap();
        assert_eq!(back, entry("http://x/a.png", 42));
        assert_eq!(store.keys().await.unwrap(), vec![key]);
    }

    #[tokio::test]
    async fn names_lists_store_directories_only() {
        let root = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(root.path());
        storage.open("image-cache-v2").await.unwrap();
        storage.open("image-cache-v1").await.unwrap();
        std::fs::write(root.path().join("stray.txt"), b"x").unwrap();

        assert_eq!(
            storage.names().await.unwrap(),
            vec!["image-cache-v1", "image-cache-v2"]
        );

        assert!(storage.delete("image-cache-v1").await.unwrap());
        assert!(!storage.delete("image-cache-v1").await.unwrap());
        assert_eq!(storage.names().await.unwrap(), vec!["image-cache-v2"]);
    }

    #[tokio::test]
    async fn missing_root_has_no_stores() {
        let root = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(root.path().join("not-yet"));
        assert!(storage.names().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn no_temporary_files_are_left_behind() {
        let root = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(root.path());
        let store = storage.open("s").await.unwrap();
        store.put(entry("http://x/a.png", 1)).await.unwrap();
        store.put(entry("http://x/a.png", 2)).await.unwrap();

        let files: Vec<_> = std::fs::read_dir(root.path().join("s"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with(".json"));
    }

    #[tokio::test]
    async fn unreadable_entry_is_skipped_by_keys_and_dropped_by_get() {
        let root = tempfile::tempdir().unwrap();
        let storage = DiskStorage::new(root.path());
        let store = storage.open("s").await.unwrap();
        let key = RequestKey::new("GET", "http://x/broken.png");
        std::fs::write(
            root.path().join("s").join(format!("{}.json", key.digest())),
            b"{not json",
        )
        .unwrap();

        assert!(store.keys().await.unwrap().is_empty());
        assert_eq!(store.get(&key).await.unwrap(), None);
        assert!(!root.path().join("s").join(format!("{}.json", key.digest())).exists());
        assert!(!store.delete(&key).await.unwrap());
    }
}
