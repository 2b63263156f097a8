//! Storage seams: a registry of named stores, and the stores themselves.
//!
//! A [`Storage`] owns every store the engine may see; the engine uses it to
//! open its current store and to delete stores left behind by older versions.
//! A [`Store`] is a flat key-value area. Its only mutations are whole-entry
//! `put` and `delete`; an entry is visible only once fully written.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use super::entry::StoredEntry;
use super::key::RequestKey;

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt cache entry at {}: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid store name `{0}`")]
    InvalidName(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A registry of named stores.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Opens the store called `name`, creating it if it does not exist.
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>, StorageError>;

    /// Lists the names of every existing store.
    async fn names(&self) -> Result<Vec<String>, StorageError>;

    /// Deletes the store called `name` with all its entries.
    ///
    /// Returns `true` if a store was removed.
    async fn delete(&self, name: &str) -> Result<bool, StorageError>;
}

/// A single named key-value store of cached responses.
#[async_trait]
pub trait Store: Send + Sync {
    fn name(&self) -> &str;

    async fn get(&self, key: &RequestKey) -> Result<Option<StoredEntry>, StorageError>;

    /// Writes `entry` under its own key, replacing any previous entry.
    async fn put(&self, entry: StoredEntry) -> Result<(), StorageError>;

    /// Returns `true` if an entry was removed.
    async fn delete(&self, key: &RequestKey) -> Result<bool, StorageError>;

    async fn keys(&self) -> Result<Vec<RequestKey>, StorageError>;
}

/// Rejects names that could escape a storage root or collide with
/// bookkeeping files.
pub(crate) fn validate_store_name(name: &str) -> Result<(), StorageError> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.starts_with('.')
        || name.contains(['/', '\\', '\0']);
    if bad {
        Err(StorageError::InvalidName(name.to_owned()))
    } else {
        Ok(())
    }
}
