#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use imgcache::cache::{
    CacheStats, Engine, EngineConfig, ManualClock, MemoryStorage, RequestKey, Storage,
    StorageError, Store, StoredEntry,
};
use imgcache::fetch::{FetchError, Fetcher};
use imgcache::http::{Request, Response, StatusCode};

/// 2023-11-14T22:13:20Z
pub const T: u64 = 1_700_000_000_000;

/// Upstream stand-in that counts calls and answers with a configurable status.
pub struct MockFetcher {
    calls: AtomicUsize,
    status: AtomicU16,
    offline: AtomicBool,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            status: AtomicU16::new(200),
            offline: AtomicBool::new(false),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_status(&self, status: u16) {
        self.status.store(status, Ordering::SeqCst);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

#[async_trait]
impl Fetcher for MockFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(FetchError::Other("network unreachable".into()));
        }
        let status = StatusCode::from_u16(self.status.load(Ordering::SeqCst)).unwrap();
        Ok(Response::new(status)
            .header("Content-Type", "image/png")
            .body(format!("bytes of {}", request.url())))
    }
}

/// An engine wired to in-memory collaborators the test can reach into.
pub struct Rig {
    pub engine: Engine,
    pub storage: Arc<MemoryStorage>,
    pub fetcher: Arc<MockFetcher>,
    pub clock: Arc<ManualClock>,
    pub stats: Arc<CacheStats>,
}

impl Rig {
    pub fn new(config: EngineConfig) -> Self {
        Self::with_storage(config, Arc::new(MemoryStorage::new()))
    }

    pub fn with_storage(config: EngineConfig, storage: Arc<MemoryStorage>) -> Self {
        let fetcher = Arc::new(MockFetcher::new());
        let clock = Arc::new(ManualClock::new(T));
        let stats = Arc::new(CacheStats::new());
        let engine = Engine::new(config, storage.clone(), fetcher.clone())
            .with_clock(clock.clone())
            .with_observer(stats.clone());
        Self {
            engine,
            storage,
            fetcher,
            clock,
            stats,
        }
    }

    /// Installed and activated.
    pub async fn active(config: EngineConfig) -> Self {
        let rig = Self::new(config);
        rig.engine.install().unwrap();
        rig.engine.activate().await.unwrap();
        rig
    }

    pub async fn store(&self) -> Arc<dyn Store> {
        self.storage
            .open(&self.engine.config().store_name)
            .await
            .unwrap()
    }

    pub async fn entry(&self, url: &str) -> Option<StoredEntry> {
        self.store()
            .await
            .get(&RequestKey::new("GET", url))
            .await
            .unwrap()
    }
}

/// A stored image entry stamped with `expires_at`, or unstamped if `None`.
pub fn image_entry(url: &str, expires_at: Option<u64>) -> StoredEntry {
    let response = Response::new(StatusCode::OK)
        .header("Content-Type", "image/png")
        .body(format!("cached {url}"));
    let key = RequestKey::new("GET", url);
    match expires_at {
        Some(at) => StoredEntry::stamp(key, &response, at),
        None => StoredEntry::from_parts(key, &response),
    }
}

/// Storage whose stores fail every operation on one URL.
pub struct FlakyStorage {
    inner: MemoryStorage,
    bad_url: String,
}

impl FlakyStorage {
    pub fn new(inner: MemoryStorage, bad_url: &str) -> Self {
        Self {
            inner,
            bad_url: bad_url.to_owned(),
        }
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn open(&self, name: &str) -> Result<Arc<dyn Store>, StorageError> {
        let inner = self.inner.open(name).await?;
        Ok(Arc::new(FlakyStore {
            inner,
            bad_url: self.bad_url.clone(),
        }))
    }

    async fn names(&self) -> Result<Vec<String>, StorageError> {
        self.inner.names().await
    }

    async fn delete(&self, name: &str) -> Result<bool, StorageError> {
        self.inner.delete(name).await
    }
}

struct FlakyStore {
    inner: Arc<dyn Store>,
    bad_url: String,
}

impl FlakyStore {
    fn check(&self, key: &RequestKey) -> Result<(), StorageError> {
        if key.url == self.bad_url {
            Err(StorageError::Unavailable(format!("injected failure for {}", key.url)))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Store for FlakyStore {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self, key: &RequestKey) -> Result<Option<StoredEntry>, StorageError> {
        self.check(key)?;
        self.inner.get(key).await
    }

    async fn put(&self, entry: StoredEntry) -> Result<(), StorageError> {
        self.check(entry.key())?;
        self.inner.put(entry).await
    }

    async fn delete(&self, key: &RequestKey) -> Result<bool, StorageError> {
        self.check(key)?;
        self.inner.delete(key).await
    }

    async fn keys(&self) -> Result<Vec<RequestKey>, StorageError> {
        self.inner.keys().await
    }
}
