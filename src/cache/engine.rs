//! The cache interception engine.
//!
//! An [`Engine`] is bound to one versioned store. Once installed and
//! activated it answers image requests from that store while their entries
//! are fresh, refetches and restamps them once stale, and passes every other
//! request through untouched.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::classify::is_image_request;
use super::clock::{Clock, SystemClock, format_millis};
use super::entry::{Freshness, StoredEntry};
use super::key::RequestKey;
use super::message::HostMessage;
use super::observer::CacheObserver;
use super::storage::{Storage, StorageError, Store};
use crate::fetch::{FetchError, Fetcher};
use crate::http::{Request, Response, StatusCode};

/// Store name used when none is configured.
pub const DEFAULT_STORE_NAME: &str = "image-cache-v1";

/// 72 hours.
pub const DEFAULT_TTL_MILLIS: u64 = 72 * 60 * 60 * 1000;

/// Engine settings fixed at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Name of the store this engine version owns. Every other store is
    /// deleted at activation.
    pub store_name: String,
    /// Lifetime of a cached entry, counted from the moment it was stored.
    pub ttl_millis: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            store_name: DEFAULT_STORE_NAME.to_owned(),
            ttl_millis: DEFAULT_TTL_MILLIS,
        }
    }
}

impl EngineConfig {
    pub fn new(store_name: impl Into<String>, ttl_millis: u64) -> Self {
        Self {
            store_name: store_name.into(),
            ttl_millis,
        }
    }

    /// The default configuration with the store named `image-cache-v<version>`.
    pub fn versioned(version: u32) -> Self {
        Self {
            store_name: format!("image-cache-v{version}"),
            ..Self::default()
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_millis)
    }
}

/// Lifecycle of an engine instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninstalled,
    Installing,
    Activating,
    Active,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninstalled => "uninstalled",
            Self::Installing => "installing",
            Self::Activating => "activating",
            Self::Active => "active",
        })
    }
}

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("network fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("cache storage failed: {0}")]
    Storage(#[from] StorageError),

    #[error("cannot {action} an engine that is {state}")]
    Lifecycle {
        state: EngineState,
        action: &'static str,
    },
}

/// What the engine decided to do with an intercepted request.
#[derive(Debug)]
pub enum Outcome {
    /// Not the engine's business; the host should perform the request itself.
    PassThrough,
    /// The engine produced the response, from the store or the network.
    Handled(Response),
}

/// Result of [`Engine::activate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActivationReport {
    /// Stores from other engine versions that were removed.
    pub deleted_stores: Vec<String>,
    /// The engine took control of already-running clients.
    pub claimed_clients: bool,
}

/// Result of [`Engine::sweep`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub removed: usize,
    /// Entries that could not be read or deleted.
    pub failed: usize,
}

/// The cache interception engine.
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use imgcache::cache::{DiskStorage, Engine, EngineConfig, Outcome};
/// use imgcache::fetch::HttpFetcher;
/// use imgcache::http::Request;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let engine = Engine::new(
///     EngineConfig::versioned(1),
///     Arc::new(DiskStorage::new("/var/cache/imgcache")),
///     Arc::new(HttpFetcher::default()),
/// );
/// engine.install()?;
/// engine.activate().await?;
///
/// match engine.intercept(&Request::get("http://example.com/logo.png")).await? {
///     Outcome::Handled(response) => println!("{}", response.status()),
///     Outcome::PassThrough => println!("not an image"),
/// }
/// # Ok(())
/// # }
/// ```
pub struct Engine {
    config: EngineConfig,
    storage: Arc<dyn Storage>,
    fetcher: Arc<dyn Fetcher>,
    clock: Arc<dyn Clock>,
    observer: Option<Arc<dyn CacheObserver>>,
    state: Mutex<EngineState>,
    skip_waiting: AtomicBool,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Creates an uninstalled engine reading the system clock.
    pub fn new(config: EngineConfig, storage: Arc<dyn Storage>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            config,
            storage,
            fetcher,
            clock: Arc::new(SystemClock),
            observer: None,
            state: Mutex::new(EngineState::Uninstalled),
            skip_waiting: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn CacheObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn state(&self) -> EngineState {
        *self.lock_state()
    }

    /// `true` once `install` has asked to take control without waiting for
    /// existing clients to go away.
    pub fn skips_waiting(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // Moves `from -> to` atomically, or reports the state that blocked it.
    fn transition(
        &self,
        from: EngineState,
        to: EngineState,
        action: &'static str,
    ) -> Result<(), EngineError> {
        let mut state = self.lock_state();
        if *state != from {
            return Err(EngineError::Lifecycle {
                state: *state,
                action,
            });
        }
        *state = to;
        Ok(())
    }

    /// Host-initiated install. The engine asks to take control immediately.
    ///
    /// # Errors
    ///
    /// [`EngineError::Lifecycle`] unless the engine is `Uninstalled`.
    pub fn install(&self) -> Result<(), EngineError> {
        self.transition(EngineState::Uninstalled, EngineState::Installing, "install")?;
        self.skip_waiting.store(true, Ordering::SeqCst);
        info!(store = %self.config.store_name, "installing image cache engine");
        Ok(())
    }

    /// Deletes every store not named after this engine's version, then claims
    /// all clients and enters the `Active` state.
    ///
    /// A store that fails to delete is logged and left for the next version
    /// bump; it does not block activation.
    ///
    /// # Errors
    ///
    /// - [`EngineError::Lifecycle`] unless the engine is `Installing`.
    /// - [`EngineError::Storage`] if the store names cannot be listed; the
    ///   engine returns to `Installing` so activation can be retried.
    pub async fn activate(&self) -> Result<ActivationReport, EngineError> {
        self.transition(EngineState::Installing, EngineState::Activating, "activate")?;
        info!(store = %self.config.store_name, "activating image cache engine");

        let names = match self.storage.names().await {
            Ok(names) => names,
            Err(e) => {
                *self.lock_state() = EngineState::Installing;
                return Err(e.into());
            }
        };

        let mut report = ActivationReport::default();
        for name in names {
            if name == self.config.store_name {
                continue;
            }
            match self.storage.delete(&name).await {
                Ok(_) => {
                    info!(store = %name, "deleted old cache");
                    if let Some(observer) = &self.observer {
                        observer.on_store_deleted(&name);
                    }
                    report.deleted_stores.push(name);
                }
                Err(e) => warn!(store = %name, error = %e, "failed to delete old cache"),
            }
        }

        report.claimed_clients = true;
        *self.lock_state() = EngineState::Active;
        debug!(deleted = report.deleted_stores.len(), "engine active, clients claimed");
        Ok(report)
    }

    /// `true` if an active engine would take `request` over.
    pub fn would_intercept(&self, request: &Request) -> bool {
        self.state() == EngineState::Active && is_image_request(request)
    }

    /// Answers `request` from the store, or fetches and stores it.
    ///
    /// Requests that are not image-cacheable `GET`s, and any request made
    /// before the engine is active, yield [`Outcome::PassThrough`].
    ///
    /// # Errors
    ///
    /// - [`EngineError::Fetch`] when the network fetch fails; nothing is stored.
    /// - [`EngineError::Storage`] when the store cannot be read or written.
    pub async fn intercept(&self, request: &Request) -> Result<Outcome, EngineError> {
        if !self.would_intercept(request) {
            return Ok(Outcome::PassThrough);
        }

        let key = RequestKey::from_request(request);
        let store = self.storage.open(&self.config.store_name).await?;

        match store.get(&key).await? {
            Some(entry) => match entry.freshness(self.clock.now_millis()) {
                Freshness::Fresh { .. } => {
                    debug!(url = %key.url, "serving from cache");
                    if let Some(observer) = &self.observer {
                        observer.on_hit(&key);
                    }
                    return Ok(Outcome::Handled(entry.to_response()));
                }
                Freshness::Expired { expires_at } => {
                    debug!(url = %key.url, expired = %format_millis(expires_at), "cache expired");
                    store.delete(&key).await?;
                    if let Some(observer) = &self.observer {
                        observer.on_expired(&key, Some(expires_at));
                    }
                }
                Freshness::Unstamped => {
                    debug!(url = %key.url, "cache entry has no expiration, treating as expired");
                    store.delete(&key).await?;
                    if let Some(observer) = &self.observer {
                        observer.on_expired(&key, None);
                    }
                }
            },
            None => {
                debug!(url = %key.url, "cache miss");
                if let Some(observer) = &self.observer {
                    observer.on_miss(&key);
                }
            }
        }

        self.fetch_and_store(request, key, store.as_ref())
            .await
            .map(Outcome::Handled)
    }

    // Fetches `request`; a 200 is duplicated, stamped, and stored before the
    // untouched original is returned.
    async fn fetch_and_store(
        &self,
        request: &Request,
        key: RequestKey,
        store: &dyn Store,
    ) -> Result<Response, EngineError> {
        let response = match self.fetcher.fetch(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %key.url, error = %e, "fetch failed");
                return Err(e.into());
            }
        };

        if response.status() != StatusCode::OK {
            debug!(url = %key.url, status = %response.status(), "not caching non-200 response");
            if let Some(observer) = &self.observer {
                observer.on_not_stored(&key, response.status());
            }
            return Ok(response);
        }

        let expires_at = self
            .clock
            .now_millis()
            .saturating_add(self.config.ttl_millis);
        let entry = StoredEntry::stamp(key.clone(), &response, expires_at);
        store.put(entry).await?;

        info!(url = %key.url, expires = %format_millis(expires_at), "image cached");
        if let Some(observer) = &self.observer {
            observer.on_stored(&key, expires_at);
        }
        Ok(response)
    }

    /// Deletes every entry whose stamp is at or before now.
    ///
    /// Unstamped entries are left for the next lookup to discard. Failures on
    /// individual entries are counted in the report and do not stop the pass.
    ///
    /// # Errors
    ///
    /// [`EngineError::Storage`] if the store cannot be opened or enumerated.
    pub async fn sweep(&self) -> Result<SweepReport, EngineError> {
        let store = self.storage.open(&self.config.store_name).await?;
        let keys = store.keys().await?;
        let now = self.clock.now_millis();

        let mut report = SweepReport::default();
        for key in keys {
            report.scanned += 1;
            let entry = match store.get(&key).await {
                Ok(Some(entry)) => entry,
                Ok(None) => continue,
                Err(e) => {
                    warn!(url = %key.url, error = %e, "sweep could not read entry");
                    report.failed += 1;
                    continue;
                }
            };

            if !matches!(entry.freshness(now), Freshness::Expired { .. }) {
                continue;
            }
            match store.delete(&key).await {
                Ok(true) => report.removed += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!(url = %key.url, error = %e, "sweep could not delete entry");
                    report.failed += 1;
                }
            }
        }

        info!(
            removed = report.removed,
            scanned = report.scanned,
            failed = report.failed,
            "cleaned up expired cache entries"
        );
        if let Some(observer) = &self.observer {
            observer.on_sweep(&report);
        }
        Ok(report)
    }

    /// Handles a structured host message.
    ///
    /// `{"type": "CLEANUP_CACHE"}` runs [`sweep`](Self::sweep) and returns its
    /// report; any other message is ignored and yields `None`.
    pub async fn handle_message(&self, message: &Value) -> Result<Option<SweepReport>, EngineError> {
        match HostMessage::from_value(message) {
            Some(HostMessage::CleanupCache) => self.sweep().await.map(Some),
            None => {
                debug!(%message, "ignoring unrecognized message");
                Ok(None)
            }
        }
    }
}
