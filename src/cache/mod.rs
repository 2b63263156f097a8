//! Image cache: classification, stored entries, storage backends, and the
//! interception engine that ties them together.

pub mod classify;
pub mod clock;
pub mod disk;
pub mod engine;
pub mod entry;
pub mod key;
pub mod memory;
pub mod message;
pub mod observer;
pub mod storage;

pub use classify::{IMAGE_EXTENSIONS, is_image_request};
pub use clock::{Clock, ManualClock, SystemClock};
pub use disk::DiskStorage;
pub use engine::{
    ActivationReport, DEFAULT_STORE_NAME, DEFAULT_TTL_MILLIS, Engine, EngineConfig, EngineError,
    EngineState, Outcome, SweepReport,
};
pub use entry::{EXPIRES_HEADER, Freshness, StoredEntry};
pub use key::RequestKey;
pub use memory::MemoryStorage;
pub use message::HostMessage;
pub use observer::{CacheObserver, CacheStats, StatsSnapshot};
pub use storage::{Storage, StorageError, Store};
