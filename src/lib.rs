//! # imgcache
//!
//! An image-caching interception engine with fixed-TTL expiration.
//!
//! Requests are offered to an [`Engine`](cache::Engine). Image `GET`s are
//! served from a versioned store while their entries are fresh, refetched and
//! restamped once stale, and everything else passes through. A
//! [`Host`](host::Host) drives the engine's lifecycle and periodic sweeps; the
//! [`proxy`] and [`server`] modules put it in front of real HTTP traffic.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use imgcache::cache::{Engine, EngineConfig, MemoryStorage, Outcome};
//! use imgcache::fetch::HttpFetcher;
//! use imgcache::host::{Host, HostOptions};
//! use imgcache::http::Request;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = Engine::new(
//!         EngineConfig::default(),
//!         Arc::new(MemoryStorage::new()),
//!         Arc::new(HttpFetcher::new()),
//!     );
//!     let host = Host::start(Arc::new(engine), HostOptions::default()).await?;
//!
//!     let request = Request::get("http://example.com/img/logo.png");
//!     if let Outcome::Handled(response) = host.engine().intercept(&request).await? {
//!         println!("{}", response.status());
//!     }
//!     host.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod fetch;
pub mod host;
pub mod http;
pub mod proxy;
pub mod server;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use cache::{Engine, EngineConfig, EngineError, Outcome};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use server::{Server, ServerError};
