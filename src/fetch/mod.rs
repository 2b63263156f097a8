//! Network boundary: performing a request for real.
//!
//! The engine only knows the [`Fetcher`] trait; [`HttpFetcher`] is the
//! bundled HTTP/1.x implementation over Tokio TCP.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::http::{Request, Response, response::ResponseError};

pub mod http;

pub use self::http::HttpFetcher;

/// Errors produced while fetching from the network.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid URL `{url}`: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("unsupported URL scheme `{0}`")]
    UnsupportedScheme(String),

    #[error("URL `{0}` has no host")]
    MissingHost(String),

    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed upstream response: {0}")]
    Malformed(#[from] ResponseError),

    #[error("upstream response exceeds {max_bytes} bytes")]
    TooLarge { max_bytes: usize },

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    /// Failure reported by a non-HTTP fetcher implementation.
    #[error("{0}")]
    Other(String),
}

/// Performs a request against the network.
///
/// A non-success status is a successful fetch; only transport-level failures
/// are errors.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError>;
}
