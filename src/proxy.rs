//! Forward-proxy request handling.
//!
//! Every request reaching the proxy is offered to the engine first. Requests
//! the engine passes through are fetched directly. One path is reserved for
//! the host message channel: `POST /__imgcache/message` with a JSON body.

use std::sync::Arc;

use tracing::{error, warn};

use crate::cache::{EngineError, Outcome};
use crate::fetch::{FetchError, Fetcher};
use crate::host::Host;
use crate::http::{Method, Request, Response, StatusCode};

/// Path of the message endpoint, on any host.
pub const MESSAGE_PATH: &str = "/__imgcache/message";

/// Dispatches proxied requests through the cache engine.
pub struct Proxy {
    host: Arc<Host>,
    fetcher: Arc<dyn Fetcher>,
}

impl Proxy {
    /// `fetcher` serves pass-through traffic; it is usually the same one the
    /// engine fetches with.
    pub fn new(host: Arc<Host>, fetcher: Arc<dyn Fetcher>) -> Self {
        Self { host, fetcher }
    }

    pub async fn handle(&self, request: Request) -> Response {
        if request.method() == &Method::Post && request.path().as_deref() == Some(MESSAGE_PATH) {
            return self.handle_message(&request).await;
        }

        match self.host.engine().intercept(&request).await {
            Ok(Outcome::Handled(response)) => response,
            Ok(Outcome::PassThrough) => match self.fetcher.fetch(&request).await {
                Ok(response) => response,
                Err(e) => bad_gateway(request.url(), &e),
            },
            Err(EngineError::Fetch(e)) => bad_gateway(request.url(), &e),
            Err(e) => {
                error!(url = %request.url(), error = %e, "cache engine failed");
                Response::new(StatusCode::INTERNAL_SERVER_ERROR).body("cache engine failure")
            }
        }
    }

    async fn handle_message(&self, request: &Request) -> Response {
        let message: serde_json::Value = match serde_json::from_slice(request.body()) {
            Ok(message) => message,
            Err(e) => {
                return Response::new(StatusCode::BAD_REQUEST).body(format!("invalid JSON: {e}"));
            }
        };

        match self.host.post_message(message).await {
            Ok(Some(report)) => match serde_json::to_string(&report) {
                Ok(json) => Response::new(StatusCode::OK)
                    .header("Content-Type", "application/json")
                    .body(json),
                Err(e) => {
                    error!(error = %e, "failed to encode sweep report");
                    Response::new(StatusCode::INTERNAL_SERVER_ERROR)
                }
            },
            Ok(None) => Response::new(StatusCode::ACCEPTED).body("ignored"),
            Err(e) => {
                error!(error = %e, "message handling failed");
                Response::new(StatusCode::INTERNAL_SERVER_ERROR).body(e.to_string())
            }
        }
    }
}

fn bad_gateway(url: &str, e: &FetchError) -> Response {
    warn!(%url, error = %e, "upstream fetch failed");
    Response::new(StatusCode::BAD_GATEWAY).body(format!("upstream fetch failed: {e}"))
}
