//! Minimal HTTP/1.0 client used as the default [`Fetcher`].
//!
//! Each fetch opens a fresh TCP connection, sends the request with
//! `Connection: close`, and reads until the peer closes. Only `http://`
//! URLs are supported; TLS is left to a fetcher that wraps a full client.

use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;
use url::{Position, Url};

use super::{FetchError, Fetcher};
use crate::http::{Request, Response};

/// Default cap on a buffered upstream response (32 MiB).
pub const DEFAULT_MAX_RESPONSE_BYTES: usize = 32 * 1024 * 1024;

const READ_CHUNK: usize = 16 * 1024;

/// Headers the client writes itself.
const MANAGED: &[&str] = &["host", "content-length", "proxy-authorization"];

/// HTTP/1.x fetcher over plain TCP.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    timeout: Option<Duration>,
    max_response_bytes: usize,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self {
            timeout: None,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
        }
    }
}

impl HttpFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the whole exchange (connect, write, read).
    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn max_response_bytes(mut self, max: usize) -> Self {
        self.max_response_bytes = max;
        self
    }

    async fn exchange(&self, url: &Url, request: &Request) -> Result<Response, FetchError> {
        let host = url
            .host_str()
            .ok_or_else(|| FetchError::MissingHost(url.to_string()))?;
        let port = url.port_or_known_default().unwrap_or(80);
        let addr = format!("{host}:{port}");

        let mut stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| FetchError::Connect {
                addr: addr.clone(),
                source,
            })?;

        let head = request_head(url, request);
        stream.write_all(&head).await?;
        if !request.body().is_empty() {
            stream.write_all(request.body()).await?;
        }
        stream.flush().await?;

        let mut buf = BytesMut::with_capacity(READ_CHUNK);
        loop {
            if buf.len() > self.max_response_bytes {
                return Err(FetchError::TooLarge {
                    max_bytes: self.max_response_bytes,
                });
            }
            buf.reserve(READ_CHUNK);
            if stream.read_buf(&mut buf).await? == 0 {
                break;
            }
        }

        let response = Response::parse_for(&buf, request.method())?;
        debug!(%addr, status = %response.status(), bytes = buf.len(), "upstream responded");
        Ok(response)
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response, FetchError> {
        let url = Url::parse(request.url()).map_err(|source| FetchError::InvalidUrl {
            url: request.url().to_owned(),
            source,
        })?;
        if url.scheme() != "http" {
            return Err(FetchError::UnsupportedScheme(url.scheme().to_owned()));
        }

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.exchange(&url, request))
                .await
                .map_err(|_| FetchError::Timeout(limit))?,
            None => self.exchange(&url, request).await,
        }
    }
}

// Serializes the request line and headers in origin-form.
fn request_head(url: &Url, request: &Request) -> BytesMut {
    let target = &url[Position::BeforePath..Position::AfterQuery];
    let target = if target.is_empty() { "/" } else { target };
    let authority = &url[Position::BeforeHost..Position::AfterPort];

    let mut head = BytesMut::with_capacity(256);
    head.put(format!("{} {} HTTP/1.0\r\n", request.method(), target).as_bytes());
    head.put(format!("Host: {authority}\r\n").as_bytes());
    for (name, value) in request.headers().end_to_end() {
        if MANAGED.iter().any(|m| m.eq_ignore_ascii_case(name)) {
            continue;
        }
        head.put(format!("{name}: {value}\r\n").as_bytes());
    }
    if !request.body().is_empty() {
        head.put(format!("Content-Length: {}\r\n", request.body().len()).as_bytes());
    }
    head.put(&b"Connection: close\r\n\r\n"[..]);
    head
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Method, StatusCode};
    use tokio::net::TcpListener;

    // Serves one canned response and hands back the raw request it received.
    async fn one_shot(reply: &'static [u8]) -> (String, tokio::task::JoinHandle<Vec<u8>>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut received = Vec::new();
            let mut chunk = [0u8; 1024];
            while !received.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&chunk[..n]);
            }
            socket.write_all(reply).await.unwrap();
            socket.shutdown().await.unwrap();
            received
        });
        (format!("http://{addr}"), task)
    }

    #[tokio::test]
    async fn fetches_image_over_tcp() {
        let (base, server) =
            one_shot(b"HTTP/1.0 200 OK\r\nContent-Type: image/gif\r\nContent-Length: 3\r\n\r\nGIF")
                .await;
        let request = Request::get(format!("{base}/img/a.gif?v=1"))
            .header("Accept", "image/*")
            .header("Connection", "keep-alive");

        let response = HttpFetcher::new().fetch(&request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body_ref().as_ref(), b"GIF");

        let sent = String::from_utf8(server.await.unwrap()).unwrap();
        assert!(sent.starts_with("GET /img/a.gif?v=1 HTTP/1.0\r\n"));
        assert!(sent.contains("Accept: image/*\r\n"));
        assert!(sent.contains("Connection: close\r\n"));
        assert!(!sent.contains("keep-alive"));
    }

    #[tokio::test]
    async fn non_success_status_is_not_an_error() {
        let (base, _server) = one_shot(b"HTTP/1.0 404 Not Found\r\n\r\nnope").await;
        let response = HttpFetcher::new()
            .fetch(&Request::get(format!("{base}/missing.png")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn not_modified_with_content_length_is_returned() {
        let (base, _server) = one_shot(
            b"HTTP/1.1 304 Not Modified\r\nETag: \"v1\"\r\nContent-Length: 2048\r\n\r\n",
        )
        .await;
        let request =
            Request::get(format!("{base}/logo.png")).header("If-None-Match", "\"v1\"");
        let response = HttpFetcher::new().fetch(&request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_MODIFIED);
        assert_eq!(response.headers().get("etag"), Some("\"v1\""));
        assert!(response.body_ref().is_empty());
    }

    #[tokio::test]
    async fn head_reply_has_no_body() {
        let (base, server) = one_shot(
            b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nContent-Length: 4096\r\n\r\n",
        )
        .await;
        let request = Request::new(Method::Head, format!("{base}/logo.png"));
        let response = HttpFetcher::new().fetch(&request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.body_ref().is_empty());

        let sent = String::from_utf8(server.await.unwrap()).unwrap();
        assert!(sent.starts_with("HEAD /logo.png HTTP/1.0\r\n"));
    }

    #[tokio::test]
    async fn oversized_response_is_rejected() {
        let (base, _server) =
            one_shot(b"HTTP/1.0 200 OK\r\n\r\n0123456789012345678901234567890123456789").await;
        let result = HttpFetcher::new()
            .max_response_bytes(8)
            .fetch(&Request::get(format!("{base}/big.png")))
            .await;
        assert!(matches!(result, Err(FetchError::TooLarge { max_bytes: 8 })));
    }

    #[tokio::test]
    async fn https_is_unsupported() {
        let result = HttpFetcher::new()
            .fetch(&Request::get("https://example.com/a.png"))
            .await;
        assert!(matches!(result, Err(FetchError::UnsupportedScheme(s)) if s == "https"));
    }

    #[tokio::test]
    async fn refused_connection_is_a_connect_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let result = HttpFetcher::new()
            .fetch(&Request::get(format!("http://{addr}/a.png")))
            .await;
        assert!(matches!(result, Err(FetchError::Connect { .. })));
    }

    #[test]
    fn head_uses_origin_form_and_authority() {
        let url = Url::parse("http://cdn.example.com:8080/a%20b.png?x=1#frag").unwrap();
        let request = Request::get(url.as_str()).header("Host", "spoofed");
        let head = String::from_utf8(request_head(&url, &request).to_vec()).unwrap();
        assert!(head.starts_with("GET /a%20b.png?x=1 HTTP/1.0\r\n"));
        assert!(head.contains("Host: cdn.example.com:8080\r\n"));
        assert!(!head.contains("spoofed"));
        assert!(head.ends_with("Connection: close\r\n\r\n"));
    }
}
