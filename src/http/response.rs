//! HTTP/1.x responses.
//!
//! Responses are built fluently, parsed from upstream bytes with [`httparse`],
//! and serialized back to the wire for the proxy's clients. Bodies are
//! [`Bytes`], so duplicating a response for the cache is cheap.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{Headers, Method, StatusCode, headers::is_hop_by_hop};

/// Errors produced while parsing an upstream response.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("response is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("invalid status code {0}")]
    InvalidStatus(u16),

    #[error("body shorter than Content-Length: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("malformed chunked body")]
    BadChunk,
}

/// An HTTP response.
///
/// # Examples
///
/// ```
/// use imgcache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK)
///     .header("Content-Type", "image/svg+xml")
///     .body("<svg/>");
///
/// let bytes = response.into_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 6\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    reason: Option<String>,
    headers: Headers,
    body: Bytes,
    keep_alive: bool,
}

impl Response {
    /// Maximum number of headers accepted from an upstream response.
    const MAX_HEADERS: usize = 96;

    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            headers: Headers::new(),
            body: Bytes::new(),
            keep_alive: true,
        }
    }

    /// Rebuilds a response from stored parts.
    pub fn from_parts(
        status: StatusCode,
        reason: Option<String>,
        headers: Headers,
        body: Bytes,
    ) -> Self {
        Self {
            status,
            reason,
            headers,
            body,
            keep_alive: true,
        }
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Controls whether the `Connection: keep-alive` or `Connection: close` header is written.
    #[must_use]
    pub fn keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the reason phrase the upstream sent, if any.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    pub fn body_ref(&self) -> &Bytes {
        &self.body
    }

    /// Parses a complete upstream response to a `GET` held in `buf`.
    ///
    /// See [`parse_for`](Self::parse_for).
    pub fn parse(buf: &[u8]) -> Result<Self, ResponseError> {
        Self::parse_for(buf, &Method::Get)
    }

    /// Parses a complete upstream response to a `method` request held in `buf`.
    ///
    /// Replies to `HEAD` and `1xx`, `204` and `304` statuses never carry a
    /// body, whatever their `Content-Length` says. Otherwise the body is
    /// decoded when `Transfer-Encoding: chunked`, delimited by
    /// `Content-Length` when present, and runs to the end of `buf` (the
    /// connection was read until close) when neither is.
    pub fn parse_for(buf: &[u8], method: &Method) -> Result<Self, ResponseError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw = httparse::Response::new(&mut headers);

        let body_offset = match raw.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(ResponseError::Incomplete),
        };

        let code = raw.code.ok_or(ResponseError::Incomplete)?;
        let status = StatusCode::from_u16(code).ok_or(ResponseError::InvalidStatus(code))?;
        let reason = raw
            .reason
            .filter(|r| !r.is_empty())
            .map(str::to_owned);

        let mut header_map = Headers::with_capacity(raw.headers.len());
        for header in raw.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let rest = &buf[body_offset..];
        let chunked = header_map
            .get("transfer-encoding")
            .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));

        let body = if is_bodiless(status, method) {
            Bytes::new()
        } else if chunked {
            decode_chunked(rest)?
        } else if let Some(len) = header_map
            .get("content-length")
            .and_then(|v| v.trim().parse::<usize>().ok())
        {
            if rest.len() < len {
                return Err(ResponseError::Truncated {
                    expected: len,
                    actual: rest.len(),
                });
            }
            Bytes::copy_from_slice(&rest[..len])
        } else {
            Bytes::copy_from_slice(rest)
        };

        Ok(Self::from_parts(status, reason, header_map, body))
    }

    /// Serializes the response into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Hop-by-hop headers and any stored `Content-Length` are dropped; the
    /// framing headers are always written fresh:
    /// - `Content-Length: <n>`
    /// - `Connection: keep-alive` or `Connection: close`
    pub fn into_bytes(self) -> BytesMut {
        let content_length = self.body.len();
        let estimated_size = 128 + self.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        let reason = self
            .reason
            .as_deref()
            .or_else(|| self.status.canonical_reason())
            .unwrap_or("");

        // Status line
        buf.put(format!("HTTP/1.1 {} {}\r\n", self.status.as_u16(), reason).as_bytes());

        for (name, value) in self.headers.iter() {
            if is_hop_by_hop(name) || name.eq_ignore_ascii_case("content-length") {
                continue;
            }
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        let connection = if self.keep_alive {
            "keep-alive"
        } else {
            "close"
        };
        buf.put(format!("Connection: {connection}\r\n").as_bytes());
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());

        // Header/body separator
        buf.put(&b"\r\n"[..]);

        if !self.body.is_empty() {
            buf.put(self.body.as_ref());
        }

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}

fn is_bodiless(status: StatusCode, method: &Method) -> bool {
    let code = status.as_u16();
    *method == Method::Head
        || (100..200).contains(&code)
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
}

// Decodes a `Transfer-Encoding: chunked` body, ignoring trailers.
fn decode_chunked(mut buf: &[u8]) -> Result<Bytes, ResponseError> {
    let mut out = BytesMut::new();
    loop {
        let (offset, size) = match httparse::parse_chunk_size(buf) {
            Ok(httparse::Status::Complete(pair)) => pair,
            Ok(httparse::Status::Partial) => return Err(ResponseError::Incomplete),
            Err(_) => return Err(ResponseError::BadChunk),
        };
        let size = usize::try_from(size).map_err(|_| ResponseError::BadChunk)?;
        buf = &buf[offset..];
        if size == 0 {
            return Ok(out.freeze());
        }
        if buf.len() < size + 2 {
            return Err(ResponseError::Incomplete);
        }
        out.put(&buf[..size]);
        if &buf[size..size + 2] != b"\r\n" {
            return Err(ResponseError::BadChunk);
        }
        buf = &buf[size + 2..];
    }
}
