//! HTTP requests: built programmatically by hosts, or parsed off the wire
//! with [`httparse`] by the proxy server.

use bytes::Bytes;
use thiserror::Error;
use url::Url;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("origin-form target `{target}` needs a Host header")]
    MissingHost { target: String },
}

/// An outgoing HTTP request as seen by the cache engine.
///
/// The request always carries an absolute URL; together with the method it
/// forms the request identity the cache is keyed by.
///
/// # Examples
///
/// ```
/// use imgcache::http::{Method, Request};
///
/// let request = Request::get("http://example.com/img/logo.png")
///     .header("Accept", "image/*");
///
/// assert_eq!(request.method(), &Method::Get);
/// assert_eq!(request.url(), "http://example.com/img/logo.png");
/// assert_eq!(request.path().as_deref(), Some("/img/logo.png"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    url: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Creates a request with no headers and an empty body.
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            version: 1,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Shorthand for `Request::new(Method::Get, url)`.
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse a proxy request head from a byte slice.
    ///
    /// Absolute-form targets (`GET http://host/path HTTP/1.1`) are taken as-is;
    /// origin-form targets are resolved against the `Host` header. Returns the
    /// parsed `Request` with an empty body and the byte offset at which the body
    /// begins in `buf`.
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`]: more data is needed to complete the request headers.
    /// - [`RequestError::Parse`]: the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`]: a required field (method, path, version) is absent.
    /// - [`RequestError::MissingHost`]: an origin-form target arrived without `Host`.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = match raw_req.method {
            Some(m) => match m.parse() {
                Ok(method) => method,
                Err(never) => match never {},
            },
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let url = if target.starts_with("http://") || target.starts_with("https://") {
            target.to_owned()
        } else {
            let host = header_map
                .get("host")
                .ok_or_else(|| RequestError::MissingHost {
                    target: target.to_owned(),
                })?;
            format!("http://{host}{target}")
        };

        Ok((
            Self {
                method,
                url,
                version,
                headers: header_map,
                body: Bytes::new(),
            },
            body_offset,
        ))
    }

    /// Attaches the body once the server has buffered it.
    pub fn set_body(&mut self, body: Bytes) {
        self.body = body;
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the absolute request URL, query string included.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the URL path, or `None` if the URL does not parse.
    pub fn path(&self) -> Option<String> {
        Url::parse(&self.url).ok().map(|u| u.path().to_owned())
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.trim().parse().ok()
    }
}
