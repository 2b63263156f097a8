//! Request classification: is this a request for an image we may cache?

use url::Url;

use crate::http::Request;

/// Path suffixes recognized as images, matched against the lowercased path.
pub const IMAGE_EXTENSIONS: &[&str] = &[
    ".jpg", ".jpeg", ".png", ".gif", ".webp", ".svg", ".bmp", ".ico",
];

const IMAGE_MEDIA_PREFIX: &str = "image/";

/// Returns `true` if `request` is a `GET` whose URL path ends in a known image
/// suffix or whose declared `Content-Type` is an `image/*` type.
///
/// A URL that fails to parse is never an image request.
///
/// # Examples
///
/// ```
/// use imgcache::cache::is_image_request;
/// use imgcache::http::{Method, Request};
///
/// assert!(is_image_request(&Request::get("https://example.com/LOGO.PNG")));
/// assert!(is_image_request(
///     &Request::get("https://example.com/avatar?id=7").header("Content-Type", "image/avif")
/// ));
/// assert!(!is_image_request(&Request::new(Method::Post, "https://example.com/a.png")));
/// assert!(!is_image_request(&Request::get("::not a url::/a.png")));
/// ```
pub fn is_image_request(request: &Request) -> bool {
    if !request.method().is_read_only() {
        return false;
    }
    let Ok(url) = Url::parse(request.url()) else {
        return false;
    };
    has_image_extension(url.path()) || declares_image_type(request)
}

fn has_image_extension(path: &str) -> bool {
    let path = path.to_ascii_lowercase();
    IMAGE_EXTENSIONS.iter().any(|ext| path.ends_with(ext))
}

fn declares_image_type(request: &Request) -> bool {
    request
        .headers()
        .get("content-type")
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with(IMAGE_MEDIA_PREFIX))
        .unwrap_or(false)
}
