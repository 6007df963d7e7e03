//! Request view handed to interceptors
//!
//! hyper frames the request head; [`HttpRequest`] keeps the pieces the
//! segment server looks at (method bitmask, target, version, headers) next
//! to the fully buffered body.

use bytes::Bytes;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::Version;

use super::method::HttpMethod;
use crate::error::{Error, Result};

/// A received HTTP request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Request method
    pub method: HttpMethod,
    /// Request target as sent (path plus optional query)
    pub target: String,
    /// Protocol version
    pub version: Version,
    headers: HeaderMap,
    /// Request body (empty for GET/HEAD)
    pub body: Bytes,
}

impl HttpRequest {
    /// Build a request by hand (used by tests and in-process callers)
    pub fn new(method: HttpMethod, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            version: Version::HTTP_11,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Take method, target, version and headers from a hyper request head
    pub fn from_hyper<B>(head: &hyper::Request<B>, body: Bytes) -> Self {
        let target = head
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| head.uri().path().to_string());

        Self {
            method: HttpMethod::from_token(head.method().as_str()),
            target,
            version: head.version(),
            headers: head.headers().clone(),
            body,
        }
    }

    /// Append a header, builder style. Invalid names or values are ignored.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!(header = %name, "Ignoring invalid request header"),
        }
        self
    }

    /// First header value with a case-insensitive name match
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// `Origin` header, if any
    pub fn origin(&self) -> Option<&str> {
        self.header(header::ORIGIN.as_str())
    }

    /// Target without the query string
    pub fn path(&self) -> &str {
        match self.target.find('?') {
            Some(idx) => &self.target[..idx],
            None => &self.target,
        }
    }

    /// Whether the client asked to keep the connection open.
    ///
    /// HTTP/1.1 defaults to keep-alive, HTTP/1.0 defaults to close.
    pub fn wants_keep_alive(&self) -> bool {
        match self.header(header::CONNECTION.as_str()) {
            Some(value) if value.eq_ignore_ascii_case("close") => false,
            Some(value) if value.eq_ignore_ascii_case("keep-alive") => true,
            _ => self.version == Version::HTTP_11,
        }
    }
}

/// Declared body length, checked against `max_body_size`.
///
/// A missing header is a zero-length body. Values that do not parse, or
/// exceed the limit, are rejected before any of the body is read.
pub fn declared_body_len(headers: &HeaderMap, max_body_size: usize) -> Result<usize> {
    let value = match headers.get(header::CONTENT_LENGTH) {
        Some(value) => value,
        None => return Ok(0),
    };

    let length = value
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .ok_or_else(|| Error::BadRequest(format!("invalid Content-Length: {:?}", value)))?;

    match usize::try_from(length) {
        Ok(length) if length <= max_body_size => Ok(length),
        _ => Err(Error::BadRequest(format!(
            "Content-Length {} exceeds limit of {} bytes",
            length, max_body_size
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn head(raw_headers: &[(&str, &str)]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        for (name, value) in raw_headers {
            headers.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        headers
    }

    #[test]
    fn test_from_hyper() {
        let hyper_request = hyper::Request::builder()
            .method("GET")
            .uri("/live/stream1/index.m3u8?token=abc")
            .header("Host", "example.com")
            .header("Origin", "https://x.com")
            .body(())
            .unwrap();

        let request = HttpRequest::from_hyper(&hyper_request, Bytes::new());

        assert_eq!(request.method, HttpMethod::GET);
        assert_eq!(request.target, "/live/stream1/index.m3u8?token=abc");
        assert_eq!(request.path(), "/live/stream1/index.m3u8");
        assert_eq!(request.header("host"), Some("example.com"));
        assert_eq!(request.origin(), Some("https://x.com"));
        assert!(request.body.is_empty());
    }

    #[test]
    fn test_from_hyper_keeps_body() {
        let hyper_request = hyper::Request::builder()
            .method("POST")
            .uri("/a/b/c.txt")
            .body(())
            .unwrap();

        let request = HttpRequest::from_hyper(&hyper_request, Bytes::from_static(b"hello"));
        assert_eq!(request.method, HttpMethod::POST);
        assert_eq!(&request.body[..], b"hello");
    }

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let request = HttpRequest::new(HttpMethod::GET, "/").with_header("X-Stream-Id", "42");
        assert_eq!(request.header("x-stream-id"), Some("42"));
        assert_eq!(request.header("X-STREAM-ID"), Some("42"));
        assert_eq!(request.headers().len(), 1);
    }

    #[test]
    fn test_invalid_header_is_ignored() {
        let request = HttpRequest::new(HttpMethod::GET, "/").with_header("bad name", "x");
        assert!(request.headers().is_empty());
    }

    #[test]
    fn test_keep_alive_defaults() {
        let v11 = HttpRequest::new(HttpMethod::GET, "/");
        assert!(v11.wants_keep_alive());

        let close = HttpRequest::new(HttpMethod::GET, "/").with_header("connection", "Close");
        assert!(!close.wants_keep_alive());

        let mut v10 = HttpRequest::new(HttpMethod::GET, "/");
        v10.version = Version::HTTP_10;
        assert!(!v10.wants_keep_alive());
    }

    #[test]
    fn test_declared_body_len() {
        assert_eq!(declared_body_len(&head(&[]), 1024).unwrap(), 0);
        assert_eq!(declared_body_len(&head(&[("Content-Length", "5")]), 1024).unwrap(), 5);
        assert_eq!(declared_body_len(&head(&[("Content-Length", "1024")]), 1024).unwrap(), 1024);
    }

    #[test]
    fn test_declared_body_len_rejects_max_u64() {
        let headers = head(&[("Content-Length", "18446744073709551615")]);
        assert!(matches!(
            declared_body_len(&headers, 8192),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_declared_body_len_rejects_over_limit() {
        let headers = head(&[("Content-Length", "1025")]);
        assert!(matches!(
            declared_body_len(&headers, 1024),
            Err(Error::BadRequest(_))
        ));
    }

    #[test]
    fn test_declared_body_len_rejects_garbage() {
        let headers = head(&[("Content-Length", "12abc")]);
        assert!(declared_body_len(&headers, 1024).is_err());
    }
}
