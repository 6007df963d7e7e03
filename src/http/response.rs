//! HTTP response building
//!
//! Handlers fill an [`HttpResponse`]; the transport turns it into a hyper
//! response once it comes back from the worker.

use bytes::Bytes;
use http_body_util::Full;
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::StatusCode;

use super::status::HttpStatusCode;
use super::types::HttpConnectionPolicy;

/// An HTTP response waiting to be written to a connection
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: HttpStatusCode,
    headers: HeaderMap,
    /// Response body
    pub body: Bytes,
    /// Suppress the body on the wire (HEAD requests) while keeping Content-Length
    pub head_only: bool,
}

impl HttpResponse {
    /// Create an empty response with the given status
    pub fn new(status: HttpStatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
            head_only: false,
        }
    }

    /// Empty `200 OK`
    pub fn ok() -> Self {
        Self::new(HttpStatusCode::Ok)
    }

    pub fn set_status(&mut self, status: HttpStatusCode) {
        self.status = status;
    }

    /// Set a header, replacing any existing value with the same name.
    ///
    /// Names or values that are not valid on the wire are dropped.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "Dropping invalid response header"),
        }
    }

    /// Header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Remove a header, returning whether it was present
    pub fn remove_header(&mut self, name: &str) -> bool {
        self.headers.remove(name).is_some()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Replace the body and its content type
    pub fn set_body(&mut self, content_type: &str, body: impl Into<Bytes>) {
        self.set_header(header::CONTENT_TYPE.as_str(), content_type);
        self.body = body.into();
    }

    /// Set the `Connection` header from a policy
    pub fn set_connection_policy(&mut self, policy: HttpConnectionPolicy) {
        self.set_header(header::CONNECTION.as_str(), policy.header_value());
    }

    /// Bytes that will go on the wire for the body
    pub fn body_len_on_wire(&self) -> usize {
        if self.head_only {
            0
        } else {
            self.body.len()
        }
    }

    /// Convert into the response hyper writes.
    ///
    /// `Content-Length` always reflects the full body. hyper leaves the body
    /// off the wire for HEAD requests, so a HEAD answer advertises the size
    /// of the GET it mirrors.
    pub fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let content_length = HeaderValue::from(self.body.len());

        let mut response = hyper::Response::new(Full::new(self.body));
        *response.status_mut() =
            StatusCode::from_u16(self.status.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        *response.headers_mut() = self.headers;
        response
            .headers_mut()
            .insert(header::CONTENT_LENGTH, content_length);
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn test_into_hyper() {
        let mut response = HttpResponse::ok();
        response.set_body("text/plain", Bytes::from_static(b"hi"));
        response.set_connection_policy(HttpConnectionPolicy::Closed);

        let hyper_response = response.into_hyper();
        assert_eq!(hyper_response.status(), StatusCode::OK);
        assert_eq!(hyper_response.headers()["content-type"], "text/plain");
        assert_eq!(hyper_response.headers()["connection"], "close");
        assert_eq!(hyper_response.headers()["content-length"], "2");

        let body = hyper_response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"hi");
    }

    #[test]
    fn test_set_header_replaces() {
        let mut response = HttpResponse::ok();
        response.set_header("X-Test", "a");
        response.set_header("x-test", "b");

        assert_eq!(response.headers().len(), 1);
        assert_eq!(response.header("X-TEST"), Some("b"));
        assert!(response.remove_header("X-Test"));
        assert!(!response.remove_header("X-Test"));
    }

    #[test]
    fn test_invalid_header_dropped() {
        let mut response = HttpResponse::ok();
        response.set_header("X-Test", "line\r\nbreak");
        assert!(response.headers().is_empty());
    }

    #[test]
    fn test_head_only_keeps_length() {
        let mut response = HttpResponse::ok();
        response.set_body("video/MP2T", Bytes::from_static(&[0x47; 188]));
        response.head_only = true;
        assert_eq!(response.body_len_on_wire(), 0);

        let hyper_response = response.into_hyper();
        assert_eq!(hyper_response.headers()["content-length"], "188");
    }

    #[test]
    fn test_status_mapping() {
        let response = HttpResponse::new(HttpStatusCode::ServiceUnavailable).into_hyper();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
