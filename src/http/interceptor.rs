//! Interceptor chain primitives
//!
//! The transport offers each complete request to its interceptors in order;
//! the first one whose claim predicate matches owns the request.

use std::sync::Arc;

use bytes::Bytes;

use super::connection::HttpConnection;
use super::method::HttpMethod;
use super::response::HttpResponse;
use super::status::HttpStatusCode;
use super::types::{HttpConnectionPolicy, HttpInterceptorResult, HttpNextHandler};

/// An HTTP-layer filter that claims requests
pub trait HttpInterceptor: Send + Sync {
    /// Claim predicate
    fn is_interceptor_for_request(&self, connection: &HttpConnection) -> bool;

    /// Called once a complete request (with `data` as its body) is buffered.
    ///
    /// Runs on the connection's I/O task and must not block.
    fn on_http_data(&self, connection: &Arc<HttpConnection>, data: &Bytes)
        -> HttpInterceptorResult;

    /// Called when the transport closes the connection
    fn on_http_closed(&self, _connection: &HttpConnection) {}
}

/// Handler registered on a [`DefaultInterceptor`]
pub type HttpRequestHandler =
    Arc<dyn Fn(&HttpConnection, &mut HttpResponse) -> HttpNextHandler + Send + Sync>;

/// Path pattern for handler registration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathPattern {
    /// Path must match exactly
    Exact(String),
    /// Path must start with the prefix
    Prefix(String),
}

impl PathPattern {
    /// `"/status"` is exact, `"/api/*"` is a prefix match on `"/api/"`
    pub fn parse(pattern: &str) -> Self {
        match pattern.strip_suffix('*') {
            Some(prefix) => PathPattern::Prefix(prefix.to_string()),
            None => PathPattern::Exact(pattern.to_string()),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Exact(p) => path == p,
            PathPattern::Prefix(p) => path.starts_with(p.as_str()),
        }
    }
}

struct RequestHandlerEntry {
    methods: HttpMethod,
    pattern: PathPattern,
    handler: HttpRequestHandler,
}

/// Fallback interceptor dispatching to registered handlers.
///
/// Handlers run in registration order until one returns
/// [`HttpNextHandler::DoNotCall`]. A request no handler matches gets a 404.
#[derive(Default)]
pub struct DefaultInterceptor {
    handlers: Vec<RequestHandlerEntry>,
}

impl DefaultInterceptor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a set of methods and a path pattern
    pub fn register<F>(&mut self, methods: HttpMethod, pattern: &str, handler: F)
    where
        F: Fn(&HttpConnection, &mut HttpResponse) -> HttpNextHandler + Send + Sync + 'static,
    {
        self.handlers.push(RequestHandlerEntry {
            methods,
            pattern: PathPattern::parse(pattern),
            handler: Arc::new(handler),
        });
    }

    /// Shorthand for GET and HEAD
    pub fn register_get<F>(&mut self, pattern: &str, handler: F)
    where
        F: Fn(&HttpConnection, &mut HttpResponse) -> HttpNextHandler + Send + Sync + 'static,
    {
        self.register(HttpMethod::GET | HttpMethod::HEAD, pattern, handler);
    }

    /// Number of registered handlers
    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

impl HttpInterceptor for DefaultInterceptor {
    fn is_interceptor_for_request(&self, _connection: &HttpConnection) -> bool {
        true
    }

    fn on_http_data(
        &self,
        connection: &Arc<HttpConnection>,
        _data: &Bytes,
    ) -> HttpInterceptorResult {
        let request = &connection.request;
        let path = request.path();
        let mut response = HttpResponse::ok();
        let mut handled = false;

        for entry in &self.handlers {
            if !entry.methods.contains(request.method) || !entry.pattern.matches(path) {
                continue;
            }

            handled = true;
            if (entry.handler)(connection, &mut response) == HttpNextHandler::DoNotCall {
                break;
            }
        }

        if !handled {
            tracing::debug!(
                connection_id = connection.id,
                method = %request.method,
                path = path,
                "No handler for request"
            );
            response = HttpResponse::new(HttpStatusCode::NotFound);
        }

        response.head_only = request.method == HttpMethod::HEAD;

        let policy = if request.wants_keep_alive() {
            HttpConnectionPolicy::KeepAlive
        } else {
            HttpConnectionPolicy::Closed
        };
        connection.respond(response, policy);

        HttpInterceptorResult::Keep
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::request::HttpRequest;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};

    fn connection(method: HttpMethod, target: &str) -> (Arc<HttpConnection>, crate::http::PendingResponse) {
        let addr = SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 40000);
        let (conn, pending) = HttpConnection::new(7, addr, HttpRequest::new(method, target));
        (Arc::new(conn), pending)
    }

    #[test]
    fn test_path_pattern() {
        assert!(PathPattern::parse("/status").matches("/status"));
        assert!(!PathPattern::parse("/status").matches("/status/x"));
        assert!(PathPattern::parse("/api/*").matches("/api/streams"));
        assert!(!PathPattern::parse("/api/*").matches("/apix"));
    }

    #[tokio::test]
    async fn test_handler_chain_stops_on_do_not_call() {
        let mut interceptor = DefaultInterceptor::new();
        interceptor.register_get("/status", |_, response| {
            response.set_header("X-First", "1");
            HttpNextHandler::DoNotCall
        });
        interceptor.register_get("/status", |_, response| {
            response.set_header("X-Second", "1");
            HttpNextHandler::Call
        });

        let (conn, pending) = connection(HttpMethod::GET, "/status");
        let result = interceptor.on_http_data(&conn, &Bytes::new());
        assert_eq!(result, HttpInterceptorResult::Keep);

        let envelope = pending.recv().await.unwrap();
        assert_eq!(envelope.response.status, HttpStatusCode::Ok);
        assert_eq!(envelope.response.header("X-First"), Some("1"));
        assert_eq!(envelope.response.header("X-Second"), None);
    }

    #[tokio::test]
    async fn test_handler_chain_continues_on_call() {
        let mut interceptor = DefaultInterceptor::new();
        interceptor.register_get("/*", |_, response| {
            response.set_header("X-All", "1");
            HttpNextHandler::Call
        });
        interceptor.register_get("/status", |_, response| {
            response.set_body("text/plain", Bytes::from_static(b"up"));
            HttpNextHandler::DoNotCall
        });

        let (conn, pending) = connection(HttpMethod::GET, "/status");
        interceptor.on_http_data(&conn, &Bytes::new());

        let envelope = pending.recv().await.unwrap();
        assert_eq!(envelope.response.header("X-All"), Some("1"));
        assert_eq!(&envelope.response.body[..], b"up");
    }

    #[tokio::test]
    async fn test_unmatched_is_not_found() {
        let mut interceptor = DefaultInterceptor::new();
        interceptor.register_get("/status", |_, _| HttpNextHandler::DoNotCall);
        assert_eq!(interceptor.handler_count(), 1);

        let (conn, pending) = connection(HttpMethod::POST, "/status");
        interceptor.on_http_data(&conn, &Bytes::new());

        let envelope = pending.recv().await.unwrap();
        assert_eq!(envelope.response.status, HttpStatusCode::NotFound);
    }
}
