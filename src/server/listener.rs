//! HTTP transport
//!
//! Runs the TCP accept loop and serves each socket with hyper's HTTP/1
//! connection driver. Every request hyper frames is buffered, offered to
//! the interceptor chain, and answered once the claiming interceptor (or a
//! worker it handed off to) sends a response through the connection's
//! one-shot channel. A rejected request fails the hyper service, which
//! drops the connection without a response.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::{TokioIo, TokioTimer};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};

use crate::error::{Error, Result};
use crate::http::request::declared_body_len;
use crate::http::{
    HttpConnection, HttpConnectionPolicy, HttpInterceptor, HttpInterceptorResult, HttpRequest,
    HttpResponse, HttpStatusCode,
};
use crate::server::config::ServerConfig;
use crate::stats::ServerMetrics;

/// Smallest read buffer hyper's HTTP/1 driver accepts
const MIN_READ_BUFFER: usize = 8 * 1024;

/// Accepts connections and drives the interceptor chain
pub struct HttpTransport {
    config: ServerConfig,
    interceptors: Vec<Arc<dyn HttpInterceptor>>,
    metrics: Arc<ServerMetrics>,
    next_connection_id: AtomicU64,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl HttpTransport {
    /// Create a transport; interceptors are tried in order
    pub fn new(
        config: ServerConfig,
        interceptors: Vec<Arc<dyn HttpInterceptor>>,
        metrics: Arc<ServerMetrics>,
    ) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            config,
            interceptors,
            metrics,
            next_connection_id: AtomicU64::new(1),
            connection_semaphore,
        }
    }

    /// Accept until `shutdown` flips to true
    pub async fn serve(self: Arc<Self>, listener: TcpListener, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    tracing::info!("HTTP transport shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((socket, peer_addr)) => {
                        self.handle_connection(socket, peer_addr, shutdown.clone());
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "Failed to accept connection");
                    }
                },
            }
        }
    }

    fn handle_connection(
        self: &Arc<Self>,
        socket: TcpStream,
        peer_addr: SocketAddr,
        shutdown: watch::Receiver<bool>,
    ) {
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        if self.config.tcp_nodelay {
            if let Err(e) = socket.set_nodelay(true) {
                tracing::error!(error = %e, "Failed to configure socket");
                return;
            }
        }

        tracing::debug!(peer = %peer_addr, "New connection");

        let transport = Arc::clone(self);
        tokio::spawn(async move {
            let _permit = permit;
            transport.metrics.connection_opened();

            transport.drive_connection(socket, peer_addr, shutdown).await;

            transport.metrics.connection_closed();
            tracing::debug!(peer = %peer_addr, "Connection closed");
        });
    }

    /// Serve HTTP/1 on `socket` until the peer leaves, the connection is
    /// closed by policy, or the server shuts down.
    async fn drive_connection(
        self: &Arc<Self>,
        socket: TcpStream,
        peer_addr: SocketAddr,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let transport = Arc::clone(self);
        let service = service_fn(move |request: hyper::Request<Incoming>| {
            let transport = Arc::clone(&transport);
            async move { transport.serve_request(request, peer_addr).await }
        });

        let mut builder = http1::Builder::new();
        builder
            .timer(TokioTimer::new())
            .header_read_timeout(self.config.idle_timeout)
            .max_buf_size(self.config.max_header_size.max(MIN_READ_BUFFER))
            .keep_alive(true);

        let connection = builder.serve_connection(TokioIo::new(socket), service);
        tokio::pin!(connection);

        let mut draining = false;
        loop {
            tokio::select! {
                result = connection.as_mut() => {
                    if let Err(e) = result {
                        tracing::debug!(peer = %peer_addr, error = %e, "Connection error");
                    }
                    break;
                }
                _ = shutdown.changed(), if !draining => {
                    // Finish the in-flight request, then close
                    draining = true;
                    connection.as_mut().graceful_shutdown();
                }
            }
        }
    }

    /// Buffer one request, run the interceptor chain and wait for the answer
    async fn serve_request(
        &self,
        request: hyper::Request<Incoming>,
        peer_addr: SocketAddr,
    ) -> Result<hyper::Response<Full<Bytes>>> {
        self.metrics.request_received();

        let max_body_size = self.config.max_body_size;
        if let Err(e) = declared_body_len(request.headers(), max_body_size) {
            tracing::warn!(peer = %peer_addr, error = %e, "Request body refused");
            return Ok(refuse(HttpStatusCode::PayloadTooLarge));
        }

        let (parts, incoming) = request.into_parts();
        let body = match Limited::new(incoming, max_body_size).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                tracing::warn!(peer = %peer_addr, error = %e, "Failed to read request body");
                return Ok(refuse(HttpStatusCode::PayloadTooLarge));
            }
        };
        let head = hyper::Request::from_parts(parts, ());

        let id = self.next_connection_id.fetch_add(1, Ordering::Relaxed);
        let (connection, pending) =
            HttpConnection::new(id, peer_addr, HttpRequest::from_hyper(&head, body));
        let connection = Arc::new(connection);
        let body = connection.request.body.clone();

        match self
            .interceptors
            .iter()
            .find(|i| i.is_interceptor_for_request(&connection))
        {
            Some(interceptor) => {
                if interceptor.on_http_data(&connection, &body) == HttpInterceptorResult::Disconnect {
                    connection.reject();
                    self.metrics.request_rejected();
                    interceptor.on_http_closed(&connection);
                    return Err(Error::BadRequest(format!(
                        "request {} rejected by interceptor",
                        connection.request.path()
                    )));
                }
            }
            None => {
                let policy = if connection.request.wants_keep_alive() {
                    HttpConnectionPolicy::KeepAlive
                } else {
                    HttpConnectionPolicy::Closed
                };
                connection.respond(HttpResponse::new(HttpStatusCode::NotFound), policy);
            }
        }

        let envelope = match pending.recv().await {
            Some(envelope) => envelope,
            None => {
                self.metrics.request_rejected();
                return Err(Error::BadRequest(format!(
                    "request {} dropped without a response",
                    connection.request.path()
                )));
            }
        };

        tracing::debug!(
            connection_id = id,
            status = envelope.response.status.as_u16(),
            bytes = envelope.response.body_len_on_wire(),
            policy = ?envelope.policy,
            "Response ready"
        );

        Ok(envelope.response.into_hyper())
    }
}

/// Error answer that also closes the connection
fn refuse(status: HttpStatusCode) -> hyper::Response<Full<Bytes>> {
    let mut response = HttpResponse::new(status);
    response.set_connection_policy(HttpConnectionPolicy::Closed);
    response.into_hyper()
}
