//! Segment stream server
//!
//! Ties the pieces together: the transport offers requests to a
//! [`SegmentStreamInterceptor`], which classifies them and hands them to its
//! worker pool; workers call back into [`SegmentStreamServer`]'s request
//! processing, which applies the cross-domain policy and asks the
//! publisher's [`SegmentStreamHandler`] for the actual content.
//!
//! ```text
//!   TCP ──► HttpTransport ──► SegmentStreamInterceptor ──► workers
//!                                                              │
//!                          SegmentStreamHandler ◄── process_request
//!                          (playlist / segment / stream)       │
//!                                                              ▼
//!                                        CORS + Connection header ──► TCP
//! ```

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::context::SegmentStreamContext;
use super::cors;
use super::interceptor::{InterceptorKind, SegmentStreamInterceptor};
use super::observer::SegmentStreamObserver;
use super::request::{PlayListType, SegmentRequestKind, SegmentStreamRequestInfo, SegmentType};
use super::worker::SegmentWorkItem;
use crate::error::{Error, Result};
use crate::http::{
    DefaultInterceptor, HttpConnection, HttpConnectionPolicy, HttpInterceptor, HttpMethod,
    HttpResponse, HttpStatusCode,
};
use crate::server::{HttpTransport, ServerConfig};
use crate::stats::ServerStats;

/// Kind of segment publisher behind a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublisherType {
    Dash,
    LlDash,
    Hls,
}

impl std::fmt::Display for PublisherType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PublisherType::Dash => write!(f, "DASH"),
            PublisherType::LlDash => write!(f, "LL-DASH"),
            PublisherType::Hls => write!(f, "HLS"),
        }
    }
}

/// Publisher-specific request handling.
///
/// Called on worker tasks. Each method fills `response` (status, headers,
/// body) and returns the connection policy it wants afterwards.
pub trait SegmentStreamHandler: Send + Sync + 'static {
    fn publisher_type(&self) -> PublisherType;

    fn publisher_name(&self) -> &str;

    /// Claim predicate for this publisher's interceptor
    fn interceptor_kind(&self) -> InterceptorKind {
        InterceptorKind::Generic
    }

    /// Requests whose extension is neither a playlist nor a segment
    fn process_stream_request(
        &self,
        _connection: &HttpConnection,
        _request_info: &SegmentStreamRequestInfo,
        response: &mut HttpResponse,
    ) -> HttpConnectionPolicy {
        response.set_status(HttpStatusCode::NotFound);
        HttpConnectionPolicy::KeepAlive
    }

    fn process_playlist_request(
        &self,
        connection: &HttpConnection,
        request_info: &SegmentStreamRequestInfo,
        play_list_type: PlayListType,
        response: &mut HttpResponse,
    ) -> HttpConnectionPolicy;

    fn process_segment_request(
        &self,
        connection: &HttpConnection,
        request_info: &SegmentStreamRequestInfo,
        segment_type: SegmentType,
        response: &mut HttpResponse,
    ) -> HttpConnectionPolicy;
}

struct ServerCore<H: SegmentStreamHandler> {
    config: ServerConfig,
    handler: Arc<H>,
    context: SegmentStreamContext,
    interceptor: Arc<SegmentStreamInterceptor>,
}

impl<H: SegmentStreamHandler> ServerCore<H> {
    fn process_request(&self, item: &SegmentWorkItem) -> bool {
        let connection = &item.connection;
        let request = &connection.request;
        let request_info = &item.request_info;

        let mut response = HttpResponse::ok();
        self.context
            .cors()
            .set_allow_origin(request.origin(), &mut response);

        let policy = match item.kind {
            SegmentRequestKind::Stream => {
                self.handler
                    .process_stream_request(connection, request_info, &mut response)
            }
            SegmentRequestKind::PlayList(play_list_type) => self.handler.process_playlist_request(
                connection,
                request_info,
                play_list_type,
                &mut response,
            ),
            SegmentRequestKind::Segment(segment_type) => self.handler.process_segment_request(
                connection,
                request_info,
                segment_type,
                &mut response,
            ),
        };

        let policy = if policy == HttpConnectionPolicy::Closed
            || self.config.connection_policy == HttpConnectionPolicy::Closed
            || !request.wants_keep_alive()
        {
            HttpConnectionPolicy::Closed
        } else {
            HttpConnectionPolicy::KeepAlive
        };

        response.head_only = request.method == HttpMethod::HEAD;

        tracing::debug!(
            connection_id = connection.id,
            publisher = self.handler.publisher_name(),
            stream = %request_info.stream_key(),
            file = request_info.file_name(),
            status = response.status.as_u16(),
            "Segment request processed"
        );

        self.context
            .metrics()
            .request_processed(item.kind, response.status);
        self.increase_bytes_out(connection, response.body_len_on_wire() as u64);

        connection.respond(response, policy)
    }

    fn increase_bytes_out(&self, connection: &HttpConnection, sent_bytes: u64) {
        connection.add_bytes_out(sent_bytes);
        self.context.metrics().add_bytes_sent(sent_bytes);
    }
}

struct RunningServer {
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    accept_handle: JoinHandle<()>,
}

/// HTTP server for one segment publisher
pub struct SegmentStreamServer<H: SegmentStreamHandler> {
    core: Arc<ServerCore<H>>,
    default_interceptor: Option<Arc<DefaultInterceptor>>,
    running: Mutex<Option<RunningServer>>,
}

impl<H: SegmentStreamHandler> SegmentStreamServer<H> {
    /// Create a stopped server
    pub fn new(config: ServerConfig, handler: H) -> Self {
        Self::with_handler(config, Arc::new(handler))
    }

    /// Create a stopped server around a shared handler
    pub fn with_handler(config: ServerConfig, handler: Arc<H>) -> Self {
        let context = SegmentStreamContext::new();
        let interceptor = Arc::new(SegmentStreamInterceptor::new(
            handler.interceptor_kind(),
            Arc::clone(context.cors()),
            config.queue_capacity,
        ));

        Self {
            core: Arc::new(ServerCore {
                config,
                handler,
                context,
                interceptor,
            }),
            default_interceptor: None,
            running: Mutex::new(None),
        }
    }

    /// Fallback interceptor for requests the segment interceptor does not claim
    pub fn with_default_interceptor(mut self, interceptor: DefaultInterceptor) -> Self {
        self.default_interceptor = Some(Arc::new(interceptor));
        self
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.core.handler
    }

    pub fn context(&self) -> &SegmentStreamContext {
        &self.core.context
    }

    pub fn config(&self) -> &ServerConfig {
        &self.core.config
    }

    pub fn publisher_type(&self) -> PublisherType {
        self.core.handler.publisher_type()
    }

    pub fn publisher_name(&self) -> &str {
        self.core.handler.publisher_name()
    }

    /// The segment interceptor this server dispatches through
    pub fn interceptor(&self) -> &Arc<SegmentStreamInterceptor> {
        &self.core.interceptor
    }

    /// Bind, start the segment workers and begin accepting connections.
    ///
    /// Returns the bound address.
    pub async fn start(&self) -> Result<SocketAddr> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let config = &self.core.config;
        if !config.cross_domains.is_empty() {
            self.set_cross_domain(&config.cross_domains);
        }

        // The pool lives inside the core, so workers only hold it weakly
        let core = Arc::downgrade(&self.core);
        self.core.interceptor.start(
            config.segment_workers,
            Arc::new(move |item: &SegmentWorkItem| match core.upgrade() {
                Some(core) => core.process_request(item),
                None => false,
            }),
        )?;

        let listener = match TcpListener::bind(config.bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.core.interceptor.stop().await;
                return Err(Error::Io(e));
            }
        };
        let local_addr = listener.local_addr()?;

        let mut interceptors: Vec<Arc<dyn HttpInterceptor>> =
            vec![Arc::clone(&self.core.interceptor) as Arc<dyn HttpInterceptor>];
        if let Some(ref fallback) = self.default_interceptor {
            interceptors.push(Arc::clone(fallback) as Arc<dyn HttpInterceptor>);
        }

        let transport = Arc::new(HttpTransport::new(
            config.clone(),
            interceptors,
            Arc::clone(self.core.context.metrics()),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let accept_handle = tokio::spawn(transport.serve(listener, shutdown_rx));

        tracing::info!(
            addr = %local_addr,
            publisher = self.publisher_name(),
            publisher_type = %self.publisher_type(),
            workers = config.segment_workers,
            "Segment stream server listening"
        );

        *running = Some(RunningServer {
            local_addr,
            shutdown_tx,
            accept_handle,
        });

        Ok(local_addr)
    }

    /// Stop accepting, drain in-flight requests, and reset shared state.
    ///
    /// Returns false if the server was not running.
    pub async fn stop(&self) -> bool {
        let running = match self.running.lock().await.take() {
            Some(running) => running,
            None => return false,
        };

        let _ = running.shutdown_tx.send(true);
        if let Err(e) = running.accept_handle.await {
            tracing::error!(error = %e, "Accept loop terminated abnormally");
        }

        self.core.interceptor.stop().await;
        self.core.context.clear();

        tracing::info!(
            addr = %running.local_addr,
            publisher = self.publisher_name(),
            "Segment stream server stopped"
        );

        true
    }

    /// Run until `shutdown` resolves, then stop
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        tracing::info!("Shutdown signal received");
        self.stop().await;
        Ok(())
    }

    /// Bound address while running
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    pub fn add_observer(&self, observer: &Arc<dyn SegmentStreamObserver>) -> bool {
        self.core.context.observers().add(observer)
    }

    pub fn remove_observer(&self, observer: &Arc<dyn SegmentStreamObserver>) -> bool {
        self.core.context.observers().remove(observer)
    }

    /// Tell every observer the stream is gone. Returns how many handled it.
    pub fn disconnect(&self, app_name: &str, stream_name: &str) -> usize {
        tracing::info!(app = app_name, stream = stream_name, "Disconnecting stream");
        self.core
            .context
            .observers()
            .notify_disconnected(app_name, stream_name)
    }

    /// Replace the cross-domain allow-list
    pub fn set_cross_domain<S: AsRef<str>>(&self, url_list: &[S]) {
        self.core.context.cors().set_cross_domain(url_list);
    }

    /// Add `Access-Control-Allow-Origin` when `origin_url` is allowed
    pub fn set_allow_origin(&self, origin_url: Option<&str>, response: &mut HttpResponse) -> bool {
        self.core
            .context
            .cors()
            .set_allow_origin(origin_url, response)
    }

    /// Exact membership test used for the allow-list
    pub fn url_exist_check<S: AsRef<str>>(url_list: &[S], check_url: &str) -> bool {
        cors::url_exist_check(url_list, check_url)
    }

    /// Account bytes sent on a connection
    pub fn increase_bytes_out(&self, connection: &HttpConnection, sent_bytes: u64) {
        self.core.increase_bytes_out(connection, sent_bytes);
    }

    /// Process a classified request in the calling task.
    ///
    /// Workers call this; it is public so requests can also be served
    /// in-process without the transport.
    pub fn process_request(&self, item: &SegmentWorkItem) -> bool {
        self.core.process_request(item)
    }

    /// Snapshot of the server counters
    pub fn stats(&self) -> ServerStats {
        self.core.context.metrics().snapshot()
    }
}
