//! Segment stream interceptor
//!
//! Claims segment-stream requests from the transport, classifies them and
//! hands them to the worker pool. Runs on the connection's I/O task, so
//! nothing here waits: the response is delivered later by a worker.
//!
//! Request phases:
//!
//! ```text
//!   Idle ──claim──► Claimed ──submit──► Processing ──► Responded
//!                      │                     │
//!                      └──── bad target ─────┴──────► Rejected
//! ```

use std::sync::Arc;

use bytes::Bytes;

use super::cors::{CrossDomainPolicy, ALLOW_ORIGIN_HEADER};
use super::request::parse_request_url;
use super::worker::{SegmentProcessHandler, SegmentWorkItem, SegmentWorkerManager, SubmitError};
use crate::error::Result;
use crate::http::{
    HttpConnection, HttpConnectionPolicy, HttpInterceptor, HttpInterceptorResult, HttpMethod,
    HttpRequest, HttpResponse, HttpStatusCode, RequestPhase,
};

/// Path of the Flash cross-domain policy document
pub const CROSSDOMAIN_PATH: &str = "/crossdomain.xml";

const CROSSDOMAIN_CONTENT_TYPE: &str = "text/x-cross-domain-policy";

/// Claim predicate flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterceptorKind {
    /// Any GET/HEAD/OPTIONS request
    #[default]
    Generic,
    /// DASH manifests and fragments
    Dash,
    /// HLS playlists and TS segments
    Hls,
}

impl InterceptorKind {
    /// Methods this interceptor claims
    pub fn methods(&self) -> HttpMethod {
        HttpMethod::GET | HttpMethod::HEAD | HttpMethod::OPTIONS
    }

    /// Extensions claimed, `None` for any
    pub fn extensions(&self) -> Option<&'static [&'static str]> {
        match self {
            InterceptorKind::Generic => None,
            InterceptorKind::Dash => Some(&["mpd", "m4s", "mp4"]),
            InterceptorKind::Hls => Some(&["m3u8", "ts"]),
        }
    }

    /// Whether this flavour claims the request
    pub fn matches(&self, request: &HttpRequest) -> bool {
        if !self.methods().contains(request.method) {
            return false;
        }

        let path = request.path();
        if path == CROSSDOMAIN_PATH {
            return true;
        }

        match self.extensions() {
            None => true,
            Some(extensions) => path_extension(path)
                .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
                .unwrap_or(false),
        }
    }
}

fn path_extension(path: &str) -> Option<&str> {
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    if ext.is_empty() {
        None
    } else {
        Some(ext)
    }
}

/// HTTP interceptor for segment-stream publishers
pub struct SegmentStreamInterceptor {
    kind: InterceptorKind,
    cors: Arc<CrossDomainPolicy>,
    worker_manager: SegmentWorkerManager,
}

impl SegmentStreamInterceptor {
    /// Create a stopped interceptor
    pub fn new(kind: InterceptorKind, cors: Arc<CrossDomainPolicy>, queue_capacity: usize) -> Self {
        Self {
            kind,
            cors,
            worker_manager: SegmentWorkerManager::new(queue_capacity),
        }
    }

    pub fn kind(&self) -> InterceptorKind {
        self.kind
    }

    /// Start the worker pool behind this interceptor
    pub fn start(&self, thread_count: usize, process_handler: SegmentProcessHandler) -> Result<()> {
        self.worker_manager.start(thread_count, process_handler)
    }

    /// Drain and stop the worker pool
    pub async fn stop(&self) -> bool {
        self.worker_manager.stop().await
    }

    pub fn is_running(&self) -> bool {
        self.worker_manager.is_running()
    }

    /// Enable or disable cross-domain blocking
    pub fn set_crossdomain_block(&self, block: bool) {
        self.cors.set_crossdomain_block(block);
    }

    pub fn is_crossdomain_block(&self) -> bool {
        self.cors.is_crossdomain_block()
    }

    fn respond_crossdomain(&self, connection: &HttpConnection) {
        let mut response = HttpResponse::ok();
        response.set_body(CROSSDOMAIN_CONTENT_TYPE, self.cors.crossdomain_xml());
        response.head_only = connection.request.method == HttpMethod::HEAD;
        connection.respond(response, keep_alive_policy(&connection.request));
    }

    fn respond_preflight(&self, connection: &HttpConnection) {
        let request = &connection.request;
        let mut response = HttpResponse::new(HttpStatusCode::NoContent);

        if self.cors.set_allow_origin(request.origin(), &mut response) {
            response.set_header("Access-Control-Allow-Methods", "GET, HEAD, OPTIONS");
            if let Some(headers) = request.header("Access-Control-Request-Headers") {
                response.set_header("Access-Control-Allow-Headers", headers);
            }
            response.set_header("Access-Control-Max-Age", "86400");
        }

        tracing::debug!(
            connection_id = connection.id,
            origin = ?request.origin(),
            allowed = response.header(ALLOW_ORIGIN_HEADER).is_some(),
            "Answered CORS preflight"
        );

        connection.respond(response, keep_alive_policy(request));
    }
}

/// Keep-alive unless the client asked to close
fn keep_alive_policy(request: &HttpRequest) -> HttpConnectionPolicy {
    if request.wants_keep_alive() {
        HttpConnectionPolicy::KeepAlive
    } else {
        HttpConnectionPolicy::Closed
    }
}

impl HttpInterceptor for SegmentStreamInterceptor {
    fn is_interceptor_for_request(&self, connection: &HttpConnection) -> bool {
        self.kind.matches(&connection.request)
    }

    fn on_http_data(
        &self,
        connection: &Arc<HttpConnection>,
        data: &Bytes,
    ) -> HttpInterceptorResult {
        connection.transition(RequestPhase::Claimed);
        let request = &connection.request;

        if request.path() == CROSSDOMAIN_PATH {
            self.respond_crossdomain(connection);
            return HttpInterceptorResult::Keep;
        }

        if request.method == HttpMethod::OPTIONS {
            self.respond_preflight(connection);
            return HttpInterceptorResult::Keep;
        }

        let request_info = match parse_request_url(&request.target) {
            Ok(info) => info,
            Err(e) => {
                tracing::warn!(
                    connection_id = connection.id,
                    peer = %connection.peer_addr,
                    target = %request.target,
                    error = %e,
                    "Rejecting malformed segment request"
                );
                connection.reject();
                return HttpInterceptorResult::Disconnect;
            }
        };

        tracing::debug!(
            connection_id = connection.id,
            method = %request.method,
            stream = %request_info.stream_key(),
            file = request_info.file_name(),
            body_len = data.len(),
            "Segment request claimed"
        );

        connection.transition(RequestPhase::Processing);

        match self
            .worker_manager
            .submit(SegmentWorkItem::new(Arc::clone(connection), request_info))
        {
            Ok(()) => HttpInterceptorResult::Keep,
            Err(SubmitError::QueueFull(item)) => {
                tracing::warn!(
                    connection_id = connection.id,
                    stream = %item.request_info.stream_key(),
                    "Segment worker queue full, shedding request"
                );
                connection.respond(
                    HttpResponse::new(HttpStatusCode::ServiceUnavailable),
                    HttpConnectionPolicy::Closed,
                );
                HttpInterceptorResult::Keep
            }
            Err(SubmitError::NotStarted) => {
                tracing::warn!(
                    connection_id = connection.id,
                    "Segment workers not running, dropping request"
                );
                connection.reject();
                HttpInterceptorResult::Disconnect
            }
        }
    }
}
