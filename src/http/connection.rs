//! Per-request connection handle
//!
//! An [`HttpConnection`] is what interceptors and worker tasks see of a
//! client. It carries the parsed request, tracks the request phase, and owns
//! the one-shot channel the eventual response travels back on. The transport
//! task holds the matching [`PendingResponse`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Instant;

use tokio::sync::oneshot;

use super::request::HttpRequest;
use super::response::HttpResponse;
use super::types::{HttpConnectionPolicy, RequestPhase};

/// A response plus what to do with the socket afterwards
#[derive(Debug)]
pub struct ResponseEnvelope {
    pub response: HttpResponse,
    pub policy: HttpConnectionPolicy,
}

/// Transport side of a connection's response channel
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<ResponseEnvelope>,
}

impl PendingResponse {
    /// Wait for the response. `None` means the request was rejected.
    pub async fn recv(self) -> Option<ResponseEnvelope> {
        self.rx.await.ok()
    }
}

/// A client request in flight
#[derive(Debug)]
pub struct HttpConnection {
    /// Unique connection ID
    pub id: u64,

    /// Remote peer address
    pub peer_addr: SocketAddr,

    /// The request being served
    pub request: HttpRequest,

    /// When the request was received
    pub received_at: Instant,

    phase: Mutex<RequestPhase>,
    responder: Mutex<Option<oneshot::Sender<ResponseEnvelope>>>,
    bytes_out: AtomicU64,
}

impl HttpConnection {
    /// Create a connection and the receiver the transport waits on
    pub fn new(id: u64, peer_addr: SocketAddr, request: HttpRequest) -> (Self, PendingResponse) {
        let (tx, rx) = oneshot::channel();

        let connection = Self {
            id,
            peer_addr,
            request,
            received_at: Instant::now(),
            phase: Mutex::new(RequestPhase::Idle),
            responder: Mutex::new(Some(tx)),
            bytes_out: AtomicU64::new(0),
        };

        (connection, PendingResponse { rx })
    }

    /// Current request phase
    pub fn phase(&self) -> RequestPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Move to `next` if the transition is legal
    pub fn transition(&self, next: RequestPhase) -> bool {
        let mut phase = self.phase.lock().unwrap_or_else(|e| e.into_inner());
        if phase.can_transition_to(next) {
            *phase = next;
            true
        } else {
            tracing::debug!(
                connection_id = self.id,
                from = ?*phase,
                to = ?next,
                "Ignoring illegal request phase transition"
            );
            false
        }
    }

    /// Deliver the response to the transport.
    ///
    /// Returns false if a response was already sent or the request was
    /// rejected, or if the transport has gone away.
    pub fn respond(&self, mut response: HttpResponse, policy: HttpConnectionPolicy) -> bool {
        let tx = match self
            .responder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            Some(tx) => tx,
            None => return false,
        };

        if !self.transition(RequestPhase::Responded) {
            return false;
        }

        response.set_connection_policy(policy);
        tx.send(ResponseEnvelope { response, policy }).is_ok()
    }

    /// Drop the request without a response; the transport closes the socket
    pub fn reject(&self) {
        self.responder
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        self.transition(RequestPhase::Rejected);
    }

    /// Record bytes written for this connection, returning the new total
    pub fn add_bytes_out(&self, bytes: u64) -> u64 {
        self.bytes_out.fetch_add(bytes, Ordering::Relaxed) + bytes
    }

    /// Total body bytes sent on this connection
    pub fn bytes_out(&self) -> u64 {
        self.bytes_out.load(Ordering::Relaxed)
    }
}
