//! Statistics and metrics for the segment server

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::http::HttpStatusCode;
use crate::segment::request::SegmentRequestKind;

/// Live counters, updated from I/O tasks and workers
#[derive(Debug)]
pub struct ServerMetrics {
    started_at: Instant,
    total_connections: AtomicU64,
    active_connections: AtomicU64,
    total_requests: AtomicU64,
    playlist_requests: AtomicU64,
    segment_requests: AtomicU64,
    stream_requests: AtomicU64,
    rejected_requests: AtomicU64,
    error_responses: AtomicU64,
    total_bytes_sent: AtomicU64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            total_connections: AtomicU64::new(0),
            active_connections: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
            playlist_requests: AtomicU64::new(0),
            segment_requests: AtomicU64::new(0),
            stream_requests: AtomicU64::new(0),
            rejected_requests: AtomicU64::new(0),
            error_responses: AtomicU64::new(0),
            total_bytes_sent: AtomicU64::new(0),
        }
    }

    pub fn connection_opened(&self) {
        self.total_connections.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        // Saturate rather than wrap if open/close ever get out of step
        let _ = self
            .active_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| Some(n.saturating_sub(1)));
    }

    pub fn request_received(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn request_rejected(&self) {
        self.rejected_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a processed segment-stream request by category and outcome
    pub fn request_processed(&self, kind: SegmentRequestKind, status: HttpStatusCode) {
        let counter = match kind {
            SegmentRequestKind::PlayList(_) => &self.playlist_requests,
            SegmentRequestKind::Segment(_) => &self.segment_requests,
            SegmentRequestKind::Stream => &self.stream_requests,
        };
        counter.fetch_add(1, Ordering::Relaxed);

        if status.as_u16() >= 400 {
            self.error_responses.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Add to the bytes-sent counter, returning the new total
    pub fn add_bytes_sent(&self, bytes: u64) -> u64 {
        self.total_bytes_sent.fetch_add(bytes, Ordering::Relaxed) + bytes
    }

    /// Point-in-time copy of every counter
    pub fn snapshot(&self) -> ServerStats {
        ServerStats {
            total_connections: self.total_connections.load(Ordering::Relaxed),
            active_connections: self.active_connections.load(Ordering::Relaxed),
            total_requests: self.total_requests.load(Ordering::Relaxed),
            playlist_requests: self.playlist_requests.load(Ordering::Relaxed),
            segment_requests: self.segment_requests.load(Ordering::Relaxed),
            stream_requests: self.stream_requests.load(Ordering::Relaxed),
            rejected_requests: self.rejected_requests.load(Ordering::Relaxed),
            error_responses: self.error_responses.load(Ordering::Relaxed),
            total_bytes_sent: self.total_bytes_sent.load(Ordering::Relaxed),
            uptime: self.started_at.elapsed(),
        }
    }
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Server-wide statistics
#[derive(Debug, Clone, Default)]
pub struct ServerStats {
    /// Total connections ever
    pub total_connections: u64,
    /// Current active connections
    pub active_connections: u64,
    /// Requests read off the wire
    pub total_requests: u64,
    /// Playlist requests processed by workers
    pub playlist_requests: u64,
    /// Segment requests processed by workers
    pub segment_requests: u64,
    /// Stream-level requests processed by workers
    pub stream_requests: u64,
    /// Requests dropped without a response
    pub rejected_requests: u64,
    /// Processed requests answered with a 4xx/5xx status
    pub error_responses: u64,
    /// Total body bytes sent
    pub total_bytes_sent: u64,
    /// Uptime
    pub uptime: Duration,
}

impl ServerStats {
    /// Average bytes per processed request
    pub fn average_response_size(&self) -> u64 {
        let processed = self.playlist_requests + self.segment_requests + self.stream_requests;
        if processed > 0 {
            self.total_bytes_sent / processed
        } else {
            0
        }
    }

    /// Outbound bitrate since start in bits/sec
    pub fn bitrate(&self) -> u64 {
        let secs = self.uptime.as_secs();
        if secs > 0 {
            (self.total_bytes_sent * 8) / secs
        } else {
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::request::{PlayListType, SegmentType};

    #[test]
    fn test_new_is_zero() {
        let stats = ServerMetrics::new().snapshot();
        assert_eq!(stats.total_connections, 0);
        assert_eq!(stats.active_connections, 0);
        assert_eq!(stats.total_requests, 0);
        assert_eq!(stats.total_bytes_sent, 0);
    }

    #[test]
    fn test_connection_counters() {
        let metrics = ServerMetrics::new();
        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_closed();

        let stats = metrics.snapshot();
        assert_eq!(stats.total_connections, 2);
        assert_eq!(stats.active_connections, 1);

        metrics.connection_closed();
        metrics.connection_closed();
        assert_eq!(metrics.snapshot().active_connections, 0);
    }

    #[test]
    fn test_request_processed_by_kind() {
        let metrics = ServerMetrics::new();
        metrics.request_processed(SegmentRequestKind::PlayList(PlayListType::M3u8), HttpStatusCode::Ok);
        metrics.request_processed(SegmentRequestKind::Segment(SegmentType::Ts), HttpStatusCode::Ok);
        metrics.request_processed(SegmentRequestKind::Segment(SegmentType::M4s), HttpStatusCode::NotFound);
        metrics.request_processed(SegmentRequestKind::Stream, HttpStatusCode::NotFound);

        let stats = metrics.snapshot();
        assert_eq!(stats.playlist_requests, 1);
        assert_eq!(stats.segment_requests, 2);
        assert_eq!(stats.stream_requests, 1);
        assert_eq!(stats.error_responses, 2);
    }

    #[test]
    fn test_bytes_and_average() {
        let metrics = ServerMetrics::new();
        assert_eq!(metrics.add_bytes_sent(1000), 1000);
        assert_eq!(metrics.add_bytes_sent(3000), 4000);
        metrics.request_processed(SegmentRequestKind::Segment(SegmentType::Ts), HttpStatusCode::Ok);
        metrics.request_processed(SegmentRequestKind::Segment(SegmentType::Ts), HttpStatusCode::Ok);

        let stats = metrics.snapshot();
        assert_eq!(stats.total_bytes_sent, 4000);
        assert_eq!(stats.average_response_size(), 2000);
    }

    #[test]
    fn test_bitrate() {
        let stats = ServerStats {
            total_bytes_sent: 1_000_000,
            uptime: Duration::from_secs(10),
            ..Default::default()
        };
        assert_eq!(stats.bitrate(), 800_000);

        let idle = ServerStats::default();
        assert_eq!(idle.bitrate(), 0);
        assert_eq!(idle.average_response_size(), 0);
    }
}
