//! Shared server context
//!
//! Everything a segment server shares between its I/O tasks and workers:
//! the cross-domain policy, the observer registry and the metrics.

use std::sync::Arc;

use super::cors::CrossDomainPolicy;
use super::observer::ObserverRegistry;
use crate::stats::ServerMetrics;

/// State shared by one segment stream server
#[derive(Default)]
pub struct SegmentStreamContext {
    cors: Arc<CrossDomainPolicy>,
    observers: ObserverRegistry,
    metrics: Arc<ServerMetrics>,
}

impl SegmentStreamContext {
    /// Empty allow-list (blocking), no observers, zeroed metrics
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cors(&self) -> &Arc<CrossDomainPolicy> {
        &self.cors
    }

    pub fn observers(&self) -> &ObserverRegistry {
        &self.observers
    }

    pub fn metrics(&self) -> &Arc<ServerMetrics> {
        &self.metrics
    }

    /// Reset the allow-list and drop all observers
    pub fn clear(&self) {
        self.cors.clear();
        self.observers.clear();
    }
}
