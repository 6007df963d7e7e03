//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::http::HttpConnectionPolicy;

/// Default HTTP port for segment delivery
pub const DEFAULT_PORT: u16 = 8080;

/// Playlist and segment requests carry no body, so the default cap is small
pub const DEFAULT_MAX_BODY_SIZE: usize = 64 * 1024;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Number of segment worker tasks
    pub segment_workers: usize,

    /// Per-worker queue capacity; a full queue answers 503
    pub queue_capacity: usize,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Connection policy the server prefers after a response
    pub connection_policy: HttpConnectionPolicy,

    /// Largest accepted request header section in bytes
    pub max_header_size: usize,

    /// Largest accepted request body in bytes; larger bodies get 413
    pub max_body_size: usize,

    /// Time allowed for a request head to arrive before the connection is dropped
    pub idle_timeout: Duration,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Cross-domain allow-list applied at start (empty keeps blocking)
    pub cross_domains: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            segment_workers: 4,
            queue_capacity: 1024,
            max_connections: 0, // Unlimited
            connection_policy: HttpConnectionPolicy::KeepAlive,
            max_header_size: 16 * 1024,
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            idle_timeout: Duration::from_secs(30),
            tcp_nodelay: true,
            cross_domains: Vec::new(),
        }
    }
}

impl ServerConfig {
    /// Create a new config with custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the number of segment workers (at least 1)
    pub fn segment_workers(mut self, count: usize) -> Self {
        self.segment_workers = count.max(1);
        self
    }

    /// Set the per-worker queue capacity (at least 1)
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the preferred connection policy
    pub fn connection_policy(mut self, policy: HttpConnectionPolicy) -> Self {
        self.connection_policy = policy;
        self
    }

    /// Set the header size limit
    pub fn max_header_size(mut self, size: usize) -> Self {
        self.max_header_size = size;
        self
    }

    /// Set the request body limit
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Set idle timeout
    pub fn idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the cross-domain allow-list
    pub fn cross_domains<I, S>(mut self, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cross_domains = urls.into_iter().map(Into::into).collect();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.segment_workers, 4);
        assert_eq!(config.queue_capacity, 1024);
        assert_eq!(config.max_connections, 0);
        assert_eq!(config.connection_policy, HttpConnectionPolicy::KeepAlive);
        assert!(config.tcp_nodelay);
        assert_eq!(config.max_body_size, DEFAULT_MAX_BODY_SIZE);
        assert!(config.cross_domains.is_empty());
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:8081".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr.port(), 8081);
    }

    #[test]
    fn test_builder_minimums() {
        let config = ServerConfig::default().segment_workers(0).queue_capacity(0);

        assert_eq!(config.segment_workers, 1);
        assert_eq!(config.queue_capacity, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .segment_workers(8)
            .queue_capacity(64)
            .max_connections(50)
            .connection_policy(HttpConnectionPolicy::Closed)
            .max_header_size(4096)
            .max_body_size(0)
            .idle_timeout(Duration::from_secs(5))
            .cross_domains(["https://a.com", "https://b.com"]);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.segment_workers, 8);
        assert_eq!(config.queue_capacity, 64);
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.connection_policy, HttpConnectionPolicy::Closed);
        assert_eq!(config.max_header_size, 4096);
        assert_eq!(config.max_body_size, 0);
        assert_eq!(config.idle_timeout, Duration::from_secs(5));
        assert_eq!(config.cross_domains, vec!["https://a.com", "https://b.com"]);
    }
}
