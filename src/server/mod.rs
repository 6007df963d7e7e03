//! HTTP server plumbing: configuration and the TCP transport

pub mod config;
pub mod listener;

pub use config::ServerConfig;
pub use listener::HttpTransport;
