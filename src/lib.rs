//! segment-stream: HTTP delivery of segmented live streams (HLS / DASH)
//!
//! Players request playlists and media segments over plain HTTP at
//! `/{application}/{stream}/{file}.{ext}`. This crate accepts those requests,
//! classifies them, dispatches them to a pool of workers that keeps
//! per-stream ordering, applies a cross-domain (CORS) allow-list, and hands
//! each request to a publisher-supplied [`SegmentStreamHandler`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use segment_stream::store::{SegmentStore, StoreHandler};
//! use segment_stream::{PublisherType, SegmentStreamServer, ServerConfig, StreamKey};
//!
//! # async fn run() -> segment_stream::Result<()> {
//! let store = Arc::new(SegmentStore::new());
//! store.publish_playlist(&StreamKey::new("live", "cam"), "index.m3u8", "#EXTM3U\n");
//!
//! let handler = StoreHandler::new("hls", PublisherType::Hls, Arc::clone(&store));
//! let server = SegmentStreamServer::new(ServerConfig::default(), handler);
//! server.set_cross_domain(&["https://player.example.com"]);
//! server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`http`]: request/response types, connections and the interceptor seam
//! - [`segment`]: URL classification, worker pool, CORS, observers, server
//! - [`server`]: configuration and the TCP transport
//! - [`store`]: in-memory playlist/segment store and a handler serving it
//! - [`file`]: muxer adapter writing FLV / MPEG-TS files
//! - [`stats`]: server counters

pub mod error;
pub mod file;
pub mod http;
pub mod segment;
pub mod server;
pub mod stats;
pub mod store;

pub use error::{Error, Result};
pub use segment::{
    InterceptorKind, PublisherType, SegmentStreamHandler, SegmentStreamObserver,
    SegmentStreamServer, StreamKey,
};
pub use server::ServerConfig;
pub use stats::ServerStats;
