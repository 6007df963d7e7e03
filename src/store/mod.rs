//! In-memory segment store
//!
//! Packagers publish playlists and push segments; the [`StoreHandler`]
//! serves them to players. Each stream keeps a bounded window of recent
//! segments, oldest evicted first.

pub mod entry;
pub mod handler;
pub mod store;

pub use entry::StreamSegments;
pub use handler::{playlist_content_type, segment_content_type, StoreHandler};
pub use store::{SegmentStore, DEFAULT_MAX_SEGMENTS};
