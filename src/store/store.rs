//! Segment store implementation
//!
//! Holds the most recent playlists and segments of every published stream
//! so workers can answer requests without touching the packager.

use std::collections::HashMap;
use std::sync::RwLock;

use bytes::Bytes;

use super::entry::StreamSegments;
use crate::segment::StreamKey;

/// Default number of segments kept per stream
pub const DEFAULT_MAX_SEGMENTS: usize = 10;

/// Per-stream store of published playlists and segments
///
/// Read by worker tasks on every request, written by the packager once per
/// segment, so a `RwLock` keeps lookups concurrent.
pub struct SegmentStore {
    streams: RwLock<HashMap<StreamKey, StreamSegments>>,
    max_segments: usize,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::with_max_segments(DEFAULT_MAX_SEGMENTS)
    }

    /// Create a store keeping at most `max_segments` per stream (minimum 1)
    pub fn with_max_segments(max_segments: usize) -> Self {
        Self {
            streams: RwLock::new(HashMap::new()),
            max_segments: max_segments.max(1),
        }
    }

    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    /// Publish or replace a playlist, creating the stream if needed
    pub fn publish_playlist(&self, key: &StreamKey, name: impl Into<String>, data: impl Into<Bytes>) {
        let name = name.into();
        let mut streams = self.streams.write().unwrap_or_else(|e| e.into_inner());

        let created = !streams.contains_key(key);
        streams
            .entry(key.clone())
            .or_insert_with(|| StreamSegments::new(self.max_segments))
            .set_playlist(name.clone(), data.into());

        if created {
            tracing::info!(stream = %key, "Stream added to segment store");
        }
        tracing::debug!(stream = %key, playlist = %name, "Playlist published");
    }

    /// Append a segment, evicting the oldest once the window is full
    pub fn push_segment(&self, key: &StreamKey, name: impl Into<String>, data: impl Into<Bytes>) {
        let name = name.into();
        let data = data.into();
        let size = data.len();
        let mut streams = self.streams.write().unwrap_or_else(|e| e.into_inner());

        let entry = streams
            .entry(key.clone())
            .or_insert_with(|| StreamSegments::new(self.max_segments));
        let evicted = entry.push_segment(name.clone(), data);

        tracing::debug!(
            stream = %key,
            segment = %name,
            size = size,
            evicted = evicted.len(),
            "Segment pushed"
        );
    }

    pub fn playlist(&self, key: &StreamKey, name: &str) -> Option<Bytes> {
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        streams.get(key).and_then(|entry| entry.playlist(name))
    }

    pub fn segment(&self, key: &StreamKey, name: &str) -> Option<Bytes> {
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        streams.get(key).and_then(|entry| entry.segment(name))
    }

    /// Segment names currently held for a stream, oldest first
    pub fn segment_names(&self, key: &StreamKey) -> Vec<String> {
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        streams
            .get(key)
            .map(StreamSegments::segment_names)
            .unwrap_or_default()
    }

    pub fn contains_stream(&self, key: &StreamKey) -> bool {
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        streams.contains_key(key)
    }

    /// Drop everything held for a stream
    pub fn remove_stream(&self, key: &StreamKey) -> bool {
        let mut streams = self.streams.write().unwrap_or_else(|e| e.into_inner());
        match streams.remove(key) {
            Some(entry) => {
                tracing::info!(
                    stream = %key,
                    segments = entry.segment_count(),
                    bytes = entry.size(),
                    "Stream removed from segment store"
                );
                true
            }
            None => false,
        }
    }

    pub fn stream_count(&self) -> usize {
        self.streams.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Bytes held across every stream
    pub fn total_size(&self) -> usize {
        let streams = self.streams.read().unwrap_or_else(|e| e.into_inner());
        streams.values().map(StreamSegments::size).sum()
    }
}

impl Default for SegmentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_and_lookup() {
        let store = SegmentStore::new();
        let key = StreamKey::new("live", "stream1");

        store.publish_playlist(&key, "index.m3u8", Bytes::from_static(b"#EXTM3U\n"));
        store.push_segment(&key, "seg_0.ts", vec![0x47u8; 188]);

        assert_eq!(store.stream_count(), 1);
        assert_eq!(
            store.playlist(&key, "index.m3u8").unwrap(),
            Bytes::from_static(b"#EXTM3U\n")
        );
        assert_eq!(store.segment(&key, "seg_0.ts").unwrap().len(), 188);
        assert!(store.segment(&key, "seg_1.ts").is_none());
        assert!(store.playlist(&StreamKey::new("live", "other"), "index.m3u8").is_none());
    }

    #[test]
    fn test_bounded_per_stream() {
        let store = SegmentStore::with_max_segments(3);
        let a = StreamKey::new("live", "a");
        let b = StreamKey::new("live", "b");

        for i in 0..5 {
            store.push_segment(&a, format!("seg_{}.ts", i), vec![0u8; 10]);
        }
        store.push_segment(&b, "seg_0.ts", vec![0u8; 10]);

        assert_eq!(store.segment_names(&a), vec!["seg_2.ts", "seg_3.ts", "seg_4.ts"]);
        assert_eq!(store.segment_names(&b), vec!["seg_0.ts"]);
        assert_eq!(store.total_size(), 40);
    }

    #[test]
    fn test_remove_stream() {
        let store = SegmentStore::new();
        let key = StreamKey::new("live", "stream1");
        store.push_segment(&key, "seg_0.ts", vec![0u8; 10]);

        assert!(store.remove_stream(&key));
        assert!(!store.remove_stream(&key));
        assert!(!store.contains_stream(&key));
        assert_eq!(store.stream_count(), 0);
    }

    #[test]
    fn test_zero_window_clamped() {
        let store = SegmentStore::with_max_segments(0);
        assert_eq!(store.max_segments(), 1);
    }
}
