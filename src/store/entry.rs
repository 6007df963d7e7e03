//! Per-stream playlist and segment storage

use std::collections::{HashMap, VecDeque};
use std::time::Instant;

use bytes::Bytes;

/// Content held for a single stream
#[derive(Debug)]
pub struct StreamSegments {
    /// Playlists by file name (a stream may publish a master and media playlists)
    playlists: HashMap<String, Bytes>,

    /// Segments in publish order, oldest first
    segments: VecDeque<(String, Bytes)>,

    /// Segment window size
    max_segments: usize,

    /// When the stream was first seen
    pub created_at: Instant,

    /// When content was last published
    pub updated_at: Instant,
}

impl StreamSegments {
    pub(super) fn new(max_segments: usize) -> Self {
        let now = Instant::now();
        Self {
            playlists: HashMap::new(),
            segments: VecDeque::with_capacity(max_segments),
            max_segments,
            created_at: now,
            updated_at: now,
        }
    }

    pub(super) fn set_playlist(&mut self, name: String, data: Bytes) {
        self.playlists.insert(name, data);
        self.updated_at = Instant::now();
    }

    /// Append a segment, evicting from the front once the window is full.
    ///
    /// Re-publishing an existing name replaces it in place. Returns the
    /// evicted segment names.
    pub(super) fn push_segment(&mut self, name: String, data: Bytes) -> Vec<String> {
        self.updated_at = Instant::now();

        if let Some(slot) = self.segments.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = data;
            return Vec::new();
        }

        self.segments.push_back((name, data));

        let mut evicted = Vec::new();
        while self.segments.len() > self.max_segments {
            if let Some((name, _)) = self.segments.pop_front() {
                evicted.push(name);
            }
        }
        evicted
    }

    pub fn playlist(&self, name: &str) -> Option<Bytes> {
        self.playlists.get(name).cloned()
    }

    pub fn segment(&self, name: &str) -> Option<Bytes> {
        self.segments
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, data)| data.clone())
    }

    /// Segment names, oldest first
    pub fn segment_names(&self) -> Vec<String> {
        self.segments.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn playlist_count(&self) -> usize {
        self.playlists.len()
    }

    /// Bytes held across playlists and segments
    pub fn size(&self) -> usize {
        self.playlists.values().map(Bytes::len).sum::<usize>()
            + self.segments.iter().map(|(_, d)| d.len()).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_eviction() {
        let mut entry = StreamSegments::new(2);
        assert!(entry.push_segment("s0.ts".into(), Bytes::from_static(b"a")).is_empty());
        assert!(entry.push_segment("s1.ts".into(), Bytes::from_static(b"b")).is_empty());

        let evicted = entry.push_segment("s2.ts".into(), Bytes::from_static(b"c"));
        assert_eq!(evicted, vec!["s0.ts".to_string()]);
        assert_eq!(entry.segment_names(), vec!["s1.ts", "s2.ts"]);
        assert!(entry.segment("s0.ts").is_none());
    }

    #[test]
    fn test_replace_in_place() {
        let mut entry = StreamSegments::new(2);
        entry.push_segment("s0.ts".into(), Bytes::from_static(b"old"));
        entry.push_segment("s0.ts".into(), Bytes::from_static(b"new"));

        assert_eq!(entry.segment_count(), 1);
        assert_eq!(entry.segment("s0.ts").unwrap(), Bytes::from_static(b"new"));
    }

    #[test]
    fn test_size() {
        let mut entry = StreamSegments::new(4);
        entry.set_playlist("index.m3u8".into(), Bytes::from_static(b"#EXTM3U"));
        entry.push_segment("s0.ts".into(), Bytes::from_static(&[0u8; 188]));

        assert_eq!(entry.size(), 7 + 188);
        assert_eq!(entry.playlist_count(), 1);
    }
}
