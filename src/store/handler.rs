//! Serve a [`SegmentStore`] through a segment stream server

use std::sync::Arc;

use crate::http::{HttpConnection, HttpConnectionPolicy, HttpResponse, HttpStatusCode};
use crate::segment::{
    InterceptorKind, ObserverError, PlayListType, PublisherType, SegmentStreamHandler,
    SegmentStreamObserver, SegmentStreamRequestInfo, SegmentType, StreamKey,
};

use super::store::SegmentStore;

/// MIME type for a playlist
pub fn playlist_content_type(play_list_type: PlayListType) -> &'static str {
    match play_list_type {
        PlayListType::M3u8 => "application/vnd.apple.mpegurl",
        PlayListType::Mpd => "application/dash+xml",
    }
}

/// MIME type for a media segment
pub fn segment_content_type(segment_type: SegmentType) -> &'static str {
    match segment_type {
        SegmentType::Ts => "video/MP2T",
        SegmentType::M4s | SegmentType::Mp4 => "video/mp4",
    }
}

/// Publisher that answers from a [`SegmentStore`]
///
/// Also observes stream disconnects so a stopped stream's content is
/// dropped from the store.
pub struct StoreHandler {
    name: String,
    publisher_type: PublisherType,
    store: Arc<SegmentStore>,
}

impl StoreHandler {
    pub fn new(name: impl Into<String>, publisher_type: PublisherType, store: Arc<SegmentStore>) -> Self {
        Self {
            name: name.into(),
            publisher_type,
            store,
        }
    }

    pub fn store(&self) -> &Arc<SegmentStore> {
        &self.store
    }

    fn not_found(&self, request_info: &SegmentStreamRequestInfo, response: &mut HttpResponse) {
        tracing::debug!(
            stream = %request_info.stream_key(),
            file = request_info.file_name(),
            "Not in segment store"
        );
        response.set_status(HttpStatusCode::NotFound);
    }
}

impl SegmentStreamHandler for StoreHandler {
    fn publisher_type(&self) -> PublisherType {
        self.publisher_type
    }

    fn publisher_name(&self) -> &str {
        &self.name
    }

    fn interceptor_kind(&self) -> InterceptorKind {
        match self.publisher_type {
            PublisherType::Hls => InterceptorKind::Hls,
            PublisherType::Dash | PublisherType::LlDash => InterceptorKind::Dash,
        }
    }

    fn process_playlist_request(
        &self,
        _connection: &HttpConnection,
        request_info: &SegmentStreamRequestInfo,
        play_list_type: PlayListType,
        response: &mut HttpResponse,
    ) -> HttpConnectionPolicy {
        match self
            .store
            .playlist(&request_info.stream_key(), request_info.file_name())
        {
            Some(data) => {
                response.set_body(playlist_content_type(play_list_type), data);
                // Live playlists change every segment
                response.set_header("Cache-Control", "no-cache");
            }
            None => self.not_found(request_info, response),
        }
        HttpConnectionPolicy::KeepAlive
    }

    fn process_segment_request(
        &self,
        _connection: &HttpConnection,
        request_info: &SegmentStreamRequestInfo,
        segment_type: SegmentType,
        response: &mut HttpResponse,
    ) -> HttpConnectionPolicy {
        match self
            .store
            .segment(&request_info.stream_key(), request_info.file_name())
        {
            Some(data) => response.set_body(segment_content_type(segment_type), data),
            None => self.not_found(request_info, response),
        }
        HttpConnectionPolicy::KeepAlive
    }
}

impl SegmentStreamObserver for StoreHandler {
    fn on_stream_disconnected(&self, app_name: &str, stream_name: &str) -> Result<(), ObserverError> {
        let key = StreamKey::new(app_name, stream_name);
        if self.store.remove_stream(&key) {
            Ok(())
        } else {
            Err(ObserverError(format!("stream {} is not in the store", key)))
        }
    }
}
