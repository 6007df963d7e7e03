//! Request target classification
//!
//! Segment URLs follow `/{application}/{stream}/{file}.{ext}`. The extension
//! decides whether a request is for a playlist, a media segment, or a
//! stream-level resource.

/// Unique identifier for a stream (app + stream name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamKey {
    /// Application name (e.g., "live")
    pub app: String,
    /// Stream name (e.g., "stream1")
    pub name: String,
}

impl StreamKey {
    /// Create a new stream key
    pub fn new(app: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for StreamKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.app, self.name)
    }
}

/// Why a request target could not be classified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestParseError {
    /// Target does not start with `/`
    NotAbsolute,
    /// Fewer than three path segments, or an empty one
    MissingSegment,
    /// More than three path segments
    TooManySegments,
    /// File name has no extension or no stem
    MissingExtension,
}

impl std::fmt::Display for RequestParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestParseError::NotAbsolute => write!(f, "Request target is not an absolute path"),
            RequestParseError::MissingSegment => {
                write!(f, "Request target must be /app/stream/file.ext")
            }
            RequestParseError::TooManySegments => {
                write!(f, "Request target has too many path segments")
            }
            RequestParseError::MissingExtension => write!(f, "File name has no extension"),
        }
    }
}

impl std::error::Error for RequestParseError {}

/// A classified segment-stream request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentStreamRequestInfo {
    app_name: String,
    stream_name: String,
    file_name: String,
    file_ext: String,
}

impl SegmentStreamRequestInfo {
    /// Application name
    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    /// Stream name
    pub fn stream_name(&self) -> &str {
        &self.stream_name
    }

    /// File name including extension, e.g. `index.m3u8`
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Extension without the dot, as sent by the client
    pub fn file_ext(&self) -> &str {
        &self.file_ext
    }

    /// Key of the stream this request addresses
    pub fn stream_key(&self) -> StreamKey {
        StreamKey::new(self.app_name.clone(), self.stream_name.clone())
    }

    /// How this request should be handled
    pub fn kind(&self) -> SegmentRequestKind {
        SegmentRequestKind::from_extension(&self.file_ext)
    }
}

/// Playlist flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayListType {
    /// DASH manifest
    Mpd,
    /// HLS playlist
    M3u8,
}

/// Segment container flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentType {
    /// MPEG-TS segment (HLS)
    Ts,
    /// Fragmented MP4 media segment (DASH)
    M4s,
    /// MP4 init segment
    Mp4,
}

/// Handling category selected by the file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentRequestKind {
    PlayList(PlayListType),
    Segment(SegmentType),
    /// Anything else; left to the publisher's stream-level handler
    Stream,
}

impl SegmentRequestKind {
    /// Classify an extension, case-insensitively
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "mpd" => SegmentRequestKind::PlayList(PlayListType::Mpd),
            "m3u8" => SegmentRequestKind::PlayList(PlayListType::M3u8),
            "ts" => SegmentRequestKind::Segment(SegmentType::Ts),
            "m4s" => SegmentRequestKind::Segment(SegmentType::M4s),
            "mp4" => SegmentRequestKind::Segment(SegmentType::Mp4),
            _ => SegmentRequestKind::Stream,
        }
    }
}

/// Split a request target into app, stream, file name and extension.
///
/// The query string is ignored. Exactly three non-empty path segments are
/// required and the file name needs a stem and an extension.
pub fn parse_request_url(target: &str) -> Result<SegmentStreamRequestInfo, RequestParseError> {
    let path = match target.find('?') {
        Some(idx) => &target[..idx],
        None => target,
    };

    let path = path
        .strip_prefix('/')
        .ok_or(RequestParseError::NotAbsolute)?;

    let mut segments = path.split('/');
    let (app_name, stream_name, file_name) = match (segments.next(), segments.next(), segments.next()) {
        (Some(app), Some(stream), Some(file))
            if !app.is_empty() && !stream.is_empty() && !file.is_empty() =>
        {
            (app, stream, file)
        }
        _ => return Err(RequestParseError::MissingSegment),
    };

    if segments.next().is_some() {
        return Err(RequestParseError::TooManySegments);
    }

    let file_ext = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext,
        _ => return Err(RequestParseError::MissingExtension),
    };

    Ok(SegmentStreamRequestInfo {
        app_name: app_name.to_string(),
        stream_name: stream_name.to_string(),
        file_name: file_name.to_string(),
        file_ext: file_ext.to_string(),
    })
}
