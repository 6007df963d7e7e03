//! File writer error types

use super::track::MediaCodecId;

/// Error type for [`FileWriter`](super::FileWriter) operations
#[derive(Debug)]
pub enum FileWriterError {
    /// `start` called before `set_path`
    PathNotSet,
    /// No built-in muxer for this container
    UnsupportedFormat(String),
    /// Writer is not started (or was stopped)
    NotStarted,
    /// Writer is already started
    AlreadyStarted,
    /// Packet for a track id that was never added
    UnknownTrack(i32),
    /// Track id added twice
    DuplicateTrack(i32),
    /// Container cannot carry this codec
    UnsupportedCodec { format: String, codec: MediaCodecId },
    /// Tracks cannot change once the container header is written
    TracksLocked,
    /// Underlying file write failed; the writer is closed
    Io(std::io::Error),
}

impl std::fmt::Display for FileWriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileWriterError::PathNotSet => write!(f, "Output path not set"),
            FileWriterError::UnsupportedFormat(format) => {
                write!(f, "Unsupported container format: {}", format)
            }
            FileWriterError::NotStarted => write!(f, "File writer not started"),
            FileWriterError::AlreadyStarted => write!(f, "File writer already started"),
            FileWriterError::UnknownTrack(id) => write!(f, "Unknown track: {}", id),
            FileWriterError::DuplicateTrack(id) => write!(f, "Track already added: {}", id),
            FileWriterError::UnsupportedCodec { format, codec } => {
                write!(f, "Codec {} not supported by {}", codec, format)
            }
            FileWriterError::TracksLocked => write!(f, "Header already written, tracks are fixed"),
            FileWriterError::Io(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for FileWriterError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FileWriterError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for FileWriterError {
    fn from(e: std::io::Error) -> Self {
        FileWriterError::Io(e)
    }
}
