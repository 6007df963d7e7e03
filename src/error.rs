//! Crate-level error type
//!
//! Module errors convert into [`Error`] so server bootstrap code can use `?`
//! across the request pipeline, the worker pool and the muxer adapter.

use crate::file::FileWriterError;
use crate::segment::request::RequestParseError;
use crate::segment::worker::SubmitError;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error
#[derive(Debug)]
pub enum Error {
    /// Socket or file I/O failure
    Io(std::io::Error),
    /// Request target could not be classified
    Parse(RequestParseError),
    /// Work item could not be handed to the worker pool
    Submit(SubmitError),
    /// Muxer adapter failure
    FileWriter(FileWriterError),
    /// Malformed HTTP request on the wire
    BadRequest(String),
    /// Operation requires a running server or pool
    NotStarted,
    /// Start called twice
    AlreadyStarted,
    /// Invalid configuration value
    Config(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Parse(e) => write!(f, "Request parse error: {}", e),
            Error::Submit(e) => write!(f, "Dispatch error: {}", e),
            Error::FileWriter(e) => write!(f, "File writer error: {}", e),
            Error::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            Error::NotStarted => write!(f, "Not started"),
            Error::AlreadyStarted => write!(f, "Already started"),
            Error::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Parse(e) => Some(e),
            Error::Submit(e) => Some(e),
            Error::FileWriter(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<RequestParseError> for Error {
    fn from(e: RequestParseError) -> Self {
        Error::Parse(e)
    }
}

impl From<SubmitError> for Error {
    fn from(e: SubmitError) -> Self {
        Error::Submit(e)
    }
}

impl From<FileWriterError> for Error {
    fn from(e: FileWriterError) -> Self {
        Error::FileWriter(e)
    }
}
