//! Muxer adapter
//!
//! Writes timestamped media packets into a container file. The container is
//! chosen from the output path's extension:
//!
//! | extension | container | built-in muxer |
//! |-----------|-----------|----------------|
//! | `ts`      | `mpegts`  | [`TsMuxer`]    |
//! | `flv`     | `flv`     | [`FlvMuxer`]   |
//! | `mp4`     | `mp4`     | none           |
//!
//! Other containers can be plugged in through the [`Muxer`] trait with
//! [`FileWriter::set_muxer`].

pub mod codec;
pub mod error;
pub mod flv;
pub mod format;
pub mod mpegts;
pub mod muxer;
pub mod track;
pub mod writer;

pub use error::FileWriterError;
pub use flv::FlvMuxer;
pub use format::{format_by_extension, is_support_codec, resolve_format};
pub use mpegts::TsMuxer;
pub use muxer::{MuxPacket, MuxTrack, Muxer};
pub use track::{FileTrackInfo, MediaCodecId, MediaPacketFlag, MediaType, Timebase};
pub use writer::{create_muxer, FileWriter};
