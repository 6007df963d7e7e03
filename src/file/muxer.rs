//! Container muxer interface

use std::io::{self, Write};

use bytes::Bytes;

use super::track::{FileTrackInfo, MediaCodecId, MediaPacketFlag, MediaType};

/// A track as handed to a muxer
#[derive(Debug, Clone)]
pub struct MuxTrack {
    /// Caller's track id
    pub track_id: i32,
    /// Position in the container, in add order
    pub index: usize,
    pub media_type: MediaType,
    pub info: FileTrackInfo,
}

/// One frame ready for muxing
///
/// Timestamps are in microseconds, rebased so the first packet written has
/// dts 0.
#[derive(Debug, Clone)]
pub struct MuxPacket {
    pub track_index: usize,
    pub pts_us: i64,
    pub dts_us: i64,
    pub flag: MediaPacketFlag,
    pub data: Bytes,
}

impl MuxPacket {
    pub fn is_keyframe(&self) -> bool {
        self.flag == MediaPacketFlag::Key
    }
}

/// Writes one container format.
///
/// The writer calls `write_header` once before the first packet, then
/// `write_packet` per frame, then `write_trailer` on stop.
pub trait Muxer: Send {
    /// Container name, e.g. "flv"
    fn name(&self) -> &str;

    fn supports_codec(&self, _codec_id: MediaCodecId) -> bool {
        true
    }

    fn write_header(&mut self, out: &mut dyn Write, tracks: &[MuxTrack]) -> io::Result<()>;

    fn write_packet(&mut self, out: &mut dyn Write, packet: &MuxPacket) -> io::Result<()>;

    fn write_trailer(&mut self, _out: &mut dyn Write) -> io::Result<()> {
        Ok(())
    }
}
