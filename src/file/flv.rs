//! FLV muxer
//!
//! File layout:
//! ```text
//! +--------------+-------------------+------+-------------------+------+---
//! | Header (9B)  | PreviousTagSize0  | Tag  | PreviousTagSize   | Tag  | ...
//! +--------------+-------------------+------+-------------------+------+---
//! ```
//!
//! Each tag is `Type(1) DataSize(3) Timestamp(3+1) StreamID(3) Data(N)`.
//! H.264 is written as AVC packets (length-prefixed NAL units), AAC as raw
//! frames, both preceded by a sequence header tag built from the track's
//! extradata.

use std::io::{self, Write};

use super::codec::{annexb_to_avcc, strip_adts, AacConfig};
use super::format::{is_support_codec, FORMAT_FLV};
use super::muxer::{MuxPacket, MuxTrack, Muxer};
use super::track::{MediaCodecId, MediaType};

const FLV_SIGNATURE: [u8; 3] = *b"FLV";
const FLV_VERSION: u8 = 0x01;
const FLV_HEADER_SIZE: u32 = 9;

const FLV_FLAG_AUDIO: u8 = 0x04;
const FLV_FLAG_VIDEO: u8 = 0x01;

const FLV_TAG_AUDIO: u8 = 8;
const FLV_TAG_VIDEO: u8 = 9;

const AVC_CODEC_ID: u8 = 7;
const AVC_SEQUENCE_HEADER: u8 = 0;
const AVC_NALU: u8 = 1;
const AVC_END_OF_SEQUENCE: u8 = 2;

const FRAME_KEY: u8 = 1;
const FRAME_INTER: u8 = 2;

/// SoundFormat 10 (AAC), 44 kHz, 16-bit, stereo. Fixed for AAC by the FLV format.
const AAC_AUDIO_HEADER: u8 = 0xAF;
/// SoundFormat 2 (MP3), 44 kHz, 16-bit, stereo
const MP3_AUDIO_HEADER: u8 = 0x2F;
const AAC_SEQUENCE_HEADER: u8 = 0;
const AAC_RAW: u8 = 1;

pub(crate) fn write_flv_header(out: &mut dyn Write, has_audio: bool, has_video: bool) -> io::Result<()> {
    let mut flags = 0u8;
    if has_audio {
        flags |= FLV_FLAG_AUDIO;
    }
    if has_video {
        flags |= FLV_FLAG_VIDEO;
    }

    out.write_all(&FLV_SIGNATURE)?;
    out.write_all(&[FLV_VERSION, flags])?;
    out.write_all(&FLV_HEADER_SIZE.to_be_bytes())?;
    out.write_all(&0u32.to_be_bytes())?; // PreviousTagSize0
    Ok(())
}

/// Tag header, the payload parts in order, then PreviousTagSize
pub(crate) fn write_flv_tag(
    out: &mut dyn Write,
    tag_type: u8,
    timestamp: u32,
    parts: &[&[u8]],
) -> io::Result<()> {
    let data_size: u32 = parts.iter().map(|p| p.len() as u32).sum();

    let [_, s1, s2, s3] = data_size.to_be_bytes();
    let [t_ext, t1, t2, t3] = timestamp.to_be_bytes();

    out.write_all(&[tag_type, s1, s2, s3, t1, t2, t3, t_ext, 0, 0, 0])?;
    for part in parts {
        out.write_all(part)?;
    }
    out.write_all(&(11 + data_size).to_be_bytes())?;
    Ok(())
}

fn micros_to_millis(us: i64) -> u32 {
    (us.max(0) / 1000).min(u32::MAX as i64) as u32
}

/// FLV container writer
#[derive(Debug, Default)]
pub struct FlvMuxer {
    tracks: Vec<MuxTrack>,
    last_timestamp: u32,
}

impl FlvMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    fn write_sequence_headers(&self, out: &mut dyn Write) -> io::Result<()> {
        for track in &self.tracks {
            match track.info.codec_id {
                MediaCodecId::H264 if !track.info.extradata.is_empty() => {
                    let header = [(FRAME_KEY << 4) | AVC_CODEC_ID, AVC_SEQUENCE_HEADER, 0, 0, 0];
                    write_flv_tag(out, FLV_TAG_VIDEO, 0, &[&header[..], &track.info.extradata[..]])?;
                }
                MediaCodecId::Aac => {
                    let asc = if track.info.extradata.is_empty() {
                        match AacConfig::from_sample(track.info.sample_rate, track.info.channels) {
                            Some(config) => config.to_asc().to_vec(),
                            None => continue,
                        }
                    } else {
                        track.info.extradata.to_vec()
                    };
                    write_flv_tag(
                        out,
                        FLV_TAG_AUDIO,
                        0,
                        &[&[AAC_AUDIO_HEADER, AAC_SEQUENCE_HEADER][..], &asc[..]],
                    )?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl Muxer for FlvMuxer {
    fn name(&self) -> &str {
        FORMAT_FLV
    }

    fn supports_codec(&self, codec_id: MediaCodecId) -> bool {
        is_support_codec(FORMAT_FLV, codec_id)
    }

    fn write_header(&mut self, out: &mut dyn Write, tracks: &[MuxTrack]) -> io::Result<()> {
        self.tracks = tracks.to_vec();

        let has_audio = tracks.iter().any(|t| t.media_type == MediaType::Audio);
        let has_video = tracks.iter().any(|t| t.media_type == MediaType::Video);

        write_flv_header(out, has_audio, has_video)?;
        self.write_sequence_headers(out)
    }

    fn write_packet(&mut self, out: &mut dyn Write, packet: &MuxPacket) -> io::Result<()> {
        let track = self.tracks.get(packet.track_index).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "packet for unknown track index")
        })?;
        let timestamp = micros_to_millis(packet.dts_us);

        match track.info.codec_id {
            MediaCodecId::H264 => {
                let frame_type = if packet.is_keyframe() { FRAME_KEY } else { FRAME_INTER };
                let cts = ((packet.pts_us - packet.dts_us) / 1000).clamp(-0x80_0000, 0x7F_FFFF) as i32;
                let [_, c1, c2, c3] = cts.to_be_bytes();
                let header = [(frame_type << 4) | AVC_CODEC_ID, AVC_NALU, c1, c2, c3];
                let payload = annexb_to_avcc(&packet.data);
                write_flv_tag(out, FLV_TAG_VIDEO, timestamp, &[&header[..], &payload[..]])?;
            }
            MediaCodecId::Aac => {
                let payload = strip_adts(&packet.data);
                write_flv_tag(out, FLV_TAG_AUDIO, timestamp, &[&[AAC_AUDIO_HEADER, AAC_RAW][..], &payload[..]])?;
            }
            MediaCodecId::Mp3 => {
                write_flv_tag(out, FLV_TAG_AUDIO, timestamp, &[&[MP3_AUDIO_HEADER][..], &packet.data[..]])?;
            }
            other => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("codec {} cannot be written to flv", other),
                ));
            }
        }

        self.last_timestamp = self.last_timestamp.max(timestamp);
        Ok(())
    }

    fn write_trailer(&mut self, out: &mut dyn Write) -> io::Result<()> {
        let has_h264 = self
            .tracks
            .iter()
            .any(|t| t.info.codec_id == MediaCodecId::H264);
        if has_h264 {
            let header = [(FRAME_KEY << 4) | AVC_CODEC_ID, AVC_END_OF_SEQUENCE, 0, 0, 0];
            write_flv_tag(out, FLV_TAG_VIDEO, self.last_timestamp, &[&header[..]])?;
        }
        out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::track::{FileTrackInfo, MediaPacketFlag};
    use bytes::Bytes;

    #[test]
    fn test_flv_header() {
        let mut buf: Vec<u8> = Vec::new();
        write_flv_header(&mut buf, true, true).unwrap();

        assert_eq!(buf.len(), 13);
        assert_eq!(&buf[0..3], b"FLV");
        assert_eq!(buf[3], 1);
        assert_eq!(buf[4], 0x05);
        assert_eq!(&buf[5..9], &[0, 0, 0, 9]);
        assert_eq!(&buf[9..13], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_flv_tag_layout() {
        let mut buf: Vec<u8> = Vec::new();
        write_flv_tag(&mut buf, FLV_TAG_VIDEO, 0x0102_0304, &[&[0xAA, 0xBB][..], &[0xCC][..]]).unwrap();

        assert_eq!(buf[0], FLV_TAG_VIDEO);
        assert_eq!(&buf[1..4], &[0, 0, 3]);
        // Lower 24 bits then the extension byte
        assert_eq!(&buf[4..8], &[0x02, 0x03, 0x04, 0x01]);
        assert_eq!(&buf[8..11], &[0, 0, 0]);
        assert_eq!(&buf[11..14], &[0xAA, 0xBB, 0xCC]);
        assert_eq!(&buf[14..18], &14u32.to_be_bytes());
    }

    #[test]
    fn test_h264_packet() {
        let track = MuxTrack {
            track_id: 1,
            index: 0,
            media_type: MediaType::Video,
            info: FileTrackInfo::new(MediaCodecId::H264),
        };
        let mut muxer = FlvMuxer::new();
        let mut buf: Vec<u8> = Vec::new();
        muxer.write_header(&mut buf, &[track]).unwrap();
        // No extradata, so no sequence header
        assert_eq!(buf.len(), 13);
        assert_eq!(buf[4], FLV_FLAG_VIDEO);

        buf.clear();
        let packet = MuxPacket {
            track_index: 0,
            pts_us: 80_000,
            dts_us: 40_000,
            flag: MediaPacketFlag::Key,
            data: Bytes::from_static(&[0, 0, 0, 1, 0x65, 0x88]),
        };
        muxer.write_packet(&mut buf, &packet).unwrap();

        assert_eq!(&buf[4..8], &[0, 0, 40, 0]);
        assert_eq!(&buf[11..16], &[0x17, 0x01, 0, 0, 40]);
        assert_eq!(&buf[16..22], &[0, 0, 0, 2, 0x65, 0x88]);
    }

    #[test]
    fn test_aac_sequence_header_from_sample() {
        let track = MuxTrack {
            track_id: 2,
            index: 0,
            media_type: MediaType::Audio,
            info: FileTrackInfo::new(MediaCodecId::Aac).sample(44100, 2),
        };
        let mut muxer = FlvMuxer::new();
        let mut buf: Vec<u8> = Vec::new();
        muxer.write_header(&mut buf, &[track]).unwrap();

        assert_eq!(buf[4], FLV_FLAG_AUDIO);
        let tag = &buf[13..];
        assert_eq!(tag[0], FLV_TAG_AUDIO);
        assert_eq!(&tag[11..15], &[0xAF, 0x00, 0x12, 0x10]);
    }

    #[test]
    fn test_unknown_track_index() {
        let mut muxer = FlvMuxer::new();
        let packet = MuxPacket {
            track_index: 3,
            pts_us: 0,
            dts_us: 0,
            flag: MediaPacketFlag::NoFlag,
            data: Bytes::new(),
        };
        assert!(muxer.write_packet(&mut Vec::<u8>::new(), &packet).is_err());
    }
}
