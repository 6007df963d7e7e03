//! MPEG-TS muxer
//!
//! Single program: PAT on PID 0, PMT on PID 0x1000, elementary streams from
//! PID 0x100 in track order. PAT/PMT are repeated before every video
//! keyframe so a segment cut at a keyframe is independently decodable.
//!
//! ```text
//! 188-byte packet:
//! +------+------------------+-----------+---------------------+
//! | 0x47 | PUSI/PID (2B)    | AFC/CC    | [adaptation] payload |
//! +------+------------------+-----------+---------------------+
//! ```

use std::io::{self, Write};

use bytes::{BufMut, Bytes, BytesMut};

use super::codec::{annexb_nalus, avcc_to_annexb, has_adts_header, AacConfig};
use super::format::{is_support_codec, FORMAT_MPEGTS};
use super::muxer::{MuxPacket, MuxTrack, Muxer};
use super::track::{MediaCodecId, MediaType};

pub const TS_PACKET_SIZE: usize = 188;
const TS_PAYLOAD_SIZE: usize = TS_PACKET_SIZE - 4;
const TS_SYNC_BYTE: u8 = 0x47;

const PAT_PID: u16 = 0x0000;
const PMT_PID: u16 = 0x1000;
const FIRST_ES_PID: u16 = 0x0100;
const PROGRAM_NUMBER: u16 = 0x0001;
const TRANSPORT_STREAM_ID: u16 = 0x0001;

const STREAM_TYPE_MP3: u8 = 0x03;
const STREAM_TYPE_AAC: u8 = 0x0F;
const STREAM_TYPE_H264: u8 = 0x1B;
const STREAM_TYPE_H265: u8 = 0x24;

const AUD_H264: [u8; 6] = [0, 0, 0, 1, 0x09, 0xF0];

/// CRC-32/MPEG-2 over a PSI section
pub fn crc32_mpeg2(data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= (byte as u32) << 24;
        for _ in 0..8 {
            crc = if crc & 0x8000_0000 != 0 {
                (crc << 1) ^ 0x04C1_1DB7
            } else {
                crc << 1
            };
        }
    }
    crc
}

fn micros_to_90k(us: i64) -> u64 {
    ((us.max(0) as u128 * 9 / 100) as u64) & 0x1_FFFF_FFFF
}

fn put_timestamp(buf: &mut BytesMut, marker: u8, ts: u64) {
    buf.put_u8((marker << 4) | (((ts >> 29) as u8) & 0x0E) | 0x01);
    buf.put_u8((ts >> 22) as u8);
    buf.put_u8((((ts >> 14) as u8) & 0xFE) | 0x01);
    buf.put_u8((ts >> 7) as u8);
    buf.put_u8((((ts << 1) as u8) & 0xFE) | 0x01);
}

struct EsTrack {
    pid: u16,
    stream_id: u8,
    stream_type: u8,
    codec_id: MediaCodecId,
    aac_config: Option<AacConfig>,
    continuity: u8,
}

/// MPEG-TS container writer
pub struct TsMuxer {
    tracks: Vec<EsTrack>,
    pcr_index: usize,
    pat_continuity: u8,
    pmt_continuity: u8,
}

impl TsMuxer {
    pub fn new() -> Self {
        Self {
            tracks: Vec::new(),
            pcr_index: 0,
            pat_continuity: 0,
            pmt_continuity: 0,
        }
    }

    fn pat_section() -> Vec<u8> {
        let mut section = vec![
            0x00, // table_id
            0xB0,
            13, // section_length
        ];
        section.extend_from_slice(&TRANSPORT_STREAM_ID.to_be_bytes());
        section.extend_from_slice(&[0xC1, 0x00, 0x00]);
        section.extend_from_slice(&PROGRAM_NUMBER.to_be_bytes());
        section.extend_from_slice(&[0xE0 | (PMT_PID >> 8) as u8, PMT_PID as u8]);
        let crc = crc32_mpeg2(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        section
    }

    fn pmt_section(&self) -> Vec<u8> {
        let section_length = 9 + 5 * self.tracks.len() + 4;
        let pcr_pid = self
            .tracks
            .get(self.pcr_index)
            .map(|t| t.pid)
            .unwrap_or(0x1FFF);

        let mut section = vec![
            0x02, // table_id
            0xB0 | ((section_length >> 8) as u8 & 0x0F),
            section_length as u8,
        ];
        section.extend_from_slice(&PROGRAM_NUMBER.to_be_bytes());
        section.extend_from_slice(&[0xC1, 0x00, 0x00]);
        section.extend_from_slice(&[0xE0 | (pcr_pid >> 8) as u8, pcr_pid as u8]);
        section.extend_from_slice(&[0xF0, 0x00]); // program_info_length
        for track in &self.tracks {
            section.push(track.stream_type);
            section.extend_from_slice(&[0xE0 | (track.pid >> 8) as u8, track.pid as u8]);
            section.extend_from_slice(&[0xF0, 0x00]); // ES_info_length
        }
        let crc = crc32_mpeg2(&section);
        section.extend_from_slice(&crc.to_be_bytes());
        section
    }

    fn write_psi(out: &mut dyn Write, pid: u16, continuity: &mut u8, section: &[u8]) -> io::Result<()> {
        let mut packet = [0xFFu8; TS_PACKET_SIZE];
        packet[0] = TS_SYNC_BYTE;
        packet[1] = 0x40 | ((pid >> 8) as u8 & 0x1F);
        packet[2] = pid as u8;
        packet[3] = 0x10 | (*continuity & 0x0F);
        packet[4] = 0x00; // pointer_field
        packet[5..5 + section.len()].copy_from_slice(section);
        *continuity = continuity.wrapping_add(1) & 0x0F;
        out.write_all(&packet)
    }

    fn write_tables(&mut self, out: &mut dyn Write) -> io::Result<()> {
        Self::write_psi(out, PAT_PID, &mut self.pat_continuity, &Self::pat_section())?;
        let pmt = self.pmt_section();
        Self::write_psi(out, PMT_PID, &mut self.pmt_continuity, &pmt)
    }

    fn pes_payload(track: &EsTrack, data: &Bytes) -> io::Result<Vec<Bytes>> {
        match track.codec_id {
            MediaCodecId::H264 => {
                let annexb = avcc_to_annexb(data);
                let has_aud = annexb_nalus(&annexb)
                    .first()
                    .map(|nalu| nalu[0] & 0x1F == 9)
                    .unwrap_or(false);
                if has_aud {
                    Ok(vec![annexb])
                } else {
                    Ok(vec![Bytes::from_static(&AUD_H264), annexb])
                }
            }
            MediaCodecId::Aac if !has_adts_header(data) => {
                let config = track.aac_config.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::InvalidData, "aac track has no decoder config")
                })?;
                let header = config.adts_header(data.len()).ok_or_else(|| {
                    io::Error::new(
                        io::ErrorKind::InvalidInput,
                        format!("aac frame of {} bytes is too large for ADTS", data.len()),
                    )
                })?;
                Ok(vec![Bytes::copy_from_slice(&header), data.clone()])
            }
            _ => Ok(vec![data.clone()]),
        }
    }

    fn write_pes(&mut self, out: &mut dyn Write, packet: &MuxPacket) -> io::Result<()> {
        let is_pcr_track = packet.track_index == self.pcr_index;
        let track = self.tracks.get_mut(packet.track_index).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "packet for unknown track index")
        })?;

        let pts = micros_to_90k(packet.pts_us);
        let dts = micros_to_90k(packet.dts_us);
        let parts = Self::pes_payload(track, &packet.data)?;
        let payload_len: usize = parts.iter().map(Bytes::len).sum();

        let with_dts = pts != dts;
        let header_data_len = if with_dts { 10 } else { 5 };
        let mut pes = BytesMut::with_capacity(9 + header_data_len + payload_len);
        pes.put_slice(&[0x00, 0x00, 0x01, track.stream_id]);

        // Video PES may exceed 16 bits, so its length is left unbounded
        let pes_length = 3 + header_data_len + payload_len;
        if track.stream_id >= 0xE0 || pes_length > u16::MAX as usize {
            pes.put_u16(0);
        } else {
            pes.put_u16(pes_length as u16);
        }

        pes.put_u8(0x80);
        pes.put_u8(if with_dts { 0xC0 } else { 0x80 });
        pes.put_u8(header_data_len as u8);
        if with_dts {
            put_timestamp(&mut pes, 0x3, pts);
            put_timestamp(&mut pes, 0x1, dts);
        } else {
            put_timestamp(&mut pes, 0x2, pts);
        }
        for part in &parts {
            pes.put_slice(part);
        }

        let pcr = if is_pcr_track { Some(dts) } else { None };
        let random_access = packet.is_keyframe();
        let pid = track.pid;

        let mut remaining = &pes[..];
        let mut first = true;
        let mut ts_packet = Vec::with_capacity(TS_PACKET_SIZE);

        while !remaining.is_empty() {
            ts_packet.clear();

            let pcr_here = if first { pcr } else { None };
            let flags_needed = first && (pcr_here.is_some() || random_access);
            let base_af = if flags_needed {
                2 + if pcr_here.is_some() { 6 } else { 0 }
            } else {
                0
            };
            let chunk = remaining.len().min(TS_PAYLOAD_SIZE - base_af);
            let af_total = TS_PAYLOAD_SIZE - chunk;

            ts_packet.push(TS_SYNC_BYTE);
            let pusi = if first { 0x40 } else { 0x00 };
            ts_packet.push(pusi | ((pid >> 8) as u8 & 0x1F));
            ts_packet.push(pid as u8);
            let afc = if af_total > 0 { 0x30 } else { 0x10 };
            ts_packet.push(afc | (track.continuity & 0x0F));
            track.continuity = track.continuity.wrapping_add(1) & 0x0F;

            if af_total > 0 {
                ts_packet.push((af_total - 1) as u8);
                if af_total > 1 {
                    let mut flags = 0u8;
                    if first && random_access {
                        flags |= 0x40;
                    }
                    if pcr_here.is_some() {
                        flags |= 0x10;
                    }
                    ts_packet.push(flags);
                    if let Some(base) = pcr_here {
                        ts_packet.extend_from_slice(&[
                            (base >> 25) as u8,
                            (base >> 17) as u8,
                            (base >> 9) as u8,
                            (base >> 1) as u8,
                            (((base & 1) as u8) << 7) | 0x7E,
                            0x00,
                        ]);
                    }
                    ts_packet.resize(4 + af_total, 0xFF);
                }
            }

            ts_packet.extend_from_slice(&remaining[..chunk]);
            out.write_all(&ts_packet)?;

            remaining = &remaining[chunk..];
            first = false;
        }

        Ok(())
    }
}

impl Default for TsMuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl Muxer for TsMuxer {
    fn name(&self) -> &str {
        FORMAT_MPEGTS
    }

    fn supports_codec(&self, codec_id: MediaCodecId) -> bool {
        is_support_codec(FORMAT_MPEGTS, codec_id)
    }

    fn write_header(&mut self, out: &mut dyn Write, tracks: &[MuxTrack]) -> io::Result<()> {
        let mut video_count = 0u8;
        let mut audio_count = 0u8;

        self.tracks = tracks
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let (stream_id, stream_type) = match (t.media_type, t.info.codec_id) {
                    (MediaType::Video, codec) => {
                        video_count += 1;
                        let stream_type = if codec == MediaCodecId::H265 {
                            STREAM_TYPE_H265
                        } else {
                            STREAM_TYPE_H264
                        };
                        (0xE0 + video_count - 1, stream_type)
                    }
                    (_, MediaCodecId::Mp3) => {
                        audio_count += 1;
                        (0xC0 + audio_count - 1, STREAM_TYPE_MP3)
                    }
                    _ => {
                        audio_count += 1;
                        (0xC0 + audio_count - 1, STREAM_TYPE_AAC)
                    }
                };

                let aac_config = if t.info.codec_id == MediaCodecId::Aac {
                    AacConfig::parse(&t.info.extradata)
                        .or_else(|| AacConfig::from_sample(t.info.sample_rate, t.info.channels))
                } else {
                    None
                };

                EsTrack {
                    pid: FIRST_ES_PID + i as u16,
                    stream_id,
                    stream_type,
                    codec_id: t.info.codec_id,
                    aac_config,
                    continuity: 0,
                }
            })
            .collect();

        self.pcr_index = tracks
            .iter()
            .position(|t| t.media_type == MediaType::Video)
            .unwrap_or(0);

        self.write_tables(out)
    }

    fn write_packet(&mut self, out: &mut dyn Write, packet: &MuxPacket) -> io::Result<()> {
        let is_video = self
            .tracks
            .get(packet.track_index)
            .map(|t| t.stream_id >= 0xE0)
            .unwrap_or(false);
        if is_video && packet.is_keyframe() {
            self.write_tables(out)?;
        }
        self.write_pes(out, packet)
    }

    fn write_trailer(&mut self, out: &mut dyn Write) -> io::Result<()> {
        out.flush()
    }
}
