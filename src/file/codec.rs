//! Bitstream helpers shared by the muxers
//!
//! Video arrives as Annex-B (start-code delimited NAL units). Audio arrives
//! as raw AAC frames, optionally with an ADTS header.

use bytes::{BufMut, Bytes, BytesMut};

/// Split an Annex-B buffer into NAL units (start codes removed)
pub fn annexb_nalus(data: &[u8]) -> Vec<&[u8]> {
    let mut nalus = Vec::new();
    let mut start = None;
    let mut i = 0;

    while i + 3 <= data.len() {
        let zero3 = data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 1;
        let zero4 = i + 4 <= data.len() && data[i] == 0 && data[i + 1] == 0 && data[i + 2] == 0 && data[i + 3] == 1;

        if zero3 || zero4 {
            let code_len = if zero4 { 4 } else { 3 };
            if let Some(s) = start {
                push_trimmed(&mut nalus, &data[s..i]);
            }
            i += code_len;
            start = Some(i);
        } else {
            i += 1;
        }
    }

    if let Some(s) = start {
        push_trimmed(&mut nalus, &data[s..]);
    }
    nalus
}

fn push_trimmed<'a>(nalus: &mut Vec<&'a [u8]>, nalu: &'a [u8]) {
    if !nalu.is_empty() {
        nalus.push(nalu);
    }
}

/// Whether the buffer starts with an Annex-B start code
pub fn is_annexb(data: &[u8]) -> bool {
    data.starts_with(&[0, 0, 1]) || data.starts_with(&[0, 0, 0, 1])
}

/// Re-frame Annex-B NAL units with 4-byte big-endian length prefixes.
///
/// Buffers without a start code are assumed to be length-prefixed already.
pub fn annexb_to_avcc(data: &Bytes) -> Bytes {
    if !is_annexb(data) {
        return data.clone();
    }

    let nalus = annexb_nalus(data);
    let mut out = BytesMut::with_capacity(data.len() + nalus.len() * 4);
    for nalu in nalus {
        out.put_u32(nalu.len() as u32);
        out.put_slice(nalu);
    }
    out.freeze()
}

/// Re-frame 4-byte length-prefixed NAL units with Annex-B start codes.
///
/// Buffers that already start with a start code are returned unchanged.
pub fn avcc_to_annexb(data: &Bytes) -> Bytes {
    if is_annexb(data) {
        return data.clone();
    }

    let mut out = BytesMut::with_capacity(data.len() + 16);
    let mut offset = 0;
    while offset + 4 <= data.len() {
        let len = u32::from_be_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]]) as usize;
        offset += 4;
        if len > data.len() - offset {
            tracing::warn!(
                nalu_len = len,
                remaining = data.len() - offset,
                "Truncated length-prefixed NAL unit, dropping rest of access unit"
            );
            break;
        }
        out.put_slice(&[0, 0, 0, 1]);
        out.put_slice(&data[offset..offset + len]);
        offset += len;
    }
    out.freeze()
}

/// Largest raw AAC frame an ADTS header can describe (13-bit length minus header)
pub const MAX_ADTS_PAYLOAD: usize = 0x1FFF - 7;

/// Fields of an AudioSpecificConfig needed to build ADTS headers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AacConfig {
    pub audio_object_type: u8,
    pub sampling_frequency_index: u8,
    pub channel_configuration: u8,
}

impl AacConfig {
    const SAMPLING_FREQUENCIES: [u32; 13] = [
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
    ];

    /// Parse the leading bits of an AudioSpecificConfig
    pub fn parse(asc: &[u8]) -> Option<Self> {
        if asc.len() < 2 {
            return None;
        }

        // audioObjectType(5) samplingFrequencyIndex(4) channelConfiguration(4)
        let audio_object_type = (asc[0] >> 3) & 0x1F;
        let sampling_frequency_index = ((asc[0] & 0x07) << 1) | ((asc[1] >> 7) & 0x01);
        let channel_configuration = (asc[1] >> 3) & 0x0F;

        if sampling_frequency_index as usize >= Self::SAMPLING_FREQUENCIES.len() {
            return None;
        }

        Some(Self {
            audio_object_type,
            sampling_frequency_index,
            channel_configuration,
        })
    }

    /// Build a config from a sample rate and channel count (AAC-LC)
    pub fn from_sample(sample_rate: u32, channels: u8) -> Option<Self> {
        let index = Self::SAMPLING_FREQUENCIES
            .iter()
            .position(|&f| f == sample_rate)?;
        Some(Self {
            audio_object_type: 2,
            sampling_frequency_index: index as u8,
            channel_configuration: channels & 0x0F,
        })
    }

    pub fn sampling_frequency(&self) -> u32 {
        Self::SAMPLING_FREQUENCIES[self.sampling_frequency_index as usize]
    }

    /// Two-byte AudioSpecificConfig
    pub fn to_asc(&self) -> [u8; 2] {
        [
            (self.audio_object_type << 3) | (self.sampling_frequency_index >> 1),
            ((self.sampling_frequency_index & 0x01) << 7) | (self.channel_configuration << 3),
        ]
    }

    /// 7-byte ADTS header (no CRC) for a raw frame of `frame_length` bytes.
    ///
    /// `None` if the framed length does not fit the 13-bit length field.
    pub fn adts_header(&self, frame_length: usize) -> Option<[u8; 7]> {
        if frame_length > MAX_ADTS_PAYLOAD {
            return None;
        }

        let profile = self.audio_object_type.saturating_sub(1);
        let freq_idx = self.sampling_frequency_index;
        let channels = self.channel_configuration;
        let frame_len = frame_length + 7;

        Some([
            0xFF,
            0xF1,
            ((profile & 0x03) << 6) | ((freq_idx & 0x0F) << 2) | ((channels >> 2) & 0x01),
            ((channels & 0x03) << 6) | ((frame_len >> 11) & 0x03) as u8,
            ((frame_len >> 3) & 0xFF) as u8,
            (((frame_len & 0x07) << 5) | 0x1F) as u8,
            0xFC,
        ])
    }
}

/// Whether the buffer starts with an ADTS sync word
pub fn has_adts_header(data: &[u8]) -> bool {
    data.len() >= 7 && data[0] == 0xFF && (data[1] & 0xF0) == 0xF0
}

/// Strip a leading ADTS header, if any
pub fn strip_adts(data: &Bytes) -> Bytes {
    if !has_adts_header(data) {
        return data.clone();
    }
    // protection_absent = 0 means a 2-byte CRC follows the header
    let header_len = if data[1] & 0x01 == 0 { 9 } else { 7 };
    if data.len() < header_len {
        return Bytes::new();
    }
    data.slice(header_len..)
}
