//! Track description for the file writer

use bytes::Bytes;

/// Kind of elementary stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Video,
    Audio,
    Data,
}

/// Codec carried by a track
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaCodecId {
    None,
    H264,
    H265,
    Vp8,
    Vp9,
    Aac,
    Mp3,
    Opus,
}

impl MediaCodecId {
    pub fn media_type(&self) -> Option<MediaType> {
        match self {
            MediaCodecId::H264 | MediaCodecId::H265 | MediaCodecId::Vp8 | MediaCodecId::Vp9 => {
                Some(MediaType::Video)
            }
            MediaCodecId::Aac | MediaCodecId::Mp3 | MediaCodecId::Opus => Some(MediaType::Audio),
            MediaCodecId::None => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MediaCodecId::None => "none",
            MediaCodecId::H264 => "h264",
            MediaCodecId::H265 => "h265",
            MediaCodecId::Vp8 => "vp8",
            MediaCodecId::Vp9 => "vp9",
            MediaCodecId::Aac => "aac",
            MediaCodecId::Mp3 => "mp3",
            MediaCodecId::Opus => "opus",
        }
    }
}

impl std::fmt::Display for MediaCodecId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Rational time unit: one tick is `num / den` seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timebase {
    pub num: u32,
    pub den: u32,
}

impl Timebase {
    /// Milliseconds
    pub const MILLIS: Timebase = Timebase { num: 1, den: 1000 };
    /// MPEG 90 kHz clock
    pub const MPEG: Timebase = Timebase { num: 1, den: 90_000 };

    pub fn new(num: u32, den: u32) -> Self {
        Self { num, den }
    }

    /// Seconds per tick
    pub fn expr(&self) -> f64 {
        if self.den == 0 {
            0.0
        } else {
            self.num as f64 / self.den as f64
        }
    }

    /// Convert a tick count in this timebase to microseconds
    pub fn to_micros(&self, value: i64) -> i64 {
        if self.den == 0 {
            return 0;
        }
        ((value as i128 * self.num as i128 * 1_000_000) / self.den as i128) as i64
    }
}

impl Default for Timebase {
    fn default() -> Self {
        Self::MILLIS
    }
}

/// Packet flags passed with each frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MediaPacketFlag {
    #[default]
    NoFlag,
    Key,
}

/// Codec parameters for one track
///
/// Built with the chained setters, e.g.
/// `FileTrackInfo::new(MediaCodecId::H264).timebase(Timebase::MPEG).size(1280, 720)`.
#[derive(Debug, Clone)]
pub struct FileTrackInfo {
    pub codec_id: MediaCodecId,
    pub bitrate: u32,
    pub timebase: Timebase,
    pub width: u32,
    pub height: u32,
    pub framerate: f64,
    pub sample_rate: u32,
    pub channels: u8,
    /// Decoder config: AVCDecoderConfigurationRecord for H.264,
    /// AudioSpecificConfig for AAC
    pub extradata: Bytes,
}

impl FileTrackInfo {
    pub fn new(codec_id: MediaCodecId) -> Self {
        Self {
            codec_id,
            bitrate: 0,
            timebase: Timebase::default(),
            width: 0,
            height: 0,
            framerate: 0.0,
            sample_rate: 0,
            channels: 0,
            extradata: Bytes::new(),
        }
    }

    pub fn bitrate(mut self, bitrate: u32) -> Self {
        self.bitrate = bitrate;
        self
    }

    pub fn timebase(mut self, timebase: Timebase) -> Self {
        self.timebase = timebase;
        self
    }

    pub fn size(mut self, width: u32, height: u32) -> Self {
        self.width = width;
        self.height = height;
        self
    }

    pub fn framerate(mut self, framerate: f64) -> Self {
        self.framerate = framerate;
        self
    }

    pub fn sample(mut self, sample_rate: u32, channels: u8) -> Self {
        self.sample_rate = sample_rate;
        self.channels = channels;
        self
    }

    pub fn extradata(mut self, extradata: impl Into<Bytes>) -> Self {
        self.extradata = extradata.into();
        self
    }
}
