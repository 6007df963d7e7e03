//! Container format table

use super::track::MediaCodecId;

pub const FORMAT_MPEGTS: &str = "mpegts";
pub const FORMAT_MP4: &str = "mp4";
pub const FORMAT_FLV: &str = "flv";

/// Extension used when the path has none
pub const DEFAULT_EXTENSION: &str = "ts";

fn lookup(extension: &str) -> Option<&'static str> {
    match extension.to_ascii_lowercase().as_str() {
        "ts" => Some(FORMAT_MPEGTS),
        "mp4" => Some(FORMAT_MP4),
        "flv" => Some(FORMAT_FLV),
        _ => None,
    }
}

/// Container format for a file extension.
///
/// Unmapped extensions fall back to the format of `default_extension`, and
/// to `mpegts` if that is unmapped too.
pub fn format_by_extension(extension: &str, default_extension: &str) -> &'static str {
    lookup(extension)
        .or_else(|| lookup(default_extension))
        .unwrap_or(FORMAT_MPEGTS)
}

/// Built-in format named by `name`, given either as a format (`mpegts`) or
/// as an extension (`ts`). Case-insensitive.
pub fn resolve_format(name: &str) -> Option<&'static str> {
    let name = name.to_ascii_lowercase();
    [FORMAT_MPEGTS, FORMAT_MP4, FORMAT_FLV]
        .into_iter()
        .find(|format| *format == name)
        .or_else(|| lookup(&name))
}

/// Whether `format` can carry `codec_id`
pub fn is_support_codec(format: &str, codec_id: MediaCodecId) -> bool {
    match format {
        FORMAT_MPEGTS => matches!(
            codec_id,
            MediaCodecId::H264 | MediaCodecId::H265 | MediaCodecId::Aac | MediaCodecId::Mp3
        ),
        FORMAT_MP4 => matches!(
            codec_id,
            MediaCodecId::H264
                | MediaCodecId::H265
                | MediaCodecId::Vp9
                | MediaCodecId::Aac
                | MediaCodecId::Mp3
                | MediaCodecId::Opus
        ),
        FORMAT_FLV => matches!(
            codec_id,
            MediaCodecId::H264 | MediaCodecId::Aac | MediaCodecId::Mp3
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_format() {
        assert_eq!(resolve_format("ts"), Some(FORMAT_MPEGTS));
        assert_eq!(resolve_format("mpegts"), Some(FORMAT_MPEGTS));
        assert_eq!(resolve_format("FLV"), Some(FORMAT_FLV));
        assert_eq!(resolve_format("mp4"), Some(FORMAT_MP4));
        assert_eq!(resolve_format("mkv"), None);
    }

    #[test]
    fn test_format_by_extension() {
        assert_eq!(format_by_extension("ts", "ts"), "mpegts");
        assert_eq!(format_by_extension("MP4", "ts"), "mp4");
        assert_eq!(format_by_extension("flv", "ts"), "flv");
        assert_eq!(format_by_extension("mkv", "ts"), "mpegts");
        assert_eq!(format_by_extension("mkv", "flv"), "flv");
        assert_eq!(format_by_extension("", "nope"), "mpegts");
    }

    #[test]
    fn test_is_support_codec() {
        assert!(is_support_codec("mpegts", MediaCodecId::H264));
        assert!(is_support_codec("mpegts", MediaCodecId::Aac));
        assert!(!is_support_codec("mpegts", MediaCodecId::Vp8));
        assert!(is_support_codec("mp4", MediaCodecId::Opus));
        assert!(!is_support_codec("flv", MediaCodecId::H265));
        assert!(!is_support_codec("webm", MediaCodecId::Vp8));
    }
}
