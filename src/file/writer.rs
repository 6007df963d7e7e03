//! File writer
//!
//! Wraps a [`Muxer`] with the lifecycle a recorder or packager needs:
//! `set_path` → `start` → `add_track`… → `put_data`… → `stop`.
//!
//! The container header is written lazily on the first packet, once every
//! track is known. Timestamps are converted from each track's timebase and
//! rebased so the first packet's dts is zero. All state sits behind one
//! mutex, so a writer can be shared between the tasks feeding its tracks.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use bytes::Bytes;

use super::error::FileWriterError;
use super::flv::FlvMuxer;
use super::format::{
    format_by_extension, resolve_format, DEFAULT_EXTENSION, FORMAT_FLV, FORMAT_MPEGTS,
};
use super::mpegts::TsMuxer;
use super::muxer::{MuxPacket, MuxTrack, Muxer};
use super::track::{FileTrackInfo, MediaPacketFlag, MediaType};

type Result<T> = std::result::Result<T, FileWriterError>;

/// Built-in muxer for a container name
pub fn create_muxer(format: &str) -> Result<Box<dyn Muxer>> {
    match format {
        FORMAT_MPEGTS => Ok(Box::new(TsMuxer::new())),
        FORMAT_FLV => Ok(Box::new(FlvMuxer::new())),
        other => Err(FileWriterError::UnsupportedFormat(other.to_string())),
    }
}

struct Session {
    out: BufWriter<File>,
    muxer: Box<dyn Muxer>,
    tracks: Vec<MuxTrack>,
    header_written: bool,
    start_us: Option<i64>,
    packets: u64,
    bytes: u64,
}

impl Session {
    fn ensure_header(&mut self) -> io::Result<()> {
        if !self.header_written {
            self.muxer.write_header(&mut self.out, &self.tracks)?;
            self.header_written = true;
        }
        Ok(())
    }

    fn write(&mut self, index: usize, pts: i64, dts: i64, flag: MediaPacketFlag, data: Bytes) -> io::Result<()> {
        self.ensure_header()?;

        let timebase = self.tracks[index].info.timebase;
        let pts_us = timebase.to_micros(pts);
        let dts_us = timebase.to_micros(dts);
        let start_us = *self.start_us.get_or_insert(dts_us);

        let size = data.len() as u64;
        let packet = MuxPacket {
            track_index: index,
            pts_us: pts_us - start_us,
            dts_us: dts_us - start_us,
            flag,
            data,
        };
        self.muxer.write_packet(&mut self.out, &packet)?;

        self.packets += 1;
        self.bytes += size;
        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.ensure_header()?;
        self.muxer.write_trailer(&mut self.out)?;
        self.out.flush()
    }
}

#[derive(Default)]
struct WriterState {
    path: Option<PathBuf>,
    format: Option<String>,
    custom_muxer: Option<Box<dyn Muxer>>,
    session: Option<Session>,
}

/// Muxes tracks into a single container file
#[derive(Default)]
pub struct FileWriter {
    state: Mutex<WriterState>,
}

impl FileWriter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, WriterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Set the output path and container.
    ///
    /// With no `format`, the container is picked from the path's extension
    /// (`ts` when it has none or an unknown one).
    pub fn set_path(&self, path: impl AsRef<Path>, format: Option<&str>) -> Result<()> {
        let mut state = self.lock();
        if state.session.is_some() {
            return Err(FileWriterError::AlreadyStarted);
        }

        let path = path.as_ref().to_path_buf();
        let format = match format {
            Some(name) => match resolve_format(name) {
                Some(format) => format.to_string(),
                // A plugged-in muxer may go by any name
                None if state.custom_muxer.is_some() => name.to_string(),
                None => return Err(FileWriterError::UnsupportedFormat(name.to_string())),
            },
            None => {
                let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");
                format_by_extension(extension, DEFAULT_EXTENSION).to_string()
            }
        };

        state.path = Some(path);
        state.format = Some(format);
        Ok(())
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.lock().path.clone()
    }

    pub fn format(&self) -> Option<String> {
        self.lock().format.clone()
    }

    /// Use `muxer` instead of the built-in one on the next `start`
    pub fn set_muxer(&self, muxer: Box<dyn Muxer>) -> Result<()> {
        let mut state = self.lock();
        if state.session.is_some() {
            return Err(FileWriterError::AlreadyStarted);
        }
        state.custom_muxer = Some(muxer);
        Ok(())
    }

    /// Create the output file
    pub fn start(&self) -> Result<()> {
        let mut state = self.lock();
        if state.session.is_some() {
            return Err(FileWriterError::AlreadyStarted);
        }

        let path = state.path.clone().ok_or(FileWriterError::PathNotSet)?;
        let format = state
            .format
            .clone()
            .unwrap_or_else(|| FORMAT_MPEGTS.to_string());

        let muxer = match state.custom_muxer.take() {
            Some(muxer) => muxer,
            None => create_muxer(&format)?,
        };
        let file = File::create(&path)?;

        tracing::info!(path = %path.display(), format = %muxer.name(), "File writer started");

        state.session = Some(Session {
            out: BufWriter::new(file),
            muxer,
            tracks: Vec::new(),
            header_written: false,
            start_us: None,
            packets: 0,
            bytes: 0,
        });
        Ok(())
    }

    /// Write the trailer and close the file
    pub fn stop(&self) -> Result<()> {
        let mut state = self.lock();
        let mut session = state.session.take().ok_or(FileWriterError::NotStarted)?;

        let result = session.finish();
        let path = state.path.as_deref().map(Path::display);
        match result {
            Ok(()) => {
                tracing::info!(
                    path = ?path,
                    packets = session.packets,
                    bytes = session.bytes,
                    "File writer stopped"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(path = ?path, error = %e, "Failed to finalize file");
                Err(e.into())
            }
        }
    }

    /// Register a track. Only allowed before the first packet.
    pub fn add_track(&self, media_type: MediaType, track_id: i32, info: FileTrackInfo) -> Result<()> {
        let mut state = self.lock();
        let session = state.session.as_mut().ok_or(FileWriterError::NotStarted)?;

        if session.header_written {
            return Err(FileWriterError::TracksLocked);
        }
        if session.tracks.iter().any(|t| t.track_id == track_id) {
            return Err(FileWriterError::DuplicateTrack(track_id));
        }
        if !session.muxer.supports_codec(info.codec_id) {
            return Err(FileWriterError::UnsupportedCodec {
                format: session.muxer.name().to_string(),
                codec: info.codec_id,
            });
        }

        tracing::debug!(
            track_id = track_id,
            media_type = ?media_type,
            codec = %info.codec_id,
            "Track added"
        );

        let index = session.tracks.len();
        session.tracks.push(MuxTrack {
            track_id,
            index,
            media_type,
            info,
        });
        Ok(())
    }

    /// Write one frame. `pts`/`dts` are in the track's timebase.
    ///
    /// A write failure closes the writer.
    pub fn put_data(
        &self,
        track_id: i32,
        pts: i64,
        dts: i64,
        flag: MediaPacketFlag,
        data: impl Into<Bytes>,
    ) -> Result<()> {
        let mut state = self.lock();
        let session = state.session.as_mut().ok_or(FileWriterError::NotStarted)?;

        let index = session
            .tracks
            .iter()
            .position(|t| t.track_id == track_id)
            .ok_or(FileWriterError::UnknownTrack(track_id))?;

        if let Err(e) = session.write(index, pts, dts, flag, data.into()) {
            tracing::error!(track_id = track_id, error = %e, "Write failed, closing file writer");
            state.session = None;
            return Err(e.into());
        }
        Ok(())
    }

    /// Started and not failed
    pub fn is_writable(&self) -> bool {
        self.lock().session.is_some()
    }
}

impl Drop for FileWriter {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(|e| e.into_inner());
        if let Some(mut session) = state.session.take() {
            if let Err(e) = session.finish() {
                tracing::warn!(error = %e, "Failed to finalize file on drop");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::format::FORMAT_MP4;
    use crate::file::mpegts::TS_PACKET_SIZE;
    use crate::file::track::{MediaCodecId, Timebase};
    use std::sync::{Arc, Mutex as StdMutex};

    fn h264() -> FileTrackInfo {
        FileTrackInfo::new(MediaCodecId::H264).timebase(Timebase::MPEG)
    }

    fn keyframe() -> Bytes {
        Bytes::from_static(&[0, 0, 0, 1, 0x65, 0x88, 0x84, 0x00])
    }

    #[test]
    fn test_lifecycle_mpegts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.ts");

        let writer = FileWriter::new();
        writer.set_path(&path, None).unwrap();
        assert_eq!(writer.format().as_deref(), Some("mpegts"));
        assert!(!writer.is_writable());

        writer.start().unwrap();
        assert!(writer.is_writable());
        writer.add_track(MediaType::Video, 1, h264()).unwrap();
        writer.put_data(1, 90_000, 90_000, MediaPacketFlag::Key, keyframe()).unwrap();
        writer.put_data(1, 93_000, 93_000, MediaPacketFlag::NoFlag, keyframe()).unwrap();
        writer.stop().unwrap();
        assert!(!writer.is_writable());

        let written = std::fs::read(&path).unwrap();
        assert!(!written.is_empty());
        assert_eq!(written.len() % TS_PACKET_SIZE, 0);
        assert_eq!(written[0], 0x47);
    }

    #[test]
    fn test_flv_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.flv");

        let writer = FileWriter::new();
        writer.set_path(&path, None).unwrap();
        writer.start().unwrap();
        writer
            .add_track(MediaType::Video, 1, FileTrackInfo::new(MediaCodecId::H264))
            .unwrap();
        writer.put_data(1, 0, 0, MediaPacketFlag::Key, keyframe()).unwrap();
        writer.stop().unwrap();

        let written = std::fs::read(&path).unwrap();
        assert_eq!(&written[..3], b"FLV");
    }

    #[test]
    fn test_misuse_before_start_and_after_stop() {
        let writer = FileWriter::new();
        assert!(matches!(writer.start(), Err(FileWriterError::PathNotSet)));
        assert!(matches!(
            writer.add_track(MediaType::Video, 1, h264()),
            Err(FileWriterError::NotStarted)
        ));
        assert!(matches!(
            writer.put_data(1, 0, 0, MediaPacketFlag::Key, keyframe()),
            Err(FileWriterError::NotStarted)
        ));
        assert!(matches!(writer.stop(), Err(FileWriterError::NotStarted)));

        let dir = tempfile::tempdir().unwrap();
        writer.set_path(dir.path().join("a.ts"), None).unwrap();
        writer.start().unwrap();
        assert!(matches!(writer.start(), Err(FileWriterError::AlreadyStarted)));
        assert!(matches!(
            writer.set_path(dir.path().join("b.ts"), None),
            Err(FileWriterError::AlreadyStarted)
        ));
        writer.stop().unwrap();

        assert!(!writer.is_writable());
        assert!(matches!(
            writer.put_data(1, 0, 0, MediaPacketFlag::Key, keyframe()),
            Err(FileWriterError::NotStarted)
        ));
    }

    #[test]
    fn test_mp4_unsupported() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileWriter::new();
        writer.set_path(dir.path().join("out.mp4"), None).unwrap();
        assert_eq!(writer.format().as_deref(), Some(FORMAT_MP4));

        assert!(matches!(writer.start(), Err(FileWriterError::UnsupportedFormat(_))));
        assert!(!writer.is_writable());
    }

    #[test]
    fn test_explicit_format_accepts_extension() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileWriter::new();
        writer.set_path(dir.path().join("out.seg"), Some("ts")).unwrap();
        assert_eq!(writer.format().as_deref(), Some(FORMAT_MPEGTS));

        writer.start().unwrap();
        writer.add_track(MediaType::Video, 1, h264()).unwrap();
        writer.put_data(1, 0, 0, MediaPacketFlag::Key, keyframe()).unwrap();
        writer.stop().unwrap();

        let written = std::fs::read(dir.path().join("out.seg")).unwrap();
        assert_eq!(written[0], 0x47);

        writer.set_path(dir.path().join("out.seg"), Some("FLV")).unwrap();
        assert_eq!(writer.format().as_deref(), Some(FORMAT_FLV));
    }

    #[test]
    fn test_unknown_explicit_format_fails_early() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileWriter::new();

        assert!(matches!(
            writer.set_path(dir.path().join("out.ts"), Some("mkv")),
            Err(FileWriterError::UnsupportedFormat(_))
        ));
        assert_eq!(writer.path(), None);
        assert!(matches!(writer.start(), Err(FileWriterError::PathNotSet)));
    }

    #[test]
    fn test_track_errors() {
        let dir = tempfile::tempdir().unwrap();
        let writer = FileWriter::new();
        writer.set_path(dir.path().join("out.flv"), None).unwrap();
        writer.start().unwrap();

        writer.add_track(MediaType::Video, 1, h264()).unwrap();
        assert!(matches!(
            writer.add_track(MediaType::Video, 1, h264()),
            Err(FileWriterError::DuplicateTrack(1))
        ));
        assert!(matches!(
            writer.add_track(MediaType::Video, 2, FileTrackInfo::new(MediaCodecId::Vp8)),
            Err(FileWriterError::UnsupportedCodec { .. })
        ));
        assert!(matches!(
            writer.put_data(9, 0, 0, MediaPacketFlag::Key, keyframe()),
            Err(FileWriterError::UnknownTrack(9))
        ));

        writer.put_data(1, 0, 0, MediaPacketFlag::Key, keyframe()).unwrap();
        assert!(matches!(
            writer.add_track(MediaType::Audio, 3, FileTrackInfo::new(MediaCodecId::Aac)),
            Err(FileWriterError::TracksLocked)
        ));
        assert!(writer.is_writable());
    }

    /// Records what the writer hands to the muxer
    struct RecordingMuxer {
        packets: Arc<StdMutex<Vec<(usize, i64, i64)>>>,
    }

    impl Muxer for RecordingMuxer {
        fn name(&self) -> &str {
            "recording"
        }

        fn write_header(&mut self, _out: &mut dyn Write, _tracks: &[MuxTrack]) -> io::Result<()> {
            Ok(())
        }

        fn write_packet(&mut self, _out: &mut dyn Write, packet: &MuxPacket) -> io::Result<()> {
            self.packets
                .lock()
                .unwrap()
                .push((packet.track_index, packet.pts_us, packet.dts_us));
            Ok(())
        }
    }

    #[test]
    fn test_timestamps_rebased() {
        let dir = tempfile::tempdir().unwrap();
        let packets = Arc::new(StdMutex::new(Vec::new()));

        let writer = FileWriter::new();
        writer
            .set_muxer(Box::new(RecordingMuxer {
                packets: Arc::clone(&packets),
            }))
            .unwrap();
        writer.set_path(dir.path().join("out.bin"), Some("recording")).unwrap();
        writer.start().unwrap();

        writer.add_track(MediaType::Video, 1, h264()).unwrap();
        writer
            .add_track(
                MediaType::Audio,
                2,
                FileTrackInfo::new(MediaCodecId::Aac).timebase(Timebase::MILLIS),
            )
            .unwrap();

        writer.put_data(1, 183_000, 180_000, MediaPacketFlag::Key, keyframe()).unwrap();
        writer.put_data(2, 2_010, 2_010, MediaPacketFlag::NoFlag, Bytes::from_static(&[1])).unwrap();
        writer.stop().unwrap();

        let packets = packets.lock().unwrap();
        assert_eq!(packets[0], (0, 33_333, 0));
        assert_eq!(packets[1], (1, 10_000, 10_000));
    }

    #[test]
    fn test_write_failure_closes_writer() {
        struct FailingMuxer;

        impl Muxer for FailingMuxer {
            fn name(&self) -> &str {
                "failing"
            }

            fn write_header(&mut self, _out: &mut dyn Write, _tracks: &[MuxTrack]) -> io::Result<()> {
                Ok(())
            }

            fn write_packet(&mut self, _out: &mut dyn Write, _packet: &MuxPacket) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::Other, "disk full"))
            }
        }

        let dir = tempfile::tempdir().unwrap();
        let writer = FileWriter::new();
        writer.set_muxer(Box::new(FailingMuxer)).unwrap();
        writer.set_path(dir.path().join("out.bin"), Some("failing")).unwrap();
        writer.start().unwrap();
        writer.add_track(MediaType::Video, 1, h264()).unwrap();

        assert!(matches!(
            writer.put_data(1, 0, 0, MediaPacketFlag::Key, keyframe()),
            Err(FileWriterError::Io(_))
        ));
        assert!(!writer.is_writable());
    }
}
