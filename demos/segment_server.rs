//! HLS segment server fed by a synthetic packager
//!
//! Run with: cargo run --example segment_server [BIND_ADDR]
//!
//! A background task muxes a short MPEG-TS segment every two seconds and
//! publishes it, with a rolling playlist, to `/live/demo/index.m3u8`.
//!
//! Try:
//!   curl -i http://127.0.0.1:8080/live/demo/index.m3u8
//!   curl -i -H 'Origin: http://localhost:3000' http://127.0.0.1:8080/live/demo/index.m3u8
//!   curl -i http://127.0.0.1:8080/crossdomain.xml

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use segment_stream::file::{FileTrackInfo, FileWriter, MediaCodecId, MediaPacketFlag, MediaType, Timebase};
use segment_stream::store::{SegmentStore, StoreHandler};
use segment_stream::{PublisherType, SegmentStreamObserver, SegmentStreamServer, ServerConfig, StreamKey};

const SEGMENT_SECS: u64 = 2;
const FRAME_RATE: i64 = 25;
const PLAYLIST_WINDOW: usize = 5;

fn build_playlist(names: &[String], first_sequence: u64) -> String {
    let mut playlist = format!(
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:{}\n#EXT-X-MEDIA-SEQUENCE:{}\n",
        SEGMENT_SECS, first_sequence
    );
    for name in names {
        playlist.push_str(&format!("#EXTINF:{}.000,\n{}\n", SEGMENT_SECS, name));
    }
    playlist
}

/// Mux one segment of placeholder frames
fn mux_segment(sequence: u64) -> Result<Bytes, Box<dyn std::error::Error + Send + Sync>> {
    let path = std::env::temp_dir().join(format!("segment_server_{}.ts", std::process::id()));

    let writer = FileWriter::new();
    writer.set_path(&path, None)?;
    writer.start()?;
    writer.add_track(
        MediaType::Video,
        1,
        FileTrackInfo::new(MediaCodecId::H264)
            .timebase(Timebase::MPEG)
            .size(1280, 720)
            .framerate(FRAME_RATE as f64),
    )?;

    let frames = SEGMENT_SECS as i64 * FRAME_RATE;
    let base = sequence as i64 * frames;
    for i in 0..frames {
        let ts = (base + i) * 90_000 / FRAME_RATE;
        let (flag, nal_type) = if i == 0 {
            (MediaPacketFlag::Key, 0x65)
        } else {
            (MediaPacketFlag::NoFlag, 0x41)
        };
        let frame: Vec<u8> = vec![0, 0, 0, 1, nal_type, 0x88, 0x84, 0x00, 0x33];
        writer.put_data(1, ts, ts, flag, frame)?;
    }
    writer.stop()?;

    let data = std::fs::read(&path)?;
    let _ = std::fs::remove_file(&path);
    Ok(Bytes::from(data))
}

async fn run_packager(store: Arc<SegmentStore>, key: StreamKey) {
    let mut ticker = tokio::time::interval(Duration::from_secs(SEGMENT_SECS));
    let mut names: Vec<String> = Vec::new();

    for sequence in 0u64.. {
        ticker.tick().await;

        let segment = match tokio::task::spawn_blocking(move || mux_segment(sequence)).await {
            Ok(Ok(segment)) => segment,
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Failed to mux segment");
                continue;
            }
            Err(e) => {
                tracing::error!(error = %e, "Packager task failed");
                return;
            }
        };

        let name = format!("seg_{}.ts", sequence);
        store.push_segment(&key, name.clone(), segment);

        names.push(name);
        if names.len() > PLAYLIST_WINDOW {
            names.remove(0);
        }
        let first_sequence = sequence + 1 - names.len() as u64;
        store.publish_playlist(&key, "index.m3u8", build_playlist(&names, first_sequence));
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bind_addr: SocketAddr = match std::env::args().nth(1) {
        Some(addr) => addr.replace("localhost", "127.0.0.1").parse()?,
        None => SocketAddr::from(([127, 0, 0, 1], segment_stream::server::config::DEFAULT_PORT)),
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("segment_stream=debug".parse()?)
                .add_directive("segment_server=debug".parse()?),
        )
        .init();

    let store = Arc::new(SegmentStore::with_max_segments(PLAYLIST_WINDOW + 2));
    let handler = Arc::new(StoreHandler::new("hls-demo", PublisherType::Hls, Arc::clone(&store)));

    let config = ServerConfig::with_addr(bind_addr)
        .segment_workers(2)
        .cross_domains(["http://localhost:3000"]);
    let server = SegmentStreamServer::with_handler(config, Arc::clone(&handler));

    // Drop the stream from the store when it is disconnected
    let observer: Arc<dyn SegmentStreamObserver> = handler;
    server.add_observer(&observer);

    let key = StreamKey::new("live", "demo");
    let packager = tokio::spawn(run_packager(Arc::clone(&store), key.clone()));

    println!("Serving http://{}/{}/index.m3u8", bind_addr, key);

    server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    packager.abort();
    let stats = server.stats();
    println!(
        "Served {} requests ({} playlists, {} segments), {} bytes",
        stats.total_requests, stats.playlist_requests, stats.segment_requests, stats.total_bytes_sent
    );

    Ok(())
}
