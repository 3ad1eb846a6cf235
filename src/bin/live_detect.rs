//! live_detect - run a detection session against a camera or a video file.
//!
//! Frames are sampled on the session cadence (500 ms for a camera, `--fps`
//! for a video), uploaded to the detection relay, and the latest detections
//! are printed with their size, distance and angle from the frame center.
//! With `--snapshot-dir`, an annotated PNG is written whenever a new
//! detection set is applied.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use detection_relay::media::{open_camera, open_video};
use detection_relay::session::DEFAULT_VIDEO_FPS;
use detection_relay::{
    ClientConfig, DetectionSession, DetectionSummary, InferenceClient, SessionRunner,
};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Live object detection through the detection relay"
)]
struct Args {
    /// Camera to open: a V4L2 device path (ingest-v4l2 feature) or stub://camera.
    #[arg(long, env = "DETECT_CAMERA", conflicts_with = "video", required_unless_present = "video")]
    camera: Option<String>,

    /// Video to play: a local file (ingest-file-ffmpeg feature) or stub://video.
    #[arg(long, env = "DETECT_VIDEO")]
    video: Option<String>,

    /// Video sampling rate, clamped to 1..=10 (floor of 200 ms between samples).
    #[arg(long, env = "DETECT_VIDEO_FPS", default_value_t = DEFAULT_VIDEO_FPS)]
    fps: u32,

    /// Overlay size as WIDTHxHEIGHT; defaults to the source resolution.
    #[arg(long, value_parser = parse_display)]
    display: Option<(u32, u32)>,

    /// Relay base URL, tried before scanning localhost:5050-5060.
    #[arg(long, env = "DETECT_API_BASE")]
    api_base: Option<String>,

    /// Stop after this many seconds.
    #[arg(long)]
    seconds: Option<u64>,

    /// Write annotated PNG snapshots here.
    #[arg(long)]
    snapshot_dir: Option<PathBuf>,
}

fn parse_display(value: &str) -> std::result::Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| "expected WIDTHxHEIGHT".to_string())?;
    let w: u32 = w.trim().parse().map_err(|_| "invalid width".to_string())?;
    let h: u32 = h.trim().parse().map_err(|_| "invalid height".to_string())?;
    if w == 0 || h == 0 {
        return Err("display size must be non-zero".to_string());
    }
    Ok((w, h))
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut client_config = ClientConfig::from_env()?;
    if let Some(base) = &args.api_base {
        client_config = client_config.with_api_base(base)?;
    }
    let client = Arc::new(InferenceClient::new(client_config));

    let source = match (&args.camera, &args.video) {
        (Some(camera), _) => open_camera(camera)?,
        (None, Some(video)) => open_video(video)?,
        (None, None) => return Err(anyhow!("one of --camera or --video is required")),
    };

    if let Some(dir) = &args.snapshot_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("create snapshot dir {}", dir.display()))?;
    }

    let mut session = DetectionSession::new(client);
    session.set_video_fps(args.fps, Instant::now());
    if let Some((width, height)) = args.display {
        session.set_display_size(width, height);
    }
    session.start(source, Instant::now())?;

    let runner = SessionRunner::new();
    let stop = runner.stop_handle();
    ctrlc::set_handler(move || {
        stop.store(true, Ordering::SeqCst);
    })?;

    let deadline = args
        .seconds
        .map(|seconds| Instant::now() + Duration::from_secs(seconds));
    let mut last_applied = 0;
    let mut snapshots = 0u64;
    let outcome = runner.run(&mut session, deadline, |session| {
        if let Some(err) = session.take_surfaced_error() {
            log::error!(
                "{}. Make sure the relay is running (detect_proxy) on localhost:5050-5060",
                err
            );
        }
        let applied = session.stats().results_applied;
        if applied == last_applied {
            return;
        }
        last_applied = applied;
        print_detections(session);
        if let Some(dir) = &args.snapshot_dir {
            snapshots += 1;
            let path = dir.join(format!("detections-{snapshots:05}.png"));
            if let Err(err) = session.annotated_frame().save(&path) {
                log::warn!("failed to write snapshot {}: {}", path.display(), err);
            }
        }
    });

    let stats = session.stats();
    log::info!(
        "live_detect finished ({:?}): {} tick(s), {} request(s), {} applied, {} discarded, {} failed",
        outcome,
        stats.ticks,
        stats.requests_dispatched,
        stats.results_applied,
        stats.results_discarded,
        stats.failures
    );
    Ok(())
}

fn print_detections(session: &DetectionSession) {
    let geometry = session.geometry();
    let (natural_w, natural_h) = (
        geometry.natural_width as u32,
        geometry.natural_height as u32,
    );
    let detections = session.detections();
    println!("Detections ({})", detections.len());
    for detection in detections {
        println!(
            "  {}",
            DetectionSummary::describe(detection, natural_w, natural_h)
        );
    }
}
