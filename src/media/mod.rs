//! Media sources a detection session can sample from.
//!
//! This module provides the sources that stand in for a camera stream or a
//! selected video:
//! - Synthetic camera / video (`stub://` specs, tests and demos)
//! - USB/V4L2 cameras (feature: ingest-v4l2)
//! - Local video files (feature: ingest-file-ffmpeg)
//!
//! A source is exclusively owned by one session. The session MUST call
//! `release()` on every exit path; release stops device capture (camera) or
//! closes the decoder (video) and is idempotent.

use image::RgbImage;

use crate::error::DetectError;

pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;
#[cfg(feature = "ingest-file-ffmpeg")]
pub mod video_ffmpeg;

pub use synthetic::{SyntheticCamera, SyntheticVideo};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::CameraDevice;
#[cfg(feature = "ingest-file-ffmpeg")]
pub use video_ffmpeg::VideoFile;

/// Frame size used when a source cannot report its native dimensions.
pub const FALLBACK_WIDTH: u32 = 640;
pub const FALLBACK_HEIGHT: u32 = 480;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    /// Live camera, sampled on a frame-aligned 500 ms cadence.
    Camera,
    /// Selected video, sampled at a configurable frame rate.
    Video,
}

/// Whether the source has buffered enough to draw its current frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Readiness {
    NotReady,
    Ready,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Playback {
    Playing,
    Paused,
    Ended,
    Failed(String),
}

pub trait MediaSource: Send {
    fn kind(&self) -> MediaKind;

    /// Short human-readable name (device path, file path, stub URL).
    fn describe(&self) -> String;

    /// Open the device or file and start playback.
    fn acquire(&mut self) -> Result<(), DetectError>;

    fn readiness(&self) -> Readiness;

    fn playback(&self) -> Playback;

    /// Intrinsic resolution once metadata is known.
    fn natural_size(&self) -> Option<(u32, u32)>;

    /// Draw the current frame into `target`, scaling to the target's dimensions.
    fn draw_frame(&mut self, target: &mut RgbImage) -> Result<(), DetectError>;

    /// Stop capture and drop device/decoder handles.
    fn release(&mut self);

    fn is_released(&self) -> bool;
}

/// Open a camera by spec: `stub://...` or a V4L2 device path.
pub fn open_camera(spec: &str) -> anyhow::Result<Box<dyn MediaSource>> {
    if spec.starts_with("stub://") {
        return Ok(Box::new(SyntheticCamera::new(spec, 640, 480)));
    }
    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(CameraDevice::new(v4l2::CameraConfig {
            device: spec.to_string(),
            ..v4l2::CameraConfig::default()
        })))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        anyhow::bail!("camera capture requires the ingest-v4l2 feature")
    }
}

/// Open a video by spec: `stub://...` or a local file path.
pub fn open_video(spec: &str) -> anyhow::Result<Box<dyn MediaSource>> {
    if spec.starts_with("stub://") {
        return Ok(Box::new(SyntheticVideo::new(spec, 640, 360, 300)));
    }
    if spec.contains("://") {
        anyhow::bail!("video input must be a local file path");
    }
    #[cfg(feature = "ingest-file-ffmpeg")]
    {
        Ok(Box::new(VideoFile::new(spec)))
    }
    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    {
        anyhow::bail!("video decoding requires the ingest-file-ffmpeg feature")
    }
}

/// Copy a packed RGB24 buffer into `target`, resizing when dimensions differ.
pub(crate) fn blit_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    target: &mut RgbImage,
) -> Result<(), DetectError> {
    let expected = (width as usize) * (height as usize) * 3;
    if pixels.len() != expected {
        return Err(DetectError::Encode(format!(
            "frame length mismatch: expected {} bytes for {}x{} RGB, got {}",
            expected,
            width,
            height,
            pixels.len()
        )));
    }
    if target.dimensions() == (width, height) {
        target.copy_from_slice(pixels);
        return Ok(());
    }
    let frame = RgbImage::from_raw(width, height, pixels.to_vec())
        .ok_or_else(|| DetectError::Encode("frame buffer allocation failed".to_string()))?;
    let (tw, th) = target.dimensions();
    *target = image::imageops::resize(&frame, tw, th, image::imageops::FilterType::Triangle);
    Ok(())
}
