//! Synthetic (`stub://`) camera and video sources.
//!
//! Frames are a moving gradient pattern; no device or file is touched.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use image::RgbImage;

use super::{blit_rgb, MediaKind, MediaSource, Playback, Readiness};
use crate::error::DetectError;

/// Synthetic live camera.
pub struct SyntheticCamera {
    spec: String,
    width: u32,
    height: u32,
    available: bool,
    acquired: bool,
    released: bool,
    frame_count: u64,
}

impl SyntheticCamera {
    pub fn new(spec: &str, width: u32, height: u32) -> Self {
        Self {
            spec: spec.to_string(),
            width,
            height,
            available: true,
            acquired: false,
            released: false,
            frame_count: 0,
        }
    }

    /// A camera whose acquisition always fails, as when permission is denied.
    pub fn unavailable(spec: &str) -> Self {
        Self {
            available: false,
            ..Self::new(spec, 640, 480)
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

impl MediaSource for SyntheticCamera {
    fn kind(&self) -> MediaKind {
        MediaKind::Camera
    }

    fn describe(&self) -> String {
        self.spec.clone()
    }

    fn acquire(&mut self) -> Result<(), DetectError> {
        if !self.available {
            return Err(DetectError::acquisition(&self.spec, "camera permission denied"));
        }
        self.acquired = true;
        self.released = false;
        log::info!("SyntheticCamera: opened {} ({}x{})", self.spec, self.width, self.height);
        Ok(())
    }

    fn readiness(&self) -> Readiness {
        if self.acquired && !self.released {
            Readiness::Ready
        } else {
            Readiness::NotReady
        }
    }

    fn playback(&self) -> Playback {
        if self.released {
            Playback::Ended
        } else if self.acquired {
            Playback::Playing
        } else {
            Playback::Paused
        }
    }

    fn natural_size(&self) -> Option<(u32, u32)> {
        self.acquired.then_some((self.width, self.height))
    }

    fn draw_frame(&mut self, target: &mut RgbImage) -> Result<(), DetectError> {
        self.frame_count += 1;
        let pixels = pattern(self.width, self.height, self.frame_count);
        blit_rgb(&pixels, self.width, self.height, target)
    }

    fn release(&mut self) {
        if self.acquired && !self.released {
            log::info!("SyntheticCamera: stopped {}", self.spec);
        }
        self.released = true;
        self.acquired = false;
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

const STATE_PLAYING: u8 = 0;
const STATE_PAUSED: u8 = 1;

/// Pause/resume handle for a `SyntheticVideo`, usable after the video is
/// handed to a session.
#[derive(Clone, Debug)]
pub struct VideoControl {
    state: Arc<AtomicU8>,
}

impl VideoControl {
    pub fn pause(&self) {
        self.state.store(STATE_PAUSED, Ordering::SeqCst);
    }

    pub fn resume(&self) {
        self.state.store(STATE_PLAYING, Ordering::SeqCst);
    }
}

/// Synthetic video with a fixed number of frames. One frame is consumed per draw.
pub struct SyntheticVideo {
    spec: String,
    width: u32,
    height: u32,
    total_frames: u64,
    position: u64,
    control: VideoControl,
    opened: bool,
    released: bool,
}

impl SyntheticVideo {
    pub fn new(spec: &str, width: u32, height: u32, total_frames: u64) -> Self {
        Self {
            spec: spec.to_string(),
            width,
            height,
            total_frames,
            position: 0,
            control: VideoControl {
                state: Arc::new(AtomicU8::new(STATE_PLAYING)),
            },
            opened: false,
            released: false,
        }
    }

    pub fn control(&self) -> VideoControl {
        self.control.clone()
    }
}

impl MediaSource for SyntheticVideo {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn describe(&self) -> String {
        self.spec.clone()
    }

    fn acquire(&mut self) -> Result<(), DetectError> {
        if self.total_frames == 0 {
            return Err(DetectError::acquisition(&self.spec, "video has no frames"));
        }
        self.opened = true;
        self.released = false;
        self.position = 0;
        log::info!(
            "SyntheticVideo: loaded {} ({}x{}, {} frames)",
            self.spec,
            self.width,
            self.height,
            self.total_frames
        );
        Ok(())
    }

    fn readiness(&self) -> Readiness {
        if self.opened && !self.released {
            Readiness::Ready
        } else {
            Readiness::NotReady
        }
    }

    fn playback(&self) -> Playback {
        if self.released || self.position >= self.total_frames {
            return Playback::Ended;
        }
        if !self.opened || self.control.state.load(Ordering::SeqCst) == STATE_PAUSED {
            return Playback::Paused;
        }
        Playback::Playing
    }

    fn natural_size(&self) -> Option<(u32, u32)> {
        self.opened.then_some((self.width, self.height))
    }

    fn draw_frame(&mut self, target: &mut RgbImage) -> Result<(), DetectError> {
        self.position += 1;
        let pixels = pattern(self.width, self.height, self.position);
        blit_rgb(&pixels, self.width, self.height, target)
    }

    fn release(&mut self) {
        if self.opened && !self.released {
            log::info!("SyntheticVideo: released {}", self.spec);
        }
        self.released = true;
        self.opened = false;
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

fn pattern(width: u32, height: u32, frame: u64) -> Vec<u8> {
    let mut pixels = vec![0u8; (width as usize) * (height as usize) * 3];
    for (i, px) in pixels.chunks_exact_mut(3).enumerate() {
        let x = (i as u64) % width.max(1) as u64;
        let y = (i as u64) / width.max(1) as u64;
        px[0] = ((x + frame) % 256) as u8;
        px[1] = ((y + frame / 2) % 256) as u8;
        px[2] = ((x + y) % 256) as u8;
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_reports_metadata_only_after_acquire() -> Result<(), DetectError> {
        let mut camera = SyntheticCamera::new("stub://cam", 32, 16);
        assert_eq!(camera.natural_size(), None);
        assert_eq!(camera.readiness(), Readiness::NotReady);

        camera.acquire()?;
        assert_eq!(camera.natural_size(), Some((32, 16)));
        assert_eq!(camera.playback(), Playback::Playing);

        let mut target = RgbImage::new(32, 16);
        camera.draw_frame(&mut target)?;
        assert_eq!(camera.frames_captured(), 1);

        camera.release();
        assert!(camera.is_released());
        assert_eq!(camera.readiness(), Readiness::NotReady);
        Ok(())
    }

    #[test]
    fn unavailable_camera_fails_acquisition() {
        let mut camera = SyntheticCamera::unavailable("stub://denied");
        let err = camera.acquire().unwrap_err();
        assert!(matches!(err, DetectError::MediaAcquisition { .. }));
    }

    #[test]
    fn video_pauses_and_ends() -> Result<(), DetectError> {
        let mut video = SyntheticVideo::new("stub://clip", 8, 8, 2);
        let control = video.control();
        video.acquire()?;
        assert_eq!(video.playback(), Playback::Playing);

        control.pause();
        assert_eq!(video.playback(), Playback::Paused);
        control.resume();

        let mut target = RgbImage::new(4, 4);
        video.draw_frame(&mut target)?;
        video.draw_frame(&mut target)?;
        assert_eq!(target.dimensions(), (4, 4));
        assert_eq!(video.playback(), Playback::Ended);
        Ok(())
    }
}
