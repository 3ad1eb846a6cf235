//! V4L2 camera source.
//!
//! `CameraDevice` opens a local device node (e.g. /dev/video0), negotiates an
//! RGB24 capture format and hands out the most recent frame on each sample.
//! Releasing the source drops the mmap stream and the device handle, which
//! stops capture.

use ouroboros::self_referencing;

use image::RgbImage;

use super::{blit_rgb, MediaKind, MediaSource, Playback, Readiness};
use crate::error::DetectError;

/// Configuration for a V4L2 camera.
#[derive(Clone, Debug)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0")
    pub device: String,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
    /// Capture rate requested from the driver.
    pub fps: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "/dev/video0".to_string(),
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

#[self_referencing]
struct CaptureState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

pub struct CameraDevice {
    config: CameraConfig,
    state: Option<CaptureState>,
    active_width: u32,
    active_height: u32,
    frames_captured: u64,
    last_error: Option<String>,
    released: bool,
}

impl CameraDevice {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            frames_captured: 0,
            last_error: None,
            released: false,
        }
    }

    fn open(&mut self) -> anyhow::Result<()> {
        use anyhow::Context;
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"RGB3");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraDevice: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        if format.fourcc != v4l::FourCC::new(b"RGB3") {
            anyhow::bail!(
                "device {} does not support RGB24 capture (got {})",
                self.config.device,
                format.fourcc
            );
        }

        if self.config.fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraDevice: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;

        let state = CaptureStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;
        self.state = Some(state);
        Ok(())
    }
}

impl MediaSource for CameraDevice {
    fn kind(&self) -> MediaKind {
        MediaKind::Camera
    }

    fn describe(&self) -> String {
        self.config.device.clone()
    }

    fn acquire(&mut self) -> Result<(), DetectError> {
        self.open()
            .map_err(|err| DetectError::acquisition(&self.config.device, format!("{err:#}")))?;
        self.released = false;
        self.last_error = None;
        log::info!(
            "CameraDevice: opened {} ({}x{})",
            self.config.device,
            self.active_width,
            self.active_height
        );
        Ok(())
    }

    fn readiness(&self) -> Readiness {
        if self.state.is_some() {
            Readiness::Ready
        } else {
            Readiness::NotReady
        }
    }

    fn playback(&self) -> Playback {
        if let Some(err) = &self.last_error {
            return Playback::Failed(err.clone());
        }
        if self.released {
            Playback::Ended
        } else if self.state.is_some() {
            Playback::Playing
        } else {
            Playback::Paused
        }
    }

    fn natural_size(&self) -> Option<(u32, u32)> {
        self.state
            .as_ref()
            .map(|_| (self.active_width, self.active_height))
    }

    fn draw_frame(&mut self, target: &mut RgbImage) -> Result<(), DetectError> {
        use v4l::io::traits::CaptureStream;

        let (width, height) = (self.active_width, self.active_height);
        let state = self
            .state
            .as_mut()
            .ok_or(DetectError::SamplingSkipped(crate::error::SkipReason::Released))?;
        let captured = state.with_mut(|fields| match fields.stream.next() {
            Ok((buf, _meta)) => Ok(blit_rgb(buf, width, height, target)),
            Err(err) => Err(err.to_string()),
        });
        match captured {
            Ok(result) => {
                self.frames_captured += 1;
                result
            }
            Err(err) => {
                self.last_error = Some(err.clone());
                Err(DetectError::Encode(format!("capture v4l2 frame: {err}")))
            }
        }
    }

    fn release(&mut self) {
        if self.state.take().is_some() {
            log::info!(
                "CameraDevice: stopped {} after {} frame(s)",
                self.config.device,
                self.frames_captured
            );
        }
        self.released = true;
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

impl Drop for CameraDevice {
    fn drop(&mut self) {
        self.release();
    }
}
