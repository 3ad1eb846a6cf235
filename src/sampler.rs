//! Still-frame capture from a playing media source.

use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, RgbImage};

use crate::error::{DetectError, SkipReason};
use crate::media::{MediaSource, Playback, Readiness, FALLBACK_HEIGHT, FALLBACK_WIDTH};

/// Lossy encode quality, matching a canvas `toBlob(.., 0.8)` capture.
pub const JPEG_QUALITY: u8 = 80;

/// A compressed still frame ready for upload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedFrame {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub content_type: &'static str,
    pub filename: String,
}

impl EncodedFrame {
    /// Wrap already-encoded image bytes (e.g. an uploaded file).
    pub fn from_file_bytes(bytes: Vec<u8>, filename: &str, width: u32, height: u32) -> Self {
        let lower = filename.to_ascii_lowercase();
        let content_type = if lower.ends_with(".png") {
            "image/png"
        } else {
            "image/jpeg"
        };
        Self {
            bytes,
            width,
            height,
            content_type,
            filename: filename.to_string(),
        }
    }
}

/// Captures the current frame of a source into a JPEG.
///
/// The RGB drawing buffer is kept between calls and only reallocated when the
/// source resolution changes.
pub struct FrameSampler {
    buffer: RgbImage,
    quality: u8,
}

impl FrameSampler {
    pub fn new() -> Self {
        Self::with_quality(JPEG_QUALITY)
    }

    pub fn with_quality(quality: u8) -> Self {
        Self {
            buffer: RgbImage::new(0, 0),
            quality: quality.clamp(1, 100),
        }
    }

    /// Current drawing buffer, as last filled by `sample`.
    pub fn buffer(&self) -> &RgbImage {
        &self.buffer
    }

    /// Capture and encode the source's current frame.
    ///
    /// Returns `DetectError::SamplingSkipped` when the source is not ready,
    /// paused, ended or released; callers treat that as "no frame this tick".
    pub fn sample(&mut self, source: &mut dyn MediaSource) -> Result<EncodedFrame, DetectError> {
        if source.is_released() {
            return Err(DetectError::SamplingSkipped(SkipReason::Released));
        }
        if source.readiness() != Readiness::Ready {
            return Err(DetectError::SamplingSkipped(SkipReason::NotReady));
        }
        match source.playback() {
            Playback::Playing => {}
            Playback::Paused => return Err(DetectError::SamplingSkipped(SkipReason::Paused)),
            Playback::Ended | Playback::Failed(_) => {
                return Err(DetectError::SamplingSkipped(SkipReason::Ended))
            }
        }

        let (width, height) = match source.natural_size() {
            Some((w, h)) if w > 0 && h > 0 => (w, h),
            _ => (FALLBACK_WIDTH, FALLBACK_HEIGHT),
        };
        if self.buffer.dimensions() != (width, height) {
            self.buffer = RgbImage::new(width, height);
        }
        source.draw_frame(&mut self.buffer)?;

        let mut bytes = Vec::with_capacity((width as usize) * (height as usize) / 8);
        JpegEncoder::new_with_quality(&mut bytes, self.quality)
            .encode(self.buffer.as_raw(), width, height, ExtendedColorType::Rgb8)
            .map_err(|err| DetectError::Encode(err.to_string()))?;

        Ok(EncodedFrame {
            bytes,
            width,
            height,
            content_type: "image/jpeg",
            filename: "frame.jpg".to_string(),
        })
    }
}

impl Default for FrameSampler {
    fn default() -> Self {
        Self::new()
    }
}
