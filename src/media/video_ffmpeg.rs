//! Local video file source using FFmpeg.
//!
//! Playback follows wall-clock time from the moment the file is acquired: each
//! draw decodes forward until the frame whose presentation time covers the
//! elapsed playback time, like sampling a playing video element.

use anyhow::Context;
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::time::Instant;

use super::{blit_rgb, MediaKind, MediaSource, Playback, Readiness};
use crate::error::{DetectError, SkipReason};

struct Decoder {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: f64,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    width: u32,
    height: u32,
}

pub struct VideoFile {
    path: String,
    decoder: Option<Decoder>,
    started_at: Option<Instant>,
    current: Option<(Vec<u8>, f64)>,
    ended: bool,
    last_error: Option<String>,
    released: bool,
}

impl VideoFile {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            decoder: None,
            started_at: None,
            current: None,
            ended: false,
            last_error: None,
            released: false,
        }
    }

    fn open(&self) -> anyhow::Result<Decoder> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&self.path)
            .with_context(|| format!("failed to open video '{}' with ffmpeg", self.path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow::anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let time_base = f64::from(input_stream.time_base());
        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        let (width, height) = (decoder.width(), decoder.height());
        Ok(Decoder {
            input,
            stream_index,
            time_base,
            decoder,
            scaler,
            width,
            height,
        })
    }

    /// Decode the next frame. `None` at end of file.
    fn decode_next(decoder: &mut Decoder) -> anyhow::Result<Option<(Vec<u8>, f64)>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb_frame = ffmpeg::frame::Video::empty();
        loop {
            if decoder.decoder.receive_frame(&mut decoded).is_ok() {
                decoder
                    .scaler
                    .run(&decoded, &mut rgb_frame)
                    .context("scale frame to RGB")?;
                let pts = decoded.timestamp().unwrap_or(0) as f64 * decoder.time_base;
                return Ok(Some((frame_to_pixels(&rgb_frame)?, pts)));
            }
            let stream_index = decoder.stream_index;
            let next = decoder
                .input
                .packets()
                .find(|(stream, _)| stream.index() == stream_index)
                .map(|(_, packet)| packet);
            match next {
                Some(packet) => decoder
                    .decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?,
                None => return Ok(None),
            }
        }
    }
}

impl MediaSource for VideoFile {
    fn kind(&self) -> MediaKind {
        MediaKind::Video
    }

    fn describe(&self) -> String {
        self.path.clone()
    }

    fn acquire(&mut self) -> Result<(), DetectError> {
        let decoder = self
            .open()
            .map_err(|err| DetectError::acquisition(&self.path, format!("{err:#}")))?;
        log::info!(
            "VideoFile: loaded {} ({}x{})",
            self.path,
            decoder.width,
            decoder.height
        );
        self.decoder = Some(decoder);
        self.started_at = Some(Instant::now());
        self.current = None;
        self.ended = false;
        self.released = false;
        Ok(())
    }

    fn readiness(&self) -> Readiness {
        if self.decoder.is_some() {
            Readiness::Ready
        } else {
            Readiness::NotReady
        }
    }

    fn playback(&self) -> Playback {
        if let Some(err) = &self.last_error {
            return Playback::Failed(err.clone());
        }
        if self.released || self.ended {
            Playback::Ended
        } else if self.decoder.is_some() {
            Playback::Playing
        } else {
            Playback::Paused
        }
    }

    fn natural_size(&self) -> Option<(u32, u32)> {
        self.decoder.as_ref().map(|d| (d.width, d.height))
    }

    fn draw_frame(&mut self, target: &mut RgbImage) -> Result<(), DetectError> {
        let elapsed = self
            .started_at
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        let decoder = self
            .decoder
            .as_mut()
            .ok_or(DetectError::SamplingSkipped(SkipReason::Released))?;
        let (width, height) = (decoder.width, decoder.height);

        loop {
            if let Some((_, pts)) = &self.current {
                if *pts >= elapsed {
                    break;
                }
            }
            match Self::decode_next(decoder) {
                Ok(Some(frame)) => self.current = Some(frame),
                Ok(None) => {
                    self.ended = true;
                    break;
                }
                Err(err) => {
                    self.last_error = Some(format!("{err:#}"));
                    return Err(DetectError::Encode(format!("{err:#}")));
                }
            }
        }

        match &self.current {
            Some((pixels, _)) => blit_rgb(pixels, width, height, target),
            None => Err(DetectError::SamplingSkipped(SkipReason::Ended)),
        }
    }

    fn release(&mut self) {
        if self.decoder.take().is_some() {
            log::info!("VideoFile: released {}", self.path);
        }
        self.current = None;
        self.released = true;
    }

    fn is_released(&self) -> bool {
        self.released
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> anyhow::Result<Vec<u8>> {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let row_bytes = width * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        return Ok(data[..row_bytes * height].to_vec());
    }

    let mut pixels = Vec::with_capacity(row_bytes * height);
    for row in 0..height {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }
    Ok(pixels)
}
